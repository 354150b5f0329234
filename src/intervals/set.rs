//! 区间集合
//! Interval set
//!
//! 行为像一个集合，但由会过期的时间桶组成。
//! Behaves like a set, but made of expiring time buckets.

use crate::base::clock::{system_clock, NowFunc};
use crate::base::keys;
use crate::error::Result;
use crate::pool::Pool;
use crate::scripts::ScriptArg;
use std::time::Duration;

/// 由过期时间桶组成的集合
/// A set made of expiring time buckets
pub struct IntervalSet {
  key_base: String,
  interval: Duration,
  size: usize,
  now: NowFunc,
}

impl IntervalSet {
  /// 创建区间集合，`size` 是读取窗口覆盖的桶数
  /// Create an interval set, `size` is the number of buckets the read window covers
  pub fn new(key_base: &str, interval: Duration, size: usize) -> Self {
    super::validate(key_base, interval, size);

    Self {
      key_base: key_base.to_string(),
      interval,
      size,
      now: system_clock(),
    }
  }

  /// 替换时钟供给函数，测试用来固定时间
  /// Swap the clock supplier, used by tests to pin the time
  pub fn with_now(mut self, now: NowFunc) -> Self {
    self.now = now;
    self
  }

  /// 把成员加进当前桶
  /// Add the member to the current bucket
  pub async fn add(&self, pool: &Pool, member: &str) -> Result<()> {
    let keys = self.keys();
    let key = &keys[0];
    let mut conn = pool.get().await?;

    redis::pipe()
      .atomic()
      .sadd(key, member)
      .ignore()
      .expire(key, self.ttl_seconds())
      .ignore()
      .query_async::<()>(&mut conn)
      .await?;
    Ok(())
  }

  /// 窗口内任何一个桶包含该成员即为真
  /// True if any bucket in the window contains the member
  pub async fn is_member(&self, pool: &Pool, member: &str) -> Result<bool> {
    let keys = self.keys();
    let args = [ScriptArg::Str(member.to_string())];

    let scripts = pool.scripts().await?;
    let mut conn = pool.get().await?;
    scripts.eval(&mut conn, "iset_ismember", &keys, &args).await
  }

  /// 从窗口内的每个桶移除成员
  /// Remove the members from every bucket in the window
  pub async fn rem(&self, pool: &Pool, members: &[&str]) -> Result<()> {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for key in self.keys() {
      pipe.srem(key, members).ignore();
    }

    let mut conn = pool.get().await?;
    pipe.query_async::<()>(&mut conn).await?;
    Ok(())
  }

  /// 删除窗口内的所有桶
  /// Delete every bucket in the window
  pub async fn clear(&self, pool: &Pool) -> Result<()> {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for key in self.keys() {
      pipe.del(key).ignore();
    }

    let mut conn = pool.get().await?;
    pipe.query_async::<()>(&mut conn).await?;
    Ok(())
  }

  fn keys(&self) -> Vec<String> {
    keys::interval_keys(&self.key_base, self.interval, self.size, (self.now)())
  }

  fn ttl_seconds(&self) -> i64 {
    self.size as i64 * self.interval.as_secs() as i64
  }
}
