//! 区间哈希
//! Interval hash
//!
//! 行为像一个哈希表，但由会过期的时间桶组成。
//! Behaves like a hash map, but made of expiring time buckets.

use crate::base::clock::{system_clock, NowFunc};
use crate::base::keys;
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::scripts::ScriptArg;
use std::time::Duration;

/// 由过期时间桶组成的哈希表
/// A hash map made of expiring time buckets
pub struct IntervalHash {
  key_base: String,
  interval: Duration,
  size: usize,
  now: NowFunc,
}

impl IntervalHash {
  /// 创建区间哈希，`size` 是读取窗口覆盖的桶数
  /// Create an interval hash, `size` is the number of buckets the read window covers
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

  /// 在当前桶里写入字段
  /// Set the field in the current bucket
  pub async fn set(&self, pool: &Pool, field: &str, value: &str) -> Result<()> {
    let keys = self.keys();
    let key = &keys[0];
    let mut conn = pool.get().await?;

    redis::pipe()
      .atomic()
      .hset(key, field, value)
      .ignore()
      .expire(key, self.ttl_seconds())
      .ignore()
      .query_async::<()>(&mut conn)
      .await?;
    Ok(())
  }

  /// 读取字段，返回最新的包含它的桶里的值，窗口内都没有时返回空串
  /// Get the field's value from the newest bucket holding it, empty when no
  /// bucket in the window does
  pub async fn get(&self, pool: &Pool, field: &str) -> Result<String> {
    let keys = self.keys();
    let args = [ScriptArg::Str(field.to_string())];

    let scripts = pool.scripts().await?;
    let mut conn = pool.get().await?;
    scripts.eval(&mut conn, "ihash_get", &keys, &args).await
  }

  /// 批量读取字段，结果与输入顺序对齐
  /// Get several fields, results aligned with the input order
  pub async fn mget(&self, pool: &Pool, fields: &[&str]) -> Result<Vec<String>> {
    // 与 HMGET 一致，零个字段是参数错误
    // consistent with HMGET, zero fields is an argument error
    if fields.is_empty() {
      return Err(Error::WrongArgumentCount);
    }

    let keys = self.keys();
    let args: Vec<ScriptArg> = fields
      .iter()
      .map(|f| ScriptArg::Str(f.to_string()))
      .collect();

    let scripts = pool.scripts().await?;
    let mut conn = pool.get().await?;
    scripts.eval(&mut conn, "ihash_mget", &keys, &args).await
  }

  /// 从窗口内的每个桶删除字段
  /// Delete the fields from every bucket in the window
  pub async fn del(&self, pool: &Pool, fields: &[&str]) -> Result<()> {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for key in self.keys() {
      pipe.hdel(key, fields).ignore();
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
