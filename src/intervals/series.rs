//! 区间序列
//! Interval series
//!
//! 按时间桶累加的整数计数器，可读出每个桶的值或窗口总和。
//! Integer counters accumulated per time bucket, readable as per-bucket
//! values or as the window total.

use crate::base::clock::{system_clock, NowFunc};
use crate::base::keys;
use crate::error::Result;
use crate::pool::Pool;
use crate::scripts::ScriptArg;
use std::time::Duration;

/// 由过期时间桶组成的计数序列
/// A counter series made of expiring time buckets
pub struct IntervalSeries {
  key_base: String,
  interval: Duration,
  size: usize,
  now: NowFunc,
}

impl IntervalSeries {
  /// 创建区间序列，`size` 是读取窗口覆盖的桶数
  /// Create an interval series, `size` is the number of buckets the read window covers
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

  /// 在当前桶里给字段累加 `value`
  /// Increment the field by `value` in the current bucket
  pub async fn record(&self, pool: &Pool, field: &str, value: i64) -> Result<()> {
    let keys = self.keys();
    let key = &keys[0];
    let mut conn = pool.get().await?;

    redis::pipe()
      .atomic()
      .hincr(key, field, value)
      .ignore()
      .expire(key, self.ttl_seconds())
      .ignore()
      .query_async::<()>(&mut conn)
      .await?;
    Ok(())
  }

  /// 读出字段在每个桶里的值，下标 0 是最新的桶
  /// Read the field's value in every bucket, index 0 newest
  ///
  /// 结果长度恒等于窗口桶数，已过期的桶和缺失的字段记 0。
  /// The result always has one entry per window bucket, with 0 for expired
  /// buckets and missing fields.
  pub async fn get(&self, pool: &Pool, field: &str) -> Result<Vec<i64>> {
    let keys = self.keys();
    let args = [ScriptArg::Str(field.to_string())];

    let scripts = pool.scripts().await?;
    let mut conn = pool.get().await?;
    scripts.eval(&mut conn, "iseries_get", &keys, &args).await
  }

  /// 字段在整个窗口内的总和
  /// The field's total across the whole window
  pub async fn total(&self, pool: &Pool, field: &str) -> Result<i64> {
    Ok(self.get(pool, field).await?.iter().sum())
  }

  fn keys(&self) -> Vec<String> {
    keys::interval_keys(&self.key_base, self.interval, self.size, (self.now)())
  }

  fn ttl_seconds(&self) -> i64 {
    self.size as i64 * self.interval.as_secs() as i64
  }
}
