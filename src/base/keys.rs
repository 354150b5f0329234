//! 键名构造
//! Key name construction
//!
//! 同一个逻辑对象的所有键都以大括号包住的基名开头，迫使它们落在同一个
//! 哈希槽上，这样多键原子脚本在分片部署上也能执行。
//! Every key of one logical object starts with the brace-quoted base name,
//! forcing them into one hash slot so multi-key atomic scripts keep working
//! on a sharded deployment.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// 时间格式
/// Time layouts
pub const TIME_LAYOUT_DAY: &str = "%Y-%m-%d";
pub const TIME_LAYOUT_MINUTE: &str = "%Y-%m-%dT%H:%M";
pub const TIME_LAYOUT_SECOND: &str = "%Y-%m-%dT%H:%M:%S";

/// 生成带哈希标签的键前缀：`{base}`
/// Build the hash-tagged key prefix: `{base}`
///
/// 空基名属于调用方编程错误，直接 panic。
/// An empty base is a programmer error on the caller's side and panics.
pub fn tagged(base: &str) -> String {
  assert!(!base.is_empty(), "key base cannot be empty");
  format!("{{{base}}}")
}

/// 计算时间 `t` 所在桶的标签
/// Compute the bucket label containing time `t`
///
/// - 区间 ≥ 24h 时按 UTC 日历日截断：`YYYY-MM-DD`
/// - 60s ≤ 区间 < 24h 时截断到区间秒数的整数倍：`YYYY-MM-DDTHH:MM`
/// - 区间 < 60s 时同样截断：`YYYY-MM-DDTHH:MM:SS`
///
/// - interval ≥ 24h truncates to the UTC calendar day: `YYYY-MM-DD`
/// - 60s ≤ interval < 24h floors to a multiple of the interval seconds: `YYYY-MM-DDTHH:MM`
/// - interval < 60s floors the same way: `YYYY-MM-DDTHH:MM:SS`
///
/// 截断基于 Unix 纪元秒数取模，因此对任意进程和主机都是字节级一致的。
/// Flooring works over seconds since the Unix epoch, so labels are byte
/// identical across processes and hosts.
pub fn bucket_label(t: DateTime<Utc>, interval: Duration) -> String {
  let secs = interval.as_secs() as i64;

  if secs >= 86_400 {
    t.format(TIME_LAYOUT_DAY).to_string()
  } else {
    let floored = t - TimeDelta::seconds(t.timestamp().rem_euclid(secs));
    if secs >= 60 {
      floored.format(TIME_LAYOUT_MINUTE).to_string()
    } else {
      floored.format(TIME_LAYOUT_SECOND).to_string()
    }
  }
}

/// 计算区间类型当前存活的 K 个桶键，下标 0 是最新的桶
/// Compute the K live bucket keys of an interval type, index 0 newest
pub fn interval_keys(
  base: &str,
  interval: Duration,
  size: usize,
  now: DateTime<Utc>,
) -> Vec<String> {
  let prefix = tagged(base);
  let step = TimeDelta::seconds(interval.as_secs() as i64);

  (0..size)
    .map(|i| format!("{prefix}:{}", bucket_label(now - step * i as i32, interval)))
    .collect()
}
