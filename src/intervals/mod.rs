//! 按时间区间分片的聚合类型
//! Aggregates sharded by time interval
//!
//! 每个类型把数据写进“当前区间”的桶键，读取时跨最近 K 个桶聚合。桶键在
//! 第一次写入时惰性创建，每次写入都把 TTL 重设为 K × 区间秒数，所以最后
//! 一次写入之后 K 个区间，过期的桶自己消失。
//! Each type writes into the bucket key of the current interval and reads
//! aggregate across the most recent K buckets. Bucket keys are created
//! lazily by the first write, and every write resets the TTL to K × interval
//! seconds, so stale buckets disappear on their own K intervals after their
//! last write.

pub mod hash;
pub mod series;
pub mod set;

pub use hash::IntervalHash;
pub use series::IntervalSeries;
pub use set::IntervalSet;

use crate::base::keys;
use std::time::Duration;

/// 区间参数属于调用方编程错误的范畴，构造时就检查
/// Interval parameters are checked at construction, bad ones are programmer errors
pub(crate) fn validate(key_base: &str, interval: Duration, size: usize) {
  keys::tagged(key_base);
  assert!(
    interval.as_secs() >= 1,
    "interval must be at least one second"
  );
  assert!(size >= 1, "interval window needs at least one bucket");
}
