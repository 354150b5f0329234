//! 可注入的 UTC 时钟
//! Injectable UTC clock
//!
//! 区间类型从一个可替换的供给函数读取“现在”，生产环境用系统时钟，
//! 测试则固定时间。供给函数必须返回 UTC。
//! Interval types read "now" from a swappable supplier. Production uses the
//! system clock, tests pin the time. The supplier must return UTC.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// NowFunc - 时钟供给函数类型
/// NowFunc - clock supplier function type
pub type NowFunc = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// 系统时钟供给函数
/// The system clock supplier
pub fn system_clock() -> NowFunc {
  Arc::new(Utc::now)
}
