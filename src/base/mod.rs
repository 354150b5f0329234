//! 基础构件：键布局、时钟和随机令牌
//! Building blocks: key layout, clock and random tokens

pub mod clock;
pub mod keys;
pub mod random;

pub use clock::{system_clock, NowFunc};
