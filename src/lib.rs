//! # Valkit
//!
//! 基于 Valkey/Redis 的多进程协调原语库
//! Coordination primitives for multi-process services backed by Valkey/Redis
//!
//! 后端服务经常需要在多个进程之间分发任务、互斥和统计，本库把这些常见
//! 模式封装为少量简单类型，所有状态都保存在一个强一致的单分片存储中。
//! Backend services often need to dispatch tasks, exclude each other and keep
//! counters across many processes. This library packages those recurring
//! patterns as a handful of simple types whose state lives in a single
//! strongly consistent store shard.
//!
//! ## 特性
//! ## Features
//!
//! - 按 owner 公平调度的任务队列，支持优先级、并发上限和暂停
//!   - Fair task queue scheduled per owner, with priorities, a concurrency cap and pausing
//! - 基于租约的分布式锁，释放和续期都要求持有锁令牌
//!   - Lease based distributed lock whose release and extension are token scoped
//! - 按时间区间分片的哈希、集合和计数序列，旧区间自动过期
//!   - Interval sharded hashes, sets and counter series whose stale buckets expire on their own
//! - 限定容量的有序集合，只保留得分最高的 N 个成员
//!   - Capped sorted set keeping only the top N members by score
//!
//! 所有修改队列状态的操作都通过服务端原子脚本执行，同一个逻辑对象的全部
//! 键共享一个哈希标签，因此多键脚本在分片部署上也能工作。
//! Every mutation of queue state runs inside a server side atomic script, and
//! all keys of one logical object share a hash tag, so multi-key scripts keep
//! working on a sharded deployment.
//!
//! ## 快速开始
//! ## Quick Start
//!
//! ```rust,no_run
//! use valkit::pool::Pool;
//! use valkit::queues::Fair;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   // 创建连接池
//!   // Create the connection pool
//!   let pool = Pool::new("valkey://localhost:6379/0")?;
//!
//!   // 每个 owner 最多同时处理 3 个任务
//!   // Each owner may have at most 3 tasks in flight
//!   let queue = Fair::new("mailroom", 3);
//!
//!   let id = queue.push(&pool, "owner1", false, b"send welcome email").await?;
//!   println!("queued task {id}");
//!
//!   if let Some((owner, id, task)) = queue.pop(&pool).await? {
//!     println!("popped task {id} for {owner}: {task:?}");
//!     queue.done(&pool, &owner).await?;
//!   }
//!
//!   Ok(())
//! }
//! ```

pub mod base;
pub mod czset;
pub mod error;
pub mod intervals;
pub mod locks;
pub mod pool;
pub mod queues;
mod scripts;

pub use crate::error::{Error, Result};
pub use crate::pool::{Pool, PoolConfig};
