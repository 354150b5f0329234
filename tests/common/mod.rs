//! 集成测试共用的存储断言辅助
//! Store assertion helpers shared by the integration tests
//!
//! 测试需要一个真实的存储实例，地址来自 `VALKEY_HOST` 环境变量，默认
//! `localhost:6379`。每个测试使用自己的键基名并在开始时清掉残留的键，
//! 因此同一个二进制里的测试可以并行跑。
//! The tests need a live store instance, addressed by the `VALKEY_HOST` env
//! var and defaulting to `localhost:6379`. Each test uses its own key base
//! and wipes leftover keys up front, so tests within one binary can run in
//! parallel.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use redis::aio::ConnectionLike;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use valkit::base::clock::NowFunc;
use valkit::pool::Pool;

/// 到测试数据库的连接池
/// A pool to the test database
pub fn test_pool() -> Pool {
  let host = std::env::var("VALKEY_HOST").unwrap_or_else(|_| "localhost:6379".to_string());
  Pool::new(&format!("valkey://{host}/0")).expect("error creating test pool")
}

/// 删除匹配模式的所有键
/// Delete every key matching the pattern
pub async fn flush_keys(pool: &Pool, pattern: &str) {
  let mut conn = pool.get().await.unwrap();
  let keys: Vec<String> = redis::cmd("KEYS")
    .arg(pattern)
    .query_async(&mut conn)
    .await
    .unwrap();
  for key in keys {
    let _: () = conn.del(&key).await.unwrap();
  }
}

pub async fn exists(conn: &mut (impl ConnectionLike + Send), key: &str) -> bool {
  redis::cmd("EXISTS").arg(key).query_async(conn).await.unwrap()
}

pub async fn ttl(conn: &mut (impl ConnectionLike + Send), key: &str) -> i64 {
  redis::cmd("TTL").arg(key).query_async(conn).await.unwrap()
}

pub async fn llen(conn: &mut (impl ConnectionLike + Send), key: &str) -> i64 {
  conn.llen(key).await.unwrap()
}

pub async fn lgetall(conn: &mut (impl ConnectionLike + Send), key: &str) -> Vec<String> {
  conn.lrange(key, 0, -1).await.unwrap()
}

pub async fn smembers(conn: &mut (impl ConnectionLike + Send), key: &str) -> Vec<String> {
  let mut members: Vec<String> = conn.smembers(key).await.unwrap();
  members.sort();
  members
}

pub async fn hgetall(
  conn: &mut (impl ConnectionLike + Send),
  key: &str,
) -> HashMap<String, String> {
  conn.hgetall(key).await.unwrap()
}

pub async fn zgetall(conn: &mut (impl ConnectionLike + Send), key: &str) -> HashMap<String, f64> {
  let pairs: Vec<(String, f64)> = conn.zrange_withscores(key, 0, -1).await.unwrap();
  pairs.into_iter().collect()
}

/// 可拨动的测试时钟
/// A settable test clock
pub struct TestClock(Arc<Mutex<DateTime<Utc>>>);

impl TestClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self(Arc::new(Mutex::new(start)))
  }

  pub fn set(&self, t: DateTime<Utc>) {
    *self.0.lock().unwrap() = t;
  }

  pub fn now_fn(&self) -> NowFunc {
    let now = Arc::clone(&self.0);
    Arc::new(move || *now.lock().unwrap())
  }
}
