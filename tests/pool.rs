//! 连接池集成测试
//! Connection pool integration tests

mod common;

use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use valkit::pool::{Pool, PoolConfig};

#[tokio::test]
async fn round_trip() {
  let pool = common::test_pool();
  common::flush_keys(&pool, "pool_test*").await;

  let mut conn = pool.get().await.unwrap();
  let _: () = conn.set("pool_test:k", "v").await.unwrap();
  let value: String = conn.get("pool_test:k").await.unwrap();
  assert_eq!(value, "v");
  drop(conn);

  // 归还后的连接可以再次借出
  // a returned connection can be borrowed again
  let mut conn = pool.get().await.unwrap();
  let _: () = conn.del("pool_test:k").await.unwrap();
}

#[tokio::test]
async fn invalid_urls() {
  assert!(Pool::new("redis://localhost:6379/0").is_err());
  assert!(Pool::new("localhost:6379").is_err());
  assert!(Pool::new("valkey://localhost:6379/abc").is_err());
}

#[tokio::test]
async fn max_active_limits_concurrency() {
  let host = std::env::var("VALKEY_HOST").unwrap_or_else(|_| "localhost:6379".to_string());
  let pool = Arc::new(
    Pool::with_config(
      &format!("valkey://{host}/0"),
      PoolConfig {
        max_active: 1,
        ..PoolConfig::default()
      },
    )
    .unwrap(),
  );

  // 两个并发借用串行化：第二个要等第一个归还
  // two concurrent borrows serialize, the second waits for the first return
  let start = Instant::now();
  let mut handles = Vec::new();
  for _ in 0..2 {
    let pool = Arc::clone(&pool);
    handles.push(tokio::spawn(async move {
      let mut conn = pool.get().await.unwrap();
      let _: String = redis::cmd("PING").query_async(&mut conn).await.unwrap();
      tokio::time::sleep(Duration::from_millis(100)).await;
    }));
  }
  for handle in handles {
    handle.await.unwrap();
  }

  assert!(
    start.elapsed() >= Duration::from_millis(200),
    "borrows were not serialized"
  );
}
