//! 分布式租约锁
//! Distributed lease lock
//!
//! 抢到锁会得到一个随机令牌，释放和续期都必须出示这个令牌，令牌不符时
//! 静默忽略。锁键带 TTL，持有方崩溃后租约自动到期。
//! Grabbing the lock yields a random token, and both release and extension
//! must present it; a mismatched token is silently ignored. The lock key
//! carries a TTL so the lease expires on its own if the holder crashes.

use crate::base::random;
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::scripts::ScriptArg;
use std::time::Duration;
use tokio::time::Instant;

/// 锁令牌的长度，64 字符字母表下为 60 位熵
/// Lock token length, 60 bits of entropy over the 64 character alphabet
const TOKEN_LENGTH: usize = 10;

/// 基于租约的分布式锁
/// A lease based distributed lock
#[derive(Debug, Clone)]
pub struct Locker {
  key: String,
  expiration: Duration,
}

impl Locker {
  /// 用给定的键和租约时长创建锁
  /// Create a locker with the given key and lease duration
  pub fn new(key: &str, expiration: Duration) -> Self {
    Self {
      key: key.to_string(),
      expiration,
    }
  }

  /// 尝试抢锁，成功时返回锁令牌
  /// Try to grab the lock, returning the lock token on success
  ///
  /// 冲突时每秒重试一次，超过 `retry` 时长仍未抢到则返回 `None`，这不算
  /// 错误。每次尝试都使用新借出的连接。
  /// On conflict this retries every second; once more than `retry` has
  /// elapsed it returns `None`, which is not an error. Every attempt uses a
  /// freshly borrowed connection.
  pub async fn grab(&self, pool: &Pool, retry: Duration) -> Result<Option<String>> {
    let value = random::base64(TOKEN_LENGTH);
    let expires = self.expiration.as_secs();

    let start = Instant::now();
    loop {
      let mut conn = pool.get().await?;
      let acquired: Option<String> = redis::cmd("SET")
        .arg(&self.key)
        .arg(&value)
        .arg("EX")
        .arg(expires)
        .arg("NX")
        .query_async(&mut conn)
        .await
        .map_err(|e| Error::Lock {
          source: Box::new(Error::Redis(e)),
        })?;
      drop(conn);

      if acquired.is_some() {
        return Ok(Some(value));
      }

      if start.elapsed() > retry {
        return Ok(None);
      }

      tracing::debug!(key = %self.key, "lock held elsewhere, retrying");
      tokio::time::sleep(Duration::from_secs(1)).await;
    }
  }

  /// 出示正确令牌时释放锁，锁已不存在不算错误
  /// Release the lock when the right token is presented, absence is not an error
  pub async fn release(&self, pool: &Pool, value: &str) -> Result<()> {
    let keys = [self.key.clone()];
    let args = [ScriptArg::Str(value.to_string())];

    let scripts = pool.scripts().await?;
    let mut conn = pool.get().await?;
    scripts.eval(&mut conn, "locker_release", &keys, &args).await
  }

  /// 出示正确令牌时把租约延长到指定时长
  /// Extend the lease to the given duration when the right token is presented
  pub async fn extend(&self, pool: &Pool, value: &str, expiration: Duration) -> Result<()> {
    let keys = [self.key.clone()];
    let args = [
      ScriptArg::Str(value.to_string()),
      ScriptArg::Int(expiration.as_secs() as i64),
    ];

    let scripts = pool.scripts().await?;
    let mut conn = pool.get().await?;
    scripts.eval(&mut conn, "locker_extend", &keys, &args).await
  }

  /// 锁当前是否被任何进程持有
  /// Whether any process currently holds the lock
  pub async fn is_locked(&self, pool: &Pool) -> Result<bool> {
    let mut conn = pool.get().await?;
    let exists: bool = redis::cmd("EXISTS")
      .arg(&self.key)
      .query_async(&mut conn)
      .await?;
    Ok(exists)
  }
}
