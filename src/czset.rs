//! 限容有序集合
//! Capped sorted set
//!
//! 一个有序集合，但把基数限制在容量之内：每次添加后裁掉得分最低的成员，
//! 并刷新整个键的 TTL。
//! A sorted set that enforces a cap on its size: every add trims the lowest
//! scoring members and refreshes the key's TTL.

use crate::error::Result;
use crate::pool::Pool;
use crate::scripts::ScriptArg;
use redis::AsyncCommands;
use std::time::Duration;

/// 只保留得分最高的 N 个成员的有序集合
/// A sorted set keeping only its top N members by score
#[derive(Debug, Clone)]
pub struct CappedZSet {
  key: String,
  cap: usize,
  expire: Duration,
}

impl CappedZSet {
  /// 创建限容有序集合
  /// Create a capped sorted set
  pub fn new(key: &str, cap: usize, expire: Duration) -> Self {
    Self {
      key: key.to_string(),
      cap,
      expire,
    }
  }

  /// 添加成员，只有得分进入前 `cap` 名才会留下
  /// Add a member, kept only if its score lands in the top `cap`
  pub async fn add(&self, pool: &Pool, member: &str, score: f64) -> Result<()> {
    let keys = [self.key.clone()];
    let args = [
      ScriptArg::Float(score),
      ScriptArg::Str(member.to_string()),
      ScriptArg::Int(self.cap as i64),
      ScriptArg::Int(self.expire.as_secs() as i64),
    ];

    let scripts = pool.scripts().await?;
    let mut conn = pool.get().await?;
    scripts.eval(&mut conn, "czset_add", &keys, &args).await
  }

  /// 集合基数
  /// Cardinality of the set
  pub async fn card(&self, pool: &Pool) -> Result<usize> {
    let mut conn = pool.get().await?;
    let count: u64 = conn.zcard(&self.key).await?;
    Ok(count as usize)
  }

  /// 全部成员及其得分，按得分升序
  /// All members with their scores, ascending by score
  pub async fn members(&self, pool: &Pool) -> Result<Vec<(String, f64)>> {
    let mut conn = pool.get().await?;
    Ok(conn.zrange_withscores(&self.key, 0, -1).await?)
  }
}
