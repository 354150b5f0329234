//! 服务端原子脚本模块
//! Server-side atomic script module
//!
//! 所有修改共享状态的操作都作为单个 Lua 脚本在存储端执行，脚本体是进程级
//! 常量，按名字注册，只加载一次。服务端按哈希缓存脚本字节码，缓存被清空
//! 时客户端自动回退到 EVAL。
//! Every mutation of shared state runs as one Lua script on the store side.
//! Script bodies are process-wide constants registered by name and loaded
//! once. The server caches script bytecode by hash; when that cache is
//! flushed the client transparently falls back to EVAL.

use crate::error::{Error, Result};
use phf::phf_map;
use redis::aio::ConnectionLike;
use redis::{FromRedisValue, RedisWrite, ToRedisArgs};
use std::collections::HashMap;

/// 脚本参数
/// Script argument
#[derive(Clone, Debug)]
pub enum ScriptArg {
  Int(i64),
  Str(String),
  Bytes(Vec<u8>),
  Float(f64),
}

impl ToRedisArgs for ScriptArg {
  fn write_redis_args<W>(&self, out: &mut W)
  where
    W: ?Sized + RedisWrite,
  {
    match self {
      ScriptArg::Int(i) => i.write_redis_args(out),
      ScriptArg::Str(s) => s.write_redis_args(out),
      ScriptArg::Bytes(b) => b.write_redis_args(out),
      ScriptArg::Float(f) => f.write_redis_args(out),
    }
  }
}

/// Lua 脚本集合
/// Lua script collection
pub mod bodies {
  /// 公平队列入队脚本
  /// Fair queue push script
  /// `KEYS[1]` -> {base}:queued
  /// `KEYS[2]` -> {base}:active
  /// `KEYS[3]` -> {base}:o:owner/0
  /// `KEYS[4]` -> {base}:o:owner/1
  /// `ARGV[1]` -> owner
  /// `ARGV[2]` -> 优先级 / priority ("0" or "1")
  /// `ARGV[3]` -> 任务载荷 / task payload
  pub const FAIR_PUSH: &str = r#"
        local list = KEYS[3]
        if ARGV[2] == "1" then
            list = KEYS[4]
        end
        redis.call("RPUSH", list, ARGV[3])
        redis.call("ZINCRBY", KEYS[1], 1, ARGV[1])
        return ""
    "#;

  /// 公平队列选取 owner 脚本
  /// Fair queue owner selection script
  ///
  /// 把 queued 拷贝进暂存集，去掉暂停的和已达并发上限的 owner，按当前
  /// active 数重排后取最小者，相同分数按成员名排序。选中即预占一个
  /// active 名额。暂存集在本次调用内创建并删除。
  /// Copies queued into the scratch set, drops paused owners and owners at
  /// the concurrency cap, rescores the rest by their current active count
  /// and takes the lowest, ties ordered by member name. Selection reserves
  /// one active slot. The scratch set is created and deleted within this
  /// invocation.
  ///
  /// `KEYS[1]` -> {base}:queued
  /// `KEYS[2]` -> {base}:active
  /// `KEYS[3]` -> {base}:paused
  /// `KEYS[4]` -> {base}:temp
  /// `ARGV[1]` -> 每个 owner 的并发上限 / max active tasks per owner
  /// 返回选中的 owner，没有可选时返回空串
  /// Returns the selected owner, or the empty string when none qualifies
  pub const FAIR_POP_OWNER: &str = r#"
        local max_active = tonumber(ARGV[1])

        redis.call("ZUNIONSTORE", KEYS[4], 1, KEYS[1])

        for _, owner in ipairs(redis.call("SMEMBERS", KEYS[3])) do
            redis.call("ZREM", KEYS[4], owner)
        end

        for _, owner in ipairs(redis.call("ZRANGE", KEYS[4], 0, -1)) do
            local count = tonumber(redis.call("ZSCORE", KEYS[2], owner)) or 0
            if count >= max_active then
                redis.call("ZREM", KEYS[4], owner)
            else
                redis.call("ZADD", KEYS[4], count, owner)
            end
        end

        local winner = redis.call("ZRANGE", KEYS[4], 0, 0)[1]
        redis.call("DEL", KEYS[4])

        if not winner then
            return ""
        end

        redis.call("ZINCRBY", KEYS[2], 1, winner)
        return winner
    "#;

  /// 公平队列取任务脚本
  /// Fair queue task pop script
  ///
  /// 高优先级列表先出队。取到任务时递减 queued 计数；列表为空说明该
  /// owner 的任务列表已被外部删除，把它从 queued 中清掉并退还选取时
  /// 预占的 active 名额。queued 键与 active 键共享同一个哈希标签，
  /// 由 active 键名推导。
  /// The high priority list drains first. On success the queued count is
  /// decremented; an empty list means the owner's task lists were deleted
  /// externally, so the owner is dropped from the queued set and the active
  /// slot reserved at selection time is given back. The queued key shares
  /// the active key's hash tag and is derived from its name.
  ///
  /// `KEYS[1]` -> {base}:active
  /// `KEYS[2]` -> {base}:o:owner/0
  /// `KEYS[3]` -> {base}:o:owner/1
  /// `ARGV[1]` -> owner
  /// 返回任务载荷，没有任务时返回空串
  /// Returns the task payload, or the empty string when there is none
  pub const FAIR_POP_TASK: &str = r#"
        local queued = string.match(KEYS[1], "^(.*):active$") .. ":queued"

        local payload = redis.call("LPOP", KEYS[3])
        if not payload then
            payload = redis.call("LPOP", KEYS[2])
        end

        if payload then
            if tonumber(redis.call("ZINCRBY", queued, -1, ARGV[1])) <= 0 then
                redis.call("ZREM", queued, ARGV[1])
            end
            return payload
        end

        redis.call("ZREM", queued, ARGV[1])
        if tonumber(redis.call("ZINCRBY", KEYS[1], -1, ARGV[1])) <= 0 then
            redis.call("ZREM", KEYS[1], ARGV[1])
        end
        return ""
    "#;

  /// 公平队列完成脚本，归零即移除，重复调用不会出现负数
  /// Fair queue done script, removed at zero, repeated calls never go negative
  /// `KEYS[1]` -> {base}:active
  /// `ARGV[1]` -> owner
  pub const FAIR_DONE: &str = r#"
        if tonumber(redis.call("ZINCRBY", KEYS[1], -1, ARGV[1])) <= 0 then
            redis.call("ZREM", KEYS[1], ARGV[1])
        end
        return ""
    "#;

  /// 限容有序集合添加脚本：添加、裁掉最低分成员到容量内、刷新 TTL
  /// Capped sorted set add script: add, trim lowest scores to the cap, refresh TTL
  /// `KEYS[1]` -> 集合键 / the set key
  /// `ARGV[1]` -> 分数 / score
  /// `ARGV[2]` -> 成员 / member
  /// `ARGV[3]` -> 容量 / cap
  /// `ARGV[4]` -> TTL 秒数 / TTL in seconds
  pub const CZSET_ADD: &str = r#"
        redis.call("ZADD", KEYS[1], ARGV[1], ARGV[2])
        local size = redis.call("ZCARD", KEYS[1])
        local cap = tonumber(ARGV[3])
        if size > cap then
            redis.call("ZREMRANGEBYRANK", KEYS[1], 0, size - cap - 1)
        end
        redis.call("EXPIRE", KEYS[1], ARGV[4])
        return ""
    "#;

  /// 区间哈希读取脚本：返回最新的包含该字段的桶里的值
  /// Interval hash get script: value from the newest bucket holding the field
  /// `KEYS` -> 全部桶键，最新的在前 / all bucket keys, newest first
  /// `ARGV[1]` -> 字段 / field
  pub const IHASH_GET: &str = r#"
        for _, key in ipairs(KEYS) do
            local value = redis.call("HGET", key, ARGV[1])
            if value then
                return value
            end
        end
        return ""
    "#;

  /// 区间哈希批量读取脚本：结果与输入字段一一对应，缺失为空串
  /// Interval hash multi-get script: results align with input fields, missing as empty
  /// `KEYS` -> 全部桶键，最新的在前 / all bucket keys, newest first
  /// `ARGV` -> 字段列表 / fields
  pub const IHASH_MGET: &str = r#"
        local values = {}
        for i, field in ipairs(ARGV) do
            values[i] = ""
            for _, key in ipairs(KEYS) do
                local value = redis.call("HGET", key, field)
                if value then
                    values[i] = value
                    break
                end
            end
        end
        return values
    "#;

  /// 区间集合成员判断脚本：任何一个桶包含即为真
  /// Interval set membership script: true if any bucket contains the member
  /// `KEYS` -> 全部桶键 / all bucket keys
  /// `ARGV[1]` -> 成员 / member
  pub const ISET_ISMEMBER: &str = r#"
        for _, key in ipairs(KEYS) do
            if redis.call("SISMEMBER", key, ARGV[1]) == 1 then
                return 1
            end
        end
        return 0
    "#;

  /// 区间序列读取脚本：每个桶一个整数，缺失桶或缺失字段记 0
  /// Interval series get script: one integer per bucket, 0 for missing buckets or fields
  /// `KEYS` -> 全部桶键，最新的在前 / all bucket keys, newest first
  /// `ARGV[1]` -> 字段 / field
  pub const ISERIES_GET: &str = r#"
        local values = {}
        for i, key in ipairs(KEYS) do
            values[i] = tonumber(redis.call("HGET", key, ARGV[1])) or 0
        end
        return values
    "#;

  /// 锁释放脚本：只有持有正确令牌才删除，锁不存在不算错误
  /// Lock release script: deletes only under the right token, absence is not an error
  /// `KEYS[1]` -> 锁键 / the lock key
  /// `ARGV[1]` -> 锁令牌 / the lock token
  pub const LOCKER_RELEASE: &str = r#"
        if redis.call("GET", KEYS[1]) == ARGV[1] then
            redis.call("DEL", KEYS[1])
        end
        return ""
    "#;

  /// 锁续期脚本：只有持有正确令牌才重设 TTL
  /// Lock extend script: resets the TTL only under the right token
  /// `KEYS[1]` -> 锁键 / the lock key
  /// `ARGV[1]` -> 锁令牌 / the lock token
  /// `ARGV[2]` -> 新 TTL 秒数 / new TTL in seconds
  pub const LOCKER_EXTEND: &str = r#"
        if redis.call("GET", KEYS[1]) == ARGV[1] then
            redis.call("EXPIRE", KEYS[1], ARGV[2])
        end
        return ""
    "#;
}

static ALL_SCRIPTS: phf::Map<&'static str, &'static str> = phf_map! {
    "fair_push" => bodies::FAIR_PUSH,
    "fair_pop_owner" => bodies::FAIR_POP_OWNER,
    "fair_pop_task" => bodies::FAIR_POP_TASK,
    "fair_done" => bodies::FAIR_DONE,
    "czset_add" => bodies::CZSET_ADD,
    "ihash_get" => bodies::IHASH_GET,
    "ihash_mget" => bodies::IHASH_MGET,
    "iset_ismember" => bodies::ISET_ISMEMBER,
    "iseries_get" => bodies::ISERIES_GET,
    "locker_release" => bodies::LOCKER_RELEASE,
    "locker_extend" => bodies::LOCKER_EXTEND,
};

/// 脚本管理器
/// Script manager
#[derive(Debug, Default)]
pub struct ScriptManager {
  /// 脚本 SHA1 缓存
  /// Script SHA1 cache
  script_sha1: HashMap<&'static str, String>,
}

impl ScriptManager {
  /// 把注册表里的全部脚本加载到服务端
  /// Load every registered script onto the server
  pub async fn load<C>(conn: &mut C) -> Result<Self>
  where
    C: ConnectionLike + Send,
  {
    let mut script_sha1 = HashMap::with_capacity(ALL_SCRIPTS.len());

    for (name, body) in ALL_SCRIPTS.entries() {
      let sha: String = redis::cmd("SCRIPT")
        .arg("LOAD")
        .arg(*body)
        .query_async(conn)
        .await?;
      script_sha1.insert(*name, sha);
    }

    Ok(Self { script_sha1 })
  }

  /// 按名字执行脚本
  /// Execute a script by name
  pub async fn eval<T, C>(
    &self,
    conn: &mut C,
    name: &str,
    keys: &[String],
    args: &[ScriptArg],
  ) -> Result<T>
  where
    T: FromRedisValue,
    C: ConnectionLike + Send,
  {
    let sha = self
      .script_sha1
      .get(name)
      .ok_or_else(|| Error::ScriptNotFound {
        name: name.to_string(),
      })?;

    let mut cmd = redis::cmd("EVALSHA");
    cmd.arg(sha.as_str()).arg(keys.len()).arg(keys).arg(args);

    match cmd.query_async::<T>(conn).await {
      Ok(value) => Ok(value),
      Err(e) if e.code() == Some("NOSCRIPT") => {
        // 服务端脚本缓存被清空，用 EVAL 重新灌入
        // the server's script cache was flushed, refill it with EVAL
        let body = ALL_SCRIPTS.get(name).ok_or_else(|| Error::ScriptNotFound {
          name: name.to_string(),
        })?;

        let mut cmd = redis::cmd("EVAL");
        cmd.arg(*body).arg(keys.len()).arg(keys).arg(args);
        Ok(cmd.query_async::<T>(conn).await?)
      }
      Err(e) => Err(e.into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_registry() {
    for name in [
      "fair_push",
      "fair_pop_owner",
      "fair_pop_task",
      "fair_done",
      "czset_add",
      "ihash_get",
      "ihash_mget",
      "iset_ismember",
      "iseries_get",
      "locker_release",
      "locker_extend",
    ] {
      let body = ALL_SCRIPTS.get(name);
      assert!(body.is_some(), "script {name} not registered");
      assert!(!body.unwrap().trim().is_empty());
    }

    assert_eq!(ALL_SCRIPTS.len(), 11);
  }

  #[test]
  fn test_default_manager_is_empty() {
    let manager = ScriptManager::default();
    assert!(manager.script_sha1.is_empty());
  }
}
