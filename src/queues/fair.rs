//! 公平队列
//! Fair queue
//!
//! 任务按 owner 公平分发：在途任务最少的 owner 总是先被选中，单个 owner
//! 内部高优先级任务先出队，每个 owner 的在途任务数有上限，owner 可以被
//! 暂停。基名为 `foo` 的队列使用下列键：
//! Tasks are distributed evenly across owners: the owner with the fewest
//! tasks in flight is always picked first, high priority tasks drain first
//! within one owner, each owner's in-flight count is capped, and owners can
//! be paused. A queue with the base `foo` uses these keys:
//!
//! - `{foo}:queued` - owner 集合，分数为排队任务数 / owners scored by queued task count
//! - `{foo}:active` - owner 集合，分数为在途任务数 / owners scored by in-flight task count
//! - `{foo}:paused` - 暂停的 owner 集合 / set of paused owners
//! - `{foo}:temp` - 脚本内部使用的暂存集 / scratch set used inside scripts
//! - `{foo}:o:owner1/0` - owner1 的低优先级任务列表 / owner1's low priority task list
//! - `{foo}:o:owner1/1` - owner1 的高优先级任务列表 / owner1's high priority task list
//!
//! 入队和出队脚本要同时原子修改 queued/active 集合和任务列表，所以所有键
//! 共享同一个哈希标签，owner 的列表不能落到别的节点上。
//! The push and pop scripts mutate the queued/active sets and the task lists
//! atomically together, so every key shares one hash tag and owner lists
//! cannot live on other nodes.

use crate::base::keys;
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::queues::task::{build_payload, parse_payload, TaskId};
use crate::scripts::ScriptArg;
use redis::AsyncCommands;

/// 按 owner 公平分发任务的队列
/// A queue distributing tasks evenly across owners
#[derive(Debug, Clone)]
pub struct Fair {
  tagged_base: String,
  max_active_per_owner: u32,
}

impl Fair {
  /// 创建公平队列，`max_active_per_owner` 是单个 owner 的在途任务上限
  /// Create a fair queue, `max_active_per_owner` caps one owner's in-flight tasks
  pub fn new(key_base: &str, max_active_per_owner: u32) -> Self {
    Self {
      tagged_base: keys::tagged(key_base),
      max_active_per_owner,
    }
  }

  /// 入队一个任务，返回生成的任务 id
  /// Queue a task, returning the generated task id
  ///
  /// 入队永远不会因为并发上限而阻塞，上限只在选取 owner 时生效。
  /// Pushing never blocks on the concurrency cap, which only applies at
  /// owner selection time.
  pub async fn push(
    &self,
    pool: &Pool,
    owner: &str,
    priority: bool,
    task: &[u8],
  ) -> Result<TaskId> {
    let id = TaskId::new();
    let [q0, q1] = self.task_keys(owner);
    let keys = [self.queued_key(), self.active_key(), q0, q1];
    let args = [
      ScriptArg::Str(owner.to_string()),
      ScriptArg::Str((if priority { "1" } else { "0" }).to_string()),
      ScriptArg::Bytes(build_payload(id, task)),
    ];

    let pushed: Result<()> = async {
      let scripts = pool.scripts().await?;
      let mut conn = pool.get().await?;
      scripts.eval(&mut conn, "fair_push", &keys, &args).await
    }
    .await;
    pushed.map_err(|e| Error::task_push(owner, e))?;

    Ok(id)
  }

  /// 出队下一个任务，没有任务时返回 `None`
  /// Pop the next task, `None` when there is nothing to do
  ///
  /// 分两个脚本执行：先选 owner 并预占一个在途名额，再从该 owner 的列表
  /// 取任务。两个脚本之间其他消费者可能抢走最后一个任务，或者 owner 的
  /// 列表已被外部删除，这时取任务脚本退还名额，这里重试。
  /// Runs as two scripts: select an owner reserving one in-flight slot, then
  /// pop from that owner's lists. Between the two another consumer may steal
  /// the last task, or the owner's lists may have been deleted externally;
  /// the pop-task script then returns the slot and we retry here.
  pub async fn pop(&self, pool: &Pool) -> Result<Option<(String, TaskId, Vec<u8>)>> {
    let scripts = pool.scripts().await?;
    let mut conn = pool.get().await?;

    let owner_keys = [
      self.queued_key(),
      self.active_key(),
      self.paused_key(),
      self.temp_key(),
    ];
    let max_active = [ScriptArg::Int(self.max_active_per_owner as i64)];

    loop {
      let owner: String = scripts
        .eval(&mut conn, "fair_pop_owner", &owner_keys, &max_active)
        .await
        .map_err(|e| Error::OwnerSelect {
          source: Box::new(e),
        })?;
      if owner.is_empty() {
        return Ok(None);
      }

      let [q0, q1] = self.task_keys(&owner);
      let task_keys = [self.active_key(), q0, q1];
      let payload: Vec<u8> = scripts
        .eval(
          &mut conn,
          "fair_pop_task",
          &task_keys,
          &[ScriptArg::Str(owner.clone())],
        )
        .await
        .map_err(|e| Error::task_pop(&owner, e))?;

      if payload.is_empty() {
        // 选中的 owner 已经没有任务了，换一个再试
        // the selected owner ran out of tasks, go around again
        tracing::debug!(owner = %owner, "selected owner had no queued tasks, retrying");
        continue;
      }

      let (id, task) = parse_payload(&payload)?;
      return Ok(Some((owner, id, task)));
    }
  }

  /// 标记该 owner 的一个任务完成
  /// Mark one of the owner's tasks as complete
  ///
  /// 消费者必须调用这个方法才能维持各 owner 之间的公平。多调无害，
  /// 在途计数不会变成负数。
  /// Consumers must call this to keep owners fairly shared. Extra calls are
  /// harmless, the in-flight count never goes negative.
  pub async fn done(&self, pool: &Pool, owner: &str) -> Result<()> {
    let keys = [self.active_key()];
    let args = [ScriptArg::Str(owner.to_string())];

    let done: Result<()> = async {
      let scripts = pool.scripts().await?;
      let mut conn = pool.get().await?;
      scripts.eval(&mut conn, "fair_done", &keys, &args).await
    }
    .await;
    done.map_err(|e| Error::task_done(owner, e))
  }

  /// 暂停该 owner 的任务处理，幂等
  /// Pause processing of the owner's tasks, idempotent
  ///
  /// 暂停的 owner 对出队不可见，但仍然接受入队并保留在途计数。
  /// Paused owners are invisible to pop but keep accepting pushes and keep
  /// their in-flight count.
  pub async fn pause(&self, pool: &Pool, owner: &str) -> Result<()> {
    let mut conn = pool.get().await?;
    conn.sadd::<_, _, ()>(self.paused_key(), owner).await?;
    Ok(())
  }

  /// 恢复该 owner 的任务处理，幂等
  /// Resume processing of the owner's tasks, idempotent
  pub async fn resume(&self, pool: &Pool, owner: &str) -> Result<()> {
    let mut conn = pool.get().await?;
    conn.srem::<_, _, ()>(self.paused_key(), owner).await?;
    Ok(())
  }

  /// 被暂停的 owner 列表
  /// The list of paused owners
  pub async fn paused(&self, pool: &Pool) -> Result<Vec<String>> {
    let mut conn = pool.get().await?;
    Ok(conn.smembers(self.paused_key()).await?)
  }

  /// 有排队任务的 owner 列表，按排队数升序
  /// Owners with queued tasks, ascending by queued count
  pub async fn queued(&self, pool: &Pool) -> Result<Vec<String>> {
    let mut conn = pool.get().await?;
    Ok(conn.zrange(self.queued_key(), 0, -1).await?)
  }

  /// 该 owner 的排队任务数
  /// The owner's number of queued tasks
  ///
  /// 两个列表长度用管道一次取回，结果不要求是事务快照。
  /// Both list lengths come back in one pipeline; the result need not be a
  /// transactional snapshot.
  pub async fn size(&self, pool: &Pool, owner: &str) -> Result<usize> {
    let [q0, q1] = self.task_keys(owner);
    let mut conn = pool.get().await?;

    let (len0, len1): (u64, u64) = redis::pipe()
      .llen(q0)
      .llen(q1)
      .query_async(&mut conn)
      .await?;

    Ok((len0 + len1) as usize)
  }

  fn queued_key(&self) -> String {
    format!("{}:queued", self.tagged_base)
  }

  fn active_key(&self) -> String {
    format!("{}:active", self.tagged_base)
  }

  fn paused_key(&self) -> String {
    format!("{}:paused", self.tagged_base)
  }

  fn temp_key(&self) -> String {
    format!("{}:temp", self.tagged_base)
  }

  fn task_keys(&self, owner: &str) -> [String; 2] {
    [
      format!("{}:o:{owner}/0", self.tagged_base),
      format!("{}:o:{owner}/1", self.tagged_base),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keys() {
    let q = Fair::new("test", 3);

    assert_eq!(q.queued_key(), "{test}:queued");
    assert_eq!(q.active_key(), "{test}:active");
    assert_eq!(q.paused_key(), "{test}:paused");
    assert_eq!(q.temp_key(), "{test}:temp");
    assert_eq!(
      q.task_keys("owner1"),
      ["{test}:o:owner1/0", "{test}:o:owner1/1"]
    );
  }
}
