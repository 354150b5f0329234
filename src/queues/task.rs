//! 任务标识与线上载荷格式
//! Task identity and wire payload format
//!
//! 存储里的任务是 `<task-id>|<不透明字节>` 的拼接。任务 id 是入队时生成的
//! v7 UUID：128 位、按时间有序、可按字典序排序。
//! A task as stored is the concatenation `<task-id>|<opaque bytes>`. The task
//! id is a v7 UUID generated at push time: 128 bits, time ordered and
//! lexicographically sortable.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 队列中任务的唯一标识
/// Unique identifier of a task in a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Uuid);

impl TaskId {
  pub(crate) fn new() -> Self {
    Self(Uuid::now_v7())
  }

  pub fn as_uuid(&self) -> &Uuid {
    &self.0
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

impl FromStr for TaskId {
  type Err = uuid::Error;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    Ok(Self(Uuid::try_parse(s)?))
  }
}

/// 拼出线上载荷
/// Build the wire payload
pub(crate) fn build_payload(id: TaskId, task: &[u8]) -> Vec<u8> {
  let id = id.to_string();
  let mut payload = Vec::with_capacity(id.len() + 1 + task.len());
  payload.extend_from_slice(id.as_bytes());
  payload.push(b'|');
  payload.extend_from_slice(task);
  payload
}

/// 拆开线上载荷
/// Split the wire payload
///
/// 第一段不是合法任务 id 的载荷按毒消息处理，不带 id 的旧格式同样拒绝。
/// A payload whose first segment is not a well-formed task id is treated as a
/// poison message; the old id-less format is rejected the same way.
pub(crate) fn parse_payload(raw: &[u8]) -> Result<(TaskId, Vec<u8>)> {
  let invalid = || Error::InvalidTaskPayload {
    payload: String::from_utf8_lossy(raw).into_owned(),
  };

  let sep = raw.iter().position(|&b| b == b'|').ok_or_else(invalid)?;
  let id = std::str::from_utf8(&raw[..sep])
    .ok()
    .and_then(|s| TaskId::from_str(s).ok())
    .ok_or_else(invalid)?;

  Ok((id, raw[sep + 1..].to_vec()))
}
