//! 错误处理模块
//! Error handling module
//!
//! 定义了 Valkit 库中使用的各种错误类型
//! Defines the error types used across the Valkit library

use thiserror::Error;

/// Valkit 库的结果类型
/// Result type for the Valkit library
pub type Result<T> = std::result::Result<T, Error>;

/// Valkit 错误类型
/// Valkit error type
#[derive(Error, Debug)]
pub enum Error {
  /// 存储错误
  /// Store error
  #[error("store error: {0}")]
  Redis(#[from] redis::RedisError),

  /// 连接池配置错误
  /// Connection pool configuration error
  #[error("pool error: {message}")]
  Pool { message: String },

  /// 脚本未在注册表中登记
  /// Script not registered in the registry
  #[error("script not found in registry: {name}")]
  ScriptNotFound { name: String },

  /// 入队失败
  /// Push failed
  #[error("error pushing task for owner {owner}: {source}")]
  TaskPush {
    owner: String,
    #[source]
    source: Box<Error>,
  },

  /// 选取 owner 失败
  /// Owner selection failed
  #[error("error selecting task owner: {source}")]
  OwnerSelect {
    #[source]
    source: Box<Error>,
  },

  /// 出队失败
  /// Pop failed
  #[error("error popping task for owner {owner}: {source}")]
  TaskPop {
    owner: String,
    #[source]
    source: Box<Error>,
  },

  /// 标记任务完成失败
  /// Marking a task done failed
  #[error("error marking task done for owner {owner}: {source}")]
  TaskDone {
    owner: String,
    #[source]
    source: Box<Error>,
  },

  /// 任务载荷格式非法（毒消息）
  /// Malformed task payload (poison message)
  #[error("invalid task payload: {payload}")]
  InvalidTaskPayload { payload: String },

  /// 参数数量错误，与对应存储命令的报错保持一致
  /// Wrong argument count, matching the store command's own error
  #[error("wrong number of arguments for command")]
  WrongArgumentCount,

  /// 获取锁失败
  /// Grabbing a lock failed
  #[error("error trying to get lock: {source}")]
  Lock {
    #[source]
    source: Box<Error>,
  },
}

impl Error {
  /// 创建连接池错误
  /// Create a pool error
  pub fn pool<S: Into<String>>(message: S) -> Self {
    Self::Pool {
      message: message.into(),
    }
  }

  /// 给错误附加入队上下文
  /// Attach push context to an error
  pub(crate) fn task_push(owner: &str, source: Error) -> Self {
    Self::TaskPush {
      owner: owner.to_string(),
      source: Box::new(source),
    }
  }

  /// 给错误附加出队上下文
  /// Attach pop context to an error
  pub(crate) fn task_pop(owner: &str, source: Error) -> Self {
    Self::TaskPop {
      owner: owner.to_string(),
      source: Box::new(source),
    }
  }

  /// 给错误附加完成上下文
  /// Attach done context to an error
  pub(crate) fn task_done(owner: &str, source: Error) -> Self {
    Self::TaskDone {
      owner: owner.to_string(),
      source: Box::new(source),
    }
  }
}
