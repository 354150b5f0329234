//! 连接池模块
//! Connection pool module
//!
//! 按 `valkey://[:password@]host:port/<db>` 地址建立到存储的连接，空闲连接
//! 复用，活跃连接数有上限，超过上限的调用方等待。脚本注册表挂在池上，
//! 每个池只加载一次。
//! Connects to the store at a `valkey://[:password@]host:port/<db>` address.
//! Idle connections are reused, the number of active connections is capped
//! and callers over the cap wait. The script registry hangs off the pool and
//! is loaded once per pool.

use crate::error::{Error, Result};
use crate::scripts::ScriptManager;
use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::{Cmd, IntoConnectionInfo, Pipeline, RedisFuture, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, Semaphore};

/// 连接池配置
/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
  /// 允许同时借出的最大连接数
  /// Maximum number of connections handed out at once
  pub max_active: usize,
  /// 保留的最大空闲连接数
  /// Maximum number of idle connections kept around
  pub max_idle: usize,
  /// 空闲连接被回收前的存活时间
  /// How long an idle connection lives before being reaped
  pub idle_timeout: Duration,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      max_active: 32,
      max_idle: 4,
      idle_timeout: Duration::from_secs(180),
    }
  }
}

/// 存储连接池
/// Store connection pool
pub struct Pool {
  client: redis::Client,
  config: PoolConfig,
  idle: Mutex<Vec<IdleConnection>>,
  permits: Arc<Semaphore>,
  scripts: OnceCell<ScriptManager>,
}

struct IdleConnection {
  conn: MultiplexedConnection,
  returned_at: Instant,
}

impl Pool {
  /// 用默认配置创建连接池
  /// Create a pool with the default configuration
  pub fn new(url: &str) -> Result<Self> {
    Self::with_config(url, PoolConfig::default())
  }

  /// 用指定配置创建连接池
  /// Create a pool with the given configuration
  pub fn with_config(url: &str, config: PoolConfig) -> Result<Self> {
    let client = redis::Client::open(parse_url(url)?)?;

    Ok(Self {
      client,
      permits: Arc::new(Semaphore::new(config.max_active)),
      config,
      idle: Mutex::new(Vec::new()),
      scripts: OnceCell::new(),
    })
  }

  /// 借出一个连接，归还发生在守卫析构时
  /// Borrow a connection, returned when the guard drops
  pub async fn get(&self) -> Result<PooledConnection<'_>> {
    let permit = Arc::clone(&self.permits)
      .acquire_owned()
      .await
      .map_err(|_| Error::pool("connection pool is closed"))?;

    let reused = {
      let mut idle = lock_idle(&self.idle);
      let now = Instant::now();

      // 过期的空闲连接直接丢弃
      // stale idle connections are simply dropped
      loop {
        match idle.pop() {
          Some(entry) if now.duration_since(entry.returned_at) < self.config.idle_timeout => {
            break Some(entry.conn)
          }
          Some(_) => continue,
          None => break None,
        }
      }
    };

    let conn = match reused {
      Some(conn) => conn,
      None => self.client.get_multiplexed_async_connection().await?,
    };

    Ok(PooledConnection {
      pool: self,
      conn: Some(conn),
      _permit: permit,
    })
  }

  /// 本池的脚本注册表，首次访问时加载
  /// This pool's script registry, loaded on first access
  pub(crate) async fn scripts(&self) -> Result<&ScriptManager> {
    self
      .scripts
      .get_or_try_init(|| async {
        let mut conn = self.get().await?;
        ScriptManager::load(&mut conn).await
      })
      .await
  }

  fn put_back(&self, conn: MultiplexedConnection) {
    let mut idle = lock_idle(&self.idle);
    if idle.len() < self.config.max_idle {
      idle.push(IdleConnection {
        conn,
        returned_at: Instant::now(),
      });
    }
  }
}

impl std::fmt::Debug for Pool {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pool")
      .field("config", &self.config)
      .field("available_permits", &self.permits.available_permits())
      .finish()
  }
}

// 池内部不会在持锁期间 panic，中毒时取回内容继续使用
// the pool never panics while holding the lock, recover the contents on poison
fn lock_idle(idle: &Mutex<Vec<IdleConnection>>) -> MutexGuard<'_, Vec<IdleConnection>> {
  match idle.lock() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  }
}

/// 从池中借出的连接
/// A connection borrowed from the pool
pub struct PooledConnection<'a> {
  pool: &'a Pool,
  conn: Option<MultiplexedConnection>,
  _permit: tokio::sync::OwnedSemaphorePermit,
}

impl PooledConnection<'_> {
  fn conn_mut(&mut self) -> &mut MultiplexedConnection {
    // conn 只在析构时被取走
    // conn is only taken at drop time
    self.conn.as_mut().expect("connection already returned")
  }
}

impl Drop for PooledConnection<'_> {
  fn drop(&mut self) {
    if let Some(conn) = self.conn.take() {
      self.pool.put_back(conn);
    }
  }
}

impl ConnectionLike for PooledConnection<'_> {
  fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
    self.conn_mut().req_packed_command(cmd)
  }

  fn req_packed_commands<'a>(
    &'a mut self,
    cmd: &'a Pipeline,
    offset: usize,
    count: usize,
  ) -> RedisFuture<'a, Vec<Value>> {
    self.conn_mut().req_packed_commands(cmd, offset, count)
  }

  fn get_db(&self) -> i64 {
    match &self.conn {
      Some(conn) => conn.get_db(),
      None => 0,
    }
  }
}

/// 解析存储地址，数据库序号取自 URL 路径
/// Parse the store address, the database index comes from the URL path
fn parse_url(url: &str) -> Result<redis::ConnectionInfo> {
  let rest = url
    .strip_prefix("valkey://")
    .ok_or_else(|| Error::pool(format!("invalid store URL: {url}")))?;

  Ok(format!("redis://{rest}").into_connection_info()?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use redis::ConnectionAddr;

  #[test]
  fn test_parse_url() {
    let info = parse_url("valkey://localhost:6379/0").unwrap();
    assert_eq!(
      info.addr,
      ConnectionAddr::Tcp("localhost".to_string(), 6379)
    );
    assert_eq!(info.redis.db, 0);
    assert_eq!(info.redis.password, None);

    let info = parse_url("valkey://:sesame@valkey1:6380/15").unwrap();
    assert_eq!(info.addr, ConnectionAddr::Tcp("valkey1".to_string(), 6380));
    assert_eq!(info.redis.db, 15);
    assert_eq!(info.redis.password, Some("sesame".to_string()));

    // 没有路径时落在 0 号库
    // no path lands on database 0
    assert_eq!(parse_url("valkey://localhost:6379").unwrap().redis.db, 0);

    assert!(parse_url("http://localhost:6379/0").is_err());
    assert!(parse_url("valkey://localhost:6379/abc").is_err());
  }

  #[test]
  fn test_default_config() {
    let config = PoolConfig::default();
    assert_eq!(config.max_active, 32);
    assert_eq!(config.max_idle, 4);
    assert_eq!(config.idle_timeout, Duration::from_secs(180));
  }
}
