use crate::adapter::{BackendKind, CacheAdapter, HashCommands, HashWrite, JsonCommands, SetStatus};
use crate::error::{CacheError, CacheResult, ROOT_MUST_EXIST};
use crate::path::JsonPath;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use redis::{Connection, ErrorKind as RedisErrorKind, RedisError, RedisResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Connection manager for the pool
struct RedisConnectionManager {
    client: redis::Client,
}

impl RedisConnectionManager {
    fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

impl r2d2::ManageConnection for RedisConnectionManager {
    type Connection = Mutex<Connection>;
    type Error = RedisError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let conn = self.client.get_connection()?;
        Ok(Mutex::new(conn))
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        redis::cmd("PING").query(conn.get_mut())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Remote key-value backend using the synchronous client.
///
/// Values are stored as JSON text. Hash and document commands map one to one
/// onto the server's native `H*` and `JSON.*` commands; document paths are
/// sent in wire form (`.` for the root, `a.b[0]` otherwise).
///
/// # Compatibility
///
/// - Redis 6.x, 7.x with the RedisJSON module for the document commands
pub struct RedisAdapter {
    pool: r2d2::Pool<RedisConnectionManager>,
    key_prefix: String,
}

impl RedisAdapter {
    /// Connect to the server and verify it answers `PING`.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g. "redis://localhost:6379")
    /// * `pool_size` - Connection pool size
    /// * `key_prefix` - Prefix for all keys (e.g. "cachet:")
    pub fn new(url: &str, pool_size: usize, key_prefix: String) -> Result<Self> {
        let client = redis::Client::open(url).context("Failed to parse Redis URL")?;

        let pool = r2d2::Pool::builder()
            .max_size(pool_size as u32)
            .connection_timeout(Duration::from_secs(5))
            .build(RedisConnectionManager::new(client))
            .context("Failed to create Redis connection pool")?;

        {
            let conn = pool.get().context("Failed to get connection from pool")?;
            let _: String = redis::cmd("PING")
                .query(&mut *conn.lock())
                .context("Failed to PING Redis")?;
        }

        tracing::info!(
            "Connected to Redis with prefix={}, pool_size={}",
            key_prefix,
            pool_size
        );

        Ok(Self { pool, key_prefix })
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Run `op` on a pooled connection, mapping failures onto the error taxonomy.
    fn with_conn<T>(&self, op: impl FnOnce(&mut Connection) -> RedisResult<T>) -> CacheResult<T> {
        let conn = self
            .pool
            .get()
            .map_err(|e| CacheError::Internal(format!("Failed to get Redis connection from pool: {e}")))?;
        let mut guard = conn.lock();
        op(&mut guard).map_err(map_redis_error)
    }

    /// True when the server answers `PING`.
    pub fn health_check(&self) -> bool {
        match self.with_conn(|conn| redis::cmd("PING").query::<String>(conn)) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Redis health check failed: {}", e);
                false
            }
        }
    }
}

/// Server replies keep their class: missing paths are not-found, writes below
/// a missing key are bad requests, everything else is internal.
fn map_redis_error(err: RedisError) -> CacheError {
    if err.kind() == RedisErrorKind::ResponseError || err.kind() == RedisErrorKind::ExtensionError {
        let message = match (err.code(), err.detail()) {
            (Some(code), Some(detail)) => format!("{code} {detail}"),
            (Some(code), None) => code.to_string(),
            _ => err.to_string(),
        };
        if message == ROOT_MUST_EXIST {
            return CacheError::BadRequest(message);
        }
        if message.starts_with("ERR Path") && message.ends_with("does not exist") {
            return CacheError::NotFound(message);
        }
        return CacheError::Internal(message);
    }
    CacheError::Internal(err.to_string())
}

fn decode(text: Option<String>) -> CacheResult<Option<Value>> {
    text.map(|t| serde_json::from_str(&t).map_err(CacheError::from))
        .transpose()
}

fn expiry_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl CacheAdapter for RedisAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let key_str = self.make_key(key);
        let text: Option<String> = self.with_conn(|conn| redis::cmd("GET").arg(&key_str).query(conn))?;
        decode(text)
    }

    fn put(&self, key: &str, ttl: Option<Duration>, value: Value) -> CacheResult<()> {
        if value.is_null() {
            return self.delete(key);
        }
        let key_str = self.make_key(key);
        let json_str = serde_json::to_string(&value)?;

        self.with_conn(|conn| match ttl {
            Some(ttl) => redis::cmd("SETEX")
                .arg(&key_str)
                .arg(expiry_seconds(ttl))
                .arg(&json_str)
                .query::<()>(conn),
            None => redis::cmd("SET").arg(&key_str).arg(&json_str).query::<()>(conn),
        })
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        let key_str = self.make_key(key);
        self.with_conn(|conn| redis::cmd("DEL").arg(&key_str).query::<()>(conn))
    }

    fn as_hash(&self) -> Option<&dyn HashCommands> {
        Some(self)
    }

    fn as_json(&self) -> Option<&dyn JsonCommands> {
        Some(self)
    }
}

impl HashCommands for RedisAdapter {
    fn hash_get(&self, key: &str, field: &str) -> CacheResult<Option<Value>> {
        let key_str = self.make_key(key);
        let text: Option<String> =
            self.with_conn(|conn| redis::cmd("HGET").arg(&key_str).arg(field).query(conn))?;
        decode(text)
    }

    fn hash_get_all(&self, key: &str) -> CacheResult<BTreeMap<String, Value>> {
        let key_str = self.make_key(key);
        let raw: HashMap<String, String> =
            self.with_conn(|conn| redis::cmd("HGETALL").arg(&key_str).query(conn))?;
        raw.into_iter()
            .map(|(field, text)| -> CacheResult<(String, Value)> {
                Ok((field, serde_json::from_str(&text)?))
            })
            .collect()
    }

    fn hash_get_many(&self, requests: &[(String, Vec<String>)]) -> CacheResult<Vec<Vec<Option<Value>>>> {
        let mut pipe = redis::pipe();
        let mut queued = 0usize;
        for (key, fields) in requests.iter().filter(|(_, fields)| !fields.is_empty()) {
            pipe.cmd("HMGET").arg(self.make_key(key)).arg(fields);
            queued += 1;
        }
        let mut replies: Vec<Vec<Option<String>>> = if queued > 0 {
            self.with_conn(|conn| pipe.query(conn))?
        } else {
            Vec::new()
        };
        replies.reverse();

        let mut results = Vec::with_capacity(requests.len());
        for (_, fields) in requests {
            if fields.is_empty() {
                results.push(Vec::new());
                continue;
            }
            let reply = replies.pop().unwrap_or_default();
            results.push(reply.into_iter().map(decode).collect::<CacheResult<Vec<_>>>()?);
        }
        Ok(results)
    }

    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> CacheResult<HashWrite> {
        let group = [(key.to_string(), vec![(field.to_string(), value)])];
        let mut writes = self.hash_set_many(&group, ttl)?;
        Ok(writes.pop().unwrap_or(HashWrite {
            new_fields: 0,
            ttl_acknowledged: ttl.is_some(),
        }))
    }

    fn hash_set_many(
        &self,
        groups: &[(String, Vec<(String, Value)>)],
        ttl: Option<Duration>,
    ) -> CacheResult<Vec<HashWrite>> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        let mut queued = 0usize;
        for (key, pairs) in groups.iter().filter(|(_, pairs)| !pairs.is_empty()) {
            let key_str = self.make_key(key);
            let mut encoded = Vec::with_capacity(pairs.len());
            for (field, value) in pairs {
                encoded.push((field.as_str(), serde_json::to_string(value)?));
            }
            pipe.cmd("HSET").arg(&key_str).arg(encoded);
            if let Some(ttl) = ttl {
                pipe.cmd("EXPIRE").arg(&key_str).arg(expiry_seconds(ttl)).ignore();
            }
            queued += 1;
        }
        let mut counts: Vec<usize> = if queued > 0 {
            self.with_conn(|conn| pipe.query(conn))?
        } else {
            Vec::new()
        };
        counts.reverse();

        Ok(groups
            .iter()
            .map(|(_, pairs)| HashWrite {
                new_fields: if pairs.is_empty() { 0 } else { counts.pop().unwrap_or(0) },
                ttl_acknowledged: ttl.is_some(),
            })
            .collect())
    }

    fn hash_delete(&self, key: &str, field: &str) -> CacheResult<usize> {
        let key_str = self.make_key(key);
        self.with_conn(|conn| redis::cmd("HDEL").arg(&key_str).arg(field).query(conn))
    }

    fn hash_values(&self, key: &str) -> CacheResult<Vec<Value>> {
        let key_str = self.make_key(key);
        let raw: Vec<String> = self.with_conn(|conn| redis::cmd("HVALS").arg(&key_str).query(conn))?;
        raw.iter()
            .map(|text| serde_json::from_str(text).map_err(CacheError::from))
            .collect()
    }
}

impl JsonCommands for RedisAdapter {
    fn json_get(&self, key: &str, path: &JsonPath) -> CacheResult<Option<Value>> {
        let key_str = self.make_key(key);
        let text: Option<String> = self.with_conn(|conn| {
            redis::cmd("JSON.GET").arg(&key_str).arg(path.to_wire()).query(conn)
        })?;
        decode(text)
    }

    fn json_set(&self, key: &str, path: &JsonPath, value: Value) -> CacheResult<SetStatus> {
        let key_str = self.make_key(key);
        let json_str = serde_json::to_string(&value)?;
        let reply: Option<String> = self.with_conn(|conn| {
            redis::cmd("JSON.SET")
                .arg(&key_str)
                .arg(path.to_wire())
                .arg(&json_str)
                .query(conn)
        })?;
        Ok(match reply {
            Some(_) => SetStatus::Written,
            None => SetStatus::ParentMissing,
        })
    }

    fn json_delete(&self, key: &str, path: &JsonPath) -> CacheResult<usize> {
        let key_str = self.make_key(key);
        self.with_conn(|conn| redis::cmd("JSON.DEL").arg(&key_str).arg(path.to_wire()).query(conn))
    }

    fn json_incr(&self, key: &str, path: &JsonPath, delta: Value) -> CacheResult<Value> {
        if !delta.is_number() {
            return Err(CacheError::BadRequest(format!("ERR increment value must be a number, got {delta}")));
        }
        let key_str = self.make_key(key);
        let text: String = self.with_conn(|conn| {
            redis::cmd("JSON.NUMINCRBY")
                .arg(&key_str)
                .arg(path.to_wire())
                .arg(delta.to_string())
                .query(conn)
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    fn json_clear(&self, key: &str, path: &JsonPath) -> CacheResult<usize> {
        let key_str = self.make_key(key);
        self.with_conn(|conn| redis::cmd("JSON.CLEAR").arg(&key_str).arg(path.to_wire()).query(conn))
    }

    fn json_array_append(&self, key: &str, path: &JsonPath, values: Vec<Value>) -> CacheResult<usize> {
        let key_str = self.make_key(key);
        let mut encoded = Vec::with_capacity(values.len());
        for value in &values {
            encoded.push(serde_json::to_string(value)?);
        }
        self.with_conn(|conn| {
            redis::cmd("JSON.ARRAPPEND")
                .arg(&key_str)
                .arg(path.to_wire())
                .arg(&encoded)
                .query(conn)
        })
    }
}

impl std::fmt::Debug for RedisAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisAdapter")
            .field("key_prefix", &self.key_prefix)
            .field("pool_size", &self.pool.max_size())
            .finish()
    }
}
