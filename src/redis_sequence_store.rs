use async_trait::async_trait;
use redis::{AsyncCommands, Client, ErrorKind, RedisError, Script};
use tracing::debug;

use crate::error::IdentifierError;
use crate::family::SequenceKey;
use crate::sequence_store::SequenceStore;

// Compares canonical decimal strings so counters above 2^53 keep full
// precision inside Lua.
const ADVANCE_TO_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1]) or '0'
local floor = ARGV[1]
if string.len(floor) > string.len(current)
    or (string.len(floor) == string.len(current) and floor > current) then
    redis.call('SET', KEYS[1], floor)
    return floor
end
return current
";

/// Redis integers are signed 64-bit; INCR refuses to go past this.
const REDIS_COUNTER_MAX: u64 = i64::MAX as u64;

/// Counters kept as Redis integers under `seq:<family>[:<type code>]`.
pub struct RedisSequenceStore {
    redis_client: Client,
    advance_script: Script,
}

impl RedisSequenceStore {
    pub fn new(redis_url: String) -> Result<Self, IdentifierError> {
        let redis_client = Client::open(redis_url)
            .map_err(|e| IdentifierError::StoreRejected(format!("Invalid Redis URL: {}", e)))?;
        Ok(RedisSequenceStore {
            redis_client,
            advance_script: Script::new(ADVANCE_TO_SCRIPT),
        })
    }

    fn redis_key(key: &SequenceKey) -> String {
        format!("seq:{}", key)
    }
}

fn incr_error(key: &SequenceKey, err: RedisError) -> IdentifierError {
    let overflowed = err.kind() == ErrorKind::ResponseError
        && err.detail().map_or(false, |d| d.contains("would overflow"));
    if overflowed {
        IdentifierError::CounterOverflow {
            key: *key,
            counter: REDIS_COUNTER_MAX,
        }
    } else {
        err.into()
    }
}

#[async_trait]
impl SequenceStore for RedisSequenceStore {
    async fn next(&self, key: &SequenceKey) -> Result<u64, IdentifierError> {
        // INCR is atomic on the server, so concurrent callers on any number of
        // processes always observe distinct values.
        let mut conn = self.redis_client.get_async_connection().await?;
        let next_sequence: u64 = conn
            .incr(Self::redis_key(key), 1u64)
            .await
            .map_err(|e| incr_error(key, e))?;
        debug!(%key, next_sequence, "reserved sequence value");
        Ok(next_sequence)
    }

    async fn current(&self, key: &SequenceKey) -> Result<u64, IdentifierError> {
        let mut conn = self.redis_client.get_async_connection().await?;
        let value: Option<u64> = conn.get(Self::redis_key(key)).await?;
        Ok(value.unwrap_or(0))
    }

    async fn advance_to(&self, key: &SequenceKey, floor: u64) -> Result<u64, IdentifierError> {
        if floor > REDIS_COUNTER_MAX {
            return Err(IdentifierError::CounterOverflow {
                key: *key,
                counter: floor,
            });
        }
        let mut conn = self.redis_client.get_async_connection().await?;
        let value: u64 = self
            .advance_script
            .key(Self::redis_key(key))
            .arg(floor.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(value)
    }
}
