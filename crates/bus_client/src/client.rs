//! Redis list client used as the relay's backend bus.

use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info};

/// Default list key publishers push envelopes onto.
pub const DEFAULT_QUEUE: &str = "ultralist";

/// Server-side timeout for a single `BLPOP`, in seconds.
///
/// `pop` loops over this, so callers still see an unbounded blocking pull.
pub const POP_TIMEOUT_SECS: f64 = 5.0;

/// Wrapper around a Redis connection that consumes one list.
#[derive(Clone)]
pub struct RedisBus {
    conn: MultiplexedConnection,
    queue: String,
}

impl RedisBus {
    /// Connect to Redis and verify the server answers `PING`.
    pub async fn connect(url: &str, queue: impl Into<String>) -> Result<Self> {
        info!("Connecting to Redis at {}", url);
        let client = redis::Client::open(url).with_context(|| format!("invalid Redis URL '{}'", url))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .with_context(|| format!("failed to connect to Redis at {}", url))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis did not answer PING")?;
        debug!("Redis replied {}", pong);

        Ok(Self {
            conn,
            queue: queue.into(),
        })
    }

    /// The list key this client consumes.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Block until a payload is available on the queue and return it.
    pub async fn pop(&mut self) -> Result<String> {
        loop {
            let popped: Option<(String, String)> =
                self.conn.blpop(&self.queue, POP_TIMEOUT_SECS).await?;
            if let Some((_key, payload)) = popped {
                return Ok(payload);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queue() {
        assert_eq!(DEFAULT_QUEUE, "ultralist");
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let result = RedisBus::connect("not-a-redis-url", DEFAULT_QUEUE).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_fails_fast_when_unreachable() {
        // Grab a free port, then release it so nothing is listening there.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("redis://127.0.0.1:{}/", port);

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            RedisBus::connect(&url, DEFAULT_QUEUE),
        )
        .await
        .expect("connect should not hang");

        let err = result.err().expect("connect must fail");
        assert!(format!("{:#}", err).contains(&url));
    }
}
