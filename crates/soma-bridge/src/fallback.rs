//! [`FallbackServer`] – line-delimited JSON command transport over TCP.
//!
//! One JSON object per line in (`{"cmd": "move", "action": "forward"}`), one
//! JSON line back out: either an
//! [`ExecutionResult`][soma_types::ExecutionResult] or
//! `{"error": {"kind", "message"}}`.  The vocabulary is exactly the
//! [`ActionCommand`] set – no perception queries live here; this path exists
//! so a reduced controller can still drive the body when the rich bridge is
//! unreachable, and as an explicit low-level escape hatch.
//!
//! The listener is always up; the degradation controller decides when this
//! transport is the authoritative one.  Commands are validated and
//! serialised by the same executor as bridge traffic.

use std::sync::Arc;

use soma_executor::Executor;
use soma_types::{ActionCommand, SomaError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::server::error_body;

/// Default TCP port for the fallback transport.
pub const DEFAULT_PORT: u16 = 9999;

/// The secondary command transport.
pub struct FallbackServer {
    executor: Arc<Executor>,
    host: String,
    port: u16,
}

impl FallbackServer {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self {
            executor,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }

    /// Override the bind host (builder-style).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Override the bind port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Bind and serve forever.
    pub async fn run(self) -> Result<(), SomaError> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener =
            TcpListener::bind(&addr)
                .await
                .map_err(|e| SomaError::TransportUnreachable {
                    detail: format!("fallback bind {addr}: {e}"),
                })?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener (tests bind to port 0 first).
    pub async fn serve(self, listener: TcpListener) -> Result<(), SomaError> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "fallback transport listening");
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "fallback client connected");
                    let executor = Arc::clone(&self.executor);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, executor).await {
                            warn!(%peer, error = %e, "fallback connection closed");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "fallback accept failed"),
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    executor: Arc<Executor>,
) -> Result<(), std::io::Error> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<ActionCommand>(line) {
            Ok(command) => match executor.execute(command).await {
                Ok(result) => serde_json::to_value(&result)
                    .unwrap_or_else(|e| error_body(&SomaError::Serialization(e.to_string()))),
                Err(e) => error_body(&e),
            },
            Err(e) => error_body(&SomaError::invalid(format!("bad command line: {e}"))),
        };

        let mut payload = reply.to_string().into_bytes();
        payload.push(b'\n');
        write_half.write_all(&payload).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use soma_executor::CommandValidator;
    use soma_hal::SimBody;
    use soma_types::ExecutionResult;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn spawn_fallback(sim: &SimBody) -> std::net::SocketAddr {
        let executor = Arc::new(Executor::new(
            Arc::new(sim.clone()),
            CommandValidator::with_defaults(),
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(FallbackServer::new(executor).serve(listener));
        addr
    }

    async fn roundtrip(addr: std::net::SocketAddr, line: &str) -> serde_json::Value {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(line.as_bytes()).await.unwrap();
        write_half.write_all(b"\n").await.unwrap();

        let mut reply = String::new();
        BufReader::new(read_half)
            .read_line(&mut reply)
            .await
            .unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn move_command_executes_and_replies() {
        let sim = SimBody::new();
        let addr = spawn_fallback(&sim).await;

        let reply = roundtrip(addr, r#"{"cmd":"move","action":"forward","steps":2}"#).await;
        let result: ExecutionResult = serde_json::from_value(reply).unwrap();
        assert!(result.ok);
        assert_eq!(sim.calls(), vec!["perform:forward".to_string()]);
    }

    #[tokio::test]
    async fn ping_works_over_fallback() {
        let sim = SimBody::new();
        let addr = spawn_fallback(&sim).await;

        let reply = roundtrip(addr, r#"{"cmd":"ping"}"#).await;
        assert_eq!(reply["ok"], true);
        assert!(sim.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_command_gets_structured_error_line() {
        let sim = SimBody::new();
        let addr = spawn_fallback(&sim).await;

        let reply = roundtrip(addr, r#"{"cmd":"move","action":"moonwalk"}"#).await;
        assert_eq!(reply["error"]["kind"], "invalid_command");
    }

    #[tokio::test]
    async fn garbage_line_gets_structured_error_line() {
        let sim = SimBody::new();
        let addr = spawn_fallback(&sim).await;

        let reply = roundtrip(addr, "not json").await;
        assert_eq!(reply["error"]["kind"], "invalid_command");
    }

    #[tokio::test]
    async fn multiple_commands_on_one_connection() {
        let sim = SimBody::new();
        let addr = spawn_fallback(&sim).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        for line in [
            r#"{"cmd":"move","action":"sit"}"#,
            r#"{"cmd":"rgb","r":255,"g":0,"b":0}"#,
        ] {
            write_half.write_all(line.as_bytes()).await.unwrap();
            write_half.write_all(b"\n").await.unwrap();
            let mut reply = String::new();
            reader.read_line(&mut reply).await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
            assert_eq!(value["ok"], true, "{line}");
        }
        assert_eq!(
            sim.calls(),
            vec!["perform:sit".to_string(), "rgb:255/0/0".to_string()]
        );
    }
}
