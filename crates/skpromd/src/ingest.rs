//! Signal K TCP ingest. Reads the server's newline-delimited delta stream
//! and publishes each delta on the bus.
//!
//! The connection is retried with exponential backoff until shutdown.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use skprom_core::{Delta, DeltaBus, SignalKConfig};

/// Subscription request for every path of every context.
pub const SUBSCRIBE_ALL: &str = r#"{"context":"*","subscribe":[{"path":"*"}]}"#;

/// Invoked when the server announces itself.
pub type HelloCallback = Arc<dyn Fn(&Hello) + Send + Sync>;

/// First message a Signal K server sends on a new stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hello {
    pub name: Option<String>,
    pub version: Option<String>,
    /// Self context, e.g. `vessels.urn:mrn:imo:mmsi:230099999`.
    #[serde(rename = "self")]
    pub self_context: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Delta { handlers: usize },
    Hello,
    Ignored,
    Malformed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub deltas: u64,
    pub malformed: u64,
}

/// Classify one stream line and act on it.
pub fn handle_line(line: &str, bus: &DeltaBus, on_hello: Option<&HelloCallback>) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Ignored;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "malformed stream line skipped");
            return LineOutcome::Malformed;
        }
    };

    if value.get("updates").is_some() {
        return match serde_json::from_value::<Delta>(value) {
            Ok(delta) => LineOutcome::Delta {
                handlers: bus.publish(&delta),
            },
            Err(e) => {
                warn!(error = %e, "malformed delta skipped");
                LineOutcome::Malformed
            }
        };
    }

    if value.get("self").is_some() || value.get("roles").is_some() {
        return match serde_json::from_value::<Hello>(value) {
            Ok(hello) => {
                info!(
                    server = hello.name.as_deref().unwrap_or("unknown"),
                    version = hello.version.as_deref().unwrap_or("unknown"),
                    self_context = hello.self_context.as_deref().unwrap_or(""),
                    roles = ?hello.roles,
                    "signalk hello received"
                );
                if let Some(callback) = on_hello {
                    callback(&hello);
                }
                LineOutcome::Hello
            }
            Err(e) => {
                warn!(error = %e, "malformed hello skipped");
                LineOutcome::Malformed
            }
        };
    }

    debug!("non-delta message ignored");
    LineOutcome::Ignored
}

/// Feed every line of `reader` through [`handle_line`] until EOF or shutdown.
pub async fn pump_lines<R>(
    reader: R,
    bus: &DeltaBus,
    on_hello: Option<&HelloCallback>,
    shutdown: &mut watch::Receiver<bool>,
) -> std::io::Result<StreamStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = StreamStats::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(stats);
                };
                match handle_line(&line, bus, on_hello) {
                    LineOutcome::Delta { handlers } => {
                        stats.deltas += 1;
                        if handlers == 0 {
                            debug!("delta dropped, no subscribers");
                        }
                    }
                    LineOutcome::Malformed => stats.malformed += 1,
                    LineOutcome::Hello | LineOutcome::Ignored => {}
                }
            }
            _ = shutdown.changed() => return Ok(stats),
        }
    }
}

/// Exponential reconnect delay, reset on every successful connect.
#[derive(Debug, Clone)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial_ms: u64, max_ms: u64) -> Self {
        let initial = Duration::from_millis(initial_ms.max(1));
        let max = Duration::from_millis(max_ms.max(initial_ms.max(1)));
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Long-running client for a Signal K server's TCP stream.
pub struct Ingest {
    address: String,
    subscribe_all: bool,
    backoff: Backoff,
    bus: DeltaBus,
    on_hello: Option<HelloCallback>,
}

impl Ingest {
    pub fn new(config: &SignalKConfig, subscribe_all: bool, bus: DeltaBus) -> Self {
        Self {
            address: config.address.clone(),
            subscribe_all,
            backoff: Backoff::new(config.reconnect_initial_ms, config.reconnect_max_ms),
            bus,
            on_hello: None,
        }
    }

    pub fn with_hello_callback(mut self, callback: HelloCallback) -> Self {
        self.on_hello = Some(callback);
        self
    }

    /// Connect, stream, reconnect; returns once shutdown is signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(address = %self.address, subscribe_all = self.subscribe_all, "signalk ingest started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let connected = tokio::select! {
                result = TcpStream::connect(&self.address) => result,
                _ = shutdown.changed() => break,
            };

            match connected {
                Ok(stream) => {
                    info!(address = %self.address, "connected to signalk stream");
                    self.backoff.reset();
                    match self.stream(stream, &mut shutdown).await {
                        Ok(stats) => info!(
                            deltas = stats.deltas,
                            malformed = stats.malformed,
                            "signalk stream closed"
                        ),
                        Err(e) => warn!(error = %e, "signalk stream failed"),
                    }
                }
                Err(e) => warn!(address = %self.address, error = %e, "signalk connect failed"),
            }

            if *shutdown.borrow() {
                break;
            }
            let delay = self.backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "reconnecting to signalk");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("signalk ingest stopped");
    }

    async fn stream(
        &self,
        stream: TcpStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> std::io::Result<StreamStats> {
        let (read, mut write) = stream.into_split();
        if self.subscribe_all {
            write.write_all(SUBSCRIBE_ALL.as_bytes()).await?;
            write.write_all(b"\n").await?;
            debug!("subscribed to all contexts");
        }
        pump_lines(BufReader::new(read), &self.bus, self.on_hello.as_ref(), shutdown).await
    }
}
