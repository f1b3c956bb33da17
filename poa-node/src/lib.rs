//! Serialized request service over a PoA validator deployment.
//!
//! [`Node`] owns one [`Deployment`] behind a `tokio` mutex. Every request
//! runs to completion under that lock, so the events drained after it are
//! exactly the ones it emitted.

pub mod command;
pub mod config;
pub mod deployment;
pub mod error;

pub use crate::command::{Envelope, Request, Response};
pub use crate::config::{load_config, NodeConfig, StorageBackend, StorageConfig};
pub use crate::deployment::{Deployment, DeploymentStatus};
pub use crate::error::{NodeError, Result};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

pub struct Node {
    deployment: Mutex<Deployment>,
}

/// Counters reported when a request stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub handled: usize,
    pub rejected: usize,
}

impl Node {
    pub fn open(config: &NodeConfig) -> Result<Self> {
        Ok(Self::new(Deployment::open(config)?))
    }

    pub fn new(deployment: Deployment) -> Self {
        Self {
            deployment: Mutex::new(deployment),
        }
    }

    pub async fn handle(&self, envelope: Envelope) -> Response {
        let mut deployment = self.deployment.lock().await;
        let call = envelope.call();
        let query = envelope.request.is_query();
        if query {
            trace!(from = %call.sender, request = ?envelope.request, "Handling query");
        } else {
            debug!(from = %call.sender, request = ?envelope.request, "Handling request");
        }

        match envelope.request.execute(&mut deployment, &call) {
            // Queries leave the event log to the next mutation.
            Ok(result) if query => Response::Ok {
                result,
                events: Vec::new(),
            },
            Ok(result) => Response::Ok {
                result,
                events: deployment.drain_events(),
            },
            Err(err) => {
                // Rejected operations commit nothing, so no events are released.
                let stray = deployment.drain_events();
                if !stray.is_empty() {
                    warn!("Discarding {} events from a rejected request", stray.len());
                }
                Response::from(&err)
            }
        }
    }

    /// Parses one JSON request line and handles it.
    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Envelope>(line) {
            Ok(envelope) => self.handle(envelope).await,
            Err(err) => Response::from(&NodeError::from(err)),
        }
    }

    pub async fn status(&self) -> Result<DeploymentStatus> {
        self.deployment.lock().await.status()
    }

    pub async fn flush(&self) -> Result<()> {
        self.deployment.lock().await.flush()
    }

    /// Answers every non-empty line of `reader` with one JSON line on `writer`.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> anyhow::Result<StreamSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut summary = StreamSummary::default();
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let response = self.handle_line(line).await;
            summary.handled += 1;
            if !response.is_ok() {
                summary.rejected += 1;
            }
            let mut encoded = serde_json::to_vec(&response)?;
            encoded.push(b'\n');
            writer.write_all(&encoded).await?;
            writer.flush().await?;
        }
        self.flush().await?;
        info!(handled = summary.handled, rejected = summary.rejected, "Request stream closed");
        Ok(summary)
    }
}
