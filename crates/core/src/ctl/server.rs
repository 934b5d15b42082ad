//! Control socket server.
//!
//! One Unix listener, one task per accepted connection. Connections are
//! independent; writes serialize through the limiter's own locking.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::ctl::params::ParamStore;
use crate::ctl::protocol::{self, Request};
use crate::limiter::Limiter;

pub struct CtlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl CtlServer {
    /// Bind the control socket, replacing a stale socket file if present.
    pub fn bind(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("removing stale socket {}", path.display()))?;
        }
        let listener = UnixListener::bind(&path)
            .with_context(|| format!("binding control socket {}", path.display()))?;
        tracing::info!(path = %path.display(), "control socket bound");
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until the token is cancelled, then remove the
    /// socket file.
    pub async fn serve(&self, limiter: Arc<Limiter>, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let limiter = limiter.clone();
                            let conn_token = token.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, limiter, conn_token).await {
                                    tracing::debug!(error = %e, "control connection closed with error");
                                }
                            });
                        }
                        Err(e) => tracing::warn!(error = %e, "control socket accept failed"),
                    }
                }
            }
        }
        let _ = std::fs::remove_file(&self.path);
        tracing::info!("control socket closed");
    }
}

async fn handle_connection(
    stream: UnixStream,
    limiter: Arc<Limiter>,
    token: CancellationToken,
) -> std::io::Result<()> {
    let params = ParamStore::new(limiter.clone());
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match protocol::parse(&line) {
            Ok(Request::Get(param)) => match params.show(&param).await {
                Ok(value) => format!("{value}\n"),
                Err(e) => protocol::error_line(&e),
            },
            Ok(Request::Set { param, value }) => match params.store(&param, &value).await {
                Ok(()) => "ok\n".to_owned(),
                Err(e) => protocol::error_line(&e),
            },
            Ok(Request::Status) => match serde_json::to_string(&limiter.status()) {
                Ok(json) => format!("{json}\n"),
                Err(e) => {
                    tracing::warn!(error = %e, "status serialization failed");
                    "err internal\n".to_owned()
                }
            },
            Err(e) => protocol::error_line(&e),
        };
        writer.write_all(reply.as_bytes()).await?;
    }
    Ok(())
}
