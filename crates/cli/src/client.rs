use std::path::Path;

use anyhow::{Context, bail};
use chargecap_core::limiter::LimiterStatus;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

/// Line-protocol client for the chargecapd control socket.
pub struct CtlClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl CtlClient {
    pub async fn connect(path: &Path) -> anyhow::Result<Self> {
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("connecting to {} (is chargecapd running?)", path.display()))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Send one request line, return the reply line. `err ...` replies
    /// become errors.
    pub async fn request(&mut self, line: &str) -> anyhow::Result<String> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        let mut reply = String::new();
        let n = self.reader.read_line(&mut reply).await?;
        if n == 0 {
            bail!("daemon closed the connection");
        }
        let reply = reply.trim_end();
        tracing::debug!(request = line, reply, "ctl round trip");
        if let Some(msg) = reply.strip_prefix("err ") {
            bail!("daemon: {msg}");
        }
        Ok(reply.to_owned())
    }

    pub async fn get(&mut self, param: &str) -> anyhow::Result<String> {
        self.request(&format!("get {param}")).await
    }

    pub async fn set(&mut self, param: &str, value: &str) -> anyhow::Result<()> {
        self.request(&format!("set {param} {value}")).await?;
        Ok(())
    }

    pub async fn status(&mut self) -> anyhow::Result<LimiterStatus> {
        let reply = self.request("status").await?;
        serde_json::from_str(&reply).context("malformed status reply")
    }
}
