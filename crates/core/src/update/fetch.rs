use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{config::HttpConfig, error::FetchError};

/// Bytes buffered before each write to the staging file.
pub const CHUNK_SIZE: usize = 128 * 1024;

/// Downloads an archive to a local file.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Stream `url` into `destination`, calling `progress` with non-decreasing percentages.
    ///
    /// A partially written `destination` is left behind on failure.
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<(), FetchError>;
}

/// [`ArchiveSource`] backed by a reqwest client.
///
/// Only connecting and silence are bounded; a slow but steady download runs to completion.
#[derive(Debug, Clone)]
pub struct HttpArchiveSource {
    client: reqwest::Client,
    stall: Duration,
}

impl HttpArchiveSource {
    /// Build a client with the configured timeouts.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            stall: Duration::from_secs(config.stall_timeout_secs),
        })
    }
}

#[async_trait]
impl ArchiveSource for HttpArchiveSource {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<(), FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let io = |source| FetchError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let stalled = || FetchError::Stalled {
            url: url.to_string(),
            idle: self.stall,
        };

        let mut response = timeout(self.stall, self.client.get(url).send())
            .await
            .map_err(|_| stalled())?
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let total = response.content_length().filter(|len| *len > 0);
        match total {
            Some(total) => info!(url, bytes = total, "downloading archive"),
            None => warn!(url, "archive size unknown, progress unavailable"),
        }

        let file = File::create(destination).await.map_err(io)?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
        let mut read: u64 = 0;

        while let Some(chunk) = timeout(self.stall, response.chunk())
            .await
            .map_err(|_| stalled())?
            .map_err(transport)?
        {
            writer.write_all(&chunk).await.map_err(io)?;
            read += chunk.len() as u64;
            if let Some(total) = total {
                progress(percent(read, total));
            }
        }
        writer.flush().await.map_err(io)?;

        debug!(url, bytes = read, path = %destination.display(), "archive downloaded");
        Ok(())
    }
}

/// `floor(100 * read / total)`, clamped to 100.
fn percent(read: u64, total: u64) -> u8 {
    let value = u128::from(read) * 100 / u128::from(total);
    value.min(100) as u8
}
