//! Streaming downloads with progress reporting.
//!
//! Provides:
//! - download into a file, created lazily on the first received byte
//! - download into memory
//! - removal of partially written files on any non-success outcome

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    retry::cancellable,
    transport::{FragmentSink, HttpRequest, HttpResponse, TerminalState, Transport},
    HttpMethod, NetworkConfig, NetworkError, Result,
};

/// Progress snapshot passed to download callbacks after each fragment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DownloadProgress {
    /// Bytes received so far.
    pub downloaded: u64,
    /// Total size announced by the server, if any.
    pub total: Option<u64>,
}

/// Runs download exchanges with the configured download timeout and no caching.
#[derive(Clone)]
pub struct DownloadManager {
    transport: Arc<dyn Transport>,
    config: Arc<NetworkConfig>,
    cancel: Option<CancellationToken>,
}

impl fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadManager")
            .field("timeout_ms", &self.config.download_timeout_ms)
            .field("download_root", &self.config.download_root)
            .finish()
    }
}

impl DownloadManager {
    pub fn new(transport: Arc<dyn Transport>, config: Arc<NetworkConfig>) -> Self {
        Self {
            transport,
            config,
            cancel: None,
        }
    }

    /// Aborts downloads started from this manager when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Streams `address` into `path` and returns the number of bytes written.
    ///
    /// Relative paths resolve against [`NetworkConfig::download_root`]. On any
    /// failure the partially written file is removed before returning.
    pub async fn download_to_file<F>(
        &self,
        address: &str,
        path: impl AsRef<Path>,
        on_progress: F,
    ) -> Result<u64>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let path = self.config.download_path(path);
        let mut sink = FileSink::new(path.clone(), on_progress);

        let outcome = cancellable(
            self.transport.stream(self.request(address), &mut sink),
            self.cancel.as_ref(),
        )
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                sink.discard().await;
                info!(%address, path = %path.display(), "download cancelled");
                return Err(err);
            }
        };

        if response.is_success() {
            return match sink.finish().await {
                Ok(bytes) => {
                    info!(%address, path = %path.display(), bytes, "download done");
                    Ok(bytes)
                }
                Err(source) => {
                    sink.discard().await;
                    Err(NetworkError::Io { path, source })
                }
            };
        }

        let write_error = sink.error.take();
        sink.discard().await;
        if let Some(source) = write_error {
            error!(%address, path = %path.display(), error = %source, "download write failed");
            return Err(NetworkError::Io { path, source });
        }
        Err(download_failure(address, &response))
    }

    /// Streams `address` into memory, appending every fragment.
    pub async fn download_to_memory<F>(&self, address: &str, on_progress: F) -> Result<Vec<u8>>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let mut sink = MemorySink {
            buffer: Vec::new(),
            on_progress,
        };

        let response = cancellable(
            self.transport.stream(self.request(address), &mut sink),
            self.cancel.as_ref(),
        )
        .await?;

        if response.is_success() {
            info!(%address, bytes = sink.buffer.len(), "download done");
            return Ok(sink.buffer);
        }
        Err(download_failure(address, &response))
    }

    fn request(&self, address: &str) -> HttpRequest {
        let mut request =
            HttpRequest::new(HttpMethod::Get, address).timeout(self.config.download_timeout());
        request.disable_cache = true;
        request
    }
}

fn download_failure(address: &str, response: &HttpResponse) -> NetworkError {
    if response.status != 0 && response.state == TerminalState::Finished {
        let body = response.body_text();
        warn!(
            %address,
            status = response.status,
            %body,
            "download finished but server sent an error"
        );
        return NetworkError::Http {
            status: response.status,
            body,
        };
    }

    let kind = response.state.fault_kind();
    error!(%address, %kind, error = %response.message, "download failed");
    NetworkError::TransportFault {
        uri: address.to_owned(),
        kind,
        message: response.message.clone(),
    }
}

struct FileSink<F> {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    created: bool,
    downloaded: u64,
    error: Option<io::Error>,
    on_progress: F,
}

impl<F> FileSink<F> {
    fn new(path: PathBuf, on_progress: F) -> Self {
        Self {
            path,
            file: None,
            created: false,
            downloaded: 0,
            error: None,
            on_progress,
        }
    }

    async fn open(&mut self) -> io::Result<BufWriter<File>> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        // Set before the create so a cancelled open is still removed.
        self.created = true;
        let file = File::create(&self.path).await?;
        Ok(BufWriter::new(file))
    }

    async fn write(&mut self, fragment: &[u8]) -> io::Result<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => self.open().await?,
        };
        self.file.insert(file).write_all(fragment).await
    }

    /// Flushes and closes the file. A body with no bytes still leaves an empty file.
    async fn finish(&mut self) -> io::Result<u64> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None if !self.created => self.open().await?,
            None => return Ok(self.downloaded),
        };
        file.flush().await?;
        file.get_ref().sync_all().await?;
        Ok(self.downloaded)
    }

    /// Closes and deletes whatever this sink wrote.
    async fn discard(&mut self) {
        self.file = None;
        if self.created {
            if let Err(err) = fs::remove_file(&self.path).await {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %err, "could not remove partial download");
                }
            }
            self.created = false;
        }
    }
}

#[async_trait]
impl<F> FragmentSink for FileSink<F>
where
    F: FnMut(DownloadProgress) + Send,
{
    async fn on_fragment(&mut self, fragment: &[u8], total: Option<u64>) -> io::Result<()> {
        if fragment.is_empty() {
            return Ok(());
        }
        if let Err(err) = self.write(fragment).await {
            let relay = io::Error::new(err.kind(), err.to_string());
            self.error = Some(err);
            return Err(relay);
        }
        self.downloaded += fragment.len() as u64;
        (self.on_progress)(DownloadProgress {
            downloaded: self.downloaded,
            total,
        });
        Ok(())
    }
}

struct MemorySink<F> {
    buffer: Vec<u8>,
    on_progress: F,
}

#[async_trait]
impl<F> FragmentSink for MemorySink<F>
where
    F: FnMut(DownloadProgress) + Send,
{
    async fn on_fragment(&mut self, fragment: &[u8], total: Option<u64>) -> io::Result<()> {
        self.buffer.extend_from_slice(fragment);
        (self.on_progress)(DownloadProgress {
            downloaded: self.buffer.len() as u64,
            total,
        });
        Ok(())
    }
}
