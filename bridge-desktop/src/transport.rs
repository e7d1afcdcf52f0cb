//! Download Transport Implementation using Reqwest

use bridge_traits::{
    error::{BridgeError, Result},
    transport::{DownloadRequest, DownloadTransport, TransportEvent, TransportEventSender},
};
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle time after which a stalled transfer is failed.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Reqwest-based download transport
///
/// Each request runs as its own task on the runtime captured at construction:
/// - the body is streamed chunk by chunk into `<staging_dir>/<uuid>.part`
/// - a `Progress` event is sent after every chunk
/// - `Completed` hands the temporary file over to the core
/// - `SessionDrained` is sent whenever the last in-flight transfer ends
pub struct ReqwestTransport {
    client: Client,
    staging_dir: PathBuf,
    runtime: Handle,
    in_flight: Arc<AtomicUsize>,
}

impl ReqwestTransport {
    /// Create a transport with the default client configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(staging_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_read_timeout(staging_dir, DEFAULT_READ_TIMEOUT)
    }

    /// Create a transport that fails a transfer once the server sends nothing
    /// for `read_timeout`.
    ///
    /// The timeout applies per read, not to the whole transfer, so large
    /// downloads on slow links are not cut off while data keeps arriving.
    pub fn with_read_timeout(staging_dir: impl Into<PathBuf>, read_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(read_timeout)
            .pool_max_idle_per_host(4)
            .user_agent(concat!("media-cache-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e)))?;

        Self::with_client(client, staging_dir)
    }

    /// Create a transport around a preconfigured client.
    pub fn with_client(client: Client, staging_dir: impl Into<PathBuf>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            BridgeError::NotAvailable(
                "ReqwestTransport requires a running Tokio runtime".to_string(),
            )
        })?;

        Ok(Self {
            client,
            staging_dir: staging_dir.into(),
            runtime,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn temp_path(&self) -> PathBuf {
        self.staging_dir.join(format!("{}.part", Uuid::new_v4()))
    }
}

impl DownloadTransport for ReqwestTransport {
    fn begin_download(&self, request: DownloadRequest, events: TransportEventSender) -> Result<()> {
        let client = self.client.clone();
        let temp_path = self.temp_path();
        let in_flight = Arc::clone(&self.in_flight);

        in_flight.fetch_add(1, Ordering::SeqCst);
        debug!(id = %request.id, url = %request.url, "Scheduling download");

        self.runtime.spawn(async move {
            let DownloadRequest { id, url } = request.clone();

            let event = match stream_to_file(&client, &request, &temp_path, &events).await {
                Ok(bytes) => {
                    info!(id = %id, bytes, "Download finished");
                    TransportEvent::Completed {
                        id,
                        url,
                        temp_path: temp_path.clone(),
                    }
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Download failed");
                    let _ = fs::remove_file(&temp_path).await;
                    TransportEvent::Failed {
                        id,
                        url,
                        error: e.to_string(),
                    }
                }
            };

            let completed = matches!(event, TransportEvent::Completed { .. });
            if events.send(event).is_err() {
                debug!(id = %id, "Event channel closed, discarding result");
                if completed {
                    let _ = fs::remove_file(&temp_path).await;
                }
            }

            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                debug!("All transfers finished");
                let _ = events.send(TransportEvent::SessionDrained);
            }
        });

        Ok(())
    }

    fn in_flight(&self) -> Option<usize> {
        Some(self.in_flight.load(Ordering::SeqCst))
    }
}

/// Stream the response body for `request` into `temp_path`.
///
/// Returns the number of bytes written.
async fn stream_to_file(
    client: &Client,
    request: &DownloadRequest,
    temp_path: &Path,
    events: &TransportEventSender,
) -> Result<i64> {
    let response = client
        .get(request.url.clone())
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                BridgeError::OperationFailed("Request timed out".to_string())
            } else if e.is_connect() {
                BridgeError::OperationFailed(format!("Connection failed: {}", e))
            } else {
                BridgeError::OperationFailed(e.to_string())
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(BridgeError::OperationFailed(format!(
            "HTTP error: {}",
            status
        )));
    }

    let bytes_expected = response
        .content_length()
        .and_then(|len| i64::try_from(len).ok())
        .unwrap_or(-1);

    if let Some(parent) = temp_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::File::create(temp_path).await?;

    let mut bytes_written: i64 = 0;
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                BridgeError::OperationFailed("Transfer stalled: read timed out".to_string())
            } else {
                BridgeError::OperationFailed(e.to_string())
            }
        })?;
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as i64;

        events.send(TransportEvent::Progress {
            id: request.id,
            url: request.url.clone(),
            bytes_written,
            bytes_expected,
        })?;
    }

    file.flush().await?;
    file.sync_all().await?;

    Ok(bytes_written)
}
