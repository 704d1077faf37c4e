use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{FetchError, Result};
use crate::http::HttpClient;

/// Streams release assets to disk.
///
/// The body is written to `<target>.part` and renamed over `target` only
/// once the stream has completed, so the final path never holds a partial
/// file.
pub struct Downloader<C> {
    http: C,
    user_agent: String,
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

impl<C: HttpClient> Downloader<C> {
    pub fn new(http: C, user_agent: impl Into<String>) -> Self {
        Self {
            http,
            user_agent: user_agent.into(),
        }
    }

    /// Downloads `url` into `target`, creating parent directories. Returns
    /// the number of bytes written.
    pub async fn download(&self, url: &str, target: &Path, cancel: &CancellationToken) -> Result<u64> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(parent, e))?;
        }

        let headers = vec![
            ("User-Agent".to_string(), self.user_agent.clone()),
            ("Accept".to_string(), "application/octet-stream".to_string()),
        ];
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            response = self.http.stream(url, &headers) => response.map_err(FetchError::network)?,
        };
        if !(200..300).contains(&response.status) {
            return Err(FetchError::Status {
                status: response.status,
                url: url.to_string(),
            });
        }

        let part = part_path(target);
        let written = match self.write_part(&part, response.body, cancel).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&part).await;
                return Err(err);
            }
        };

        fs::rename(&part, target)
            .await
            .map_err(|e| FetchError::io(target, e))?;
        info!(url, path = %target.display(), bytes = written, "download complete");
        Ok(written)
    }

    async fn write_part(
        &self,
        part: &Path,
        mut body: crate::http::BoxStream<'static, std::result::Result<bytes::Bytes, C::Error>>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut file = fs::File::create(part)
            .await
            .map_err(|e| FetchError::io(part, e))?;
        let mut written = 0u64;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    file.write_all(&bytes)
                        .await
                        .map_err(|e| FetchError::io(part, e))?;
                    written += bytes.len() as u64;
                }
                Some(Err(err)) => return Err(FetchError::network(err)),
                None => break,
            }
        }

        file.flush().await.map_err(|e| FetchError::io(part, e))?;
        file.sync_all().await.map_err(|e| FetchError::io(part, e))?;
        debug!(path = %part.display(), bytes = written, "staged download");
        Ok(written)
    }
}
