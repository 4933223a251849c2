//! Secondary provider backed by a RapidAPI-style REST download endpoint.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::types::{
    io_error, safe_title, DownloadOutcome, ProgressSink, ProgressUpdate, Provider, ProviderError,
};
use crate::config::RestApiConfig;
use crate::validation::video_id;

/// Minimum interval between progress callbacks while streaming.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Downloads by streaming the body of a REST endpoint to disk.
pub struct RestApiProvider {
    client: Client,
    config: RestApiConfig,
    read_timeout: Duration,
}

impl RestApiProvider {
    pub fn new(config: RestApiConfig) -> Result<Self, ProviderError> {
        let read_timeout = Duration::from_secs(config.timeout_secs.max(1) as u64);
        let client = Client::builder()
            .connect_timeout(read_timeout)
            .build()
            .map_err(|e| ProviderError::network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            read_timeout,
        })
    }

    fn extension(&self) -> &str {
        let ext = self.config.format.trim_start_matches('.');
        if ext.is_empty() {
            "mp4"
        } else {
            ext
        }
    }
}

#[async_trait]
impl Provider for RestApiProvider {
    fn name(&self) -> &str {
        "rest-api"
    }

    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: ProgressSink,
    ) -> Result<DownloadOutcome, ProviderError> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| io_error("failed to create download directory", e))?;

        let params = [
            ("url", url),
            ("format", self.config.format.as_str()),
            ("quality", self.config.quality.as_str()),
        ];
        let response = tokio::time::timeout(
            self.read_timeout,
            self.client
                .get(&self.config.url)
                .query(&params)
                .header("X-RapidAPI-Key", &self.config.api_key)
                .header("X-RapidAPI-Host", &self.config.api_host)
                .send(),
        )
        .await
        .map_err(|_| ProviderError::network("request timed out"))?
        .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let title = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(content_disposition_filename)
            .map(|name| file_stem(&name))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| match video_id(url) {
                Some(id) => format!("video_{}", id),
                None => format!("video_{}", chrono::Utc::now().timestamp()),
            });

        let file_path: PathBuf =
            dest_dir.join(format!("{}.{}", safe_title(&title), self.extension()));
        debug!(path = %file_path.display(), "Streaming REST download");

        match stream_to_file(response, &file_path, self.read_timeout, &progress).await {
            Ok(()) => Ok(DownloadOutcome { file_path, title }),
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&file_path).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            path = %file_path.display(),
                            error = %rm,
                            "Failed to remove partial file"
                        );
                    }
                }
                Err(e)
            }
        }
    }
}

async fn stream_to_file(
    mut response: reqwest::Response,
    path: &Path,
    read_timeout: Duration,
    progress: &ProgressSink,
) -> Result<(), ProviderError> {
    let total = response.content_length().filter(|t| *t > 0);
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| io_error("failed to create output file", e))?;

    let started = Instant::now();
    let mut last_report = started;
    let mut downloaded: u64 = 0;

    loop {
        let chunk = tokio::time::timeout(read_timeout, response.chunk())
            .await
            .map_err(|_| ProviderError::network("timed out reading response body"))?
            .map_err(request_error)?;
        let Some(chunk) = chunk else { break };

        file.write_all(&chunk)
            .await
            .map_err(|e| io_error("failed to write output file", e))?;
        downloaded += chunk.len() as u64;

        if last_report.elapsed() >= PROGRESS_INTERVAL {
            last_report = Instant::now();
            progress(progress_update(downloaded, total, started.elapsed()));
        }
    }

    file.flush()
        .await
        .map_err(|e| io_error("failed to flush output file", e))?;

    if let Some(total) = total {
        if downloaded < total {
            return Err(ProviderError::network(format!(
                "body ended early: {} of {} bytes",
                downloaded, total
            )));
        }
    }
    if downloaded == 0 {
        return Err(ProviderError::extraction("empty response body"));
    }

    progress(ProgressUpdate::new(100.0).with_eta("00:00"));
    Ok(())
}

fn progress_update(downloaded: u64, total: Option<u64>, elapsed: Duration) -> ProgressUpdate {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        downloaded as f64 / secs
    } else {
        0.0
    };

    let percent = match total {
        Some(total) => (downloaded as f64 / total as f64 * 100.0).min(100.0) as f32,
        None => 0.0,
    };
    let mut update = ProgressUpdate::new(percent);
    if rate > 0.0 {
        update = update.with_speed(format_speed(rate));
        if let Some(total) = total {
            let remaining = total.saturating_sub(downloaded) as f64 / rate;
            update = update.with_eta(format_eta(remaining as u64));
        }
    }
    update
}

fn request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::network(format!("request timed out: {}", e))
    } else if e.is_connect() {
        ProviderError::network(format!("connection failed: {}", e))
    } else if e.is_decode() || e.is_builder() {
        ProviderError::extraction(e.to_string())
    } else {
        ProviderError::network(e.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> ProviderError {
    let snippet: String = body.chars().take(200).collect();
    let message = if snippet.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, snippet.trim())
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::auth(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::quota(message),
        s if s.is_server_error() => ProviderError::network(message),
        _ => ProviderError::extraction(message),
    }
}

/// Extract the filename from a `Content-Disposition` header value.
///
/// `filename*=UTF-8''...` wins over a plain `filename=`.
pub fn content_disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;
    for part in value.split(';').map(str::trim) {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = raw.trim().trim_matches('"');
                let encoded = encoded
                    .split_once("''")
                    .map(|(_, rest)| rest)
                    .unwrap_or(encoded);
                if let Ok(decoded) = urlencoding::decode(encoded) {
                    return Some(decoded.into_owned());
                }
            }
            "filename" => {
                let name = raw.trim().trim_matches('"');
                if !name.is_empty() {
                    plain = Some(name.to_string());
                }
            }
            _ => {}
        }
    }
    plain
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Human readable transfer rate, e.g. `1.20MiB/s`.
pub fn format_speed(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KiB/s", "MiB/s", "GiB/s"];
    let mut value = bytes_per_sec;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2}{}", value, UNITS[unit])
}

/// `MM:SS`, or `H:MM:SS` past an hour.
pub fn format_eta(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}
