//! Primary provider backed by the yt-dlp executable.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::types::{
    io_error, DownloadOutcome, ProgressSink, ProgressUpdate, Provider, ProviderError,
};
use crate::config::YtDlpConfig;
use crate::error::ErrorKind;

const FILE_MARKER: &str = "TUBELINE_FILE:";
const TITLE_MARKER: &str = "TUBELINE_TITLE:";

/// Keep at most this much of stderr for error messages.
const STDERR_TAIL_BYTES: usize = 8 * 1024;

/// Downloads by spawning `yt-dlp` and following its `--newline` progress output.
pub struct YtDlpProvider {
    config: YtDlpConfig,
}

impl YtDlpProvider {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    /// Full argument list for one invocation.
    ///
    /// `extra_args` come first so a wrapper binary can consume them.
    pub fn build_args(&self, url: &str, dest_dir: &Path) -> Vec<String> {
        let mut args = self.config.extra_args.clone();
        args.extend([
            "--newline".to_string(),
            "--progress".to_string(),
            "--no-simulate".to_string(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            self.config.format.clone(),
            "--merge-output-format".to_string(),
            self.config.merge_output_format.clone(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout_secs.to_string(),
            "-o".to_string(),
            dest_dir.join("%(title)s.%(ext)s").to_string_lossy().into_owned(),
            "--print".to_string(),
            format!("after_move:{}%(title)s", TITLE_MARKER),
            "--print".to_string(),
            format!("after_move:{}%(filepath)s", FILE_MARKER),
        ]);
        if let Some(proxy) = self.config.proxy.as_deref().filter(|p| !p.is_empty()) {
            args.push("--proxy".to_string());
            args.push(proxy.to_string());
        }
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl Provider for YtDlpProvider {
    fn name(&self) -> &str {
        "yt-dlp"
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

        let args = self.build_args(url, dest_dir);
        debug!(binary = %self.config.binary.display(), ?args, "Spawning yt-dlp");

        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProviderError::extraction(format!(
                        "yt-dlp binary not found at {}",
                        self.config.binary.display()
                    ))
                } else {
                    ProviderError::extraction(format!("failed to start yt-dlp: {}", e))
                }
            })?;

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_tail(stderr)));

        let mut file_path: Option<PathBuf> = None;
        let mut title: Option<String> = None;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read yt-dlp output");
                        break;
                    }
                };
                if let Some(path) = line.strip_prefix(FILE_MARKER) {
                    file_path = Some(PathBuf::from(path.trim()));
                } else if let Some(t) = line.strip_prefix(TITLE_MARKER) {
                    title = Some(t.trim().to_string());
                } else if let Some(update) = parse_progress_line(&line) {
                    progress(update);
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ProviderError::extraction(format!("failed to wait for yt-dlp: {}", e)))?;

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            let kind = classify_stderr(&stderr);
            let message = error_message(&stderr)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
            return Err(ProviderError::new(kind, message));
        }

        let file_path = file_path
            .ok_or_else(|| ProviderError::extraction("yt-dlp did not report an output file"))?;
        Ok(DownloadOutcome {
            file_path,
            title: title.filter(|t| !t.is_empty()).unwrap_or_else(|| "video".to_string()),
        })
    }
}

async fn read_tail<R: AsyncRead + Unpin>(reader: R) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut tail = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        tail.push_str(&line);
        tail.push('\n');
        if tail.len() > STDERR_TAIL_BYTES * 2 {
            let mut cut = tail.len() - STDERR_TAIL_BYTES;
            while !tail.is_char_boundary(cut) {
                cut += 1;
            }
            tail.drain(..cut);
        }
    }
    tail
}

/// Parse one `--newline` progress line.
///
/// ```text
/// [download]  42.0% of 10.00MiB at  1.20MiB/s ETA 00:07
/// ```
pub fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    let rest = line.trim().strip_prefix("[download]")?;
    let mut percent = None;
    let mut speed = None;
    let mut eta = None;

    let mut tokens = rest.split_whitespace();
    while let Some(token) = tokens.next() {
        if let Some(value) = token.strip_suffix('%') {
            percent = value.parse::<f32>().ok();
        } else if token == "at" {
            speed = tokens.next().map(str::to_string);
        } else if token == "ETA" {
            eta = tokens.next().map(str::to_string);
        }
    }

    let mut update = ProgressUpdate::new(percent?);
    if let Some(speed) = speed.filter(|s| !s.starts_with("Unknown")) {
        update = update.with_speed(speed);
    }
    if let Some(eta) = eta.filter(|e| !e.starts_with("Unknown")) {
        update = update.with_eta(eta);
    }
    Some(update)
}

/// Map yt-dlp stderr to an error kind.
pub fn classify_stderr(stderr: &str) -> ErrorKind {
    let s = stderr.to_lowercase();
    let has = |phrases: &[&str]| phrases.iter().any(|p| s.contains(p));

    if has(&["http error 429", "too many requests", "quota exceeded", "rate limit"]) {
        ErrorKind::Quota
    } else if has(&[
        "sign in to confirm",
        "sign in to view",
        "login required",
        "use --cookies",
        "http error 403",
        "http error 401",
        "members-only",
    ]) {
        ErrorKind::Auth
    } else if has(&[
        "no space left",
        "disk full",
        "permission denied",
        "read-only file system",
        "unable to open for writing",
        "errno 28",
    ]) {
        ErrorKind::Filesystem
    } else if has(&[
        "timed out",
        "timeout",
        "connection reset",
        "connection refused",
        "connection aborted",
        "network is unreachable",
        "temporary failure in name resolution",
        "name or service not known",
        "getaddrinfo failed",
        "ssl",
        "remote end closed connection",
        "unable to download webpage",
    ]) {
        ErrorKind::Network
    } else {
        ErrorKind::Extraction
    }
}

/// Last `ERROR:` line of stderr, or the last non-empty line.
fn error_message(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find_map(|l| l.strip_prefix("ERROR:"))
        .map(|l| l.trim().to_string())
        .or_else(|| lines.last().map(|l| l.to_string()))
}
