//! JSONL sink and report export for `quotascope`.
//! Always writes; bring your own path.

use chrono::NaiveDate;
use quotascope::telemetry::{event_to_json, FetchEvent, TelemetrySink};
use quotascope::{Quota, QuotaResponse};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Appends one JSON object per fetch event to `path`.
#[derive(Clone, Debug)]
pub struct JsonlSink {
    path: String,
}

impl JsonlSink {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self { path: path.into() }
    }
}

impl tower_service::Service<FetchEvent> for JsonlSink {
    type Response = ();
    type Error = io::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: FetchEvent) -> Self::Future {
        let path = self.path.clone();
        let line = event_to_json(&event).to_string() + "\n";
        Box::pin(async move { append(&path, line.as_bytes()).await })
    }
}

impl TelemetrySink for JsonlSink {
    type SinkError = io::Error;
}

/// Output format of an exported report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// One pretty-printed JSON document.
    Json,
    /// One quota per line.
    Jsonl,
}

impl ReportKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportKind::Json => "json",
            ReportKind::Jsonl => "jsonl",
        }
    }
}

/// Dated file name for a report, e.g. `quotas-2026-10-18.json`.
pub fn report_file_name(kind: ReportKind, date: NaiveDate) -> String {
    format!("quotas-{}.{}", date.format("%Y-%m-%d"), kind.extension())
}

/// Write `response` to `path` as a pretty JSON document, replacing any existing file.
pub async fn write_report(path: impl AsRef<Path>, response: &QuotaResponse) -> io::Result<()> {
    let path = path.as_ref();
    let mut body = serde_json::to_vec_pretty(response)?;
    body.push(b'\n');
    tokio::fs::write(path, body).await?;
    debug!(path = %path.display(), quotas = response.total, "wrote quota report");
    Ok(())
}

/// Write `quotas` to `path`, one JSON object per line, replacing any existing file.
pub async fn write_quota_lines(path: impl AsRef<Path>, quotas: &[Quota]) -> io::Result<()> {
    let path = path.as_ref();
    let mut body = Vec::new();
    for quota in quotas {
        serde_json::to_writer(&mut body, quota)?;
        body.push(b'\n');
    }
    tokio::fs::write(path, body).await?;
    debug!(path = %path.display(), quotas = quotas.len(), "wrote quota lines");
    Ok(())
}

async fn append(path: &str, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}
