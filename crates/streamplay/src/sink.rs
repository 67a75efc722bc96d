use std::{sync::Mutex, time::Duration};

use chrono::{DateTime, Utc};
use url::Url;

/// One reported manifest or segment attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    pub uri: Url,
    pub success: bool,
    /// HTTP status, `None` when the request never produced a response.
    pub status: Option<u16>,
    pub message: Option<String>,
    pub bytes: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl SampleResult {
    pub fn failure(uri: Url, message: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            uri,
            success: false,
            status: None,
            message: Some(message.into()),
            bytes: 0,
            started_at,
            elapsed: Duration::ZERO,
        }
    }
}

/// Receives every attempt exactly once.
pub trait ResultSink: Send + Sync {
    fn record(&self, label: &str, result: SampleResult);
}

impl<S: ResultSink + ?Sized> ResultSink for &S {
    fn record(&self, label: &str, result: SampleResult) {
        (**self).record(label, result)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSample {
    pub label: String,
    pub result: SampleResult,
}

/// Keeps every sample in memory, in recording order.
#[derive(Debug, Default)]
pub struct MemorySink {
    samples: Mutex<Vec<RecordedSample>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<RecordedSample> {
        self.samples
            .lock()
            .map(|samples| samples.clone())
            .unwrap_or_default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.samples().into_iter().map(|s| s.label).collect()
    }

    pub fn failures(&self) -> Vec<RecordedSample> {
        self.samples()
            .into_iter()
            .filter(|s| !s.result.success)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.clear();
        }
    }
}

impl ResultSink for MemorySink {
    fn record(&self, label: &str, result: SampleResult) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.push(RecordedSample {
                label: label.to_string(),
                result,
            });
        }
    }
}

/// Emits each sample as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn record(&self, label: &str, result: SampleResult) {
        let elapsed_ms = result.elapsed.as_millis() as u64;
        if result.success {
            tracing::info!(
                label,
                uri = %result.uri,
                status = result.status,
                bytes = result.bytes,
                elapsed_ms,
                "sample ok"
            );
        } else {
            tracing::warn!(
                label,
                uri = %result.uri,
                status = result.status,
                reason = result.message.as_deref().unwrap_or_default(),
                elapsed_ms,
                "sample failed"
            );
        }
    }
}
