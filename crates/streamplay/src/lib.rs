pub mod clock;
pub mod config;
pub mod dash;
pub mod download;
pub mod error;
pub mod hls;
pub mod playback;
pub mod segment;
pub mod selector;
pub mod sink;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use url::Url;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PlayDuration, PlaybackConfig, ProtocolMode};
pub use download::{DownloadResponse, Downloader, HttpDownloader};
pub use error::{FailureKind, PlayError, PlayResult};
pub use playback::{
    PlaybackController, PlaybackOutcome, PlaybackPhase, PlaybackState, StreamOrchestrator,
};
pub use segment::{ManifestSnapshot, MediaSegment, TrackKind};
pub use selector::{Resolution, Selectable, SelectionPolicy, VariantSelector};
pub use sink::{LogSink, MemorySink, ResultSink, SampleResult};

/// Collaborators shared by every component of one playback cycle.
///
/// ```text
///                 ┌──────────────────┐
///                 │StreamOrchestrator│
///                 └────────┬─────────┘
///          ┌───────────────┼───────────────┐
///   ┌──────▼─────┐  ┌──────▼─────┐  ┌──────▼─────┐
///   │   media    │  │   audio    │  │ subtitles  │   PlaybackController
///   └──────┬─────┘  └──────┬─────┘  └──────┬─────┘
///          └───────────────┼───────────────┘
///           Downloader ── ResultSink ── Clock
/// ```
pub struct PlaybackContext<'a, D, S, C> {
    pub downloader: &'a D,
    pub sink: &'a S,
    pub clock: &'a C,
    pub cancel: CancellationToken,
}

impl<'a, D, S, C> PlaybackContext<'a, D, S, C>
where
    D: Downloader,
    S: ResultSink,
    C: Clock,
{
    pub fn new(downloader: &'a D, sink: &'a S, clock: &'a C, cancel: CancellationToken) -> Self {
        Self {
            downloader,
            sink,
            clock,
            cancel,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn sleep(&self, duration: Duration) -> PlayResult<()> {
        if self.cancel.is_cancelled() {
            return Err(PlayError::Interrupted);
        }
        if duration.is_zero() {
            return Ok(());
        }
        self.clock.sleep(duration, &self.cancel).await
    }

    /// Download `uri` and report the attempt under `label`.
    pub async fn fetch(&self, label: &str, uri: &Url) -> PlayResult<DownloadResponse> {
        let (response, ()) = self.fetch_parsed(label, uri, |_| Ok(())).await?;
        Ok(response)
    }

    /// Download `uri` and run `parse` over the response before reporting.
    ///
    /// A body that fails to parse is reported as a failed sample carrying the parse error, so
    /// every attempt produces exactly one record. Interruptions are never recorded.
    pub async fn fetch_parsed<T, F>(
        &self,
        label: &str,
        uri: &Url,
        parse: F,
    ) -> PlayResult<(DownloadResponse, T)>
    where
        F: FnOnce(&DownloadResponse) -> PlayResult<T> + Send,
    {
        if self.cancel.is_cancelled() {
            return Err(PlayError::Interrupted);
        }

        let started_at = self.clock.now();
        let timer = Instant::now();
        let response = match self.downloader.download(uri, &self.cancel).await {
            Ok(response) => response,
            Err(e) if e.is_interrupted() => return Err(e),
            Err(e) => {
                let mut result = SampleResult::failure(uri.clone(), e.to_string(), started_at);
                result.elapsed = timer.elapsed();
                self.sink.record(label, result);
                return Err(e);
            }
        };

        let mut result = SampleResult {
            uri: uri.clone(),
            success: response.success,
            status: Some(response.status),
            message: None,
            bytes: response.body.len(),
            started_at,
            elapsed: timer.elapsed(),
        };

        if !response.success {
            let error = PlayError::HttpError {
                uri: uri.clone(),
                status: response.status,
            };
            result.message = Some(error.to_string());
            self.sink.record(label, result);
            return Err(error);
        }

        match parse(&response) {
            Ok(parsed) => {
                self.sink.record(label, result);
                Ok((response, parsed))
            }
            Err(e) => {
                result.success = false;
                result.message = Some(e.to_string());
                self.sink.record(label, result);
                Err(e)
            }
        }
    }

    /// Report a failure that did not come from a download, such as a selection miss.
    pub fn report_failure(&self, label: &str, uri: &Url, message: impl Into<String>) {
        self.sink
            .record(label, SampleResult::failure(uri.clone(), message, self.now()));
    }
}
