use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::{bail, Context};
use clap::Parser;
use fake_user_agent::get_chrome_rua;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    ClientBuilder,
};
use streamplay::{
    HttpDownloader, LogSink, MemorySink, PlayDuration, PlaybackConfig, PlaybackContext,
    PlaybackOutcome, ProtocolMode, Resolution, ResultSink, SampleResult, SelectionPolicy,
    StreamOrchestrator, SystemClock,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug, Clone)]
#[clap(name = "splay", version, about)]
struct SplayArgs {
    /// Master playlist or MPD URL
    #[clap(env = "SPLAY_URL")]
    url: Option<String>,

    /// Load playback settings from a JSON file. Flags given on the command line override it.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Manifest format: auto, hls or dash
    #[clap(long, env = "SPLAY_PROTOCOL")]
    protocol: Option<ProtocolMode>,

    /// Bandwidth selection: min, max or an exact value in bits per second
    #[clap(short, long, env = "SPLAY_BANDWIDTH")]
    bandwidth: Option<SelectionPolicy<u64>>,

    /// Resolution selection: min, max or an exact value such as 1280x720
    #[clap(short, long, env = "SPLAY_RESOLUTION")]
    resolution: Option<SelectionPolicy<Resolution>>,

    /// Audio rendition name or language
    #[clap(long, env = "SPLAY_AUDIO_LANG")]
    audio_lang: Option<String>,

    /// Subtitle rendition name or language
    #[clap(long, env = "SPLAY_SUBTITLE_LANG")]
    subtitle_lang: Option<String>,

    /// Stop each cycle after this many seconds of primary media
    #[clap(short, long)]
    play_seconds: Option<f64>,

    /// Continue from the last played segment on every cycle
    #[clap(long)]
    resume: bool,

    /// Number of playback cycles. 0 repeats until interrupted.
    #[clap(short = 'n', long, default_value = "1")]
    iterations: u64,

    /// HTTP header used to download, eg. "Referer: https://example.com"
    #[clap(short = 'H', long)]
    headers: Vec<String>,

    /// Cookies used to download, in Set-Cookie format
    #[clap(long)]
    cookies: Vec<String>,

    /// Request timeout in seconds
    #[clap(long, env = "SPLAY_TIMEOUT", default_value = "60")]
    timeout: u64,

    /// Print a JSON summary after each cycle
    #[clap(long)]
    json: bool,

    /// Debug output
    #[clap(long, alias = "debug")]
    verbose: bool,
}

impl SplayArgs {
    fn config(&self) -> anyhow::Result<PlaybackConfig> {
        let mut config = match (&self.config, &self.url) {
            (Some(path), _) => PlaybackConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            (None, Some(url)) => PlaybackConfig::new(url.parse().context("invalid url")?),
            (None, None) => bail!("either a URL or --config is required"),
        };

        if let (Some(_), Some(url)) = (&self.config, &self.url) {
            config.master_url = url.parse().context("invalid url")?;
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        if let Some(bandwidth) = &self.bandwidth {
            config.bandwidth = bandwidth.clone();
        }
        if let Some(resolution) = &self.resolution {
            config.resolution = resolution.clone();
        }
        if self.audio_lang.is_some() {
            config.audio_language = self.audio_lang.clone();
        }
        if self.subtitle_lang.is_some() {
            config.subtitle_language = self.subtitle_lang.clone();
        }
        if let Some(seconds) = self.play_seconds {
            config.play = PlayDuration::Seconds(seconds);
        }
        config.resume |= self.resume;

        config.validate()?;
        Ok(config)
    }

    fn client(&self) -> anyhow::Result<ClientBuilder> {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let (key, value) = header
                .split_once(':')
                .with_context(|| format!("invalid header: {header}"))?;
            headers.insert(
                HeaderName::from_str(key.trim())?,
                HeaderValue::from_str(value.trim())?,
            );
        }

        Ok(ClientBuilder::new()
            .default_headers(headers)
            .user_agent(get_chrome_rua())
            .timeout(Duration::from_secs(self.timeout)))
    }
}

/// Logs every sample and keeps the current cycle's samples for the summary.
#[derive(Default)]
struct CycleSink {
    log: LogSink,
    cycle: MemorySink,
}

impl ResultSink for CycleSink {
    fn record(&self, label: &str, result: SampleResult) {
        self.log.record(label, result.clone());
        self.cycle.record(label, result);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = SplayArgs::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::WARN.into())
                .try_from_env()
                .unwrap_or_else(|_| format!("streamplay={default_level},splay={default_level}").into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.config()?;
    let downloader = HttpDownloader::new(args.client()?)?;
    if !args.cookies.is_empty() {
        downloader.add_cookies(args.cookies.clone(), &config.master_url);
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, stopping after the current request");
                cancel.cancel();
            }
        }
    });

    let sink = CycleSink::default();
    let clock = SystemClock;
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, cancel.clone());
    let mut orchestrator = StreamOrchestrator::new(config);

    let mut failed = false;
    let mut iteration = 0;
    while args.iterations == 0 || iteration < args.iterations {
        iteration += 1;
        sink.cycle.clear();

        let result = orchestrator.run(&ctx).await;
        let outcome = match &result {
            Ok(PlaybackOutcome::Completed { played, segments }) => {
                tracing::info!(iteration, played, segments, "cycle completed");
                "completed"
            }
            Ok(PlaybackOutcome::NoMatchingMedia) => {
                tracing::error!(iteration, "no media matches the selectors");
                failed = true;
                "no-matching-media"
            }
            Err(e) if e.is_interrupted() => "interrupted",
            Err(e) => {
                tracing::error!(iteration, "cycle failed: {e}");
                failed = true;
                "failed"
            }
        };

        if args.json {
            let samples = sink.cycle.samples();
            let summary = serde_json::json!({
                "iteration": iteration,
                "outcome": outcome,
                "samples": samples.len(),
                "failures": samples.iter().filter(|s| !s.result.success).count(),
                "bytes": samples.iter().map(|s| s.result.bytes).sum::<usize>(),
            });
            println!("{summary}");
        }

        if cancel.is_cancelled() {
            break;
        }
    }

    if failed {
        bail!("playback failed");
    }
    Ok(())
}
