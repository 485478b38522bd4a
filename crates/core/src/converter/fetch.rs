//! Remote media download through yt-dlp, guarded by a network pre-flight.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::path::{Path, PathBuf};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, instrument, warn};

use crate::config::{EnginesConfig, FetchConfig};
use crate::metrics;
use crate::staging::{OutputSlot, StagedFile};

use super::error::ConvertError;
use super::media::MediaFormat;
use super::process::EngineCommand;
use super::traits::Converter;
use super::types::{Artifact, ConverterDescriptor, Params};

const REMEDIATION: &str = "Check the host's DNS servers, and any firewall, VPN or proxy between this server and the internet.";
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Suffixes of files a downloader leaves behind mid-transfer.
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".partial", ".ytdl", ".temp", ".tmp"];

/// Parses a download URL; only absolute http(s) URLs with a host qualify.
pub fn parse_target(raw: &str) -> Result<Url, ConvertError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConvertError::validation(format!("Invalid URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConvertError::validation(format!(
            "Unsupported URL scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConvertError::validation("URL has no host"));
    }
    Ok(url)
}

/// Connectivity check run before committing to a long download.
#[derive(Debug, Clone)]
pub struct Preflight {
    client: reqwest::Client,
    config: FetchConfig,
}

impl Preflight {
    pub fn new(config: &FetchConfig) -> Result<Self, ConvertError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(
                config.connect_timeout_secs + config.read_timeout_secs,
            ))
            .build()
            .map_err(|e| ConvertError::network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Resolves and requests `url`, retrying transient failures with
    /// exponential backoff. A host the resolver reports as unknown fails at
    /// once.
    pub async fn check(&self, url: &Url) -> Result<(), ConvertError> {
        let mut attempt = 0;
        loop {
            match self.check_once(url).await {
                Ok(()) => return Ok(()),
                Err(failure) if failure.transient && attempt < self.config.retries => {
                    let delay = BACKOFF_BASE * 2u32.saturating_pow(attempt);
                    warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %failure.detail, "Pre-flight failed, retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => {
                    metrics::FETCH_PREFLIGHT_FAILURES.inc();
                    return Err(ConvertError::network(format!(
                        "{} {}",
                        failure.detail, REMEDIATION
                    )));
                }
            }
        }
    }

    async fn check_once(&self, url: &Url) -> Result<(), PreflightFailure> {
        let (host, port) = lookup_target(url);
        self.resolve(host, port).await?;
        for extra in &self.config.probe_hosts {
            self.resolve(extra, 443).await?;
        }
        self.request_head(url).await
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<(), PreflightFailure> {
        let limit = Duration::from_secs(self.config.connect_timeout_secs);
        match timeout(limit, tokio::net::lookup_host((host, port))).await {
            Ok(Ok(mut addrs)) => {
                if addrs.next().is_some() {
                    Ok(())
                } else {
                    Err(PreflightFailure::definite(format!(
                        "DNS resolution of {} returned no addresses.",
                        host
                    )))
                }
            }
            Ok(Err(e)) => Err(PreflightFailure::definite(format!(
                "DNS resolution of {} failed: {}.",
                host, e
            ))),
            Err(_) => Err(PreflightFailure::transient(format!(
                "DNS resolution of {} timed out after {}s.",
                host, self.config.connect_timeout_secs
            ))),
        }
    }

    /// Any HTTP response proves reachability; only transport errors fail.
    async fn request_head(&self, url: &Url) -> Result<(), PreflightFailure> {
        let origin = url.origin().ascii_serialization();
        let unreachable = |e: reqwest::Error| {
            let detail = format!("{} is unreachable: {}.", origin, e);
            if e.is_timeout() || e.is_connect() || e.is_request() {
                PreflightFailure::transient(detail)
            } else {
                PreflightFailure::definite(detail)
            }
        };

        let response = self.client.head(&origin).send().await.map_err(unreachable)?;
        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            // dropped before the body is read
            self.client.get(&origin).send().await.map_err(unreachable)?;
        }
        Ok(())
    }
}

/// One failed pre-flight attempt.
#[derive(Debug)]
struct PreflightFailure {
    detail: String,
    transient: bool,
}

impl PreflightFailure {
    fn transient(detail: String) -> Self {
        Self {
            detail,
            transient: true,
        }
    }

    fn definite(detail: String) -> Self {
        Self {
            detail,
            transient: false,
        }
    }
}

/// Host and port handed to the resolver; IPv6 literals lose their brackets.
fn lookup_target(url: &Url) -> (&str, u16) {
    let host = url.host_str().unwrap_or_default();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    (host, url.port_or_known_default().unwrap_or(443))
}

/// Builds yt-dlp arguments writing `<dir>/<token>_<title>.<ext>`.
pub fn build_download_args(
    url: &Url,
    dir: &Path,
    token: &str,
    format: MediaFormat,
    config: &FetchConfig,
    ffmpeg: &Path,
) -> Vec<String> {
    let template = dir.join(format!("{}_%(title)s.%(ext)s", token));
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-progress".to_string(),
        "--retries".to_string(),
        config.retries.to_string(),
        "--socket-timeout".to_string(),
        config.read_timeout_secs.to_string(),
        "-o".to_string(),
        template.to_string_lossy().to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
    ];

    if ffmpeg.is_absolute() {
        args.push("--ffmpeg-location".to_string());
        args.push(ffmpeg.to_string_lossy().to_string());
    }

    if format.is_audio() {
        args.extend(
            ["-f", "bestaudio/best", "-x", "--audio-format", format.extension()]
                .map(String::from),
        );
    } else {
        args.extend(
            ["-f", "bestvideo+bestaudio/best", "--recode-video", format.extension()]
                .map(String::from),
        );
    }

    args.push("--".to_string());
    args.push(url.to_string());
    args
}

fn is_partial(name: &str) -> bool {
    PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Locates the file a download produced.
///
/// Post-processing may rename or re-encode the file, so the reported path is
/// tried first, then the same base with the requested extension, then any
/// file carrying `token` with that extension, then any finished file
/// carrying `token`.
pub async fn resolve_artifact(
    dir: &Path,
    token: &str,
    extension: &str,
    reported: Option<&Path>,
) -> Result<PathBuf, ConvertError> {
    if let Some(reported) = reported {
        if tokio::fs::try_exists(reported).await? {
            return Ok(reported.to_path_buf());
        }
        let expected = reported.with_extension(extension);
        if tokio::fs::try_exists(&expected).await? {
            return Ok(expected);
        }
    }

    let prefix = format!("{}_", token);
    let suffix = format!(".{}", extension);
    let mut exact = None;
    let mut fallback = None;

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with(&prefix) || is_partial(&name) || !entry.file_type().await?.is_file() {
            continue;
        }
        if name.ends_with(&suffix) {
            exact.get_or_insert(entry.path());
        } else {
            fallback.get_or_insert(entry.path());
        }
    }

    exact.or(fallback).ok_or_else(|| {
        ConvertError::artifact_not_found(format!(
            "Downloaded file not found (expected a .{} file)",
            extension
        ))
    })
}

/// Delivery name of a downloaded file: its name without the job token.
pub fn delivery_name(path: &Path, token: &str) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.strip_prefix(&format!("{}_", token))
        .map(str::to_string)
        .unwrap_or(name)
}

/// `media-fetch`: pre-flight, download, then artifact resolution.
pub struct FetchConverter {
    descriptor: ConverterDescriptor,
    ytdlp: PathBuf,
    ffmpeg: PathBuf,
    config: FetchConfig,
    preflight: Preflight,
}

impl FetchConverter {
    pub fn new(
        descriptor: ConverterDescriptor,
        engines: &EnginesConfig,
        fetch: &FetchConfig,
    ) -> Result<Self, ConvertError> {
        Ok(Self {
            descriptor,
            ytdlp: engines.ytdlp.clone(),
            ffmpeg: engines.ffmpeg.clone(),
            config: fetch.clone(),
            preflight: Preflight::new(fetch)?,
        })
    }

    fn format(params: &Params) -> Result<MediaFormat, ConvertError> {
        let name = params.choice("format", "mp4");
        MediaFormat::parse(&name)
            .ok_or_else(|| ConvertError::validation(format!("Unsupported format: {}", name)))
    }
}

#[async_trait]
impl Converter for FetchConverter {
    fn descriptor(&self) -> &ConverterDescriptor {
        &self.descriptor
    }

    fn validate(&self, _inputs: &[StagedFile], params: &Params) -> Result<(), ConvertError> {
        parse_target(params.required_text("url")?)?;
        Self::format(params).map(|_| ())
    }

    fn output_name(&self, _inputs: &[StagedFile], params: &Params) -> String {
        format!("download.{}", params.choice("format", "mp4"))
    }

    #[instrument(skip_all, fields(operation = %self.descriptor.operation))]
    async fn execute(
        &self,
        _inputs: &[StagedFile],
        output: &OutputSlot,
        params: &Params,
    ) -> Result<Artifact, ConvertError> {
        let url = parse_target(params.required_text("url")?)?;
        let format = Self::format(params)?;

        self.preflight.check(&url).await?;
        debug!(host = url.host_str().unwrap_or_default(), "Pre-flight passed");

        let args = build_download_args(
            &url,
            output.dir(),
            output.token(),
            format,
            &self.config,
            &self.ffmpeg,
        );
        let result = EngineCommand::new(
            "yt-dlp",
            &self.ytdlp,
            Duration::from_secs(self.config.download_timeout_secs),
        )
        .args(&args)
        .run()
        .await?;

        let stdout = result.stdout_text();
        let reported = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .next_back()
            .map(PathBuf::from);

        let produced = resolve_artifact(
            output.dir(),
            output.token(),
            format.extension(),
            reported.as_deref(),
        )
        .await?;
        let name = delivery_name(&produced, output.token());
        info!(file = %name, "Download resolved");

        // the fallback scan may settle on a container other than the requested one
        let content_type = mime_guess::from_path(&name)
            .first_raw()
            .unwrap_or(format.content_type());

        tokio::fs::rename(&produced, output.scratch_path()).await?;
        Ok(Artifact::new(content_type).with_file_name(name))
    }
}
