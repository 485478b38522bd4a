use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engines: EnginesConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allow any origin (the bundled frontend is served from elsewhere).
    #[serde(default = "default_true")]
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_permissive: true,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

/// Staging area configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Flat directory for inbound staged files.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Flat directory for produced artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Size ceiling for a single staged payload, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Maximum number of file parts accepted by one job.
    #[serde(default = "default_max_files")]
    pub max_files_per_job: usize,
    /// Files older than this are removed by the janitor.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
    /// Interval between janitor sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            max_files_per_job: default_max_files(),
            retention_secs: default_retention(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_max_upload_bytes() -> u64 {
    256 * 1024 * 1024 // 256 MiB
}

fn default_max_files() -> usize {
    20
}

fn default_retention() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    300
}

/// External engine locations and limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnginesConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_soffice")]
    pub soffice: PathBuf,
    #[serde(default = "default_tesseract")]
    pub tesseract: PathBuf,
    #[serde(default = "default_qpdf")]
    pub qpdf: PathBuf,
    #[serde(default = "default_ytdlp")]
    pub ytdlp: PathBuf,
    /// Directory holding the pdfium shared library. Falls back to the
    /// system library search path when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdfium_library_dir: Option<PathBuf>,
    /// Wall-clock limit for a single external process.
    #[serde(default = "default_process_timeout")]
    pub process_timeout_secs: u64,
    /// Tesseract language pack.
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            soffice: default_soffice(),
            tesseract: default_tesseract(),
            qpdf: default_qpdf(),
            ytdlp: default_ytdlp(),
            pdfium_library_dir: None,
            process_timeout_secs: default_process_timeout(),
            ocr_language: default_ocr_language(),
        }
    }
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_soffice() -> PathBuf {
    PathBuf::from("soffice")
}

fn default_tesseract() -> PathBuf {
    PathBuf::from("tesseract")
}

fn default_qpdf() -> PathBuf {
    PathBuf::from("qpdf")
}

fn default_ytdlp() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_process_timeout() -> u64 {
    600
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

/// Remote media fetch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Upper bound for the whole download step.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    /// Attempts for transient pre-flight failures; also passed to yt-dlp.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Extra hosts that must resolve before a download is attempted.
    #[serde(default)]
    pub probe_hosts: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            download_timeout_secs: default_download_timeout(),
            retries: default_retries(),
            probe_hosts: Vec::new(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    30
}

fn default_download_timeout() -> u64 {
    1800
}

fn default_retries() -> u32 {
    3
}

/// Job executor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_timeout_secs: default_job_timeout(),
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    8
}

fn default_job_timeout() -> u64 {
    3600 // 1 hour
}

/// Sanitized config for API responses (filesystem layout hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub storage: SanitizedStorageConfig,
    pub engines: SanitizedEnginesConfig,
    pub fetch: FetchConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub max_upload_bytes: u64,
    pub max_files_per_job: usize,
    pub retention_secs: u64,
}

/// Engine binaries are reported by file name only.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEnginesConfig {
    pub ffmpeg: String,
    pub soffice: String,
    pub tesseract: String,
    pub qpdf: String,
    pub ytdlp: String,
    pub pdfium_library_configured: bool,
    pub process_timeout_secs: u64,
    pub ocr_language: String,
}

fn binary_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            storage: SanitizedStorageConfig {
                max_upload_bytes: config.storage.max_upload_bytes,
                max_files_per_job: config.storage.max_files_per_job,
                retention_secs: config.storage.retention_secs,
            },
            engines: SanitizedEnginesConfig {
                ffmpeg: binary_name(&config.engines.ffmpeg),
                soffice: binary_name(&config.engines.soffice),
                tesseract: binary_name(&config.engines.tesseract),
                qpdf: binary_name(&config.engines.qpdf),
                ytdlp: binary_name(&config.engines.ytdlp),
                pdfium_library_configured: config.engines.pdfium_library_dir.is_some(),
                process_timeout_secs: config.engines.process_timeout_secs,
                ocr_language: config.engines.ocr_language.clone(),
            },
            fetch: config.fetch.clone(),
            jobs: config.jobs.clone(),
        }
    }
}
