use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerAppConfig {
    #[serde(default)]
    pub server: ServerAppSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub conversion: ConversionSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl ServerAppConfig {
    /// Load from a TOML file.  A missing file yields the defaults; a file
    /// that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading config: {}", path.display()))
            }
        };
        toml::from_str(&text).with_context(|| format!("parsing config: {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerAppSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerAppSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".into()
}

/// Where uploads and converted outputs live.  Each request gets its own
/// subdirectory under both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Delete per-request directories older than this.  Unset = keep forever.
    #[serde(default)]
    pub retention_secs: Option<u64>,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl StorageConfig {
    /// Storage rooted at `base`, as `base/uploads` and `base/converted`.
    pub fn under(base: &Path) -> Self {
        Self {
            upload_dir: base.join("uploads"),
            output_dir: base.join("converted"),
            ..Self::default()
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
            retention_secs: None,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_upload_dir() -> PathBuf { PathBuf::from("uploads") }
fn default_output_dir() -> PathBuf { PathBuf::from("converted") }
fn default_sweep_interval_secs() -> u64 { 300 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionSettings {
    /// Send the converter's error text to the client on failure.  When
    /// false the client gets a generic message and the details are only
    /// logged.
    #[serde(default = "default_true")]
    pub expose_error_details: bool,
    /// Give up waiting for a converter after this many seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    /// Binary used for video demuxing and MP3 encoding.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            expose_error_details: true,
            timeout_secs: None,
            max_upload_mb: default_max_upload_mb(),
            ffmpeg_path: default_ffmpeg(),
        }
    }
}

fn default_true() -> bool { true }
fn default_max_upload_mb() -> usize { 100 }
fn default_ffmpeg() -> String { "ffmpeg".into() }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSettings {
    /// Regexes matched against "<target>: <message>"; matching events are dropped.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Also write logs to a daily-rotated file in this directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}
