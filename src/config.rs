use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub upload: UploadConfig,
    pub chunks: ChunkConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    /// Largest request body the HTTP layer accepts, in bytes.
    pub max_request_size: u64,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Destination directory for assembled and whole-file uploads
    pub upload_dir: String,
    /// Lowercased extensions without the leading dot. Empty allows any.
    pub allowed_extensions: Vec<String>,
    /// Lowercased MIME types. Empty allows any.
    pub allowed_mime_types: Vec<String>,
    /// Maximum artifact size in bytes
    pub size_limit: Option<u64>,
    /// Multipart field carrying the file bytes
    pub input_field_name: String,
    /// Allocate a fresh name instead of overwriting an existing artifact
    pub rename_on_conflict: bool,
    /// Bound on a single fragment save or assembly
    pub io_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Fragment root: `<chunks_dir>/<uuid>/<part index>`
    pub chunks_dir: String,
    pub cleanup_probability: f64,
    pub expire_in: Duration,
    /// When set, a background task sweeps the fragment root on this interval.
    pub cleanup_interval: Option<Duration>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_request_size: 64 * 1024 * 1024,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_dir: "./uploads".to_string(),
            allowed_extensions: Vec::new(),
            allowed_mime_types: Vec::new(),
            size_limit: None,
            input_field_name: "qqfile".to_string(),
            rename_on_conflict: false,
            io_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunks_dir: "./chunks".to_string(),
            cleanup_probability: 0.001, // once per 1000 requests on average
            expire_in: Duration::from_secs(7 * 24 * 60 * 60),
            cleanup_interval: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let max_request_size = match std::env::var("MAX_REQUEST_SIZE") {
            Ok(raw) => parse_size(&raw)?,
            Err(_) => NodeConfig::default().max_request_size,
        };

        let size_limit = std::env::var("SIZE_LIMIT")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_size(&s))
            .transpose()?;

        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());
        let chunks_dir = std::env::var("CHUNKS_DIR").unwrap_or_else(|_| "./chunks".to_string());

        let allowed_extensions = std::env::var("ALLOWED_EXTENSIONS")
            .map(|s| parse_list(&s, |ext| ext.trim_start_matches('.').to_string()))
            .unwrap_or_default();

        let allowed_mime_types = std::env::var("ALLOWED_MIME_TYPES")
            .map(|s| parse_list(&s, str::to_string))
            .unwrap_or_default();

        let cleanup_probability = std::env::var("CHUNKS_CLEANUP_PROBABILITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.001);

        let expire_in = std::env::var("CHUNKS_EXPIRE_IN")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| ChunkConfig::default().expire_in);

        let cleanup_interval = std::env::var("CHUNKS_CLEANUP_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let input_field_name =
            std::env::var("INPUT_FIELD_NAME").unwrap_or_else(|_| "qqfile".to_string());

        let io_timeout = std::env::var("IO_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let rename_on_conflict = std::env::var("RENAME_ON_CONFLICT")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let config = Config {
            node: NodeConfig {
                bind_address,
                max_request_size,
            },
            upload: UploadConfig {
                upload_dir,
                allowed_extensions,
                allowed_mime_types,
                size_limit,
                input_field_name,
                rename_on_conflict,
                io_timeout,
            },
            chunks: ChunkConfig {
                chunks_dir,
                cleanup_probability,
                expire_in,
                cleanup_interval,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = self.chunks.cleanup_probability;
        if !(p > 0.0 && p <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "CHUNKS_CLEANUP_PROBABILITY must be in (0, 1], got {p}"
            )));
        }

        if self.chunks.expire_in.is_zero() {
            return Err(ConfigError::ValidationError(
                "CHUNKS_EXPIRE_IN must be greater than 0".to_string(),
            ));
        }

        if self.upload.input_field_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "INPUT_FIELD_NAME cannot be empty".to_string(),
            ));
        }

        if self.upload.io_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "IO_TIMEOUT must be greater than 0".to_string(),
            ));
        }

        if let Some(limit) = self.upload.size_limit {
            if limit > self.node.max_request_size {
                tracing::warn!(
                    size_limit = limit,
                    max_request_size = self.node.max_request_size,
                    "SIZE_LIMIT exceeds MAX_REQUEST_SIZE. Every upload will be refused \
                     until MAX_REQUEST_SIZE is raised."
                );
            }
        }

        Ok(())
    }
}

/// Parse a byte size such as `1048576`, `512K`, `64M` or `2G` (case-insensitive).
pub fn parse_size(raw: &str) -> Result<u64, ConfigError> {
    let raw = raw.trim();
    let invalid = || ConfigError::ValidationError(format!("invalid size: {raw:?}"));

    let last = raw.chars().last().ok_or_else(invalid)?;
    let (digits, multiplier) = match last.to_ascii_uppercase() {
        'K' => (&raw[..raw.len() - 1], 1024),
        'M' => (&raw[..raw.len() - 1], 1024 * 1024),
        'G' => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        _ => (raw, 1),
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    value.checked_mul(multiplier).ok_or_else(invalid)
}

fn parse_list(raw: &str, normalize: impl Fn(&str) -> String) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| normalize(s).to_lowercase())
        .collect()
}
