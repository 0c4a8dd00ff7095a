use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Referral Board";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_ALLOWED_FILE_TYPES: &str = "jpg,jpeg,png,pdf";
const DEFAULT_MAX_FILE_SIZE: usize = 5 * 1024 * 1024;
const DEFAULT_CASCADE_CONCURRENCY: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Runtime configuration, read from `REFERRAL_BOARD_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Holds the database file and the `uploads/` directory.
    pub data_dir: PathBuf,
    /// Base URL prefixed to stored file links.
    pub public_url: String,
    pub cors_origin: Option<String>,
    /// Lowercase extensions, without the dot.
    pub allowed_file_types: Vec<String>,
    pub max_file_size: usize,
    /// Upper bound on concurrent per-dashboard cascade updates.
    pub cascade_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup (tests inject a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let addr_raw = get("REFERRAL_BOARD_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let bind_addr: SocketAddr = addr_raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var: "REFERRAL_BOARD_ADDR",
            value: addr_raw.clone(),
        })?;

        let data_dir = get("REFERRAL_BOARD_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(app_data_dir);

        let public_url = get("REFERRAL_BOARD_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://{bind_addr}"))
            .trim_end_matches('/')
            .to_string();

        let allowed_file_types = parse_file_types(
            &get("REFERRAL_BOARD_ALLOWED_FILE_TYPES")
                .unwrap_or_else(|| DEFAULT_ALLOWED_FILE_TYPES.to_string()),
        );
        if allowed_file_types.is_empty() {
            return Err(ConfigError::Invalid {
                var: "REFERRAL_BOARD_ALLOWED_FILE_TYPES",
                value: String::new(),
            });
        }

        let max_file_size = parse_positive(
            "REFERRAL_BOARD_MAX_FILE_SIZE",
            get("REFERRAL_BOARD_MAX_FILE_SIZE"),
            DEFAULT_MAX_FILE_SIZE,
        )?;
        let cascade_concurrency = parse_positive(
            "REFERRAL_BOARD_CASCADE_CONCURRENCY",
            get("REFERRAL_BOARD_CASCADE_CONCURRENCY"),
            DEFAULT_CASCADE_CONCURRENCY,
        )?;

        Ok(Self {
            bind_addr,
            data_dir,
            public_url,
            cors_origin: get("REFERRAL_BOARD_CORS_ORIGIN"),
            allowed_file_types,
            max_file_size,
            cascade_concurrency,
        })
    }

    /// Defaults rooted at `data_dir` (used by tests and embedding).
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let bind_addr: SocketAddr = ([127, 0, 0, 1], 8080).into();
        Self {
            bind_addr,
            data_dir: data_dir.into(),
            public_url: format!("http://{bind_addr}"),
            cors_origin: None,
            allowed_file_types: parse_file_types(DEFAULT_ALLOWED_FILE_TYPES),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            cascade_concurrency: DEFAULT_CASCADE_CONCURRENCY,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("referral-board.db")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Whole-request limit for multipart uploads: a handful of files plus form fields.
    pub fn request_body_limit(&self) -> usize {
        self.max_file_size.saturating_mul(10).saturating_add(64 * 1024)
    }
}

/// Default data directory: `<platform data dir>/ReferralBoard`.
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ReferralBoard")
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "referral_board=info,tower_http=info"
}

fn parse_file_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

fn parse_positive(
    var: &'static str,
    raw: Option<String>,
    default: usize,
) -> Result<usize, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => match value.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::Invalid { var, value }),
        },
    }
}
