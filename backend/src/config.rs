//! Runtime configuration read from the environment (and an optional `.env`).

use common::model::report::SensitivePolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    /// Secret every new project starts with until a PI replaces it.
    pub default_download_password: String,
    pub sensitive_policy: SensitivePolicy,
    /// Rows per column inspected by the sensitive-data detectors.
    pub sensitive_sample_rows: usize,
    /// Controlled set of center names; empty accepts any non-blank name.
    pub centers: Vec<String>,
    pub max_upload_bytes: usize,
    pub max_export_rows: usize,
    pub busy_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            db_path: PathBuf::from("rissa.sqlite"),
            upload_dir: PathBuf::from("uploads"),
            default_download_password: "rissa".to_string(),
            sensitive_policy: SensitivePolicy::WarnOnly,
            sensitive_sample_rows: 200,
            centers: Vec::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_export_rows: 1_000_000,
            busy_timeout_ms: 5_000,
        }
    }
}

impl Config {
    /// Loads `.env` if present, then overlays `RISSA_*` variables on the defaults.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(v) = lookup("RISSA_HOST") {
            cfg.host = v;
        }
        if let Some(v) = lookup("RISSA_PORT") {
            cfg.port = parse("RISSA_PORT", &v)?;
        }
        if let Some(v) = lookup("RISSA_DB_PATH") {
            cfg.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("RISSA_UPLOAD_DIR") {
            cfg.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("RISSA_DEFAULT_DOWNLOAD_PASSWORD") {
            if v.is_empty() {
                return Err("RISSA_DEFAULT_DOWNLOAD_PASSWORD must not be empty".to_string());
            }
            cfg.default_download_password = v;
        }
        if let Some(v) = lookup("RISSA_SENSITIVE_POLICY") {
            cfg.sensitive_policy = match v.trim().to_ascii_lowercase().as_str() {
                "warn" | "warn_only" => SensitivePolicy::WarnOnly,
                "block" | "fail_closed" => SensitivePolicy::FailClosed,
                other => {
                    return Err(format!(
                        "RISSA_SENSITIVE_POLICY must be 'warn' or 'block', got '{}'",
                        other
                    ))
                }
            };
        }
        if let Some(v) = lookup("RISSA_SENSITIVE_SAMPLE_ROWS") {
            cfg.sensitive_sample_rows = positive("RISSA_SENSITIVE_SAMPLE_ROWS", &v)?;
        }
        if let Some(v) = lookup("RISSA_CENTERS") {
            cfg.centers = v
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("RISSA_MAX_UPLOAD_BYTES") {
            cfg.max_upload_bytes = positive("RISSA_MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = lookup("RISSA_MAX_EXPORT_ROWS") {
            cfg.max_export_rows = positive("RISSA_MAX_EXPORT_ROWS", &v)?;
        }
        if let Some(v) = lookup("RISSA_BUSY_TIMEOUT_MS") {
            cfg.busy_timeout_ms = parse("RISSA_BUSY_TIMEOUT_MS", &v)?;
        }

        Ok(cfg)
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("{} has an invalid value '{}'", key, value))
}

fn positive(key: &str, value: &str) -> Result<usize, String> {
    let n: usize = parse(key, value)?;
    if n == 0 {
        return Err(format!("{} must be greater than zero", key));
    }
    Ok(n)
}
