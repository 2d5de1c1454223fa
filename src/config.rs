use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

use crate::gemini;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GOOGLE_API_KEY environment variable not found! Please check your .env file.")]
    MissingApiKey,

    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration.
///
/// | Env Var                | Required | Default                                     |
/// |------------------------|----------|---------------------------------------------|
/// | `GOOGLE_API_KEY`       | **yes**  | --                                          |
/// | `GEMINI_MODEL`         | no       | `gemini-2.5-flash-preview-09-2025`          |
/// | `GEMINI_API_BASE`      | no       | `https://generativelanguage.googleapis.com` |
/// | `GEMINI_WEB_SEARCH`    | no       | `true`                                      |
/// | `BIND_ADDR`            | no       | `0.0.0.0:8080`                              |
/// | `VIDEO_TEMP_DIR`       | no       | system temp dir                             |
/// | `MAX_UPLOAD_BYTES`     | no       | `209715200`                                 |
/// | `YTDLP_BIN`            | no       | `yt-dlp`                                    |
/// | `ACCEPTED_VIDEO_TYPES` | no       | `mp4,mov,avi`                               |
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub api_base: Option<String>,
    pub web_search: bool,
    pub bind_addr: SocketAddr,
    pub temp_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub ytdlp_bin: String,
    pub accepted_extensions: Vec<String>,
}

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;
const DEFAULT_ACCEPTED_TYPES: &str = "mp4,mov,avi";

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = var("GOOGLE_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_addr.parse().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: bind_addr.clone(),
        })?;

        let max_upload_bytes = match var("MAX_UPLOAD_BYTES") {
            Some(raw) => raw.parse::<usize>().map_err(|_| ConfigError::Invalid {
                name: "MAX_UPLOAD_BYTES",
                value: raw,
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let web_search = match var("GEMINI_WEB_SEARCH") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                name: "GEMINI_WEB_SEARCH",
                value: raw,
            })?,
            None => true,
        };

        let accepted_extensions: Vec<String> = var("ACCEPTED_VIDEO_TYPES")
            .unwrap_or_else(|| DEFAULT_ACCEPTED_TYPES.to_string())
            .split(',')
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        if accepted_extensions.is_empty() {
            return Err(ConfigError::Invalid {
                name: "ACCEPTED_VIDEO_TYPES",
                value: lookup("ACCEPTED_VIDEO_TYPES").unwrap_or_default(),
            });
        }

        Ok(Config {
            api_key,
            model: var("GEMINI_MODEL").unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string()),
            api_base: var("GEMINI_API_BASE"),
            web_search,
            bind_addr,
            temp_dir: var("VIDEO_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            max_upload_bytes,
            ytdlp_bin: var("YTDLP_BIN").unwrap_or_else(|| "yt-dlp".to_string()),
            accepted_extensions,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
