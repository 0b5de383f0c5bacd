use std::{collections::HashMap, path::Path};

use anyhow::{bail, Result};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Full application configuration.
/// Every field comes from the process environment, then `.env`, then a default.
#[derive(Debug, Clone)]
pub struct Config {
    /// "gemini" (default) or "ollama".
    pub backend: String,

    // Gemini
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub model: String,

    // Ollama
    pub ollama_url: String,
    pub ollama_model: String,

    pub request_timeout_s: u64,

    // Web
    pub web_bind: String,
    pub web_port: u16,
    /// Upper bound on a `/calculate` request body.
    pub max_image_bytes: usize,
}

fn parse_dotenv(path: &Path) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(contents) = std::fs::read_to_string(path) else {
        return map;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim();
            let v = v
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(v);
            map.insert(k.trim().to_string(), v.to_string());
        }
    }
    map
}

fn get(key: &str, dotenv: &HashMap<String, String>) -> Option<String> {
    std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
}

fn get_str(key: &str, dotenv: &HashMap<String, String>, default: &str) -> String {
    get(key, dotenv).unwrap_or_else(|| default.to_string())
}

fn get_u64(key: &str, dotenv: &HashMap<String, String>, default: u64) -> u64 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u16(key: &str, dotenv: &HashMap<String, String>, default: u16) -> u16 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_usize(key: &str, dotenv: &HashMap<String, String>, default: usize) -> usize {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load from the environment and `./.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_env_file(".env")
    }

    /// Load from the environment and the given dotenv file (missing is fine).
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        let dotenv = parse_dotenv(path.as_ref());

        let config = Config {
            backend: get_str("BACKEND", &dotenv, "gemini").to_lowercase(),
            gemini_api_key: get_str("GEMINI_API_KEY", &dotenv, ""),
            gemini_base_url: get_str("GEMINI_BASE_URL", &dotenv, DEFAULT_GEMINI_BASE_URL),
            model: get_str("MODEL", &dotenv, DEFAULT_MODEL),
            ollama_url: get_str("OLLAMA_URL", &dotenv, "http://localhost:11434"),
            ollama_model: get_str("OLLAMA_MODEL", &dotenv, "llava"),
            request_timeout_s: get_u64("REQUEST_TIMEOUT_S", &dotenv, 120),
            web_bind: get_str("WEB_BIND", &dotenv, "0.0.0.0"),
            web_port: get_u16("WEB_PORT", &dotenv, 8900),
            max_image_bytes: get_usize("MAX_IMAGE_BYTES", &dotenv, 10 * 1024 * 1024),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.backend.as_str() {
            "gemini" if self.gemini_api_key.is_empty() => {
                bail!("GEMINI_API_KEY is required when BACKEND=gemini")
            },
            "gemini" | "ollama" => Ok(()),
            other => bail!("unknown BACKEND '{other}' (expected gemini or ollama)"),
        }
    }
}
