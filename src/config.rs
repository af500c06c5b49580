use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    #[serde(default = "default_cors")]
    pub cors: bool,
}

#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    /// Local path or http(s) URL of the classifier artifact.
    #[serde(default = "default_model_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_mb: default_max_upload_mb(),
            cors: default_cors(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
        }
    }
}

pub fn default_host() -> String { "0.0.0.0".into() }
pub fn default_port() -> u16 { 8000 }
pub fn default_max_upload_mb() -> usize { 50 }
fn default_cors() -> bool { true }
pub fn default_model_path() -> String { "model/genre_crnn.onnx".into() }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}

/// `./genrelens.toml`, then `~/.config/genrelens/config.toml`, then the
/// platform config directory.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("genrelens.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("genrelens").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("genrelens").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
