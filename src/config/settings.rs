//! Application settings and configuration management

use crate::error::{AppError, Result};
use crate::pipeline::Device;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    32 * 1024 * 1024
}

/// Pipeline resource configuration.
///
/// `attn_backend` and `spconv_algo` are opaque to the serving core and are
/// only handed to the pipeline implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_attn_backend")]
    pub attn_backend: String,
    #[serde(default = "default_spconv_algo")]
    pub spconv_algo: String,
    #[serde(default)]
    pub preload: bool,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("./TRELLIS-image-large")
}

fn default_device() -> String {
    "cuda".to_string()
}

fn default_attn_backend() -> String {
    "flash-attn".to_string()
}

fn default_spconv_algo() -> String {
    "native".to_string()
}

impl ModelConfig {
    /// Config for a model directory with every other field defaulted
    pub fn with_dir<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Parsed device binding
    pub fn device(&self) -> Result<Device> {
        self.device.parse()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: default_model_dir(),
            device: default_device(),
            attn_backend: default_attn_backend(),
            spconv_algo: default_spconv_algo(),
            preload: false,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./outputs_api")
}

/// Generation admission configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Reject with `Busy` once this many jobs are waiting for the lock
    #[serde(default)]
    pub max_waiting: Option<usize>,
    /// Give up waiting for the lock after this long
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

fn default_seed() -> u64 {
    1
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            max_waiting: None,
            acquire_timeout_ms: None,
        }
    }
}

/// Export configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Fraction of triangles removed before texturing
    #[serde(default = "default_simplify")]
    pub simplify: f32,
    #[serde(default = "default_texture_size")]
    pub texture_size: u32,
}

fn default_simplify() -> f32 {
    0.95
}

fn default_texture_size() -> u32 {
    1024
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            simplify: default_simplify(),
            texture_size: default_texture_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        // Unprefixed variables understood by the pipeline itself act as defaults
        let model_dir = std::env::var("TRELLIS_MODEL_DIR")
            .unwrap_or_else(|_| default_model_dir().to_string_lossy().to_string());
        let attn_backend =
            std::env::var("ATTN_BACKEND").unwrap_or_else(|_| default_attn_backend());
        let spconv_algo = std::env::var("SPCONV_ALGO").unwrap_or_else(|_| default_spconv_algo());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("server.max_upload_bytes", default_max_upload_bytes() as i64)?
            .set_default("model.dir", model_dir)?
            .set_default("model.device", default_device())?
            .set_default("model.attn_backend", attn_backend)?
            .set_default("model.spconv_algo", spconv_algo)?
            .set_default("model.preload", false)?
            .set_default("storage.output_dir", default_output_dir().to_string_lossy().to_string())?
            .set_default("generation.seed", default_seed() as i64)?
            .set_default("export.simplify", default_simplify() as f64)?
            .set_default("export.texture_size", default_texture_size() as i64)?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            // Load from configuration file
            .add_source(File::with_name(path.as_ref().to_str().unwrap_or("config/default")).required(false))
            // Override with environment variables (prefixed with IMG3D_)
            .add_source(
                Environment::with_prefix("IMG3D")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        if self.model.dir.as_os_str().is_empty() {
            return Err(invalid("Model directory cannot be empty"));
        }

        self.model
            .device()
            .map_err(|e| invalid(&format!("Invalid model device: {}", e)))?;

        if !(0.0..1.0).contains(&self.export.simplify) {
            return Err(invalid(&format!(
                "Simplify ratio {} must be in [0, 1)",
                self.export.simplify
            )));
        }

        let size = self.export.texture_size;
        if size < 16 || !size.is_power_of_two() {
            return Err(invalid(&format!(
                "Texture size {} must be a power of two >= 16",
                size
            )));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> AppError {
    AppError::Config(config::ConfigError::Message(message.to_string()))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                max_upload_bytes: default_max_upload_bytes(),
            },
            model: ModelConfig::default(),
            storage: StorageConfig {
                output_dir: default_output_dir(),
            },
            generation: GenerationConfig::default(),
            export: ExportConfig::default(),
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
        }
    }
}
