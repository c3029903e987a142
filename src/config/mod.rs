//! Configuration module

mod settings;

pub use settings::{
    ExportConfig, GenerationConfig, LoggingConfig, ModelConfig, ServerConfig, Settings,
    StorageConfig,
};
