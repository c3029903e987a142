//! API response models

use serde::{Deserialize, Serialize};

use crate::serving::ResourceState;

/// Operating mode reported by `/health`
pub const MODE_RAW_MESH_OBJ: &str = "raw_mesh_obj";

/// Routes advertised by `/health`
pub const ENDPOINTS: [&str; 3] = ["/health", "/generate-raw-obj", "/generate-obj"];

/// Health check response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub model_loaded: bool,
    pub mode: String,
    pub endpoints: Vec<String>,
    pub state: ResourceState,
    pub load_failures: u64,
    pub last_load_error: Option<String>,
    pub generation: GenerationStatus,
}

/// Generation lock occupancy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationStatus {
    /// 0 or 1
    pub active: usize,
    pub waiting: usize,
    pub completed: u64,
}

/// Index response pointing at the useful routes
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RootResponse {
    pub ok: bool,
    #[serde(rename = "try")]
    pub try_routes: Vec<String>,
}
