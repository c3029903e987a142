//! Serving module - shared pipeline handle, generation lock, job workspaces
//! and request orchestration

pub mod handle;
pub mod job;
pub mod serializer;
pub mod workspace;

pub use handle::{PipelineHandle, ResourceState};
pub use job::{GenerationService, JobArtifact, JobStage, UploadedImage};
pub use serializer::{GenerationSerializer, SerializerConfig};
pub use workspace::{JobWorkspace, WorkspaceManager};
