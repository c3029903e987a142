//! Pipeline module - the generative resource behind the serving core

pub mod manifest;
pub mod relief;
pub mod remote;
pub mod traits;

pub use manifest::{ManifestLoader, PipelineManifest};
pub use traits::{
    Device, GaussianSplat, ImageTo3dPipeline, MeshData, OutputSummary, PipelineLoader,
    PipelineOutput, RadianceField,
};
