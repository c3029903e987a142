//! Single-image generator: `img3d-generate <image_path> <output_prefix>`

use clap::Parser;
use img_to_3d_serving::{
    cli::{self, SingleArgs},
    config::LoggingConfig,
    logging,
    pipeline::ManifestLoader,
};
use std::sync::Arc;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = SingleArgs::parse();

    logging::init_tracing(&LoggingConfig {
        level: "info".to_string(),
        format: args.options.log_format.clone(),
    })?;

    match cli::run_single(&args, Arc::new(ManifestLoader)).await {
        Ok(report) => {
            print!("{}", report.render());
            std::process::exit(report.exit_code());
        }
        Err(e) => {
            error!(error = %e, "Generation failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
