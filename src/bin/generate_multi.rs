//! Multiview generator: `img3d-generate-multi <image_dir> <output_prefix>`

use clap::Parser;
use img_to_3d_serving::{
    cli::{self, MultiArgs},
    config::LoggingConfig,
    logging,
    pipeline::ManifestLoader,
};
use std::sync::Arc;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = MultiArgs::parse();

    logging::init_tracing(&LoggingConfig {
        level: "info".to_string(),
        format: args.options.log_format.clone(),
    })?;

    match cli::run_multi(&args, Arc::new(ManifestLoader)).await {
        Ok(report) => {
            print!("{}", report.render());
            std::process::exit(report.exit_code());
        }
        Err(e) => {
            error!(error = %e, "Multiview generation failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
