// dwi-connectome/examples/plan_subject.rs

//! Plans one subject from `DWI_*` environment variables (or `.env`) and
//! writes the bash script without running any tool.
//!
//!   DWI_SUBJECT=01 DWI_BIDS_DIR=/data DWI_FREESURFER_DIR=/fs \
//!     cargo run --example plan_subject

use dwi_connectome::logging::init_tracing;
use dwi_connectome::{exit_code, PipelineDriver, ProcessingConfig, RunParameters};
use tracing::{error, info};

#[tokio::main]
async fn main() {
  init_tracing(1);

  let config = match RunParameters::from_env().and_then(|mut params| {
    params.dry_run = true;
    ProcessingConfig::new(params)
  }) {
    Ok(config) => config,
    Err(e) => {
      error!("{}", e);
      std::process::exit(e.exit_code());
    }
  };

  let driver = PipelineDriver::local(&config);
  let result = driver.run(config).await;
  match &result {
    Ok(status) => {
      info!("{}", status.summary());
      info!("Script written to {}", status.script().display());
    }
    Err(e) => {
      for line in e.detail_lines() {
        error!("{}", line);
      }
    }
  }
  std::process::exit(exit_code(&result));
}
