// tests/config_env_tests.rs
mod common;

use dwi_connectome::{ErrorKind, RunParameters, Species};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

const VARS: &[&str] = &[
  "DWI_SUBJECT",
  "DWI_SESSION",
  "DWI_BIDS_DIR",
  "DWI_FREESURFER_DIR",
  "DWI_OUTPUT_DIR",
  "DWI_WORK_DIR",
  "DWI_N_THREADS",
  "DWI_SPECIES",
  "DWI_RERUN",
  "DWI_DRY_RUN",
  "DWI_MASK",
  "MRTRIX_LUTS",
];

fn clear() {
  for var in VARS {
    env::remove_var(var);
  }
}

#[test]
#[serial]
fn defaults_apply_when_unset() {
  common::setup_tracing();
  clear();
  env::set_var("DWI_SUBJECT", "sub-07");
  let params = RunParameters::from_env().unwrap();
  assert_eq!(params.subject, "sub-07");
  assert_eq!(params.bids_dir, PathBuf::from("/data"));
  assert_eq!(params.work_dir, PathBuf::from("/tmp/work"));
  assert_eq!(params.n_threads, 4);
  assert_eq!(params.species, Species::Human);
  assert!(!params.rerun && !params.dry_run);
  clear();
}

#[test]
#[serial]
fn explicit_values_are_parsed() {
  clear();
  env::set_var("DWI_SUBJECT", "07");
  env::set_var("DWI_SESSION", "ses-post");
  env::set_var("DWI_N_THREADS", "8");
  env::set_var("DWI_SPECIES", "nhp");
  env::set_var("DWI_RERUN", "yes");
  env::set_var("MRTRIX_LUTS", "/opt/luts");
  let params = RunParameters::from_env().unwrap();
  assert_eq!(params.session.as_deref(), Some("ses-post"));
  assert_eq!(params.n_threads, 8);
  assert_eq!(params.species, Species::Nhp);
  assert!(params.rerun);
  assert_eq!(params.lut_dir, Some(PathBuf::from("/opt/luts")));
  clear();
}

#[test]
#[serial]
fn bad_values_are_configuration_errors() {
  clear();
  assert_eq!(RunParameters::from_env().unwrap_err().kind(), ErrorKind::Configuration);

  env::set_var("DWI_SUBJECT", "07");
  env::set_var("DWI_N_THREADS", "many");
  assert_eq!(RunParameters::from_env().unwrap_err().kind(), ErrorKind::Configuration);
  clear();
}
