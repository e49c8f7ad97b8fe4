// dwi-connectome/src/acquisition/enums.rs

//! Discrete classifications that drive variant selection.

use crate::error::DwiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellType {
  SingleShell,
  MultiShell,
}

/// How susceptibility distortions will be corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionStrategy {
  /// Reverse phase-encoded DWI pair (topup + eddy).
  RpePair,
  /// Phase-difference fieldmap with magnitude images.
  Fieldmap,
  /// Nothing available; eddy-only correction.
  None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
  #[default]
  Human,
  /// Non-human primate. Parsed and carried through, but no recipe is registered.
  Nhp,
}

impl ShellType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ShellType::SingleShell => "single_shell",
      ShellType::MultiShell => "multi_shell",
    }
  }
}

impl DistortionStrategy {
  pub fn as_str(&self) -> &'static str {
    match self {
      DistortionStrategy::RpePair => "rpe_pair",
      DistortionStrategy::Fieldmap => "fieldmap",
      DistortionStrategy::None => "none",
    }
  }
}

impl Species {
  pub fn as_str(&self) -> &'static str {
    match self {
      Species::Human => "human",
      Species::Nhp => "nhp",
    }
  }
}

impl fmt::Display for ShellType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl fmt::Display for DistortionStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl fmt::Display for Species {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Species {
  type Err = DwiError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "human" => Ok(Species::Human),
      "nhp" => Ok(Species::Nhp),
      other => Err(DwiError::configuration(
        "species",
        format!("unknown species '{}', expected 'human' or 'nhp'", other),
      )),
    }
  }
}
