//! Bench policy constants shared by the calculators.
//!
//! The two-stage threshold and the intermediate-stock heuristic are lab
//! conventions rather than derived quantities, so they are loaded from a JSON
//! policy file when one is supplied and fall back to the defaults below.

use crate::domain::{LabError, LabErrorKind, LabResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TWO_STAGE_THRESHOLD: f64 = 100.0;
pub const DEFAULT_FIRST_STAGE_FACTOR: f64 = 100.0;
pub const DEFAULT_FIRST_STAGE_VOLUME_L: f64 = 1.0e-3;
pub const DEFAULT_MIN_PIPETTE_VOLUME_UL: f64 = 1.0;
pub const DEFAULT_INTERMEDIATE_FACTOR: f64 = 10.0;
pub const DEFAULT_INTERMEDIATE_VOLUME_UL: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DilutionPolicy {
    /// Single-step dilution factors above this recommend a two-stage protocol.
    pub two_stage_threshold: f64,
    pub first_stage_factor: f64,
    pub first_stage_volume_l: f64,
    pub min_pipette_volume_ul: f64,
    /// Fixed pre-dilution used by the IC50 planner below the pipetting floor.
    pub intermediate_factor: f64,
    pub intermediate_volume_ul: f64,
}

impl Default for DilutionPolicy {
    fn default() -> Self {
        Self {
            two_stage_threshold: DEFAULT_TWO_STAGE_THRESHOLD,
            first_stage_factor: DEFAULT_FIRST_STAGE_FACTOR,
            first_stage_volume_l: DEFAULT_FIRST_STAGE_VOLUME_L,
            min_pipette_volume_ul: DEFAULT_MIN_PIPETTE_VOLUME_UL,
            intermediate_factor: DEFAULT_INTERMEDIATE_FACTOR,
            intermediate_volume_ul: DEFAULT_INTERMEDIATE_VOLUME_UL,
        }
    }
}

impl DilutionPolicy {
    pub fn validate(&self) -> LabResult<()> {
        let factors = [
            ("twoStageThreshold", self.two_stage_threshold),
            ("firstStageFactor", self.first_stage_factor),
            ("intermediateFactor", self.intermediate_factor),
        ];
        for (name, value) in factors {
            if !(value > 1.0) || !value.is_finite() {
                return Err(LabError::invalid_parameter(format!(
                    "policy {name} must be a finite factor > 1, got {value}"
                )));
            }
        }

        if self.first_stage_factor > self.two_stage_threshold {
            return Err(LabError::invalid_parameter(format!(
                "policy firstStageFactor ({}) must not exceed twoStageThreshold ({})",
                self.first_stage_factor, self.two_stage_threshold
            )));
        }

        let volumes = [
            ("firstStageVolumeL", self.first_stage_volume_l),
            ("minPipetteVolumeUl", self.min_pipette_volume_ul),
            ("intermediateVolumeUl", self.intermediate_volume_ul),
        ];
        for (name, value) in volumes {
            if !(value > 0.0) || !value.is_finite() {
                return Err(LabError::invalid_parameter(format!(
                    "policy {name} must be a finite volume > 0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DilutionPolicyError {
    #[error("failed to read dilution policy '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse dilution policy '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<DilutionPolicyError> for LabError {
    fn from(error: DilutionPolicyError) -> Self {
        LabError::new(LabErrorKind::Policy, error.to_string())
    }
}

pub fn load_dilution_policy(
    policy_path: impl AsRef<Path>,
) -> Result<DilutionPolicy, DilutionPolicyError> {
    let policy_path = policy_path.as_ref();
    let source = fs::read_to_string(policy_path).map_err(|source| DilutionPolicyError::Read {
        path: policy_path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&source).map_err(|source| DilutionPolicyError::Parse {
        path: policy_path.to_path_buf(),
        source,
    })
}
