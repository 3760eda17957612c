pub mod errors;

pub use errors::{LabError, LabErrorCategory, LabErrorKind, LabResult};

use crate::common::format::{format_grouped, format_microliters};
use serde::Serialize;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Calculator {
    Dilution,
    SerialDilution,
    Ic50Cascade,
    FullFactorial,
    BoxBehnken,
    ReagentList,
}

impl Calculator {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dilution => "DILUTION",
            Self::SerialDilution => "SERIAL",
            Self::Ic50Cascade => "IC50",
            Self::FullFactorial => "FACTORIAL",
            Self::BoxBehnken => "BBD",
            Self::ReagentList => "REAGENTS",
        }
    }
}

impl Display for Calculator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Bench action; volumes are liters and masses are grams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    Weigh { mass_g: f64 },
    Add { volume_l: f64 },
    Transfer { volume_l: f64 },
    Discard { volume_l: f64 },
}

impl StepAction {
    pub fn volume_l(&self) -> Option<f64> {
        match *self {
            Self::Weigh { .. } => None,
            Self::Add { volume_l } | Self::Transfer { volume_l } | Self::Discard { volume_l } => {
                Some(volume_l)
            }
        }
    }
}

impl Display for StepAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Weigh { mass_g } => write!(f, "Weigh {} mg", format_grouped(mass_g * 1.0e3, 4)),
            Self::Add { volume_l } => write!(f, "Add {}", format_microliters(volume_l)),
            Self::Transfer { volume_l } => write!(f, "Transfer {}", format_microliters(volume_l)),
            Self::Discard { volume_l } => write!(f, "Discard {}", format_microliters(volume_l)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolStep {
    pub task: String,
    pub action: StepAction,
    pub source: String,
    pub destination: String,
}

impl ProtocolStep {
    pub fn new(
        task: impl Into<String>,
        action: StepAction,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            task: task.into(),
            action,
            source: source.into(),
            destination: destination.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Calculator, ProtocolStep, StepAction};

    #[test]
    fn calculator_labels_are_stable() {
        assert_eq!(Calculator::SerialDilution.to_string(), "SERIAL");
        assert_eq!(Calculator::Ic50Cascade.as_str(), "IC50");
    }

    #[test]
    fn step_actions_render_in_bench_units() {
        let transfer = ProtocolStep::new(
            "Final Dilution",
            StepAction::Transfer { volume_l: 1.0e-5 },
            "Main Stock",
            "Final Tube",
        );
        assert_eq!(transfer.action.to_string(), "Transfer 10.00 µL");
        assert_eq!(transfer.action.volume_l(), Some(1.0e-5));

        let weigh = StepAction::Weigh { mass_g: 0.0584 };
        assert_eq!(weigh.to_string(), "Weigh 58.4000 mg");
        assert_eq!(weigh.volume_l(), None);
    }
}
