//! Constant-volume serial dilution series.
//!
//! Tube 1 is made `transfer` larger than the final volume because it donates
//! that much to tube 2; every intermediate tube receives the same diluent and
//! then passes `transfer` on, so all tubes finish at the shared final volume.

use super::serialization::ReportTable;
use super::traits::{ReportSection, TabularReport};
use crate::common::format::{format_mass_conc, format_molar, format_quantity};
use crate::common::units::{Concentration, MICROLITERS_PER_LITER, Volume, normalize_symbol};
use crate::domain::{Calculator, LabError, LabResult, ProtocolStep, StepAction};
use crate::numerics::geometric_decay;
use serde::Serialize;
use std::borrow::Cow;

use super::dilution::{DEFAULT_REAGENT_NAME, DEFAULT_SOLVENT, steps_table};

/// Longest series a single chain (or cascade range) may plan.
pub const MAX_SERIES_TUBES: usize = 20;

/// Volumes for one constant-volume chain of `tube_count` tubes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SerialVolumes {
    pub final_volume_l: f64,
    pub factor: f64,
    pub tube_count: usize,
    pub transfer_volume_l: f64,
    /// Volume prepared in tube 1 before it donates to tube 2.
    pub intermediate_volume_l: f64,
    pub stock_for_first_l: f64,
    pub diluent_for_first_l: f64,
    pub diluent_for_last_l: f64,
    pub total_diluent_l: f64,
}

impl SerialVolumes {
    pub fn new(final_volume_l: f64, factor: f64, tube_count: usize) -> LabResult<Self> {
        validate_series_shape(final_volume_l, factor, tube_count)?;

        let transfer_volume_l = final_volume_l / (factor - 1.0);
        let intermediate_volume_l = final_volume_l + transfer_volume_l;
        let diluent_for_last_l = final_volume_l - final_volume_l / factor;

        let (stock_for_first_l, diluent_for_first_l, total_diluent_l) = if tube_count > 1 {
            let stock = intermediate_volume_l / factor;
            let diluent = intermediate_volume_l - stock;
            (
                stock,
                diluent,
                diluent * (tube_count - 1) as f64 + diluent_for_last_l,
            )
        } else {
            (final_volume_l / factor, diluent_for_last_l, diluent_for_last_l)
        };

        Ok(Self {
            final_volume_l,
            factor,
            tube_count,
            transfer_volume_l,
            intermediate_volume_l,
            stock_for_first_l,
            diluent_for_first_l,
            diluent_for_last_l,
            total_diluent_l,
        })
    }

    /// Diluent placed in `tube` (1-based) before any transfer arrives.
    pub fn diluent_for_tube(&self, tube: usize) -> f64 {
        if tube >= self.tube_count {
            self.diluent_for_last_l
        } else {
            self.diluent_for_first_l
        }
    }
}

fn validate_series_shape(final_volume_l: f64, factor: f64, tube_count: usize) -> LabResult<()> {
    if !(factor > 1.0) || !factor.is_finite() {
        return Err(LabError::invalid_parameter(format!(
            "dilution factor must be greater than 1, got {factor}"
        )));
    }
    if tube_count == 0 {
        return Err(LabError::invalid_parameter(
            "a serial dilution needs at least one tube",
        ));
    }
    if tube_count > MAX_SERIES_TUBES {
        return Err(LabError::invalid_parameter(format!(
            "a serial dilution can have at most {MAX_SERIES_TUBES} tubes, got {tube_count}"
        )));
    }
    if !(final_volume_l > 0.0) || !final_volume_l.is_finite() {
        return Err(LabError::invalid_parameter(format!(
            "final volume per tube must be > 0, got {final_volume_l} L"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SerialRequest {
    pub reagent_name: String,
    pub solvent: String,
    pub stock_value: f64,
    pub stock_unit: String,
    pub stock: Concentration,
    pub factor: f64,
    pub tube_count: usize,
    pub final_volume: Volume,
    pub molecular_weight: Option<f64>,
}

impl SerialRequest {
    pub fn new(
        stock_value: f64,
        stock_unit: &str,
        factor: f64,
        tube_count: usize,
        final_volume: Volume,
    ) -> LabResult<Self> {
        let stock = Concentration::parse(stock_value, stock_unit)?;
        Ok(Self {
            reagent_name: DEFAULT_REAGENT_NAME.to_string(),
            solvent: DEFAULT_SOLVENT.to_string(),
            stock_value,
            stock_unit: normalize_symbol(stock_unit),
            stock,
            factor,
            tube_count,
            final_volume,
            molecular_weight: None,
        })
    }

    pub fn with_reagent_name(mut self, name: impl Into<String>) -> Self {
        self.reagent_name = name.into();
        self
    }

    pub fn with_solvent(mut self, solvent: impl Into<String>) -> Self {
        self.solvent = solvent.into();
        self
    }

    pub fn with_molecular_weight(mut self, molecular_weight: Option<f64>) -> Self {
        self.molecular_weight = molecular_weight;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcentrationBasis {
    Molar,
    MassPerVolume,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerialTube {
    pub index: usize,
    /// In the stock's own unit.
    pub concentration_raw: f64,
    /// In M or g/L depending on the series basis.
    pub concentration_base: f64,
    pub formatted: String,
    pub diluent_volume_l: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerialResult {
    pub reagent_name: String,
    pub solvent: String,
    pub stock_unit: String,
    pub basis: ConcentrationBasis,
    pub volumes: SerialVolumes,
    pub tubes: Vec<SerialTube>,
    pub steps: Vec<ProtocolStep>,
}

impl SerialResult {
    pub fn transfer_volume_ul(&self) -> f64 {
        self.volumes.transfer_volume_l * MICROLITERS_PER_LITER
    }

    pub fn total_stock_ul(&self) -> f64 {
        self.volumes.stock_for_first_l * MICROLITERS_PER_LITER
    }

    pub fn total_diluent_ul(&self) -> f64 {
        self.volumes.total_diluent_l * MICROLITERS_PER_LITER
    }

    pub fn concentrations(&self) -> Vec<f64> {
        self.tubes.iter().map(|tube| tube.concentration_base).collect()
    }
}

pub fn plan_serial_dilution(request: &SerialRequest) -> LabResult<SerialResult> {
    let volumes = SerialVolumes::new(
        request.final_volume.liters(),
        request.factor,
        request.tube_count,
    )?;
    if !(request.stock.base_value() > 0.0) || !request.stock.base_value().is_finite() {
        return Err(LabError::invalid_parameter(format!(
            "stock concentration must be > 0, got {} {}",
            request.stock_value, request.stock_unit
        )));
    }
    tracing::debug!(
        factor = request.factor,
        tubes = request.tube_count,
        transfer_volume_l = volumes.transfer_volume_l,
        total_diluent_l = volumes.total_diluent_l,
        "planned serial dilution volumes"
    );

    let (basis, stock_base) = match request.stock {
        Concentration::Molar(value) => (ConcentrationBasis::Molar, value),
        Concentration::MassPerVolume(value) => match request.molecular_weight {
            Some(mw) if mw > 0.0 => (
                ConcentrationBasis::Molar,
                request.stock.to_molar(Some(mw))?,
            ),
            _ => (ConcentrationBasis::MassPerVolume, value),
        },
    };

    // Skip the stock itself: tube k holds stock / factor^k.
    let count = request.tube_count + 1;
    let raw = geometric_decay(request.stock_value, request.factor, count);
    let base = geometric_decay(stock_base, request.factor, count);

    let tubes = raw
        .into_iter()
        .zip(base)
        .skip(1)
        .enumerate()
        .map(|(offset, (concentration_raw, concentration_base))| {
            let index = offset + 1;
            SerialTube {
                index,
                concentration_raw,
                concentration_base,
                formatted: match basis {
                    ConcentrationBasis::Molar => format_molar(concentration_base),
                    ConcentrationBasis::MassPerVolume => format_mass_conc(concentration_base),
                },
                diluent_volume_l: volumes.diluent_for_tube(index),
            }
        })
        .collect();

    Ok(SerialResult {
        reagent_name: request.reagent_name.clone(),
        solvent: request.solvent.clone(),
        stock_unit: request.stock_unit.clone(),
        basis,
        volumes,
        tubes,
        steps: serial_steps(&volumes, &request.solvent),
    })
}

fn serial_steps(volumes: &SerialVolumes, solvent: &str) -> Vec<ProtocolStep> {
    let count = volumes.tube_count;
    let mut steps = Vec::with_capacity(count * 2 + 2);

    for tube in 1..=count {
        steps.push(ProtocolStep::new(
            format!("Prepare Tube {tube}"),
            StepAction::Add {
                volume_l: volumes.diluent_for_tube(tube),
            },
            solvent,
            format!("Tube {tube}"),
        ));
    }
    steps.push(ProtocolStep::new(
        "Start Series",
        StepAction::Transfer {
            volume_l: volumes.stock_for_first_l,
        },
        "Main Stock",
        "Tube 1",
    ));
    for tube in 1..count {
        steps.push(ProtocolStep::new(
            format!("Dilute {}", tube + 1),
            StepAction::Transfer {
                volume_l: volumes.transfer_volume_l,
            },
            format!("Tube {tube}"),
            format!("Tube {}", tube + 1),
        ));
    }
    if count > 1 {
        steps.push(ProtocolStep::new(
            "Finish Series",
            StepAction::Discard {
                volume_l: volumes.transfer_volume_l,
            },
            format!("Tube {count}"),
            "Waste",
        ));
    }
    steps
}

impl TabularReport for SerialResult {
    fn calculator(&self) -> Calculator {
        Calculator::SerialDilution
    }

    fn sections(&self) -> &'static [ReportSection] {
        &[ReportSection::Protocol, ReportSection::Summary]
    }

    fn report_table(&self, section: ReportSection) -> Option<ReportTable> {
        match section {
            ReportSection::Protocol => {
                let mut table = steps_table(&self.steps);
                table.headers[0] = "Step".to_string();
                Some(table)
            }
            ReportSection::Summary => {
                let mut table = ReportTable::new([
                    "Tube #",
                    "Final Concentration (Raw)",
                    "Final Concentration (Formatted)",
                ]);
                for tube in &self.tubes {
                    table.push_row([
                        tube.index.to_string(),
                        format_quantity(tube.concentration_raw, &self.stock_unit),
                        tube.formatted.clone(),
                    ]);
                }
                Some(table)
            }
        }
    }

    fn export_stem(&self, section: ReportSection) -> Cow<'static, str> {
        match section {
            ReportSection::Protocol => Cow::Borrowed("serial_dilution_protocol"),
            ReportSection::Summary => Cow::Borrowed("serial_dilution"),
        }
    }
}
