//! Multi-range dose-response (IC50) dilution planner.
//!
//! Points are generated range by range (upper sparse, dense, lower sparse),
//! each range dividing by its own factor and starting one decay step after the
//! previous range ended. Each non-empty range gets its own protocol section:
//! the first tube is pipetted from whichever stock is in scope, the rest of
//! the range is a serial chain.
//!
//! Tube volumes are sized from the end of the cascade backwards. Every tube is
//! made exactly as much larger than the final volume as is drawn from it
//! afterwards, whether by the next tube of its range or by the first tube of
//! the next range, so every point finishes at the final volume.

use super::serial::MAX_SERIES_TUBES;
use super::serialization::ReportTable;
use super::traits::{ReportSection, TabularReport};
use crate::common::config::DilutionPolicy;
use crate::common::format::format_molar;
use crate::common::units::{Concentration, MICROLITERS_PER_LITER, Volume};
use crate::domain::{Calculator, LabError, LabResult, ProtocolStep, StepAction};
use serde::Serialize;
use std::borrow::Cow;

use super::dilution::{DEFAULT_REAGENT_NAME, DEFAULT_SOLVENT, steps_table};

pub const MAIN_STOCK_LABEL: &str = "Main Stock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    UpperSparse,
    Dense,
    LowerSparse,
}

impl RangeKind {
    pub const ORDER: [RangeKind; 3] = [Self::UpperSparse, Self::Dense, Self::LowerSparse];

    pub const fn label(self) -> &'static str {
        match self {
            Self::UpperSparse => "Upper Sparse Range",
            Self::Dense => "Dense Range",
            Self::LowerSparse => "Lower Sparse Range",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeSpec {
    pub point_count: usize,
    pub factor: f64,
}

impl RangeSpec {
    pub const fn new(point_count: usize, factor: f64) -> Self {
        Self {
            point_count,
            factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CascadeRequest {
    pub reagent_name: String,
    pub solvent: String,
    pub main_stock: Concentration,
    pub highest: Concentration,
    pub molecular_weight: Option<f64>,
    pub final_volume: Volume,
    pub upper_sparse: RangeSpec,
    pub dense: RangeSpec,
    pub lower_sparse: RangeSpec,
}

impl CascadeRequest {
    pub fn new(main_stock: Concentration, highest: Concentration, final_volume: Volume) -> Self {
        Self {
            reagent_name: DEFAULT_REAGENT_NAME.to_string(),
            solvent: DEFAULT_SOLVENT.to_string(),
            main_stock,
            highest,
            molecular_weight: None,
            final_volume,
            upper_sparse: RangeSpec::new(2, 10.0),
            dense: RangeSpec::new(6, 2.0),
            lower_sparse: RangeSpec::new(2, 10.0),
        }
    }

    pub fn with_ranges(
        mut self,
        upper_sparse: RangeSpec,
        dense: RangeSpec,
        lower_sparse: RangeSpec,
    ) -> Self {
        self.upper_sparse = upper_sparse;
        self.dense = dense;
        self.lower_sparse = lower_sparse;
        self
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

    pub fn range(&self, kind: RangeKind) -> RangeSpec {
        match kind {
            RangeKind::UpperSparse => self.upper_sparse,
            RangeKind::Dense => self.dense,
            RangeKind::LowerSparse => self.lower_sparse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadePoint {
    pub index: usize,
    pub range: RangeKind,
    pub concentration_molar: f64,
    pub formatted: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntermediateStock {
    pub factor: f64,
    pub concentration_molar: f64,
    pub source_volume_l: f64,
    pub solvent_volume_l: f64,
}

impl IntermediateStock {
    pub fn total_volume_l(&self) -> f64 {
        self.source_volume_l + self.solvent_volume_l
    }
}

/// Preparation of the first tube of a range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirstTubePrep {
    pub source_label: String,
    pub source_concentration_molar: f64,
    /// Tube volume before anything is drawn from it.
    pub initial_volume_l: f64,
    /// Pipette volume if taken straight from the source.
    pub direct_volume_l: f64,
    pub intermediate: Option<IntermediateStock>,
    pub stock_volume_l: f64,
    pub diluent_volume_l: f64,
    pub below_pipette_floor: bool,
}

impl FirstTubePrep {
    /// Volume this preparation takes out of its source tube.
    pub fn drawn_from_source_l(&self) -> f64 {
        self.intermediate
            .map_or(self.stock_volume_l, |intermediate| intermediate.source_volume_l)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CascadeTube {
    pub point: usize,
    /// Mixed volume before anything is drawn from the tube.
    pub prepared_volume_l: f64,
    /// Taken from the previous tube, or from the range source for the first tube.
    pub intake_volume_l: f64,
    pub diluent_volume_l: f64,
    /// Drawn by the next tube, or by the next range for a range's last tube.
    pub outflow_volume_l: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeRange {
    pub kind: RangeKind,
    pub point_count: usize,
    pub factor: f64,
    pub first_point: usize,
    pub last_point: usize,
    pub starting_concentration_molar: f64,
    pub final_concentration_molar: f64,
    pub preparation: FirstTubePrep,
    pub tubes: Vec<CascadeTube>,
    pub steps: Vec<ProtocolStep>,
}

impl CascadeRange {
    /// Starting concentration of whatever range follows this one.
    pub fn carry_over_molar(&self) -> f64 {
        self.final_concentration_molar / self.factor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeResult {
    pub reagent_name: String,
    pub solvent: String,
    pub main_stock_molar: f64,
    pub final_volume_l: f64,
    pub points: Vec<CascadePoint>,
    pub ranges: Vec<CascadeRange>,
}

impl CascadeResult {
    pub fn concentrations(&self) -> Vec<f64> {
        self.points
            .iter()
            .map(|point| point.concentration_molar)
            .collect()
    }

    pub fn steps(&self) -> impl Iterator<Item = &ProtocolStep> {
        self.ranges.iter().flat_map(|range| range.steps.iter())
    }
}

pub fn plan_cascade(
    request: &CascadeRequest,
    policy: &DilutionPolicy,
) -> LabResult<CascadeResult> {
    policy.validate()?;

    let main_stock_molar = request.main_stock.to_molar(request.molecular_weight)?;
    let highest_molar = request.highest.to_molar(request.molecular_weight)?;
    let final_volume_l = request.final_volume.liters();

    for (name, value) in [
        ("main stock concentration", main_stock_molar),
        ("highest concentration", highest_molar),
        ("final volume", final_volume_l),
    ] {
        if !(value > 0.0) || !value.is_finite() {
            return Err(LabError::invalid_parameter(format!(
                "{name} must be > 0, got {value}"
            )));
        }
    }
    if main_stock_molar <= highest_molar {
        return Err(LabError::concentration_order(format!(
            "highest concentration ({}) must be lower than the main stock concentration ({})",
            format_molar(highest_molar),
            format_molar(main_stock_molar)
        )));
    }

    let mut total_points = 0;
    for kind in RangeKind::ORDER {
        let spec = request.range(kind);
        if spec.point_count > 0 && (!(spec.factor > 1.0) || !spec.factor.is_finite()) {
            return Err(LabError::invalid_parameter(format!(
                "{} factor must be greater than 1, got {}",
                kind.label(),
                spec.factor
            )));
        }
        if spec.point_count > MAX_SERIES_TUBES {
            return Err(LabError::invalid_parameter(format!(
                "{} can have at most {MAX_SERIES_TUBES} points, got {}",
                kind.label(),
                spec.point_count
            )));
        }
        total_points += spec.point_count;
    }
    if total_points == 0 {
        return Err(LabError::invalid_parameter(
            "a dose-response series needs at least one point",
        ));
    }

    let mut points = Vec::with_capacity(total_points);
    let mut layouts = Vec::new();
    let mut current = highest_molar;
    let mut source = (MAIN_STOCK_LABEL.to_string(), main_stock_molar);

    for kind in RangeKind::ORDER {
        let spec = request.range(kind);
        if spec.point_count == 0 {
            tracing::debug!(range = kind.label(), "skipping empty range");
            continue;
        }

        let first_point = points.len() + 1;
        let starting = current;
        for _ in 0..spec.point_count {
            points.push(CascadePoint {
                index: points.len() + 1,
                range: kind,
                concentration_molar: current,
                formatted: format_molar(current),
            });
            current /= spec.factor;
        }
        let last_point = points.len();
        let final_concentration = points[last_point - 1].concentration_molar;

        layouts.push(RangeLayout {
            kind,
            spec,
            first_point,
            last_point,
            starting,
            final_concentration,
            source: std::mem::replace(
                &mut source,
                (point_label(last_point), final_concentration),
            ),
        });
    }

    // Each range has to know what the next one draws from its last tube.
    let min_pipette_l = policy.min_pipette_volume_ul / MICROLITERS_PER_LITER;
    let mut ranges = Vec::with_capacity(layouts.len());
    let mut outflow_l = 0.0;
    for layout in layouts.into_iter().rev() {
        let mut tubes = chain_volumes(
            layout.first_point,
            layout.spec.point_count,
            layout.spec.factor,
            final_volume_l,
            outflow_l,
        );
        let preparation = prepare_first_tube(
            layout.kind,
            layout.starting,
            tubes[0].prepared_volume_l,
            &layout.source,
            min_pipette_l,
            policy,
        );
        tubes[0].intake_volume_l = preparation.stock_volume_l;
        tubes[0].diluent_volume_l = preparation.diluent_volume_l;
        outflow_l = preparation.drawn_from_source_l();

        let steps = range_steps(layout.kind, &preparation, &tubes, &request.solvent);

        tracing::debug!(
            range = layout.kind.label(),
            first_point = layout.first_point,
            last_point = layout.last_point,
            starting = layout.starting,
            drawn_from_source_ul = outflow_l * MICROLITERS_PER_LITER,
            "planned cascade range"
        );

        ranges.push(CascadeRange {
            kind: layout.kind,
            point_count: layout.spec.point_count,
            factor: layout.spec.factor,
            first_point: layout.first_point,
            last_point: layout.last_point,
            starting_concentration_molar: layout.starting,
            final_concentration_molar: layout.final_concentration,
            preparation,
            tubes,
            steps,
        });
    }
    ranges.reverse();

    Ok(CascadeResult {
        reagent_name: request.reagent_name.clone(),
        solvent: request.solvent.clone(),
        main_stock_molar,
        final_volume_l,
        points,
        ranges,
    })
}

/// Concentrations and source of a non-empty range, before volumes are known.
struct RangeLayout {
    kind: RangeKind,
    spec: RangeSpec,
    first_point: usize,
    last_point: usize,
    starting: f64,
    final_concentration: f64,
    source: (String, f64),
}

/// Sizes a range's tubes from the last one back. `outflow_l` is what the next
/// range takes out of the last tube.
fn chain_volumes(
    first_point: usize,
    point_count: usize,
    factor: f64,
    final_volume_l: f64,
    outflow_l: f64,
) -> Vec<CascadeTube> {
    let mut tubes = Vec::with_capacity(point_count);
    let mut outflow_volume_l = outflow_l;
    for offset in (0..point_count).rev() {
        let prepared_volume_l = final_volume_l + outflow_volume_l;
        let intake_volume_l = prepared_volume_l / factor;
        tubes.push(CascadeTube {
            point: first_point + offset,
            prepared_volume_l,
            intake_volume_l,
            diluent_volume_l: prepared_volume_l - intake_volume_l,
            outflow_volume_l,
        });
        outflow_volume_l = intake_volume_l;
    }
    tubes.reverse();
    tubes
}

fn prepare_first_tube(
    kind: RangeKind,
    starting_molar: f64,
    initial_volume_l: f64,
    source: &(String, f64),
    min_pipette_l: f64,
    policy: &DilutionPolicy,
) -> FirstTubePrep {
    let (source_label, source_molar) = (source.0.clone(), source.1);
    let direct_volume_l = starting_molar * initial_volume_l / source_molar;

    let (intermediate, stock_volume_l) = if direct_volume_l < min_pipette_l {
        tracing::warn!(
            range = kind.label(),
            direct_volume_ul = direct_volume_l * MICROLITERS_PER_LITER,
            "direct pipetting volume below floor, inserting an intermediate stock"
        );
        let factor = policy.intermediate_factor;
        let total_l = policy.intermediate_volume_ul / MICROLITERS_PER_LITER;
        let source_volume_l = total_l / factor;
        let intermediate = IntermediateStock {
            factor,
            concentration_molar: source_molar / factor,
            source_volume_l,
            solvent_volume_l: total_l - source_volume_l,
        };
        let stock_volume_l = starting_molar * initial_volume_l / intermediate.concentration_molar;
        (Some(intermediate), stock_volume_l)
    } else {
        (None, direct_volume_l)
    };

    let below_pipette_floor = stock_volume_l < min_pipette_l;
    if below_pipette_floor {
        tracing::warn!(
            range = kind.label(),
            stock_volume_ul = stock_volume_l * MICROLITERS_PER_LITER,
            "pipetting volume is still below the floor after the intermediate stock"
        );
    }
    if let Some(intermediate) = intermediate
        && stock_volume_l > intermediate.total_volume_l()
    {
        tracing::warn!(
            range = kind.label(),
            needed_ul = stock_volume_l * MICROLITERS_PER_LITER,
            prepared_ul = intermediate.total_volume_l() * MICROLITERS_PER_LITER,
            "intermediate stock volume is smaller than the volume drawn from it"
        );
    }

    FirstTubePrep {
        source_label,
        source_concentration_molar: source_molar,
        initial_volume_l,
        direct_volume_l,
        intermediate,
        stock_volume_l,
        diluent_volume_l: initial_volume_l - stock_volume_l,
        below_pipette_floor,
    }
}

fn point_label(point: usize) -> String {
    format!("Point #{point}")
}

fn range_steps(
    kind: RangeKind,
    preparation: &FirstTubePrep,
    tubes: &[CascadeTube],
    solvent: &str,
) -> Vec<ProtocolStep> {
    let label = kind.label();
    let mut steps = Vec::with_capacity(tubes.len() * 2 + 2);

    let pipette_source = match preparation.intermediate {
        Some(intermediate) => {
            let intermediate_label = format!("Intermediate Stock (1:{})", intermediate.factor);
            let task = format!("{label}: Prepare Intermediate Stock");
            steps.push(ProtocolStep::new(
                task.clone(),
                StepAction::Transfer {
                    volume_l: intermediate.source_volume_l,
                },
                preparation.source_label.clone(),
                intermediate_label.clone(),
            ));
            steps.push(ProtocolStep::new(
                task,
                StepAction::Add {
                    volume_l: intermediate.solvent_volume_l,
                },
                solvent,
                intermediate_label.clone(),
            ));
            intermediate_label
        }
        None => preparation.source_label.clone(),
    };

    let Some((first, rest)) = tubes.split_first() else {
        return steps;
    };
    let first_label = point_label(first.point);
    let task = format!("{label}: Prepare {first_label}");
    steps.push(ProtocolStep::new(
        task.clone(),
        StepAction::Transfer {
            volume_l: first.intake_volume_l,
        },
        pipette_source,
        first_label.clone(),
    ));
    steps.push(ProtocolStep::new(
        task,
        StepAction::Add {
            volume_l: first.diluent_volume_l,
        },
        solvent,
        first_label,
    ));

    for tube in rest {
        steps.push(ProtocolStep::new(
            format!("{label}: Prepare {}", point_label(tube.point)),
            StepAction::Add {
                volume_l: tube.diluent_volume_l,
            },
            solvent,
            point_label(tube.point),
        ));
    }
    for tube in rest {
        steps.push(ProtocolStep::new(
            format!("{label}: Dilute {}", point_label(tube.point)),
            StepAction::Transfer {
                volume_l: tube.intake_volume_l,
            },
            point_label(tube.point - 1),
            point_label(tube.point),
        ));
    }
    steps
}

impl TabularReport for CascadeResult {
    fn calculator(&self) -> Calculator {
        Calculator::Ic50Cascade
    }

    fn sections(&self) -> &'static [ReportSection] {
        &[ReportSection::Protocol, ReportSection::Summary]
    }

    fn report_table(&self, section: ReportSection) -> Option<ReportTable> {
        match section {
            ReportSection::Protocol => {
                let steps: Vec<ProtocolStep> = self.steps().cloned().collect();
                Some(steps_table(&steps))
            }
            ReportSection::Summary => {
                let mut table = ReportTable::new(["Point #", "Range", "Final Concentration"]);
                for point in &self.points {
                    table.push_row([
                        point.index.to_string(),
                        point.range.label().to_string(),
                        point.formatted.clone(),
                    ]);
                }
                Some(table)
            }
        }
    }

    fn export_stem(&self, section: ReportSection) -> Cow<'static, str> {
        match section {
            ReportSection::Protocol => Cow::Borrowed("IC50_protocol"),
            ReportSection::Summary => Cow::Borrowed("IC50_protocol_summary"),
        }
    }
}
