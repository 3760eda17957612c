//! Single-step dilution from a liquid stock, or from a stock first prepared
//! by dissolving a weighed solid.

use super::serialization::ReportTable;
use super::traits::{ReportSection, TabularReport};
use crate::common::config::DilutionPolicy;
use crate::common::units::{Concentration, MICROLITERS_PER_LITER, Volume};
use crate::domain::{Calculator, LabError, LabResult, ProtocolStep, StepAction};
use serde::Serialize;
use std::borrow::Cow;

pub const DEFAULT_SOLVENT: &str = "Water";
pub const DEFAULT_REAGENT_NAME: &str = "My Reagent";
/// Keeps a factor of exactly the threshold (up to rounding) on the direct path.
const THRESHOLD_EPSILON: f64 = 1.0e-9;

pub const SOLVENT_OPTIONS: [&str; 6] = [
    "Water",
    "PBS",
    "DMSO",
    "Ethanol",
    "Methanol",
    "Culture Medium",
];

#[derive(Debug, Clone, PartialEq)]
pub struct DilutionRequest {
    pub reagent_name: String,
    pub solvent: String,
    pub stock: Concentration,
    pub target: Concentration,
    pub final_volume: Volume,
    pub molecular_weight: Option<f64>,
    /// Volume of stock to make from solid; `stock` is then the desired
    /// concentration of that freshly prepared stock.
    pub solid_stock_volume: Option<Volume>,
}

impl DilutionRequest {
    pub fn new(stock: Concentration, target: Concentration, final_volume: Volume) -> Self {
        Self {
            reagent_name: DEFAULT_REAGENT_NAME.to_string(),
            solvent: DEFAULT_SOLVENT.to_string(),
            stock,
            target,
            final_volume,
            molecular_weight: None,
            solid_stock_volume: None,
        }
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

    pub fn with_solid_prep(mut self, stock_volume: Volume) -> Self {
        self.solid_stock_volume = Some(stock_volume);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolidPrepResult {
    pub mass_g: f64,
    pub stock_volume_l: f64,
}

impl SolidPrepResult {
    pub fn mass_mg(&self) -> f64 {
        self.mass_g * 1.0e3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TwoStagePlan {
    pub first_stage_factor: f64,
    pub intermediate_volume_l: f64,
    pub stock_for_intermediate_l: f64,
    pub diluent_for_intermediate_l: f64,
    pub second_stage_factor: f64,
    pub intermediate_for_final_l: f64,
    pub diluent_for_final_l: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DilutionPlan {
    Direct,
    TwoStage(TwoStagePlan),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DilutionResult {
    pub reagent_name: String,
    pub solvent: String,
    pub stock_molar: f64,
    pub target_molar: f64,
    pub final_volume_l: f64,
    pub dilution_factor: f64,
    pub stock_volume_l: f64,
    pub diluent_volume_l: f64,
    pub solid_prep: Option<SolidPrepResult>,
    pub plan: DilutionPlan,
    pub steps: Vec<ProtocolStep>,
}

impl DilutionResult {
    pub fn stock_volume_ul(&self) -> f64 {
        self.stock_volume_l * MICROLITERS_PER_LITER
    }

    pub fn diluent_volume_ul(&self) -> f64 {
        self.diluent_volume_l * MICROLITERS_PER_LITER
    }

    pub fn is_two_stage(&self) -> bool {
        matches!(self.plan, DilutionPlan::TwoStage(_))
    }
}

pub fn calculate_dilution(
    request: &DilutionRequest,
    policy: &DilutionPolicy,
) -> LabResult<DilutionResult> {
    policy.validate()?;

    let stock_molar = request.stock.to_molar(request.molecular_weight)?;
    let target_molar = request.target.to_molar(request.molecular_weight)?;
    let final_volume_l = request.final_volume.liters();

    let solid_prep = match request.solid_stock_volume {
        Some(stock_volume) => Some(solid_prep_for(
            stock_molar,
            stock_volume.liters(),
            request.molecular_weight,
        )?),
        None => None,
    };

    for (name, value) in [
        ("stock concentration", stock_molar),
        ("target concentration", target_molar),
        ("final volume", final_volume_l),
    ] {
        if !(value > 0.0) || !value.is_finite() {
            return Err(LabError::invalid_parameter(format!(
                "{name} must be > 0, got {value}"
            )));
        }
    }
    if stock_molar <= target_molar {
        return Err(LabError::concentration_order(format!(
            "target concentration ({target_molar} M) must be lower than stock concentration ({stock_molar} M)"
        )));
    }

    let dilution_factor = stock_molar / target_molar;
    let stock_volume_l = target_molar * final_volume_l / stock_molar;
    let diluent_volume_l = final_volume_l - stock_volume_l;
    tracing::debug!(
        dilution_factor,
        stock_volume_l,
        diluent_volume_l,
        "computed single-step dilution"
    );

    let plan = if dilution_factor > policy.two_stage_threshold * (1.0 + THRESHOLD_EPSILON) {
        tracing::warn!(
            dilution_factor,
            threshold = policy.two_stage_threshold,
            "large dilution factor, recommending a two-stage protocol"
        );
        DilutionPlan::TwoStage(two_stage_plan(dilution_factor, final_volume_l, policy))
    } else {
        DilutionPlan::Direct
    };

    let steps = protocol_steps(request, solid_prep, plan, stock_volume_l, diluent_volume_l);

    Ok(DilutionResult {
        reagent_name: request.reagent_name.clone(),
        solvent: request.solvent.clone(),
        stock_molar,
        target_molar,
        final_volume_l,
        dilution_factor,
        stock_volume_l,
        diluent_volume_l,
        solid_prep,
        plan,
        steps,
    })
}

fn solid_prep_for(
    stock_molar: f64,
    stock_volume_l: f64,
    molecular_weight: Option<f64>,
) -> LabResult<SolidPrepResult> {
    let molecular_weight = molecular_weight.unwrap_or(0.0);
    if !(molecular_weight > 0.0) || !(stock_molar > 0.0) || !(stock_volume_l > 0.0) {
        return Err(LabError::invalid_parameter(
            "MW, stock concentration, and stock volume must be > 0 to prepare a stock from solid",
        ));
    }
    Ok(SolidPrepResult {
        mass_g: stock_molar * stock_volume_l * molecular_weight,
        stock_volume_l,
    })
}

fn two_stage_plan(
    dilution_factor: f64,
    final_volume_l: f64,
    policy: &DilutionPolicy,
) -> TwoStagePlan {
    let first_stage_factor = policy.first_stage_factor;
    let intermediate_volume_l = policy.first_stage_volume_l;
    let stock_for_intermediate_l = intermediate_volume_l / first_stage_factor;
    let second_stage_factor = dilution_factor / first_stage_factor;
    let intermediate_for_final_l = final_volume_l / second_stage_factor;

    TwoStagePlan {
        first_stage_factor,
        intermediate_volume_l,
        stock_for_intermediate_l,
        diluent_for_intermediate_l: intermediate_volume_l - stock_for_intermediate_l,
        second_stage_factor,
        intermediate_for_final_l,
        diluent_for_final_l: final_volume_l - intermediate_for_final_l,
    }
}

fn protocol_steps(
    request: &DilutionRequest,
    solid_prep: Option<SolidPrepResult>,
    plan: DilutionPlan,
    stock_volume_l: f64,
    diluent_volume_l: f64,
) -> Vec<ProtocolStep> {
    let solvent = request.solvent.as_str();
    let mut steps = Vec::new();

    if let Some(prep) = solid_prep {
        steps.push(ProtocolStep::new(
            "Prepare Stock",
            StepAction::Weigh {
                mass_g: prep.mass_g,
            },
            request.reagent_name.as_str(),
            "Stock Tube",
        ));
        steps.push(ProtocolStep::new(
            "Prepare Stock",
            StepAction::Add {
                volume_l: prep.stock_volume_l,
            },
            solvent,
            "Stock Tube",
        ));
    }

    match plan {
        DilutionPlan::Direct => {
            steps.push(ProtocolStep::new(
                "Final Dilution",
                StepAction::Transfer {
                    volume_l: stock_volume_l,
                },
                "Main Stock",
                "Final Tube",
            ));
            steps.push(ProtocolStep::new(
                "Final Dilution",
                StepAction::Add {
                    volume_l: diluent_volume_l,
                },
                solvent,
                "Final Tube",
            ));
        }
        DilutionPlan::TwoStage(two_stage) => {
            steps.push(ProtocolStep::new(
                "Make Intermediate Stock",
                StepAction::Transfer {
                    volume_l: two_stage.stock_for_intermediate_l,
                },
                "Main Stock",
                "Intermediate Tube",
            ));
            steps.push(ProtocolStep::new(
                "Make Intermediate Stock",
                StepAction::Add {
                    volume_l: two_stage.diluent_for_intermediate_l,
                },
                solvent,
                "Intermediate Tube",
            ));
            steps.push(ProtocolStep::new(
                "Make Final Solution",
                StepAction::Transfer {
                    volume_l: two_stage.intermediate_for_final_l,
                },
                "Intermediate Stock",
                "Final Tube",
            ));
            steps.push(ProtocolStep::new(
                "Make Final Solution",
                StepAction::Add {
                    volume_l: two_stage.diluent_for_final_l,
                },
                solvent,
                "Final Tube",
            ));
        }
    }
    steps
}

pub(crate) fn steps_table(steps: &[ProtocolStep]) -> ReportTable {
    let mut table = ReportTable::new(["Task", "Action", "Source", "Destination"]);
    for step in steps {
        table.push_row([
            step.task.clone(),
            step.action.to_string(),
            step.source.clone(),
            step.destination.clone(),
        ]);
    }
    table
}

impl TabularReport for DilutionResult {
    fn calculator(&self) -> Calculator {
        Calculator::Dilution
    }

    fn sections(&self) -> &'static [ReportSection] {
        &[ReportSection::Protocol]
    }

    fn report_table(&self, section: ReportSection) -> Option<ReportTable> {
        match section {
            ReportSection::Protocol => Some(steps_table(&self.steps)),
            ReportSection::Summary => None,
        }
    }

    fn export_stem(&self, _section: ReportSection) -> Cow<'static, str> {
        Cow::Borrowed("dilution_calculation")
    }
}

#[cfg(test)]
mod tests {
    use super::{DilutionPlan, DilutionRequest, calculate_dilution};
    use crate::common::config::DilutionPolicy;
    use crate::common::units::{Concentration, Volume};
    use crate::domain::{LabErrorKind, StepAction};
    use crate::modules::traits::{ReportSection, TabularReport};

    fn molar(value: f64, unit: &str) -> Concentration {
        Concentration::parse(value, unit).expect("known unit")
    }

    fn volume(value: f64, unit: &str) -> Volume {
        Volume::parse(value, unit).expect("known unit")
    }

    #[test]
    fn hundredfold_dilution_stays_direct() {
        let request = DilutionRequest::new(molar(1.0, "M"), molar(10.0, "mM"), volume(1.0, "L"));
        let result =
            calculate_dilution(&request, &DilutionPolicy::default()).expect("dilution is valid");

        assert!((result.dilution_factor - 100.0).abs() < 1e-9);
        assert!((result.stock_volume_l - 0.010).abs() < 1e-12);
        assert!((result.diluent_volume_l - 0.990).abs() < 1e-12);
        assert!((result.stock_volume_ul() - 10_000.0).abs() < 1e-6);
        assert_eq!(result.plan, DilutionPlan::Direct);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[0].source, "Main Stock");
    }

    #[test]
    fn target_above_stock_is_an_ordering_error() {
        let request = DilutionRequest::new(molar(1.0, "mM"), molar(1.0, "M"), volume(1.0, "mL"));
        let error = calculate_dilution(&request, &DilutionPolicy::default())
            .expect_err("target above stock must fail");
        assert_eq!(error.kind(), LabErrorKind::InvalidConcentrationOrder);
    }

    #[test]
    fn equal_concentrations_are_an_ordering_error() {
        let request = DilutionRequest::new(molar(1.0, "mM"), molar(1.0, "mM"), volume(1.0, "mL"));
        let error = calculate_dilution(&request, &DilutionPolicy::default())
            .expect_err("no dilution needed is rejected");
        assert_eq!(error.kind(), LabErrorKind::InvalidConcentrationOrder);
    }

    #[test]
    fn zero_target_or_volume_is_an_invalid_parameter() {
        let request = DilutionRequest::new(molar(1.0, "M"), molar(0.0, "mM"), volume(1.0, "mL"));
        let error = calculate_dilution(&request, &DilutionPolicy::default())
            .expect_err("zero target must fail");
        assert_eq!(error.kind(), LabErrorKind::InvalidParameter);

        let request = DilutionRequest::new(molar(1.0, "M"), molar(1.0, "mM"), volume(0.0, "mL"));
        let error = calculate_dilution(&request, &DilutionPolicy::default())
            .expect_err("zero volume must fail");
        assert_eq!(error.kind(), LabErrorKind::InvalidParameter);
    }

    #[test]
    fn mass_stock_without_molecular_weight_is_rejected() {
        let request =
            DilutionRequest::new(molar(10.0, "mg/mL"), molar(10.0, "µM"), volume(1.0, "mL"));
        let error = calculate_dilution(&request, &DilutionPolicy::default())
            .expect_err("MW is required");
        assert_eq!(error.kind(), LabErrorKind::MissingMolecularWeight);
    }

    #[test]
    fn mass_stock_converts_through_molecular_weight() {
        // 58.44 mg/mL NaCl is 1 M.
        let request = DilutionRequest::new(
            molar(58.44, "mg/mL"),
            molar(50.0, "mM"),
            volume(10.0, "mL"),
        )
        .with_molecular_weight(Some(58.44));
        let result =
            calculate_dilution(&request, &DilutionPolicy::default()).expect("dilution is valid");
        assert!((result.stock_molar - 1.0).abs() < 1e-12);
        assert!((result.dilution_factor - 20.0).abs() < 1e-9);
        assert!((result.stock_volume_ul() - 500.0).abs() < 1e-6);
    }

    #[test]
    fn large_factor_recommends_two_stage_protocol() {
        let request = DilutionRequest::new(molar(10.0, "mM"), molar(10.0, "nM"), volume(1.0, "mL"));
        let result =
            calculate_dilution(&request, &DilutionPolicy::default()).expect("dilution is valid");

        let DilutionPlan::TwoStage(plan) = result.plan else {
            panic!("expected a two-stage plan, got {:?}", result.plan);
        };
        assert!((plan.second_stage_factor - 10_000.0).abs() < 1e-6);
        assert!((plan.stock_for_intermediate_l - 1.0e-5).abs() < 1e-15);
        assert!((plan.diluent_for_intermediate_l - 9.9e-4).abs() < 1e-15);
        assert!((plan.intermediate_for_final_l - 1.0e-7).abs() < 1e-15);
        assert_eq!(result.steps.len(), 4);
        assert_eq!(result.steps[2].source, "Intermediate Stock");

        // Direct volumes are still reported and still sum to the final volume.
        assert!((result.stock_volume_l + result.diluent_volume_l - 1.0e-3).abs() < 1e-15);
    }

    #[test]
    fn threshold_is_a_policy_knob() {
        let request =
            DilutionRequest::new(molar(10.0, "mM"), molar(20.0, "µM"), volume(1.0, "mL"));
        let lenient = DilutionPolicy {
            two_stage_threshold: 1000.0,
            ..DilutionPolicy::default()
        };
        let default_result =
            calculate_dilution(&request, &DilutionPolicy::default()).expect("valid");
        let lenient_result = calculate_dilution(&request, &lenient).expect("valid");

        assert!(default_result.is_two_stage());
        assert!(!lenient_result.is_two_stage());
    }

    #[test]
    fn solid_prep_weighs_mass_before_diluting() {
        let request = DilutionRequest::new(molar(10.0, "mM"), molar(10.0, "µM"), volume(1.0, "mL"))
            .with_molecular_weight(Some(180.16))
            .with_solid_prep(volume(1.0, "mL"))
            .with_reagent_name("Glucose");
        let result =
            calculate_dilution(&request, &DilutionPolicy::default()).expect("dilution is valid");

        let prep = result.solid_prep.expect("solid prep requested");
        assert!((prep.mass_g - 0.0018016).abs() < 1e-12);
        assert!((prep.mass_mg() - 1.8016).abs() < 1e-9);
        assert_eq!(result.steps[0].action, StepAction::Weigh { mass_g: prep.mass_g });
        assert_eq!(result.steps[0].source, "Glucose");
    }

    #[test]
    fn solid_prep_requires_molecular_weight() {
        let request = DilutionRequest::new(molar(10.0, "mM"), molar(10.0, "µM"), volume(1.0, "mL"))
            .with_solid_prep(volume(1.0, "mL"));
        let error = calculate_dilution(&request, &DilutionPolicy::default())
            .expect_err("solid prep needs MW");
        assert_eq!(error.kind(), LabErrorKind::InvalidParameter);
    }

    #[test]
    fn protocol_table_has_one_row_per_step() {
        let request = DilutionRequest::new(molar(1.0, "M"), molar(10.0, "mM"), volume(1.0, "mL"))
            .with_solvent("PBS");
        let result =
            calculate_dilution(&request, &DilutionPolicy::default()).expect("dilution is valid");
        let table = result
            .report_table(ReportSection::Protocol)
            .expect("protocol table");

        assert_eq!(table.headers, vec!["Task", "Action", "Source", "Destination"]);
        assert_eq!(table.rows[0][1], "Transfer 10.00 µL");
        assert_eq!(table.rows[1][1], "Add 990.00 µL");
        assert_eq!(table.rows[1][2], "PBS");
        assert!(result.report_table(ReportSection::Summary).is_none());
    }
}
