use super::{CliError, GlobalArgs};
use anyhow::Context;
use labcalc_core::common::config::{DilutionPolicy, load_dilution_policy};
use labcalc_core::common::units::{Concentration, Volume};
use labcalc_core::domain::LabError;
use labcalc_core::modules::doe::FactorLevels;
use labcalc_core::modules::{
    Reagent, ReagentStore, ReportSection, TabularReport, resolve_molecular_weight,
    write_report_csv,
};
use serde::Serialize;

pub(super) fn load_policy(global: &GlobalArgs) -> Result<DilutionPolicy, CliError> {
    let Some(path) = global.policy.as_ref() else {
        return Ok(DilutionPolicy::default());
    };
    let policy = load_dilution_policy(path).map_err(LabError::from)?;
    policy.validate()?;
    tracing::debug!(path = %path.display(), "loaded dilution policy");
    Ok(policy)
}

pub(super) fn load_store(global: &GlobalArgs) -> Result<ReagentStore, CliError> {
    Ok(ReagentStore::load(&global.store).map_err(LabError::from)?)
}

/// Name and default MW for a calculator run. A name that is not in the store
/// is still used for labels and file names.
pub(super) struct ReagentSelection {
    pub(super) name: Option<String>,
    pub(super) molecular_weight: Option<f64>,
}

pub(super) fn select_reagent(
    global: &GlobalArgs,
    name: Option<&str>,
    explicit_mw: Option<f64>,
) -> Result<ReagentSelection, CliError> {
    let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) else {
        return Ok(ReagentSelection {
            name: None,
            molecular_weight: explicit_mw,
        });
    };

    let store = load_store(global)?;
    let reagent: Option<&Reagent> = store.lookup(name);
    if reagent.is_none() {
        tracing::debug!(reagent = name, "reagent not in store, no default molecular weight");
    }
    Ok(ReagentSelection {
        name: Some(name.to_string()),
        molecular_weight: resolve_molecular_weight(explicit_mw, reagent),
    })
}

pub(super) fn parse_concentration(value: f64, unit: &str) -> Result<Concentration, CliError> {
    Ok(Concentration::parse(value, unit)?)
}

pub(super) fn parse_volume(value: f64, unit: &str) -> Result<Volume, CliError> {
    Ok(Volume::parse(value, unit)?)
}

/// `key=value` for extra reagent fields.
pub(super) fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("field name is empty in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Comma-separated factorial levels; blank entries are dropped.
pub(super) fn parse_level_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map(str::to_string)
        .collect()
}

/// `low,center,high` for one Box-Behnken factor.
pub(super) fn parse_factor_levels(raw: &str) -> Result<FactorLevels, String> {
    let values = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|error| format!("invalid level '{}': {error}", part.trim()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        [low, center, high] => Ok(FactorLevels::new(*low, *center, *high)),
        _ => Err(format!(
            "expected LOW,CENTER,HIGH, got {} values in '{raw}'",
            values.len()
        )),
    }
}

fn section_title(section: ReportSection) -> &'static str {
    match section {
        ReportSection::Protocol => "Protocol",
        ReportSection::Summary => "Summary",
    }
}

/// Prints `report` as text tables (after `headline`) or as JSON, then
/// exports CSV files when `--csv-dir` is set.
pub(super) fn emit_report<R>(
    global: &GlobalArgs,
    report: &R,
    reagent: Option<&str>,
    headline: &[String],
) -> Result<(), CliError>
where
    R: TabularReport + Serialize,
{
    if global.json {
        let json = serde_json::to_string_pretty(report)
            .with_context(|| format!("failed to serialize {} result", report.calculator()))?;
        println!("{json}");
    } else {
        for line in headline {
            println!("{line}");
        }
        for section in report.sections() {
            if let Some(table) = report.report_table(*section) {
                println!();
                println!("{}", section_title(*section));
                println!("{}", table.render_text());
            }
        }
    }

    if let Some(csv_dir) = global.csv_dir.as_ref() {
        for path in write_report_csv(report, csv_dir, reagent)? {
            if global.json {
                eprintln!("CSV: {}", path.display());
            } else {
                println!("CSV: {}", path.display());
            }
        }
    }
    Ok(())
}
