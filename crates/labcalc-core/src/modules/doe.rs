//! Design-of-experiments matrices: full factorial over string levels and
//! coded Box-Behnken designs.

use super::serialization::ReportTable;
use super::traits::{ReportSection, TabularReport};
use crate::common::format::format_significant;
use crate::domain::{Calculator, LabError, LabResult};
use serde::Serialize;
use std::borrow::Cow;

pub const MAX_FACTORIAL_VARIABLES: usize = 10;
pub const MIN_BOX_BEHNKEN_FACTORS: usize = 3;

/// Column name of the variable at `index` (`A`, `B`, …).
pub fn variable_name(index: usize) -> String {
    let letter = (b'A' + (index % 26) as u8) as char;
    if index < 26 {
        letter.to_string()
    } else {
        format!("{letter}{}", index / 26)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactorialDesign {
    pub variables: Vec<String>,
    pub runs: Vec<Vec<String>>,
}

impl FactorialDesign {
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }
}

/// Cartesian product of the level lists, last variable varying fastest.
pub fn full_factorial<S: AsRef<str>>(levels: &[Vec<S>]) -> LabResult<FactorialDesign> {
    if levels.is_empty() || levels.len() > MAX_FACTORIAL_VARIABLES {
        return Err(LabError::invalid_parameter(format!(
            "a factorial design needs between 1 and {MAX_FACTORIAL_VARIABLES} variables, got {}",
            levels.len()
        )));
    }
    for (index, variable) in levels.iter().enumerate() {
        if variable.is_empty() {
            return Err(LabError::invalid_parameter(format!(
                "variable {} has no levels",
                variable_name(index)
            )));
        }
    }

    let mut runs: Vec<Vec<String>> = vec![Vec::new()];
    for variable in levels {
        runs = runs
            .into_iter()
            .flat_map(|prefix| {
                variable.iter().map(move |level| {
                    let mut run = prefix.clone();
                    run.push(level.as_ref().to_string());
                    run
                })
            })
            .collect();
    }
    tracing::debug!(variables = levels.len(), runs = runs.len(), "built full factorial design");

    Ok(FactorialDesign {
        variables: (0..levels.len()).map(variable_name).collect(),
        runs,
    })
}

impl TabularReport for FactorialDesign {
    fn calculator(&self) -> Calculator {
        Calculator::FullFactorial
    }

    fn sections(&self) -> &'static [ReportSection] {
        &[ReportSection::Summary]
    }

    fn report_table(&self, section: ReportSection) -> Option<ReportTable> {
        if section != ReportSection::Summary {
            return None;
        }
        let mut table = ReportTable::new(self.variables.iter().map(String::as_str));
        for run in &self.runs {
            table.push_row(run.iter().map(String::as_str));
        }
        Some(table)
    }

    fn export_stem(&self, _section: ReportSection) -> Cow<'static, str> {
        Cow::Borrowed("combinations_data")
    }
}

/// Actual values a coded level of -1, 0 or +1 stands for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FactorLevels {
    pub low: f64,
    pub center: f64,
    pub high: f64,
}

impl FactorLevels {
    pub const fn new(low: f64, center: f64, high: f64) -> Self {
        Self { low, center, high }
    }

    pub fn is_increasing(&self) -> bool {
        self.low < self.center && self.center < self.high
    }

    pub fn value(&self, coded: i8) -> f64 {
        match coded.signum() {
            -1 => self.low,
            0 => self.center,
            _ => self.high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxBehnkenDesign {
    pub factor_count: usize,
    pub center_points: usize,
    pub coded: Vec<Vec<i8>>,
    /// Present once the coded matrix has been mapped to real levels.
    pub actual: Option<Vec<Vec<f64>>>,
}

impl BoxBehnkenDesign {
    pub fn run_count(&self) -> usize {
        self.coded.len()
    }

    pub fn file_stem(&self) -> String {
        format!("BBD_{}factors_{}runs", self.factor_count, self.run_count())
    }

    /// Maps the coded matrix onto per-factor levels.
    pub fn with_levels(mut self, levels: &[FactorLevels]) -> LabResult<Self> {
        self.actual = Some(map_coded_levels(&self.coded, levels)?);
        Ok(self)
    }
}

pub fn box_behnken(factor_count: usize, center_points: usize) -> LabResult<BoxBehnkenDesign> {
    if factor_count < MIN_BOX_BEHNKEN_FACTORS {
        return Err(LabError::invalid_parameter(format!(
            "a Box-Behnken design needs at least {MIN_BOX_BEHNKEN_FACTORS} factors, got {factor_count}"
        )));
    }
    if center_points == 0 {
        return Err(LabError::invalid_parameter(
            "a Box-Behnken design needs at least one center point",
        ));
    }

    let pairs = factor_count * (factor_count - 1) / 2;
    let mut coded = Vec::with_capacity(4 * pairs + center_points);
    for i in 0..factor_count {
        for j in i + 1..factor_count {
            for (a, b) in [(-1, -1), (1, -1), (-1, 1), (1, 1)] {
                let mut run = vec![0_i8; factor_count];
                run[i] = a;
                run[j] = b;
                coded.push(run);
            }
        }
    }
    coded.extend(std::iter::repeat_n(vec![0_i8; factor_count], center_points));
    tracing::debug!(factor_count, center_points, runs = coded.len(), "built Box-Behnken design");

    Ok(BoxBehnkenDesign {
        factor_count,
        center_points,
        coded,
        actual: None,
    })
}

pub fn map_coded_levels(coded: &[Vec<i8>], levels: &[FactorLevels]) -> LabResult<Vec<Vec<f64>>> {
    let width = coded.first().map_or(levels.len(), Vec::len);
    if levels.len() != width {
        return Err(LabError::invalid_parameter(format!(
            "expected levels for {width} factors, got {}",
            levels.len()
        )));
    }
    for (index, factor) in levels.iter().enumerate() {
        if !factor.is_increasing() {
            tracing::warn!(
                factor = %variable_name(index),
                low = factor.low,
                center = factor.center,
                high = factor.high,
                "factor levels are not strictly increasing"
            );
        }
    }

    Ok(coded
        .iter()
        .map(|run| {
            run.iter()
                .zip(levels)
                .map(|(code, factor)| factor.value(*code))
                .collect()
        })
        .collect())
}

impl TabularReport for BoxBehnkenDesign {
    fn calculator(&self) -> Calculator {
        Calculator::BoxBehnken
    }

    fn sections(&self) -> &'static [ReportSection] {
        &[ReportSection::Summary]
    }

    fn report_table(&self, section: ReportSection) -> Option<ReportTable> {
        if section != ReportSection::Summary {
            return None;
        }
        let mut headers = vec!["Run".to_string()];
        headers.extend((0..self.factor_count).map(variable_name));
        let mut table = ReportTable::new(headers);
        for (index, run) in self.coded.iter().enumerate() {
            let mut row = vec![(index + 1).to_string()];
            match self.actual.as_ref().and_then(|actual| actual.get(index)) {
                Some(values) => {
                    row.extend(values.iter().map(|value| format_significant(*value, 6)))
                }
                None => row.extend(run.iter().map(i8::to_string)),
            }
            table.push_row(row);
        }
        Some(table)
    }

    fn export_stem(&self, _section: ReportSection) -> Cow<'static, str> {
        Cow::Owned(self.file_stem())
    }
}
