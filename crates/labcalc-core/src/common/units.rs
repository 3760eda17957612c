//! Unit tables and the typed quantities built from them.
//!
//! Every raw `(value, unit)` pair coming from an input form is resolved here
//! exactly once. Molar and mass/volume symbols live in disjoint tables, so the
//! resulting [`Concentration`] variant already says whether a molecular weight
//! is needed downstream.

use crate::domain::{LabError, LabResult};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitTable {
    name: &'static str,
    base_unit: &'static str,
    entries: &'static [(&'static str, f64)],
}

impl UnitTable {
    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn base_unit(&self) -> &'static str {
        self.base_unit
    }

    pub const fn entries(&self) -> &'static [(&'static str, f64)] {
        self.entries
    }

    pub fn symbols(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(symbol, _)| *symbol)
    }

    pub fn factor(&self, unit: &str) -> Option<f64> {
        let unit = normalize_symbol(unit);
        self.entries
            .iter()
            .find(|(symbol, _)| *symbol == unit)
            .map(|(_, factor)| *factor)
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.factor(unit).is_some()
    }
}

pub const MOLARITY: UnitTable = UnitTable {
    name: "molarity",
    base_unit: "M",
    entries: &[
        ("M", 1.0),
        ("mM", 1.0e-3),
        ("µM", 1.0e-6),
        ("nM", 1.0e-9),
        ("pM", 1.0e-12),
    ],
};

pub const MASS_CONCENTRATION: UnitTable = UnitTable {
    name: "mass concentration",
    base_unit: "g/L",
    entries: &[
        ("g/L", 1.0),
        ("mg/L", 1.0e-3),
        ("µg/L", 1.0e-6),
        ("g/mL", 1.0e3),
        ("mg/mL", 1.0),
        ("µg/mL", 1.0e-3),
        ("ng/mL", 1.0e-6),
        ("µg/µL", 1.0),
        ("ng/µL", 1.0e-3),
    ],
};

pub const VOLUME: UnitTable = UnitTable {
    name: "volume",
    base_unit: "L",
    entries: &[("L", 1.0), ("mL", 1.0e-3), ("µL", 1.0e-6)],
};

pub const MICROLITERS_PER_LITER: f64 = 1.0e6;

/// Accepts the ASCII `u` and the Greek mu as spellings of the micro prefix.
pub fn normalize_symbol(unit: &str) -> String {
    unit.trim().replace(['u', 'μ'], "µ")
}

pub fn to_base(value: f64, unit: &str, table: &UnitTable) -> LabResult<f64> {
    table
        .factor(unit)
        .map(|factor| value * factor)
        .ok_or_else(|| LabError::unknown_unit(unit.trim(), table.name()))
}

/// Concentration resolved to the base unit of its own table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "base_value", rename_all = "snake_case")]
pub enum Concentration {
    /// mol/L
    Molar(f64),
    /// g/L
    MassPerVolume(f64),
}

impl Concentration {
    pub fn parse(value: f64, unit: &str) -> LabResult<Self> {
        if MOLARITY.contains(unit) {
            return to_base(value, unit, &MOLARITY).map(Self::Molar);
        }
        if MASS_CONCENTRATION.contains(unit) {
            return to_base(value, unit, &MASS_CONCENTRATION).map(Self::MassPerVolume);
        }
        Err(LabError::unknown_unit(unit.trim(), "concentration"))
    }

    pub const fn base_value(&self) -> f64 {
        match *self {
            Self::Molar(value) | Self::MassPerVolume(value) => value,
        }
    }

    pub const fn requires_molecular_weight(&self) -> bool {
        matches!(self, Self::MassPerVolume(_))
    }

    /// `g/L / (g/mol)` gives mol/L; molar values pass through untouched.
    pub fn to_molar(&self, molecular_weight: Option<f64>) -> LabResult<f64> {
        match *self {
            Self::Molar(value) => Ok(value),
            Self::MassPerVolume(grams_per_liter) => match molecular_weight {
                Some(mw) if mw > 0.0 && mw.is_finite() => Ok(grams_per_liter / mw),
                Some(mw) => Err(LabError::missing_molecular_weight(format!(
                    "molecular weight must be > 0 to convert a mass/volume concentration, got {mw}"
                ))),
                None => Err(LabError::missing_molecular_weight(
                    "molecular weight is required to convert a mass/volume concentration",
                )),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Volume {
    liters: f64,
}

impl Volume {
    pub fn parse(value: f64, unit: &str) -> LabResult<Self> {
        to_base(value, unit, &VOLUME).map(Self::from_liters)
    }

    pub const fn from_liters(liters: f64) -> Self {
        Self { liters }
    }

    pub fn from_microliters(microliters: f64) -> Self {
        Self::from_liters(microliters / MICROLITERS_PER_LITER)
    }

    pub const fn liters(&self) -> f64 {
        self.liters
    }

    pub fn microliters(&self) -> f64 {
        self.liters * MICROLITERS_PER_LITER
    }
}
