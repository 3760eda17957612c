use std::error::Error;
use std::fmt::{Display, Formatter};

pub type LabResult<T> = Result<T, LabError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabErrorCategory {
    Success,
    InputValidationError,
    IoSystemError,
    ComputationError,
    InternalError,
}

impl LabErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::ComputationError => 4,
            Self::InternalError => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::InputValidationError => "InputValidationError",
            Self::IoSystemError => "IoSystemError",
            Self::ComputationError => "ComputationError",
            Self::InternalError => "InternalError",
        }
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// Rejection reasons a calculation or store operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabErrorKind {
    UnknownUnit,
    MissingMolecularWeight,
    InvalidConcentrationOrder,
    InvalidParameter,
    DuplicateReagent,
    UnknownReagent,
    Store,
    Export,
    Policy,
    Usage,
    Io,
}

impl LabErrorKind {
    pub const fn category(self) -> LabErrorCategory {
        match self {
            Self::UnknownUnit
            | Self::MissingMolecularWeight
            | Self::InvalidConcentrationOrder
            | Self::InvalidParameter
            | Self::DuplicateReagent
            | Self::UnknownReagent
            | Self::Usage => LabErrorCategory::InputValidationError,
            Self::Store | Self::Export | Self::Policy | Self::Io => LabErrorCategory::IoSystemError,
        }
    }

    pub const fn placeholder(self) -> &'static str {
        match self {
            Self::UnknownUnit => "INPUT.UNKNOWN_UNIT",
            Self::MissingMolecularWeight => "INPUT.MISSING_MW",
            Self::InvalidConcentrationOrder => "INPUT.CONCENTRATION_ORDER",
            Self::InvalidParameter => "INPUT.INVALID_PARAMETER",
            Self::DuplicateReagent => "INPUT.DUPLICATE_REAGENT",
            Self::UnknownReagent => "INPUT.UNKNOWN_REAGENT",
            Self::Store => "IO.REAGENT_STORE",
            Self::Export => "IO.CSV_EXPORT",
            Self::Policy => "IO.POLICY",
            Self::Usage => "INPUT.CLI_USAGE",
            Self::Io => "IO.CLI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabError {
    kind: LabErrorKind,
    message: String,
}

impl LabError {
    pub fn new(kind: LabErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_unit(unit: &str, table: &str) -> Self {
        Self::new(
            LabErrorKind::UnknownUnit,
            format!("unit '{unit}' is not a recognized {table} unit"),
        )
    }

    pub fn missing_molecular_weight(message: impl Into<String>) -> Self {
        Self::new(LabErrorKind::MissingMolecularWeight, message)
    }

    pub fn concentration_order(message: impl Into<String>) -> Self {
        Self::new(LabErrorKind::InvalidConcentrationOrder, message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(LabErrorKind::InvalidParameter, message)
    }

    pub const fn kind(&self) -> LabErrorKind {
        self.kind
    }

    pub const fn category(&self) -> LabErrorCategory {
        self.kind.category()
    }

    pub const fn placeholder(&self) -> &'static str {
        self.kind.placeholder()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category().is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.placeholder(), self.message)
    }
}

impl Display for LabError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category().as_str(),
            self.placeholder(),
            self.message
        )
    }
}

impl Error for LabError {}
