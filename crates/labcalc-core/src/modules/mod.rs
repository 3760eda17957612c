pub mod cascade;
pub mod dilution;
pub mod doe;
pub mod reagents;
pub mod serial;
pub mod serialization;

mod traits;

pub use cascade::{CascadeRequest, CascadeResult, RangeKind, RangeSpec, plan_cascade};
pub use dilution::{DilutionRequest, DilutionResult, calculate_dilution};
pub use doe::{BoxBehnkenDesign, FactorLevels, FactorialDesign, box_behnken, full_factorial};
pub use reagents::{Reagent, ReagentPatch, ReagentStore, resolve_molecular_weight};
pub use serial::{SerialRequest, SerialResult, plan_serial_dilution};
pub use serialization::{ReportTable, export_filename, write_csv_artifact};
pub use traits::{ReportSection, TabularReport, write_report_csv};
