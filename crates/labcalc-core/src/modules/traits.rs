use super::serialization::{ReportTable, export_filename, write_csv_artifact};
use crate::domain::{Calculator, LabResult};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportSection {
    Protocol,
    Summary,
}

/// Result records that the presentation layer can show as tables and export.
pub trait TabularReport {
    fn calculator(&self) -> Calculator;

    fn sections(&self) -> &'static [ReportSection];

    fn report_table(&self, section: ReportSection) -> Option<ReportTable>;

    fn export_stem(&self, section: ReportSection) -> Cow<'static, str>;
}

/// Writes every section of `report` into `output_dir`, returning the paths in
/// section order.
pub fn write_report_csv<R>(
    report: &R,
    output_dir: &Path,
    reagent: Option<&str>,
) -> LabResult<Vec<PathBuf>>
where
    R: TabularReport + ?Sized,
{
    let mut written = Vec::new();
    for section in report.sections() {
        let Some(table) = report.report_table(*section) else {
            continue;
        };
        let path = output_dir.join(export_filename(&report.export_stem(*section), reagent));
        write_csv_artifact(&path, &table)?;
        tracing::debug!(
            calculator = %report.calculator(),
            path = %path.display(),
            rows = table.len(),
            "exported report table"
        );
        written.push(path);
    }
    Ok(written)
}
