use crate::domain::{LabError, LabErrorKind};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Header plus string rows, the shape every calculator result is exported in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ReportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, header: &str) -> Option<Vec<&str>> {
        let index = self.headers.iter().position(|candidate| candidate == header)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }

    pub fn to_csv(&self) -> Result<String, CsvExportError> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .map_err(|source| CsvExportError::Encode { source })?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|source| CsvExportError::Encode { source })?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|error| CsvExportError::Flush {
                source: error.into_error(),
            })?;
        String::from_utf8(bytes).map_err(|source| CsvExportError::Utf8 { source })
    }

    /// Space-aligned columns for terminal output.
    pub fn render_text(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (index, cell) in row.iter().enumerate() {
                let width = cell.chars().count();
                match widths.get_mut(index) {
                    Some(current) => *current = (*current).max(width),
                    None => widths.push(width),
                }
            }
        }

        let render_line = |cells: &[String]| -> String {
            let line = cells
                .iter()
                .enumerate()
                .map(|(index, cell)| {
                    let pad = widths[index].saturating_sub(cell.chars().count());
                    format!("{cell}{}", " ".repeat(pad))
                })
                .collect::<Vec<_>>()
                .join("  ");
            line.trim_end().to_string()
        };

        let mut output = render_line(&self.headers);
        output.push('\n');
        let rule_width = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        output.push_str(&"-".repeat(rule_width));
        for row in &self.rows {
            output.push('\n');
            output.push_str(&render_line(row));
        }
        output
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CsvExportError {
    #[error("failed to encode CSV record: {source}")]
    Encode { source: csv::Error },
    #[error("failed to flush CSV buffer: {source}")]
    Flush { source: std::io::Error },
    #[error("CSV output is not valid UTF-8: {source}")]
    Utf8 { source: std::string::FromUtf8Error },
    #[error("failed to write CSV '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<CsvExportError> for LabError {
    fn from(error: CsvExportError) -> Self {
        LabError::new(LabErrorKind::Export, error.to_string())
    }
}

/// `{stem}_{reagent}.csv`, or `{stem}.csv` without a reagent. Path separators
/// and whitespace in the reagent name become underscores.
pub fn export_filename(stem: &str, reagent: Option<&str>) -> String {
    match reagent.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => {
            let safe: String = name
                .chars()
                .map(|ch| {
                    if ch.is_whitespace() || matches!(ch, '/' | '\\' | ':') {
                        '_'
                    } else {
                        ch
                    }
                })
                .collect();
            format!("{stem}_{safe}.csv")
        }
        None => format!("{stem}.csv"),
    }
}

pub fn normalize_text_artifact(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

pub fn write_csv_artifact(path: &Path, table: &ReportTable) -> Result<(), CsvExportError> {
    let content = table.to_csv()?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CsvExportError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, normalize_text_artifact(&content)).map_err(|source| CsvExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}
