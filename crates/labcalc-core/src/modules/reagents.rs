//! Reagent records and the flat JSON file they are kept in.
//!
//! The store file is a single JSON object keyed by reagent name. Every access
//! is a whole-file read followed, for mutations, by a whole-file overwrite.

use super::serialization::ReportTable;
use super::traits::{ReportSection, TabularReport};
use crate::common::format::format_significant;
use crate::domain::{Calculator, LabError, LabErrorKind, LabResult};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize, Serializer};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_STORE_FILE: &str = "reagents.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reagent {
    /// Map key in the store file, not a field of the record.
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "mw")]
    pub molecular_weight: f64,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Reagent {
    pub fn new(name: impl Into<String>, molecular_weight: f64) -> Self {
        Self {
            name: name.into(),
            molecular_weight,
            manufacturer: String::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = manufacturer.into();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Fields an edit may change; `None` leaves the stored value as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReagentPatch {
    pub molecular_weight: Option<f64>,
    pub manufacturer: Option<String>,
    pub extra: BTreeMap<String, String>,
}

/// Explicit MW wins; otherwise the selected reagent's MW, if any.
pub fn resolve_molecular_weight(explicit: Option<f64>, reagent: Option<&Reagent>) -> Option<f64> {
    explicit.or_else(|| reagent.map(|reagent| reagent.molecular_weight))
}

#[derive(Debug, thiserror::Error)]
pub enum ReagentStoreError {
    #[error("failed to read reagent store '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse reagent store '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize reagent store: {source}")]
    Serialize { source: serde_json::Error },
    #[error("failed to write reagent store '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<ReagentStoreError> for LabError {
    fn from(error: ReagentStoreError) -> Self {
        LabError::new(LabErrorKind::Store, error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReagentStore {
    path: PathBuf,
    reagents: BTreeMap<String, Reagent>,
}

impl ReagentStore {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reagents: BTreeMap::new(),
        }
    }

    /// A missing or blank file is an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReagentStoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::empty(path));
        }
        let source = fs::read_to_string(path).map_err(|source| ReagentStoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if source.trim().is_empty() {
            return Ok(Self::empty(path));
        }

        let mut reagents: BTreeMap<String, Reagent> =
            serde_json::from_str(&source).map_err(|source| ReagentStoreError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        for (name, reagent) in &mut reagents {
            reagent.name.clone_from(name);
        }
        tracing::debug!(path = %path.display(), count = reagents.len(), "loaded reagent store");

        Ok(Self {
            path: path.to_path_buf(),
            reagents,
        })
    }

    pub fn save(&self) -> Result<(), ReagentStoreError> {
        let mut content = serde_json::to_string_pretty(&self.reagents)
            .map_err(|source| ReagentStoreError::Serialize { source })?;
        content.push('\n');
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ReagentStoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        fs::write(&self.path, content).map_err(|source| ReagentStoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.reagents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reagents.is_empty()
    }

    pub fn lookup(&self, name: &str) -> Option<&Reagent> {
        self.reagents.get(name)
    }

    pub fn add(&mut self, reagent: Reagent) -> LabResult<()> {
        let name = reagent.name.trim().to_string();
        if name.is_empty() {
            return Err(LabError::invalid_parameter("reagent name is required"));
        }
        validate_molecular_weight(&name, reagent.molecular_weight)?;
        if self.reagents.contains_key(&name) {
            return Err(LabError::new(
                LabErrorKind::DuplicateReagent,
                format!("reagent '{name}' already exists"),
            ));
        }
        tracing::debug!(reagent = %name, mw = reagent.molecular_weight, "adding reagent");
        self.reagents.insert(name.clone(), Reagent { name, ..reagent });
        Ok(())
    }

    pub fn update(&mut self, name: &str, patch: ReagentPatch) -> LabResult<&Reagent> {
        if let Some(molecular_weight) = patch.molecular_weight {
            validate_molecular_weight(name, molecular_weight)?;
        }
        let reagent = self
            .reagents
            .get_mut(name)
            .ok_or_else(|| unknown_reagent(name))?;
        if let Some(molecular_weight) = patch.molecular_weight {
            reagent.molecular_weight = molecular_weight;
        }
        if let Some(manufacturer) = patch.manufacturer {
            reagent.manufacturer = manufacturer;
        }
        reagent.extra.extend(patch.extra);
        Ok(reagent)
    }

    pub fn delete(&mut self, name: &str) -> LabResult<Reagent> {
        self.reagents.remove(name).ok_or_else(|| unknown_reagent(name))
    }

    /// Reagents in name order, optionally restricted to names matching a glob.
    pub fn list(&self, pattern: Option<&str>) -> LabResult<Vec<&Reagent>> {
        let matcher = pattern.map(compile_name_filter).transpose()?;
        Ok(self
            .reagents
            .values()
            .filter(|reagent| {
                matcher
                    .as_ref()
                    .is_none_or(|matcher| matcher.is_match(&reagent.name))
            })
            .collect())
    }

    pub fn listing(&self, pattern: Option<&str>) -> LabResult<ReagentListing> {
        Ok(ReagentListing {
            reagents: self.list(pattern)?.into_iter().cloned().collect(),
        })
    }
}

fn validate_molecular_weight(name: &str, molecular_weight: f64) -> LabResult<()> {
    if molecular_weight > 0.0 && molecular_weight.is_finite() {
        Ok(())
    } else {
        Err(LabError::invalid_parameter(format!(
            "reagent '{name}' needs a molecular weight > 0, got {molecular_weight}"
        )))
    }
}

fn unknown_reagent(name: &str) -> LabError {
    LabError::new(
        LabErrorKind::UnknownReagent,
        format!("reagent '{name}' is not in the store"),
    )
}

fn compile_name_filter(pattern: &str) -> LabResult<GlobMatcher> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|source| {
            LabError::invalid_parameter(format!("invalid reagent filter '{pattern}': {source}"))
        })
}

/// Snapshot of (part of) the store, exportable as `reagent_list.csv`.
///
/// Serializes the same way the store file does: records keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReagentListing {
    #[serde(serialize_with = "serialize_by_name")]
    pub reagents: Vec<Reagent>,
}

fn serialize_by_name<S>(reagents: &[Reagent], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(
        reagents
            .iter()
            .map(|reagent| (reagent.name.as_str(), reagent)),
    )
}

impl TabularReport for ReagentListing {
    fn calculator(&self) -> Calculator {
        Calculator::ReagentList
    }

    fn sections(&self) -> &'static [ReportSection] {
        &[ReportSection::Summary]
    }

    fn report_table(&self, section: ReportSection) -> Option<ReportTable> {
        if section != ReportSection::Summary {
            return None;
        }
        let extra_keys: BTreeSet<&str> = self
            .reagents
            .iter()
            .flat_map(|reagent| reagent.extra.keys().map(String::as_str))
            .collect();

        let mut headers = vec!["Reagent Name", "mw", "manufacturer"];
        headers.extend(extra_keys.iter().copied());
        let mut table = ReportTable::new(headers);
        for reagent in &self.reagents {
            let mut row = vec![
                reagent.name.clone(),
                format_significant(reagent.molecular_weight, 8),
                reagent.manufacturer.clone(),
            ];
            row.extend(
                extra_keys
                    .iter()
                    .map(|key| reagent.extra.get(*key).cloned().unwrap_or_default()),
            );
            table.push_row(row);
        }
        Some(table)
    }

    fn export_stem(&self, _section: ReportSection) -> Cow<'static, str> {
        Cow::Borrowed("reagent_list")
    }
}

#[cfg(test)]
mod tests {
    use super::{Reagent, ReagentPatch, ReagentStore, resolve_molecular_weight};
    use crate::domain::LabErrorKind;
    use crate::modules::traits::{ReportSection, TabularReport};
    use std::fs;
    use tempfile::TempDir;

    fn seeded_store(temp: &TempDir) -> ReagentStore {
        let mut store = ReagentStore::empty(temp.path().join("reagents.json"));
        store
            .add(Reagent::new("NaCl", 58.44).with_manufacturer("Sigma S9888"))
            .expect("NaCl should be added");
        store
            .add(Reagent::new("Tris", 121.14).with_field("cas", "77-86-1"))
            .expect("Tris should be added");
        store
    }

    #[test]
    fn missing_and_blank_files_load_as_empty_stores() {
        let temp = TempDir::new().expect("tempdir should be created");
        let missing = ReagentStore::load(temp.path().join("none.json")).expect("missing is empty");
        assert!(missing.is_empty());

        let blank = temp.path().join("blank.json");
        fs::write(&blank, "  \n").expect("blank store should be written");
        assert!(ReagentStore::load(&blank).expect("blank is empty").is_empty());
    }

    #[test]
    fn malformed_store_is_a_store_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("reagents.json");
        fs::write(&path, "{ \"NaCl\": ").expect("store should be written");

        let error = ReagentStore::load(&path).expect_err("parse should fail");
        let lab_error = crate::domain::LabError::from(error);
        assert_eq!(lab_error.kind(), LabErrorKind::Store);
        assert_eq!(lab_error.exit_code(), 3);
    }

    #[test]
    fn save_then_load_keeps_records_and_extra_fields() {
        let temp = TempDir::new().expect("tempdir should be created");
        let store = seeded_store(&temp);
        store.save().expect("store should save");

        let raw = fs::read_to_string(store.path()).expect("store should be readable");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(json["NaCl"]["mw"], 58.44);
        assert_eq!(json["Tris"]["cas"], "77-86-1");
        assert!(json["NaCl"].get("name").is_none());

        let reloaded = ReagentStore::load(store.path()).expect("store should load");
        assert_eq!(reloaded, store);
        assert_eq!(reloaded.lookup("Tris").map(|r| r.name.as_str()), Some("Tris"));
    }

    #[test]
    fn add_rejects_duplicates_blank_names_and_bad_weights() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut store = seeded_store(&temp);

        let error = store.add(Reagent::new("NaCl", 58.44)).expect_err("duplicate");
        assert_eq!(error.kind(), LabErrorKind::DuplicateReagent);
        let error = store.add(Reagent::new("  ", 10.0)).expect_err("blank name");
        assert_eq!(error.kind(), LabErrorKind::InvalidParameter);
        let error = store.add(Reagent::new("KCl", 0.0)).expect_err("zero mw");
        assert_eq!(error.kind(), LabErrorKind::InvalidParameter);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn update_and_delete_require_an_existing_name() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut store = seeded_store(&temp);

        let updated = store
            .update(
                "NaCl",
                ReagentPatch {
                    molecular_weight: Some(58.443),
                    ..ReagentPatch::default()
                },
            )
            .expect("update should work");
        assert_eq!(updated.molecular_weight, 58.443);
        assert_eq!(updated.manufacturer, "Sigma S9888");

        let error = store
            .update("KCl", ReagentPatch::default())
            .expect_err("unknown reagent");
        assert_eq!(error.kind(), LabErrorKind::UnknownReagent);

        let removed = store.delete("Tris").expect("delete should work");
        assert_eq!(removed.name, "Tris");
        assert_eq!(
            store.delete("Tris").expect_err("already gone").kind(),
            LabErrorKind::UnknownReagent
        );
    }

    #[test]
    fn list_is_name_ordered_and_filterable() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut store = seeded_store(&temp);
        store
            .add(Reagent::new("NaOH", 40.0))
            .expect("NaOH should be added");

        let names: Vec<&str> = store
            .list(None)
            .expect("list should work")
            .iter()
            .map(|reagent| reagent.name.as_str())
            .collect();
        assert_eq!(names, vec!["NaCl", "NaOH", "Tris"]);

        let filtered = store.list(Some("Na*")).expect("filter should compile");
        assert_eq!(filtered.len(), 2);
        assert!(store.list(Some("[")).is_err());
    }

    #[test]
    fn listing_table_has_a_column_per_extra_field() {
        let temp = TempDir::new().expect("tempdir should be created");
        let store = seeded_store(&temp);
        let table = store
            .listing(None)
            .expect("listing should work")
            .report_table(ReportSection::Summary)
            .expect("summary table");

        assert_eq!(table.headers, vec!["Reagent Name", "mw", "manufacturer", "cas"]);
        assert_eq!(table.rows[0], vec!["NaCl", "58.44", "Sigma S9888", ""]);
        assert_eq!(table.rows[1], vec!["Tris", "121.14", "", "77-86-1"]);
    }

    #[test]
    fn listing_json_is_keyed_by_reagent_name() {
        let temp = TempDir::new().expect("tempdir should be created");
        let store = seeded_store(&temp);
        let listing = store.listing(None).expect("listing");

        let json = serde_json::to_value(&listing).expect("listing serializes");
        let records = json["reagents"].as_object().expect("name-keyed map");
        assert_eq!(records.len(), listing.reagents.len());
        for reagent in &listing.reagents {
            let record = &records[reagent.name.as_str()];
            assert_eq!(record["mw"].as_f64(), Some(reagent.molecular_weight));
            assert_eq!(record["manufacturer"], reagent.manufacturer.as_str());
        }
    }

    #[test]
    fn explicit_molecular_weight_overrides_the_reagent() {
        let reagent = Reagent::new("NaCl", 58.44);
        assert_eq!(resolve_molecular_weight(None, Some(&reagent)), Some(58.44));
        assert_eq!(resolve_molecular_weight(Some(60.0), Some(&reagent)), Some(60.0));
        assert_eq!(resolve_molecular_weight(None, None), None);
    }
}
