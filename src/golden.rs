//! Golden dataset store.
//!
//! Each project owns one JSON file of curated queries and their expected
//! files or answers. The file is the single source of truth: every call
//! reads it again, and writes replace it as a whole.
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "projectName": "acme",
//!   "entries": [
//!     {
//!       "id": "0b6f...",
//!       "query": "where is the login handler?",
//!       "expectedFilePaths": ["src/auth/login.ts"],
//!       "tags": ["auth"],
//!       "source": "manual"
//!     }
//!   ]
//! }
//! ```

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

/// Schema version written to and required from dataset files.
pub const GOLDEN_VERSION: &str = "1.0";

/// Filename of a project's dataset inside its directory.
pub const GOLDEN_FILENAME: &str = "golden.json";

/// Provenance of a golden entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    #[default]
    Manual,
    Generated,
    Captured,
}

impl std::str::FromStr for EntrySource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(EntrySource::Manual),
            "generated" => Ok(EntrySource::Generated),
            "captured" => Ok(EntrySource::Captured),
            other => Err(format!(
                "unknown source '{}', expected manual, generated or captured",
                other
            )),
        }
    }
}

/// A curated query with its ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GoldenEntry {
    pub id: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_file_paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub source: EntrySource,
}

impl GoldenEntry {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags
            .as_ref()
            .is_some_and(|tags| tags.iter().any(|t| t == tag))
    }
}

/// Input for [`GoldenStore::add`]; the id is assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoldenEntry {
    pub query: String,
    #[serde(default)]
    pub expected_file_paths: Option<Vec<String>>,
    #[serde(default)]
    pub expected_answer: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub source: EntrySource,
}

impl NewGoldenEntry {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_file_paths = Some(files.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.expected_answer = Some(answer.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_source(mut self, source: EntrySource) -> Self {
        self.source = source;
        self
    }

    /// Check the entry invariant, returning every violation.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let violations = entry_violations(
            &self.query,
            self.expected_file_paths.as_deref(),
            self.expected_answer.as_deref(),
        );
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// All golden entries for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GoldenDataset {
    pub version: String,
    pub project_name: String,
    pub entries: Vec<GoldenEntry>,
}

impl GoldenDataset {
    /// Create a new empty dataset.
    pub fn new(project_name: &str) -> Self {
        Self {
            version: GOLDEN_VERSION.to_string(),
            project_name: project_name.to_string(),
            entries: Vec::new(),
        }
    }

    /// Number of entries in the dataset.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Schema checks beyond what deserialization enforces.
    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if self.version != GOLDEN_VERSION {
            violations.push(format!(
                "version: expected \"{}\", found \"{}\"",
                GOLDEN_VERSION, self.version
            ));
        }
        if self.project_name.trim().is_empty() {
            violations.push("projectName: must not be empty".to_string());
        }

        let mut ids = HashSet::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.id.trim().is_empty() {
                violations.push(format!("entries[{}].id: must not be empty", i));
            } else if !ids.insert(entry.id.as_str()) {
                violations.push(format!("entries[{}].id: duplicate id '{}'", i, entry.id));
            }
            for v in entry_violations(
                &entry.query,
                entry.expected_file_paths.as_deref(),
                entry.expected_answer.as_deref(),
            ) {
                violations.push(format!("entries[{}].{}", i, v));
            }
        }

        violations
    }
}

fn entry_violations(
    query: &str,
    expected_file_paths: Option<&[String]>,
    expected_answer: Option<&str>,
) -> Vec<String> {
    let mut violations = Vec::new();

    if query.trim().is_empty() {
        violations.push("query: must not be empty".to_string());
    }

    let has_files = expected_file_paths.is_some_and(|paths| !paths.is_empty());
    let has_answer = expected_answer.is_some_and(|answer| !answer.trim().is_empty());
    if !has_files && !has_answer {
        violations.push(
            "expectedFilePaths/expectedAnswer: at least one must be provided".to_string(),
        );
    }

    violations
}

/// File-backed store of golden datasets, one per project.
///
/// Read-modify-write cycles for the same project are serialized within this
/// store instance. Separate processes writing the same project still race.
#[derive(Debug)]
pub struct GoldenStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GoldenStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a project's dataset file.
    pub fn path(&self, project_name: &str) -> PathBuf {
        self.root
            .join(encode_project_name(project_name))
            .join(GOLDEN_FILENAME)
    }

    /// Load a project's dataset; a missing file yields an empty dataset.
    pub fn load(&self, project_name: &str) -> Result<GoldenDataset> {
        self.check_project_name(project_name)?;
        let path = self.path(project_name);
        if !path.exists() {
            debug!(path = %path.display(), "No golden dataset yet");
            return Ok(GoldenDataset::new(project_name));
        }
        load_dataset(&path, project_name)
    }

    /// Load a project's dataset, failing when there is nothing to evaluate.
    pub fn load_required(&self, project_name: &str) -> Result<GoldenDataset> {
        let dataset = self.load(project_name)?;
        if dataset.is_empty() {
            return Err(EvalError::dataset_not_found(
                project_name,
                self.path(project_name),
            ));
        }
        Ok(dataset)
    }

    /// Validate a dataset and write it, replacing the project's file.
    ///
    /// An invalid dataset is rejected before anything touches the disk.
    pub fn save(&self, dataset: &GoldenDataset) -> Result<()> {
        self.check_project_name(&dataset.project_name)?;
        let path = self.path(&dataset.project_name);

        let violations = dataset.violations();
        if !violations.is_empty() {
            return Err(EvalError::dataset_invalid(path, violations.join("; ")));
        }

        save_dataset(dataset, &path)?;
        info!(
            project = %dataset.project_name,
            entries = dataset.len(),
            path = %path.display(),
            "Saved golden dataset"
        );
        Ok(())
    }

    /// Validate and append a new entry, returning it with its assigned id.
    pub fn add(&self, project_name: &str, entry: NewGoldenEntry) -> Result<GoldenEntry> {
        self.check_project_name(project_name)?;
        if let Err(violations) = entry.validate() {
            return Err(EvalError::dataset_invalid(
                self.path(project_name),
                violations.join("; "),
            ));
        }

        let lock = self.project_lock(project_name);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut dataset = self.load(project_name)?;
        let created = GoldenEntry {
            id: Uuid::new_v4().to_string(),
            query: entry.query.trim().to_string(),
            expected_file_paths: entry.expected_file_paths.filter(|p| !p.is_empty()),
            expected_answer: entry.expected_answer.filter(|a| !a.trim().is_empty()),
            tags: entry.tags.filter(|t| !t.is_empty()),
            source: entry.source,
        };
        dataset.entries.push(created.clone());
        self.save(&dataset)?;

        Ok(created)
    }

    /// Remove an entry by id. Returns `false` if no such entry exists.
    pub fn remove(&self, project_name: &str, id: &str) -> Result<bool> {
        self.check_project_name(project_name)?;
        let lock = self.project_lock(project_name);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut dataset = self.load(project_name)?;
        let before = dataset.len();
        dataset.entries.retain(|e| e.id != id);
        if dataset.len() == before {
            return Ok(false);
        }

        self.save(&dataset)?;
        Ok(true)
    }

    /// All entries for a project (empty if there is no dataset).
    pub fn list(&self, project_name: &str) -> Result<Vec<GoldenEntry>> {
        Ok(self.load(project_name)?.entries)
    }

    /// Entries carrying the given tag.
    pub fn list_tagged(&self, project_name: &str, tag: &str) -> Result<Vec<GoldenEntry>> {
        Ok(self
            .list(project_name)?
            .into_iter()
            .filter(|e| e.has_tag(tag))
            .collect())
    }

    fn check_project_name(&self, project_name: &str) -> Result<()> {
        if project_name.trim().is_empty() {
            return Err(EvalError::dataset_invalid(
                &self.root,
                "projectName: must not be empty",
            ));
        }
        Ok(())
    }

    fn project_lock(&self, project_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(encode_project_name(project_name))
            .or_default()
            .clone()
    }
}

/// Map a project name onto a directory name, one-to-one.
///
/// ASCII letters, digits, `_`, `-` and non-leading `.` are kept; every other
/// byte becomes `%XX`. Distinct names therefore never share a directory.
pub fn encode_project_name(project_name: &str) -> String {
    if project_name.is_empty() {
        return "%".to_string();
    }

    let mut encoded = String::with_capacity(project_name.len());
    for (i, byte) in project_name.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(byte, b'_' | b'-')
            || (byte == b'.' && i > 0);
        if keep {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

fn load_dataset(path: &Path, project_name: &str) -> Result<GoldenDataset> {
    let content = fs::read_to_string(path)
        .map_err(|e| EvalError::dataset_invalid(path, format!("cannot read file: {}", e)))?;

    let dataset: GoldenDataset = serde_json::from_str(&content)
        .map_err(|e| EvalError::dataset_invalid(path, e.to_string()))?;

    let mut violations = dataset.violations();
    if dataset.project_name != project_name {
        violations.push(format!(
            "projectName: file belongs to \"{}\", expected \"{}\"",
            dataset.project_name, project_name
        ));
    }
    if !violations.is_empty() {
        return Err(EvalError::dataset_invalid(path, violations.join("; ")));
    }

    Ok(dataset)
}

/// Write via a sibling temp file and rename, so readers never observe a
/// partially written dataset.
fn save_dataset(dataset: &GoldenDataset, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
        }
    }

    let content = serde_json::to_string_pretty(dataset)
        .map_err(|e| EvalError::dataset_invalid(path, format!("cannot serialize: {}", e)))?;

    let tmp_path = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
    if let Err(e) = fs::write(&tmp_path, content) {
        let _ = fs::remove_file(&tmp_path);
        return Err(EvalError::io(&tmp_path, e));
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(EvalError::io(path, e));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    fn store() -> (TempDir, GoldenStore) {
        let dir = TempDir::new().unwrap();
        let store = GoldenStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_path_is_per_project() {
        let store = GoldenStore::new("/data/eval");
        assert_eq!(
            store.path("acme"),
            PathBuf::from("/data/eval/acme/golden.json")
        );
        assert_eq!(
            store.path("../etc/x y"),
            PathBuf::from("/data/eval/%2E.%2Fetc%2Fx%20y/golden.json")
        );
        assert_eq!(store.path("v1.2"), PathBuf::from("/data/eval/v1.2/golden.json"));
    }

    #[test]
    fn test_distinct_projects_never_share_a_file() {
        let names = ["team a", "team_a", "team%20a", "team/a", ".", "..", "_", "%", "é"];
        let encoded: HashSet<String> = names.iter().map(|n| encode_project_name(n)).collect();
        assert_eq!(encoded.len(), names.len());

        let (_dir, store) = store();
        store
            .add("team a", NewGoldenEntry::new("secret a").with_files(["a.rs"]))
            .unwrap();
        assert!(store.list("team_a").unwrap().is_empty());
        assert_eq!(store.list("team a").unwrap().len(), 1);
    }

    #[test]
    fn test_load_rejects_file_of_another_project() {
        let (_dir, store) = store();
        let path = store.path("proj");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{"version":"1.0","projectName":"other","entries":[]}"#,
        )
        .unwrap();

        let err = store.load("proj").unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetInvalid);
        assert!(err.to_string().contains("belongs to \"other\""));
    }

    #[test]
    fn test_blank_project_name_rejected_before_write() {
        let (dir, store) = store();
        for name in ["", "  "] {
            let err = store
                .add(name, NewGoldenEntry::new("q").with_files(["a.rs"]))
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::DatasetInvalid);
            assert!(err.to_string().contains("projectName"));
            assert_eq!(store.load(name).unwrap_err().code(), ErrorCode::DatasetInvalid);
            assert!(store.save(&GoldenDataset::new(name)).is_err());
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_save_rejects_invalid_dataset_and_keeps_file() {
        let (_dir, store) = store();
        store
            .add("proj", NewGoldenEntry::new("q").with_files(["a.rs"]))
            .unwrap();
        let before = fs::read_to_string(store.path("proj")).unwrap();

        let mut dataset = store.load("proj").unwrap();
        dataset.entries.push(GoldenEntry {
            id: "bad".to_string(),
            query: String::new(),
            expected_file_paths: None,
            expected_answer: None,
            tags: None,
            source: EntrySource::Manual,
        });
        let err = store.save(&dataset).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetInvalid);
        assert!(err.to_string().contains("entries[1].query"));

        let mut wrong_version = store.load("proj").unwrap();
        wrong_version.version = "2.0".to_string();
        assert!(store.save(&wrong_version).is_err());

        assert_eq!(fs::read_to_string(store.path("proj")).unwrap(), before);
        assert_eq!(store.list("proj").unwrap().len(), 1);
    }

    #[test]
    fn test_load_missing_is_empty() {
        let (_dir, store) = store();
        let dataset = store.load("nothing").unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.version, GOLDEN_VERSION);
        assert_eq!(dataset.project_name, "nothing");
        assert!(store.list("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_load_required_missing() {
        let (_dir, store) = store();
        let err = store.load_required("nothing").unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetNotFound);
    }

    #[test]
    fn test_add_list_remove() {
        let (_dir, store) = store();

        let first = store
            .add(
                "proj",
                NewGoldenEntry::new("where is auth?").with_files(["src/auth.ts"]),
            )
            .unwrap();
        let second = store
            .add(
                "proj",
                NewGoldenEntry::new("what does login return?")
                    .with_answer("a session token")
                    .with_tags(["auth"])
                    .with_source(EntrySource::Captured),
            )
            .unwrap();
        assert_ne!(first.id, second.id);

        let entries = store.list("proj").unwrap();
        assert_eq!(entries, vec![first.clone(), second.clone()]);
        assert_eq!(store.list_tagged("proj", "auth").unwrap(), vec![second.clone()]);

        assert!(store.remove("proj", &first.id).unwrap());
        assert!(!store.remove("proj", &first.id).unwrap());
        assert_eq!(store.list("proj").unwrap(), vec![second]);
    }

    #[test]
    fn test_add_rejects_empty_query() {
        let (_dir, store) = store();
        let err = store
            .add("proj", NewGoldenEntry::new("   ").with_files(["a.rs"]))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetInvalid);
        assert!(err.to_string().contains("query"));
        assert!(!store.path("proj").exists());
    }

    #[test]
    fn test_add_rejects_missing_expectations() {
        let (_dir, store) = store();
        let err = store.add("proj", NewGoldenEntry::new("q")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetInvalid);

        let empty_files: Vec<String> = Vec::new();
        let err = store
            .add("proj", NewGoldenEntry::new("q").with_files(empty_files).with_answer(" "))
            .unwrap_err();
        assert!(err.to_string().contains("expectedFilePaths"));
    }

    #[test]
    fn test_save_load_round_trip_preserves_order() {
        let (_dir, store) = store();
        let mut dataset = store.load("proj").unwrap();
        for i in 0..5 {
            dataset.entries.push(GoldenEntry {
                id: format!("id-{}", i),
                query: format!("query {}", i),
                expected_file_paths: Some(vec![format!("src/{}.rs", i)]),
                expected_answer: None,
                tags: None,
                source: EntrySource::Generated,
            });
        }
        store.save(&dataset).unwrap();

        let loaded = store.load("proj").unwrap();
        assert_eq!(loaded, dataset);
    }

    #[test]
    fn test_saved_file_is_pretty_camel_case() {
        let (_dir, store) = store();
        store
            .add("proj", NewGoldenEntry::new("q").with_files(["a.rs"]))
            .unwrap();
        let content = fs::read_to_string(store.path("proj")).unwrap();
        assert!(content.contains("\"projectName\": \"proj\""));
        assert!(content.contains("\"expectedFilePaths\""));
        assert!(content.contains("\"source\": \"manual\""));
        assert!(content.lines().count() > 3);

        let leftovers: Vec<_> = fs::read_dir(store.path("proj").parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_corrupt_file_fails_loudly() {
        let (_dir, store) = store();
        let path = store.path("proj");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let err = store.load("proj").unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetInvalid);
        assert!(store.list("proj").is_err());
    }

    #[test]
    fn test_schema_violations_are_all_reported() {
        let (_dir, store) = store();
        let path = store.path("proj");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{
  "version": "2.0",
  "projectName": "proj",
  "entries": [
    {"id": "a", "query": "", "expectedAnswer": "x", "source": "manual"},
    {"id": "a", "query": "q", "source": "manual"}
  ]
}"#,
        )
        .unwrap();

        let message = store.load("proj").unwrap_err().to_string();
        assert!(message.contains("version"));
        assert!(message.contains("entries[0].query"));
        assert!(message.contains("entries[1].id: duplicate"));
        assert!(message.contains("entries[1].expectedFilePaths"));
    }

    #[test]
    fn test_unknown_source_rejected() {
        let (_dir, store) = store();
        let path = store.path("proj");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{"version":"1.0","projectName":"proj","entries":[{"id":"a","query":"q","expectedAnswer":"x","source":"scraped"}]}"#,
        )
        .unwrap();

        let err = store.load("proj").unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetInvalid);
    }

    #[test]
    fn test_concurrent_adds_are_serialized() {
        let (_dir, store) = store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .add(
                            "proj",
                            NewGoldenEntry::new(format!("q{}", i)).with_files(["a.rs"]),
                        )
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.list("proj").unwrap().len(), 8);
    }

    #[test]
    fn test_entry_source_from_str() {
        assert_eq!("Captured".parse::<EntrySource>().unwrap(), EntrySource::Captured);
        assert!("other".parse::<EntrySource>().is_err());
    }
}
