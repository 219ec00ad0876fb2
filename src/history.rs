//! Append-only, capped-50 history of orchestration runs: a struct
//! serialized to JSON and written temp-then-rename. §4.O is a single capped
//! prepend-and-truncate list, not a full project export.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{MergeResult, OrchestratorState};

const MAX_RECORDS: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationRecord {
    pub id: Uuid,
    pub repo_path: PathBuf,
    pub feature_name: String,
    pub final_state: OrchestratorState,
    pub merge_result: Option<MergeResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    records: Vec<OrchestrationRecord>,
}

pub struct HistoryService {
    path: PathBuf,
}

impl HistoryService {
    pub fn new(path: PathBuf) -> Self {
        HistoryService { path }
    }

    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".crossroads/history/orchestrations.json")
    }

    /// Read errors (missing or corrupt file) are swallowed and treated as
    /// empty history.
    pub fn load(&self) -> Vec<OrchestrationRecord> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str::<HistoryFile>(&content)
            .map(|f| f.records)
            .unwrap_or_default()
    }

    /// Prepends `record`, truncates to [`MAX_RECORDS`], and writes the whole
    /// file atomically with sorted keys and pretty-printed JSON.
    pub fn append(&self, record: OrchestrationRecord) -> std::io::Result<()> {
        let mut records = self.load();
        records.insert(0, record);
        records.truncate(MAX_RECORDS);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = HistoryFile { records };
        let value = serde_json::to_value(&file).expect("HistoryFile always serializes");
        let sorted = sort_keys(&value);
        let json = serde_json::to_string_pretty(&sorted).expect("sorted value always serializes");

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, serde_json::Value> =
                map.iter().map(|(k, v)| (k.clone(), sort_keys(v))).collect();
            serde_json::to_value(sorted).expect("BTreeMap of Values always serializes")
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(feature_name: &str) -> OrchestrationRecord {
        OrchestrationRecord {
            id: Uuid::new_v4(),
            repo_path: PathBuf::from("/repo"),
            feature_name: feature_name.to_string(),
            final_state: OrchestratorState::Complete,
            merge_result: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn missing_file_yields_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let service = HistoryService::new(dir.path().join("orchestrations.json"));
        assert!(service.load().is_empty());
    }

    #[test]
    fn corrupt_file_yields_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orchestrations.json");
        std::fs::write(&path, "{ not json").unwrap();
        let service = HistoryService::new(path);
        assert!(service.load().is_empty());
    }

    #[test]
    fn append_prepends_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let service = HistoryService::new(dir.path().join("orchestrations.json"));
        service.append(sample_record("first")).unwrap();
        service.append(sample_record("second")).unwrap();

        let records = service.load();
        assert_eq!(records[0].feature_name, "second");
        assert_eq!(records[1].feature_name, "first");
    }

    #[test]
    fn append_truncates_to_cap() {
        let dir = tempfile::tempdir().unwrap();
        let service = HistoryService::new(dir.path().join("orchestrations.json"));
        for i in 0..(MAX_RECORDS + 10) {
            service.append(sample_record(&i.to_string())).unwrap();
        }
        assert_eq!(service.load().len(), MAX_RECORDS);
    }
}
