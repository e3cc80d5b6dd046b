//! # Accepted Dataset
//!
//! Append/merge-only store of accepted submissions keyed by
//! (data_type, category). Only the orchestrator writes to it; renderers get
//! a [`DatasetSnapshot`] after the loop ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::protocol::{DataSubmission, DataType, Payload, Source};

/// Merge key of the accepted dataset
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetKey {
    pub data_type: DataType,
    /// Lowercased category, empty when neither payload nor config names one
    pub category: String,
}

impl DatasetKey {
    pub fn new(data_type: DataType, category: &str) -> Self {
        Self {
            data_type,
            category: category.trim().to_lowercase(),
        }
    }

    /// Key for a payload: its own category, else `fallback`
    pub fn for_payload(payload: &Payload, fallback: Option<&str>) -> Self {
        let category = payload
            .category()
            .filter(|c| !c.trim().is_empty())
            .or(fallback)
            .unwrap_or_default();
        Self::new(payload.data_type(), category)
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.category.is_empty() {
            write!(f, "{}", self.data_type)
        } else {
            write!(f, "{}/{}", self.data_type, self.category)
        }
    }
}

/// One accepted submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedRecord {
    pub key: DatasetKey,
    pub submission_id: String,
    pub task_id: String,
    pub agent_id: String,
    pub payload: Payload,
    pub sources: Vec<Source>,
    pub quality_score: f64,
    pub accepted_at: DateTime<Utc>,
}

impl AcceptedRecord {
    pub fn from_submission(
        submission: &DataSubmission,
        key: DatasetKey,
        quality_score: f64,
    ) -> Self {
        Self {
            key,
            submission_id: submission.id.clone(),
            task_id: submission.task_id.clone(),
            agent_id: submission.agent_id.clone(),
            payload: submission.payload.clone(),
            sources: submission.sources.clone(),
            quality_score,
            accepted_at: Utc::now(),
        }
    }
}

/// What a merge contributed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Identities seen for the first time
    pub added: Vec<String>,
    /// Identities already present for the data_type; kept, not overwritten
    pub duplicates: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AcceptedDataset {
    entries: BTreeMap<DatasetKey, Vec<AcceptedRecord>>,
    identities: BTreeMap<DataType, BTreeSet<String>>,
}

impl AcceptedDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a dataset by replaying stored records in order
    pub fn from_records(records: impl IntoIterator<Item = AcceptedRecord>) -> Self {
        let mut dataset = Self::new();
        for record in records {
            dataset.insert(record);
        }
        dataset
    }

    /// Append a record. Existing records are never replaced.
    pub fn insert(&mut self, record: AcceptedRecord) -> MergeOutcome {
        let seen = self
            .identities
            .entry(record.key.data_type)
            .or_default();
        let mut outcome = MergeOutcome::default();
        for id in record.payload.identities() {
            if seen.insert(id.clone()) {
                outcome.added.push(id);
            } else {
                outcome.duplicates.push(id);
            }
        }
        self.entries
            .entry(record.key.clone())
            .or_default()
            .push(record);
        outcome
    }

    /// Distinct identities accepted for a data_type
    pub fn count(&self, data_type: DataType) -> usize {
        self.identities.get(&data_type).map_or(0, BTreeSet::len)
    }

    /// All records of a data_type across categories, in key then arrival order
    pub fn records(&self, data_type: DataType) -> impl Iterator<Item = &AcceptedRecord> {
        self.entries
            .iter()
            .filter(move |(key, _)| key.data_type == data_type)
            .flat_map(|(_, records)| records.iter())
    }

    pub fn get(&self, key: &DatasetKey) -> &[AcceptedRecord] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DatasetKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> DatasetSnapshot {
        DatasetSnapshot {
            entries: self
                .entries
                .iter()
                .map(|(key, records)| DatasetEntry {
                    key: key.clone(),
                    distinct_items: self.count(key.data_type),
                    records: records.clone(),
                })
                .collect(),
            taken_at: Utc::now(),
        }
    }
}

/// Read-only copy of the dataset handed to renderers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    pub entries: Vec<DatasetEntry>,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub key: DatasetKey,
    /// Distinct identities of the entry's data_type (all categories)
    pub distinct_items: usize,
    pub records: Vec<AcceptedRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn brands(names: &[&str], category: &str) -> AcceptedRecord {
        let payload = Payload::from_data(
            DataType::BrandData,
            json!({ "category": category, "brands": names }).as_object().cloned().unwrap(),
        )
        .unwrap();
        let sub = DataSubmission::new(payload, vec![]);
        let key = DatasetKey::for_payload(&sub.payload, None);
        AcceptedRecord::from_submission(&sub, key, 0.95)
    }

    #[test]
    fn test_merge_reports_duplicates_without_overwrite() {
        let mut dataset = AcceptedDataset::new();
        let first = dataset.insert(brands(&["Gladiator", "Husky"], "Garage Storage"));
        assert_eq!(first.added, vec!["gladiator", "husky"]);

        let second = dataset.insert(brands(&["husky", "Kobalt"], "garage storage"));
        assert_eq!(second.added, vec!["kobalt"]);
        assert_eq!(second.duplicates, vec!["husky"]);

        let key = DatasetKey::new(DataType::BrandData, "garage storage");
        assert_eq!(dataset.get(&key).len(), 2);
        assert_eq!(dataset.count(DataType::BrandData), 3);
        assert_eq!(dataset.count(DataType::Pricing), 0);
    }

    #[test]
    fn test_categories_are_separate_keys() {
        let mut dataset = AcceptedDataset::new();
        dataset.insert(brands(&["Gladiator"], "garage storage"));
        dataset.insert(brands(&["OXO"], "kitchen storage"));
        assert_eq!(dataset.keys().count(), 2);
        assert_eq!(dataset.records(DataType::BrandData).count(), 2);
        assert_eq!(dataset.count(DataType::BrandData), 2);
    }

    #[test]
    fn test_rebuild_from_records() {
        let mut dataset = AcceptedDataset::new();
        dataset.insert(brands(&["Gladiator", "Husky"], "garage storage"));
        dataset.insert(brands(&["Husky"], "garage storage"));

        let records: Vec<_> = dataset.records(DataType::BrandData).cloned().collect();
        let rebuilt = AcceptedDataset::from_records(records);
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt.count(DataType::BrandData), 2);
    }

    #[test]
    fn test_fallback_category() {
        let payload = Payload::empty(DataType::Taxonomy);
        let key = DatasetKey::for_payload(&payload, Some("Garage Storage"));
        assert_eq!(key.category, "garage storage");
        assert_eq!(key.to_string(), "taxonomy/garage storage");
    }
}
