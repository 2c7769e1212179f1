use crate::error::{CorpusError, Result};
use crate::types::{Record, SourceType};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Immutable, ordered record collection.
///
/// Input order is preserved; ranking uses it as the tie-break between equal
/// scores. Cloning shares the underlying records.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Arc<[Record]>,
}

impl RecordSet {
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into(),
        }
    }

    /// Load a JSONL index from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| CorpusError::io(path, err))?;
        let set = Self::from_jsonl_str(&text)?;
        log::debug!("Loaded {} records from {}", set.len(), path.display());
        Ok(set)
    }

    /// Parse one JSON object per line. Blank lines are skipped.
    pub fn from_jsonl_str(text: &str) -> Result<Self> {
        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(line)
                .map_err(|source| CorpusError::Json {
                    line: idx + 1,
                    source,
                })?;
            records.push(record);
        }
        Ok(Self::new(records))
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record counts per source type
    #[must_use]
    pub fn by_source_type(&self) -> BTreeMap<SourceType, usize> {
        let mut counts = BTreeMap::new();
        for record in self.iter() {
            *counts.entry(record.source_type).or_insert(0) += 1;
        }
        counts
    }
}

impl From<Vec<Record>> for RecordSet {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
