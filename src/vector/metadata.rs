//! Metadata side-table
//!
//! Maps each record id to the caller's fields plus the index slot that holds
//! its vector, and keeps a slot -> id reverse index so search results can be
//! resolved without scanning every entry.

use crate::error::{Result, VaultError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Internal bookkeeping key written alongside caller fields on disk
pub const INDEX_POSITION_KEY: &str = "index_position";

/// Caller-supplied metadata, opaque to the store
pub type Metadata = Map<String, Value>;

/// One metadata record as it appears in the metadata file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub index_position: usize,
    #[serde(flatten)]
    pub fields: Metadata,
}

#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    entries: HashMap<String, MetadataEntry>,
    // Slot i is owned by by_position[i]
    by_position: Vec<String>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_position.is_empty()
    }

    /// Record `fields` for the vector at the next slot.
    ///
    /// `position` must equal the current length; slots are assigned in order.
    pub fn insert(&mut self, id: String, position: usize, fields: Metadata) -> Result<()> {
        if fields.contains_key(INDEX_POSITION_KEY) {
            return Err(VaultError::ReservedMetadataKey(INDEX_POSITION_KEY.to_string()));
        }
        debug_assert_eq!(position, self.by_position.len());
        debug_assert!(!self.entries.contains_key(&id));

        self.by_position.push(id.clone());
        self.entries.insert(
            id,
            MetadataEntry {
                index_position: position,
                fields,
            },
        );
        Ok(())
    }

    /// Undo the most recent insert.
    pub(crate) fn pop(&mut self) -> Option<(String, MetadataEntry)> {
        let id = self.by_position.pop()?;
        let entry = self.entries.remove(&id)?;
        Some((id, entry))
    }

    pub fn get(&self, id: &str) -> Option<&MetadataEntry> {
        self.entries.get(id)
    }

    pub fn id_at(&self, position: usize) -> Option<&str> {
        self.by_position.get(position).map(String::as_str)
    }

    /// Identifiers in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.by_position.iter().map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    /// Parse the metadata file contents and rebuild the reverse index.
    ///
    /// Positions must be unique and cover `0..n` without gaps.
    pub fn from_json(json: &str) -> std::result::Result<Self, String> {
        let entries: HashMap<String, MetadataEntry> =
            serde_json::from_str(json).map_err(|e| e.to_string())?;

        let mut slots: Vec<Option<String>> = vec![None; entries.len()];
        for (id, entry) in &entries {
            let slot = slots.get_mut(entry.index_position).ok_or_else(|| {
                format!(
                    "entry {} has index_position {} outside 0..{}",
                    id,
                    entry.index_position,
                    entries.len()
                )
            })?;
            if let Some(existing) = slot {
                return Err(format!(
                    "entries {} and {} share index_position {}",
                    existing, id, entry.index_position
                ));
            }
            *slot = Some(id.clone());
        }

        // Every slot is filled: n unique positions below n.
        let by_position = slots.into_iter().flatten().collect();

        Ok(Self {
            entries,
            by_position,
        })
    }

    /// Read a metadata file. `Ok(None)` means the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(VaultError::corrupt(path, e.to_string())),
        };

        Self::from_json(&json)
            .map(Some)
            .map_err(|reason| VaultError::corrupt(path, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_maintains_reverse_index() {
        let mut table = MetadataTable::new();
        table.insert("a".into(), 0, fields(json!({"q": "a"}))).unwrap();
        table.insert("b".into(), 1, fields(json!({"q": "b"}))).unwrap();

        assert_eq!(table.id_at(0), Some("a"));
        assert_eq!(table.id_at(1), Some("b"));
        assert_eq!(table.id_at(2), None);
        assert_eq!(table.get("b").unwrap().index_position, 1);
        assert_eq!(table.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_reserved_key_rejected() {
        let mut table = MetadataTable::new();
        let result = table.insert("a".into(), 0, fields(json!({"index_position": 7})));
        assert!(matches!(result, Err(VaultError::ReservedMetadataKey(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn test_json_layout_flattens_fields() {
        let mut table = MetadataTable::new();
        table
            .insert("a".into(), 0, fields(json!({"question_id": "budget"})))
            .unwrap();

        let value: Value = serde_json::from_str(&table.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"a": {"question_id": "budget", "index_position": 0}})
        );

        let reloaded = MetadataTable::from_json(&table.to_json().unwrap()).unwrap();
        assert_eq!(reloaded.id_at(0), Some("a"));
        assert_eq!(reloaded.get("a"), table.get("a"));
    }

    #[test]
    fn test_from_json_rejects_inconsistent_positions() {
        let duplicate = r#"{"a": {"index_position": 0}, "b": {"index_position": 0}}"#;
        assert!(MetadataTable::from_json(duplicate).is_err());

        let gap = r#"{"a": {"index_position": 0}, "b": {"index_position": 2}}"#;
        assert!(MetadataTable::from_json(gap).is_err());

        let missing = r#"{"a": {"q": "x"}}"#;
        assert!(MetadataTable::from_json(missing).is_err());

        assert!(MetadataTable::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_pop_removes_both_sides() {
        let mut table = MetadataTable::new();
        table.insert("a".into(), 0, Metadata::new()).unwrap();
        let (id, entry) = table.pop().unwrap();
        assert_eq!(id, "a");
        assert_eq!(entry.index_position, 0);
        assert!(table.get("a").is_none());
        assert!(table.is_empty());
    }
}
