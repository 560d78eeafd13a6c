//! # Metadata Sink
//!
//! Key/value store for stream metadata. ICY records and decoder tag revisions
//! are written through [`MetadataSink`]; the host reads the [`MetadataStore`]
//! from any thread at any time.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Keys understood by the metadata sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaKey {
    Title,
    Composer,
    Message,
    SubTitle,
    Format,
    /// Playing time in seconds.
    Length,
    Channels,
    /// Number of sub-songs.
    Songs,
    /// Zero-based default sub-song.
    #[serde(rename = "startsong")]
    StartSong,
    /// One-based sub-song currently playing.
    Song,
}

impl MetaKey {
    pub const ALL: [MetaKey; 10] = [
        MetaKey::Title,
        MetaKey::Composer,
        MetaKey::Message,
        MetaKey::SubTitle,
        MetaKey::Format,
        MetaKey::Length,
        MetaKey::Channels,
        MetaKey::Songs,
        MetaKey::StartSong,
        MetaKey::Song,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetaKey::Title => "title",
            MetaKey::Composer => "composer",
            MetaKey::Message => "message",
            MetaKey::SubTitle => "sub_title",
            MetaKey::Format => "format",
            MetaKey::Length => "length",
            MetaKey::Channels => "channels",
            MetaKey::Songs => "songs",
            MetaKey::StartSong => "startsong",
            MetaKey::Song => "song",
        }
    }

    pub fn parse(name: &str) -> Option<MetaKey> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

impl fmt::Display for MetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Text(String),
    Int(i64),
}

impl MetaValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(text) => Some(text),
            MetaValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetaValue::Int(value) => Some(*value),
            MetaValue::Text(_) => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<u32> for MetaValue {
    fn from(value: u32) -> Self {
        MetaValue::Int(i64::from(value))
    }
}

impl From<u16> for MetaValue {
    fn from(value: u16) -> Self {
        MetaValue::Int(i64::from(value))
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Text(text) => f.write_str(text),
            MetaValue::Int(value) => write!(f, "{}", value),
        }
    }
}

/// Destination for metadata produced by the pipeline.
///
/// Writes replace the previous value of a key.
pub trait MetadataSink: Send + Sync {
    fn set(&self, key: MetaKey, value: MetaValue);

    /// Write a batch of entries.
    fn apply(&self, entries: &[(MetaKey, MetaValue)]) {
        for (key, value) in entries {
            self.set(*key, value.clone());
        }
    }
}

/// Thread-safe, replace-on-write [`MetadataSink`].
#[derive(Debug, Default)]
pub struct MetadataStore {
    values: RwLock<HashMap<MetaKey, MetaValue>>,
    revision: AtomicU64,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: MetaKey) -> Option<MetaValue> {
        self.values.read().get(&key).cloned()
    }

    pub fn text(&self, key: MetaKey) -> Option<String> {
        self.values
            .read()
            .get(&key)
            .and_then(|value| value.as_text().map(str::to_string))
    }

    pub fn int(&self, key: MetaKey) -> Option<i64> {
        self.values.read().get(&key).and_then(MetaValue::as_int)
    }

    /// Copy of every stored value, keyed by its external name.
    pub fn snapshot(&self) -> HashMap<String, MetaValue> {
        self.values
            .read()
            .iter()
            .map(|(key, value)| (key.as_str().to_string(), value.clone()))
            .collect()
    }

    /// Incremented once per write or batch that changed a value.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        let mut values = self.values.write();
        if !values.is_empty() {
            values.clear();
            self.revision.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl MetadataSink for MetadataStore {
    fn set(&self, key: MetaKey, value: MetaValue) {
        let mut values = self.values.write();
        if values.get(&key) != Some(&value) {
            values.insert(key, value);
            self.revision.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn apply(&self, entries: &[(MetaKey, MetaValue)]) {
        let mut values = self.values.write();
        let mut changed = false;
        for (key, value) in entries {
            if values.get(key) != Some(value) {
                values.insert(*key, value.clone());
                changed = true;
            }
        }
        if changed {
            self.revision.fetch_add(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_round_trip() {
        for key in MetaKey::ALL {
            assert_eq!(MetaKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(MetaKey::parse("StreamTitle"), None);
        assert_eq!(MetaKey::SubTitle.to_string(), "sub_title");
    }

    #[test]
    fn test_store_replaces_values() {
        let store = MetadataStore::new();
        store.set(MetaKey::SubTitle, "First".into());
        store.set(MetaKey::SubTitle, "Second".into());
        assert_eq!(store.text(MetaKey::SubTitle).as_deref(), Some("Second"));
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn test_unchanged_write_keeps_revision() {
        let store = MetadataStore::new();
        store.set(MetaKey::Length, MetaValue::Int(180));
        store.set(MetaKey::Length, MetaValue::Int(180));
        assert_eq!(store.revision(), 1);
        assert_eq!(store.int(MetaKey::Length), Some(180));
        assert_eq!(store.text(MetaKey::Length), None);
    }

    #[test]
    fn test_batch_counts_as_one_revision() {
        let store = MetadataStore::new();
        store.apply(&[
            (MetaKey::Title, "Song".into()),
            (MetaKey::Composer, "Artist".into()),
            (MetaKey::Channels, MetaValue::Int(2)),
        ]);
        assert_eq!(store.revision(), 1);
        store.apply(&[]);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_snapshot_serializes_with_external_names() {
        let store = MetadataStore::new();
        store.set(MetaKey::SubTitle, "Artist - Track".into());
        store.set(MetaKey::StartSong, MetaValue::Int(0));

        let json = serde_json::to_value(store.snapshot()).unwrap();
        assert_eq!(json["sub_title"], "Artist - Track");
        assert_eq!(json["startsong"], 0);
    }

    #[test]
    fn test_clear() {
        let store = MetadataStore::new();
        store.set(MetaKey::Title, "x".into());
        store.clear();
        assert!(store.snapshot().is_empty());
        assert_eq!(store.revision(), 2);
    }
}
