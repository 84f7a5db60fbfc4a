//! Durable append-only vector store
//!
//! Pairs a [`FlatIndex`] with a [`MetadataTable`] and keeps both files in the
//! storage directory in step: every `store` rewrites both before returning,
//! and a failed write is undone in memory.

use super::index::FlatIndex;
use super::math;
use super::metadata::{INDEX_POSITION_KEY, Metadata, MetadataTable};
use crate::config::{CorruptPolicy, VectorConfig};
use crate::error::{Result, VaultError};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const INDEX_FILE: &str = "index.vec";
pub const METADATA_FILE: &str = "metadata.json";

/// A single similarity hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// Everything known about one stored vector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub index_position: usize,
    /// The normalized vector as held by the index
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub vectors: usize,
    pub dimension: usize,
    pub storage_dir: PathBuf,
    pub index_bytes: u64,
    pub metadata_bytes: u64,
}

pub struct VectorStore {
    dimension: usize,
    storage_dir: PathBuf,
    index_path: PathBuf,
    metadata_path: PathBuf,
    index: FlatIndex,
    metadata: MetadataTable,
}

impl VectorStore {
    /// Open the store described by `config`, loading any existing files.
    ///
    /// Missing files mean a fresh store. Files that exist but cannot be read
    /// back are an error unless `config.on_corrupt` is [`CorruptPolicy::Reset`],
    /// in which case they are moved aside and the store starts empty.
    pub fn open(config: &VectorConfig) -> Result<Self> {
        config.validate()?;
        let storage_dir = config.resolve_storage_dir()?;
        fs::create_dir_all(&storage_dir)?;

        let index_path = storage_dir.join(INDEX_FILE);
        let metadata_path = storage_dir.join(METADATA_FILE);

        let (index, metadata) =
            match Self::load_state(&index_path, &metadata_path, config.dimension) {
                Ok(state) => state,
                Err(VaultError::Corrupt { path, reason })
                    if config.on_corrupt == CorruptPolicy::Reset =>
                {
                    warn!(
                        "Discarding unreadable vector store file {}: {}",
                        path.display(),
                        reason
                    );
                    quarantine(&index_path)?;
                    quarantine(&metadata_path)?;
                    (FlatIndex::new(config.dimension), MetadataTable::new())
                }
                Err(e) => return Err(e),
            };

        info!(
            "Opened vector store at {} (dimension {}, {} vectors)",
            storage_dir.display(),
            config.dimension,
            index.len()
        );

        Ok(Self {
            dimension: config.dimension,
            storage_dir,
            index_path,
            metadata_path,
            index,
            metadata,
        })
    }

    fn load_state(
        index_path: &Path,
        metadata_path: &Path,
        dimension: usize,
    ) -> Result<(FlatIndex, MetadataTable)> {
        let index = FlatIndex::load(index_path)?;
        let metadata = MetadataTable::load(metadata_path)?;

        match (index, metadata) {
            (None, None) => {
                debug!("No existing vector store files, starting empty");
                Ok((FlatIndex::new(dimension), MetadataTable::new()))
            }
            (None, Some(metadata)) => {
                if !metadata.is_empty() {
                    return Err(VaultError::corrupt(
                        index_path,
                        format!("missing while metadata holds {} entries", metadata.len()),
                    ));
                }
                Ok((FlatIndex::new(dimension), metadata))
            }
            (Some(mut index), metadata) => {
                if index.dimension() != dimension {
                    // Not corruption: the files are fine, the configuration is not.
                    return Err(VaultError::Configuration(format!(
                        "index at {} has dimension {}, configured dimension is {}",
                        index_path.display(),
                        index.dimension(),
                        dimension
                    )));
                }
                let metadata = metadata.unwrap_or_default();
                // The index is renamed into place before the metadata, so an
                // interrupted store leaves exactly one unowned trailing slot.
                if index.len() == metadata.len() + 1 {
                    warn!(
                        "Dropping unowned trailing vector at position {} in {}",
                        metadata.len(),
                        index_path.display()
                    );
                    index.pop();
                }
                if metadata.len() != index.len() {
                    return Err(VaultError::corrupt(
                        metadata_path,
                        format!(
                            "{} metadata entries for {} indexed vectors",
                            metadata.len(),
                            index.len()
                        ),
                    ));
                }
                Ok((index, metadata))
            }
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Identifiers in the order they were stored.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.metadata.ids()
    }

    /// Normalize and append `vector`, persist, and return its new id.
    ///
    /// On any error the store is left exactly as it was.
    pub fn store(&mut self, vector: &[f32], metadata: Option<Metadata>) -> Result<String> {
        if vector.len() != self.dimension {
            return Err(VaultError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let fields = metadata.unwrap_or_default();
        if fields.contains_key(INDEX_POSITION_KEY) {
            return Err(VaultError::ReservedMetadataKey(INDEX_POSITION_KEY.to_string()));
        }
        let normalized = math::normalized(vector)?;

        let id = Uuid::new_v4().to_string();
        let position = self.index.add(&normalized)?;
        if let Err(e) = self.metadata.insert(id.clone(), position, fields) {
            self.index.pop();
            return Err(e);
        }

        if let Err(e) = self.persist() {
            self.metadata.pop();
            self.index.pop();
            return Err(e);
        }

        debug!("Stored vector {} at position {}", id, position);
        Ok(id)
    }

    /// Up to `top_k` stored vectors most similar to `query`, best first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if query.len() != self.dimension {
            return Err(VaultError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = math::normalized(query)?;
        let hits = self.index.search(&query, top_k)?;

        let results: Vec<SearchResult> = hits
            .into_iter()
            .filter_map(|(position, score)| {
                let id = self.metadata.id_at(position)?;
                let entry = self.metadata.get(id)?;
                Some(SearchResult {
                    id: id.to_string(),
                    score,
                    metadata: entry.fields.clone(),
                })
            })
            .collect();

        debug!("Search returned {} of {} requested", results.len(), top_k);
        Ok(results)
    }

    /// Caller metadata for `id`, or `None` if no such record exists.
    pub fn get(&self, id: &str) -> Option<Metadata> {
        self.metadata.get(id).map(|entry| entry.fields.clone())
    }

    pub fn record(&self, id: &str) -> Option<VectorRecord> {
        let entry = self.metadata.get(id)?;
        let vector = self.index.get(entry.index_position)?;
        Some(VectorRecord {
            id: id.to_string(),
            index_position: entry.index_position,
            vector: vector.to_vec(),
            metadata: entry.fields.clone(),
        })
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            vectors: self.len(),
            dimension: self.dimension,
            storage_dir: self.storage_dir.clone(),
            index_bytes: file_len(&self.index_path),
            metadata_bytes: file_len(&self.metadata_path),
        }
    }

    /// Write both files via temp siblings so neither is left half-written.
    fn persist(&self) -> Result<()> {
        let index_tmp = tmp_path(&self.index_path);
        let metadata_tmp = tmp_path(&self.metadata_path);

        let result = self.write_pair(&index_tmp, &metadata_tmp);
        if result.is_err() {
            remove_tmp(&index_tmp);
            remove_tmp(&metadata_tmp);
        }
        result
    }

    fn write_pair(&self, index_tmp: &Path, metadata_tmp: &Path) -> Result<()> {
        let json = self.metadata.to_json()?;

        write_file(index_tmp, &self.index.to_bytes())?;
        write_file(metadata_tmp, json.as_bytes())?;
        rename_file(index_tmp, &self.index_path)?;
        rename_file(metadata_tmp, &self.metadata_path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn remove_tmp(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove temp file {}: {}", path.display(), e),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|source| VaultError::Persistence {
        path: path.to_path_buf(),
        source,
    })
}

fn rename_file(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|source| VaultError::Persistence {
        path: to.to_path_buf(),
        source,
    })
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Move an unreadable file out of the way, keeping it for inspection.
fn quarantine(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(format!(".corrupt-{}", chrono::Utc::now().timestamp()));
    let target = PathBuf::from(name);

    fs::rename(path, &target)?;
    warn!("Moved {} to {}", path.display(), target.display());
    Ok(())
}
