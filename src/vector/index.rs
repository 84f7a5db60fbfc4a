//! Flat inner-product index
//!
//! Vectors live in one contiguous buffer; slot `i` occupies
//! `data[i * dimension..(i + 1) * dimension]`. Slots are append-only and
//! their positions never change.

use super::math::dot;
use crate::error::{Result, VaultError};
use std::cmp::Ordering;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Magic number at the start of every index file
pub const MAGIC: &[u8; 8] = b"PVIDX001";

/// magic + dimension (u32) + count (u64)
const HEADER_LEN: usize = 8 + 4 + 8;

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector and return the slot it landed in.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        if vector.len() != self.dimension {
            return Err(VaultError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    /// Drop the most recently added slot. Only used to undo a failed store.
    pub(crate) fn pop(&mut self) -> Option<Vec<f32>> {
        if self.is_empty() {
            return None;
        }
        let start = self.data.len() - self.dimension;
        Some(self.data.split_off(start))
    }

    pub fn get(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Top `k` slots by inner product with `query`, best first.
    ///
    /// Equal scores keep ascending slot order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(VaultError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, slot)| (position, dot(query, slot)))
            .collect();

        // -0.0 and 0.0 compare equal here, so they fall back to slot order.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);

        bytes.extend_from_slice(MAGIC);
        // Dimensions above u32::MAX are refused by VectorConfig::validate.
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());

        for &val in &self.data {
            bytes.extend_from_slice(&val.to_le_bytes());
        }

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, &'static str> {
        if bytes.len() < HEADER_LEN {
            return Err("header too short");
        }
        if &bytes[0..8] != MAGIC {
            return Err("invalid magic number");
        }

        let dimension = u32::from_le_bytes(
            bytes[8..12]
                .try_into()
                .map_err(|_| "invalid dimension bytes")?,
        ) as usize;
        let count = u64::from_le_bytes(
            bytes[12..20]
                .try_into()
                .map_err(|_| "invalid count bytes")?,
        ) as usize;

        if dimension == 0 {
            return Err("zero dimension");
        }

        let expected_len = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_LEN))
            .ok_or("vector count overflows")?;
        if bytes.len() < expected_len {
            return Err("incomplete vector data");
        }
        if bytes.len() > expected_len {
            return Err("trailing bytes after vector data");
        }

        let data = bytes[HEADER_LEN..]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self { dimension, data })
    }

    /// Read an index file. `Ok(None)` means the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(VaultError::corrupt(path, e.to_string())),
        };

        Self::from_bytes(&bytes)
            .map(Some)
            .map_err(|reason| VaultError::corrupt(path, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn index_with(vectors: &[[f32; 3]]) -> FlatIndex {
        let mut index = FlatIndex::new(3);
        for v in vectors {
            index.add(v).unwrap();
        }
        index
    }

    #[test]
    fn test_add_assigns_sequential_positions() {
        let mut index = FlatIndex::new(2);
        assert_eq!(index.add(&[1.0, 0.0]).unwrap(), 0);
        assert_eq!(index.add(&[0.0, 1.0]).unwrap(), 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1), Some(&[0.0, 1.0][..]));
        assert_eq!(index.get(2), None);
    }

    #[test]
    fn test_add_rejects_wrong_dimension() {
        let mut index = FlatIndex::new(3);
        match index.add(&[1.0, 0.0]) {
            Err(VaultError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("Expected DimensionMismatch, got {:?}", other),
        }
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_orders_by_score_then_position() {
        let index = index_with(&[[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);

        let hits = index.search(&[1.0, 0.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![1, 2, 0]);

        // Both score zero, one of them as -0.0.
        let mut signed = FlatIndex::new(2);
        signed.add(&[0.0, -1.0]).unwrap();
        signed.add(&[0.0, 1.0]).unwrap();
        let positions: Vec<usize> = signed
            .search(&[-1.0, 0.0], 2)
            .unwrap()
            .iter()
            .map(|(p, _)| *p)
            .collect();
        assert_eq!(positions, vec![0, 1]);
    }

    #[test]
    fn test_search_truncates_and_handles_empty() {
        let empty = FlatIndex::new(3);
        assert!(empty.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());

        let index = index_with(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).unwrap().len(), 2);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 1).unwrap().len(), 1);
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_pop_undoes_last_add() {
        let mut index = index_with(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        assert_eq!(index.pop(), Some(vec![0.0, 1.0, 0.0]));
        assert_eq!(index.len(), 1);
        assert_eq!(index.add(&[0.0, 0.0, 1.0]).unwrap(), 1);
    }

    #[test]
    fn test_bytes_reject_bad_input() {
        let index = index_with(&[[1.0, 0.0, 0.0]]);
        let bytes = index.to_bytes();
        assert_eq!(FlatIndex::from_bytes(&bytes).unwrap(), index);

        assert_eq!(FlatIndex::from_bytes(&bytes[..10]), Err("header too short"));
        assert_eq!(
            FlatIndex::from_bytes(&bytes[..bytes.len() - 1]),
            Err("incomplete vector data")
        );

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert_eq!(FlatIndex::from_bytes(&bad_magic), Err("invalid magic number"));

        let mut trailing = bytes;
        trailing.push(0);
        assert_eq!(
            FlatIndex::from_bytes(&trailing),
            Err("trailing bytes after vector data")
        );
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.vec");
        assert!(FlatIndex::load(&path).unwrap().is_none());

        fs::write(&path, b"not an index").unwrap();
        assert!(matches!(
            FlatIndex::load(&path),
            Err(VaultError::Corrupt { .. })
        ));
    }
}
