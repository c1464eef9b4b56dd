//! On-disk index format
//!
//! An index at base path `P` lives in two companion files:
//!
//! - `P.chunks`: JSON document `{format_version, count, built_at, chunks}`
//! - `P.idx`: little-endian binary. Magic `EIDX`, `u16` format version,
//!   `u32` dimension, `u64` row count, the 32-byte SHA-256 of the `P.chunks`
//!   bytes, then `count * dimension` `f32` values in row order.
//!
//! The digest ties the two files together: an `.idx` file only loads next to
//! the exact `.chunks` file it was written with.

use chrono::{DateTime, Utc};
use englishy_common::logger::INDEX_FILE_MISSING_TARGET;
use englishy_common::{EnglishyError, Result};
use englishy_ingest::Chunk;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::flat::FlatIpIndex;

const MAGIC: &[u8; 4] = b"EIDX";
const FORMAT_VERSION: u16 = 1;
const CHUNKS_FORMAT_VERSION: u32 = 1;
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = 4 + 2 + 4 + 8 + DIGEST_LEN;

/// Extension of the vector file
pub const INDEX_EXTENSION: &str = "idx";

/// Extension of the chunk list file
pub const CHUNKS_EXTENSION: &str = "chunks";

#[derive(Serialize)]
struct ChunkFileRef<'a> {
    format_version: u32,
    count: usize,
    built_at: Option<DateTime<Utc>>,
    chunks: &'a [Chunk],
}

#[derive(Deserialize)]
struct ChunkFile {
    format_version: u32,
    count: usize,
    #[serde(default)]
    built_at: Option<DateTime<Utc>>,
    chunks: Vec<Chunk>,
}

/// Contents of a loaded index
pub struct StoredIndex {
    pub flat: FlatIpIndex,
    pub chunks: Vec<Chunk>,
    pub built_at: Option<DateTime<Utc>>,
}

/// `P.<extension>` without replacing any dot already in `P`
pub fn companion_path(base: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Write both companion files, chunk list first
pub fn write_index(
    base: &Path,
    flat: &FlatIpIndex,
    chunks: &[Chunk],
    built_at: Option<DateTime<Utc>>,
) -> Result<()> {
    if flat.len() != chunks.len() {
        return Err(EnglishyError::dimension_mismatch(
            chunks.len(),
            flat.len(),
            "persist: vector rows vs chunks",
        ));
    }

    if let Some(parent) = base.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let chunk_bytes = serde_json::to_vec(&ChunkFileRef {
        format_version: CHUNKS_FORMAT_VERSION,
        count: chunks.len(),
        built_at,
        chunks,
    })?;
    let digest = Sha256::digest(&chunk_bytes);

    let dimension = u32::try_from(flat.dimension()).map_err(|_| {
        EnglishyError::invalid_input(format!("Dimension {} too large to persist", flat.dimension()))
    })?;

    let mut index_bytes = Vec::with_capacity(HEADER_LEN + flat.len() * flat.dimension() * 4);
    index_bytes.extend_from_slice(MAGIC);
    index_bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    index_bytes.extend_from_slice(&dimension.to_le_bytes());
    index_bytes.extend_from_slice(&(flat.len() as u64).to_le_bytes());
    index_bytes.extend_from_slice(&digest);
    for value in flat.values() {
        index_bytes.extend_from_slice(&value.to_le_bytes());
    }

    let chunks_path = companion_path(base, CHUNKS_EXTENSION);
    let index_path = companion_path(base, INDEX_EXTENSION);
    write_atomic(&chunks_path, &chunk_bytes)?;
    write_atomic(&index_path, &index_bytes)?;

    debug!(
        "Wrote {} ({} bytes) and {} ({} bytes), chunks sha256 {}",
        chunks_path.display(),
        chunk_bytes.len(),
        index_path.display(),
        index_bytes.len(),
        hex::encode(digest)
    );
    Ok(())
}

/// Read both companion files
///
/// Returns `Ok(None)` with a warning when either file is missing. Files that
/// exist but disagree with each other are an `IndexCorrupt` error.
pub fn read_index(base: &Path) -> Result<Option<StoredIndex>> {
    let chunks_path = companion_path(base, CHUNKS_EXTENSION);
    let index_path = companion_path(base, INDEX_EXTENSION);

    for path in [&index_path, &chunks_path] {
        if !path.exists() {
            warn!(
                target: INDEX_FILE_MISSING_TARGET,
                "Index file missing: {}; index left unchanged",
                path.display()
            );
            return Ok(None);
        }
    }

    let chunk_bytes = std::fs::read(&chunks_path)?;
    let index_bytes = std::fs::read(&index_path)?;

    let chunk_file: ChunkFile = serde_json::from_slice(&chunk_bytes).map_err(|e| {
        EnglishyError::index_corrupt(format!("{}: {}", chunks_path.display(), e))
    })?;
    if chunk_file.format_version != CHUNKS_FORMAT_VERSION {
        return Err(EnglishyError::index_corrupt(format!(
            "{}: unsupported format version {}",
            chunks_path.display(),
            chunk_file.format_version
        )));
    }
    if chunk_file.count != chunk_file.chunks.len() {
        return Err(EnglishyError::index_corrupt(format!(
            "{}: declares {} chunks but holds {}",
            chunks_path.display(),
            chunk_file.count,
            chunk_file.chunks.len()
        )));
    }

    let header = IndexHeader::parse(&index_bytes)
        .map_err(|msg| EnglishyError::index_corrupt(format!("{}: {}", index_path.display(), msg)))?;

    let digest = Sha256::digest(&chunk_bytes);
    if digest.as_slice() != header.digest {
        return Err(EnglishyError::index_corrupt(format!(
            "{} does not belong to {} (chunks sha256 {}, expected {})",
            chunks_path.display(),
            index_path.display(),
            hex::encode(digest),
            hex::encode(header.digest)
        )));
    }

    if header.count != chunk_file.chunks.len() {
        return Err(EnglishyError::index_corrupt(format!(
            "{} holds {} vectors but {} holds {} chunks",
            index_path.display(),
            header.count,
            chunks_path.display(),
            chunk_file.chunks.len()
        )));
    }

    let data = decode_values(&index_bytes[HEADER_LEN..], header.count, header.dimension)
        .map_err(|msg| EnglishyError::index_corrupt(format!("{}: {}", index_path.display(), msg)))?;
    let flat = FlatIpIndex::from_normalized(header.count, header.dimension, data)?;

    Ok(Some(StoredIndex {
        flat,
        chunks: chunk_file.chunks,
        built_at: chunk_file.built_at,
    }))
}

struct IndexHeader<'a> {
    dimension: usize,
    count: usize,
    digest: &'a [u8],
}

impl<'a> IndexHeader<'a> {
    fn parse(bytes: &'a [u8]) -> std::result::Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("truncated header ({} bytes)", bytes.len()));
        }
        if &bytes[0..4] != MAGIC {
            return Err("bad magic".to_string());
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(format!("unsupported format version {}", version));
        }

        let dimension = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[10..18]);
        let count = usize::try_from(u64::from_le_bytes(count))
            .map_err(|_| "row count overflows usize".to_string())?;

        Ok(Self {
            dimension,
            count,
            digest: &bytes[18..HEADER_LEN],
        })
    }
}

fn decode_values(payload: &[u8], count: usize, dimension: usize) -> std::result::Result<Vec<f32>, String> {
    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| "vector payload size overflows".to_string())?;
    if payload.len() != expected {
        return Err(format!(
            "expected {} payload bytes for {} x {} vectors, found {}",
            expected,
            count,
            dimension,
            payload.len()
        ));
    }

    let mut values = Vec::with_capacity(count * dimension);
    for bytes in payload.chunks_exact(4) {
        let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if !value.is_finite() {
            return Err("vector payload contains non-finite values".to_string());
        }
        values.push(value);
    }
    Ok(values)
}

/// Write to a sibling temp file, then rename over the target
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = companion_path(path, "tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use englishy_ingest::ChunkKind;
    use serde_json::Map;

    fn chunk(id: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            parent_record_id: "item_1".to_string(),
            kind: ChunkKind::Sentence,
            text: format!("text of {}", id),
            fields: Map::new(),
            metadata: Map::new(),
        }
    }

    fn sample() -> (FlatIpIndex, Vec<Chunk>) {
        let flat = FlatIpIndex::from_embeddings(&[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 1.0]], 3).unwrap();
        (flat, vec![chunk("a"), chunk("b")])
    }

    #[test]
    fn test_companion_path_keeps_dots() {
        let path = companion_path(Path::new("cache/index.v2"), INDEX_EXTENSION);
        assert_eq!(path, PathBuf::from("cache/index.v2.idx"));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested").join("englishy_index");
        let (flat, chunks) = sample();
        let built_at = Utc::now();

        write_index(&base, &flat, &chunks, Some(built_at)).unwrap();
        assert!(companion_path(&base, INDEX_EXTENSION).exists());
        assert!(!companion_path(&companion_path(&base, INDEX_EXTENSION), "tmp").exists());

        let stored = read_index(&base).unwrap().unwrap();
        assert_eq!(stored.chunks, chunks);
        assert_eq!(stored.flat.dimension(), 3);
        assert_eq!(stored.flat.values().collect::<Vec<_>>(), flat.values().collect::<Vec<_>>());
        assert_eq!(stored.built_at, Some(built_at));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("englishy_index");
        assert!(read_index(&base).unwrap().is_none());

        let (flat, chunks) = sample();
        write_index(&base, &flat, &chunks, None).unwrap();
        std::fs::remove_file(companion_path(&base, CHUNKS_EXTENSION)).unwrap();
        assert!(read_index(&base).unwrap().is_none());
    }

    #[test]
    fn test_mismatched_companion_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        let (flat, chunks) = sample();
        write_index(&first, &flat, &chunks, None).unwrap();
        write_index(&second, &flat, &[chunk("a"), chunk("c")], None).unwrap();

        std::fs::copy(
            companion_path(&second, CHUNKS_EXTENSION),
            companion_path(&first, CHUNKS_EXTENSION),
        )
        .unwrap();
        assert!(matches!(read_index(&first), Err(EnglishyError::IndexCorrupt(_))));
    }

    #[test]
    fn test_truncated_vectors_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("englishy_index");
        let (flat, chunks) = sample();
        write_index(&base, &flat, &chunks, None).unwrap();

        let idx = companion_path(&base, INDEX_EXTENSION);
        let bytes = std::fs::read(&idx).unwrap();
        std::fs::write(&idx, &bytes[..bytes.len() - 4]).unwrap();
        assert!(matches!(read_index(&base), Err(EnglishyError::IndexCorrupt(_))));

        std::fs::write(&idx, b"JUNK").unwrap();
        assert!(matches!(read_index(&base), Err(EnglishyError::IndexCorrupt(_))));
    }

    #[test]
    fn test_row_count_must_match_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (flat, chunks) = sample();
        let err = write_index(&dir.path().join("x"), &flat, &chunks[..1], None).unwrap_err();
        assert!(matches!(err, EnglishyError::DimensionMismatch { .. }));
    }
}
