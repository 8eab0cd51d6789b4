//! On-disk artifacts of the vector index
//!
//! Every artifact is written to a temporary file in the target directory,
//! flushed, and renamed over the destination, so a crash leaves either the old
//! or the new file in place.

use super::IndexMetadata;
use crate::error::{Result, SearchError};
use ndarray::Array2;
use ndarray_npy::{NpzReader, NpzWriter};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Entry name of the embedding matrix inside the npz container
const EMBEDDINGS_ENTRY: &str = "embeddings.npy";

/// Write `target` through a sibling temp file that is renamed into place
pub(crate) fn write_atomically<F>(target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&NamedTempFile) -> Result<()>,
{
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let tmp = tempfile::Builder::new()
        .prefix(".mrl-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    write(&tmp)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| SearchError::Io(e.error))?;
    Ok(())
}

/// Save the embedding matrix as a compressed npz archive
pub(crate) fn write_embeddings(path: &Path, embeddings: &Array2<f32>) -> Result<()> {
    write_atomically(path, |tmp| {
        let mut npz = NpzWriter::new_compressed(tmp.as_file());
        npz.add_array(EMBEDDINGS_ENTRY, embeddings)
            .map_err(|e| SearchError::Io(std::io::Error::other(e.to_string())))?;
        npz.finish()
            .map_err(|e| SearchError::Io(std::io::Error::other(e.to_string())))?;
        Ok(())
    })?;
    tracing::debug!(
        "Saved {} x {} embeddings to {:?}",
        embeddings.nrows(),
        embeddings.ncols(),
        path
    );
    Ok(())
}

/// Read the embedding matrix back from an npz archive
///
/// Archives written by other tools may name the entry with or without the
/// `.npy` suffix; a single-entry archive is accepted under any name.
pub(crate) fn read_embeddings(path: &Path) -> Result<Array2<f32>> {
    let file = File::open(path)?;
    let mut npz = NpzReader::new(file).map_err(SearchError::load_failed)?;
    let names = npz.names().map_err(SearchError::load_failed)?;

    let entry = names
        .iter()
        .find(|n| n.as_str() == EMBEDDINGS_ENTRY)
        .or_else(|| names.iter().find(|n| n.as_str() == "embeddings"))
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| SearchError::LoadFailed(format!("{:?} contains no arrays", path)))?;

    let embeddings: Array2<f32> = npz.by_name(&entry).map_err(SearchError::load_failed)?;
    Ok(embeddings)
}

pub(crate) fn write_metadata(path: &Path, metadata: &IndexMetadata) -> Result<()> {
    write_atomically(path, |tmp| {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, metadata)?;
        writer.flush()?;
        Ok(())
    })?;
    tracing::debug!("Saved metadata for {} documents to {:?}", metadata.num_documents, path);
    Ok(())
}

pub(crate) fn read_metadata(path: &Path) -> Result<IndexMetadata> {
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(SearchError::load_failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn test_embeddings_round_trip_is_bit_exact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emb.npz");
        let matrix = array![[0.6f32, 0.8, 0.0], [1.0 / 3.0, -0.25, 1e-7]];

        write_embeddings(&path, &matrix).unwrap();
        let restored = read_embeddings(&path).unwrap();

        let original_bits: Vec<u32> = matrix.iter().map(|v| v.to_bits()).collect();
        let restored_bits: Vec<u32> = restored.iter().map(|v| v.to_bits()).collect();
        assert_eq!(original_bits, restored_bits);
        assert_eq!(restored.dim(), (2, 3));
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");

        write_metadata(&path, &IndexMetadata::default()).unwrap();
        write_metadata(&path, &IndexMetadata::default()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(read_metadata(&path).is_ok());
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");
        fs::write(&path, "previous").unwrap();

        let result = write_atomically(&path, |_| Err(SearchError::NotBuilt));
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
    }

    #[test]
    fn test_corrupt_artifacts_are_load_failures() {
        let dir = tempdir().unwrap();
        let npz = dir.path().join("emb.npz");
        let meta = dir.path().join("meta.json");
        fs::write(&npz, b"garbage").unwrap();
        fs::write(&meta, b"{ not json").unwrap();

        assert!(matches!(read_embeddings(&npz), Err(SearchError::LoadFailed(_))));
        assert!(matches!(read_metadata(&meta), Err(SearchError::LoadFailed(_))));
    }
}
