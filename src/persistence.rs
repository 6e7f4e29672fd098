// File: src/persistence.rs
use crate::core::target_index::TargetIndex;
use crate::error::PersistError;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tempfile::NamedTempFile;

/// Saves the target index atomically: the ids assigned during training must
/// be the ids the application run resolves, so the index is written to a
/// temp file in the destination directory and persisted in one rename.
pub fn save_index(index: &TargetIndex, path: &Path) -> Result<(), PersistError> {
    let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent_dir)?;

    let temp_file = NamedTempFile::new_in(parent_dir)?;
    let writer = BufWriter::new(&temp_file);
    bincode::serialize_into(writer, index)?;

    temp_file.persist(path).map_err(|e| PersistError::Io(e.error))?;
    Ok(())
}

pub fn load_index(path: &Path) -> Result<TargetIndex, PersistError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let index = bincode::deserialize_from(reader)?;
    Ok(index)
}
