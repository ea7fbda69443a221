use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;

use crate::Result;
use crate::StorageError;

/// Opens `path` for appending, creating the file and its parent directories
/// as needed.
pub fn open_file_for_append(path: impl AsRef<Path>) -> Result<File> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(StorageError::IoError)?;
    }
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(StorageError::IoError)?;
    Ok(file)
}
