use crate::error::AppError;
use crate::models::file_entry::FileSystemEntry;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Entries directly inside `dir`, sorted by name so processing order is stable.
pub fn list_directory(dir: &Path, include_hidden: bool) -> Result<Vec<FileSystemEntry>, AppError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !include_hidden && is_hidden_name(&name) {
            continue;
        }
        // Entries can vanish between read_dir and stat while the janitor runs.
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        entries.push(FileSystemEntry::from_metadata(&entry.path(), &metadata));
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

pub fn loose_files(dir: &Path, include_hidden: bool) -> Result<Vec<FileSystemEntry>, AppError> {
    Ok(list_directory(dir, include_hidden)?
        .into_iter()
        .filter(|entry| !entry.is_directory)
        .collect())
}

pub fn subdirectories(dir: &Path, include_hidden: bool) -> Result<Vec<FileSystemEntry>, AppError> {
    Ok(list_directory(dir, include_hidden)?
        .into_iter()
        .filter(|entry| entry.is_directory)
        .collect())
}

pub fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

pub fn create_dir(path: &Path) -> Result<(), AppError> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Moves `source` to `destination`, creating missing parents. An existing
/// destination is removed first.
pub fn move_entry(source: &Path, destination: &Path) -> Result<PathBuf, AppError> {
    if source == destination {
        return Ok(destination.to_path_buf());
    }
    if !exists(source) {
        return Err(AppError::General(format!(
            "source does not exist: {}",
            source.display()
        )));
    }
    if source.is_dir() && destination.starts_with(source) {
        return Err(AppError::General(format!(
            "cannot move {} into itself",
            source.display()
        )));
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    if exists(destination) {
        remove_path(destination)?;
    }

    fs::rename(source, destination)?;
    Ok(destination.to_path_buf())
}

fn remove_path(path: &Path) -> Result<(), AppError> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Removes `dir` only when it has no entries at all (hidden ones included).
pub fn remove_empty_dir(dir: &Path) -> Result<bool, AppError> {
    if fs::read_dir(dir)?.next().is_some() {
        return Ok(false);
    }
    fs::remove_dir(dir)?;
    Ok(true)
}

/// Directories under `root` (inclusive) that contain no subdirectories.
pub fn leaf_directories(root: &Path, include_hidden: bool) -> Result<Vec<PathBuf>, AppError> {
    let mut leaves = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || include_hidden
                || !is_hidden_name(&entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable entry during leaf scan");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        match subdirectories(entry.path(), include_hidden) {
            Ok(children) if children.is_empty() => leaves.push(entry.into_path()),
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(dir = %entry.path().display(), error = %err, "leaf scan could not list directory");
            }
        }
    }
    Ok(leaves)
}
