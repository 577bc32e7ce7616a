use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub enum DirEntryCategory {
    DoesNotExist,
    RegularFile,
    SymbolicLink,
    Directory,
    Unknown,
}

pub fn classify_file(path: &Path) -> DirEntryCategory {
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.is_symlink() {
                match fs::metadata(path) {
                    Ok(target) if target.is_file() => DirEntryCategory::RegularFile,
                    _ => DirEntryCategory::SymbolicLink,
                }
            } else if metadata.is_file() {
                DirEntryCategory::RegularFile
            } else if metadata.is_dir() {
                DirEntryCategory::Directory
            } else {
                DirEntryCategory::Unknown
            }
        },
        Err(_) => DirEntryCategory::DoesNotExist,
    }
}

/// Files in `dir` (not recursive) named `<prefix>*.<extension>`.
pub fn matching_files(dir: &Path, prefix: &str, extension: &str) -> io::Result<Vec<PathBuf>> {
    let suffix = format!(".{extension}");
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)?.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(prefix) && name.ends_with(&suffix) {
            found.push(entry.path());
        }
    }
    Ok(found)
}

pub fn count_matching_files(dir: &Path, prefix: &str, extension: &str) -> io::Result<u64> {
    Ok(matching_files(dir, prefix, extension)?.len() as u64)
}

pub fn remove_matching_files(dir: &Path, prefix: &str, extension: &str) -> io::Result<usize> {
    let files = matching_files(dir, prefix, extension)?;
    for file in &files {
        fs::remove_file(file)?;
    }
    Ok(files.len())
}
