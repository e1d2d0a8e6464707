use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Collect the files in `dir` carrying `extension`, sorted by name.
///
/// Fails when the directory cannot be read or holds no matching file.
pub fn collect_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).context(format!("reading directory {:?}", dir))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file() && path.extension() == Some(std::ffi::OsStr::new(extension))
        })
        .collect();
    if files.is_empty() {
        bail!("no .{} files found in {:?}", extension, dir);
    }
    files.sort();
    Ok(files)
}
