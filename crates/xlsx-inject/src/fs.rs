//! Filesystem helpers for the session's working copy and for saving.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tempfile::{NamedTempFile, TempPath};

use crate::error::Result;

pub(crate) fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` is `Some("")` for bare relative names like `out.xlsx`.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Copy `template` into a fresh private file named `~YYYYMMDD_<name>.<random>.zip`.
///
/// The template is only ever opened for reading. The returned [`TempPath`] deletes the copy when
/// dropped or closed.
pub(crate) fn create_working_copy(template: &Path, working_dir: Option<&Path>) -> Result<TempPath> {
    let file_name = template
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".to_string());
    let prefix = format!("~{}_{}.", Local::now().format("%Y%m%d"), file_name);
    let dir: PathBuf = match working_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::temp_dir(),
    };
    fs::create_dir_all(&dir)?;

    let mut source = File::open(template)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".zip")
        .tempfile_in(&dir)?;
    io::copy(&mut source, tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    Ok(tmp.into_temp_path())
}

/// Copy `src` to `dest` through a temp file in the destination directory, then rename into
/// place. `dest` is left untouched if the copy fails.
pub(crate) fn atomic_copy(src: &Path, dest: &Path) -> Result<()> {
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut source = File::open(src)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    io::copy(&mut source, tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest)?;
    Ok(())
}
