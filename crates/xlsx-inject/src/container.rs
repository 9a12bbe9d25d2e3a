//! Whole-part read/write/delete primitives over a ZIP container on disk.
//!
//! Every mutation is a full read-modify-write of the archive file: appends go through
//! `ZipWriter::new_append`, deletions rewrite the archive into a sibling temp file with
//! `raw_copy_file` (untouched entries keep their compressed bytes) and rename it over the
//! original.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use zip::read::ZipFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{InjectError, Result};
use crate::fs::parent_dir_or_dot;

/// Default maximum uncompressed size permitted for any single part inflated into memory.
pub const DEFAULT_MAX_PART_BYTES: u64 = 256 * 1024 * 1024; // 256MiB

/// Size limits enforced when parts are read into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLimits {
    pub max_part_bytes: u64,
}

impl Default for PartLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Remove any existing entry with the same name, then append.
    Replace,
    /// Append; fails if the entry already exists.
    AppendNew,
}

/// Canonical lookup key: leading separators stripped, `\` as `/`, ASCII lower-case.
fn part_name_key(name: &str) -> String {
    name.trim_start_matches(['/', '\\'])
        .replace('\\', "/")
        .to_ascii_lowercase()
}

/// Find the archive index for `name`, preferring an exact match over an equivalent one.
fn find_entry<R: Read + std::io::Seek>(archive: &ZipArchive<R>, name: &str) -> Option<usize> {
    let key = part_name_key(name);
    let mut equivalent = None;
    for (idx, entry) in archive.file_names().enumerate() {
        if entry == name {
            return archive.index_for_name(entry).or(Some(idx));
        }
        if equivalent.is_none() && part_name_key(entry) == key {
            equivalent = archive.index_for_name(entry);
        }
    }
    equivalent
}

fn read_with_limit<R: Read>(file: &mut ZipFile<'_, R>, part: &str, max_bytes: u64) -> Result<Vec<u8>> {
    if file.size() > max_bytes {
        return Err(InjectError::PartTooLarge {
            part: part.to_string(),
            size: file.size(),
            max: max_bytes,
        });
    }

    // Don't trust the declared size alone.
    let mut buf = Vec::new();
    file.take(max_bytes.saturating_add(1)).read_to_end(&mut buf)?;
    if buf.len() as u64 > max_bytes {
        return Err(InjectError::PartTooLarge {
            part: part.to_string(),
            size: buf.len() as u64,
            max: max_bytes,
        });
    }
    Ok(buf)
}

/// A ZIP container file that parts are read from and written back into.
#[derive(Debug, Clone)]
pub struct Container {
    path: PathBuf,
    limits: PartLimits,
}

impl Container {
    pub fn new(path: impl Into<PathBuf>, limits: PartLimits) -> Self {
        Self {
            path: path.into(),
            limits,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn archive(&self) -> Result<ZipArchive<File>> {
        Ok(ZipArchive::new(File::open(&self.path)?)?)
    }

    /// Names of all file entries, in archive order.
    pub fn list_entries(&self) -> Result<Vec<String>> {
        let mut archive = self.archive()?;
        let mut out = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            if file.is_file() {
                out.push(file.name().to_string());
            }
        }
        Ok(out)
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(find_entry(&self.archive()?, name).is_some())
    }

    /// Read a part that the package format requires to exist.
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        self.read_entry_optional(name)?
            .ok_or_else(|| InjectError::MissingPart(name.to_string()))
    }

    /// Read a part, returning `Ok(None)` when the entry does not exist.
    pub fn read_entry_optional(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = self.archive()?;
        let Some(idx) = find_entry(&archive, name) else {
            return Ok(None);
        };
        let mut file = archive.by_index(idx)?;
        if file.is_dir() {
            return Ok(None);
        }
        read_with_limit(&mut file, name, self.limits.max_part_bytes).map(Some)
    }

    pub fn write_entry(&self, name: &str, bytes: &[u8], mode: WriteMode) -> Result<()> {
        let existing = {
            let archive = self.archive()?;
            find_entry(&archive, name)
                .and_then(|idx| archive.name_for_index(idx).map(str::to_string))
        };
        let entry_name = match (mode, existing) {
            (WriteMode::AppendNew, Some(existing)) => {
                return Err(InjectError::Invalid(format!(
                    "cannot append {name}: entry {existing} already exists"
                )))
            }
            (WriteMode::Replace, Some(existing)) => {
                self.delete_entry(&existing)?;
                existing
            }
            (_, None) => name.to_string(),
        };

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let mut zip = ZipWriter::new_append(file)?;
        let options =
            FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(entry_name.as_str(), options)?;
        zip.write_all(bytes)?;
        zip.finish()?;
        log::debug!("wrote part {entry_name} ({} bytes)", bytes.len());
        Ok(())
    }

    /// Remove an entry. Returns `false` when no such entry exists.
    pub fn delete_entry(&self, name: &str) -> Result<bool> {
        let mut archive = self.archive()?;
        let Some(skip) = find_entry(&archive, name) else {
            return Ok(false);
        };

        let mut tmp = NamedTempFile::new_in(parent_dir_or_dot(&self.path))?;
        {
            let mut zip = ZipWriter::new(tmp.as_file_mut());
            for i in 0..archive.len() {
                if i == skip {
                    continue;
                }
                zip.raw_copy_file(archive.by_index_raw(i)?)?;
            }
            zip.finish()?;
        }
        drop(archive);

        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        log::debug!("deleted part {name}");
        Ok(true)
    }
}
