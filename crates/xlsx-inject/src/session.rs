//! The package session: one private working copy of a template, edited part by part.

use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::container::{Container, PartLimits, WriteMode};
use crate::content_types::{
    ensure_override, remove_override, CONTENT_TYPES_PART, SHARED_STRINGS_CONTENT_TYPE,
};
use crate::directory::{SheetDirectory, SheetEntry, SheetVisibility, WORKBOOK_PART};
use crate::error::{InjectError, Result};
use crate::formula::invalidate_cached_values;
use crate::fs::{atomic_copy, create_working_copy};
use crate::recalc::{force_full_calc_on_load, RecalcPolicy, CALC_CHAIN_PART};
use crate::relationships::{
    ensure_relationship, remove_relationships, CALC_CHAIN_REL_TYPE, SHARED_STRINGS_REL_TYPE,
    WORKBOOK_RELS_PART,
};
use crate::shared_strings::{SharedStringPool, SHARED_STRINGS_PART};
use crate::value::{layout, InsertOptions, Value};
use crate::visibility::{set_sheet_state, visible_sheet_count};
use crate::worksheet::WorksheetPart;
use crate::xml::XmlTree;

/// Options for [`Workbook::open_with_options`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Directory for the working copy. Defaults to the system temp directory.
    pub working_dir: Option<PathBuf>,
    pub limits: PartLimits,
    pub recalc: RecalcPolicy,
}

impl OpenOptions {
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn limits(mut self, limits: PartLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn recalc(mut self, recalc: RecalcPolicy) -> Self {
        self.recalc = recalc;
        self
    }
}

fn require_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(InjectError::MissingPath);
    }
    Ok(())
}

/// An open spreadsheet template.
///
/// All edits go to a private copy of the template; the template itself is only read. The copy is
/// deleted by [`close`](Self::close) or when the session is dropped.
#[derive(Debug)]
pub struct Workbook {
    working: TempPath,
    container: Container,
    workbook: XmlTree,
    directory: SheetDirectory,
    recalc: RecalcPolicy,
    recalc_applied: bool,
}

impl Workbook {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, OpenOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let template = path.as_ref();
        require_path(template)?;

        let working = create_working_copy(template, options.working_dir.as_deref())?;
        let container = Container::new(working.to_path_buf(), options.limits);
        let workbook = XmlTree::parse(&container.read_entry(WORKBOOK_PART)?)?;
        let rels = container.read_entry_optional(WORKBOOK_RELS_PART)?;
        let part_names = container.list_entries()?;
        let directory = SheetDirectory::build(&workbook, rels.as_deref(), &part_names, |name| {
            container.read_entry(name)
        })?;

        log::debug!(
            "opened {} as {} ({} sheets)",
            template.display(),
            container.path().display(),
            directory.entries().len()
        );
        Ok(Self {
            working,
            container,
            workbook,
            directory,
            recalc: options.recalc,
            recalc_applied: false,
        })
    }

    /// Handle to the sheet called `name`.
    pub fn sheet(&mut self, name: &str) -> Result<Worksheet<'_>> {
        let index = self.directory.require(name)?;
        Ok(Worksheet { book: self, index })
    }

    /// Sheet names in tab order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.directory.names().collect()
    }

    pub fn sheets(&self) -> &[SheetEntry] {
        self.directory.entries()
    }

    pub fn charts_for(&self, name: &str) -> &[String] {
        self.directory.charts_for(name)
    }

    pub fn working_path(&self) -> &Path {
        self.container.path()
    }

    /// Copy the working package to `path`. The session stays open.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let dest = path.as_ref();
        require_path(dest)?;
        atomic_copy(self.container.path(), dest)?;
        log::debug!("saved {}", dest.display());
        Ok(())
    }

    /// Discard the working copy.
    pub fn close(self) -> Result<()> {
        let path = self.working.to_path_buf();
        self.working.close()?;
        log::debug!("removed working copy {}", path.display());
        Ok(())
    }

    fn entry(&self, index: usize) -> Result<&SheetEntry> {
        self.directory
            .get(index)
            .ok_or_else(|| InjectError::Invalid(format!("stale sheet handle {index}")))
    }

    fn insert_into(&mut self, index: usize, value: &Value, options: &InsertOptions) -> Result<()> {
        let placements = layout(value, options)?;
        let part_name = self.entry(index)?.part.clone();
        if placements.is_empty() {
            log::debug!("nothing to insert into {part_name}");
            return Ok(());
        }

        let mut sheet = WorksheetPart::parse(&self.container.read_entry(&part_name)?)?;
        let mut strings = match self.container.read_entry_optional(SHARED_STRINGS_PART)? {
            Some(bytes) => SharedStringPool::from_part(&bytes)?,
            None => SharedStringPool::synthesized()?,
        };

        for (cell, scalar) in &placements {
            let node = sheet.ensure_cell(*cell)?;
            sheet.write_value(node, scalar, &mut strings)?;
        }
        let invalidated = invalidate_cached_values(sheet.tree_mut());

        self.container
            .write_entry(&part_name, &sheet.to_bytes()?, WriteMode::Replace)?;
        if strings.is_dirty() {
            self.container
                .write_entry(SHARED_STRINGS_PART, &strings.to_bytes()?, WriteMode::Replace)?;
            if strings.is_synthesized() {
                self.register_shared_strings()?;
            }
        }
        log::debug!(
            "inserted {} cells into {part_name} ({invalidated} formula caches dropped)",
            placements.len()
        );

        self.apply_recalc_policy()
    }

    fn register_shared_strings(&mut self) -> Result<()> {
        if let Some(types) = self.container.read_entry_optional(CONTENT_TYPES_PART)? {
            if let Some(updated) =
                ensure_override(&types, SHARED_STRINGS_PART, SHARED_STRINGS_CONTENT_TYPE)?
            {
                self.container
                    .write_entry(CONTENT_TYPES_PART, &updated, WriteMode::Replace)?;
            }
        }
        if let Some(rels) = self.container.read_entry_optional(WORKBOOK_RELS_PART)? {
            if let Some(updated) =
                ensure_relationship(&rels, SHARED_STRINGS_REL_TYPE, "sharedStrings.xml")?
            {
                self.container
                    .write_entry(WORKBOOK_RELS_PART, &updated, WriteMode::Replace)?;
            }
        }
        Ok(())
    }

    fn apply_recalc_policy(&mut self) -> Result<()> {
        if self.recalc.is_noop() || self.recalc_applied {
            return Ok(());
        }

        if self.recalc.full_calc_on_load {
            let updated = force_full_calc_on_load(&self.workbook.to_bytes()?)?;
            self.container
                .write_entry(WORKBOOK_PART, &updated, WriteMode::Replace)?;
            self.workbook = XmlTree::parse(&updated)?;
        }

        if self.recalc.drop_calc_chain && self.container.delete_entry(CALC_CHAIN_PART)? {
            if let Some(types) = self.container.read_entry_optional(CONTENT_TYPES_PART)? {
                if let Some(updated) = remove_override(&types, CALC_CHAIN_PART)? {
                    self.container
                        .write_entry(CONTENT_TYPES_PART, &updated, WriteMode::Replace)?;
                }
            }
            if let Some(rels) = self.container.read_entry_optional(WORKBOOK_RELS_PART)? {
                if let Some(updated) = remove_relationships(&rels, CALC_CHAIN_REL_TYPE)? {
                    self.container
                        .write_entry(WORKBOOK_RELS_PART, &updated, WriteMode::Replace)?;
                }
            }
            log::debug!("dropped {CALC_CHAIN_PART}");
        }

        self.recalc_applied = true;
        Ok(())
    }

    fn set_visibility_of(&mut self, index: usize, visibility: SheetVisibility) -> Result<()> {
        let name = self.entry(index)?.name.clone();
        let mut updated = self.workbook.clone();
        if !set_sheet_state(&mut updated, &name, visibility)? {
            return Ok(());
        }

        self.container
            .write_entry(WORKBOOK_PART, &updated.to_bytes()?, WriteMode::Replace)?;
        self.workbook = XmlTree::parse(&self.container.read_entry(WORKBOOK_PART)?)?;
        self.directory.refresh_visibility(&self.workbook);

        if visible_sheet_count(&self.workbook) == 0 {
            log::warn!("no visible sheet left after changing the state of {name:?}");
        }
        log::debug!("sheet {name:?} is now {visibility:?}");
        Ok(())
    }
}

/// A sheet of an open [`Workbook`].
///
/// The handle borrows the session mutably, so only one sheet can be edited at a time.
#[derive(Debug)]
pub struct Worksheet<'a> {
    book: &'a mut Workbook,
    index: usize,
}

impl Worksheet<'_> {
    fn entry(&self) -> &SheetEntry {
        // Handles are only created from a directory position, and entries are never removed.
        &self.book.directory.entries()[self.index]
    }

    pub fn name(&self) -> &str {
        &self.entry().name
    }

    pub fn sheet_id(&self) -> u32 {
        self.entry().sheet_id
    }

    /// Worksheet part inside the package, e.g. `xl/worksheets/sheet1.xml`.
    pub fn part_name(&self) -> &str {
        &self.entry().part
    }

    pub fn visibility(&self) -> SheetVisibility {
        self.entry().visibility
    }

    /// Visibility level: `0` visible, `1` hidden, `2` very hidden.
    pub fn state(&self) -> i64 {
        self.visibility().level()
    }

    /// Chart parts whose series read from this sheet.
    pub fn charts(&self) -> &[String] {
        self.book.directory.charts_for(self.name())
    }

    /// Write `value` into the sheet at the position given by `options`.
    ///
    /// Every target cell is validated before the package is touched.
    pub fn insert(&mut self, value: impl Into<Value>, options: InsertOptions) -> Result<()> {
        self.book.insert_into(self.index, &value.into(), &options)
    }

    /// Set the visibility by level: `0` visible, `1` hidden, `2` very hidden.
    pub fn set_state(&mut self, level: i64) -> Result<()> {
        self.set_visibility(SheetVisibility::try_from(level)?)
    }

    pub fn set_visibility(&mut self, visibility: SheetVisibility) -> Result<()> {
        self.book.set_visibility_of(self.index, visibility)
    }
}
