//! In-place data injection into XLSX templates.
//!
//! A [`Workbook`] session copies a template to a private working file and edits individual
//! parts of that copy: cells are located or created in the worksheet XML, text is deduplicated
//! through the shared string table, cached formula results are dropped so the consumer
//! recomputes them, and everything else in the package (styles, charts, merged ranges, unknown
//! parts) is carried over byte-for-byte.
//!
//! ```no_run
//! use xlsx_inject::{InsertOptions, Scalar, Table, Workbook};
//!
//! # fn main() -> Result<(), xlsx_inject::InjectError> {
//! let mut book = Workbook::open("template.xlsx")?;
//! let mut sheet = book.sheet("Data")?;
//! sheet.insert(42i64, InsertOptions::at(3, 2))?;
//!
//! let mut table = Table::new(["region", "total"]);
//! table.push_row([Some("north".into()), Some(Scalar::Number(1250.5))]);
//! sheet.insert(table, InsertOptions::at(5, 3))?;
//! sheet.set_state(1)?;
//!
//! book.save("report.xlsx")?;
//! book.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Lower-level building blocks are public as well: [`a1`] coordinate math, the [`xml`] arena
//! tree, the [`container`] ZIP primitives and the per-part editors.

pub mod a1;
pub mod container;
pub mod content_types;
pub mod directory;
mod error;
pub mod formula;
mod fs;
pub mod recalc;
pub mod relationships;
mod session;
pub mod shared_strings;
pub mod value;
pub mod visibility;
pub mod worksheet;
pub mod xml;

pub use a1::{CellRef, RangeRef};
pub use container::PartLimits;
pub use directory::{SheetEntry, SheetVisibility};
pub use error::{InjectError, Result};
pub use recalc::RecalcPolicy;
pub use session::{OpenOptions, Workbook, Worksheet};
pub use value::{Axis, InsertOptions, Scalar, Table, Value};
