//! A1 coordinate math: column letters, cell references and range references.
//!
//! Everything here is 1-based, matching SpreadsheetML `r`/`ref` attributes.

use std::fmt;

use crate::error::{InjectError, Result};

/// Highest column index Excel accepts (`XFD`).
pub const MAX_COLUMN: u32 = 16_384;
/// Highest row number Excel accepts.
pub const MAX_ROW: u32 = 1_048_576;

/// Convert column letters (`A`, `Z`, `AA`, ...) into a 1-based column index.
///
/// Letters form a bijective base-26 number (`A=1 … Z=26`, no zero digit). Lower-case letters are
/// accepted.
pub fn column_letters_to_index(letters: &str) -> Result<u32> {
    if letters.is_empty() {
        return Err(InjectError::InvalidCoordinate(letters.to_string()));
    }

    let mut col: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(InjectError::InvalidCoordinate(letters.to_string()));
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A' + 1) as u32;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(digit))
            .filter(|c| *c <= MAX_COLUMN)
            .ok_or_else(|| InjectError::InvalidCoordinate(letters.to_string()))?;
    }
    Ok(col)
}

/// Convert a 1-based column index into column letters (`1 -> A`, `27 -> AA`).
pub fn column_index_to_letters(index: u32) -> Result<String> {
    if index == 0 || index > MAX_COLUMN {
        return Err(InjectError::InvalidCoordinate(format!("column {index}")));
    }

    let mut out = Vec::with_capacity(3);
    let mut n = index;
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    Ok(out.into_iter().map(char::from).collect())
}

/// A single cell coordinate (1-based row and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    /// Build a validated reference.
    pub fn new(row: u32, col: u32) -> Result<Self> {
        if row == 0 || row > MAX_ROW {
            return Err(InjectError::InvalidCoordinate(format!("row {row}")));
        }
        if col == 0 || col > MAX_COLUMN {
            return Err(InjectError::InvalidCoordinate(format!("column {col}")));
        }
        Ok(Self { row, col })
    }

    /// Parse `B3`, `$B$3` or `b3`.
    pub fn parse(a1: &str) -> Result<Self> {
        let invalid = || InjectError::InvalidCoordinate(a1.to_string());
        let trimmed = a1.trim();

        let mut letters = String::new();
        let mut digits = String::new();
        for ch in trimmed.chars() {
            match ch {
                '$' => continue,
                c if c.is_ascii_alphabetic() => {
                    if !digits.is_empty() {
                        return Err(invalid());
                    }
                    letters.push(c);
                }
                c if c.is_ascii_digit() => digits.push(c),
                _ => return Err(invalid()),
            }
        }
        if letters.is_empty() || digits.is_empty() {
            return Err(invalid());
        }

        let col = column_letters_to_index(&letters).map_err(|_| invalid())?;
        let row: u32 = digits.parse().map_err(|_| invalid())?;
        Self::new(row, col).map_err(|_| invalid())
    }

    /// Column part of the reference (`B3 -> "B"`).
    pub fn column_letters(&self) -> String {
        // `new`/`parse` keep `col` inside 1..=MAX_COLUMN.
        column_index_to_letters(self.col).unwrap_or_default()
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column_letters(), self.row)
    }
}

/// Extract the column index from a cell `r` attribute, ignoring the row digits.
pub(crate) fn column_of_ref(cell_ref: &str) -> Option<u32> {
    let letters: String = cell_ref
        .chars()
        .filter(|c| *c != '$')
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    column_letters_to_index(&letters).ok()
}

/// An inclusive rectangular range such as a worksheet `<dimension ref="A1:D10"/>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRef {
    pub start: CellRef,
    pub end: CellRef,
}

impl RangeRef {
    pub fn single(cell: CellRef) -> Self {
        Self {
            start: cell,
            end: cell,
        }
    }

    /// Parse `A1:D10` or a single-cell `A1`. Corners are normalized so `start` is top-left.
    pub fn parse(a1: &str) -> Result<Self> {
        let (left, right) = a1.split_once(':').unwrap_or((a1, a1));
        let a = CellRef::parse(left)?;
        let b = CellRef::parse(right)?;
        Ok(Self {
            start: CellRef {
                row: a.row.min(b.row),
                col: a.col.min(b.col),
            },
            end: CellRef {
                row: a.row.max(b.row),
                col: a.col.max(b.col),
            },
        })
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }

    pub fn contains_range(&self, other: &RangeRef) -> bool {
        self.contains(other.start) && self.contains(other.end)
    }

    /// Smallest range covering both `self` and `cell`.
    pub fn expanded_to(&self, cell: CellRef) -> Self {
        Self {
            start: CellRef {
                row: self.start.row.min(cell.row),
                col: self.start.col.min(cell.col),
            },
            end: CellRef {
                row: self.end.row.max(cell.row),
                col: self.end.col.max(cell.col),
            },
        }
    }
}

impl fmt::Display for RangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}
