//! Values accepted by [`crate::Worksheet::insert`] and their placement on the grid.

use crate::a1::CellRef;
use crate::error::{InjectError, Result};

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(f64),
    Integer(i64),
    Bool(bool),
}

impl Scalar {
    /// `NaN` marks a missing value and is skipped on insert, like an absent cell.
    pub fn is_missing(&self) -> bool {
        matches!(self, Scalar::Number(n) if n.is_nan())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<f32> for Scalar {
    fn from(value: f32) -> Self {
        Scalar::Number(value as f64)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Integer(value as i64)
    }
}

impl From<u32> for Scalar {
    fn from(value: u32) -> Self {
        Scalar::Integer(value as i64)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// A labelled two-dimensional table, the equivalent of a data frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    /// Column headers.
    pub columns: Vec<Scalar>,
    /// Name of the row-label column, emitted as its own row when labels are included.
    pub index_name: Option<Scalar>,
    /// Row labels; missing labels default to the 0-based row position.
    pub index: Vec<Scalar>,
    /// Row-major data. `None` cells are skipped on insert.
    pub rows: Vec<Vec<Option<Scalar>>>,
}

impl Table {
    pub fn new<C, S>(columns: C) -> Self
    where
        C: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Append a data row.
    pub fn push_row<R>(&mut self, row: R) -> &mut Self
    where
        R: IntoIterator<Item = Option<Scalar>>,
    {
        self.rows.push(row.into_iter().collect());
        self
    }

    pub fn with_index<I, S>(mut self, name: Option<Scalar>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        self.index_name = name;
        self.index = labels.into_iter().map(Into::into).collect();
        self
    }

    fn label(&self, row: usize) -> Scalar {
        self.index
            .get(row)
            .cloned()
            .unwrap_or(Scalar::Integer(row as i64))
    }

    /// Flatten the table into rows of optional scalars.
    ///
    /// With `header`, the first row holds the column names (shifted right by one when `index` is
    /// set). With `index`, a row holding only the index name follows, and every data row starts
    /// with its row label.
    pub fn to_rows(&self, header: bool, index: bool) -> Vec<Vec<Option<Scalar>>> {
        let mut out = Vec::with_capacity(self.rows.len() + 2);
        if header {
            let mut row: Vec<Option<Scalar>> = Vec::with_capacity(self.columns.len() + 1);
            if index {
                row.push(None);
            }
            row.extend(self.columns.iter().cloned().map(Some));
            out.push(row);
        }
        if index {
            out.push(vec![self.index_name.clone()]);
        }
        for (i, data) in self.rows.iter().enumerate() {
            let mut row = Vec::with_capacity(data.len() + 1);
            if index {
                row.push(Some(self.label(i)));
            }
            row.extend(data.iter().cloned());
            out.push(row);
        }
        out
    }
}

/// What to insert: one value or a whole table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Table(Table),
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        Value::Scalar(value)
    }
}

impl From<Table> for Value {
    fn from(value: Table) -> Self {
        Value::Table(value)
    }
}

macro_rules! value_from_scalar {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::Scalar(value.into())
            }
        })*
    };
}

value_from_scalar!(&str, String, f64, f32, i64, i32, u32, bool);

/// Orientation of tabular insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Axis {
    /// Each table row fills a sheet row.
    #[default]
    Rows,
    /// Each table row fills a sheet column.
    Columns,
}

impl TryFrom<i64> for Axis {
    type Error = InjectError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Axis::Rows),
            1 => Ok(Axis::Columns),
            other => Err(InjectError::InvalidValue(format!(
                "axis must be 0 or 1, got {other}"
            ))),
        }
    }
}

/// Placement of an insert. Coordinates are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOptions {
    pub row: u32,
    pub column: u32,
    pub axis: Axis,
    /// Include column headers of a table.
    pub header: bool,
    /// Include row labels of a table.
    pub index: bool,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            row: 1,
            column: 1,
            axis: Axis::Rows,
            header: true,
            index: false,
        }
    }
}

impl InsertOptions {
    pub fn at(row: u32, column: u32) -> Self {
        Self {
            row,
            column,
            ..Self::default()
        }
    }

    pub fn axis(mut self, axis: Axis) -> Self {
        self.axis = axis;
        self
    }

    pub fn header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn index(mut self, index: bool) -> Self {
        self.index = index;
        self
    }
}

fn check_finite(value: &Scalar) -> Result<()> {
    match value {
        Scalar::Number(n) if n.is_infinite() => {
            Err(InjectError::InvalidValue(format!("non-finite number {n}")))
        }
        _ => Ok(()),
    }
}

fn offset(start: u32, by: usize, what: &str) -> Result<u32> {
    u32::try_from(by)
        .ok()
        .and_then(|by| start.checked_add(by))
        .ok_or_else(|| InjectError::InvalidCoordinate(format!("{what} {start}+{by}")))
}

/// Resolve `value` into validated `(cell, scalar)` placements in write order.
///
/// Missing cells (`None`, `NaN`) are dropped but still advance the grid position.
pub fn layout(value: &Value, options: &InsertOptions) -> Result<Vec<(CellRef, Scalar)>> {
    match value {
        Value::Scalar(scalar) => {
            if scalar.is_missing() {
                return Ok(Vec::new());
            }
            check_finite(scalar)?;
            Ok(vec![(CellRef::new(options.row, options.column)?, scalar.clone())])
        }
        Value::Table(table) => {
            let mut out = Vec::new();
            for (outer, line) in table.to_rows(options.header, options.index).iter().enumerate() {
                for (inner, cell) in line.iter().enumerate() {
                    let Some(scalar) = cell.as_ref().filter(|s| !s.is_missing()) else {
                        continue;
                    };
                    check_finite(scalar)?;
                    let (row, col) = match options.axis {
                        Axis::Rows => (
                            offset(options.row, outer, "row")?,
                            offset(options.column, inner, "column")?,
                        ),
                        Axis::Columns => (
                            offset(options.row, inner, "row")?,
                            offset(options.column, outer, "column")?,
                        ),
                    };
                    out.push((CellRef::new(row, col)?, scalar.clone()));
                }
            }
            Ok(out)
        }
    }
}
