//! In-place editing of a worksheet part (`xl/worksheets/sheetN.xml`).
//!
//! Writing a cell happens in two steps. [`WorksheetPart::locate`] inspects `<sheetData>` and
//! returns a [`CellPlan`] describing either the existing `<c>` node or where new `<row>`/`<c>`
//! nodes belong. [`WorksheetPart::commit`] then applies that plan and grows `<dimension>`.
//! Keeping the lookup side-effect free means every placement of an insert can be planned
//! before any node is created.

use crate::a1::{column_of_ref, CellRef, RangeRef};
use crate::error::{InjectError, Result};
use crate::shared_strings::SharedStringPool;
use crate::value::Scalar;
use crate::xml::{NodeId, XmlTree, SPREADSHEETML_NS};

/// Where a new node goes relative to the existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionPoint {
    /// Last child of the given parent.
    Append(NodeId),
    Before(NodeId),
    After(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellPlan {
    /// The cell node already exists.
    Existing(NodeId),
    /// The row exists; a new `<c>` is placed inside it.
    InRow { row: NodeId, at: InsertionPoint },
    /// Neither exists. The new `<row>` copies the attributes of `like`, the nearest existing row,
    /// or starts from scratch when the sheet has no rows.
    NewRow {
        at: InsertionPoint,
        like: Option<NodeId>,
    },
}

/// Closest candidate to `target`; ties go to the smaller number.
pub(crate) fn nearest(
    candidates: impl IntoIterator<Item = (NodeId, u32)>,
    target: u32,
) -> Option<(NodeId, u32)> {
    candidates
        .into_iter()
        .min_by_key(|(_, n)| (n.abs_diff(target), *n))
}

fn insertion_point(neighbor: NodeId, neighbor_number: u32, target: u32) -> InsertionPoint {
    if neighbor_number > target {
        InsertionPoint::Before(neighbor)
    } else {
        InsertionPoint::After(neighbor)
    }
}

#[derive(Debug)]
pub struct WorksheetPart {
    tree: XmlTree,
    sheet_data: NodeId,
}

impl WorksheetPart {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let tree = XmlTree::parse(bytes)?;
        let root = tree.root();
        if !tree.is(root, SPREADSHEETML_NS, "worksheet") {
            return Err(InjectError::Invalid(format!(
                "expected <worksheet> root, found <{}>",
                tree.name(root)
            )));
        }
        let sheet_data = tree
            .find_child(root, SPREADSHEETML_NS, "sheetData")
            .ok_or_else(|| InjectError::Invalid("worksheet has no <sheetData>".into()))?;
        Ok(Self { tree, sheet_data })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.tree.to_bytes()
    }

    pub fn tree(&self) -> &XmlTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut XmlTree {
        &mut self.tree
    }

    /// `(row node, row number)` in document order. Rows without `r` follow their predecessor.
    pub fn rows(&self) -> Vec<(NodeId, u32)> {
        let mut prev = 0u32;
        self.tree
            .find_children(self.sheet_data, SPREADSHEETML_NS, "row")
            .map(|row| {
                let number = self
                    .tree
                    .attr(row, "r")
                    .and_then(|r| r.trim().parse().ok())
                    .unwrap_or(prev.saturating_add(1));
                prev = number;
                (row, number)
            })
            .collect()
    }

    /// `(cell node, column index)` in document order. Cells without `r` follow their predecessor.
    pub fn cells(&self, row: NodeId) -> Vec<(NodeId, u32)> {
        let mut prev = 0u32;
        self.tree
            .find_children(row, SPREADSHEETML_NS, "c")
            .map(|cell| {
                let col = self
                    .tree
                    .attr(cell, "r")
                    .and_then(column_of_ref)
                    .unwrap_or(prev.saturating_add(1));
                prev = col;
                (cell, col)
            })
            .collect()
    }

    fn dimension_node(&self) -> Option<NodeId> {
        self.tree
            .find_child(self.tree.root(), SPREADSHEETML_NS, "dimension")
    }

    /// The declared used range, if present and parseable.
    pub fn dimension(&self) -> Option<RangeRef> {
        let node = self.dimension_node()?;
        RangeRef::parse(self.tree.attr(node, "ref")?).ok()
    }

    /// Plan how to reach `cell` without modifying the tree.
    pub fn locate(&self, cell: CellRef) -> CellPlan {
        let rows = self.rows();
        if let Some((row, _)) = rows.iter().find(|(_, r)| *r == cell.row) {
            let cells = self.cells(*row);
            if let Some((node, _)) = cells.iter().find(|(_, c)| *c == cell.col) {
                return CellPlan::Existing(*node);
            }
            let at = match nearest(cells, cell.col) {
                Some((neighbor, col)) => insertion_point(neighbor, col, cell.col),
                None => InsertionPoint::Append(*row),
            };
            return CellPlan::InRow { row: *row, at };
        }

        match nearest(rows, cell.row) {
            Some((neighbor, number)) => CellPlan::NewRow {
                at: insertion_point(neighbor, number, cell.row),
                like: Some(neighbor),
            },
            None => CellPlan::NewRow {
                at: InsertionPoint::Append(self.sheet_data),
                like: None,
            },
        }
    }

    /// Apply a plan produced by [`locate`](Self::locate) for the same `cell` and return the
    /// `<c>` node. The dimension is grown to cover `cell`.
    pub fn commit(&mut self, cell: CellRef, plan: CellPlan) -> Result<NodeId> {
        let node = match plan {
            CellPlan::Existing(node) => node,
            CellPlan::InRow { row, at } => {
                let node = self.new_cell(row, cell);
                self.place(node, at)?;
                node
            }
            CellPlan::NewRow { at, like } => {
                let row = self.tree.create_element_like(self.sheet_data, "row");
                match like {
                    Some(like) => {
                        for (key, value) in self.tree.attrs(like).to_vec() {
                            self.tree.set_attr(row, &key, value);
                        }
                        self.tree.set_attr(row, "r", cell.row.to_string());
                    }
                    None => {
                        self.tree.set_attr(row, "r", cell.row.to_string());
                        self.tree
                            .set_attr(row, "spans", format!("{}:{}", cell.col, cell.col));
                    }
                }
                self.place(row, at)?;
                let node = self.new_cell(row, cell);
                self.tree.append_child(row, node);
                node
            }
        };
        self.grow_dimension(cell)?;
        Ok(node)
    }

    /// Locate-or-create the `<c>` node for `cell`.
    pub fn ensure_cell(&mut self, cell: CellRef) -> Result<NodeId> {
        let plan = self.locate(cell);
        self.commit(cell, plan)
    }

    fn new_cell(&mut self, row: NodeId, cell: CellRef) -> NodeId {
        let node = self.tree.create_element_like(row, "c");
        self.tree.set_attr(node, "r", cell.to_string());
        node
    }

    fn place(&mut self, node: NodeId, at: InsertionPoint) -> Result<()> {
        match at {
            InsertionPoint::Append(parent) => {
                self.tree.append_child(parent, node);
                Ok(())
            }
            InsertionPoint::Before(anchor) => self.tree.insert_before(anchor, node),
            InsertionPoint::After(anchor) => self.tree.insert_after(anchor, node),
        }
    }

    /// Grow `<dimension ref>` to the bounding box of its current range and `cell`.
    pub fn grow_dimension(&mut self, cell: CellRef) -> Result<()> {
        let root = self.tree.root();
        let node = match self.dimension_node() {
            Some(node) => node,
            None => {
                let node = self.tree.create_element_like(root, "dimension");
                let anchor = self
                    .tree
                    .find_child(root, SPREADSHEETML_NS, "sheetPr")
                    .map(InsertionPoint::After)
                    .or_else(|| self.tree.child_elements(root).next().map(InsertionPoint::Before))
                    .unwrap_or(InsertionPoint::Append(root));
                self.place(node, anchor)?;
                node
            }
        };
        let range = match self.dimension().or_else(|| self.used_range()) {
            Some(range) => range.expanded_to(cell),
            None => RangeRef::single(cell),
        };
        self.tree.set_attr(node, "ref", range.to_string());
        Ok(())
    }

    /// Bounding box of the existing cell nodes, for sheets whose `<dimension>` is missing or
    /// unreadable.
    fn used_range(&self) -> Option<RangeRef> {
        let mut range: Option<RangeRef> = None;
        for (row, number) in self.rows() {
            for (_, col) in self.cells(row) {
                let Ok(cell) = CellRef::new(number, col) else {
                    continue;
                };
                range = Some(match range {
                    Some(range) => range.expanded_to(cell),
                    None => RangeRef::single(cell),
                });
            }
        }
        range
    }

    /// Store `value` as the literal content of `cell`.
    ///
    /// Text goes through the shared-string pool. Style and other attributes are kept; any
    /// formula or inline string is dropped since the cell now holds a constant.
    pub fn write_value(
        &mut self,
        cell: NodeId,
        value: &Scalar,
        strings: &mut SharedStringPool,
    ) -> Result<()> {
        let literal = match value {
            Scalar::Text(text) => {
                self.tree.set_attr(cell, "t", "s");
                strings.resolve(text).to_string()
            }
            Scalar::Number(n) if !n.is_finite() => {
                return Err(InjectError::InvalidValue(format!("non-finite number {n}")));
            }
            Scalar::Number(n) => {
                self.tree.remove_attr(cell, "t");
                n.to_string()
            }
            Scalar::Integer(i) => {
                self.tree.remove_attr(cell, "t");
                i.to_string()
            }
            Scalar::Bool(b) => {
                self.tree.set_attr(cell, "t", "b");
                String::from(if *b { "1" } else { "0" })
            }
        };

        for local in ["f", "is"] {
            let stale: Vec<NodeId> = self
                .tree
                .find_children(cell, SPREADSHEETML_NS, local)
                .collect();
            for node in stale {
                self.tree.remove(node);
            }
        }

        let v = match self.tree.find_child(cell, SPREADSHEETML_NS, "v") {
            Some(v) => v,
            None => {
                let v = self.tree.create_element_like(cell, "v");
                match self.tree.find_child(cell, SPREADSHEETML_NS, "extLst") {
                    Some(ext) => self.tree.insert_before(ext, v)?,
                    None => self.tree.append_child(cell, v),
                }
                v
            }
        };
        self.tree.set_text(v, literal);
        Ok(())
    }
}
