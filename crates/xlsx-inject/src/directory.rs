//! Routing tables built from `xl/workbook.xml`: sheet name to part, id and visibility, plus the
//! charts whose series reference each sheet.

use std::collections::BTreeMap;

use crate::error::{InjectError, Result};
use crate::relationships::{parse_relationships, resolve_target, Relationship};
use crate::xml::{NodeId, XmlTree, CHART_NS, OFFICE_REL_NS, SPREADSHEETML_NS};

pub const WORKBOOK_PART: &str = "xl/workbook.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SheetVisibility {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

impl SheetVisibility {
    /// Parse a `<sheet state>` value. Absent or unknown values mean visible.
    pub fn from_state_attr(state: Option<&str>) -> Self {
        match state {
            Some("hidden") => SheetVisibility::Hidden,
            Some("veryHidden") => SheetVisibility::VeryHidden,
            _ => SheetVisibility::Visible,
        }
    }

    /// The `state` attribute value; `None` for visible sheets, which carry no attribute.
    pub fn state_attr(self) -> Option<&'static str> {
        match self {
            SheetVisibility::Visible => None,
            SheetVisibility::Hidden => Some("hidden"),
            SheetVisibility::VeryHidden => Some("veryHidden"),
        }
    }

    pub fn level(self) -> i64 {
        match self {
            SheetVisibility::Visible => 0,
            SheetVisibility::Hidden => 1,
            SheetVisibility::VeryHidden => 2,
        }
    }
}

/// Only `0`, `1` and `2` are levels; negative numbers are rejected rather than ignored.
impl TryFrom<i64> for SheetVisibility {
    type Error = InjectError;

    fn try_from(level: i64) -> Result<Self> {
        match level {
            0 => Ok(SheetVisibility::Visible),
            1 => Ok(SheetVisibility::Hidden),
            2 => Ok(SheetVisibility::VeryHidden),
            other => Err(InjectError::InvalidState(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    /// Full part name inside the package, e.g. `xl/worksheets/sheet1.xml`.
    pub part: String,
    pub visibility: SheetVisibility,
}

impl SheetEntry {
    /// File name of the worksheet part (`sheet1.xml`).
    pub fn file_name(&self) -> &str {
        self.part.rsplit('/').next().unwrap_or(&self.part)
    }
}

/// The relationship id of a `<sheet>`: `r:id` in the transitional namespace, or any prefixed
/// `id` attribute for producers that bind a different relationship namespace.
fn sheet_rel_id(tree: &XmlTree, sheet: NodeId) -> Option<String> {
    tree.attr_ns(sheet, OFFICE_REL_NS, "id")
        .or_else(|| {
            tree.attrs(sheet)
                .iter()
                .find(|(key, _)| {
                    key.rsplit_once(':')
                        .is_some_and(|(prefix, local)| prefix != "xmlns" && local == "id")
                })
                .map(|(_, value)| value.as_str())
        })
        .map(str::to_string)
}

/// `<sheet>` elements of the workbook's `<sheets>` list, in tab order.
pub(crate) fn sheet_nodes(tree: &XmlTree) -> Vec<NodeId> {
    let root = tree.root();
    tree.find_child(root, SPREADSHEETML_NS, "sheets")
        .map(|sheets| tree.find_children(sheets, SPREADSHEETML_NS, "sheet").collect())
        .unwrap_or_default()
}

/// Fallback part name when the workbook relationship for a sheet is missing.
fn conventional_part(rel_id: &str) -> String {
    let digits: String = rel_id.chars().filter(char::is_ascii_digit).collect();
    format!("xl/worksheets/sheet{digits}.xml")
}

fn is_chart_part(name: &str) -> bool {
    let name = name.trim_start_matches('/');
    name.to_ascii_lowercase()
        .strip_prefix("xl/charts/chart")
        .is_some_and(|rest| rest.ends_with(".xml") && !rest.contains('/'))
}

/// Formula texts (`<c:f>`) of a chart part.
fn chart_formulas(bytes: &[u8]) -> Result<Vec<String>> {
    let xml = std::str::from_utf8(bytes)?;
    let doc = roxmltree::Document::parse(xml)?;
    Ok(doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "f")
        .filter(|n| n.tag_name().namespace() == Some(CHART_NS))
        .filter_map(|n| n.text().map(str::to_string))
        .collect())
}

/// `true` when `formula` references a range on the sheet called `name`.
pub(crate) fn references_sheet(formula: &str, name: &str) -> bool {
    let quoted = format!("'{}'!", name.replace('\'', "''"));
    if formula.contains(&quoted) {
        return true;
    }
    let bare = format!("{name}!");
    formula.match_indices(&bare).any(|(idx, _)| {
        formula[..idx]
            .chars()
            .next_back()
            .map_or(true, |prev| {
                !(prev.is_alphanumeric() || prev == '_' || prev == '.' || prev == '\'')
            })
    })
}

#[derive(Debug, Clone, Default)]
pub struct SheetDirectory {
    entries: Vec<SheetEntry>,
    charts: BTreeMap<String, Vec<String>>,
}

impl SheetDirectory {
    /// Build the directory.
    ///
    /// `rels` is the workbook relationship part, when present. `part_names` lists every entry of
    /// the package and `read_part` loads one of them, used to scan chart parts.
    pub fn build<F>(
        workbook: &XmlTree,
        rels: Option<&[u8]>,
        part_names: &[String],
        mut read_part: F,
    ) -> Result<Self>
    where
        F: FnMut(&str) -> Result<Vec<u8>>,
    {
        let rels: Vec<Relationship> = match rels {
            Some(bytes) => parse_relationships(bytes)?,
            None => Vec::new(),
        };

        let mut entries: Vec<SheetEntry> = Vec::new();
        for sheet in sheet_nodes(workbook) {
            let name = workbook
                .attr(sheet, "name")
                .ok_or_else(|| InjectError::Invalid("<sheet> without name".into()))?
                .to_string();
            if entries.iter().any(|e| e.name == name) {
                return Err(InjectError::Invalid(format!("duplicate sheet name {name:?}")));
            }
            let sheet_id = workbook
                .attr(sheet, "sheetId")
                .and_then(|id| id.trim().parse().ok())
                .ok_or_else(|| {
                    InjectError::Invalid(format!("sheet {name:?} has no valid sheetId"))
                })?;
            let rel_id = sheet_rel_id(workbook, sheet)
                .ok_or_else(|| InjectError::Invalid(format!("sheet {name:?} has no r:id")))?;

            let part = match rels.iter().find(|rel| rel.id == rel_id && !rel.external) {
                Some(rel) => resolve_target(WORKBOOK_PART, &rel.target),
                None => {
                    let part = conventional_part(&rel_id);
                    log::warn!(
                        "no workbook relationship {rel_id} for sheet {name:?}; assuming {part}"
                    );
                    part
                }
            };

            entries.push(SheetEntry {
                name,
                sheet_id,
                rel_id,
                part,
                visibility: SheetVisibility::from_state_attr(workbook.attr(sheet, "state")),
            });
        }

        let mut charts: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut chart_parts: Vec<&String> =
            part_names.iter().filter(|n| is_chart_part(n)).collect();
        chart_parts.sort();
        for chart in chart_parts {
            let formulas = chart_formulas(&read_part(chart.as_str())?)?;
            for entry in &entries {
                if formulas.iter().any(|f| references_sheet(f, &entry.name)) {
                    charts
                        .entry(entry.name.clone())
                        .or_default()
                        .push(chart.trim_start_matches('/').to_string());
                }
            }
        }

        log::debug!("sheet directory: {} sheets, {} with charts", entries.len(), charts.len());
        Ok(Self { entries, charts })
    }

    pub fn entries(&self) -> &[SheetEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    pub fn get(&self, index: usize) -> Option<&SheetEntry> {
        self.entries.get(index)
    }

    /// Index of `name`, or `UnknownSheet` listing the available names.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.position(name).ok_or_else(|| InjectError::UnknownSheet {
            name: name.to_string(),
            available: self.names().map(str::to_string).collect(),
        })
    }

    /// Chart parts associated with `name`, sorted by part name.
    pub fn charts_for(&self, name: &str) -> &[String] {
        self.charts.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Re-read every sheet's visibility from a freshly parsed workbook tree.
    pub fn refresh_visibility(&mut self, workbook: &XmlTree) {
        for sheet in sheet_nodes(workbook) {
            let Some(name) = workbook.attr(sheet, "name") else {
                continue;
            };
            if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
                entry.visibility = SheetVisibility::from_state_attr(workbook.attr(sheet, "state"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const WORKBOOK: &str = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Data" sheetId="1" r:id="rId1"/><sheet name="Hidden One" sheetId="4" state="hidden" r:id="rId2"/><sheet name="Secret" sheetId="5" state="veryHidden" r:id="rId7"/></sheets></workbook>"#;

    const RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/data2.xml"/></Relationships>"#;

    const CHART: &str = r#"<c:chartSpace xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart"><c:chart><c:ser><c:val><c:numRef><c:f>'Hidden One'!$B$2:$B$5</c:f></c:numRef></c:val></c:ser></c:chart></c:chartSpace>"#;

    fn build(parts: &[(&str, &str)]) -> SheetDirectory {
        let workbook = XmlTree::parse(WORKBOOK.as_bytes()).unwrap();
        let names: Vec<String> = parts.iter().map(|(n, _)| n.to_string()).collect();
        SheetDirectory::build(&workbook, Some(RELS.as_bytes()), &names, |name| {
            parts
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, xml)| xml.as_bytes().to_vec())
                .ok_or_else(|| InjectError::MissingPart(name.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn sheets_resolve_through_workbook_relationships() {
        let dir = build(&[]);
        let parts: Vec<&str> = dir.entries().iter().map(|e| e.part.as_str()).collect();
        assert_eq!(
            parts,
            ["xl/worksheets/sheet1.xml", "xl/worksheets/data2.xml", "xl/worksheets/sheet7.xml"]
        );
        assert_eq!(dir.entries()[1].file_name(), "data2.xml");
        assert_eq!(dir.entries()[1].sheet_id, 4);
    }

    #[test]
    fn visibility_follows_the_state_attribute() {
        let dir = build(&[]);
        let states: Vec<SheetVisibility> = dir.entries().iter().map(|e| e.visibility).collect();
        assert_eq!(
            states,
            [SheetVisibility::Visible, SheetVisibility::Hidden, SheetVisibility::VeryHidden]
        );
    }

    #[test]
    fn unknown_sheets_list_the_available_names() {
        let dir = build(&[]);
        match dir.require("Nope") {
            Err(InjectError::UnknownSheet { name, available }) => {
                assert_eq!(name, "Nope");
                assert_eq!(available, ["Data", "Hidden One", "Secret"]);
            }
            other => panic!("expected UnknownSheet, got {other:?}"),
        }
        assert_eq!(dir.require("Secret").unwrap(), 2);
    }

    #[test]
    fn charts_are_associated_by_series_formulas() {
        let dir = build(&[("xl/charts/chart1.xml", CHART), ("xl/drawings/drawing1.xml", "<x/>")]);
        assert_eq!(dir.charts_for("Hidden One"), ["xl/charts/chart1.xml"]);
        assert!(dir.charts_for("Data").is_empty());
    }

    #[test]
    fn sheet_references_respect_name_boundaries() {
        assert!(references_sheet("Data!$A$1", "Data"));
        assert!(references_sheet("SUM(Data!A1:A3)", "Data"));
        assert!(!references_sheet("OldData!A1", "Data"));
        assert!(references_sheet("'It''s'!A1", "It's"));
        assert!(!references_sheet("'My Data'!A1", "Data"));
    }

    #[test]
    fn duplicate_sheet_names_are_rejected() {
        let workbook = XmlTree::parse(
            br#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="A" sheetId="1" r:id="rId1"/><sheet name="A" sheetId="2" r:id="rId2"/></sheets></workbook>"#,
        )
        .unwrap();
        let err = SheetDirectory::build(&workbook, None, &[], |_| Ok(Vec::new())).unwrap_err();
        assert!(matches!(err, InjectError::Invalid(_)), "{err}");
    }

    #[test]
    fn levels_map_to_visibility() {
        assert_eq!(SheetVisibility::try_from(2).unwrap(), SheetVisibility::VeryHidden);
        assert!(matches!(SheetVisibility::try_from(3), Err(InjectError::InvalidState(3))));
        assert!(matches!(SheetVisibility::try_from(-1), Err(InjectError::InvalidState(-1))));
        assert_eq!(SheetVisibility::Hidden.level(), 1);
    }
}
