#![allow(dead_code)]

use std::collections::BTreeMap;
use std::error::Error;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

pub const SML_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Builds synthetic XLSX templates for session tests.
///
/// Generated packages carry the parts a real template has ([Content_Types].xml, root rels,
/// workbook + rels, styles, one part per sheet) so tests can check what the editor touches and
/// what it leaves alone. Nothing is validated; tests may hand in odd XML on purpose.
#[derive(Debug, Clone, Default)]
pub struct TemplateBuilder {
    sheets: Vec<SheetDef>,
    shared_strings_xml: Option<String>,
    extra_parts: BTreeMap<String, Vec<u8>>,
    extra_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct SheetDef {
    name: String,
    xml: String,
    state: Option<String>,
}

/// A worksheet with the given `<dimension ref>` and raw `<sheetData>` children.
pub fn worksheet_xml(dimension: Option<&str>, sheet_data: &str) -> String {
    let dimension = dimension
        .map(|r| format!(r#"<dimension ref="{r}"/>"#))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{SML_NS}" xmlns:r="{REL_NS}">{dimension}<sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetFormatPr defaultRowHeight="15"/><sheetData>{sheet_data}</sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#
    )
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(mut self, name: impl Into<String>, xml: impl Into<String>) -> Self {
        self.sheets.push(SheetDef {
            name: name.into(),
            xml: xml.into(),
            state: None,
        });
        self
    }

    /// An empty sheet whose dimension is `A1:A1`, like a freshly created Excel sheet.
    pub fn empty_sheet(self, name: impl Into<String>) -> Self {
        self.sheet(name, worksheet_xml(Some("A1:A1"), ""))
    }

    pub fn hidden_sheet(mut self, name: impl Into<String>, state: &str) -> Self {
        self.sheets.push(SheetDef {
            name: name.into(),
            xml: worksheet_xml(Some("A1:A1"), ""),
            state: Some(state.to_string()),
        });
        self
    }

    /// Adds `xl/sharedStrings.xml` (registered in content types and workbook rels).
    pub fn shared_strings(mut self, items: &[&str]) -> Self {
        let si: String = items.iter().map(|s| format!("<si><t>{s}</t></si>")).collect();
        self.shared_strings_xml = Some(format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="{SML_NS}" count="{n}" uniqueCount="{n}">{si}</sst>"#,
            n = items.len()
        ));
        self
    }

    pub fn part(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.extra_parts.insert(name.into(), bytes.into());
        self
    }

    pub fn content_type_override(
        mut self,
        part: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        self.extra_overrides.push((part.into(), content_type.into()));
        self
    }

    /// A chart part whose single series reads from `formula`.
    pub fn chart(self, index: u32, formula: &str) -> Self {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<c:chartSpace xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart"><c:chart><c:plotArea><c:barChart><c:ser><c:val><c:numRef><c:f>{formula}</c:f></c:numRef></c:val></c:ser></c:barChart></c:plotArea></c:chart></c:chartSpace>"#
        );
        let part = format!("xl/charts/chart{index}.xml");
        self.content_type_override(
            format!("/{part}"),
            "application/vnd.openxmlformats-officedocument.drawingml.chart+xml",
        )
        .part(part, xml)
    }

    fn workbook_xml(&self) -> String {
        let sheets: String = self
            .sheets
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let state = s
                    .state
                    .as_ref()
                    .map(|st| format!(r#" state="{st}""#))
                    .unwrap_or_default();
                format!(
                    r#"<sheet name="{}" sheetId="{}"{state} r:id="rId{}"/>"#,
                    s.name,
                    i + 1,
                    i + 1
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{SML_NS}" xmlns:r="{REL_NS}"><bookViews><workbookView/></bookViews><sheets>{sheets}</sheets><calcPr calcId="191029"/></workbook>"#
        )
    }

    fn workbook_rels_xml(&self) -> String {
        let mut rels: String = (1..=self.sheets.len())
            .map(|i| {
                format!(
                    r#"<Relationship Id="rId{i}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{i}.xml"/>"#
                )
            })
            .collect();
        let n = self.sheets.len();
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{REL_NS}/styles" Target="styles.xml"/>"#,
            n + 1
        ));
        if self.shared_strings_xml.is_some() {
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="{REL_NS}/sharedStrings" Target="sharedStrings.xml"/>"#,
                n + 2
            ));
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        )
    }

    fn content_types_xml(&self) -> String {
        let mut overrides = String::from(
            r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
        );
        for i in 1..=self.sheets.len() {
            overrides.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
        }
        overrides.push_str(
            r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
        );
        if self.shared_strings_xml.is_some() {
            overrides.push_str(
                r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#,
            );
        }
        for (part, content_type) in &self.extra_overrides {
            overrides.push_str(&format!(
                r#"<Override PartName="{part}" ContentType="{content_type}"/>"#
            ));
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>{overrides}</Types>"#
        )
    }

    pub fn build_bytes(self) -> Vec<u8> {
        let mut parts: Vec<(String, Vec<u8>)> = vec![
            ("[Content_Types].xml".into(), self.content_types_xml().into_bytes()),
            (
                "_rels/.rels".into(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
                )
                .into_bytes(),
            ),
            ("xl/workbook.xml".into(), self.workbook_xml().into_bytes()),
            ("xl/_rels/workbook.xml.rels".into(), self.workbook_rels_xml().into_bytes()),
            (
                "xl/styles.xml".into(),
                format!(r#"<styleSheet xmlns="{SML_NS}"><cellXfs count="1"><xf numFmtId="0"/></cellXfs></styleSheet>"#)
                    .into_bytes(),
            ),
        ];
        for (i, sheet) in self.sheets.iter().enumerate() {
            parts.push((
                format!("xl/worksheets/sheet{}.xml", i + 1),
                sheet.xml.clone().into_bytes(),
            ));
        }
        if let Some(sst) = &self.shared_strings_xml {
            parts.push(("xl/sharedStrings.xml".into(), sst.clone().into_bytes()));
        }
        for (name, bytes) in &self.extra_parts {
            parts.push((name.clone(), bytes.clone()));
        }

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in parts {
            zip.start_file(name, options).expect("start zip entry");
            zip.write_all(&bytes).expect("write zip entry");
        }
        zip.finish().expect("finish zip").into_inner()
    }

    /// Write the template to `dir/name` and return its path.
    pub fn write_to(self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build_bytes()).expect("write template");
        path
    }
}

pub fn read_part(package: &Path, name: &str) -> TestResult<Vec<u8>> {
    let mut zip = ZipArchive::new(std::fs::File::open(package)?)?;
    let mut file = zip.by_name(name)?;
    let mut out = Vec::new();
    file.read_to_end(&mut out)?;
    Ok(out)
}

pub fn read_part_string(package: &Path, name: &str) -> TestResult<String> {
    Ok(String::from_utf8(read_part(package, name)?)?)
}

pub fn part_names(package: &Path) -> TestResult<Vec<String>> {
    let zip = ZipArchive::new(std::fs::File::open(package)?)?;
    Ok(zip.file_names().map(str::to_string).collect())
}

/// Parsed view of a worksheet's cells: `(ref, t, v)` in document order.
pub fn cells(worksheet_xml: &str) -> TestResult<Vec<(String, Option<String>, Option<String>)>> {
    let doc = roxmltree::Document::parse(worksheet_xml)?;
    Ok(doc
        .descendants()
        .filter(|n| n.has_tag_name((SML_NS, "c")))
        .map(|c| {
            let v = c
                .children()
                .find(|n| n.has_tag_name((SML_NS, "v")))
                .and_then(|v| v.text())
                .map(str::to_string);
            (
                c.attribute("r").unwrap_or_default().to_string(),
                c.attribute("t").map(str::to_string),
                v,
            )
        })
        .collect())
}

pub fn cell(worksheet_xml: &str, a1: &str) -> TestResult<Option<(Option<String>, Option<String>)>> {
    Ok(cells(worksheet_xml)?
        .into_iter()
        .find(|(r, _, _)| r == a1)
        .map(|(_, t, v)| (t, v)))
}

pub fn dimension(worksheet_xml: &str) -> TestResult<Option<String>> {
    let doc = roxmltree::Document::parse(worksheet_xml)?;
    Ok(doc
        .root_element()
        .children()
        .find(|n| n.has_tag_name((SML_NS, "dimension")))
        .and_then(|n| n.attribute("ref"))
        .map(str::to_string))
}

pub fn row_numbers(worksheet_xml: &str) -> TestResult<Vec<u32>> {
    let doc = roxmltree::Document::parse(worksheet_xml)?;
    Ok(doc
        .descendants()
        .filter(|n| n.has_tag_name((SML_NS, "row")))
        .filter_map(|n| n.attribute("r")?.parse().ok())
        .collect())
}

/// `(count, uniqueCount, plain texts)` of a shared string part.
pub fn shared_strings(sst_xml: &str) -> TestResult<(u64, u64, Vec<String>)> {
    let doc = roxmltree::Document::parse(sst_xml)?;
    let root = doc.root_element();
    let count = root.attribute("count").ok_or("count missing")?.parse()?;
    let unique = root.attribute("uniqueCount").ok_or("uniqueCount missing")?.parse()?;
    let texts = root
        .children()
        .filter(|n| n.has_tag_name((SML_NS, "si")))
        .map(|si| {
            si.descendants()
                .filter(|n| n.has_tag_name((SML_NS, "t")))
                .filter_map(|t| t.text())
                .collect::<String>()
        })
        .collect();
    Ok((count, unique, texts))
}

/// `(name, state)` of every `<sheet>` in a workbook part.
pub fn sheet_states(workbook_xml: &str) -> TestResult<Vec<(String, Option<String>)>> {
    let doc = roxmltree::Document::parse(workbook_xml)?;
    Ok(doc
        .descendants()
        .filter(|n| n.has_tag_name((SML_NS, "sheet")))
        .map(|n| {
            (
                n.attribute("name").unwrap_or_default().to_string(),
                n.attribute("state").map(str::to_string),
            )
        })
        .collect())
}
