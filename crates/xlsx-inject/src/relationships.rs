//! OPC relationship parts (`*.rels`).

use roxmltree::Document;

use crate::error::{InjectError, Result};
use crate::xml::{XmlTree, PACKAGE_REL_NS};

pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub const SHARED_STRINGS_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
pub const CALC_CHAIN_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
    pub external: bool,
}

pub fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>> {
    let xml = std::str::from_utf8(xml)?;
    let doc = Document::parse(xml)?;

    let mut rels = Vec::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        if node.tag_name().name() != "Relationship" {
            continue;
        }
        let Some(id) = node.attribute("Id") else {
            continue;
        };
        rels.push(Relationship {
            id: id.to_string(),
            type_uri: node.attribute("Type").unwrap_or_default().to_string(),
            target: node.attribute("Target").unwrap_or_default().to_string(),
            external: node
                .attribute("TargetMode")
                .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("External")),
        });
    }
    Ok(rels)
}

/// Resolve a relationship target against the part that owns the relationship.
///
/// Targets are either relative to the source part's folder (`worksheets/sheet1.xml`) or rooted
/// at the package (`/xl/worksheets/sheet1.xml`). Fragments, `.` and `..` segments are
/// normalized away. The result has no leading slash.
pub fn resolve_target(base_part: &str, target: &str) -> String {
    let target = target.split_once('#').map_or(target, |(base, _)| base);
    let target = target.replace('\\', "/");
    let (target, base_dir) = match target.strip_prefix('/') {
        Some(rooted) => (rooted, ""),
        None => (
            target.as_str(),
            base_part.rsplit_once('/').map_or("", |(dir, _)| dir),
        ),
    };

    let mut components: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            _ => components.push(segment),
        }
    }
    components.join("/")
}

/// Add a relationship of `type_uri` pointing at `target` unless one of that type already exists.
///
/// Returns the rewritten part, or `None` when nothing had to change. The new id is one past the
/// highest numeric `rIdN` in use.
pub fn ensure_relationship(
    rels_xml: &[u8],
    type_uri: &str,
    target: &str,
) -> Result<Option<Vec<u8>>> {
    let existing = parse_relationships(rels_xml)?;
    if existing.iter().any(|rel| rel.type_uri == type_uri) {
        return Ok(None);
    }
    let next = existing
        .iter()
        .filter_map(|rel| rel.id.strip_prefix("rId")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1;
    let id = format!("rId{next}");

    let mut tree = XmlTree::parse(rels_xml)?;
    let root = tree.root();
    if !tree.is(root, PACKAGE_REL_NS, "Relationships") {
        return Err(InjectError::Invalid(format!(
            "expected <Relationships> root, found <{}>",
            tree.name(root)
        )));
    }
    let rel = tree.create_element_like(root, "Relationship");
    tree.set_attr(rel, "Id", id.as_str());
    tree.set_attr(rel, "Type", type_uri);
    tree.set_attr(rel, "Target", target);
    tree.append_child(root, rel);
    log::debug!("added relationship {id} -> {target}");
    Ok(Some(tree.to_bytes()?))
}

/// Drop every relationship of `type_uri`. Returns `None` when none was present.
pub fn remove_relationships(rels_xml: &[u8], type_uri: &str) -> Result<Option<Vec<u8>>> {
    let mut tree = XmlTree::parse(rels_xml)?;
    let root = tree.root();
    let doomed: Vec<_> = tree
        .find_children(root, PACKAGE_REL_NS, "Relationship")
        .filter(|rel| tree.attr(*rel, "Type") == Some(type_uri))
        .collect();
    if doomed.is_empty() {
        return Ok(None);
    }
    for rel in doomed {
        tree.remove(rel);
    }
    Ok(Some(tree.to_bytes()?))
}
