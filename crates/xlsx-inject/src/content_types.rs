//! `[Content_Types].xml` registration.

use crate::error::{InjectError, Result};
use crate::xml::{XmlTree, CONTENT_TYPES_NS};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const SHARED_STRINGS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";

fn same_part(a: &str, b: &str) -> bool {
    a.trim_start_matches('/')
        .eq_ignore_ascii_case(b.trim_start_matches('/'))
}

/// Declare `part_name` with an `<Override>` unless one already exists.
///
/// The new entry is placed right after the styles override when there is one, else after the
/// last override. Returns `None` when the part was already declared.
pub fn ensure_override(xml: &[u8], part_name: &str, content_type: &str) -> Result<Option<Vec<u8>>> {
    let mut tree = XmlTree::parse(xml)?;
    let root = tree.root();
    if !tree.is(root, CONTENT_TYPES_NS, "Types") {
        return Err(InjectError::Invalid(format!(
            "expected <Types> root, found <{}>",
            tree.name(root)
        )));
    }

    let overrides: Vec<_> = tree.find_children(root, CONTENT_TYPES_NS, "Override").collect();
    if overrides
        .iter()
        .any(|o| tree.attr(*o, "PartName").is_some_and(|name| same_part(name, part_name)))
    {
        return Ok(None);
    }

    let node = tree.create_element_like(root, "Override");
    tree.set_attr(node, "PartName", format!("/{}", part_name.trim_start_matches('/')));
    tree.set_attr(node, "ContentType", content_type);

    let styles = overrides.iter().copied().find(|o| {
        tree.attr(*o, "PartName")
            .is_some_and(|name| same_part(name, "xl/styles.xml"))
    });
    match styles.or_else(|| overrides.last().copied()) {
        Some(anchor) => tree.insert_after(anchor, node)?,
        None => tree.append_child(root, node),
    }
    log::debug!("registered content type for {part_name}");
    Ok(Some(tree.to_bytes()?))
}

/// Drop the `<Override>` for `part_name`. Returns `None` when it was not declared.
pub fn remove_override(xml: &[u8], part_name: &str) -> Result<Option<Vec<u8>>> {
    let mut tree = XmlTree::parse(xml)?;
    let root = tree.root();
    let doomed: Vec<_> = tree
        .find_children(root, CONTENT_TYPES_NS, "Override")
        .filter(|o| tree.attr(*o, "PartName").is_some_and(|name| same_part(name, part_name)))
        .collect();
    if doomed.is_empty() {
        return Ok(None);
    }
    for node in doomed {
        tree.remove(node);
    }
    Ok(Some(tree.to_bytes()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPES: &str = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="wb"/><Override PartName="/xl/styles.xml" ContentType="styles"/><Override PartName="/docProps/app.xml" ContentType="app"/></Types>"#;

    #[test]
    fn override_lands_after_styles_and_only_once() {
        let updated = ensure_override(
            TYPES.as_bytes(),
            "xl/sharedStrings.xml",
            SHARED_STRINGS_CONTENT_TYPE,
        )
        .unwrap()
        .expect("override added");
        let xml = String::from_utf8(updated.clone()).unwrap();
        let styles = xml.find("/xl/styles.xml").unwrap();
        let shared = xml.find("/xl/sharedStrings.xml").unwrap();
        let app = xml.find("/docProps/app.xml").unwrap();
        assert!(styles < shared && shared < app, "{xml}");

        assert_eq!(
            ensure_override(&updated, "/XL/sharedStrings.xml", SHARED_STRINGS_CONTENT_TYPE).unwrap(),
            None
        );
    }

    #[test]
    fn override_is_appended_without_styles() {
        let xml = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#;
        let updated = ensure_override(xml.as_bytes(), "xl/sharedStrings.xml", "ct")
            .unwrap()
            .unwrap();
        let doc_xml = String::from_utf8(updated).unwrap();
        let doc = roxmltree::Document::parse(&doc_xml).unwrap();
        let node = doc.root_element().first_element_child().unwrap();
        assert_eq!(node.attribute("PartName"), Some("/xl/sharedStrings.xml"));
    }

    #[test]
    fn remove_override_drops_the_entry() {
        let updated = remove_override(TYPES.as_bytes(), "xl/styles.xml").unwrap().unwrap();
        assert!(!String::from_utf8(updated.clone()).unwrap().contains("styles"));
        assert_eq!(remove_override(&updated, "xl/styles.xml").unwrap(), None);
    }
}
