//! The workbook's shared string table (`xl/sharedStrings.xml`).
//!
//! The pool edits the parsed `<sst>` tree in place so rich-text entries, phonetic runs and
//! extension lists survive untouched; only plain `<si><t>` entries take part in deduplication.

use std::collections::HashMap;

use crate::error::Result;
use crate::xml::{NodeId, XmlTree, SPREADSHEETML_NS};

pub const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

const EMPTY_SST: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    "\n",
    r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="0" uniqueCount="0"/>"#
);

#[derive(Debug)]
pub struct SharedStringPool {
    tree: XmlTree,
    /// Number of `si` entries, rich-text ones included.
    unique: u32,
    plain_index: HashMap<String, u32>,
    count: u64,
    synthesized: bool,
    dirty: bool,
}

fn plain_text(tree: &XmlTree, si: NodeId) -> Option<String> {
    if tree.find_child(si, SPREADSHEETML_NS, "r").is_some() {
        return None;
    }
    tree.find_child(si, SPREADSHEETML_NS, "t")
        .map(|t| tree.text(t))
}

impl SharedStringPool {
    pub fn from_part(bytes: &[u8]) -> Result<Self> {
        Self::from_tree(XmlTree::parse(bytes)?, false)
    }

    /// An empty pool for a workbook that has no shared-string part yet.
    pub fn synthesized() -> Result<Self> {
        Self::from_tree(XmlTree::parse(EMPTY_SST.as_bytes())?, true)
    }

    fn from_tree(tree: XmlTree, synthesized: bool) -> Result<Self> {
        let root = tree.root();
        let mut unique = 0u32;
        let mut plain_index = HashMap::new();
        for si in tree.find_children(root, SPREADSHEETML_NS, "si") {
            if let Some(text) = plain_text(&tree, si) {
                // Duplicates resolve to their first occurrence.
                plain_index.entry(text).or_insert(unique);
            }
            unique += 1;
        }
        let count = tree
            .attr(root, "count")
            .and_then(|c| c.trim().parse().ok())
            .unwrap_or(u64::from(unique));

        Ok(Self {
            tree,
            unique,
            plain_index,
            count,
            synthesized,
            dirty: false,
        })
    }

    /// Index of `text` in the table, appending a new entry when no plain entry matches.
    ///
    /// Every call counts as one more reference.
    pub fn resolve(&mut self, text: &str) -> u32 {
        self.count += 1;
        self.dirty = true;
        if let Some(idx) = self.plain_index.get(text) {
            return *idx;
        }

        let idx = self.unique;
        let root = self.tree.root();
        let si = self.tree.create_element_like(root, "si");
        let t = self.tree.create_element_like(root, "t");
        if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
            self.tree.set_attr(t, "xml:space", "preserve");
        }
        self.tree.set_text(t, text);
        self.tree.append_child(si, t);
        self.tree.append_child(root, si);

        self.unique += 1;
        self.plain_index.insert(text.to_string(), idx);
        idx
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn unique_count(&self) -> u64 {
        u64::from(self.unique)
    }

    /// `true` when the part did not exist in the package.
    pub fn is_synthesized(&self) -> bool {
        self.synthesized
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let root = self.tree.root();
        self.tree.set_attr(root, "count", self.count.to_string());
        self.tree
            .set_attr(root, "uniqueCount", self.unique_count().to_string());
        self.tree.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const EXISTING: &str = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="5" uniqueCount="3"><si><t>a</t></si><si><r><t>rich</t></r></si><si><t>a</t></si></sst>"#;

    #[test]
    fn resolving_the_same_text_twice_adds_one_entry() {
        let mut pool = SharedStringPool::synthesized().unwrap();
        assert_eq!(pool.resolve("hello"), 0);
        assert_eq!(pool.resolve("hello"), 0);
        assert_eq!(pool.unique_count(), 1);
        assert_eq!(pool.count(), 2);
        assert!(pool.is_synthesized());
    }

    #[test]
    fn first_duplicate_wins_and_rich_entries_never_match() {
        let mut pool = SharedStringPool::from_part(EXISTING.as_bytes()).unwrap();
        assert_eq!(pool.unique_count(), 3);
        assert_eq!(pool.resolve("a"), 0);
        assert_eq!(pool.resolve("rich"), 3);
        assert_eq!(pool.unique_count(), 4);
        assert_eq!(pool.count(), 7);
    }

    #[test]
    fn serialized_counts_track_the_entries() {
        let mut pool = SharedStringPool::from_part(EXISTING.as_bytes()).unwrap();
        pool.resolve(" padded ");
        let bytes = pool.to_bytes().unwrap();
        let xml = String::from_utf8(bytes).unwrap();
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let root = doc.root_element();
        assert_eq!(root.attribute("count"), Some("6"));
        assert_eq!(root.attribute("uniqueCount"), Some("4"));
        let last = root.children().filter(|n| n.has_tag_name("si")).last().unwrap();
        let t = last.first_element_child().unwrap();
        assert_eq!(t.text(), Some(" padded "));
        assert_eq!(
            t.attribute(("http://www.w3.org/XML/1998/namespace", "space")),
            Some("preserve")
        );
    }

    #[test]
    fn untouched_pool_is_clean() {
        let pool = SharedStringPool::from_part(EXISTING.as_bytes()).unwrap();
        assert!(!pool.is_dirty());
        assert!(!pool.is_synthesized());
        assert_eq!(pool.count(), 5);
    }
}
