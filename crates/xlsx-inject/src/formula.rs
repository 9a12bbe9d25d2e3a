use crate::xml::{NodeId, XmlTree, SPREADSHEETML_NS};

/// Drop the cached `<v>` result of every formula cell in a worksheet tree.
///
/// Cached results go stale as soon as an input changes. Without a `<v>`, the consuming
/// application computes the formula on load instead of showing the old value. Returns the number
/// of cells touched.
pub fn invalidate_cached_values(tree: &mut XmlTree) -> usize {
    let cells: Vec<NodeId> = tree
        .descendants(tree.root())
        .into_iter()
        .filter(|node| tree.is(*node, SPREADSHEETML_NS, "c"))
        .filter(|cell| tree.find_child(*cell, SPREADSHEETML_NS, "f").is_some())
        .collect();

    let mut touched = 0;
    for cell in cells {
        let cached: Vec<NodeId> = tree.find_children(cell, SPREADSHEETML_NS, "v").collect();
        if cached.is_empty() {
            continue;
        }
        for v in cached {
            tree.remove(v);
        }
        touched += 1;
    }
    if touched > 0 {
        log::debug!("dropped cached values of {touched} formula cells");
    }
    touched
}
