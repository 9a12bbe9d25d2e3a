//! Arena-backed mutable XML tree.
//!
//! Parts are parsed with `quick-xml` into an [`XmlTree`] whose nodes live in a flat `Vec` and are
//! addressed by [`NodeId`]. Qualified names and attribute keys are kept exactly as written so that
//! serializing an untouched tree reproduces the same prefixes and namespace declarations.
//! Lookups resolve prefixes against in-scope `xmlns` declarations, so callers match on
//! `(namespace, local name)` rather than on whatever prefix a producer chose.

use std::borrow::Cow;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use crate::error::{InjectError, Result};

pub const SPREADSHEETML_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub const OFFICE_REL_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
pub const CHART_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/chart";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        /// Escaped source form of each attribute in `attrs`, `None` once it has been set.
        raw_attrs: Vec<Option<String>>,
    },
    Text {
        text: String,
        raw: Option<String>,
    },
    /// Comments, CDATA, processing instructions: carried through untouched.
    Other(Event<'static>),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<NodeData>,
    root: NodeId,
    prolog: Vec<Event<'static>>,
    epilog: Vec<Event<'static>>,
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn element_from_start(e: &BytesStart<'_>) -> Result<NodeKind> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut attrs = Vec::new();
    let mut raw_attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr.unescape_value()?.into_owned();
        raw_attrs.push(Some(std::str::from_utf8(&attr.value)?.to_string()));
        attrs.push((key, value));
    }
    Ok(NodeKind::Element {
        name,
        attrs,
        raw_attrs,
    })
}

/// Tabs and line breaks are written as character references; literal ones would be normalized
/// to spaces on the next parse.
fn escape_attr_value(value: &str) -> String {
    escape(value)
        .replace('\t', "&#9;")
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
}

fn escape_text(text: &str) -> String {
    partial_escape(text).replace('\r', "&#13;")
}

impl XmlTree {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        let mut tree = XmlTree {
            nodes: Vec::new(),
            root: NodeId(0),
            prolog: Vec::new(),
            epilog: Vec::new(),
        };
        let mut root: Option<NodeId> = None;
        let mut stack: Vec<NodeId> = Vec::new();
        let mut buf = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf)?;
            match event {
                Event::Start(e) => {
                    let id = tree.push(element_from_start(&e)?);
                    tree.attach_parsed(id, stack.last().copied(), &mut root)?;
                    stack.push(id);
                }
                Event::Empty(e) => {
                    let id = tree.push(element_from_start(&e)?);
                    tree.attach_parsed(id, stack.last().copied(), &mut root)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(e) => match stack.last().copied() {
                    Some(parent) => {
                        let text = e.unescape()?.into_owned();
                        let raw = Some(std::str::from_utf8(&e)?.to_string());
                        let id = tree.push(NodeKind::Text { text, raw });
                        tree.append_child(parent, id);
                    }
                    None if root.is_none() => tree.prolog.push(Event::Text(e.into_owned())),
                    None => tree.epilog.push(Event::Text(e.into_owned())),
                },
                Event::Eof => break,
                other => match stack.last().copied() {
                    Some(parent) => {
                        let id = tree.push(NodeKind::Other(other.into_owned()));
                        tree.append_child(parent, id);
                    }
                    None if root.is_none() => tree.prolog.push(other.into_owned()),
                    None => tree.epilog.push(other.into_owned()),
                },
            }
            buf.clear();
        }

        tree.root = root.ok_or_else(|| InjectError::Invalid("xml has no root element".into()))?;
        Ok(tree)
    }

    fn attach_parsed(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        root: &mut Option<NodeId>,
    ) -> Result<()> {
        match parent {
            Some(parent) => self.append_child(parent, id),
            None if root.is_none() => *root = Some(id),
            None => return Err(InjectError::Invalid("xml has multiple root elements".into())),
        }
        Ok(())
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        for event in &self.prolog {
            writer.write_event(event.clone())?;
        }
        self.write_node(&mut writer, self.root)?;
        for event in &self.epilog {
            writer.write_event(event.clone())?;
        }
        Ok(writer.into_inner())
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<()> {
        let node = &self.nodes[id.0];
        match &node.kind {
            NodeKind::Element {
                name,
                attrs,
                raw_attrs,
            } => {
                let mut start = BytesStart::new(name.as_str());
                for ((key, value), raw) in attrs.iter().zip(raw_attrs) {
                    let escaped = match raw {
                        Some(raw) => Cow::Borrowed(raw.as_str()),
                        None => Cow::Owned(escape_attr_value(value)),
                    };
                    start.push_attribute(Attribute {
                        key: QName(key.as_bytes()),
                        value: Cow::Borrowed(escaped.as_bytes()),
                    });
                }
                if node.children.is_empty() {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    for child in &node.children {
                        self.write_node(writer, *child)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                }
            }
            NodeKind::Text { text, raw } => {
                let escaped = match raw {
                    Some(raw) => Cow::Borrowed(raw.as_str()),
                    None => Cow::Owned(escape_text(text)),
                };
                writer.write_event(Event::Text(BytesText::from_escaped(escaped)))?;
            }
            NodeKind::Other(event) => writer.write_event(event.clone())?,
        }
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    /// Qualified name as written (`x:row`, `row`). Empty for non-element nodes.
    pub fn name(&self, id: NodeId) -> &str {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => name,
            _ => "",
        }
    }

    pub fn local_name(&self, id: NodeId) -> &str {
        split_qname(self.name(id)).1
    }

    fn prefix(&self, id: NodeId) -> Option<&str> {
        split_qname(self.name(id)).0
    }

    /// Resolve a namespace prefix (`None` = default namespace) in the scope of `id`.
    fn resolve_prefix(&self, id: NodeId, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NS);
        }
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if let NodeKind::Element { attrs, .. } = &self.nodes[current.0].kind {
                for (key, value) in attrs {
                    let declares = match prefix {
                        None => key == "xmlns",
                        Some(p) => key.strip_prefix("xmlns:") == Some(p),
                    };
                    if declares {
                        return (!value.is_empty()).then_some(value.as_str());
                    }
                }
            }
            cursor = self.nodes[current.0].parent;
        }
        None
    }

    pub fn namespace(&self, id: NodeId) -> Option<&str> {
        if !self.is_element(id) {
            return None;
        }
        self.resolve_prefix(id, self.prefix(id))
    }

    /// `true` when `id` is an element named `local` in namespace `ns`.
    pub fn is(&self, id: NodeId, ns: &str, local: &str) -> bool {
        self.is_element(id) && self.local_name(id) == local && self.namespace(id) == Some(ns)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |child| self.is_element(*child))
    }

    pub fn find_child(&self, id: NodeId, ns: &str, local: &str) -> Option<NodeId> {
        self.child_elements(id).find(|child| self.is(*child, ns, local))
    }

    pub fn find_children<'a>(
        &'a self,
        id: NodeId,
        ns: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.child_elements(id)
            .filter(move |child| self.is(*child, ns, local))
    }

    /// All descendant elements of `id` (excluding `id`) in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if self.is_element(current) {
                out.push(current);
                stack.extend(self.children(current).iter().rev().copied());
            }
        }
        out
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs,
            _ => &[],
        }
    }

    /// Attribute by its key exactly as written (unprefixed attributes have no namespace).
    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Prefixed attribute lookup by namespace + local name (`r:id`, `xml:space`).
    pub fn attr_ns(&self, id: NodeId, ns: &str, local: &str) -> Option<&str> {
        self.attrs(id).iter().find_map(|(key, value)| {
            let (prefix, key_local) = split_qname(key);
            let prefix = prefix?;
            if prefix == "xmlns" || key_local != local {
                return None;
            }
            (self.resolve_prefix(id, Some(prefix)) == Some(ns)).then_some(value.as_str())
        })
    }

    pub fn set_attr(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
        if let NodeKind::Element {
            attrs, raw_attrs, ..
        } = &mut self.nodes[id.0].kind
        {
            let value = value.into();
            match attrs.iter().position(|(k, _)| k == key) {
                Some(pos) => {
                    attrs[pos].1 = value;
                    raw_attrs[pos] = None;
                }
                None => {
                    attrs.push((key.to_string(), value));
                    raw_attrs.push(None);
                }
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, key: &str) -> Option<String> {
        if let NodeKind::Element {
            attrs, raw_attrs, ..
        } = &mut self.nodes[id.0].kind
        {
            let pos = attrs.iter().position(|(k, _)| k == key)?;
            raw_attrs.remove(pos);
            return Some(attrs.remove(pos).1);
        }
        None
    }

    /// Concatenated direct text children.
    pub fn text(&self, id: NodeId) -> String {
        self.children(id)
            .iter()
            .filter_map(|child| match &self.nodes[child.0].kind {
                NodeKind::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace every child of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        for child in std::mem::take(&mut self.nodes[id.0].children) {
            self.nodes[child.0].parent = None;
        }
        let text = self.push(NodeKind::Text {
            text: text.into(),
            raw: None,
        });
        self.append_child(id, text);
    }

    /// Create a detached element with a literal qualified name.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Element {
            name: name.to_string(),
            attrs: Vec::new(),
            raw_attrs: Vec::new(),
        })
    }

    /// Create a detached element that reuses the namespace prefix of `like`.
    ///
    /// New children of `<x:sheetData>` must be `<x:row>`, not `<row>`.
    pub fn create_element_like(&mut self, like: NodeId, local: &str) -> NodeId {
        let name = match self.prefix(like) {
            Some(prefix) => format!("{prefix}:{local}"),
            None => local.to_string(),
        };
        self.create_element(&name)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `node` as a child of `parent` at `index` (clamped to the child count).
    pub fn insert_child(&mut self, parent: NodeId, index: usize, node: NodeId) {
        self.detach(node);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, node);
        self.nodes[node.0].parent = Some(parent);
    }

    pub fn insert_before(&mut self, anchor: NodeId, node: NodeId) -> Result<()> {
        let (parent, index) = self.position(anchor)?;
        self.insert_child(parent, index, node);
        Ok(())
    }

    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) -> Result<()> {
        let (parent, index) = self.position(anchor)?;
        self.insert_child(parent, index + 1, node);
        Ok(())
    }

    fn position(&self, id: NodeId) -> Result<(NodeId, usize)> {
        let parent = self
            .parent(id)
            .ok_or_else(|| InjectError::Invalid("sibling anchor is detached".into()))?;
        let index = self
            .children(parent)
            .iter()
            .position(|child| *child == id)
            .ok_or_else(|| InjectError::Invalid("node missing from its parent".into()))?;
        Ok((parent, index))
    }

    /// Detach `id` from its parent. The node stays in the arena but is no longer serialized.
    pub fn remove(&mut self, id: NodeId) {
        self.detach(id);
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
    }
}
