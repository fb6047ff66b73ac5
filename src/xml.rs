//! Index-based XML tree used for problem definitions and summary rendering.
//!
//! Nodes live in a flat arena; each node keeps its children in document order
//! and a parent index, so previous-sibling / parent walks never need owning
//! back-references. Cloning an `XmlTree` is a deep clone.
//!
//! Comments, processing instructions and the XML declaration are dropped at
//! parse time; only elements and text survive.

use std::borrow::Cow;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

pub type NodeId = usize;

/// Elements serialized without a closing tag in HTML output.
const HTML_VOID: &[&str] = &["area", "br", "col", "hr", "img", "input", "link", "meta"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("XML error: {0}")]
pub struct XmlError(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
enum NodeKind {
  Element { tag: String, attrs: Vec<(String, String)> },
  Text(String),
}

#[derive(Clone, Debug)]
struct Node {
  kind: NodeKind,
  parent: Option<NodeId>,
  children: Vec<NodeId>,
}

/// Output flavour for serialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Style {
  /// Empty elements self-close.
  Xml,
  /// Only void elements self-close; everything else gets an explicit end tag.
  Html,
}

#[derive(Clone, Debug)]
pub struct XmlTree {
  nodes: Vec<Node>,
  root: NodeId,
}

impl XmlTree {
  /// A tree holding a single empty root element.
  pub fn new(root_tag: &str) -> Self {
    Self {
      nodes: vec![Node {
        kind: NodeKind::Element { tag: root_tag.to_string(), attrs: Vec::new() },
        parent: None,
        children: Vec::new(),
      }],
      root: 0,
    }
  }

  /// Parse a document with exactly one root element.
  pub fn parse(src: &str) -> Result<Self, XmlError> {
    let mut reader = Reader::from_str(src);
    reader.trim_text(false);

    let mut nodes: Vec<Node> = Vec::new();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut root: Option<NodeId> = None;

    loop {
      let event = reader
        .read_event()
        .map_err(|e| XmlError(format!("at byte {}: {}", reader.buffer_position(), e)))?;
      match event {
        Event::Start(e) => {
          let id = open_element(&mut nodes, &stack, &mut root, &e)?;
          stack.push(id);
        }
        Event::Empty(e) => {
          open_element(&mut nodes, &stack, &mut root, &e)?;
        }
        Event::End(_) => {
          stack.pop();
        }
        Event::Text(t) => {
          let text = t.unescape().map_err(|e| XmlError(e.to_string()))?;
          push_text(&mut nodes, &stack, text)?;
        }
        Event::CData(c) => {
          let raw = c.into_inner();
          let text = String::from_utf8_lossy(&raw).into_owned();
          push_text(&mut nodes, &stack, Cow::Owned(text))?;
        }
        Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        Event::Eof => break,
      }
    }

    if !stack.is_empty() {
      return Err(XmlError("unexpected end of document: unclosed element".into()));
    }
    let root = root.ok_or_else(|| XmlError("document has no root element".into()))?;
    Ok(Self { nodes, root })
  }

  pub fn root(&self) -> NodeId {
    self.root
  }

  pub fn tag(&self, id: NodeId) -> Option<&str> {
    match &self.nodes[id].kind {
      NodeKind::Element { tag, .. } => Some(tag.as_str()),
      NodeKind::Text(_) => None,
    }
  }

  pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
    match &self.nodes[id].kind {
      NodeKind::Element { attrs, .. } => attrs.as_slice(),
      NodeKind::Text(_) => &[],
    }
  }

  pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
    self.attrs(id).iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
  }

  /// Set (or overwrite) an attribute; no-op on text nodes.
  pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
    if let NodeKind::Element { attrs, .. } = &mut self.nodes[id].kind {
      match attrs.iter_mut().find(|(k, _)| k == name) {
        Some(slot) => slot.1 = value.to_string(),
        None => attrs.push((name.to_string(), value.to_string())),
      }
    }
  }

  pub fn children(&self, id: NodeId) -> &[NodeId] {
    &self.nodes[id].children
  }

  pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    self.nodes[id].children.iter().copied().filter(move |c| self.tag(*c).is_some())
  }

  pub fn parent(&self, id: NodeId) -> Option<NodeId> {
    self.nodes[id].parent
  }

  /// Closest preceding sibling that is an element (text is skipped).
  pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
    let parent = self.nodes[id].parent?;
    let siblings = &self.nodes[parent].children;
    let pos = siblings.iter().position(|c| *c == id)?;
    siblings[..pos].iter().rev().copied().find(|c| self.tag(*c).is_some())
  }

  /// Number of ancestors between `id` and the root.
  pub fn depth(&self, id: NodeId) -> usize {
    let mut depth = 0;
    let mut cur = self.nodes[id].parent;
    while let Some(p) = cur {
      depth += 1;
      cur = self.nodes[p].parent;
    }
    depth
  }

  /// Descendant elements of `id` (excluding `id`) in document order.
  pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
    while let Some(n) = stack.pop() {
      if self.tag(n).is_some() {
        out.push(n);
        stack.extend(self.nodes[n].children.iter().rev().copied());
      }
    }
    out
  }

  pub fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
    let attrs = attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    self.push_node(NodeKind::Element { tag: tag.to_string(), attrs })
  }

  fn push_node(&mut self, kind: NodeKind) -> NodeId {
    self.nodes.push(Node { kind, parent: None, children: Vec::new() });
    self.nodes.len() - 1
  }

  /// Remove `id` from its parent; the subtree stays in the arena, unreachable from the root.
  pub fn detach(&mut self, id: NodeId) {
    if let Some(p) = self.nodes[id].parent.take() {
      self.nodes[p].children.retain(|c| *c != id);
    }
  }

  pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
    let at = self.nodes[parent].children.len();
    self.insert_child(parent, at, child);
  }

  /// Insert `child` at `pos` (clamped) among `parent`'s children, detaching it first.
  pub fn insert_child(&mut self, parent: NodeId, pos: usize, child: NodeId) {
    self.detach(child);
    let children = &mut self.nodes[parent].children;
    let pos = pos.min(children.len());
    children.insert(pos, child);
    self.nodes[child].parent = Some(parent);
  }

  /// Drop every child of `id`.
  pub fn clear_children(&mut self, id: NodeId) {
    for c in std::mem::take(&mut self.nodes[id].children) {
      self.nodes[c].parent = None;
    }
  }

  /// Deep copy of the subtree at `id`, detached.
  pub fn duplicate(&mut self, id: NodeId) -> NodeId {
    let kind = self.nodes[id].kind.clone();
    let children = self.nodes[id].children.clone();
    let copy = self.push_node(kind);
    for c in children {
      let cc = self.duplicate(c);
      self.append_child(copy, cc);
    }
    copy
  }

  /// Deep copy of `other`'s subtree at `src` into this arena, detached.
  pub fn import(&mut self, other: &XmlTree, src: NodeId) -> NodeId {
    let copy = self.push_node(other.nodes[src].kind.clone());
    for c in &other.nodes[src].children {
      let cc = self.import(other, *c);
      self.append_child(copy, cc);
    }
    copy
  }

  pub fn to_xml(&self) -> String {
    self.serialize(self.root, Style::Xml)
  }

  pub fn serialize(&self, id: NodeId, style: Style) -> String {
    let mut out = String::new();
    self.write_node(id, style, &mut out);
    out
  }

  fn write_node(&self, id: NodeId, style: Style, out: &mut String) {
    match &self.nodes[id].kind {
      NodeKind::Text(t) => out.push_str(&partial_escape(t)),
      NodeKind::Element { tag, attrs } => {
        out.push('<');
        out.push_str(tag);
        for (k, v) in attrs {
          out.push(' ');
          out.push_str(k);
          out.push_str("=\"");
          out.push_str(&escape(v));
          out.push('"');
        }
        let children = &self.nodes[id].children;
        let self_close = match style {
          Style::Xml => children.is_empty(),
          Style::Html => children.is_empty() && HTML_VOID.contains(&tag.as_str()),
        };
        if self_close {
          out.push_str("/>");
          return;
        }
        out.push('>');
        for c in children {
          self.write_node(*c, style, out);
        }
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
      }
    }
  }
}

fn open_element(
  nodes: &mut Vec<Node>,
  stack: &[NodeId],
  root: &mut Option<NodeId>,
  e: &BytesStart<'_>,
) -> Result<NodeId, XmlError> {
  let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
  let mut attrs = Vec::new();
  for a in e.attributes() {
    let a = a.map_err(|err| XmlError(err.to_string()))?;
    let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
    let value = a.unescape_value().map_err(|err| XmlError(err.to_string()))?.into_owned();
    attrs.push((key, value));
  }

  let parent = stack.last().copied();
  if parent.is_none() && root.is_some() {
    return Err(XmlError(format!("second root element <{}>", tag)));
  }
  nodes.push(Node { kind: NodeKind::Element { tag, attrs }, parent, children: Vec::new() });
  let id = nodes.len() - 1;
  match parent {
    Some(p) => nodes[p].children.push(id),
    None => *root = Some(id),
  }
  Ok(id)
}

fn push_text(nodes: &mut Vec<Node>, stack: &[NodeId], text: Cow<'_, str>) -> Result<(), XmlError> {
  let Some(&parent) = stack.last() else {
    if text.trim().is_empty() {
      return Ok(());
    }
    return Err(XmlError("text outside the root element".into()));
  };
  // Coalesce adjacent text (e.g. text + CDATA).
  if let Some(&last) = nodes[parent].children.last() {
    if let NodeKind::Text(prev) = &mut nodes[last].kind {
      prev.push_str(&text);
      return Ok(());
    }
  }
  nodes.push(Node { kind: NodeKind::Text(text.into_owned()), parent: Some(parent), children: Vec::new() });
  let id = nodes.len() - 1;
  nodes[parent].children.push(id);
  Ok(())
}
