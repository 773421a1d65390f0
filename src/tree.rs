use crate::error::{Result, SdtError};
use crate::xml::{escape_attr, XmlEvent};

pub type NodeId = usize;

#[derive(Clone, Debug)]
pub enum NodeData {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    CData(String),
    Comment(String),
    PI(String),
}

#[derive(Clone, Debug)]
pub struct XmlNode {
    pub data: NodeData,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Arena-backed tree for one document part. Node ids stay stable across
/// detach/insert/wrap, so marks and handles survive mutation within a pass.
#[derive(Clone, Debug)]
pub struct XmlTree {
    pub part_name: String,
    nodes: Vec<XmlNode>,
    root: NodeId,
    prolog: Vec<XmlEvent>,
}

impl XmlTree {
    pub fn from_events(part_name: &str, events: &[XmlEvent]) -> Result<Self> {
        let malformed = |detail: String| SdtError::MalformedXml {
            part: part_name.to_string(),
            detail,
        };

        let mut nodes: Vec<XmlNode> = Vec::new();
        let mut prolog: Vec<XmlEvent> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        let push_node = |nodes: &mut Vec<XmlNode>, stack: &[NodeId], data: NodeData| {
            let id = nodes.len();
            let parent = stack.last().copied();
            nodes.push(XmlNode {
                data,
                parent,
                children: Vec::new(),
            });
            if let Some(p) = parent {
                nodes[p].children.push(id);
            }
            id
        };

        for ev in events {
            match ev {
                XmlEvent::Start { name, attrs } => {
                    let id = push_node(
                        &mut nodes,
                        &stack,
                        NodeData::Element {
                            name: name.clone(),
                            attrs: attrs.clone(),
                        },
                    );
                    if stack.is_empty() {
                        if root.is_some() {
                            return Err(malformed("multiple root elements".to_string()));
                        }
                        root = Some(id);
                    }
                    stack.push(id);
                }
                XmlEvent::Empty { name, attrs } => {
                    let id = push_node(
                        &mut nodes,
                        &stack,
                        NodeData::Element {
                            name: name.clone(),
                            attrs: attrs.clone(),
                        },
                    );
                    if stack.is_empty() {
                        if root.is_some() {
                            return Err(malformed("multiple root elements".to_string()));
                        }
                        root = Some(id);
                    }
                }
                XmlEvent::End { name } => {
                    let top = stack
                        .pop()
                        .ok_or_else(|| malformed(format!("unmatched </{name}>")))?;
                    match &nodes[top].data {
                        NodeData::Element { name: open, .. } if open == name => {}
                        NodeData::Element { name: open, .. } => {
                            return Err(malformed(format!("expected </{open}>, got </{name}>")));
                        }
                        _ => unreachable!("non-element on open stack"),
                    }
                }
                XmlEvent::Text { text } => {
                    if stack.is_empty() {
                        // Whitespace between prolog items and the root.
                        if !text.trim().is_empty() {
                            return Err(malformed("text content outside root".to_string()));
                        }
                        continue;
                    }
                    push_node(&mut nodes, &stack, NodeData::Text(text.clone()));
                }
                XmlEvent::CData { text } => {
                    if stack.is_empty() {
                        return Err(malformed("CDATA outside root".to_string()));
                    }
                    push_node(&mut nodes, &stack, NodeData::CData(text.clone()));
                }
                XmlEvent::Comment { text } => {
                    if stack.is_empty() {
                        prolog.push(ev.clone());
                    } else {
                        push_node(&mut nodes, &stack, NodeData::Comment(text.clone()));
                    }
                }
                XmlEvent::PI { content } => {
                    if stack.is_empty() {
                        prolog.push(ev.clone());
                    } else {
                        push_node(&mut nodes, &stack, NodeData::PI(content.clone()));
                    }
                }
                XmlEvent::Decl { .. } | XmlEvent::DocType { .. } => {
                    prolog.push(ev.clone());
                }
            }
        }

        if !stack.is_empty() {
            return Err(malformed(format!("{} unclosed element(s)", stack.len())));
        }
        let root = root.ok_or_else(|| malformed("no root element".to_string()))?;
        Ok(Self {
            part_name: part_name.to_string(),
            nodes,
            root,
            prolog,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &XmlNode {
        &self.nodes[id]
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Raw (still-escaped) attribute value.
    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Attribute value with character references resolved, for comparisons
    /// against caller-supplied strings (tags containing quotes etc).
    pub fn attr_unescaped(&self, id: NodeId, key: &str) -> Option<String> {
        self.attr(id, key).map(|raw| {
            quick_xml::escape::unescape(raw)
                .map(|c| c.into_owned())
                .unwrap_or_else(|_| raw.to_string())
        })
    }

    pub fn set_attr(&mut self, id: NodeId, key: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[id].data {
            let escaped = escape_attr(value);
            for (k, v) in attrs.iter_mut() {
                if k == key {
                    *v = escaped;
                    return;
                }
            }
            attrs.push((key.to_string(), escaped));
        }
    }

    pub fn new_element(&mut self, name: &str, attrs: Vec<(String, String)>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(XmlNode {
            data: NodeData::Element {
                name: name.to_string(),
                attrs,
            },
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn new_text(&mut self, text: &str) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(XmlNode {
            data: NodeData::Text(text.to_string()),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.nodes[child].parent.is_none());
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        debug_assert!(self.nodes[child].parent.is_none());
        self.nodes[child].parent = Some(parent);
        let index = index.min(self.nodes[parent].children.len());
        self.nodes[parent].children.insert(index, child);
    }

    /// Unlink `id` from its parent. The node (and its subtree) stays in the
    /// arena but is no longer reachable from the root.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(p) = self.nodes[id].parent.take() {
            self.nodes[p].children.retain(|&c| c != id);
        }
    }

    /// Replace `target` with `wrapper` at the same position under target's
    /// parent, then move `target` to be the sole child of `slot`. One
    /// relocation: no copy of `target` remains anywhere else in the tree.
    pub fn wrap(&mut self, target: NodeId, wrapper: NodeId, slot: NodeId) -> Result<()> {
        let parent = self.nodes[target].parent.ok_or_else(|| SdtError::OrphanedNode {
            part: self.part_name.clone(),
        })?;
        let pos = self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == target)
            .ok_or_else(|| SdtError::OrphanedNode {
                part: self.part_name.clone(),
            })?;
        self.nodes[parent].children[pos] = wrapper;
        self.nodes[wrapper].parent = Some(parent);
        self.nodes[target].parent = Some(slot);
        self.nodes[slot].children.push(target);
        Ok(())
    }

    /// Preorder walk of the subtree rooted at `id`, including `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            for &c in self.nodes[cur].children.iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.nodes[id].parent;
        while let Some(p) = cur {
            out.push(p);
            cur = self.nodes[p].parent;
        }
        out
    }

    /// Elements named `name` in the subtree of `id`, document order.
    pub fn find_all(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.name(n) == Some(name))
            .collect()
    }

    pub fn find_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .find(|&c| self.name(c) == Some(name))
    }

    /// Visible text of a subtree: the character data under `w:t` (and
    /// `a:t` / `w:delText`) descendants, concatenated in document order.
    pub fn visible_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for n in self.descendants(id) {
            if let NodeData::Text(t) = &self.nodes[n].data {
                let parent_name = self.nodes[n].parent.and_then(|p| self.name(p));
                if parent_name.is_some_and(is_text_tag) {
                    out.push_str(t);
                }
            }
        }
        out
    }

    /// Graft a parsed XML fragment under `parent`; returns the ids of the
    /// fragment's top-level nodes.
    pub fn graft_events(&mut self, parent: NodeId, events: &[XmlEvent]) -> Result<Vec<NodeId>> {
        let mut stack: Vec<NodeId> = vec![parent];
        let mut top_level: Vec<NodeId> = Vec::new();

        for ev in events {
            let attach = *stack.last().unwrap_or(&parent);
            match ev {
                XmlEvent::Start { name, attrs } => {
                    let id = self.new_element(name, attrs.clone());
                    self.append_child(attach, id);
                    if stack.len() == 1 {
                        top_level.push(id);
                    }
                    stack.push(id);
                }
                XmlEvent::Empty { name, attrs } => {
                    let id = self.new_element(name, attrs.clone());
                    self.append_child(attach, id);
                    if stack.len() == 1 {
                        top_level.push(id);
                    }
                }
                XmlEvent::End { name } => {
                    let top = stack.pop();
                    if stack.is_empty() || top.is_none() {
                        return Err(SdtError::MalformedXml {
                            part: self.part_name.clone(),
                            detail: format!("fragment: unmatched </{name}>"),
                        });
                    }
                }
                XmlEvent::Text { text } => {
                    let id = self.new_text(text);
                    self.append_child(attach, id);
                    if stack.len() == 1 {
                        top_level.push(id);
                    }
                }
                other => {
                    return Err(SdtError::MalformedXml {
                        part: self.part_name.clone(),
                        detail: format!("fragment: unsupported event {other:?}"),
                    });
                }
            }
        }
        if stack.len() != 1 {
            return Err(SdtError::MalformedXml {
                part: self.part_name.clone(),
                detail: "fragment: unclosed element".to_string(),
            });
        }
        Ok(top_level)
    }

    pub fn to_events(&self) -> Vec<XmlEvent> {
        let mut out = self.prolog.clone();
        self.emit(self.root, &mut out);
        out
    }

    fn emit(&self, id: NodeId, out: &mut Vec<XmlEvent>) {
        match &self.nodes[id].data {
            NodeData::Element { name, attrs } => {
                if self.nodes[id].children.is_empty() {
                    out.push(XmlEvent::Empty {
                        name: name.clone(),
                        attrs: attrs.clone(),
                    });
                } else {
                    out.push(XmlEvent::Start {
                        name: name.clone(),
                        attrs: attrs.clone(),
                    });
                    for &c in &self.nodes[id].children {
                        self.emit(c, out);
                    }
                    out.push(XmlEvent::End { name: name.clone() });
                }
            }
            NodeData::Text(t) => out.push(XmlEvent::Text { text: t.clone() }),
            NodeData::CData(t) => out.push(XmlEvent::CData { text: t.clone() }),
            NodeData::Comment(t) => out.push(XmlEvent::Comment { text: t.clone() }),
            NodeData::PI(c) => out.push(XmlEvent::PI { content: c.clone() }),
        }
    }
}

pub fn is_text_tag(name: &str) -> bool {
    name == "w:t" || name == "a:t" || name == "w:delText"
}
