//! Minimal stand-in for the upstream document-authoring model: an element
//! arena with the closed kind set, part-scope ancestry, and the OOXML
//! fragment serializer whose output this crate re-finds and mutates. The
//! core reads this model; it never mutates it.

use crate::xml::XmlEvent;

pub type ElementId = usize;

/// Closed set of element kinds the matching engine understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Text,
    Run,
    TextRun,
    Table,
    Cell,
    Image,
    Heading(u8),
}

impl ElementKind {
    /// Heading style name derived from depth: 0 is the document title.
    pub fn heading_style(depth: u8) -> String {
        if depth == 0 {
            "Title".to_string()
        } else {
            format!("Heading{depth}")
        }
    }
}

/// Which package part an element tree root is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartScope {
    Body,
    Header(u32),
    Footer(u32),
}

impl PartScope {
    pub fn part_name(self) -> String {
        match self {
            PartScope::Body => "word/document.xml".to_string(),
            PartScope::Header(n) => format!("word/header{n}.xml"),
            PartScope::Footer(n) => format!("word/footer{n}.xml"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImageProps {
    pub source: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug)]
pub struct ElementNode {
    pub kind: ElementKind,
    pub text: String,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
    pub image: Option<ImageProps>,
    /// Rows and columns, tables only; children are cells in row-major order.
    pub table_shape: Option<(usize, usize)>,
}

#[derive(Clone, Debug, Default)]
pub struct ElementTree {
    nodes: Vec<ElementNode>,
    roots: Vec<(ElementId, PartScope)>,
}

impl ElementTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: ElementNode) -> ElementId {
        let id = self.nodes.len();
        self.nodes.push(node);
        id
    }

    pub fn new_element(&mut self, kind: ElementKind, text: &str) -> ElementId {
        self.push(ElementNode {
            kind,
            text: text.to_string(),
            parent: None,
            children: Vec::new(),
            image: None,
            table_shape: None,
        })
    }

    pub fn new_image(&mut self, source: &str, width: u32, height: u32) -> ElementId {
        self.push(ElementNode {
            kind: ElementKind::Image,
            text: String::new(),
            parent: None,
            children: Vec::new(),
            image: Some(ImageProps {
                source: source.to_string(),
                width,
                height,
            }),
            table_shape: None,
        })
    }

    pub fn new_table(&mut self, rows: usize, cols: usize) -> ElementId {
        self.push(ElementNode {
            kind: ElementKind::Table,
            text: String::new(),
            parent: None,
            children: Vec::new(),
            image: None,
            table_shape: Some((rows, cols)),
        })
    }

    pub fn add_child(&mut self, parent: ElementId, child: ElementId) {
        debug_assert!(self.nodes[child].parent.is_none());
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    pub fn attach_root(&mut self, id: ElementId, scope: PartScope) {
        debug_assert!(self.nodes[id].parent.is_none());
        self.roots.push((id, scope));
    }

    pub fn node(&self, id: ElementId) -> &ElementNode {
        &self.nodes[id]
    }

    pub fn kind(&self, id: ElementId) -> ElementKind {
        self.nodes[id].kind
    }

    pub fn roots_of(&self, scope: PartScope) -> Vec<ElementId> {
        self.roots
            .iter()
            .filter(|(_, s)| *s == scope)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn scopes(&self) -> Vec<PartScope> {
        let mut out: Vec<PartScope> = self.roots.iter().map(|(_, s)| *s).collect();
        out.sort();
        out.dedup();
        out
    }

    /// Classify an element by walking its ancestry to an attached root.
    pub fn part_scope(&self, id: ElementId) -> Option<PartScope> {
        let mut cur = id;
        while let Some(p) = self.nodes[cur].parent {
            cur = p;
        }
        self.roots
            .iter()
            .find(|(root, _)| *root == cur)
            .map(|(_, s)| *s)
    }

    /// Ancestor count; a cell inside a table root is deeper than the table.
    pub fn depth(&self, id: ElementId) -> usize {
        let mut d = 0;
        let mut cur = id;
        while let Some(p) = self.nodes[cur].parent {
            d += 1;
            cur = p;
        }
        d
    }

    /// Rendered text of an element the way the serializer would emit it.
    pub fn rendered_text(&self, id: ElementId) -> String {
        let n = &self.nodes[id];
        match n.kind {
            ElementKind::Text | ElementKind::Run | ElementKind::Heading(_) => n.text.clone(),
            ElementKind::TextRun => {
                if n.children.is_empty() {
                    n.text.clone()
                } else {
                    n.children
                        .iter()
                        .map(|&c| self.rendered_text(c))
                        .collect()
                }
            }
            ElementKind::Cell if n.children.is_empty() => n.text.clone(),
            ElementKind::Cell | ElementKind::Table => n
                .children
                .iter()
                .map(|&c| self.rendered_text(c))
                .collect(),
            ElementKind::Image => String::new(),
        }
    }

    /// Paragraph count a cell serializes to.
    pub fn cell_paragraphs(&self, id: ElementId) -> usize {
        let n = &self.nodes[id];
        if n.children.is_empty() {
            1
        } else {
            n.children.len()
        }
    }

    /// Serialize an element into the OOXML fragment the upstream writer
    /// produces for it. The Locator's fingerprint fallback and the Mutation
    /// Runtime's replace/append depend on this shape staying in sync with
    /// the draft packages being processed.
    pub fn serialize(&self, id: ElementId) -> Vec<XmlEvent> {
        let mut out = Vec::new();
        self.serialize_into(id, &mut out);
        out
    }

    fn serialize_into(&self, id: ElementId, out: &mut Vec<XmlEvent>) {
        let n = &self.nodes[id];
        match n.kind {
            ElementKind::Text => {
                start(out, "w:p");
                emit_run(out, &n.text);
                end(out, "w:p");
            }
            ElementKind::Run => {
                emit_run(out, &n.text);
            }
            ElementKind::TextRun => {
                start(out, "w:p");
                if n.children.is_empty() {
                    emit_run(out, &n.text);
                } else {
                    for &c in &n.children {
                        self.serialize_into(c, out);
                    }
                }
                end(out, "w:p");
            }
            ElementKind::Heading(depth) => {
                start(out, "w:p");
                start(out, "w:pPr");
                out.push(XmlEvent::Empty {
                    name: "w:pStyle".to_string(),
                    attrs: vec![("w:val".to_string(), ElementKind::heading_style(depth))],
                });
                end(out, "w:pPr");
                emit_run(out, &n.text);
                end(out, "w:p");
            }
            ElementKind::Table => {
                let (rows, cols) = n.table_shape.unwrap_or((0, 0));
                start(out, "w:tbl");
                empty(out, "w:tblPr");
                for r in 0..rows {
                    start(out, "w:tr");
                    for c in 0..cols {
                        match n.children.get(r * cols + c) {
                            Some(&cell) => self.serialize_into(cell, out),
                            None => {
                                start(out, "w:tc");
                                empty(out, "w:tcPr");
                                empty(out, "w:p");
                                end(out, "w:tc");
                            }
                        }
                    }
                    end(out, "w:tr");
                }
                end(out, "w:tbl");
            }
            ElementKind::Cell => {
                start(out, "w:tc");
                empty(out, "w:tcPr");
                if n.children.is_empty() {
                    start(out, "w:p");
                    emit_run(out, &n.text);
                    end(out, "w:p");
                } else {
                    for &c in &n.children {
                        self.serialize_into(c, out);
                    }
                }
                end(out, "w:tc");
            }
            ElementKind::Image => {
                let img = n.image.as_ref();
                let name = img.map(|i| basename(&i.source)).unwrap_or_default();
                // 9525 EMU per pixel at 96dpi.
                let cx = img.map(|i| u64::from(i.width) * 9525).unwrap_or(0);
                let cy = img.map(|i| u64::from(i.height) * 9525).unwrap_or(0);
                start(out, "w:p");
                start(out, "w:r");
                start(out, "w:drawing");
                start(out, "wp:inline");
                out.push(XmlEvent::Empty {
                    name: "wp:extent".to_string(),
                    attrs: vec![
                        ("cx".to_string(), cx.to_string()),
                        ("cy".to_string(), cy.to_string()),
                    ],
                });
                out.push(XmlEvent::Empty {
                    name: "wp:docPr".to_string(),
                    attrs: vec![
                        ("id".to_string(), "1".to_string()),
                        ("name".to_string(), crate::xml::escape_attr(&name)),
                    ],
                });
                end(out, "wp:inline");
                end(out, "w:drawing");
                end(out, "w:r");
                end(out, "w:p");
            }
        }
    }
}

pub fn basename(source: &str) -> String {
    source
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source)
        .to_string()
}

fn start(out: &mut Vec<XmlEvent>, name: &str) {
    out.push(XmlEvent::Start {
        name: name.to_string(),
        attrs: vec![],
    });
}

fn end(out: &mut Vec<XmlEvent>, name: &str) {
    out.push(XmlEvent::End {
        name: name.to_string(),
    });
}

fn empty(out: &mut Vec<XmlEvent>, name: &str) {
    out.push(XmlEvent::Empty {
        name: name.to_string(),
        attrs: vec![],
    });
}

fn emit_run(out: &mut Vec<XmlEvent>, text: &str) {
    start(out, "w:r");
    let mut attrs = Vec::new();
    if text.starts_with(' ') || text.ends_with(' ') {
        attrs.push(("xml:space".to_string(), "preserve".to_string()));
    }
    out.push(XmlEvent::Start {
        name: "w:t".to_string(),
        attrs,
    });
    out.push(XmlEvent::Text {
        text: text.to_string(),
    });
    end(out, "w:t");
    end(out, "w:r");
}
