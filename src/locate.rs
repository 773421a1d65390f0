//! Re-finds the XML node an in-memory element serialized to. Primary match
//! is positional (the `(order+1)`-th unmarked candidate of the right node
//! type, validated against the element's rendered text); when that misses,
//! a fingerprint scan over the remaining candidates decides.

use std::collections::HashSet;

use log::debug;

use crate::error::{Result, SdtError};
use crate::fingerprint::{
    collapse_ws, is_heading_style, paragraph_style, table_shape, xml_fingerprint,
    FingerprintCache,
};
use crate::model::{basename, ElementId, ElementKind, ElementTree};
use crate::tree::{NodeId, XmlTree};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartRoot {
    Body,
    Header,
    Footer,
}

/// Nodes wrapped earlier in the same injection pass. Kept beside the tree,
/// not on it; a node counts as marked when it or an ancestor is in the set.
#[derive(Debug, Default)]
pub struct ProcessedSet {
    marked: HashSet<NodeId>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, id: NodeId) {
        self.marked.insert(id);
    }

    pub fn is_under(&self, xml: &XmlTree, id: NodeId) -> bool {
        if self.marked.contains(&id) {
            return true;
        }
        xml.ancestors(id).iter().any(|a| self.marked.contains(a))
    }

    pub fn len(&self) -> usize {
        self.marked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LocateOptions {
    /// Part root override; inferred from the tree's root element when unset.
    pub root: Option<PartRoot>,
    /// Enclosing cell for inline-level searches.
    pub scope: Option<NodeId>,
    pub inline_level: bool,
    pub run_level: bool,
}

/// Resolve the part root from the root element name of a parsed part.
pub fn infer_root(xml: &XmlTree) -> PartRoot {
    match xml.name(xml.root()) {
        Some("w:hdr") => PartRoot::Header,
        Some("w:ftr") => PartRoot::Footer,
        _ => PartRoot::Body,
    }
}

pub fn locate(
    xml: &XmlTree,
    elements: &ElementTree,
    element: ElementId,
    order: usize,
    opts: &LocateOptions,
    marks: &ProcessedSet,
    cache: &mut FingerprintCache,
) -> Result<Option<NodeId>> {
    let kind = elements.kind(element);
    if kind == ElementKind::Run {
        // Bare runs have no standalone node query; they are reachable only
        // through run-level placement on a Text element.
        return Err(SdtError::UnsupportedKind(kind));
    }

    let root = opts.root.unwrap_or_else(|| infer_root(xml));
    if matches!(kind, ElementKind::Heading(_)) && root != PartRoot::Body {
        return Ok(None);
    }

    let search_root = if opts.inline_level {
        match opts.scope {
            Some(cell) => cell,
            None => {
                return Err(SdtError::InvalidInput(
                    "inline-level locate requires an enclosing cell scope".to_string(),
                ))
            }
        }
    } else {
        xml.root()
    };

    let candidates: Vec<NodeId> = xml
        .descendants(search_root)
        .into_iter()
        .filter(|&n| matches_kind(xml, n, kind))
        .filter(|&n| !marks.is_under(xml, n))
        .collect();

    let located = match candidates.get(order).copied() {
        Some(primary) if validate(xml, primary, elements, element) => Some(primary),
        _ => {
            let want = cache.fingerprint(elements, element);
            debug!(
                "{}: order {} missed for {:?}, fingerprint fallback over {} candidate(s)",
                xml.part_name,
                order,
                kind,
                candidates.len()
            );
            candidates
                .iter()
                .copied()
                .find(|&n| xml_fingerprint(xml, n).as_deref() == Some(want.as_str()))
        }
    };

    let Some(node) = located else {
        return Ok(None);
    };

    if opts.run_level && kind == ElementKind::Text {
        let container = if opts.inline_level {
            search_root
        } else {
            node
        };
        return Ok(refine_to_run(xml, elements, element, container, marks));
    }
    Ok(Some(node))
}

fn refine_to_run(
    xml: &XmlTree,
    elements: &ElementTree,
    element: ElementId,
    container: NodeId,
    marks: &ProcessedSet,
) -> Option<NodeId> {
    let want = collapse_ws(&elements.rendered_text(element));
    let runs: Vec<NodeId> = xml
        .find_all(container, "w:r")
        .into_iter()
        .filter(|&r| !marks.is_under(xml, r))
        .collect();
    runs.iter()
        .copied()
        .find(|&r| collapse_ws(&xml.visible_text(r)) == want)
        .or_else(|| runs.first().copied())
}

fn matches_kind(xml: &XmlTree, node: NodeId, kind: ElementKind) -> bool {
    let Some(name) = xml.name(node) else {
        return false;
    };
    match kind {
        ElementKind::Text | ElementKind::TextRun => {
            name == "w:p" && !is_picture_paragraph(xml, node) && !is_heading_paragraph(xml, node)
        }
        ElementKind::Heading(depth) => {
            name == "w:p"
                && paragraph_style(xml, node).as_deref()
                    == Some(ElementKind::heading_style(depth).as_str())
        }
        ElementKind::Image => name == "w:p" && is_picture_paragraph(xml, node),
        ElementKind::Table => name == "w:tbl",
        ElementKind::Cell => name == "w:tc",
        ElementKind::Run => false,
    }
}

fn is_picture_paragraph(xml: &XmlTree, para: NodeId) -> bool {
    !xml.find_all(para, "w:drawing").is_empty()
}

fn is_heading_paragraph(xml: &XmlTree, para: NodeId) -> bool {
    paragraph_style(xml, para).is_some_and(|s| is_heading_style(&s))
}

/// Cheap order-candidate validation: rendered text (or the image name)
/// must line up with the element before a positional match is accepted.
fn validate(xml: &XmlTree, node: NodeId, elements: &ElementTree, element: ElementId) -> bool {
    match elements.kind(element) {
        ElementKind::Image => {
            let want = elements
                .node(element)
                .image
                .as_ref()
                .map(|i| basename(&i.source))
                .unwrap_or_default();
            xml.find_all(node, "wp:docPr")
                .first()
                .and_then(|&d| xml.attr_unescaped(d, "name"))
                .is_some_and(|got| got == want)
        }
        ElementKind::Table => {
            let shape = elements.node(element).table_shape.unwrap_or((0, 0));
            table_shape(xml, node) == shape
                && collapse_ws(&xml.visible_text(node))
                    == collapse_ws(&elements.rendered_text(element))
        }
        _ => {
            collapse_ws(&xml.visible_text(node))
                == collapse_ws(&elements.rendered_text(element))
        }
    }
}
