//! Content-identity hashing. Elements and the XML nodes they serialized to
//! are compared through an 8-hex digest of kind + visible text + structural
//! shape, insensitive to run-level formatting. Caches are session state,
//! owned by whoever drives a pass, never process globals.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::model::{basename, ElementId, ElementKind, ElementTree};
use crate::tree::{NodeId, XmlTree};

/// Namespace for image identity UUIDs (v5 over `{basename}:{w}x{h}`).
const IMAGE_NS: Uuid = Uuid::from_u128(0x9bfa_1d6c_52e4_4a11_b378_62fa_0c2e_8d41);

const EMU_PER_PX: u64 = 9525;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub fingerprints: usize,
    pub markers: usize,
}

#[derive(Debug, Default)]
pub struct FingerprintCache {
    fingerprints: HashMap<ElementId, String>,
    markers: HashMap<ElementId, String>,
    next_marker_seq: u64,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic 8-hex content digest for an element.
    pub fn fingerprint(&mut self, tree: &ElementTree, id: ElementId) -> String {
        if let Some(hit) = self.fingerprints.get(&id) {
            return hit.clone();
        }
        let fp = digest8(&element_canon(tree, id));
        self.fingerprints.insert(id, fp.clone());
        fp
    }

    /// Per-object marker: the fingerprint plus a session-unique suffix.
    /// Same object, same marker; equal-content siblings differ only in the
    /// suffix.
    pub fn marker(&mut self, tree: &ElementTree, id: ElementId) -> String {
        if let Some(hit) = self.markers.get(&id) {
            return hit.clone();
        }
        let fp = self.fingerprint(tree, id);
        self.next_marker_seq += 1;
        let marker = format!("sdt:{fp}:{:06}", self.next_marker_seq);
        self.markers.insert(id, marker.clone());
        marker
    }

    pub fn clear(&mut self) {
        self.fingerprints.clear();
        self.markers.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            fingerprints: self.fingerprints.len(),
            markers: self.markers.len(),
        }
    }
}

/// Identity of an image: stable across repeated calls, distinct across
/// source files even at identical pixel dimensions.
pub fn image_fingerprint(source: &str, width: u32, height: u32) -> Uuid {
    let name = format!("{}:{}x{}", basename(source), width, height);
    Uuid::new_v5(&IMAGE_NS, name.as_bytes())
}

/// Digest for a serialized XML node, computed over the same canonical form
/// as [`FingerprintCache::fingerprint`]. `None` when the node is not a kind
/// the matching engine fingerprints.
pub fn xml_fingerprint(xml: &XmlTree, node: NodeId) -> Option<String> {
    xml_canon(xml, node).map(|c| digest8(&c))
}

fn digest8(canon: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canon.as_bytes());
    let hex = hex::encode(hasher.finalize());
    hex[..8].to_string()
}

pub(crate) fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_canon(tree: &ElementTree, id: ElementId) -> String {
    let text = collapse_ws(&tree.rendered_text(id));
    match tree.kind(id) {
        // Text and TextRun both serialize to a paragraph, so they share a
        // canonical form on purpose.
        ElementKind::Text | ElementKind::TextRun => format!("p|{text}"),
        ElementKind::Heading(depth) => {
            format!("p:{}|{text}", ElementKind::heading_style(depth))
        }
        ElementKind::Run => format!("r|{text}"),
        ElementKind::Table => {
            let (rows, cols) = tree.node(id).table_shape.unwrap_or((0, 0));
            format!("tbl:{rows}x{cols}|{text}")
        }
        ElementKind::Cell => {
            format!("tc:{}|{text}", tree.cell_paragraphs(id))
        }
        ElementKind::Image => match &tree.node(id).image {
            Some(img) => format!(
                "pic:{}",
                image_fingerprint(&img.source, img.width, img.height)
            ),
            None => "pic:".to_string(),
        },
    }
}

/// Direct children with content-control wrappers flattened away: a node
/// wrapped in `w:sdt` earlier in a pass counts the same as its bare form.
pub(crate) fn logical_children(xml: &XmlTree, node: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    for &c in xml.children(node) {
        if xml.name(c) == Some("w:sdt") {
            if let Some(slot) = xml.find_child(c, "w:sdtContent") {
                out.extend(logical_children(xml, slot));
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Rows and max columns of a serialized table, wrapper-transparent.
pub(crate) fn table_shape(xml: &XmlTree, tbl: NodeId) -> (usize, usize) {
    let rows: Vec<NodeId> = logical_children(xml, tbl)
        .into_iter()
        .filter(|&c| xml.name(c) == Some("w:tr"))
        .collect();
    let cols = rows
        .iter()
        .map(|&r| {
            logical_children(xml, r)
                .into_iter()
                .filter(|&c| xml.name(c) == Some("w:tc"))
                .count()
        })
        .max()
        .unwrap_or(0);
    (rows.len(), cols)
}

fn xml_canon(xml: &XmlTree, node: NodeId) -> Option<String> {
    let name = xml.name(node)?;
    let text = collapse_ws(&xml.visible_text(node));
    match name {
        "w:p" => {
            if let Some(drawing) = xml.find_all(node, "wp:docPr").first() {
                let img_name = xml.attr_unescaped(*drawing, "name").unwrap_or_default();
                let extent = xml.find_all(node, "wp:extent").first().copied();
                let px = |key: &str| -> u32 {
                    extent
                        .and_then(|e| xml.attr(e, key))
                        .and_then(|v| v.parse::<u64>().ok())
                        .map(|emu| (emu / EMU_PER_PX) as u32)
                        .unwrap_or(0)
                };
                return Some(format!(
                    "pic:{}",
                    image_fingerprint(&img_name, px("cx"), px("cy"))
                ));
            }
            match paragraph_style(xml, node) {
                Some(style) if is_heading_style(&style) => Some(format!("p:{style}|{text}")),
                _ => Some(format!("p|{text}")),
            }
        }
        "w:tbl" => {
            let (rows, cols) = table_shape(xml, node);
            Some(format!("tbl:{rows}x{cols}|{text}"))
        }
        "w:tc" => {
            let paras = logical_children(xml, node)
                .into_iter()
                .filter(|&c| xml.name(c) == Some("w:p"))
                .count();
            Some(format!("tc:{paras}|{text}"))
        }
        "w:r" => Some(format!("r|{text}")),
        _ => None,
    }
}

pub fn paragraph_style(xml: &XmlTree, para: NodeId) -> Option<String> {
    let ppr = xml.find_child(para, "w:pPr")?;
    let style = xml.find_child(ppr, "w:pStyle")?;
    xml.attr_unescaped(style, "w:val")
}

pub fn is_heading_style(style: &str) -> bool {
    style == "Title" || (style.starts_with("Heading") && style[7..].parse::<u8>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_xml_events;

    fn xml_tree(src: &str) -> XmlTree {
        let events = parse_xml_events("t.xml", src.as_bytes()).expect("parse");
        XmlTree::from_events("t.xml", &events).expect("tree")
    }

    #[test]
    fn fingerprint_is_deterministic_and_cached() {
        let mut tree = ElementTree::new();
        let e = tree.new_element(ElementKind::Text, "hello");
        let mut cache = FingerprintCache::new();
        let a = cache.fingerprint(&tree, e);
        let b = cache.fingerprint(&tree, e);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_eq!(cache.stats().fingerprints, 1);
    }

    #[test]
    fn equal_content_elements_share_fingerprints_but_not_markers() {
        let mut tree = ElementTree::new();
        let a = tree.new_element(ElementKind::Text, "same");
        let b = tree.new_element(ElementKind::Text, "same");
        let mut cache = FingerprintCache::new();
        assert_eq!(cache.fingerprint(&tree, a), cache.fingerprint(&tree, b));
        let ma = cache.marker(&tree, a);
        let mb = cache.marker(&tree, b);
        assert_ne!(ma, mb);
        assert!(ma.contains(&cache.fingerprint(&tree, a)));
        // Same object keeps its marker.
        assert_eq!(ma, cache.marker(&tree, a));
    }

    #[test]
    fn textrun_fingerprint_equals_equivalent_text() {
        let mut tree = ElementTree::new();
        let text = tree.new_element(ElementKind::Text, "hello world");
        let tr = tree.new_element(ElementKind::TextRun, "");
        let r1 = tree.new_element(ElementKind::Run, "hello ");
        let r2 = tree.new_element(ElementKind::Run, "world");
        tree.add_child(tr, r1);
        tree.add_child(tr, r2);
        let mut cache = FingerprintCache::new();
        assert_eq!(cache.fingerprint(&tree, text), cache.fingerprint(&tree, tr));
    }

    #[test]
    fn table_shape_distinguishes_fingerprints() {
        let mut tree = ElementTree::new();
        let t22 = tree.new_table(2, 2);
        let t33 = tree.new_table(3, 3);
        let mut cache = FingerprintCache::new();
        assert_ne!(cache.fingerprint(&tree, t22), cache.fingerprint(&tree, t33));
    }

    #[test]
    fn image_fingerprint_is_deterministic_and_source_sensitive() {
        let first = image_fingerprint("media/logo.png", 120, 80);
        for _ in 0..100 {
            assert_eq!(first, image_fingerprint("media/logo.png", 120, 80));
        }
        assert_ne!(first, image_fingerprint("media/other.png", 120, 80));
        assert_ne!(first, image_fingerprint("media/logo.png", 120, 81));
        // Basename only: directories do not change identity.
        assert_eq!(first, image_fingerprint("/tmp/media/logo.png", 120, 80));
    }

    #[test]
    fn element_and_xml_fingerprints_agree() {
        let mut tree = ElementTree::new();
        let e = tree.new_element(ElementKind::Text, "agree");
        let mut cache = FingerprintCache::new();

        let xml = xml_tree("<w:p><w:r><w:t>agree</w:t></w:r></w:p>");
        assert_eq!(
            xml_fingerprint(&xml, xml.root()).expect("canon"),
            cache.fingerprint(&tree, e)
        );

        let h = tree.new_element(ElementKind::Heading(2), "Section");
        let xml = xml_tree(
            "<w:p><w:pPr><w:pStyle w:val=\"Heading2\"/></w:pPr><w:r><w:t>Section</w:t></w:r></w:p>",
        );
        assert_eq!(
            xml_fingerprint(&xml, xml.root()).expect("canon"),
            cache.fingerprint(&tree, h)
        );
    }

    #[test]
    fn table_xml_fingerprint_agrees_with_element() {
        let mut tree = ElementTree::new();
        let tbl = tree.new_table(1, 2);
        let c1 = tree.new_element(ElementKind::Cell, "a");
        let c2 = tree.new_element(ElementKind::Cell, "b");
        tree.add_child(tbl, c1);
        tree.add_child(tbl, c2);
        let mut cache = FingerprintCache::new();

        let xml = xml_tree(
            "<w:tbl><w:tblPr/><w:tr><w:tc><w:tcPr/><w:p><w:r><w:t>a</w:t></w:r></w:p></w:tc>\
             <w:tc><w:tcPr/><w:p><w:r><w:t>b</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
        );
        assert_eq!(
            xml_fingerprint(&xml, xml.root()).expect("canon"),
            cache.fingerprint(&tree, tbl)
        );
    }

    #[test]
    fn wrapping_a_cell_does_not_change_the_table_fingerprint() {
        let mut tree = ElementTree::new();
        let tbl = tree.new_table(1, 2);
        let c1 = tree.new_element(ElementKind::Cell, "left");
        let c2 = tree.new_element(ElementKind::Cell, "right");
        tree.add_child(tbl, c1);
        tree.add_child(tbl, c2);
        let mut cache = FingerprintCache::new();

        let bare = xml_tree(
            "<w:tbl><w:tblPr/><w:tr>\
             <w:tc><w:tcPr/><w:p><w:r><w:t>left</w:t></w:r></w:p></w:tc>\
             <w:tc><w:tcPr/><w:p><w:r><w:t>right</w:t></w:r></w:p></w:tc>\
             </w:tr></w:tbl>",
        );
        let wrapped = xml_tree(
            "<w:tbl><w:tblPr/><w:tr>\
             <w:sdt><w:sdtPr><w:tag w:val=\"cell\"/></w:sdtPr><w:sdtContent>\
             <w:tc><w:tcPr/><w:p><w:r><w:t>left</w:t></w:r></w:p></w:tc>\
             </w:sdtContent></w:sdt>\
             <w:tc><w:tcPr/><w:p><w:r><w:t>right</w:t></w:r></w:p></w:tc>\
             </w:tr></w:tbl>",
        );
        let want = cache.fingerprint(&tree, tbl);
        assert_eq!(xml_fingerprint(&bare, bare.root()).as_deref(), Some(want.as_str()));
        assert_eq!(
            xml_fingerprint(&wrapped, wrapped.root()).as_deref(),
            Some(want.as_str())
        );
    }

    #[test]
    fn clear_resets_both_caches() {
        let mut tree = ElementTree::new();
        let e = tree.new_element(ElementKind::Text, "x");
        let mut cache = FingerprintCache::new();
        let _ = cache.marker(&tree, e);
        assert_eq!(
            cache.stats(),
            CacheStats {
                fingerprints: 1,
                markers: 1
            }
        );
        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
