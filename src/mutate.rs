//! Post-save mutation runtime. Operates on a saved package plus tag names
//! only; upstream elements are needed solely when new content is inserted.
//! Parts parse lazily and re-serialize only when dirty.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{ArchiveErrorKind, Result, SdtError};
use crate::model::{ElementId, ElementTree};
use crate::package::{
    DocxPackage, CONTENT_TYPES_PART, DOCUMENT_RELS_PART, SETTINGS_PART,
};
use crate::tree::{NodeId, XmlTree};
use crate::xml::{parse_xml_events, write_xml_events};

const SETTINGS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml";
const SETTINGS_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/settings";
const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// One mutation session over a saved package. Single logical thread of
/// control only: the part cache and dirty set are unsynchronized state.
pub struct TaggedDocx {
    path: PathBuf,
    package: DocxPackage,
    parts: HashMap<String, XmlTree>,
    dirty: HashSet<String>,
}

impl TaggedDocx {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            package: DocxPackage::read(path)?,
            parts: HashMap::new(),
            dirty: HashSet::new(),
        })
    }

    fn ensure_part(&mut self, name: &str) -> Result<&mut XmlTree> {
        match self.parts.entry(name.to_string()) {
            Entry::Occupied(cached) => Ok(cached.into_mut()),
            Entry::Vacant(missing) => {
                let entry = self
                    .package
                    .entry(name)
                    .ok_or_else(|| SdtError::Archive {
                        kind: ArchiveErrorKind::MissingEntry,
                        detail: name.to_string(),
                    })?;
                let events = parse_xml_events(name, &entry.data)?;
                Ok(missing.insert(XmlTree::from_events(name, &events)?))
            }
        }
    }

    pub fn mark_modified(&mut self, part: &str) {
        self.dirty.insert(part.to_string());
    }

    /// First `w:sdt` carrying `tag`, searching body, then headers, then
    /// footers. `Ok(None)` when no part carries the tag.
    pub fn find_by_tag(&mut self, tag: &str) -> Result<Option<(String, NodeId)>> {
        for part in self.package.document_parts() {
            let tree = self.ensure_part(&part)?;
            if let Some(node) = find_sdt(tree, tag) {
                return Ok(Some((part, node)));
            }
        }
        Ok(None)
    }

    /// All tag names present in the package, per part, document order.
    pub fn tags(&mut self) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        for part in self.package.document_parts() {
            let tree = self.ensure_part(&part)?;
            for sdt in tree.find_all(tree.root(), "w:sdt") {
                if let Some(tag) = sdt_tag(tree, sdt) {
                    out.push((part.clone(), tag));
                }
            }
        }
        Ok(out)
    }

    /// Replace a tag's content with plain text. A single run is inserted —
    /// block-level controls get it inside a fresh paragraph; controls that
    /// wrap a run get the bare run. Edge whitespace is preserved via
    /// `xml:space`.
    pub fn replace_text(&mut self, tag: &str, text: &str) -> Result<()> {
        let (part, sdt) = self.require_tag(tag)?;
        let tree = self.ensure_part(&part)?;
        let slot = content_slot(tree, sdt);
        clear_children(tree, slot);
        insert_text(tree, sdt, slot, text);
        self.mark_modified(&part);
        Ok(())
    }

    /// Replace a tag's content with a serialized element from the upstream
    /// model.
    pub fn replace_element(
        &mut self,
        tag: &str,
        elements: &ElementTree,
        element: ElementId,
    ) -> Result<()> {
        let (part, sdt) = self.require_tag(tag)?;
        let fragment = elements.serialize(element);
        let tree = self.ensure_part(&part)?;
        let slot = content_slot(tree, sdt);
        clear_children(tree, slot);
        tree.graft_events(slot, &fragment)?;
        self.mark_modified(&part);
        Ok(())
    }

    /// Append a serialized element after the tag's existing content.
    pub fn append_element(
        &mut self,
        tag: &str,
        elements: &ElementTree,
        element: ElementId,
    ) -> Result<()> {
        let (part, sdt) = self.require_tag(tag)?;
        let fragment = elements.serialize(element);
        let tree = self.ensure_part(&part)?;
        let slot = content_slot(tree, sdt);
        tree.graft_events(slot, &fragment)?;
        self.mark_modified(&part);
        Ok(())
    }

    /// Empty a tag's content slot, leaving the wrapper in place.
    pub fn remove(&mut self, tag: &str) -> Result<()> {
        let (part, sdt) = self.require_tag(tag)?;
        let tree = self.ensure_part(&part)?;
        let slot = content_slot(tree, sdt);
        clear_children(tree, slot);
        self.mark_modified(&part);
        Ok(())
    }

    /// Overwrite the tag's value while keeping run formatting: the first
    /// text-bearing run keeps its properties and gets the new text, later
    /// text-bearing runs are dropped. Without any run, behaves like
    /// [`TaggedDocx::replace_text`]. Repeated calls never accumulate text.
    pub fn set_value(&mut self, tag: &str, text: &str) -> Result<()> {
        let (part, sdt) = self.require_tag(tag)?;
        let tree = self.ensure_part(&part)?;
        let slot = content_slot(tree, sdt);

        let text_runs: Vec<NodeId> = tree
            .find_all(slot, "w:r")
            .into_iter()
            .filter(|&r| !tree.find_all(r, "w:t").is_empty())
            .collect();

        match text_runs.split_first() {
            None => {
                clear_children(tree, slot);
                insert_text(tree, sdt, slot, text);
            }
            Some((&first, rest)) => {
                // The kept run may carry several w:t children; the new text
                // goes into the first and the rest are dropped outright.
                let wts = tree.find_all(first, "w:t");
                if let Some((&wt, extra)) = wts.split_first() {
                    clear_children(tree, wt);
                    let txt = tree.new_text(text);
                    tree.append_child(wt, txt);
                    if text.starts_with(' ') || text.ends_with(' ') {
                        tree.set_attr(wt, "xml:space", "preserve");
                    }
                    for &t in extra {
                        tree.detach(t);
                    }
                }
                for &r in rest {
                    tree.detach(r);
                }
            }
        }
        self.mark_modified(&part);
        Ok(())
    }

    /// Empty every tag's content slot across every part; returns the number
    /// of tags processed. With `block_editing`, also upserts read-only
    /// document protection into the settings part.
    pub fn remove_all(&mut self, block_editing: bool) -> Result<usize> {
        let mut count = 0;
        for part in self.package.document_parts() {
            let tree = self.ensure_part(&part)?;
            let sdts = tree.find_all(tree.root(), "w:sdt");
            if sdts.is_empty() {
                continue;
            }
            for sdt in sdts {
                let slot = content_slot(tree, sdt);
                clear_children(tree, slot);
                count += 1;
            }
            self.mark_modified(&part);
        }
        if block_editing {
            self.apply_write_protection()?;
        }
        debug!("removed content of {count} tag(s)");
        Ok(count)
    }

    /// Write the package back. Only dirty parts are re-serialized; every
    /// other entry is copied byte-for-byte.
    pub fn save(&mut self, output: Option<&Path>) -> Result<()> {
        let mut replacements = HashMap::new();
        for part in &self.dirty {
            let tree = self
                .parts
                .get(part)
                .ok_or_else(|| SdtError::Serialize {
                    part: part.clone(),
                    detail: "dirty part was never parsed".to_string(),
                })?;
            replacements.insert(part.clone(), write_xml_events(part, &tree.to_events())?);
        }
        let target = output.unwrap_or(&self.path);
        self.package.write_with_replacements(target, &replacements)
    }

    fn require_tag(&mut self, tag: &str) -> Result<(String, NodeId)> {
        self.find_by_tag(tag)?
            .ok_or_else(|| SdtError::TagNotFound(tag.to_string()))
    }

    fn apply_write_protection(&mut self) -> Result<()> {
        if !self.package.has_entry(SETTINGS_PART) {
            let minimal = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:settings xmlns:w="{W_NS}"/>"#
            );
            self.package.add_entry(SETTINGS_PART, minimal.into_bytes())?;
            self.register_settings_part()?;
        }
        let tree = self.ensure_part(SETTINGS_PART)?;
        let root = tree.root();
        let protection = match tree.find_child(root, "w:documentProtection") {
            Some(p) => p,
            None => {
                let p = tree.new_element("w:documentProtection", vec![]);
                tree.insert_child(root, 0, p);
                p
            }
        };
        tree.set_attr(protection, "w:edit", "readOnly");
        tree.set_attr(protection, "w:enforcement", "1");
        self.mark_modified(SETTINGS_PART);
        Ok(())
    }

    /// A settings part created from scratch needs its content-type override
    /// and a relationship from the main document, or consumers ignore it.
    fn register_settings_part(&mut self) -> Result<()> {
        if self.package.has_entry(CONTENT_TYPES_PART) {
            let tree = self.ensure_part(CONTENT_TYPES_PART)?;
            let root = tree.root();
            let already = tree.children(root).iter().any(|&c| {
                tree.name(c) == Some("Override")
                    && tree.attr_unescaped(c, "PartName").as_deref()
                        == Some("/word/settings.xml")
            });
            if !already {
                let ov = tree.new_element("Override", vec![]);
                tree.set_attr(ov, "PartName", "/word/settings.xml");
                tree.set_attr(ov, "ContentType", SETTINGS_CONTENT_TYPE);
                tree.append_child(root, ov);
                self.mark_modified(CONTENT_TYPES_PART);
            }
        }

        if self.package.has_entry(DOCUMENT_RELS_PART) {
            let tree = self.ensure_part(DOCUMENT_RELS_PART)?;
            let root = tree.root();
            let already = tree.children(root).iter().any(|&c| {
                tree.attr_unescaped(c, "Target").as_deref() == Some("settings.xml")
            });
            if !already {
                let next = tree
                    .children(root)
                    .iter()
                    .filter_map(|&c| tree.attr_unescaped(c, "Id"))
                    .filter_map(|id| id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
                    .max()
                    .unwrap_or(0)
                    + 1;
                let rel = tree.new_element("Relationship", vec![]);
                tree.set_attr(rel, "Id", &format!("rId{next}"));
                tree.set_attr(rel, "Type", SETTINGS_REL_TYPE);
                tree.set_attr(rel, "Target", "settings.xml");
                tree.append_child(root, rel);
                self.mark_modified(DOCUMENT_RELS_PART);
            }
        } else {
            let rels = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{SETTINGS_REL_TYPE}" Target="settings.xml"/></Relationships>"#
            );
            self.package.add_entry(DOCUMENT_RELS_PART, rels.into_bytes())?;
        }
        Ok(())
    }
}

fn sdt_tag(tree: &XmlTree, sdt: NodeId) -> Option<String> {
    let pr = tree.find_child(sdt, "w:sdtPr")?;
    let tag = tree.find_child(pr, "w:tag")?;
    tree.attr_unescaped(tag, "w:val")
}

fn find_sdt(tree: &XmlTree, tag: &str) -> Option<NodeId> {
    tree.find_all(tree.root(), "w:sdt")
        .into_iter()
        .find(|&sdt| sdt_tag(tree, sdt).as_deref() == Some(tag))
}

fn content_slot(tree: &mut XmlTree, sdt: NodeId) -> NodeId {
    match tree.find_child(sdt, "w:sdtContent") {
        Some(slot) => slot,
        None => {
            let slot = tree.new_element("w:sdtContent", vec![]);
            tree.append_child(sdt, slot);
            slot
        }
    }
}

fn clear_children(tree: &mut XmlTree, id: NodeId) {
    for child in tree.children(id).to_vec() {
        tree.detach(child);
    }
}

/// A control wrapping a run sits inside a paragraph; anything else gets
/// block-level content.
fn slot_is_inline(tree: &XmlTree, sdt: NodeId) -> bool {
    tree.ancestors(sdt)
        .iter()
        .any(|&a| tree.name(a) == Some("w:p"))
}

fn insert_text(tree: &mut XmlTree, sdt: NodeId, slot: NodeId, text: &str) {
    let run = make_run(tree, text);
    if slot_is_inline(tree, sdt) {
        tree.append_child(slot, run);
    } else {
        let para = tree.new_element("w:p", vec![]);
        tree.append_child(para, run);
        tree.append_child(slot, para);
    }
}

fn make_run(tree: &mut XmlTree, text: &str) -> NodeId {
    let run = tree.new_element("w:r", vec![]);
    let wt = tree.new_element("w:t", vec![]);
    if text.starts_with(' ') || text.ends_with(' ') {
        tree.set_attr(wt, "xml:space", "preserve");
    }
    let txt = tree.new_text(text);
    tree.append_child(wt, txt);
    tree.append_child(run, wt);
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::fingerprint::FingerprintCache;
    use crate::inject::inject;
    use crate::model::{ElementKind, PartScope};
    use crate::package::DocxEntry;
    use crate::sdt::{SdtDescriptor, SdtType};
    use crate::testutil::write_draft;

    fn descriptor(id: &str, tag: &str) -> SdtDescriptor {
        SdtDescriptor::new(id, "", tag, SdtType::RichText).expect("descriptor")
    }

    /// Draft a package with tagged paragraphs `(tag, text)` and return its
    /// path inside `dir`.
    fn tagged_package(dir: &Path, paras: &[(&str, &str)]) -> std::path::PathBuf {
        let mut elements = ElementTree::new();
        let mut pairs = Vec::new();
        for (i, (tag, text)) in paras.iter().enumerate() {
            let e = elements.new_element(ElementKind::Text, text);
            elements.attach_root(e, PartScope::Body);
            pairs.push((e, descriptor(&format!("1000000{i}"), tag)));
        }
        let path = dir.join("doc.docx");
        write_draft(&path, &elements);
        let mut cache = FingerprintCache::new();
        inject(&path, &elements, &pairs, &mut cache).expect("inject");
        path
    }

    fn body_string(path: &Path) -> String {
        let pkg = DocxPackage::read(path).expect("read");
        String::from_utf8(pkg.entry("word/document.xml").expect("doc").data.clone())
            .expect("utf8")
    }

    #[test]
    fn finds_tag_and_reports_absence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = tagged_package(dir.path(), &[("client", "Acme")]);
        let mut doc = TaggedDocx::open(&path).expect("open");

        let hit = doc.find_by_tag("client").expect("find");
        assert_eq!(hit.expect("present").0, "word/document.xml");
        assert!(doc.find_by_tag("absent").expect("find").is_none());
        assert!(matches!(
            doc.replace_text("absent", "x").unwrap_err(),
            SdtError::TagNotFound(_)
        ));
    }

    #[test]
    fn replace_text_escapes_and_preserves_edge_whitespace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = tagged_package(dir.path(), &[("client", "placeholder")]);
        let mut doc = TaggedDocx::open(&path).expect("open");
        doc.replace_text("client", " a < b ").expect("replace");
        doc.save(None).expect("save");

        let body = body_string(&path);
        assert!(body.contains("xml:space=\"preserve\""));
        assert!(body.contains(" a &lt; b "));
        assert!(!body.contains("placeholder"));
    }

    #[test]
    fn replace_element_swaps_placeholder_for_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = tagged_package(dir.path(), &[("slot", "Old content to be replaced")]);

        let mut elements = ElementTree::new();
        let tbl = elements.new_table(1, 1);
        let cell = elements.new_element(ElementKind::Cell, "fresh cell text");
        elements.add_child(tbl, cell);

        let mut doc = TaggedDocx::open(&path).expect("open");
        doc.replace_element("slot", &elements, tbl).expect("replace");
        doc.save(None).expect("save");

        let body = body_string(&path);
        assert!(!body.contains("Old content to be replaced"));
        assert!(body.contains("<w:tbl>"));
        assert!(body.contains("fresh cell text"));
    }

    #[test]
    fn append_keeps_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = tagged_package(dir.path(), &[("log", "entry one")]);

        let mut elements = ElementTree::new();
        let extra = elements.new_element(ElementKind::Text, "entry two");

        let mut doc = TaggedDocx::open(&path).expect("open");
        doc.append_element("log", &elements, extra).expect("append");
        doc.save(None).expect("save");

        let body = body_string(&path);
        assert!(body.contains("entry one"));
        assert!(body.contains("entry two"));
    }

    #[test]
    fn remove_empties_slot_but_keeps_wrapper() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = tagged_package(dir.path(), &[("gone", "visible text")]);
        let mut doc = TaggedDocx::open(&path).expect("open");
        doc.remove("gone").expect("remove");
        doc.save(None).expect("save");

        let body = body_string(&path);
        assert!(!body.contains("visible text"));
        assert!(body.contains("w:sdt"));
        assert!(body.contains("\"gone\"") || body.contains("w:val=\"gone\""));
    }

    #[test]
    fn set_value_round_trip_leaves_single_text_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = tagged_package(dir.path(), &[("field", "initial")]);
        let mut doc = TaggedDocx::open(&path).expect("open");
        doc.set_value("field", "X").expect("set X");
        doc.set_value("field", "Y").expect("set Y");
        doc.save(None).expect("save");

        let mut doc = TaggedDocx::open(&path).expect("reopen");
        let (part, sdt) = doc.find_by_tag("field").expect("find").expect("present");
        let tree = doc.ensure_part(&part).expect("part");
        let slot = tree.find_child(sdt, "w:sdtContent").expect("slot");
        let text_runs: Vec<_> = tree
            .find_all(slot, "w:r")
            .into_iter()
            .filter(|&r| !tree.find_all(r, "w:t").is_empty())
            .collect();
        assert_eq!(text_runs.len(), 1);
        assert_eq!(tree.visible_text(slot), "Y");
    }

    #[test]
    fn set_value_preserves_run_formatting() {
        // Hand-built part: the tagged run carries rPr that must survive.
        let body = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="ns"><w:body><w:p><w:sdt><w:sdtPr><w:id w:val="10000001"/><w:tag w:val="styled"/></w:sdtPr><w:sdtContent><w:r><w:rPr><w:b/></w:rPr><w:t>old</w:t></w:r><w:r><w:t>tail</w:t></w:r></w:sdtContent></w:sdt></w:p></w:body></w:document>"#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.docx");
        let pkg = DocxPackage {
            entries: vec![DocxEntry {
                name: "word/document.xml".to_string(),
                data: body.to_vec(),
                compression: zip::CompressionMethod::Deflated,
                last_modified: zip::DateTime::default(),
                unix_mode: None,
                is_dir: false,
            }],
        };
        pkg.write_with_replacements(&path, &HashMap::new())
            .expect("write");

        let mut doc = TaggedDocx::open(&path).expect("open");
        doc.set_value("styled", "new").expect("set");
        doc.save(None).expect("save");

        let out = body_string(&path);
        assert!(out.contains("<w:b/>"));
        assert!(out.contains("<w:t>new</w:t>"));
        assert!(!out.contains("old"));
        assert!(!out.contains("tail"));
    }

    #[test]
    fn set_value_replaces_every_text_node_of_the_kept_run() {
        // One run, two w:t children: both old texts must go.
        let body = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="ns"><w:body><w:p><w:sdt><w:sdtPr><w:id w:val="10000001"/><w:tag w:val="split"/></w:sdtPr><w:sdtContent><w:r><w:rPr><w:i/></w:rPr><w:t>first half</w:t><w:t>second half</w:t></w:r></w:sdtContent></w:sdt></w:p></w:body></w:document>"#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.docx");
        let pkg = DocxPackage {
            entries: vec![DocxEntry {
                name: "word/document.xml".to_string(),
                data: body.to_vec(),
                compression: zip::CompressionMethod::Deflated,
                last_modified: zip::DateTime::default(),
                unix_mode: None,
                is_dir: false,
            }],
        };
        pkg.write_with_replacements(&path, &HashMap::new())
            .expect("write");

        let mut doc = TaggedDocx::open(&path).expect("open");
        doc.set_value("split", "whole").expect("set");
        doc.save(None).expect("save");

        let out = body_string(&path);
        assert!(out.contains("<w:i/>"));
        assert!(out.contains("<w:t>whole</w:t>"));
        assert!(!out.contains("first half"));
        assert!(!out.contains("second half"));
        assert_eq!(out.matches("<w:t>").count(), 1);
    }

    #[test]
    fn remove_all_counts_tags_and_blocks_editing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = tagged_package(
            dir.path(),
            &[("one", "a"), ("two", "b"), ("three", "c")],
        );

        // Seed a settings part with prior content that must survive.
        let pkg = DocxPackage::read(&path).expect("read");
        let mut entries = pkg.entries;
        entries.push(DocxEntry {
            name: SETTINGS_PART.to_string(),
            data: format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:settings xmlns:w="{W_NS}"><w:zoom w:percent="150"/></w:settings>"#
            )
            .into_bytes(),
            compression: zip::CompressionMethod::Deflated,
            last_modified: zip::DateTime::default(),
            unix_mode: None,
            is_dir: false,
        });
        DocxPackage { entries }
            .write_with_replacements(&path, &HashMap::new())
            .expect("write");

        let mut doc = TaggedDocx::open(&path).expect("open");
        let count = doc.remove_all(true).expect("remove all");
        assert_eq!(count, 3);
        doc.save(None).expect("save");

        let pkg = DocxPackage::read(&path).expect("read");
        let settings =
            String::from_utf8(pkg.entry(SETTINGS_PART).expect("settings").data.clone())
                .expect("utf8");
        assert!(settings.contains("w:documentProtection"));
        assert!(settings.contains("w:edit=\"readOnly\""));
        assert!(settings.contains("w:enforcement=\"1\""));
        assert!(settings.contains("w:zoom"));

        let body = body_string(&path);
        assert!(!body.contains("<w:t>a</w:t>"));
    }

    #[test]
    fn remove_all_creates_and_registers_settings_part() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = tagged_package(dir.path(), &[("only", "x")]);

        let mut doc = TaggedDocx::open(&path).expect("open");
        assert_eq!(doc.remove_all(true).expect("remove all"), 1);
        doc.save(None).expect("save");

        let pkg = DocxPackage::read(&path).expect("read");
        assert!(pkg.has_entry(SETTINGS_PART));
        let types = String::from_utf8(
            pkg.entry(CONTENT_TYPES_PART).expect("types").data.clone(),
        )
        .expect("utf8");
        assert!(types.contains("/word/settings.xml"));
        let rels =
            String::from_utf8(pkg.entry(DOCUMENT_RELS_PART).expect("rels").data.clone())
                .expect("utf8");
        assert!(rels.contains("settings.xml"));
    }

    #[test]
    fn save_leaves_untouched_parts_byte_identical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = tagged_package(dir.path(), &[("a", "one")]);
        let before = DocxPackage::read(&path).expect("read");
        let types_before = before.entry(CONTENT_TYPES_PART).expect("types").data.clone();

        let out = dir.path().join("out.docx");
        let mut doc = TaggedDocx::open(&path).expect("open");
        doc.replace_text("a", "changed").expect("replace");
        doc.save(Some(&out)).expect("save");

        let after = DocxPackage::read(&out).expect("read");
        assert_eq!(
            after.entry(CONTENT_TYPES_PART).expect("types").data,
            types_before
        );
        assert!(String::from_utf8(after.entry("word/document.xml").expect("doc").data.clone())
            .expect("utf8")
            .contains("changed"));
        // Original untouched when saving elsewhere.
        assert!(body_string(&path).contains("one"));
    }

    #[test]
    fn body_wins_over_header_for_duplicate_tags() {
        let mut elements = ElementTree::new();
        let b = elements.new_element(ElementKind::Text, "body copy");
        let h = elements.new_element(ElementKind::Text, "header copy");
        elements.attach_root(b, PartScope::Body);
        elements.attach_root(h, PartScope::Header(1));

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.docx");
        write_draft(&path, &elements);
        let pairs = vec![
            (b, descriptor("10000001", "shared")),
            (h, descriptor("10000002", "shared")),
        ];
        let mut cache = FingerprintCache::new();
        inject(&path, &elements, &pairs, &mut cache).expect("inject");

        let mut doc = TaggedDocx::open(&path).expect("open");
        let (part, _) = doc.find_by_tag("shared").expect("find").expect("present");
        assert_eq!(part, "word/document.xml");

        let tags = doc.tags().expect("tags");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].0, "word/document.xml");
        assert_eq!(tags[1].0, "word/header1.xml");
    }
}
