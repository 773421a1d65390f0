//! The tag-injection engine: takes a drafted package plus
//! (element, descriptor) pairs, re-finds each element's node and wraps it in
//! a `w:sdt` in place. Deeper targets wrap before shallower ones so a cell
//! wrap never invalidates the positional order of its table, and every wrap
//! is a single relocation.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::debug;

use crate::error::{Result, SdtError};
use crate::fingerprint::FingerprintCache;
use crate::locate::{locate, LocateOptions, PartRoot, ProcessedSet};
use crate::model::{ElementId, ElementKind, ElementTree, PartScope};
use crate::package::DocxPackage;
use crate::sdt::SdtDescriptor;
use crate::tree::XmlTree;
use crate::xml::{parse_xml_events, write_xml_events};

/// Wrap each element's serialized node in a content control, mutating the
/// package at `path` in place. Untouched parts stay byte-identical.
pub fn inject(
    path: &Path,
    elements: &ElementTree,
    pairs: &[(ElementId, SdtDescriptor)],
    cache: &mut FingerprintCache,
) -> Result<()> {
    // All input validation happens before any part is touched.
    for (element, desc) in pairs {
        let kind = elements.kind(*element);
        if kind == ElementKind::Run {
            return Err(SdtError::UnsupportedKind(kind));
        }
        if desc.is_run_level() && kind != ElementKind::Text {
            return Err(SdtError::InvalidInput(format!(
                "run-level placement requires a plain Text element, got {kind:?} for tag {:?}",
                desc.tag()
            )));
        }
        if elements.part_scope(*element).is_none() {
            return Err(SdtError::InvalidInput(format!(
                "element for tag {:?} is not attached to any part",
                desc.tag()
            )));
        }
    }

    let package = DocxPackage::read(path)?;

    let mut by_scope: BTreeMap<PartScope, Vec<usize>> = BTreeMap::new();
    for (i, (element, desc)) in pairs.iter().enumerate() {
        let scope = elements.part_scope(*element).ok_or_else(|| {
            SdtError::InvalidInput(format!(
                "element for tag {:?} is not attached to any part",
                desc.tag()
            ))
        })?;
        by_scope.entry(scope).or_default().push(i);
    }

    let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();
    for (scope, mut indices) in by_scope {
        let part_name = scope.part_name();
        let entry = package
            .entry(&part_name)
            .ok_or_else(|| SdtError::ElementNotFound {
                part: part_name.clone(),
                detail: "part not present in package".to_string(),
            })?;
        let events = parse_xml_events(&part_name, &entry.data)?;
        let mut xml = XmlTree::from_events(&part_name, &events)?;
        let mut marks = ProcessedSet::new();

        // Deepest first; stable, so same-depth pairs keep input order.
        indices.sort_by_key(|&i| std::cmp::Reverse(elements.depth(pairs[i].0)));

        for i in indices {
            let (element, desc) = &pairs[i];
            inject_one(&mut xml, elements, *element, desc, scope, &mut marks, cache)?;
        }

        replacements.insert(part_name.clone(), write_xml_events(&part_name, &xml.to_events())?);
        debug!("{part_name}: injected {} content control(s)", marks.len());
    }

    package.write_with_replacements(path, &replacements)
}

fn inject_one(
    xml: &mut XmlTree,
    elements: &ElementTree,
    element: ElementId,
    desc: &SdtDescriptor,
    scope: PartScope,
    marks: &mut ProcessedSet,
    cache: &mut FingerprintCache,
) -> Result<()> {
    let root = match scope {
        PartScope::Body => PartRoot::Body,
        PartScope::Header(_) => PartRoot::Header,
        PartScope::Footer(_) => PartRoot::Footer,
    };

    let not_found = |detail: String| SdtError::ElementNotFound {
        part: scope.part_name(),
        detail,
    };

    let mut opts = LocateOptions {
        root: Some(root),
        scope: None,
        inline_level: desc.is_inline_level(),
        run_level: desc.is_run_level(),
    };

    let order;
    if desc.is_inline_level() {
        let cell = enclosing_cell(elements, element).ok_or_else(|| {
            SdtError::InvalidInput(format!(
                "inline-level tag {:?} targets an element with no enclosing cell",
                desc.tag()
            ))
        })?;
        // Resolve the cell with a fresh mark set: a cell wrapped earlier in
        // this pass is still a valid scope for its own paragraphs.
        let cell_order = registration_order(elements, &elements.roots_of(scope), cell, None);
        let cell_node = locate(
            xml,
            elements,
            cell,
            cell_order,
            &LocateOptions {
                root: Some(root),
                ..Default::default()
            },
            &ProcessedSet::new(),
            cache,
        )?
        .ok_or_else(|| not_found(format!("enclosing cell for tag {:?}", desc.tag())))?;
        opts.scope = Some(cell_node);
        order = registration_order(elements, &elements.roots_of(scope), element, Some(cell));
    } else {
        order = registration_order(elements, &elements.roots_of(scope), element, None);
    }

    let target = locate(xml, elements, element, order, &opts, marks, cache)?
        .ok_or_else(|| {
            not_found(format!(
                "{:?} element for tag {:?} (order {order})",
                elements.kind(element),
                desc.tag()
            ))
        })?;

    let (wrapper, slot) = desc.build_wrapper(xml);
    xml.wrap(target, wrapper, slot)?;
    marks.mark(target);
    Ok(())
}

fn enclosing_cell(elements: &ElementTree, element: ElementId) -> Option<ElementId> {
    let mut cur = elements.node(element).parent;
    while let Some(p) = cur {
        if elements.kind(p) == ElementKind::Cell {
            return Some(p);
        }
        cur = elements.node(p).parent;
    }
    None
}

/// Count of same-kind elements preceding `target` in a top-to-bottom walk.
/// With `within`, the walk (and therefore the order) is local to that
/// subtree — the cell-local index used by inline-level placement.
fn registration_order(
    elements: &ElementTree,
    scope_roots: &[ElementId],
    target: ElementId,
    within: Option<ElementId>,
) -> usize {
    let kind = elements.kind(target);
    let mut count = 0;
    let mut stack: Vec<ElementId> = match within {
        Some(root) => elements.node(root).children.iter().rev().copied().collect(),
        None => scope_roots.iter().rev().copied().collect(),
    };
    while let Some(cur) = stack.pop() {
        if cur == target {
            return count;
        }
        if elements.kind(cur) == kind {
            count += 1;
        }
        for &c in elements.node(cur).children.iter().rev() {
            stack.push(c);
        }
    }
    count
}
