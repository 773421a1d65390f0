//! Test-only helpers that play the role of the external builder: serialize
//! an element tree into a draft package on disk.

use std::collections::HashMap;
use std::path::Path;

use zip::CompressionMethod;

use crate::model::{ElementTree, PartScope};
use crate::package::{DocxEntry, DocxPackage};
use crate::xml::{write_xml_events, XmlEvent};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

pub(crate) fn part_bytes(elements: &ElementTree, scope: PartScope) -> Vec<u8> {
    let (root, inner): (&str, Option<&str>) = match scope {
        PartScope::Body => ("w:document", Some("w:body")),
        PartScope::Header(_) => ("w:hdr", None),
        PartScope::Footer(_) => ("w:ftr", None),
    };

    let mut events = vec![
        XmlEvent::Decl {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: Some("yes".to_string()),
        },
        XmlEvent::Start {
            name: root.to_string(),
            attrs: vec![("xmlns:w".to_string(), W_NS.to_string())],
        },
    ];
    if let Some(inner) = inner {
        events.push(XmlEvent::Start {
            name: inner.to_string(),
            attrs: vec![],
        });
    }
    for id in elements.roots_of(scope) {
        events.extend(elements.serialize(id));
    }
    if let Some(inner) = inner {
        events.push(XmlEvent::End {
            name: inner.to_string(),
        });
    }
    events.push(XmlEvent::End {
        name: root.to_string(),
    });

    write_xml_events(&scope.part_name(), &events).expect("serialize draft part")
}

pub(crate) fn write_draft(path: &Path, elements: &ElementTree) {
    let mut entries = vec![entry(
        "[Content_Types].xml",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#
            .to_vec(),
    )];

    let mut scopes = elements.scopes();
    if !scopes.contains(&PartScope::Body) {
        scopes.insert(0, PartScope::Body);
    }
    for scope in scopes {
        entries.push(entry(&scope.part_name(), part_bytes(elements, scope)));
    }

    let pkg = DocxPackage { entries };
    pkg.write_with_replacements(path, &HashMap::new())
        .expect("write draft package");
}

fn entry(name: &str, data: impl Into<Vec<u8>>) -> DocxEntry {
    DocxEntry {
        name: name.to_string(),
        data: data.into(),
        compression: CompressionMethod::Deflated,
        last_modified: zip::DateTime::default(),
        unix_mode: None,
        is_dir: false,
    }
}
