use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{map_zip_error, ArchiveErrorKind, Result, SdtError};

pub const BODY_PART: &str = "word/document.xml";
pub const SETTINGS_PART: &str = "word/settings.xml";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";

static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^word/header(\d+)\.xml$").expect("header part regex"));
static FOOTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^word/footer(\d+)\.xml$").expect("footer part regex"));

#[derive(Clone, Debug)]
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

#[derive(Clone, Debug)]
pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    pub fn read(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|e| SdtError::Archive {
            kind: ArchiveErrorKind::Open,
            detail: format!("{}: {e}", path.display()),
        })?;
        let mut zip = ZipArchive::new(f).map_err(|e| map_zip_error(e, false))?;
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).map_err(|e| map_zip_error(e, false))?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data).map_err(|e| SdtError::Archive {
                kind: ArchiveErrorKind::Read,
                detail: format!("{}: {e}", file.name()),
            })?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    /// Write the package to `output_path`, substituting the data of entries
    /// named in `replacements` and copying everything else byte-for-byte.
    pub fn write_with_replacements(
        &self,
        output_path: &Path,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> Result<()> {
        let f = File::create(output_path).map_err(|e| SdtError::Archive {
            kind: ArchiveErrorKind::Write,
            detail: format!("{}: {e}", output_path.display()),
        })?;
        let mut zout = ZipWriter::new(f);
        for ent in &self.entries {
            let data = replacements
                .get(&ent.name)
                .cloned()
                .unwrap_or_else(|| ent.data.clone());
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)
                    .map_err(|e| map_zip_error(e, true))?;
            } else {
                zout.start_file(&ent.name, opts)
                    .map_err(|e| map_zip_error(e, true))?;
                zout.write_all(&data).map_err(|e| SdtError::Archive {
                    kind: ArchiveErrorKind::Write,
                    detail: format!("{}: {e}", ent.name),
                })?;
            }
        }
        zout.finish().map_err(|e| map_zip_error(e, true))?;
        Ok(())
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn has_entry(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Append a new, deflate-compressed entry.
    pub fn add_entry(&mut self, name: &str, data: Vec<u8>) -> Result<()> {
        if self.has_entry(name) {
            return Err(SdtError::Archive {
                kind: ArchiveErrorKind::EntryExists,
                detail: name.to_string(),
            });
        }
        self.entries.push(DocxEntry {
            name: name.to_string(),
            data,
            compression: CompressionMethod::Deflated,
            last_modified: zip::DateTime::default(),
            unix_mode: None,
            is_dir: false,
        });
        Ok(())
    }

    /// Header part names, ordered by their numeric suffix.
    pub fn header_parts(&self) -> Vec<String> {
        numbered_parts(&self.entries, &HEADER_RE)
    }

    /// Footer part names, ordered by their numeric suffix.
    pub fn footer_parts(&self) -> Vec<String> {
        numbered_parts(&self.entries, &FOOTER_RE)
    }

    /// Body, then headers, then footers; the search order the mutation
    /// runtime uses.
    pub fn document_parts(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.has_entry(BODY_PART) {
            out.push(BODY_PART.to_string());
        }
        out.extend(self.header_parts());
        out.extend(self.footer_parts());
        out
    }
}

fn numbered_parts(entries: &[DocxEntry], re: &Regex) -> Vec<String> {
    let mut found: Vec<(u32, String)> = entries
        .iter()
        .filter_map(|e| {
            re.captures(&e.name).and_then(|c| {
                c.get(1)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .map(|n| (n, e.name.clone()))
            })
        })
        .collect();
    found.sort_by_key(|(n, _)| *n);
    found.into_iter().map(|(_, name)| name).collect()
}
