//! Content-control descriptors and the `w:sdt` wrapper shape.

use crate::error::{Result, SdtError};
use crate::registry::validate_id;
use crate::tree::{NodeId, XmlTree};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdtType {
    RichText,
    PlainText,
    Group,
    Picture,
}

impl SdtType {
    fn marker_element(self) -> &'static str {
        match self {
            SdtType::RichText => "w:richText",
            SdtType::PlainText => "w:text",
            SdtType::Group => "w:group",
            SdtType::Picture => "w:picture",
        }
    }
}

/// Lock mode written to `w:lock/@w:val`. `None` emits no lock element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SdtLock {
    #[default]
    None,
    SdtLocked,
    ContentLocked,
    SdtContentLocked,
}

impl SdtLock {
    fn value(self) -> Option<&'static str> {
        match self {
            SdtLock::None => None,
            SdtLock::SdtLocked => Some("sdtLocked"),
            SdtLock::ContentLocked => Some("contentLocked"),
            SdtLock::SdtContentLocked => Some("sdtContentLocked"),
        }
    }
}

/// Immutable description of one content control to inject. Placement flags
/// are orthogonal: `inline_level` targets a cell-local paragraph,
/// `run_level` targets a single text run (plain Text elements only,
/// enforced at inject time).
#[derive(Clone, Debug)]
pub struct SdtDescriptor {
    id: String,
    alias: String,
    tag: String,
    ty: SdtType,
    lock: SdtLock,
    inline_level: bool,
    run_level: bool,
}

impl SdtDescriptor {
    pub fn new(id: &str, alias: &str, tag: &str, ty: SdtType) -> Result<Self> {
        validate_id(id)?;
        if tag.is_empty() {
            return Err(SdtError::InvalidInput("empty tag".to_string()));
        }
        Ok(Self {
            id: id.to_string(),
            alias: alias.to_string(),
            tag: tag.to_string(),
            ty,
            lock: SdtLock::None,
            inline_level: false,
            run_level: false,
        })
    }

    pub fn with_lock(mut self, lock: SdtLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn inline_level(mut self) -> Self {
        self.inline_level = true;
        self
    }

    pub fn run_level(mut self) -> Self {
        self.run_level = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn ty(&self) -> SdtType {
        self.ty
    }

    pub fn lock(&self) -> SdtLock {
        self.lock
    }

    pub fn is_inline_level(&self) -> bool {
        self.inline_level
    }

    pub fn is_run_level(&self) -> bool {
        self.run_level
    }

    /// Build the detached wrapper subtree `w:sdt > (w:sdtPr, w:sdtContent)`
    /// in `xml`; returns the wrapper and its content slot.
    pub fn build_wrapper(&self, xml: &mut XmlTree) -> (NodeId, NodeId) {
        let sdt = xml.new_element("w:sdt", vec![]);
        let pr = xml.new_element("w:sdtPr", vec![]);
        xml.append_child(sdt, pr);

        let id = xml.new_element("w:id", vec![]);
        xml.set_attr(id, "w:val", &self.id);
        xml.append_child(pr, id);

        if !self.alias.is_empty() {
            let alias = xml.new_element("w:alias", vec![]);
            xml.set_attr(alias, "w:val", &self.alias);
            xml.append_child(pr, alias);
        }

        let tag = xml.new_element("w:tag", vec![]);
        xml.set_attr(tag, "w:val", &self.tag);
        xml.append_child(pr, tag);

        if let Some(lock) = self.lock.value() {
            let lock_el = xml.new_element("w:lock", vec![]);
            xml.set_attr(lock_el, "w:val", lock);
            xml.append_child(pr, lock_el);
        }

        let marker = xml.new_element(self.ty.marker_element(), vec![]);
        xml.append_child(pr, marker);

        let content = xml.new_element("w:sdtContent", vec![]);
        xml.append_child(sdt, content);
        (sdt, content)
    }
}
