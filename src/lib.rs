//! Retrofit structured content controls (`w:sdt`) into DOCX packages built
//! by an external authoring library, then find and mutate the tagged
//! regions in the saved package by stable tag name.
//!
//! The engines share one invariant: document content is never duplicated
//! or lost. Every wrap is a single relocation, duplicate content is
//! disambiguated by fingerprint, and only dirty parts are re-serialized.

pub mod error;
pub mod fingerprint;
pub mod inject;
pub mod locate;
pub mod model;
pub mod mutate;
pub mod package;
pub mod registry;
pub mod sdt;
pub mod tree;
pub mod xml;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{ArchiveErrorKind, Result, SdtError};
pub use fingerprint::{image_fingerprint, CacheStats, FingerprintCache};
pub use inject::inject;
pub use locate::{locate, LocateOptions, PartRoot, ProcessedSet};
pub use model::{ElementId, ElementKind, ElementNode, ElementTree, ImageProps, PartScope};
pub use mutate::TaggedDocx;
pub use package::DocxPackage;
pub use registry::IdRegistry;
pub use sdt::{SdtDescriptor, SdtLock, SdtType};
