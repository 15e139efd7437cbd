//! Core document primitives: the PDF object model, the container that loads
//! and incrementally re-serializes documents, associated-file embedding and
//! digest helpers.
//!
//! This crate has no CLI, crypto-library or network dependencies.

pub mod attach;
pub mod container;
pub mod digest;
pub mod error;
mod filters;
pub mod nametree;
pub mod object;
mod parser;
pub mod pdf;
pub mod types;
mod writer;
pub mod xref;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use attach::{
    Attachment, EmbeddedFile, Relationship, associated_files, attach, attach_with,
    find_embedded_file,
};
pub use container::{Container, SerializeMode, SerializedContainer, Slot};
pub use digest::{DigestAlgorithm, compute_digest, compute_digest_over, encode_sri};
pub use error::{Error, Result};
pub use object::{Dictionary, Object, ObjectId, Stream, StringFormat};
pub use pdf::{find_eof_offset, find_subslice, rfind_subslice};
pub use types::*;
pub use xref::XrefKind;
