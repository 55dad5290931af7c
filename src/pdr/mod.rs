//! Product Delivery Record (PDR) parsing
//!
//! PDRs are written in PVL, a nested `KEY = VALUE` format with `OBJECT` and
//! `GROUP` blocks. [`parse`] builds the generic tree; [`Manifest`] turns it
//! into the file groups the dispatcher works with.

mod manifest;
mod parser;
mod tree;

pub use manifest::{FileGroup, FileSpec, Manifest, ManifestError};
pub use parser::{ParseError, parse};
pub use tree::{Attribute, NodeKind, PvlNode};
