//! # Spec Module
//!
//! Loading and structural checking of OpenAPI 3.0 and 3.1 documents.
//!
//! A [`Specification`] is parsed once at configuration time and never
//! mutated afterwards. Documents split over several files are bundled into
//! one by [`Specification::from_directory`].

mod check;
mod load;
mod model;
mod types;

pub use check::check_document;
pub use load::{bundle_document, read_document, Bundle};
pub use model::{OperationMatch, Specification};
pub(crate) use model::escape_pointer;
pub use types::*;

/// Operation keys of a path item.
pub const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];
