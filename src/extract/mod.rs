//! Structured extraction: selector matching, element records, field
//! projection and nested-data navigation.

pub mod field;
pub mod navigate;
pub mod record;
pub mod selector;
pub mod xpath;

pub use field::{ExtractMode, FieldRule, FieldType, project};
pub use navigate::{PathKind, PathSegment, resolve};
pub use record::{ElementRecord, Extraction, extract, extract_attributes};
pub use selector::SelectorRule;
pub use xpath::XPath;
