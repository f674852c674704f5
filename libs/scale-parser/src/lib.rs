//! Frame Parser: applies a [`Template`](scale_model::Template) to a decoded
//! frame and extracts typed field values.

mod parser;
mod value;

pub use parser::parse_frame;
pub use value::{FieldValue, ParsedFrame};
