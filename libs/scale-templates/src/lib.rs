//! Template Store: a versioned registry of known scale protocol templates.
//!
//! Holds the built-in manufacturer templates plus any learned by the
//! Discovery Engine, ordered by effective priority so the highest-scoring
//! candidate is tried first during protocol matching.

mod store;

pub use store::TemplateStore;
