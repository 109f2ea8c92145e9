//! View Queries
//!
//! Design documents expose named views; a view is looked up by name and
//! resolved against the current topology to a request URI. Executing the
//! HTTP request is up to the caller.

pub mod document;
pub mod query;

pub use document::{Document, ViewDefinition, ViewInvoker};
pub use query::{ViewPage, ViewQuery, ViewRows};
