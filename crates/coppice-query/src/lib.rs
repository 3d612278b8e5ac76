#![forbid(unsafe_code)]

mod error;
mod index;
mod traverse;

pub use error::{QueryError, QueryErrorCode};
pub use index::{IndexCache, TreeIndex};
pub use traverse::TraversalEngine;

pub const CRATE_NAME: &str = "coppice-query";
