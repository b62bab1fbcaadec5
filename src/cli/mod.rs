//! Command-line front end over [`crate::RecordStorage`].
mod app;
mod args;

pub use app::*;
pub use args::*;
