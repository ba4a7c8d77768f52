//! Canonical trace model shared by every vendor parser and store.

pub mod cancel;
pub mod error;
pub mod host;
pub mod line_reader;
pub mod model;
pub mod path;
pub mod prompts;
pub mod text;

pub use cancel::CancellationToken;
pub use error::{Error, Result};
pub use host::{hostname, read_id_file};
pub use line_reader::{LineReader, DEFAULT_MAX_LINE_BYTES, INITIAL_BUFFER_BYTES};
pub use model::*;
