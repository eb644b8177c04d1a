//! Streaming, fixed-buffer, delimiter-based record scanner.
//!
//! Input is read in chunks that always end on a record boundary, fields are
//! located by offset without copying, and each row is handed to a pluggable
//! [`handler::RowHandler`]. Output goes through a fixed-size write buffer that
//! only reaches the downstream writer when it would overflow.

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod reader;
pub mod tokenizer;
pub mod writer;

pub use config::{MalformedPolicy, ScanConfig};
pub use engine::{Pipeline, RunReport};
pub use error::{Result, ScanError};
pub use handler::{HandlerSpec, RowHandler, RowOutcome, RuntimeHandler};
