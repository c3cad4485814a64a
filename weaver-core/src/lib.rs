//! Weaver core library — directive parsing, domain types, configuration.
//!
//! Public API surface:
//! - [`parser`] — [`DirectiveParser`] for `###FILE_START:` / `###FILE_END:` documents
//! - [`types`] — [`FileUpdate`] and relative path validation
//! - [`config`] — [`WeaverConfig`] load / save / defaults
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod parser;
pub mod types;

pub use config::WeaverConfig;
pub use error::ConfigError;
pub use parser::{DirectiveParser, ParseWarning, ParsedDocument};
pub use types::{FileUpdate, PathRejection};
