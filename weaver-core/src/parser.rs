//! Directive document parser.
//!
//! # Format
//!
//! ```text
//! ###FILE_START:src/lib.rs###
//! pub fn hello() {}
//! ###FILE_END:src/lib.rs###
//! ```
//!
//! Lines between the markers are taken verbatim and joined with `\n`.
//!
//! # Block termination
//!
//! - Any `###FILE_END:` closes the open block, whatever name it carries. A
//!   name that differs from the opening marker is reported as
//!   [`ParseWarning::MismatchedEnd`] but the block is still emitted.
//! - A `###FILE_START:` while a block is open closes that block first.
//! - A block still open at the end of the document is dropped and reported as
//!   [`ParseWarning::Unterminated`].
//!
//! Parsing never fails. Every irregularity becomes a [`ParseWarning`] and the
//! parser carries on with the next marker.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::types::{normalize_relative, FileUpdate, PathRejection};

const START_MARKER: &str = "###FILE_START:";
const END_MARKER: &str = "###FILE_END:";
const MARKER_SUFFIX: &str = "###";

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Non-fatal irregularity found while parsing. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// Marker line without the closing `###`.
    MalformedMarker { line: usize },
    /// END marker whose path differs from the open block.
    MismatchedEnd {
        line: usize,
        open: String,
        end: String,
    },
    /// END marker with no block open.
    StrayEnd { line: usize, path: String },
    /// Block opened at `line` and never closed.
    Unterminated { line: usize, path: String },
    /// Block path failed validation; its content was skipped.
    RejectedPath {
        line: usize,
        path: String,
        reason: PathRejection,
    },
    /// Block targets a protected file (the instruction document itself).
    ProtectedPath { line: usize, path: String },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::MalformedMarker { line } => {
                write!(f, "line {line}: marker is missing its closing '###'")
            }
            ParseWarning::MismatchedEnd { line, open, end } => write!(
                f,
                "line {line}: FILE_END '{end}' closes block '{open}' (names differ)"
            ),
            ParseWarning::StrayEnd { line, path } => {
                write!(f, "line {line}: FILE_END '{path}' without an open block")
            }
            ParseWarning::Unterminated { line, path } => write!(
                f,
                "line {line}: block '{path}' is never closed and was dropped"
            ),
            ParseWarning::RejectedPath { line, path, reason } => {
                write!(f, "line {line}: block '{path}' skipped: {reason}")
            }
            ParseWarning::ProtectedPath { line, path } => write!(
                f,
                "line {line}: block '{path}' targets the instruction document and was skipped"
            ),
        }
    }
}

/// Result of parsing one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    /// Updates in document order. Duplicate paths are kept.
    pub updates: Vec<FileUpdate>,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedDocument {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct OpenBlock<'a> {
    raw_path: String,
    target: Option<PathBuf>,
    start_line: usize,
    lines: Vec<&'a str>,
}

/// Turns instruction text into ordered [`FileUpdate`]s.
#[derive(Debug, Clone, Default)]
pub struct DirectiveParser {
    protected: Vec<PathBuf>,
}

impl DirectiveParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse any block that targets `relative_path`.
    ///
    /// Paths that are not valid project-relative paths can never match a
    /// directive and are ignored.
    pub fn protect(mut self, relative_path: impl AsRef<Path>) -> Self {
        let raw = relative_path.as_ref().to_string_lossy();
        if let Ok(path) = normalize_relative(&raw) {
            self.protected.push(path);
        }
        self
    }

    /// Parse `text` into updates plus warnings. Blank text yields nothing.
    pub fn parse(&self, text: &str) -> ParsedDocument {
        let mut doc = ParsedDocument::default();
        if text.trim().is_empty() {
            return doc;
        }

        let mut open: Option<OpenBlock<'_>> = None;

        for (idx, line) in text.split('\n').enumerate() {
            let line_no = idx + 1;
            let marker = line.trim_end_matches('\r');

            if let Some(rest) = marker.strip_prefix(START_MARKER) {
                if let Some(block) = open.take() {
                    close_block(block, &mut doc);
                }
                let raw_path = marker_path(rest, line_no, &mut doc.warnings);
                open = Some(self.open_block(raw_path, line_no, &mut doc.warnings));
            } else if let Some(rest) = marker.strip_prefix(END_MARKER) {
                let end_path = marker_path(rest, line_no, &mut doc.warnings);
                match open.take() {
                    Some(block) => {
                        if !same_path(&block.raw_path, &end_path) {
                            doc.warnings.push(ParseWarning::MismatchedEnd {
                                line: line_no,
                                open: block.raw_path.clone(),
                                end: end_path,
                            });
                        }
                        close_block(block, &mut doc);
                    }
                    None => doc.warnings.push(ParseWarning::StrayEnd {
                        line: line_no,
                        path: end_path,
                    }),
                }
            } else if let Some(block) = open.as_mut() {
                block.lines.push(line);
            }
        }

        if let Some(block) = open {
            doc.warnings.push(ParseWarning::Unterminated {
                line: block.start_line,
                path: block.raw_path,
            });
        }

        doc
    }

    fn open_block<'a>(
        &self,
        raw_path: String,
        line: usize,
        warnings: &mut Vec<ParseWarning>,
    ) -> OpenBlock<'a> {
        let target = match normalize_relative(&raw_path) {
            Ok(path) if self.protected.contains(&path) => {
                warnings.push(ParseWarning::ProtectedPath {
                    line,
                    path: raw_path.clone(),
                });
                None
            }
            Ok(path) => Some(path),
            Err(reason) => {
                warnings.push(ParseWarning::RejectedPath {
                    line,
                    path: raw_path.clone(),
                    reason,
                });
                None
            }
        };

        OpenBlock {
            raw_path,
            target,
            start_line: line,
            lines: Vec::new(),
        }
    }
}

fn close_block(block: OpenBlock<'_>, doc: &mut ParsedDocument) {
    if let Some(target) = block.target {
        doc.updates
            .push(FileUpdate::new(target, block.lines.join("\n")));
    }
}

/// Extract the path between the marker prefix and the trailing `###`.
fn marker_path(rest: &str, line: usize, warnings: &mut Vec<ParseWarning>) -> String {
    match rest.trim_end().strip_suffix(MARKER_SUFFIX) {
        Some(path) => path.trim().to_string(),
        None => {
            warnings.push(ParseWarning::MalformedMarker { line });
            rest.trim().to_string()
        }
    }
}

fn same_path(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    matches!(
        (normalize_relative(a), normalize_relative(b)),
        (Ok(x), Ok(y)) if x == y
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
