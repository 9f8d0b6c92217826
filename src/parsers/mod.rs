//! Source code parsers using tree-sitter
//!
//! Only Java is supported. The parser turns a file's text into the list of
//! methods it declares, each with a stable [`MethodIdentity`], its line span
//! and its static metrics.

pub mod java;

use crate::metrics::static_metrics::StaticMetrics;
use crate::models::{LineSpan, MethodIdentity};

/// A method found in a source file.
#[derive(Debug, Clone)]
pub struct ParsedMethod {
    pub identity: MethodIdentity,
    pub span: LineSpan,
    pub metrics: StaticMetrics,
}

/// Why a file contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSkip {
    /// Path does not exist at the commit.
    Missing,
    /// The collaborator failed to produce content.
    Unreadable(String),
    /// The text did not parse.
    Unparseable(String),
}

impl std::fmt::Display for FileSkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSkip::Missing => write!(f, "missing"),
            FileSkip::Unreadable(e) => write!(f, "unreadable: {}", e),
            FileSkip::Unparseable(e) => write!(f, "unparseable: {}", e),
        }
    }
}

/// Per-file result of loading and parsing one path at one commit.
#[derive(Debug, Clone)]
pub enum FileOutcome {
    Parsed(Vec<ParsedMethod>),
    Skipped(FileSkip),
}

impl FileOutcome {
    /// Parse already-fetched content.
    pub fn from_content(content: anyhow::Result<Option<String>>) -> Self {
        match content {
            Ok(Some(text)) => match java::parse_methods(&text) {
                Ok(methods) => FileOutcome::Parsed(methods),
                Err(e) => FileOutcome::Skipped(FileSkip::Unparseable(e.to_string())),
            },
            Ok(None) => FileOutcome::Skipped(FileSkip::Missing),
            Err(e) => FileOutcome::Skipped(FileSkip::Unreadable(format!("{:#}", e))),
        }
    }
}
