//! Register span of a variable selection
//!
//! The span is informational (it tells whether one block read could cover a
//! profile); reads themselves stay per-variable.

use serde::Serialize;
use std::fmt;

use crate::catalog::RegisterCatalog;
use crate::error::{RegisterError, Result};

/// Inclusive offset range covered by a set of variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub min_offset: u32,
    pub max_offset: u32,
}

impl Span {
    /// Number of registers a single block read would need
    pub fn word_count(&self) -> u32 {
        self.max_offset - self.min_offset + 1
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{}..+{} ({} registers)",
            self.min_offset,
            self.max_offset,
            self.word_count()
        )
    }
}

pub fn compute_span<S: AsRef<str>>(catalog: &RegisterCatalog, names: &[S]) -> Result<Span> {
    let mut span: Option<Span> = None;
    for name in names {
        let (first, last) = catalog.spec(name.as_ref())?.word_range();
        span = Some(match span {
            None => Span {
                min_offset: first,
                max_offset: last,
            },
            Some(s) => Span {
                min_offset: s.min_offset.min(first),
                max_offset: s.max_offset.max(last),
            },
        });
    }
    span.ok_or(RegisterError::EmptySelection)
}
