//! Message selector language.
//!
//! A selector is a boolean expression over envelope properties, in the
//! style of JMS message selectors:
//!
//! ```text
//! CI_TYPE = 'code-quality-checks-done' and CI_STATUS = 'failed'
//! (BRANCH = 'main' or BRANCH = 'release') and not CI_STATUS = 'passed'
//! CI_STATUS in ('failed', 'unstable') and JOB_URL is not null
//! ```
//!
//! Comparisons are case-sensitive exact string matches. A comparison
//! against a property the envelope does not carry is *unknown* and never
//! matches, even under `not`. An empty selector matches everything.
//!
//! Selectors are compiled once (rejecting malformed input up front) and
//! then evaluated any number of times, concurrently if needed.

mod lexer;
mod parser;

use std::{fmt, str::FromStr, sync::Arc};

use crate::{Envelope, Properties};
use parser::{Expr, Parser};

/// Malformed selector text, with the byte position and text of the offending token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Selector syntax error at position {position} near '{token}': {message}")]
pub struct SelectorError {
    position: usize,
    token: Arc<str>,
    message: Arc<str>,
}

impl SelectorError {
    pub(crate) fn new(
        position: usize,
        token: impl Into<Arc<str>>,
        message: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            position,
            token: token.into(),
            message: message.into(),
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A compiled selector. Cheap to clone.
#[derive(Clone)]
pub struct Selector {
    inner: Arc<Compiled>,
}

#[derive(Debug)]
struct Compiled {
    source: Box<str>,
    expr: Option<Expr>,
}

impl Selector {
    /// Compile selector text. Blank text yields a selector matching every envelope.
    pub fn compile(text: &str) -> Result<Self, SelectorError> {
        let expr = if text.trim().is_empty() {
            None
        } else {
            Some(Parser::new(lexer::tokenize(text)?).parse()?)
        };
        Ok(Self {
            inner: Arc::new(Compiled {
                source: text.trim().into(),
                expr,
            }),
        })
    }

    /// Compile an optional selector; `None` matches everything.
    pub fn compile_optional(text: Option<&str>) -> Result<Self, SelectorError> {
        Self::compile(text.unwrap_or_default())
    }

    /// A selector matching every envelope.
    pub fn all() -> Self {
        Self {
            inner: Arc::new(Compiled {
                source: "".into(),
                expr: None,
            }),
        }
    }

    #[inline]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        self.matches_properties(envelope.properties())
    }

    pub fn matches_properties(&self, properties: &Properties) -> bool {
        match &self.inner.expr {
            Some(expr) => expr.evaluate(properties) == Some(true),
            None => true,
        }
    }

    pub fn is_match_all(&self) -> bool {
        self.inner.expr.is_none()
    }

    /// The (trimmed) selector text this was compiled from.
    pub fn source(&self) -> &str {
        &self.inner.source
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::compile(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_match_all() {
            write!(f, "<all>")
        } else {
            write!(f, "{}", self.inner.source)
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.inner.source).finish()
    }
}
