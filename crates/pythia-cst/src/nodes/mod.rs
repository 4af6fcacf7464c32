//! CST node types.
//!
//! Every node owns its *atoms*: the verbatim token texts it is built from,
//! each with the trivia that preceded it. Emitting a tree's atoms in
//! source order reproduces the input byte-for-byte, which is the
//! round-trip invariant the whole crate is built around. Nodes covering
//! syntactically invalid input are explicit `Error` variants that keep
//! the raw tokens.
//!
//! # Node identity
//!
//! Each node carries a [`NodeId`], assigned deterministically during
//! parsing. Ids key the side tables the analysis layer builds (definition
//! sites, reference sites, inferred value sets) without needing pointers
//! into the tree.

mod expression;
mod statement;

pub use expression::*;
pub use statement::*;

use pythia_core::span::Span;

use crate::tokenizer::Token;

// ============================================================================
// Node identity
// ============================================================================

/// A stable, unique identifier for a CST node within one parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The raw u32 value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Generator for sequential [`NodeId`]s, used by the parser.
#[derive(Debug, Default)]
pub struct NodeIdGenerator {
    next: u32,
}

impl NodeIdGenerator {
    /// Create a generator starting at `NodeId(0)`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next id.
    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    /// How many ids have been produced.
    pub fn count(&self) -> u32 {
        self.next
    }
}

// ============================================================================
// Atoms
// ============================================================================

/// One lexical atom of a node: the trivia that preceded a token plus the
/// token's verbatim text and span. Synthetic tokens (indent/dedent, the
/// end marker, a newline synthesized at EOF) have empty text but may
/// carry trivia.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    /// Whitespace, comments, and continuations preceding the token.
    pub leading: String,
    /// The verbatim token text.
    pub text: String,
    /// Byte span of `text`.
    pub span: Span,
}

impl Atom {
    /// Build an atom from a token, taking ownership of its strings.
    pub fn from_token(token: Token) -> Self {
        Self {
            leading: token.leading,
            text: token.text,
            span: token.span,
        }
    }

    /// An atom with the given text and no trivia, for synthesized nodes.
    pub fn synthetic(text: impl Into<String>) -> Self {
        Self {
            leading: String::new(),
            text: text.into(),
            span: Span::at(0),
        }
    }
}
