//! The pythia abstract-interpretation engine.
//!
//! Given a set of Python source modules, the engine computes for every
//! named binding and expression a *value set*: a small union of abstract
//! values (types, instances, functions, modules, sequences, dictionaries,
//! generators) precise enough to answer editor queries. Analysis is flow
//! insensitive except for `isinstance` narrowing, context sensitive at
//! call sites (the Cartesian product algorithm), and driven to fixpoint
//! by a dependency-tracking work queue with widening for termination.
//!
//! # Quick start
//!
//! ```
//! use pythia_analysis::AnalysisSession;
//! use pythia_core::config::AnalysisConfig;
//! use pythia_core::span::Position;
//!
//! let mut session = AnalysisSession::new(AnalysisConfig::default());
//! let module = session.add_module("example", "def f(a): return a\nx = f(42)\n");
//! session.analyze().unwrap();
//!
//! let query = session.query();
//! // `x` on line 2, column 0.
//! let names = query.type_names_at(module, Position::new(2, 0));
//! assert_eq!(names, vec!["int".to_string()]);
//! ```
//!
//! # Architecture
//!
//! - [`value`]: the interned value lattice with join and widening
//! - [`scope`]: the lexical scope tree and per-name variable state
//! - [`module`]: module entries and the dotted-name table
//! - [`queue`]: the dependency queue that re-runs units to fixpoint
//! - [`builtins`]: the seeded builtin classes, functions, and modules
//! - [`stubs`]: the module-summary (stub) format and cached loader
//! - [`session`]: the owning [`AnalysisSession`]
//! - [`query`]: read-only result queries

pub mod builtins;
mod interp;
pub mod module;
pub mod query;
pub mod queue;
mod resolve;
pub mod scope;
pub mod session;
pub mod stubs;
pub mod value;

pub use module::ModuleId;
pub use query::{
    Completion, CompletionKind, DefinitionResult, ParameterDescription, Query, ReferenceResult,
    SignatureDescription,
};
pub use scope::{ScopeId, SiteKind};
pub use session::AnalysisSession;
pub use stubs::{ModuleSummary, StubError, StubLoader};
pub use value::{PrimitiveKind, SequenceKind, Value, ValueId, ValueSet};
