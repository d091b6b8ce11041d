//! Abstract grammars over the photesthesis value algebra, with two
//! generation strategies: uniform random expansion under a depth limit, and
//! k-path covering generation after Havrikov & Zeller (ASE 2019).

pub mod atom;
pub mod context;
pub mod error;
pub mod grammar;

pub use atom::{Atom, AtomKind, KPath, Production, Rule};
pub use context::Context;
pub use error::GrammarError;
pub use grammar::Grammar;
