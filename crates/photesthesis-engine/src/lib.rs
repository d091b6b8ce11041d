//! The photesthesis test administrator.
//!
//! A test supplies a grammar, a corpus, and a [`TestCase`] whose `run`
//! drives the system under test once per plan, reporting observations
//! through the [`Runtime`]. [`Admin::administer`] then initializes the
//! corpus from k-path coverings, re-checks stored transcripts, and expands
//! the corpus with random plans whose trajectories look novel.

pub mod admin;
pub mod coverage;
pub mod env;
pub mod trajectory;

pub use admin::{Admin, EngineError, Failures, Runtime, TestCase};
pub use coverage::{EdgeCounters, NoCoverage, SancovCounters};
pub use trajectory::Trajectory;
