//! Grammar structure and generation errors.

use photesthesis_corpus::RuleName;
use thiserror::Error;

/// A fatal error in grammar structure or during generation, carrying the
/// offending rule name.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("duplicate rule addition: {rule}")]
    DuplicateRule { rule: RuleName },

    #[error("rule not found: {rule}")]
    UnknownRule { rule: RuleName },

    #[error("rule has no productions: {rule}")]
    NoProductions { rule: RuleName },

    #[error("rule {rule} has only nonterminal productions left at the depth limit")]
    NoTerminalProduction { rule: RuleName },

    #[error("no active productions for rule {rule} in the current context")]
    NoActiveProductions { rule: RuleName },

    #[error("depth limit exhausted while expanding rule {rule}")]
    DepthLimitExhausted { rule: RuleName },
}

/// Result type for grammar operations.
pub type GrammarResult<T> = Result<T, GrammarError>;
