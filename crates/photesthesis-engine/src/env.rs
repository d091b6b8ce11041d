//! Environment-variable overrides for administration parameters.

use photesthesis_corpus::PlanHash;
use tracing::warn;

pub const EXPANSION_STEPS: &str = "PHOTESTHESIS_EXPANSION_STEPS";
pub const KPATH_LENGTH: &str = "PHOTESTHESIS_KPATH_LENGTH";
pub const RANDOM_DEPTH: &str = "PHOTESTHESIS_RANDOM_DEPTH";
pub const TEST_HASH: &str = "PHOTESTHESIS_TEST_HASH";
pub const RANDOM_SEED: &str = "PHOTESTHESIS_RANDOM_SEED";
pub const VERBOSE: &str = "PHOTESTHESIS_VERBOSE";
pub const STABILITY_RETRIES: &str = "PHOTESTHESIS_STABILITY_RETRIES";

fn parse_num(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Read a numeric environment variable, accepting decimal or 0x-hex.
/// Unset returns `None`; unparsable values are warned about and ignored.
pub fn env_u64(name: &str) -> Option<u64> {
    let text = std::env::var(name).ok()?;
    match parse_num(&text) {
        Some(v) => Some(v),
        None => {
            warn!(var = name, value = %text, "ignoring unparsable numeric environment variable");
            None
        }
    }
}

pub(crate) fn expansion_steps() -> Option<u64> {
    env_u64(EXPANSION_STEPS)
}

pub(crate) fn kpath_length() -> Option<u64> {
    env_u64(KPATH_LENGTH)
}

pub(crate) fn random_depth() -> Option<u64> {
    env_u64(RANDOM_DEPTH)
}

pub(crate) fn test_hash() -> Option<PlanHash> {
    env_u64(TEST_HASH).map(PlanHash::from_u64)
}

pub(crate) fn random_seed() -> Option<u64> {
    env_u64(RANDOM_SEED)
}

pub(crate) fn verbose() -> u64 {
    env_u64(VERBOSE).unwrap_or(0)
}

pub(crate) fn stability_retries() -> u64 {
    env_u64(STABILITY_RETRIES).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_num_forms() {
        assert_eq!(parse_num("42"), Some(42));
        assert_eq!(parse_num(" 42 "), Some(42));
        assert_eq!(parse_num("0x2a"), Some(42));
        assert_eq!(parse_num("0X2A"), Some(42));
        assert_eq!(parse_num("nope"), None);
        assert_eq!(parse_num(""), None);
    }
}
