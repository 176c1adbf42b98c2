//! Parser configuration.

use serde::{Deserialize, Serialize};

/// Default number of diagnostics kept before the rest are dropped.
pub const DEFAULT_MAX_DIAGNOSTICS: usize = 100;

/// Default limit on block and expression nesting.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Knobs for [`crate::parse_with`]. Missing fields take their defaults when
/// deserialized, so a partial config file is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Diagnostics recorded before a single `DiagnosticLimit` warning
    /// replaces the rest. Parsing continues either way.
    pub max_diagnostics: usize,
    /// Nesting above this is a fatal [`crate::ParseFault::NestingTooDeep`].
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            max_diagnostics: DEFAULT_MAX_DIAGNOSTICS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let opts: ParseOptions = serde_json::from_str(r#"{"max_depth": 16}"#).unwrap();
        assert_eq!(opts.max_depth, 16);
        assert_eq!(opts.max_diagnostics, DEFAULT_MAX_DIAGNOSTICS);
    }

    #[test]
    fn empty_config_is_default() {
        let opts: ParseOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, ParseOptions::default());
    }
}
