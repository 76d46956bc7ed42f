// Evaluator configuration.
//
// This is the ambient "config" concern this crate always carries
// (see `v1::load`, which reads a RON-encoded `Config` via
// `ron::de::from_reader`). Grounded the same way here: a
// `serde::Deserialize` struct with a `Default`, loadable from a RON
// file for embedders that want to tune it.

use std::fmt;
use std::fs::File;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(ron::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "could not read config: {}", e),
            ConfigError::Parse(e) => write!(f, "could not parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    // Caps nested user-function calls so uncontrolled recursion (e.g.
    // a `fact` with no base case) fails with a reportable EvalError
    // instead of overrunning the native stack.
    pub max_call_depth: usize,
    // Mirrors the `%.10g` digit count `print`/`show` render with
    // (builtins.rs::G_PRECISION). The built-in call protocol is a
    // fixed `(result_node, arg_list)` signature with no environment
    // parameter, so this field documents the constant for embedders
    // rather than being threaded into the stock built-ins.
    pub float_precision: usize,
}

impl Default for EvalConfig {
    fn default() -> EvalConfig {
        EvalConfig { max_call_depth: 512, float_precision: 10 }
    }
}

impl EvalConfig {
    pub fn from_ron_file<P: AsRef<Path>>(path: P) -> Result<EvalConfig, ConfigError> {
        let file = File::open(path.as_ref()).map_err(ConfigError::Io)?;
        ron::de::from_reader(file).map_err(ConfigError::Parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EvalConfig::default();
        assert_eq!(cfg.max_call_depth, 512);
        assert_eq!(cfg.float_precision, 10);
    }
}
