//! CLI command implementations

mod compose;
mod logs;
mod manage;
mod query;

use anyhow::{anyhow, Context, Result};
use std::path::Path;

pub use compose::*;
pub use logs::*;
pub use manage::*;
pub use query::*;

/// Parse a `KEY=value` argument
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected KEY=value, got {:?}", s)),
    }
}

/// Read a file given on the command line, `-` for stdin
fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        return std::io::read_to_string(std::io::stdin()).context("Failed to read stdin");
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Deserialize a JSON document given on the command line
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = read_input(path)?;
    serde_json::from_str(&text).map_err(|e| anyhow!("Invalid JSON in {}: {}", path.display(), e))
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("tier=web").unwrap(),
            ("tier".to_string(), "web".to_string())
        );
        assert_eq!(
            parse_key_value("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
