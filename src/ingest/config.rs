// src/ingest/config.rs
//! Query lists (subreddits, search terms) kept outside the main config file.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

/// Load a query list from an explicit path. Supports TOML or JSON formats.
pub fn load_queries_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading query list from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_queries(&content, ext.as_str())
}

fn parse_queries(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains("queries");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    // Try JSON array
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    // Fallback: also try TOML if not attempted
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported query list format"))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlQueries {
        queries: Vec<String>,
    }
    let v: TomlQueries = toml::from_str(s)?;
    Ok(clean_list(v.queries))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim, drop empties and repeats (case-insensitive), keep first-seen order.
pub fn clean_list(items: Vec<String>) -> Vec<String> {
    use std::collections::HashSet;
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && seen.insert(t.to_ascii_lowercase()) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn dedup_trim_and_formats_work() {
        let toml = r#"queries = [" ChronicPain ", "", "backpain", "BackPain"]"#;
        let json = r#"["posture corrector", "  massage gun  ", ""]"#;
        let toml_out = parse_toml(toml).unwrap();
        assert_eq!(
            toml_out,
            vec!["ChronicPain".to_string(), "backpain".to_string()]
        );
        let json_out = parse_json(json).unwrap();
        assert_eq!(
            json_out,
            vec!["posture corrector".to_string(), "massage gun".to_string()]
        );
    }

    #[test]
    fn loads_from_file_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("subs.json");
        fs::write(&p, r#"["sciatica", "migraine"]"#).unwrap();
        assert_eq!(load_queries_from(&p).unwrap(), vec!["sciatica", "migraine"]);

        let bad = tmp.path().join("bad.txt");
        fs::write(&bad, "not a list").unwrap();
        assert!(load_queries_from(&bad).is_err());
    }
}
