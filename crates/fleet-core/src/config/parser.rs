//! TOML parser with helpful error messages

use super::FleetConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse fleet.toml with detailed error messages
pub fn parse_fleet_toml(path: &Path) -> Result<FleetConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_fleet_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse fleet.toml content from string. Validation happens after
/// environment overrides are applied; see [`super::ConfigStore::load`].
pub fn parse_fleet_toml_str(content: &str) -> Result<FleetConfig> {
    toml::from_str(content).map_err(|e| enhance_toml_error(e, content))
}

/// Attach the offending lines to a TOML error
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();

    match error.span().map(|span| line_of_offset(content, span.start)) {
        Some(line_num) => anyhow::anyhow!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line_num,
            get_line_context(content, line_num),
            message
        ),
        None => anyhow::anyhow!("TOML parsing error: {}", message),
    }
}

/// 1-based line containing byte `offset`
fn line_of_offset(content: &str, offset: usize) -> usize {
    let offset = offset.min(content.len());
    content.as_bytes()[..offset]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(3).min(lines.len());
    let end = (line_num + 2).min(lines.len());

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteCacheKind;
    use crate::types::TriggerKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_valid_config() {
        let toml = r#"
project_id = "acme-prod"
source_root = "src/functions"

[deploy]
build_concurrency = 8
retry_rounds = 2
retry_delay_ms = 250

[build]
command = ["esbuild", "{source}/index.ts", "--outdir={output}"]

[platform]
deploy_command = ["acme", "deploy", "{name}"]

[remote_cache]
kind = "file"
path = "/shared/fleet.json"

[defaults]
region = "eu-west-1"
memory_mb = 256
"#;

        let config = parse_fleet_toml_str(toml).unwrap();
        assert_eq!(config.project_id, "acme-prod");
        assert_eq!(config.source_root, Path::new("src/functions"));
        assert_eq!(config.output_root, Path::new("dist"));
        assert_eq!(config.deploy.build_concurrency, 8);
        assert_eq!(config.deploy.deploy_concurrency, 2);
        assert_eq!(config.deploy.retry_rounds, 2);
        assert_eq!(config.deploy.retry_delay_ms, 250);
        assert_eq!(config.build.command.len(), 3);
        assert_eq!(config.build.entry_files.len(), 4);
        assert_eq!(config.remote_cache.kind, RemoteCacheKind::File);
        assert_eq!(config.defaults.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.defaults.kind, TriggerKind::Http);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_fleet_toml_str("").unwrap();
        assert_eq!(config, FleetConfig::default());
    }

    #[test]
    fn test_parse_error_marks_line() {
        let toml = "project_id = \"acme\"\n\n[deploy]\nbuild_concurrency = \"four\"\n";

        let err = parse_fleet_toml_str(toml).unwrap_err().to_string();
        assert!(err.contains("line 4"), "{err}");
        assert!(err.contains(">>>    4 | build_concurrency"), "{err}");
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = parse_fleet_toml_str("[deploy\nforce = true");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_cache_kind_is_rejected() {
        let result = parse_fleet_toml_str("[remote_cache]\nkind = \"s3\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "project_id = \"from-file\"").unwrap();

        let config = parse_fleet_toml(temp_file.path()).unwrap();
        assert_eq!(config.project_id, "from-file");
    }

    #[test]
    fn test_parse_nonexistent_file() {
        let result = parse_fleet_toml(Path::new("/nonexistent/path/fleet.toml"));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_line_context_window() {
        let content = "a\nb\nc\nd\ne";
        let context = get_line_context(content, 1);
        assert!(context.starts_with(">>>    1 | a"));
        assert_eq!(context.lines().count(), 3);

        let context = get_line_context(content, 5);
        assert!(context.ends_with(">>>    5 | e"));
    }
}
