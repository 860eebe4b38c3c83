// Configuration loader
// Loads ./golden-prompt.toml, ~/.golden-prompt/config.toml, or an explicit path

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::{HOME_CONFIG_DIR, LOCAL_CONFIG_FILE};
use super::settings::Config;
use crate::errors::{self, OptimizerError};

/// Sections a config file must declare when validation is enabled.
const REQUIRED_SECTIONS: [&str; 2] = ["optimization", "models"];

/// Load configuration.
///
/// An explicit path must exist. Otherwise the working directory and the
/// home config directory are tried in order, and built-in defaults are used
/// when neither has a file.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!(errors::file_not_found_error(
                &path.display().to_string(),
                "Configuration file"
            ));
        }
        return load_from_path(path);
    }

    for candidate in default_locations() {
        if candidate.exists() {
            return load_from_path(&candidate);
        }
    }

    tracing::warn!(
        "No {} found in the working directory or ~/{}; using built-in defaults",
        LOCAL_CONFIG_FILE,
        HOME_CONFIG_DIR
    );
    Ok(Config::default())
}

fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(HOME_CONFIG_DIR).join("config.toml"));
    }
    paths
}

/// Read and validate a single config file.
pub fn load_from_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

    let config = parse_config(&contents).map_err(|e| match e {
        OptimizerError::ConfigValidation(detail) => anyhow::anyhow!(OptimizerError::ConfigValidation(
            errors::config_parse_error(&path.display().to_string(), &detail)
        )),
        other => anyhow::anyhow!(other),
    })?;

    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse config text. Missing required sections and out-of-range values are
/// `ConfigValidation` errors unless `[validation] validate_config = false`.
pub fn parse_config(contents: &str) -> Result<Config, OptimizerError> {
    let table: toml::Table = toml::from_str(contents)
        .map_err(|e| OptimizerError::ConfigValidation(e.to_string()))?;

    let validate = table
        .get("validation")
        .and_then(|v| v.get("validate_config"))
        .and_then(toml::Value::as_bool)
        .unwrap_or(true);

    if validate {
        for section in REQUIRED_SECTIONS {
            if !table.contains_key(section) {
                return Err(OptimizerError::ConfigValidation(format!(
                    "missing required config section: [{section}]"
                )));
            }
        }
    }

    let config: Config = toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| OptimizerError::ConfigValidation(e.to_string()))?;

    if validate {
        config.validate()?;
    }

    Ok(config)
}

/// Render a configuration as TOML (used by `golden-prompt config`).
pub fn to_toml_string(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [optimization]
        max_iterations = 5

        [models.answer_generator]
        provider = "openai"
        model = "gpt-4o-mini"
    "#;

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.optimization.max_iterations, 5);
        assert_eq!(config.models.answer_generator.provider, "openai");
    }

    #[test]
    fn test_missing_models_section_is_rejected() {
        let err = parse_config("[optimization]\nmax_iterations = 3\n").unwrap_err();
        match err {
            OptimizerError::ConfigValidation(msg) => assert!(msg.contains("[models]")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validation_can_be_disabled() {
        let config = parse_config("[validation]\nvalidate_config = false\n").unwrap();
        assert_eq!(config.optimization.max_iterations, 15);
    }

    #[test]
    fn test_infinite_delay_without_validation_is_zero() {
        let config = parse_config(
            "[validation]\nvalidate_config = false\n[performance]\nrate_limit_delay = inf\n",
        )
        .unwrap();
        assert!(config.performance.rate_limit_delay.is_infinite());
        assert_eq!(config.performance.rate_limit_delay(), std::time::Duration::ZERO);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let text = format!("{MINIMAL}\n[performance]\nbatch_size = 0\n");
        assert!(matches!(
            parse_config(&text),
            Err(OptimizerError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_malformed_toml_is_a_validation_error() {
        assert!(matches!(
            parse_config("[optimization\nmax_iterations = "),
            Err(OptimizerError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.optimization.max_iterations, 5);
    }

    #[test]
    fn test_explicit_missing_path_errors() {
        let result = load_config(Some(Path::new("/definitely/not/here.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialized_config_round_trips_through_parser() {
        let text = to_toml_string(&Config::default()).unwrap();
        let parsed = parse_config(&text).unwrap();
        assert_eq!(parsed.models, Config::default().models);
    }
}
