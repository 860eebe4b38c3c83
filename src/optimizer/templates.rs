// Named prompt templates with {placeholder} substitution

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::errors::OptimizerError;

pub const INITIAL_PROMPT_GENERATOR: &str = "INITIAL_PROMPT_GENERATOR";
pub const ANSWER_GENERATOR: &str = "ANSWER_GENERATOR";
pub const PROMPT_OPTIMIZER: &str = "PROMPT_OPTIMIZER";
pub const FEEDBACK_COLLECTOR: &str = "FEEDBACK_COLLECTOR";
pub const PROMPT_EVOLVER: &str = "PROMPT_EVOLVER";

pub const TEMPLATE_NAMES: [&str; 5] = [
    INITIAL_PROMPT_GENERATOR,
    ANSWER_GENERATOR,
    PROMPT_OPTIMIZER,
    FEEDBACK_COLLECTOR,
    PROMPT_EVOLVER,
];

const DEFAULT_PROMPTS: &str = include_str!("default_prompts.toml");

/// The template set used by one run.
#[derive(Debug, Clone)]
pub struct Templates {
    templates: HashMap<String, String>,
}

impl Templates {
    /// Built-in templates only
    pub fn builtin() -> Result<Self> {
        let templates: HashMap<String, String> =
            toml::from_str(DEFAULT_PROMPTS).context("Built-in prompt templates are malformed")?;
        Ok(Self { templates })
    }

    /// Built-in templates, with any keys from `custom` replacing them.
    pub fn load(custom: Option<&Path>) -> Result<Self> {
        let mut set = Self::builtin()?;
        let Some(path) = custom else {
            return Ok(set);
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt templates from {}", path.display()))?;
        let overrides: HashMap<String, String> = toml::from_str(&content)
            .with_context(|| format!("Failed to parse prompt templates in {}", path.display()))?;

        for (name, text) in overrides {
            if !TEMPLATE_NAMES.contains(&name.as_str()) {
                tracing::warn!(template = %name, "Ignoring unknown template in {}", path.display());
                continue;
            }
            tracing::debug!(template = %name, "Using custom template");
            set.templates.insert(name, text);
        }
        Ok(set)
    }

    /// Replace one template in memory
    pub fn with_template(mut self, name: &str, text: impl Into<String>) -> Self {
        self.templates.insert(name.to_string(), text.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// Substitute `{key}` placeholders from `bindings`.
    ///
    /// `{{` and `}}` produce literal braces. Braces that do not enclose an
    /// identifier are copied through unchanged.
    pub fn render(&self, name: &str, bindings: &[(&str, &str)]) -> Result<String, OptimizerError> {
        let template = self
            .get(name)
            .ok_or_else(|| OptimizerError::UnknownTemplate(name.to_string()))?;
        render_template(name, template, bindings)
    }
}

fn render_template(
    name: &str,
    template: &str,
    bindings: &[(&str, &str)],
) -> Result<String, OptimizerError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if let Some(key) = placeholder(tail) {
            let value = bindings
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .ok_or_else(|| OptimizerError::TemplateBinding {
                    template: name.to_string(),
                    key: key.to_string(),
                })?;
            out.push_str(value);
            rest = &tail[key.len() + 2..];
        } else {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// `{identifier}` at the start of `s`
fn placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix('{')?;
    let end = inner.find('}')?;
    let key = &inner[..end];
    let mut chars = key.chars();
    let first = chars.next()?;
    if (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Some(key)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_has_all_templates() {
        let set = Templates::builtin().unwrap();
        for name in TEMPLATE_NAMES {
            assert!(set.get(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let set = Templates::builtin().unwrap();
        let text = set
            .render(ANSWER_GENERATOR, &[("prompt", "Be terse."), ("input_data", "2+2")])
            .unwrap();
        assert!(text.contains("Be terse."));
        assert!(text.contains("2+2"));
        assert!(!text.contains("{prompt}"));
    }

    #[test]
    fn test_missing_binding_is_an_error() {
        let set = Templates::builtin().unwrap();
        let err = set
            .render(ANSWER_GENERATOR, &[("prompt", "p")])
            .unwrap_err();
        match err {
            OptimizerError::TemplateBinding { template, key } => {
                assert_eq!(template, ANSWER_GENERATOR);
                assert_eq!(key, "input_data");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_template() {
        let set = Templates::builtin().unwrap();
        assert!(matches!(
            set.render("NOPE", &[]),
            Err(OptimizerError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn test_escaped_and_stray_braces() {
        let out = render_template("t", "{{x}} {a} {not valid} }", &[("a", "1")]).unwrap();
        assert_eq!(out, "{x} 1 {not valid} }");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let out = render_template("t", "{a}", &[("a", "{b}")]).unwrap();
        assert_eq!(out, "{b}");
    }

    #[test]
    fn test_custom_file_overrides_one_template() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ANSWER_GENERATOR = \"Q: {{input_data}} via {{prompt}}\"").unwrap();
        writeln!(file, "SOMETHING_ELSE = \"ignored\"").unwrap();

        let set = Templates::load(Some(file.path())).unwrap();
        let out = set
            .render(ANSWER_GENERATOR, &[("prompt", "p"), ("input_data", "i")])
            .unwrap();
        assert_eq!(out, "Q: i via p");
        assert!(set.get("SOMETHING_ELSE").is_none());
        assert!(set.get(PROMPT_EVOLVER).is_some());
    }
}
