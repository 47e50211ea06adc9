//! Prompt registry — load, parameterize, and version the closed template set.
//!
//! Immutable after construction; safe for concurrent reads.

pub mod templates;

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::TemplateError;
use self::templates::Template;

/// A rendered prompt ready for the gateway.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    /// Template name — the only prompt detail that ever reaches logs.
    pub template_name: &'static str,
    /// System instructions.
    pub system: String,
    /// Rendered user content.
    pub user: String,
    /// Declared output schema. Survives custom body overrides.
    pub schema: &'static str,
}

/// The registry over the closed template set.
pub struct PromptRegistry {
    templates: HashMap<&'static str, Template>,
    /// Whether `get_with_override` honors custom bodies.
    overrides_enabled: bool,
}

impl PromptRegistry {
    pub fn new(overrides_enabled: bool) -> Self {
        Self {
            templates: templates::ALL.into_iter().map(|t| (t.name, t)).collect(),
            overrides_enabled,
        }
    }

    /// Render a template with the given variables.
    ///
    /// Fails fast on unknown templates, missing required variables,
    /// undeclared supplied variables, and body placeholders outside the
    /// declared variable set.
    pub fn get(
        &self,
        name: &str,
        variables: &[(&str, &str)],
    ) -> Result<RenderedPrompt, TemplateError> {
        self.get_with_override(name, variables, None)
    }

    /// Render a template, substituting a custom body from user settings.
    ///
    /// The override replaces the user-content body only; the declared
    /// output schema and system instructions are preserved.
    pub fn get_with_override(
        &self,
        name: &str,
        variables: &[(&str, &str)],
        custom_body: Option<&str>,
    ) -> Result<RenderedPrompt, TemplateError> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| TemplateError::UnknownTemplate(name.to_string()))?;

        let body = match custom_body {
            Some(body) if self.overrides_enabled => body,
            _ => template.body,
        };

        let user = render_body(template, body, variables)?;
        Ok(RenderedPrompt {
            template_name: template.name,
            system: template.system.to_string(),
            user,
            schema: template.schema,
        })
    }

    /// Names of all registered templates.
    pub fn template_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.templates.keys().copied().collect();
        names.sort();
        names
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex is valid"))
}

fn render_body(
    template: &Template,
    body: &str,
    variables: &[(&str, &str)],
) -> Result<String, TemplateError> {
    let declared = |name: &str| {
        template.required.contains(&name) || template.optional.contains(&name)
    };

    // Supplied variables must all be declared.
    for (name, _) in variables {
        if !declared(name) {
            return Err(TemplateError::UndeclaredVariable {
                template: template.name.to_string(),
                variable: name.to_string(),
            });
        }
    }

    // Required variables must all be supplied.
    let supplied: HashMap<&str, &str> = variables.iter().copied().collect();
    for required in template.required {
        if !supplied.contains_key(required) {
            return Err(TemplateError::MissingVariable {
                template: template.name.to_string(),
                variable: required.to_string(),
            });
        }
    }

    // Body placeholders must all be declared (guards custom overrides).
    for captures in placeholder_pattern().captures_iter(body) {
        let placeholder = captures.get(1).expect("group 1 always present").as_str();
        if !declared(placeholder) {
            return Err(TemplateError::UnresolvedPlaceholder {
                template: template.name.to_string(),
                placeholder: placeholder.to_string(),
            });
        }
    }

    // Substitute; absent optional variables render as empty.
    let rendered = placeholder_pattern().replace_all(body, |captures: &regex::Captures<'_>| {
        let name = captures.get(1).expect("group 1 always present").as_str();
        supplied.get(name).copied().unwrap_or("").to_string()
    });

    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier_vars<'a>() -> Vec<(&'a str, &'a str)> {
        vec![
            ("subject", "Please review RFC"),
            ("sender", "lead@corp"),
            ("recipient", "me@corp"),
            ("body", "Please review by Friday"),
            ("job_role_context", "software engineer on storage"),
            ("classification_rules", "none"),
            ("username", "Sam"),
        ]
    }

    #[test]
    fn registry_holds_the_closed_set() {
        let registry = PromptRegistry::new(true);
        assert_eq!(
            registry.template_names(),
            vec![
                "classifier",
                "classifier_with_explanation",
                "content_deduplication",
                "event_relevance",
                "fyi_summary",
                "holistic_inbox_analysis",
                "job_listing_analysis",
                "newsletter_summary",
                "newsletter_summary_custom",
                "summerize_action_item",
            ]
        );
    }

    #[test]
    fn renders_classifier_with_explanation() {
        let registry = PromptRegistry::new(true);
        let rendered = registry
            .get("classifier_with_explanation", &classifier_vars())
            .unwrap();

        assert_eq!(rendered.template_name, "classifier_with_explanation");
        assert!(rendered.user.contains("Please review RFC"));
        assert!(rendered.user.contains("software engineer on storage"));
        assert!(rendered.schema.contains("one_line_summary"));
        // No unresolved placeholders remain
        assert!(!rendered.user.contains('{'));
    }

    #[test]
    fn unknown_template_fails() {
        let registry = PromptRegistry::new(true);
        let err = registry.get("no_such_template", &[]).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownTemplate(_)));
    }

    #[test]
    fn missing_required_variable_fails() {
        let registry = PromptRegistry::new(true);
        let mut vars = classifier_vars();
        vars.retain(|(name, _)| *name != "subject");
        let err = registry
            .get("classifier_with_explanation", &vars)
            .unwrap_err();
        assert!(matches!(
            err,
            TemplateError::MissingVariable { ref variable, .. } if variable == "subject"
        ));
    }

    #[test]
    fn undeclared_variable_fails() {
        let registry = PromptRegistry::new(true);
        let mut vars = classifier_vars();
        vars.push(("surprise", "value"));
        let err = registry
            .get("classifier_with_explanation", &vars)
            .unwrap_err();
        assert!(matches!(
            err,
            TemplateError::UndeclaredVariable { ref variable, .. } if variable == "surprise"
        ));
    }

    #[test]
    fn optional_variable_renders_empty_when_absent() {
        let registry = PromptRegistry::new(true);
        let rendered = registry
            .get("classifier_with_explanation", &classifier_vars())
            .unwrap();
        assert!(!rendered.user.contains("few_shot_examples"));
    }

    #[test]
    fn optional_variable_substituted_when_present() {
        let registry = PromptRegistry::new(true);
        let mut vars = classifier_vars();
        vars.push(("few_shot_examples", "Example: subject X -> fyi"));
        let rendered = registry
            .get("classifier_with_explanation", &vars)
            .unwrap();
        assert!(rendered.user.contains("Example: subject X -> fyi"));
    }

    #[test]
    fn custom_override_replaces_body_keeps_schema() {
        let registry = PromptRegistry::new(true);
        let rendered = registry
            .get_with_override(
                "fyi_summary",
                &[
                    ("subject", "S"),
                    ("sender", "a@x.com"),
                    ("body", "B"),
                    ("username", "Sam"),
                ],
                Some("Condense for {username}: {subject}\n{body}"),
            )
            .unwrap();
        assert_eq!(rendered.user, "Condense for Sam: S\nB");
        assert_eq!(rendered.schema, r#"{"summary": "..."}"#);
    }

    #[test]
    fn custom_override_with_unknown_placeholder_fails() {
        let registry = PromptRegistry::new(true);
        let err = registry
            .get_with_override(
                "fyi_summary",
                &[
                    ("subject", "S"),
                    ("sender", "a@x.com"),
                    ("body", "B"),
                    ("username", "Sam"),
                ],
                Some("Use {secret_context} here"),
            )
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedPlaceholder { .. }));
    }

    #[test]
    fn overrides_ignored_when_disabled() {
        let registry = PromptRegistry::new(false);
        let rendered = registry
            .get_with_override(
                "fyi_summary",
                &[
                    ("subject", "S"),
                    ("sender", "a@x.com"),
                    ("body", "B"),
                    ("username", "Sam"),
                ],
                Some("overridden {subject}"),
            )
            .unwrap();
        assert!(rendered.user.contains("From: a@x.com"));
    }

    #[test]
    fn every_template_declares_consistent_placeholders() {
        // Each built-in body references only declared variables.
        let registry = PromptRegistry::new(true);
        for template in templates::ALL {
            let vars: Vec<(&str, &str)> = template
                .required
                .iter()
                .chain(template.optional.iter())
                .map(|name| (*name, "value"))
                .collect();
            let rendered = registry.get(template.name, &vars).unwrap();
            assert!(
                !placeholder_pattern().is_match(&rendered.user),
                "template {} left placeholders",
                template.name
            );
        }
    }
}
