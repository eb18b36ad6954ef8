//! Semantic validation of a loaded configuration.
//!
//! Runs once before serving. Every problem is collected so the operator sees
//! the full list instead of fixing one error per restart.

use std::collections::HashMap;

use parley_common::text::MIN_REPLY_CHARS;

use crate::schema::ParleyConfig;

/// Inclusive temperature domain accepted for sessions.
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = 0.0..=2.0;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "default_session_values.model"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: impl Into<String>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate `config` against the invariants the runtime relies on.
pub fn validate(config: &ParleyConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    // alias (lowercased) → canonical id that claimed it first
    let mut claimed: HashMap<String, &str> = HashMap::new();
    for (canonical, aliases) in &config.models.aliases {
        for name in std::iter::once(canonical).chain(aliases) {
            let key = name.to_lowercase();
            match claimed.get(key.as_str()) {
                Some(owner) if *owner != canonical.as_str() => result.push(
                    Severity::Error,
                    format!("models.aliases.{canonical}"),
                    format!("alias \"{name}\" is already used by \"{owner}\""),
                ),
                _ => {
                    claimed.insert(key, canonical.as_str());
                },
            }
        }
    }

    if config.models.aliases.is_empty() {
        result.push(Severity::Error, "models.aliases", "no models configured");
    }

    for (idx, id) in config.models.vision.iter().enumerate() {
        if !config.models.aliases.contains_key(id) {
            result.push(
                Severity::Error,
                format!("models.vision[{idx}]"),
                format!("\"{id}\" is not a canonical model id"),
            );
        }
    }

    if let Some(ov) = &config.models.vision_override
        && !config.models.aliases.contains_key(&ov.model)
    {
        result.push(
            Severity::Warning,
            "models.vision_override.model",
            format!("\"{}\" is not a canonical model id; the override never applies", ov.model),
        );
    }

    let defaults = &config.default_session_values;
    if !claimed.contains_key(&defaults.model.to_lowercase()) {
        result.push(
            Severity::Error,
            "default_session_values.model",
            format!("\"{}\" does not resolve to a configured model", defaults.model),
        );
    }
    if !TEMPERATURE_RANGE.contains(&defaults.temperature) {
        result.push(
            Severity::Error,
            "default_session_values.temperature",
            format!("{} is outside [0.0, 2.0]", defaults.temperature),
        );
    }

    if config.completion.timeout_secs == 0 {
        result.push(Severity::Error, "completion.timeout_secs", "must be greater than 0");
    }
    if config.telegram.max_reply_chars < MIN_REPLY_CHARS {
        result.push(
            Severity::Error,
            "telegram.max_reply_chars",
            format!("must be at least {MIN_REPLY_CHARS}"),
        );
    }
    if config.quota.free_limit == 0 && config.quota.allowlist.is_empty() {
        result.push(
            Severity::Warning,
            "quota.free_limit",
            "0 with an empty allowlist denies every conversation",
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use {super::*, crate::schema::VisionOverride};

    fn paths(result: &ValidationResult, severity: Severity) -> Vec<&str> {
        result
            .diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.path.as_str())
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let result = validate(&ParleyConfig::default());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn default_model_may_be_an_alias() {
        let mut cfg = ParleyConfig::default();
        cfg.default_session_values.model = "MINI".into();
        assert!(!validate(&cfg).has_errors());
    }

    #[test]
    fn unknown_default_model() {
        let mut cfg = ParleyConfig::default();
        cfg.default_session_values.model = "davinci".into();
        let result = validate(&cfg);
        assert!(result.has_errors());
        assert_eq!(paths(&result, Severity::Error), vec![
            "default_session_values.model"
        ]);
    }

    #[test]
    fn temperature_out_of_range() {
        let mut cfg = ParleyConfig::default();
        cfg.default_session_values.temperature = 2.5;
        assert_eq!(paths(&validate(&cfg), Severity::Error), vec![
            "default_session_values.temperature"
        ]);
    }

    #[test]
    fn overlapping_aliases_are_rejected() {
        let mut cfg = ParleyConfig::default();
        cfg.models
            .aliases
            .insert("gpt-4.1".into(), vec!["Mini".into()]);
        let result = validate(&cfg);
        assert_eq!(result.count(Severity::Error), 1);
        assert_eq!(
            result.diagnostics[0].message,
            "alias \"mini\" is already used by \"gpt-4.1\""
        );
    }

    #[test]
    fn vision_ids_must_be_canonical() {
        let mut cfg = ParleyConfig::default();
        cfg.models.vision.push("vision".into());
        assert_eq!(paths(&validate(&cfg), Severity::Error), vec!["models.vision[4]"]);
    }

    #[test]
    fn stray_vision_override_is_a_warning() {
        let mut cfg = ParleyConfig::default();
        cfg.models.vision_override = Some(VisionOverride {
            model: "gpt-9".into(),
            max_tokens: 10,
        });
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut cfg = ParleyConfig::default();
        cfg.completion.timeout_secs = 0;
        cfg.telegram.max_reply_chars = 0;
        assert_eq!(validate(&cfg).count(Severity::Error), 2);
    }

    #[test]
    fn reply_ceiling_must_fit_any_character() {
        let mut cfg = ParleyConfig::default();
        cfg.telegram.max_reply_chars = 3;
        let result = validate(&cfg);
        assert!(result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "telegram.max_reply_chars")
        );

        cfg.telegram.max_reply_chars = MIN_REPLY_CHARS;
        assert!(!validate(&cfg).has_errors());
    }
}
