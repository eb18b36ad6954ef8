//! Canonical model table.

use std::collections::{BTreeSet, HashMap};

use parley_config::ModelsConfig;

/// Resolves user-supplied model names to canonical ids and answers
/// capability questions about them.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    /// Lowercased alias or canonical id → canonical id.
    index: HashMap<String, String>,
    canonical: BTreeSet<String>,
    vision: BTreeSet<String>,
    /// (model, forced max_tokens)
    vision_override: Option<(String, u32)>,
}

impl ModelRegistry {
    /// Build from the configured table. Aliases are matched
    /// case-insensitively; a canonical id is always an alias of itself.
    pub fn from_config(config: &ModelsConfig) -> Self {
        let mut index = HashMap::new();
        for (canonical, aliases) in &config.aliases {
            index.insert(canonical.to_lowercase(), canonical.clone());
            for alias in aliases {
                index
                    .entry(alias.to_lowercase())
                    .or_insert_with(|| canonical.clone());
            }
        }

        let canonical: BTreeSet<String> = config.aliases.keys().cloned().collect();
        let vision = config
            .vision
            .iter()
            .filter(|id| canonical.contains(*id))
            .cloned()
            .collect();

        Self {
            index,
            canonical,
            vision,
            vision_override: config
                .vision_override
                .as_ref()
                .map(|ov| (ov.model.clone(), ov.max_tokens)),
        }
    }

    /// Canonical id for `alias`, or `None` if it is not configured.
    pub fn canonicalize(&self, alias: &str) -> Option<&str> {
        self.index
            .get(&alias.trim().to_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn is_vision_capable(&self, model_id: &str) -> bool {
        self.vision.contains(model_id)
    }

    /// Fixed `max_tokens` that replaces the session value for `model_id`.
    pub fn forced_max_tokens(&self, model_id: &str) -> Option<u32> {
        self.vision_override
            .as_ref()
            .filter(|(model, _)| model == model_id)
            .map(|(_, max_tokens)| *max_tokens)
    }

    /// Canonical ids in sorted order.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.canonical.iter().map(String::as_str)
    }
}
