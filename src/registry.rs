//! # Feature Definition Registry
//!
//! Process-scoped registry of [`FeatureDefinition`]s with strict version
//! monotonicity: a registration only replaces an existing definition when
//! its version is strictly greater, so concurrent registrations race safely
//! and losers get a `VersionConflict` they can correct and retry.

use dashmap::DashMap;
use tracing::{info, warn};

use crate::error::{EnrichError, Result};
use crate::types::FeatureDefinition;

#[derive(Default)]
pub struct FeatureRegistry {
    definitions: DashMap<String, FeatureDefinition>,
}

/// Registry summary for diagnostics endpoints.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total_definitions: usize,
    pub feature_names: Vec<String>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or upgrade a feature definition.
    ///
    /// The entry API serializes concurrent registrations for the same name;
    /// whichever caller loses the race observes the winner's version and
    /// fails with `VersionConflict` unless strictly newer.
    pub fn register(&self, definition: FeatureDefinition) -> Result<()> {
        let name = definition.name.clone();
        match self.definitions.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let registered = entry.get().version;
                if definition.version <= registered {
                    warn!(
                        feature = %name,
                        registered_version = registered,
                        submitted_version = definition.version,
                        "rejected feature registration: version not monotonically increasing"
                    );
                    return Err(EnrichError::VersionConflict {
                        name,
                        registered,
                        submitted: definition.version,
                    });
                }
                info!(
                    feature = %name,
                    from_version = registered,
                    to_version = definition.version,
                    "feature definition upgraded"
                );
                entry.insert(definition);
                Ok(())
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                info!(feature = %name, version = definition.version, "feature definition registered");
                entry.insert(definition);
                Ok(())
            }
        }
    }

    /// Resolve the current definition for a feature name.
    pub fn resolve(&self, name: &str) -> Result<FeatureDefinition> {
        self.definitions
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EnrichError::UnknownFeature {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_definitions: self.definitions.len(),
            feature_names: self.definitions.iter().map(|e| e.key().clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_resolves_definitions() {
        let registry = FeatureRegistry::new();
        registry
            .register(FeatureDefinition::new("summary", 1, "llm.summarize"))
            .unwrap();

        let resolved = registry.resolve("summary").unwrap();
        assert_eq!(resolved.version, 1);
        assert_eq!(resolved.capability, "llm.summarize");

        assert!(matches!(
            registry.resolve("sentiment"),
            Err(EnrichError::UnknownFeature { .. })
        ));
    }

    #[test]
    fn versions_must_strictly_increase() {
        let registry = FeatureRegistry::new();
        registry
            .register(FeatureDefinition::new("summary", 2, "llm.summarize"))
            .unwrap();

        // Equal version loses.
        let err = registry
            .register(FeatureDefinition::new("summary", 2, "llm.summarize"))
            .unwrap_err();
        assert!(matches!(
            err,
            EnrichError::VersionConflict {
                registered: 2,
                submitted: 2,
                ..
            }
        ));

        // Lower version loses.
        assert!(registry
            .register(FeatureDefinition::new("summary", 1, "llm.summarize"))
            .is_err());

        // Strictly greater wins.
        registry
            .register(FeatureDefinition::new("summary", 3, "llm.summarize-v2"))
            .unwrap();
        assert_eq!(registry.resolve("summary").unwrap().version, 3);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stats_reflect_contents() {
        let registry = FeatureRegistry::new();
        assert!(registry.is_empty());

        registry
            .register(FeatureDefinition::new("summary", 1, "llm.summarize"))
            .unwrap();
        registry
            .register(FeatureDefinition::new("sentiment", 1, "llm.classify"))
            .unwrap();

        let stats = registry.stats();
        assert_eq!(stats.total_definitions, 2);
        assert!(stats.feature_names.contains(&"summary".to_string()));
    }
}
