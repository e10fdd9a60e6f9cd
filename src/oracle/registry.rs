use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{DecisionOracle, LlmOracle, TargetStopOracle};
use crate::config::OracleSettings;
use crate::error::{Error, Result};

/// Registered strategies, keyed by name and version
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, BTreeMap<u32, Arc<dyn DecisionOracle>>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies.
    ///
    /// `llm` is only registered when an OpenAI key is supplied.
    pub fn with_builtins(settings: &OracleSettings, openai_api_key: Option<String>) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(TargetStopOracle::from_settings(settings)));

        if let Some(api_key) = openai_api_key {
            registry.register(Arc::new(LlmOracle::from_settings(api_key, settings)?));
        }

        Ok(registry)
    }

    /// Add a strategy under its own name and version, replacing any previous entry
    pub fn register(&mut self, oracle: Arc<dyn DecisionOracle>) {
        let name = oracle.name().to_string();
        let version = oracle.version();
        if self
            .strategies
            .entry(name.clone())
            .or_default()
            .insert(version, oracle)
            .is_some()
        {
            tracing::warn!("Replaced strategy {} v{}", name, version);
        }
    }

    /// Look up a strategy; `None` selects the highest registered version
    pub fn get(&self, name: &str, version: Option<u32>) -> Result<Arc<dyn DecisionOracle>> {
        let versions = self.strategies.get(name).ok_or_else(|| {
            Error::Oracle(format!(
                "unknown strategy '{}' (registered: {})",
                name,
                self.names().join(", ")
            ))
        })?;

        let found = match version {
            Some(v) => versions.get(&v),
            None => versions.values().next_back(),
        };

        found
            .cloned()
            .ok_or_else(|| Error::Oracle(format!("strategy '{}' has no version {:?}", name, version)))
    }

    /// Registered strategy names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn versions(&self, name: &str) -> Vec<u32> {
        self.strategies
            .get(name)
            .map(|v| v.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketSnapshot;
    use crate::oracle::{EntryJudgment, ExitJudgment, PositionView};
    use async_trait::async_trait;

    struct Versioned(u32);

    #[async_trait]
    impl DecisionOracle for Versioned {
        fn name(&self) -> &str {
            "versioned"
        }

        fn version(&self) -> u32 {
            self.0
        }

        async fn entry(&self, _snapshot: &MarketSnapshot) -> Result<EntryJudgment> {
            Ok(EntryJudgment::decline(vec![format!("v{}", self.0)]))
        }

        async fn exit(&self, _p: &PositionView, _s: &MarketSnapshot) -> Result<ExitJudgment> {
            Ok(ExitJudgment::hold(Vec::new()))
        }
    }

    #[test]
    fn test_latest_version_selected_by_default() {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(Versioned(1)));
        registry.register(Arc::new(Versioned(3)));
        registry.register(Arc::new(Versioned(2)));

        assert_eq!(registry.get("versioned", None).unwrap().version(), 3);
        assert_eq!(registry.get("versioned", Some(2)).unwrap().version(), 2);
        assert_eq!(registry.versions("versioned"), vec![1, 2, 3]);
    }

    #[test]
    fn test_unknown_strategy_or_version() {
        let registry = StrategyRegistry::with_builtins(&OracleSettings::default(), None).unwrap();

        assert!(registry.get("target-stop", None).is_ok());
        assert!(registry.get("target-stop", Some(9)).is_err());
        assert!(registry.get("llm", None).is_err());
        assert_eq!(registry.names(), vec!["target-stop".to_string()]);
    }

    #[test]
    fn test_llm_registered_with_key() {
        let registry =
            StrategyRegistry::with_builtins(&OracleSettings::default(), Some("sk-test".into()))
                .unwrap();

        assert_eq!(registry.names(), vec!["llm".to_string(), "target-stop".to_string()]);
    }
}
