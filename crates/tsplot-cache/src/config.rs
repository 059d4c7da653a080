//! Construction-time knobs for a [`crate::coordinator::Coordinator`],
//! deserializable the way the rest of the workspace's components are
//! configured (see `tsplot-config`).

use async_trait::async_trait;
use serde::Deserialize;
use tsplot_config::{registry::Registry, Configurable};
use tsplot_error::CacheError;

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Default `request_hint` applied when a caller does not specify one.
    #[serde(default)]
    pub default_request_hint: i64,
    /// Eviction policy selector. Only `"unbounded"` is implemented; see
    /// `crate::eviction`.
    #[serde(default = "default_eviction_policy")]
    pub eviction_policy: EvictionPolicyKind,
}

fn default_eviction_policy() -> EvictionPolicyKind {
    EvictionPolicyKind::Unbounded
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicyKind {
    Unbounded,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_request_hint: 0,
            eviction_policy: EvictionPolicyKind::Unbounded,
        }
    }
}

#[async_trait]
impl Configurable<CacheConfig> for CacheConfig {
    async fn try_from_config(
        config: &CacheConfig,
        _registry: &Registry,
    ) -> Result<Self, Box<dyn CacheError>> {
        Ok(config.clone())
    }
}

impl EvictionPolicyKind {
    /// The concrete policy this knob selects. `Unbounded` is the only
    /// variant today (see `crate::eviction`), but the match keeps this the
    /// single place that grows when a bounded policy is added.
    pub fn build(self) -> std::sync::Arc<dyn crate::eviction::EvictionPolicy> {
        match self {
            EvictionPolicyKind::Unbounded => std::sync::Arc::new(crate::eviction::Unbounded),
        }
    }
}

impl From<&CacheConfig> for crate::coordinator::CoordinatorOptions {
    fn from(config: &CacheConfig) -> Self {
        crate::coordinator::CoordinatorOptions {
            default_request_hint: config.default_request_hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_selects_unbounded_retention() {
        let config = CacheConfig::default();
        assert_eq!(config.eviction_policy, EvictionPolicyKind::Unbounded);
        assert_eq!(config.default_request_hint, 0);
    }

    #[tokio::test]
    async fn try_from_config_round_trips() {
        let config = CacheConfig {
            default_request_hint: 50_000,
            eviction_policy: EvictionPolicyKind::Unbounded,
        };
        let registry = Registry::new();
        let built = CacheConfig::try_from_config(&config, &registry).await.unwrap();
        assert_eq!(built.default_request_hint, 50_000);
    }
}
