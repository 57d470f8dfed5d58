#![forbid(unsafe_code)]

use std::env;

use healthlog_engines::cache::ExtractionCacheConfig;
use healthlog_engines::disambig::DisambiguatorConfig;
use healthlog_engines::gate::FallbackGateConfig;
use healthlog_engines::model_adapter::{ModelAdapterConfig, ModelProviderConfig};
use healthlog_engines::rules::RulesConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub fallback_enabled: bool,
    pub rules: RulesConfig,
    pub disambiguator: DisambiguatorConfig,
    pub gate: FallbackGateConfig,
    pub cache: ExtractionCacheConfig,
    pub adapter: ModelAdapterConfig,
    pub provider: ModelProviderConfig,
}

impl PipelineConfig {
    pub fn mvp_v1(fallback_enabled: bool) -> Self {
        Self {
            fallback_enabled,
            rules: RulesConfig::mvp_v1(),
            disambiguator: DisambiguatorConfig::mvp_v1(),
            gate: FallbackGateConfig::mvp_v1(),
            cache: ExtractionCacheConfig::mvp_v1(),
            adapter: ModelAdapterConfig::mvp_v1(),
            provider: ModelProviderConfig::from_lookup(|_| None),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// The fallback path needs both the enable flag (on unless `0|false|off`) and an
    /// API key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let provider = ModelProviderConfig::from_lookup(&lookup);
        let flag_on = lookup("HEALTHLOG_FALLBACK_ENABLED")
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off"))
            .unwrap_or(true);
        let mut config = Self::mvp_v1(flag_on && provider.has_credentials());
        config.adapter.timeout_ms = provider.timeout_ms;
        config.provider = provider;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> PipelineConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn at_config_01_fallback_needs_a_key() {
        assert!(!from(&[]).fallback_enabled);
        assert!(from(&[("HEALTHLOG_MODEL_API_KEY", "k")]).fallback_enabled);
    }

    #[test]
    fn at_config_02_flag_can_disable() {
        let cfg = from(&[
            ("HEALTHLOG_MODEL_API_KEY", "k"),
            ("HEALTHLOG_FALLBACK_ENABLED", "Off"),
        ]);
        assert!(!cfg.fallback_enabled);
    }

    #[test]
    fn at_config_03_timeout_flows_into_adapter() {
        let cfg = from(&[("HEALTHLOG_MODEL_TIMEOUT_MS", "250")]);
        assert_eq!(cfg.adapter.timeout_ms, 250);
        assert_eq!(cfg.provider.timeout_ms, 250);
        assert_eq!(PipelineConfig::mvp_v1(false).adapter.timeout_ms, 800);
    }
}
