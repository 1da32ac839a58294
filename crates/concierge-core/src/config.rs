use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Defaults — mirrored from the tenant-level defaults in `types.rs` so a
// freshly-installed deployment behaves sensibly before any tenant exists.
pub const DEFAULT_PORT: u16 = 8089;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Top-level process configuration (concierge.toml + CONCIERGE_* env overrides).
///
/// This is distinct from [`crate::types::TenantConfig`]: this struct governs
/// the process (bind address, database path, provider credentials); tenant
/// config is data loaded from persistence on every request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConciergeConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Per-tenant bearer tokens: tenant id -> token. A request for a tenant
    /// absent from this map is rejected.
    #[serde(default)]
    pub tenant_tokens: std::collections::HashMap<String, String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            tenant_tokens: std::collections::HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub anthropic: Option<AnthropicConfig>,
    pub embeddings: Option<EmbeddingsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

/// An OpenAI-compatible embeddings endpoint — the external embedding
/// provider of the retrieval subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    pub api_key: String,
    #[serde(default = "default_embeddings_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_embeddings_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.concierge/concierge.db")
}

impl ConciergeConfig {
    /// Load config from a TOML file with `CONCIERGE_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, then `~/.concierge/concierge.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ConciergeConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CONCIERGE_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.concierge/concierge.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ConciergeConfig::default();
        assert_eq!(cfg.gateway.port, DEFAULT_PORT);
        assert_eq!(cfg.gateway.bind, DEFAULT_BIND);
        assert!(cfg.providers.anthropic.is_none());
    }
}
