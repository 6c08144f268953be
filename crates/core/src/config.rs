use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `DINEPOINTS__` layered over an optional TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub program: ProgramSourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Tunables for the loyalty engine's transactional core.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Attempts after the first before a version conflict is surfaced.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
    #[serde(default = "default_program_cache_ttl_secs")]
    pub program_cache_ttl_secs: u64,
    #[serde(default = "default_redemption_code_length")]
    pub redemption_code_length: usize,
    #[serde(default = "default_max_code_attempts")]
    pub max_code_attempts: u32,
    #[serde(default = "default_tier_upgrade_bonus")]
    pub tier_upgrade_bonus: u64,
    #[serde(default = "default_history_limit")]
    pub default_history_limit: usize,
    #[serde(default = "default_max_history_limit")]
    pub max_history_limit: usize,
}

/// Where the program catalog is read from at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramSourceConfig {
    /// JSON file holding one program or an array of programs.
    #[serde(default)]
    pub path: Option<String>,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_max_conflict_retries() -> u32 {
    3
}
fn default_program_cache_ttl_secs() -> u64 {
    30
}
fn default_redemption_code_length() -> usize {
    8
}
fn default_max_code_attempts() -> u32 {
    5
}
fn default_tier_upgrade_bonus() -> u64 {
    100
}
fn default_history_limit() -> usize {
    20
}
fn default_max_history_limit() -> usize {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
            program_cache_ttl_secs: default_program_cache_ttl_secs(),
            redemption_code_length: default_redemption_code_length(),
            max_code_attempts: default_max_code_attempts(),
            tier_upgrade_bonus: default_tier_upgrade_bonus(),
            default_history_limit: default_history_limit(),
            max_history_limit: default_max_history_limit(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            engine: EngineConfig::default(),
            program: ProgramSourceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file and environment variables.
    /// Environment values win over the file.
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("DINEPOINTS")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
