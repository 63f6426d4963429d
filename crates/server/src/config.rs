use serde::Deserialize;

pub const ENV_PREFIX: &str = "APIARY";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub raw_log: RawLogConfig,
    pub provision: ProvisionConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLogConfig {
    /// Directory for the date-partitioned fallback log files.
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionConfig {
    /// How many times to poll the runtime for the published host port.
    #[serde(default = "default_port_poll_attempts")]
    pub port_poll_attempts: u32,
    /// Delay between host-port polls.
    #[serde(default = "default_port_poll_interval_ms")]
    pub port_poll_interval_ms: u64,
    /// Grace period for container stop during teardown.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub max_name_len: usize,
    pub max_ip_len: usize,
    pub max_event_type_len: usize,
}

fn default_port_poll_attempts() -> u32 {
    20
}

fn default_port_poll_interval_ms() -> u64 {
    200
}

fn default_stop_timeout_secs() -> u32 {
    10
}

impl ProvisionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port_poll_attempts == 0 {
            anyhow::bail!("provision.port_poll_attempts must be > 0");
        }
        if self.port_poll_interval_ms == 0 {
            anyhow::bail!("provision.port_poll_interval_ms must be > 0");
        }
        Ok(())
    }
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            port_poll_attempts: default_port_poll_attempts(),
            port_poll_interval_ms: default_port_poll_interval_ms(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_name_len: 100,
            max_ip_len: 45,
            max_event_type_len: 50,
        }
    }
}

impl RawLogConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dir.trim().is_empty() {
            anyhow::bail!("raw_log.dir cannot be empty");
        }
        Ok(())
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    let env = config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        // Keep try_parsing disabled so string-valued settings are not coerced.
        .try_parsing(false);

    let builder = config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(env)
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("database.url", "sqlite://data/apiary.db")?
        .set_default("raw_log.dir", "data/raw_logs")?
        .set_default(
            "provision.port_poll_attempts",
            default_port_poll_attempts(),
        )?
        .set_default(
            "provision.port_poll_interval_ms",
            default_port_poll_interval_ms(),
        )?
        .set_default("provision.stop_timeout_secs", default_stop_timeout_secs())?
        .set_default("limits.max_name_len", 100u64)?
        .set_default("limits.max_ip_len", 45u64)?
        .set_default("limits.max_event_type_len", 50u64)?;

    let cfg = builder.build()?;
    let app: AppConfig = cfg.try_deserialize()?;
    app.provision.validate()?;
    app.raw_log.validate()?;
    Ok(app)
}
