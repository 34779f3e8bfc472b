use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File as ConfigFile, FileFormat};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_WINDOW_SECS: u64 = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_path: String,
    pub upload_dir: String,
    /// URL path prefix under which `upload_dir` is served, e.g. `/uploads`.
    pub public_prefix: String,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub bucket_width_secs: u64,
    pub sweep_interval_secs: u64,
    pub cooldown_secs: u64,
    /// Offset from UTC used to decide which calendar day a report belongs to.
    pub utc_offset_minutes: i32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bucket_width_secs: DEFAULT_WINDOW_SECS,
            sweep_interval_secs: DEFAULT_WINDOW_SECS,
            cooldown_secs: DEFAULT_WINDOW_SECS,
            utc_offset_minutes: 0,
        }
    }
}

impl RetentionConfig {
    pub fn bucket_width(&self) -> Duration {
        Duration::from_secs(self.bucket_width_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    fn fixed_offset(&self) -> Option<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
    }

    pub fn day_offset(&self) -> FixedOffset {
        self.fixed_offset().unwrap_or_else(|| Utc.fix())
    }

    /// Calendar day of `now` in the configured offset.
    pub fn day_of(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.day_offset()).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.day_of(Utc::now())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_width_secs == 0 {
            return Err(ConfigError::Message(
                "retention.bucket_width_secs must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "retention.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.fixed_offset().is_none() {
            return Err(ConfigError::Message(format!(
                "retention.utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            )));
        }
        Ok(())
    }
}

fn base_builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("database_path", "anpr_reports.db")?
        .set_default("upload_dir", "uploads")?
        .set_default("public_prefix", "/uploads")
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<AppConfig, ConfigError> {
    let config = builder.build()?.try_deserialize::<AppConfig>()?;
    config.retention.validate()?;
    Ok(config)
}

/// Load `Config.toml` (optional) overlaid with `ANPR__*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = base_builder()?
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("ANPR")
                .separator("__")
                .try_parsing(true),
        );
    finish(builder)
}

/// Build a configuration from TOML text on top of the defaults.
pub fn parse_configuration(toml: &str) -> Result<AppConfig, ConfigError> {
    let source = ConfigFile::from_str(toml, FileFormat::Toml);
    finish(base_builder()?.add_source(source))
}
