//! INI configuration loading (spec.md §6) via the `ini` crate.

use std::path::Path;
use std::time::Duration;

use tracing::Level;

use crate::error::ConfigError;
use crate::profile::{DisplayPolicy, Rgb};

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub website: String,
    pub bearer_token: String,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub directory: String,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub interface: String,
}

/// BCM GPIO pin numbers for the relay, RGB LED, buzzer, and button.
#[derive(Debug, Clone, Copy)]
pub struct GpioConfig {
    pub power: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub buzzer: u8,
    pub button: u8,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub email: EmailConfig,
    pub display: DisplayPolicy,
    pub grace_period: Duration,
    pub logging: LoggingConfig,
    pub network: NetworkConfig,
    pub gpio: GpioConfig,
}

fn section<'a>(ini: &'a ini::Ini, name: &'static str) -> Result<&'a ini::Properties, ConfigError> {
    ini.section(Some(name))
        .ok_or(ConfigError::MissingKey { section: name, key: "<entire section>" })
}

fn required<'a>(props: &'a ini::Properties, section_name: &'static str, key: &'static str) -> Result<&'a str, ConfigError> {
    props.get(key).ok_or(ConfigError::MissingKey { section: section_name, key })
}

fn optional<'a>(props: &'a ini::Properties, key: &'static str, default: &'a str) -> &'a str {
    props.get(key).unwrap_or(default)
}

fn parse_bool(section_name: &'static str, key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue { section: section_name, key, value: value.to_string() }),
    }
}

fn parse_u8(section_name: &'static str, key: &'static str, value: &str) -> Result<u8, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue { section: section_name, key, value: value.to_string() })
}

fn parse_u64(section_name: &'static str, key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue { section: section_name, key, value: value.to_string() })
}

fn parse_color(section_name: &'static str, key: &'static str, value: &str) -> Result<Rgb, ConfigError> {
    Rgb::parse(value).ok_or_else(|| ConfigError::InvalidValue { section: section_name, key, value: value.to_string() })
}

fn parse_level(section_name: &'static str, key: &'static str, value: &str) -> Result<Level, ConfigError> {
    match value {
        // `tracing` has no CRITICAL level; it is folded into ERROR, the
        // closest severity it exposes.
        "critical" | "error" => Ok(Level::ERROR),
        "warning" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        _ => Err(ConfigError::InvalidValue { section: section_name, key, value: value.to_string() }),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read { path: path.display().to_string(), source: e })?;
        let ini = ini::Ini::load_from_str(&text)
            .map_err(|e| ConfigError::Parse { path: path.display().to_string(), source: e })?;

        let db_section = section(&ini, "db")?;
        let db = DbConfig {
            website: required(db_section, "db", "website")?.to_string(),
            bearer_token: required(db_section, "db", "bearer_token")?.to_string(),
        };

        let email_section = section(&ini, "email")?;
        let enabled = parse_bool("email", "enabled", required(email_section, "email", "enabled")?)?;
        let email = EmailConfig {
            enabled,
            smtp_host: optional(email_section, "smtp_host", "").to_string(),
            smtp_username: optional(email_section, "smtp_username", "").to_string(),
            smtp_password: optional(email_section, "smtp_password", "").to_string(),
            from_address: optional(email_section, "from_address", "").to_string(),
        };

        let display_section = section(&ini, "display")?;
        let defaults = DisplayPolicy::default();
        let color = |key: &'static str, fallback: Rgb| -> Result<Rgb, ConfigError> {
            match display_section.get(key) {
                Some(v) => parse_color("display", key, v),
                None => Ok(fallback),
            }
        };
        let display = DisplayPolicy {
            setup: color("setup_color", defaults.setup)?,
            auth: color("auth_color", defaults.auth)?,
            unauth: color("unauth_color", defaults.unauth)?,
            no_card_grace: color("no_card_grace_color", defaults.no_card_grace)?,
            unauth_card_grace: color("unauth_card_grace_color", defaults.unauth_card_grace)?,
            grace_timeout: color("grace_timeout_color", defaults.grace_timeout)?,
            proxy: color("proxy_color", defaults.proxy)?,
            training: color("training_color", defaults.training)?,
            timeout: color("timeout_color", defaults.timeout)?,
            flash_rate: match display_section.get("flash_rate") {
                Some(v) => parse_u64("display", "flash_rate", v)? as u32,
                None => defaults.flash_rate,
            },
        };

        let user_exp_section = section(&ini, "user_exp")?;
        let grace_period =
            Duration::from_secs(parse_u64("user_exp", "grace_period", required(user_exp_section, "user_exp", "grace_period")?)?);

        let logging_section = section(&ini, "logging")?;
        let logging = LoggingConfig {
            level: parse_level("logging", "level", required(logging_section, "logging", "level")?)?,
            directory: optional(logging_section, "directory", "./logs").to_string(),
        };

        let network_section = section(&ini, "network")?;
        let network = NetworkConfig { interface: required(network_section, "network", "interface")?.to_string() };

        let gpio_section = section(&ini, "gpio")?;
        let gpio = GpioConfig {
            power: parse_u8("gpio", "power", required(gpio_section, "gpio", "power")?)?,
            red: parse_u8("gpio", "red", required(gpio_section, "gpio", "red")?)?,
            green: parse_u8("gpio", "green", required(gpio_section, "gpio", "green")?)?,
            blue: parse_u8("gpio", "blue", required(gpio_section, "gpio", "blue")?)?,
            buzzer: parse_u8("gpio", "buzzer", required(gpio_section, "gpio", "buzzer")?)?,
            button: parse_u8("gpio", "button", required(gpio_section, "gpio", "button")?)?,
        };

        Ok(Self { db, email, display, grace_period, logging, network, gpio })
    }
}

/// Read the MAC address of the configured network interface from sysfs.
/// No crate in the corpus covers interface enumeration, and this is a
/// single plain-text file read, not worth a dependency.
pub fn read_mac_address(interface: &str) -> Result<String, ConfigError> {
    let path = format!("/sys/class/net/{interface}/address");
    std::fs::read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| ConfigError::Read { path, source: e })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
