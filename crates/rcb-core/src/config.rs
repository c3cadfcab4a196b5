use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{domain::Identity, errors::Error, Result};

pub const APP_NAME: &str = "telegram-remotecontrol-bot";
pub const CONFIG_FILENAME: &str = "config.json";
pub const DB_FILENAME: &str = "db.sqlite";

pub const DEFAULT_CLI_PORT: u16 = 59992;
pub const DEFAULT_TRANSMISSION_RPC_PORT: u16 = 9091;
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 3;

/// Typed configuration for the bot process.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub api_token: String,
    pub available_ids: Vec<Identity>,
    pub monitor_interval: Duration,

    // Controllable things
    pub controllable_services: Vec<String>,
    pub mount_points: Vec<PathBuf>,

    // Transmission RPC
    pub transmission_rpc_port: u16,
    pub transmission_rpc_username: Option<String>,
    pub transmission_rpc_passwd: Option<String>,

    // Local broadcast endpoint
    pub cli_port: u16,
    pub cli_auth_token: Option<String>,

    pub is_verbose: bool,

    /// Directory holding `config.json` and `db.sqlite`.
    pub config_dir: PathBuf,
}

/// On-disk shape of `config.json`.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    api_token: Option<String>,
    #[serde(default)]
    available_ids: Vec<String>,
    #[serde(default)]
    controllable_services: Vec<String>,
    #[serde(default)]
    mount_points: Vec<String>,
    #[serde(default)]
    monitor_interval: Option<i64>,
    #[serde(default)]
    transmission_rpc_port: Option<i64>,
    #[serde(default)]
    transmission_rpc_username: Option<String>,
    #[serde(default)]
    transmission_rpc_passwd: Option<String>,
    #[serde(default)]
    cli_port: Option<i64>,
    #[serde(default)]
    cli_auth_token: Option<String>,
    #[serde(default)]
    is_verbose: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = config_file_path()?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let text = fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        let mut cfg = Self::from_json(&text, dir)?;
        if let Some(token) = env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty) {
            cfg.api_token = token;
        }
        if let Some(verbose) = env_bool("RCB_VERBOSE") {
            cfg.is_verbose = verbose;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a config document without consulting the environment.
    pub fn from_json(text: &str, config_dir: PathBuf) -> Result<Self> {
        let raw: ConfigFile = serde_json::from_str(&standardize_json(text))
            .map_err(|e| Error::Config(format!("invalid {CONFIG_FILENAME}: {e}")))?;

        Ok(Self {
            api_token: raw.api_token.unwrap_or_default(),
            available_ids: raw
                .available_ids
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(Identity)
                .collect(),
            monitor_interval: Duration::from_secs(
                positive(raw.monitor_interval)
                    .map(|v| v as u64)
                    .unwrap_or(DEFAULT_MONITOR_INTERVAL_SECS),
            ),
            controllable_services: raw.controllable_services,
            mount_points: raw.mount_points.into_iter().map(PathBuf::from).collect(),
            transmission_rpc_port: port_or(raw.transmission_rpc_port, DEFAULT_TRANSMISSION_RPC_PORT),
            transmission_rpc_username: raw.transmission_rpc_username.and_then(non_empty),
            transmission_rpc_passwd: raw.transmission_rpc_passwd.and_then(non_empty),
            cli_port: port_or(raw.cli_port, DEFAULT_CLI_PORT),
            cli_auth_token: raw.cli_auth_token.and_then(non_empty),
            is_verbose: raw.is_verbose,
            config_dir,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_token.trim().is_empty() {
            return Err(Error::Config(
                "api_token (or TELEGRAM_BOT_TOKEN) is required".to_string(),
            ));
        }
        if self.available_ids.is_empty() {
            return Err(Error::Config("available_ids must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.config_dir.join(DB_FILENAME)
    }

    pub fn is_available_id(&self, identity: &Identity) -> bool {
        self.available_ids.contains(identity)
    }

    pub fn is_controllable_service(&self, service: &str) -> bool {
        self.controllable_services.iter().any(|s| s == service)
    }
}

/// The subset of the config the broadcast CLI needs.
///
/// Callers fall back to `CliSettings::default()` when loading fails.
#[derive(Clone, Debug)]
pub struct CliSettings {
    pub cli_port: u16,
    pub cli_auth_token: Option<String>,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            cli_port: DEFAULT_CLI_PORT,
            cli_auth_token: None,
        }
    }
}

impl CliSettings {
    pub fn load() -> Result<Self> {
        let path = config_file_path()?;
        let text = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let raw: ConfigFile = serde_json::from_str(&standardize_json(&text))
            .map_err(|e| Error::Config(format!("invalid {CONFIG_FILENAME}: {e}")))?;
        Ok(Self {
            cli_port: port_or(raw.cli_port, DEFAULT_CLI_PORT),
            cli_auth_token: raw.cli_auth_token.and_then(non_empty),
        })
    }
}

/// `$XDG_CONFIG_HOME/<app>` when absolute, else `~/.config/<app>`.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(xdg) = env_str("XDG_CONFIG_HOME").map(PathBuf::from) {
        if xdg.is_absolute() {
            return Ok(xdg.join(APP_NAME));
        }
    }
    let home = home_dir().ok_or_else(|| Error::Config("HOME is not set".to_string()))?;
    Ok(home.join(".config").join(APP_NAME))
}

fn config_file_path() -> Result<PathBuf> {
    if let Some(p) = env_str("RCB_CONFIG").and_then(non_empty) {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join(CONFIG_FILENAME))
}

/// Strip `//` line comments and trailing commas so hand-edited configs parse as JSON.
pub fn standardize_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            match ch {
                '\\' => {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ',' => {
                let rest: String = chars.clone().collect();
                let next = rest.trim_start();
                let next = skip_line_comments(next);
                if !(next.starts_with('}') || next.starts_with(']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }

    out
}

fn skip_line_comments(mut s: &str) -> &str {
    while let Some(rest) = s.strip_prefix("//") {
        s = match rest.find('\n') {
            Some(i) => rest[i + 1..].trim_start(),
            None => "",
        };
    }
    s
}

fn positive(v: Option<i64>) -> Option<i64> {
    v.filter(|n| *n > 0)
}

fn port_or(v: Option<i64>, default: u16) -> u16 {
    positive(v)
        .and_then(|n| u16::try_from(n).ok())
        .unwrap_or(default)
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}
