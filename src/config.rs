use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use directories::BaseDirs;
use serde::Deserialize;
use tracing::warn;

use crate::model::Position;
use crate::platform::location::{CommandLocation, FixedLocation, LocationSource, NoLocation};
use crate::platform::sms::{CommandDispatcher, PrintDispatcher, SmsHandler};
use crate::platform::{CommandExec, LocationOptions};

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_NAME: &str = "ridealert";

#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub address_book: PathBuf,
    pub db_path: Option<PathBuf>,
    pub phone_region: Option<String>,
    pub location: LocationConfig,
    pub commands: Commands,
}

// =============================================================================
// Location Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct LocationConfig {
    /// Fixed coordinates used when no command is configured
    pub fixed: Option<Position>,
    /// Helper printing `lat,lon`; takes precedence over `fixed`
    pub command: Option<CommandExec>,
    pub options: LocationOptions,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            fixed: None,
            command: None,
            options: LocationOptions::default(),
        }
    }
}

impl LocationConfig {
    pub fn provider(&self) -> LocationSource {
        if let Some(command) = &self.command {
            LocationSource::Command(CommandLocation::new(command.clone()))
        } else if let Some(position) = self.fixed {
            LocationSource::Fixed(FixedLocation::new(position))
        } else {
            LocationSource::Unconfigured(NoLocation)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct LocationFile {
    latitude: Option<f64>,
    longitude: Option<f64>,
    command: Option<CommandDef>,
    timeout_secs: u64,
    maximum_age_secs: u64,
    high_accuracy: bool,
}

impl Default for LocationFile {
    fn default() -> Self {
        let defaults = LocationOptions::default();
        Self {
            latitude: None,
            longitude: None,
            command: None,
            timeout_secs: defaults.timeout.as_secs(),
            maximum_age_secs: defaults.maximum_age.as_secs(),
            high_accuracy: defaults.high_accuracy,
        }
    }
}

impl LocationFile {
    fn into_config(self) -> Result<LocationConfig> {
        let fixed = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => {
                let position = Position::new(latitude, longitude);
                if !position.is_valid() {
                    bail!(
                        "location coordinates out of range: {}, {}",
                        latitude,
                        longitude
                    );
                }
                Some(position)
            }
            (None, None) => None,
            _ => bail!("location.latitude and location.longitude must be set together"),
        };

        if self.timeout_secs == 0 {
            bail!("location.timeout_secs must be greater than zero");
        }

        Ok(LocationConfig {
            fixed,
            command: self.command.and_then(CommandExec::from_def),
            options: LocationOptions {
                high_accuracy: self.high_accuracy,
                timeout: Duration::from_secs(self.timeout_secs),
                maximum_age: Duration::from_secs(self.maximum_age_secs),
            },
        })
    }
}

// =============================================================================
// Commands config
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Commands {
    /// Handler receiving the `sms:` URL as its last argument
    pub sms: Option<CommandExec>,
}

impl Commands {
    pub fn sms_handler(&self, print_only: bool) -> SmsHandler {
        if print_only {
            return SmsHandler::Print(PrintDispatcher);
        }
        let dispatcher = match &self.sms {
            Some(command) => {
                CommandDispatcher::new(command.clone()).with_fallback(CommandExec::system_opener())
            }
            None => CommandDispatcher::new(CommandExec::system_opener()),
        };
        SmsHandler::Command(dispatcher)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CommandsFile {
    sms: Option<CommandDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum CommandDef {
    Simple(String),
    List(Vec<String>),
}

impl From<CommandsFile> for Commands {
    fn from(file: CommandsFile) -> Self {
        Self {
            sms: file.sms.and_then(CommandExec::from_def),
        }
    }
}

impl CommandExec {
    fn from_def(def: CommandDef) -> Option<Self> {
        match def {
            CommandDef::Simple(cmd) => {
                let trimmed = cmd.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Self::new(trimmed))
                }
            }
            CommandDef::List(mut parts) => {
                if parts.is_empty() {
                    return None;
                }
                let program = parts.remove(0);
                Some(Self::new(program).with_args(parts))
            }
        }
    }
}

// =============================================================================
// File layout and loading
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    address_book: Option<PathBuf>,
    db_path: Option<PathBuf>,
    phone_region: Option<String>,
    location: LocationFile,
    commands: CommandsFile,
}

/// Expand ~ to home directory in paths
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

fn config_root() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    Ok(base.config_dir().join(APP_NAME))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE_NAME))
}

/// Load from `path`, or from the default location when `None`.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_path()?,
    };
    if !path.exists() {
        bail!(
            "configuration file not found at {}. Create it with at least \
             `address_book = \"<directory of .vcf files>\"` (see config.example.toml), \
             or pass --config <PATH>.",
            path.display()
        );
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration file at {}", path.display()))?;
    parse(&raw, path)
}

pub fn parse(raw: &str, config_path: PathBuf) -> Result<Config> {
    let value: toml::Value = toml::from_str(raw)
        .with_context(|| format!("failed to parse {} as TOML", config_path.display()))?;

    warn_unknown_keys(&value);

    let cfg_file: ConfigFile = value
        .try_into()
        .with_context(|| format!("failed to deserialize config from {}", config_path.display()))?;

    let address_book = cfg_file
        .address_book
        .map(|path| expand_tilde(&path))
        .ok_or_else(|| anyhow!("`address_book` must be specified in configuration"))?;

    let phone_region = cfg_file
        .phone_region
        .as_ref()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_ascii_uppercase());

    let location = cfg_file
        .location
        .into_config()
        .with_context(|| "failed to parse location configuration")?;

    Ok(Config {
        config_path,
        address_book,
        db_path: cfg_file.db_path.map(|path| expand_tilde(&path)),
        phone_region,
        location,
        commands: cfg_file.commands.into(),
    })
}

// =============================================================================
// Unknown key warnings
// =============================================================================

fn warn_unknown_keys(value: &toml::Value) {
    let Some(table) = value.as_table() else {
        return;
    };

    let known = HashSet::from([
        "address_book",
        "db_path",
        "phone_region",
        "location",
        "commands",
    ]);

    for key in table.keys() {
        if !known.contains(key.as_str()) {
            warn!("unknown configuration key `{}`", key);
        }
    }

    if let Some(location) = table.get("location") {
        warn_unknown_in_context(
            location,
            "location",
            &[
                "latitude",
                "longitude",
                "command",
                "timeout_secs",
                "maximum_age_secs",
                "high_accuracy",
            ],
        );
    }

    if let Some(commands) = table.get("commands") {
        warn_unknown_in_context(commands, "commands", &["sms"]);
    }
}

fn warn_unknown_in_context(value: &toml::Value, context: &str, known: &[&str]) {
    let Some(table) = value.as_table() else {
        return;
    };
    for key in table.keys() {
        if !known.contains(&key.as_str()) {
            warn!("unknown {}.* entry `{}`", context, key);
        }
    }
}
