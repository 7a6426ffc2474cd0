//! Configuration file parsing.
//!
//! Out of scope per spec.md §1 ("the configuration file parser ... specified
//! only by the interface the core consumes"); this module is the small
//! concrete implementation the core is built against, in the shape
//! `ellidri::config::StateConfig` takes: a `serde`-derived struct loaded
//! from YAML.

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/ircd/ircd.yaml";

#[derive(Debug, Deserialize)]
pub struct OperConfig {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UlineConfig {
    pub server: String,
}

/// A listening port, optionally bound to a named I/O hook (spec.md §4.K).
#[derive(Debug, Deserialize)]
pub struct BindConfig {
    pub port: u16,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub io_hook: Option<String>,
}

fn default_nicklen() -> usize { 30 }
fn default_channellen() -> usize { 64 }
fn default_topiclen() -> usize { 307 }
fn default_kicklen() -> usize { 307 }
fn default_maxtargets() -> usize { 20 }
fn default_awaylen() -> usize { 200 }
fn default_maxchannels() -> usize { 20 }
fn default_modes() -> usize { 20 }
fn default_network() -> String { "IRCNet".to_owned() }
fn default_pidfile() -> String { "/var/run/ircd.pid".to_owned() }
fn default_modpath() -> String { "/usr/lib/ircd/modules".to_owned() }

fn default_org() -> String { "Unknown".to_owned() }

#[derive(Debug, Deserialize)]
pub struct Config {
    pub domain: String,
    #[serde(default = "default_network")]
    pub network: String,

    #[serde(default = "default_org")]
    pub org_name: String,
    #[serde(default = "default_org")]
    pub org_location: String,
    #[serde(default = "default_org")]
    pub org_mail: String,

    #[serde(default)]
    pub bind: Vec<BindConfig>,

    #[serde(default = "default_nicklen")]
    pub nicklen: usize,
    #[serde(default = "default_channellen")]
    pub channellen: usize,
    #[serde(default = "default_topiclen")]
    pub topiclen: usize,
    #[serde(default = "default_kicklen")]
    pub kicklen: usize,
    #[serde(default = "default_maxtargets")]
    pub maxtargets: usize,
    #[serde(default = "default_awaylen")]
    pub awaylen: usize,
    #[serde(default = "default_maxchannels")]
    pub maxchannels: usize,
    #[serde(default = "default_modes")]
    pub modes: usize,

    #[serde(default)]
    pub motd_file: Option<PathBuf>,
    #[serde(default = "default_pidfile")]
    pub pid_file: String,
    #[serde(default = "default_modpath")]
    pub module_path: String,

    #[serde(default)]
    pub opers: Vec<OperConfig>,
    #[serde(default)]
    pub ulines: Vec<UlineConfig>,
    #[serde(default)]
    pub static_modules: Vec<String>,
    #[serde(default)]
    pub load_modules: Vec<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_yaml::Error),
    NoPorts,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "cannot parse config file: {}", e),
            ConfigError::NoPorts => write!(f, "no ports configured to bind"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Config = serde_yaml::from_str(&text).map_err(ConfigError::Parse)?;
        if config.bind.is_empty() {
            return Err(ConfigError::NoPorts);
        }
        Ok(config)
    }

    /// Builds the value tokens for the `005 ISUPPORT` numeric, per spec.md
    /// §6.
    pub fn isupport_tokens(&self) -> Vec<String> {
        vec![
            "WALLCHOPS".to_owned(),
            "WALLVOICES".to_owned(),
            format!("MODES={}", self.modes),
            "CHANTYPES=#".to_owned(),
            "PREFIX=(ohv)@%+".to_owned(),
            "MAP".to_owned(),
            format!("MAXCHANNELS={}", self.maxchannels),
            "MAXBANS=60".to_owned(),
            "VBANLIST".to_owned(),
            format!("NICKLEN={}", self.nicklen),
            "CASEMAPPING=rfc1459".to_owned(),
            "STATUSMSG=@%+".to_owned(),
            "CHARSET=ascii".to_owned(),
            format!("TOPICLEN={}", self.topiclen),
            format!("KICKLEN={}", self.kicklen),
            format!("MAXTARGETS={}", self.maxtargets),
            format!("AWAYLEN={}", self.awaylen),
            "CHANMODES=b,k,l,psmnti".to_owned(),
            "FNC".to_owned(),
            format!("NETWORK={}", self.network),
            "MAXPARA=32".to_owned(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isupport_contains_required_tokens() {
        let config = Config {
            domain: "irc.example.net".to_owned(),
            network: "ExampleNet".to_owned(),
            org_name: default_org(), org_location: default_org(), org_mail: default_org(),
            bind: vec![BindConfig { port: 6667, address: None, io_hook: None }],
            nicklen: 30, channellen: 64, topiclen: 307, kicklen: 307,
            maxtargets: 20, awaylen: 200, maxchannels: 20, modes: 20,
            motd_file: None, pid_file: default_pidfile(), module_path: default_modpath(),
            opers: Vec::new(), ulines: Vec::new(), static_modules: Vec::new(),
            load_modules: Vec::new(),
        };
        let tokens = config.isupport_tokens();
        assert!(tokens.iter().any(|t| t == "PREFIX=(ohv)@%+"));
        assert!(tokens.iter().any(|t| t == "CASEMAPPING=rfc1459"));
        assert!(tokens.iter().any(|t| t.starts_with("NICKLEN=")));
    }
}
