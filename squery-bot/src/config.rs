//! Bot configuration.
//!
//! Settings come from three layers, highest priority first: command-line
//! flags, the TOML file (`~/.config/squery/bot.toml` by default), built-in
//! defaults. A missing file is fine; a file that exists but does not parse
//! is a startup error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use squery_sdk::SessionConfig;

/// Default ServerQuery port.
pub const DEFAULT_QUERY_PORT: u16 = 10011;

/// Command-line flags. Every flag overrides the matching file setting.
#[derive(Debug, Default, Parser)]
#[command(name = "squery-bot", about = "Moderation bot for ServerQuery servers")]
pub struct Cli {
    /// Config file (default: <config dir>/squery/bot.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Server host
    #[arg(long)]
    pub host: Option<String>,

    /// ServerQuery port
    #[arg(long)]
    pub port: Option<u16>,

    /// Query login name
    #[arg(long)]
    pub username: Option<String>,

    /// Query login password
    #[arg(long, env = "SQUERY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Virtual server to bind (0 for a server-bound login)
    #[arg(long)]
    pub server_id: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub timeouts: TimeoutSection,
    pub reconnect: ReconnectSection,
    pub commands: CommandsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub query_port: u16,
    pub username: String,
    pub password: String,
    /// `0` skips `use` for logins already bound to a server.
    pub server_id: u64,
    /// Display name set with `clientupdate` after binding.
    pub nickname: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            query_port: DEFAULT_QUERY_PORT,
            username: "serveradmin".to_string(),
            password: String::new(),
            server_id: 1,
            nickname: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSection {
    pub connect_secs: u64,
    pub command_secs: u64,
    pub liveness_secs: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            command_secs: 10,
            liveness_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSection {
    pub delay_secs: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            delay_secs: 5,
            max_attempts: 5,
        }
    }
}

/// Chat command settings: prefix, required server groups, default texts.
///
/// A group of `0` leaves the command unrestricted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub prefix: String,
    pub poke_group: u64,
    pub move_group: u64,
    pub kick_group: u64,
    pub default_poke_text: String,
    pub default_kick_text: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            poke_group: 25770,
            move_group: 25771,
            kick_group: 25787,
            default_poke_text: "Mass poke from the moderation bot!".to_string(),
            default_kick_text: "Server cleanup".to_string(),
        }
    }
}

/// `<config dir>/squery/bot.toml`.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("squery")
        .join("bot.toml")
}

impl Config {
    /// Read the file at `path`; defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("can't read config file {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("bad config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load the file named by `--config` (or the default path) and apply the
    /// remaining flags on top.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let path = cli.config.clone().unwrap_or_else(default_path);
        let mut config = Self::load(&path)?;
        config.apply(cli);
        Ok(config)
    }

    pub fn apply(&mut self, cli: &Cli) {
        let server = &mut self.server;
        if let Some(host) = &cli.host {
            server.host = host.clone();
        }
        if let Some(port) = cli.port {
            server.query_port = port;
        }
        if let Some(username) = &cli.username {
            server.username = username.clone();
        }
        if let Some(password) = &cli.password {
            server.password = password.clone();
        }
        if let Some(server_id) = cli.server_id {
            server.server_id = server_id;
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.server.host.clone(),
            port: self.server.query_port,
            username: self.server.username.clone(),
            password: self.server.password.clone(),
            server_id: (self.server.server_id != 0).then_some(self.server.server_id),
            nickname: self.server.nickname.clone().filter(|n| !n.is_empty()),
            connect_timeout: Duration::from_secs(self.timeouts.connect_secs),
            command_timeout: Duration::from_secs(self.timeouts.command_secs),
            liveness_interval: Duration::from_secs(self.timeouts.liveness_secs.max(1)),
            reconnect_delay: Duration::from_secs(self.reconnect.delay_secs),
            max_reconnect_attempts: self.reconnect.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.query_port, 10011);
        assert_eq!(config.commands.kick_group, 25787);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
host = "ts.example.org"
password = "secret"
nickname = "Harmonia"

[commands]
prefix = "."
move_group = 0
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.host, "ts.example.org");
        assert_eq!(config.server.query_port, 10011);
        assert_eq!(config.server.username, "serveradmin");
        assert_eq!(config.commands.prefix, ".");
        assert_eq!(config.commands.move_group, 0);
        assert_eq!(config.commands.poke_group, 25770);
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nquery_port = \"not a number\"").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("bad config file"));
    }

    #[test]
    fn flags_override_file() {
        let mut config = Config::default();
        config.server.host = "from-file".to_string();
        config.server.username = "file-user".to_string();

        config.apply(&Cli {
            host: Some("from-cli".to_string()),
            port: Some(10022),
            password: Some("pw".to_string()),
            ..Default::default()
        });

        assert_eq!(config.server.host, "from-cli");
        assert_eq!(config.server.query_port, 10022);
        assert_eq!(config.server.username, "file-user");
        assert_eq!(config.server.password, "pw");
    }

    #[test]
    fn session_config_conversion() {
        let mut config = Config::default();
        config.timeouts.command_secs = 3;
        config.server.nickname = Some(String::new());
        let session = config.session_config();
        assert_eq!(session.server_id, Some(1));
        assert_eq!(session.nickname, None);
        assert_eq!(session.command_timeout, Duration::from_secs(3));
        assert_eq!(session.max_reconnect_attempts, 5);

        config.server.server_id = 0;
        assert_eq!(config.session_config().server_id, None);
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::try_parse_from(["squery-bot", "--host", "10.0.0.2", "--server-id", "3"]).unwrap();
        assert_eq!(cli.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(cli.server_id, Some(3));
        assert!(cli.port.is_none());
    }
}
