//! Command configuration: named process templates and the registry that
//! resolves short names to them.
//!
//! Config files are YAML (JSON is a YAML subset and parses too) with two
//! tables: `command` for locally supervised commands and `remoteCommand`
//! for commands a peer may launch over a connection. Timeouts are given in
//! milliseconds; `0` means unbounded.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("malformed command config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// A named, immutable template describing how to invoke a process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(rename = "shortname", default)]
    pub short_name: String,
    #[serde(default)]
    pub path: String,
    /// Shell-style argument string, tokenized at prepare time.
    #[serde(default)]
    pub args: String,
    /// Execution budget in milliseconds, 0 = unbounded.
    #[serde(rename = "timeout", default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub cwd: String,
    /// Run once, never auto-restarted by the supervision loop.
    #[serde(default)]
    pub oneshot: bool,
}

impl CommandSpec {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(rename = "command", default)]
    local: Vec<CommandSpec>,
    #[serde(rename = "remoteCommand", default)]
    remote: Vec<CommandSpec>,
}

/// Local and remote command tables plus the synthesized default spec.
///
/// Lookups never fail: an empty or unknown short name resolves to the
/// default spec.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    local: Vec<CommandSpec>,
    remote: Vec<CommandSpec>,
    default_spec: CommandSpec,
}

impl CommandRegistry {
    /// Deserialize a registry from raw config bytes. Empty input yields an
    /// empty registry; malformed content is an error the caller should
    /// treat as fatal at startup.
    pub fn from_config(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let file: ConfigFile = serde_yaml::from_slice(bytes)?;
        debug!(
            local = file.local.len(),
            remote = file.remote.len(),
            "loaded command config"
        );
        Ok(Self {
            local: file.local,
            remote: file.remote,
            default_spec: CommandSpec::default(),
        })
    }

    /// Synthesize the default spec: always oneshot, never timed out.
    pub fn set_default(&mut self, path: &str, cwd: &str) -> CommandSpec {
        self.default_spec = CommandSpec {
            short_name: "default".to_string(),
            path: path.to_string(),
            args: String::new(),
            timeout_ms: 0,
            cwd: cwd.to_string(),
            oneshot: true,
        };
        self.default_spec.clone()
    }

    pub fn resolve_local(&self, name: &str) -> &CommandSpec {
        Self::find(&self.local, name).unwrap_or(&self.default_spec)
    }

    pub fn resolve_remote(&self, name: &str) -> &CommandSpec {
        Self::find(&self.remote, name).unwrap_or(&self.default_spec)
    }

    pub fn local_commands(&self) -> &[CommandSpec] {
        &self.local
    }

    fn find<'a>(table: &'a [CommandSpec], name: &str) -> Option<&'a CommandSpec> {
        if name.is_empty() {
            return None;
        }
        table.iter().find(|spec| spec.short_name == name)
    }
}

/// Read raw config bytes from disk. A missing or unreadable file is a
/// recoverable condition: the caller falls back to an empty registry.
pub fn read_config_file(path: Option<&Path>) -> Option<Vec<u8>> {
    let path = path?;
    debug!(configfile = %path.display(), "loading config");
    match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(configfile = %path.display(), error = %err, "config file empty or missing");
            None
        }
    }
}
