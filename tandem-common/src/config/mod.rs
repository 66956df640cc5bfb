//! Configuration for Tandem.
//!
//! Values are layered: built-in defaults, then `config.toml`, then
//! `TANDEM_*` environment variables. The file lives at
//! `<config_dir>/tandem/config.toml` unless `--config` names another one.

pub mod env;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};

use crate::errors::ErrorCode;
use crate::identity::Identity;
use crate::remote::RemoteHost;
use crate::shell::join_remote;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_PATH: &str = "~/tandem";
pub const DEFAULT_CONTAINER_PREFIX: &str = "tandem";
pub const DEFAULT_CONTAINER_IMAGE: &str = "debian:bookworm";
/// Eight hours.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 60 * 60;
const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;
const MAX_PROJECT_NAME_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid environment: {}", join_errors(.0))]
    Env(Vec<EnvError>),

    #[error("project '{0}' is not configured")]
    ProjectNotFound(String),

    #[error("no remote host configured")]
    RemoteMissing,

    #[error("invalid project '{name}': {reason}")]
    InvalidProject { name: String, reason: String },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn join_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::ConfigNotFound,
            Self::Read { .. } => ErrorCode::ConfigReadError,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Env(_) => ErrorCode::ConfigEnvError,
            Self::ProjectNotFound(_) => ErrorCode::ConfigProjectNotFound,
            Self::RemoteMissing => ErrorCode::ConfigRemoteMissing,
            Self::InvalidProject { .. } => ErrorCode::ConfigInvalidProject,
            Self::Write { .. } => ErrorCode::ConfigWriteError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// SSH destination, or `local` to run remote commands on this machine.
    pub host: String,
    /// Directory on the remote host holding projects and `.locks/`.
    pub base_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            identity_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub name_prefix: String,
    /// Image used when the container does not exist yet.
    pub image: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_CONTAINER_PREFIX.to_string(),
            image: DEFAULT_CONTAINER_IMAGE.to_string(),
        }
    }
}

/// Overrides for the detected machine identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// A `[projects.<name>]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    /// Local checkout; `~` is expanded.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TandemConfig {
    pub remote: RemoteConfig,
    pub session: SessionConfig,
    pub container: ContainerConfig,
    pub identity: IdentityConfig,
    pub projects: BTreeMap<String, ProjectSpec>,
}

/// A project with both of its locations worked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProject {
    pub name: String,
    pub local_path: PathBuf,
    /// `<base_path>/<name>` on the remote host.
    pub remote_path: String,
    /// Name shared by the container and the sync session.
    pub resource_name: String,
}

impl TandemConfig {
    /// `<config_dir>/tandem/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tandem")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the file, then apply environment overrides.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Self::load_from(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path)?,
                _ => {
                    debug!("no configuration file; using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw, path)?;
        debug!(path = %path.display(), projects = config.projects.len(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        for name in config.projects.keys() {
            validate_project_name(name)?;
        }
        Ok(config)
    }

    /// Overlay `TANDEM_*` variables. Every bad value is reported together.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let mut parser = EnvParser::new();

        if let Some(host) = parser.get_optional_string("REMOTE_HOST").value {
            self.remote.host = host;
        }
        if let Some(base) = parser.get_optional_string("REMOTE_BASE_PATH").value {
            self.remote.base_path = base;
        }
        if let Some(identity_file) = parser.get_optional_path("REMOTE_IDENTITY_FILE").value {
            self.remote.identity_file = Some(identity_file);
        }
        let ttl = parser.get_u64_range(
            "SESSION_TTL_SECS",
            self.session.ttl_secs,
            1,
            MAX_SESSION_TTL_SECS,
        );
        if ttl.is_from_env() {
            self.session.ttl_secs = ttl.value;
        }
        if let Some(machine) = parser.get_optional_string("MACHINE").value {
            self.identity.machine = Some(machine);
        }
        if let Some(user) = parser.get_optional_string("USER").value {
            self.identity.user = Some(user);
        }

        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        let body = toml::to_string_pretty(self).map_err(|e| {
            write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
        })?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        fs::write(path, body).map_err(write_err)?;
        debug!(path = %path.display(), "saved configuration");
        Ok(())
    }

    pub fn remote_host(&self) -> Result<RemoteHost, ConfigError> {
        let destination = self.remote.host.trim();
        if destination.is_empty() {
            return Err(ConfigError::RemoteMissing);
        }
        let mut host = RemoteHost::new(destination);
        if let Some(ref key) = self.remote.identity_file {
            let expanded = shellexpand::tilde(&key.to_string_lossy()).into_owned();
            host = host.with_identity_file(expanded);
        }
        Ok(host)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.ttl_secs.clamp(1, MAX_SESSION_TTL_SECS))
    }

    /// Detected identity with configured overrides applied.
    pub fn identity(&self) -> Identity {
        Identity::detect().with_overrides(
            self.identity.machine.as_deref(),
            self.identity.user.as_deref(),
        )
    }

    /// Resolve a project declared under `[projects]`.
    pub fn project(&self, name: &str) -> Result<ResolvedProject, ConfigError> {
        validate_project_name(name)?;
        let spec = self
            .projects
            .get(name)
            .ok_or_else(|| ConfigError::ProjectNotFound(name.to_string()))?;
        Ok(self.resolve(name, &spec.path))
    }

    /// Resolve a project from an explicit local path, configured or not.
    pub fn project_at(&self, name: &str, local_path: &Path) -> Result<ResolvedProject, ConfigError> {
        validate_project_name(name)?;
        Ok(self.resolve(name, local_path))
    }

    /// Add or update a `[projects]` entry.
    pub fn register_project(&mut self, name: &str, local_path: &Path) -> Result<bool, ConfigError> {
        validate_project_name(name)?;
        let spec = ProjectSpec {
            path: local_path.to_path_buf(),
        };
        let changed = self.projects.get(name) != Some(&spec);
        self.projects.insert(name.to_string(), spec);
        Ok(changed)
    }

    pub fn forget_project(&mut self, name: &str) -> bool {
        self.projects.remove(name).is_some()
    }

    fn resolve(&self, name: &str, local_path: &Path) -> ResolvedProject {
        let local = shellexpand::tilde(&local_path.to_string_lossy()).into_owned();
        ResolvedProject {
            name: name.to_string(),
            local_path: PathBuf::from(local),
            remote_path: join_remote(&self.remote.base_path, name),
            resource_name: format!("{}-{}", self.container.name_prefix, name),
        }
    }
}

/// Project names become path segments on the remote host.
pub fn validate_project_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidProject {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_PROJECT_NAME_LEN {
        return Err(invalid("name is longer than 64 characters"));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err(invalid("name may not start with '.' or '-'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(invalid("only letters, digits, '.', '-' and '_' are allowed"));
    }
    Ok(())
}

/// Project name implied by a directory: its final component.
pub fn project_name_from_path(path: &Path) -> Result<String, ConfigError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ConfigError::InvalidProject {
            name: path.display().to_string(),
            reason: "path has no final component".to_string(),
        })?;
    validate_project_name(&name)?;
    Ok(name)
}
