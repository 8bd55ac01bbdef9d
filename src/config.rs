//! Engine configuration (`gantry.toml`).
//!
//! Node-level settings: the canonical origin URL submodule subscriptions
//! resolve against, the service identity used as committer for merges and
//! gitlink updates, and behavior knobs for meta refs, cherry-pick vote
//! copying, and superproject update messages.

use std::fmt;
use std::path::Path;

use gantry_core::Verbosity;
use gantry_git::Persona;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
///
/// Parsed from `gantry.toml`. Missing fields use sensible defaults. Missing
/// file → all defaults (no error).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
#[derive(Default)]
pub struct EngineConfig {
    /// Server-level settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Service identity used as committer for server-created commits.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Review metadata settings.
    #[serde(default)]
    pub review: ReviewConfig,

    /// Submit-on-push settings.
    #[serde(default)]
    pub submit: SubmitConfig,

    /// Superproject subscription settings.
    #[serde(default)]
    pub submodules: SubmoduleConfig,
}

impl EngineConfig {
    /// The canonical origin with any trailing slash removed, so project
    /// names can be appended with a single `/`.
    #[must_use]
    pub fn canonical_origin(&self) -> &str {
        self.server.origin.trim_end_matches('/')
    }

    /// The service identity stamped with `when` (unix seconds).
    #[must_use]
    pub fn service_persona(&self, when: i64) -> Persona {
        Persona {
            name: self.service.name.clone(),
            email: self.service.email.clone(),
            when,
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Server-level settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Canonical origin URL of this node. `.gitmodules` URLs must resolve
    /// under it to count as subscriptions (default:
    /// `"http://localhost:8080"`).
    #[serde(default = "default_origin")]
    pub origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
        }
    }
}

fn default_origin() -> String {
    "http://localhost:8080".to_owned()
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Committer identity for merge commits, cherry-picks, and gitlink updates.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name (default: `"Gantry Code Review"`).
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Email address (default: `"gantry@localhost"`).
    #[serde(default = "default_service_email")]
    pub email: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            email: default_service_email(),
        }
    }
}

fn default_service_name() -> String {
    "Gantry Code Review".to_owned()
}

fn default_service_email() -> String {
    "gantry@localhost".to_owned()
}

// ---------------------------------------------------------------------------
// ReviewConfig
// ---------------------------------------------------------------------------

/// Review metadata settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewConfig {
    /// Advertise `refs/changes/<nn>/<change>/meta` review-history refs.
    ///
    /// Off unless the metadata write-path is enabled; when off, meta refs
    /// are omitted from advertisements regardless of permission.
    #[serde(default)]
    pub meta_refs: bool,
}

// ---------------------------------------------------------------------------
// SubmitConfig
// ---------------------------------------------------------------------------

/// Submit-on-push settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitConfig {
    /// Copy votes from the submitted patch set onto the patch set a
    /// cherry-pick submit creates.
    #[serde(default)]
    pub copy_votes_on_cherry_pick: bool,
}

// ---------------------------------------------------------------------------
// SubmoduleConfig
// ---------------------------------------------------------------------------

/// Superproject subscription settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmoduleConfig {
    /// How much gitlink-update commit messages describe the new commits.
    #[serde(default)]
    pub update_verbosity: Verbosity,

    /// Cap on submodule commit subjects listed per gitlink update
    /// (default: 10).
    #[serde(default = "default_max_update_subjects")]
    pub max_update_subjects: usize,
}

impl Default for SubmoduleConfig {
    fn default() -> Self {
        Self {
            update_verbosity: Verbosity::default(),
            max_update_subjects: default_max_update_subjects(),
        }
    }
}

const fn default_max_update_subjects() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading an engine configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<std::path::PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML or unknown fields,
    ///   returns a [`ConfigError`] with line-level detail.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse
    /// errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                // Calculate line number from byte offset.
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
