//! Service-account credential resolution.
//!
//! Two deployments share one code path: a hosted run gets the key injected as
//! an environment secret, a local run reads a key file from disk.
//!
//! Resolution order (first match wins):
//! 1. Environment secret, when present and non-empty
//! 2. Local key file, when it exists
//! 3. `CredentialsNotFound`, naming both locations
//!
//! A present-but-broken environment secret is reported as such; it never
//! falls through to the file.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::LoadError;

/// Where a bundle was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOrigin {
    Environment(String),
    File(PathBuf),
}

impl std::fmt::Display for CredentialOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialOrigin::Environment(key) => write!(f, "env:{}", key),
            CredentialOrigin::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

/// Resolved service-account key material.
///
/// Kept as the raw JSON mapping; it is only interpreted when the client is
/// authorized.
#[derive(Clone)]
pub struct CredentialBundle {
    pub origin: CredentialOrigin,
    pub material: Map<String, Value>,
}

// Key material must never end up in logs.
impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("origin", &self.origin)
            .field("fields", &self.material.len())
            .finish()
    }
}

/// Inputs the resolver looks at, captured once per resolution.
#[derive(Debug, Clone)]
pub struct CredentialContext {
    pub env_key: String,
    pub env_secret: Option<String>,
    pub local_path: PathBuf,
}

impl CredentialContext {
    /// Snapshot the process environment using the configured key and path.
    pub fn from_env(config: &Config) -> Self {
        let env_key = config.secret_env_key.clone();
        let env_secret = std::env::var(&env_key).ok();
        Self {
            env_key,
            env_secret,
            local_path: PathBuf::from(&config.credentials_path),
        }
    }
}

/// Pick exactly one credential source and load it.
pub fn resolve(ctx: &CredentialContext) -> Result<CredentialBundle, LoadError> {
    if let Some(raw) = ctx.env_secret.as_deref().filter(|s| !is_blank_secret(s)) {
        let material = parse_material(raw).map_err(|e| {
            LoadError::AuthorizationFailed(format!("malformed secret in {}: {}", ctx.env_key, e))
        })?;
        log::info!("Using service-account credentials from env {}", ctx.env_key);
        return Ok(CredentialBundle {
            origin: CredentialOrigin::Environment(ctx.env_key.clone()),
            material,
        });
    }

    if ctx.local_path.exists() {
        let material = read_material(&ctx.local_path)?;
        log::info!(
            "Using service-account credentials from {}",
            ctx.local_path.display()
        );
        return Ok(CredentialBundle {
            origin: CredentialOrigin::File(ctx.local_path.clone()),
            material,
        });
    }

    Err(LoadError::CredentialsNotFound {
        env_key: ctx.env_key.clone(),
        path: ctx.local_path.clone(),
    })
}

fn read_material(path: &Path) -> Result<Map<String, Value>, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        LoadError::AuthorizationFailed(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_material(&content)
        .map_err(|e| LoadError::AuthorizationFailed(format!("{}: {}", path.display(), e)))
}

fn parse_material(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) if !map.is_empty() => Ok(map),
        Ok(Value::Object(_)) => Err("empty key object".to_string()),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// An unset-looking secret: empty, whitespace, or an empty mapping.
fn is_blank_secret(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return true;
    }
    matches!(serde_json::from_str::<Value>(trimmed), Ok(Value::Object(ref m)) if m.is_empty())
}
