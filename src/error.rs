//! Error types for dataset loading
//!
//! Errors are classified by what the dashboard should show:
//! - NoCredentials: nothing configured, the operator must add a key
//! - FetchFailed: credentials exist but the sheet could not be reached or read
//!
//! Rows dropped during cleaning are never errors; they are counted in
//! [`crate::records::CleaningStats`].

use std::path::PathBuf;
use thiserror::Error;

use crate::google_api::GoogleApiError;

/// Failures surfaced at the loader boundary.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("No credentials found: env var {env_key} is unset and {} does not exist", path.display())]
    CredentialsNotFound { env_key: String, path: PathBuf },

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Spreadsheet not found: {0}")]
    SheetNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    // Retryable on the next cache cycle
    #[error("Fetch failed: {0}")]
    TransientFetchFailure(String),

    #[error("Sheet is missing required columns: {}", missing.join(", "))]
    MissingColumns { missing: Vec<String> },
}

/// Presentation-level grouping of a [`LoadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoCredentials,
    FetchFailed,
}

impl LoadError {
    /// Returns true if this error may clear up by itself on a later fetch
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::TransientFetchFailure(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::CredentialsNotFound { .. } => ErrorKind::NoCredentials,
            _ => ErrorKind::FetchFailed,
        }
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            LoadError::CredentialsNotFound { .. } => {
                "Set the service-account secret in the environment or place the key file next to the app."
            }
            LoadError::AuthorizationFailed(_) => {
                "Check that the service-account key is valid and has not been revoked."
            }
            LoadError::SheetNotFound(_) => {
                "Verify the spreadsheet name and that it is shared with the service account."
            }
            LoadError::AccessDenied(_) => "Share the spreadsheet with the service-account email.",
            LoadError::TransientFetchFailure(_) => "Check your internet connection; it will retry shortly.",
            LoadError::MissingColumns { .. } => {
                "Check the header row of the sheet against the configured column names."
            }
        }
    }

    /// Map a low-level API error that happened while opening or reading a sheet.
    pub(crate) fn from_fetch(target: &str, err: GoogleApiError) -> Self {
        match err {
            // 400 is what Sheets answers for a range naming a missing worksheet
            GoogleApiError::ApiError {
                status: 400 | 404,
                ..
            } => LoadError::SheetNotFound(target.to_string()),
            GoogleApiError::ApiError {
                status: 403,
                message,
            } => LoadError::AccessDenied(format!("{}: {}", target, message)),
            GoogleApiError::ApiError {
                status: 401,
                message,
            } => LoadError::AuthorizationFailed(message),
            GoogleApiError::AuthExpired => {
                LoadError::AuthorizationFailed("access token rejected".to_string())
            }
            other => LoadError::TransientFetchFailure(other.to_string()),
        }
    }

    /// Map a low-level API error that happened while authorizing.
    pub(crate) fn from_auth(err: GoogleApiError) -> Self {
        match err {
            GoogleApiError::Http(e) if e.is_timeout() || e.is_connect() => {
                LoadError::TransientFetchFailure(e.to_string())
            }
            GoogleApiError::ApiError { status, message }
                if status == 408 || status == 429 || status >= 500 =>
            {
                LoadError::TransientFetchFailure(format!("token endpoint {}: {}", status, message))
            }
            other => LoadError::AuthorizationFailed(other.to_string()),
        }
    }
}

/// Error view for the presentation layer
#[derive(Debug, Clone)]
pub struct DashboardError {
    pub message: String,
    pub kind: ErrorKind,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

impl From<&LoadError> for DashboardError {
    fn from(err: &LoadError) -> Self {
        DashboardError {
            message: err.to_string(),
            kind: err.kind(),
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_not_found_names_both_locations() {
        let err = LoadError::CredentialsNotFound {
            env_key: "GCP_SERVICE_ACCOUNT".to_string(),
            path: PathBuf::from("credenciales.json"),
        };
        let msg = err.to_string();
        assert!(msg.contains("GCP_SERVICE_ACCOUNT"));
        assert!(msg.contains("credenciales.json"));
        assert_eq!(err.kind(), ErrorKind::NoCredentials);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_fetch_status_mapping() {
        let not_found = LoadError::from_fetch(
            "Datos Lechería",
            GoogleApiError::ApiError {
                status: 404,
                message: "gone".into(),
            },
        );
        assert!(matches!(not_found, LoadError::SheetNotFound(ref n) if n == "Datos Lechería"));

        let denied = LoadError::from_fetch(
            "Datos Lechería",
            GoogleApiError::ApiError {
                status: 403,
                message: "caller lacks permission".into(),
            },
        );
        assert!(matches!(denied, LoadError::AccessDenied(_)));

        let flaky = LoadError::from_fetch(
            "Datos Lechería",
            GoogleApiError::ApiError {
                status: 503,
                message: "backend".into(),
            },
        );
        assert!(flaky.is_retryable());
        assert_eq!(flaky.kind(), ErrorKind::FetchFailed);
    }

    #[test]
    fn test_dashboard_error_from_load_error() {
        let err = LoadError::MissingColumns {
            missing: vec!["Fecha".into(), "Cantidad litros".into()],
        };
        let view = DashboardError::from(&err);
        assert_eq!(view.kind, ErrorKind::FetchFailed);
        assert!(!view.can_retry);
        assert!(view.message.contains("Fecha, Cantidad litros"));
    }
}
