//! Service-account authorization (OAuth2 JWT bearer grant).
//!
//! Signs an RS256 assertion with the key's private key, posts it to the
//! key's `token_uri`, and returns a short-lived access token. There is no
//! refresh token in this flow; a new assertion is signed each time.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::{Map, Value};

use super::{send_with_retry, GoogleApiError, RetryPolicy, ServiceAccountKey, SCOPES};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Google caps assertion lifetime at one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Bearer token for Drive/Sheets calls.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Interpret a raw key mapping as a service-account key.
pub fn key_from_material(material: &Map<String, Value>) -> Result<ServiceAccountKey, GoogleApiError> {
    let key: ServiceAccountKey = serde_json::from_value(Value::Object(material.clone()))
        .map_err(|e| GoogleApiError::InvalidCredentials(e.to_string()))?;

    if let Some(kind) = key.key_type.as_deref() {
        if kind != "service_account" {
            return Err(GoogleApiError::InvalidCredentials(format!(
                "expected a service_account key, got {}",
                kind
            )));
        }
    }
    if key.private_key.trim().is_empty() || key.client_email.trim().is_empty() {
        return Err(GoogleApiError::InvalidCredentials(
            "private_key and client_email must be set".to_string(),
        ));
    }
    Ok(key)
}

/// Sign the JWT assertion presented to the token endpoint.
pub fn build_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String, GoogleApiError> {
    // Keys pasted into secret stores often carry literal "\n" sequences.
    let pem = key.private_key.replace("\\n", "\n");
    let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: SCOPES.join(" "),
        aud: &key.token_uri,
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };

    Ok(encode(&header, &claims, &encoding_key)?)
}

/// Exchange a signed assertion for an access token.
pub async fn fetch_access_token(
    client: &reqwest::Client,
    key: &ServiceAccountKey,
    policy: &RetryPolicy,
) -> Result<AccessToken, GoogleApiError> {
    let now = Utc::now();
    let assertion = build_assertion(key, now)?;

    let request = client
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())]);
    let resp = send_with_retry(request, policy).await?;

    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(map_exchange_error(status.as_u16(), &body));
    }

    let token = parse_token_response(&body, now)?;
    log::debug!(
        "Service account {} authorized until {}",
        key.client_email,
        token.expires_at
    );
    Ok(token)
}

fn parse_token_response(body: &str, now: DateTime<Utc>) -> Result<AccessToken, GoogleApiError> {
    let body: Value = serde_json::from_str(body)?;

    let access_token = body["access_token"]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GoogleApiError::TokenExchange("No access_token in response".into()))?;

    let expires_in = body["expires_in"].as_i64().unwrap_or(3600);

    Ok(AccessToken {
        token: access_token.to_string(),
        expires_at: now + Duration::seconds(expires_in),
    })
}

fn map_exchange_error(status: u16, body: &str) -> GoogleApiError {
    let lowered = body.to_lowercase();
    if (status == 400 || status == 401)
        && (lowered.contains("invalid_grant") || lowered.contains("invalid_client"))
    {
        return GoogleApiError::TokenExchange(format!(
            "key rejected by token endpoint (HTTP {}): {}",
            status,
            body.trim()
        ));
    }
    // Throttled or timed out: transient, not a key problem
    if status == 408 || status == 429 || status >= 500 {
        return GoogleApiError::ApiError {
            status,
            message: body.trim().to_string(),
        };
    }
    GoogleApiError::TokenExchange(format!("HTTP {}: {}", status, body.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(json: &str) -> Map<String, Value> {
        match serde_json::from_str::<Value>(json).unwrap() {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_key_from_material_accepts_service_account() {
        let key = key_from_material(&material(
            r#"{"type":"service_account","client_email":"svc@p.iam.gserviceaccount.com","private_key":"pem"}"#,
        ))
        .unwrap();
        assert_eq!(key.client_email, "svc@p.iam.gserviceaccount.com");
    }

    #[test]
    fn test_key_from_material_rejects_oauth_client_file() {
        let err = key_from_material(&material(
            r#"{"type":"authorized_user","client_email":"a@b.c","private_key":"pem"}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, GoogleApiError::InvalidCredentials(_)));
    }

    #[test]
    fn test_key_from_material_rejects_missing_fields() {
        let err = key_from_material(&material(r#"{"installed":{"client_id":"x"}}"#)).unwrap_err();
        assert!(matches!(err, GoogleApiError::InvalidCredentials(_)));

        let err = key_from_material(&material(
            r#"{"client_email":"a@b.c","private_key":"   "}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, GoogleApiError::InvalidCredentials(_)));
    }

    #[test]
    fn test_build_assertion_rejects_bad_pem() {
        let key = key_from_material(&material(
            r#"{"client_email":"svc@p.iam.gserviceaccount.com","private_key":"not a pem"}"#,
        ))
        .unwrap();
        let err = build_assertion(&key, Utc::now()).unwrap_err();
        assert!(matches!(err, GoogleApiError::Signing(_)));
    }

    #[test]
    fn test_parse_token_response() {
        let now = Utc::now();
        let token = parse_token_response(
            r#"{"access_token":"ya29.sa-token","expires_in":1800,"token_type":"Bearer"}"#,
            now,
        )
        .unwrap();
        assert_eq!(token.token, "ya29.sa-token");
        assert_eq!(token.expires_at, now + Duration::seconds(1800));
    }

    #[test]
    fn test_parse_token_response_defaults_expiry() {
        let now = Utc::now();
        let token = parse_token_response(r#"{"access_token":"t"}"#, now).unwrap();
        assert_eq!(token.expires_at, now + Duration::seconds(3600));
    }

    #[test]
    fn test_parse_token_response_missing_token() {
        let err = parse_token_response(r#"{"error":"invalid_grant"}"#, Utc::now()).unwrap_err();
        assert!(matches!(err, GoogleApiError::TokenExchange(_)));
    }

    #[test]
    fn test_map_exchange_error() {
        let err = map_exchange_error(400, r#"{"error":"invalid_grant","error_description":"Invalid JWT Signature."}"#);
        assert!(matches!(err, GoogleApiError::TokenExchange(ref m) if m.contains("rejected")));

        let err = map_exchange_error(503, "unavailable");
        assert!(matches!(err, GoogleApiError::ApiError { status: 503, .. }));
    }

    #[test]
    fn test_throttled_exchange_is_retryable() {
        use crate::error::LoadError;

        for status in [408, 429, 500, 503] {
            let err = LoadError::from_auth(map_exchange_error(status, "rateLimitExceeded"));
            assert!(err.is_retryable(), "status {} not retryable: {:?}", status, err);
        }

        let rejected = LoadError::from_auth(map_exchange_error(400, r#"{"error":"invalid_grant"}"#));
        assert!(matches!(rejected, LoadError::AuthorizationFailed(_)));
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn test_access_token_debug_hides_token() {
        let token = AccessToken {
            token: "ya29.secret".to_string(),
            expires_at: Utc::now(),
        };
        assert!(!format!("{:?}", token).contains("ya29"));
    }
}
