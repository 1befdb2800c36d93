use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// A captured OAuth2 grant, as returned by a token endpoint after code exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    /// Empty when the grant carried no refresh token.
    pub refresh_token: String,
    pub token_type: String,
    /// Lifetime of the access token, in seconds.
    pub expires_in: i64,
    pub scope: String,
    /// The token endpoint body exactly as received.
    pub raw_response: String,
}

/// Wire shape of a standard OAuth2 token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenRecord {
    /// Parse a token endpoint JSON body, keeping the raw text alongside the fields.
    pub fn from_raw_response(raw: &str) -> StoreResult<Self> {
        let parsed: TokenResponse = serde_json::from_str(raw)?;
        Ok(Self {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token.unwrap_or_default(),
            token_type: parsed.token_type.unwrap_or_else(|| "bearer".into()),
            expires_in: parsed.expires_in.unwrap_or(0),
            scope: parsed.scope.unwrap_or_default(),
            raw_response: raw.to_string(),
        })
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

/// A token record read back from history, with the time it was saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredToken {
    /// Milliseconds since epoch. Not seconds: the poll cursor uses seconds.
    pub retrieved_at_ms: i64,
    pub token: TokenRecord,
}

impl StoredToken {
    pub fn expires_at_ms(&self) -> i64 {
        self.retrieved_at_ms
            .saturating_add(self.token.expires_in.saturating_mul(1000))
    }

    /// Whether the access token has lapsed at `now_ms`. A zero lifetime never expires.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.token.expires_in > 0 && now_ms >= self.expires_at_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_response_full() {
        let raw = r#"{"access_token":"at-1","refresh_token":"rt-1","token_type":"bearer","expires_in":3600,"scope":"fspt-r","xoauth_yahoo_guid":"G"}"#;
        let token = TokenRecord::from_raw_response(raw).unwrap();
        assert_eq!(token.access_token, "at-1");
        assert_eq!(token.refresh_token, "rt-1");
        assert_eq!(token.token_type, "bearer");
        assert_eq!(token.expires_in, 3600);
        assert_eq!(token.scope, "fspt-r");
        assert_eq!(token.raw_response, raw);
        assert!(token.has_refresh_token());
    }

    #[test]
    fn test_from_raw_response_minimal() {
        let token = TokenRecord::from_raw_response(r#"{"access_token":"only"}"#).unwrap();
        assert_eq!(token.refresh_token, "");
        assert_eq!(token.expires_in, 0);
        assert_eq!(token.scope, "");
        assert!(!token.has_refresh_token());
    }

    #[test]
    fn test_from_raw_response_rejects_missing_access_token() {
        assert!(TokenRecord::from_raw_response(r#"{"refresh_token":"x"}"#).is_err());
        assert!(TokenRecord::from_raw_response("not json").is_err());
    }

    #[test]
    fn test_expiry_uses_milliseconds() {
        let stored = StoredToken {
            retrieved_at_ms: 1_000_000,
            token: TokenRecord {
                access_token: "a".into(),
                refresh_token: "r".into(),
                token_type: "bearer".into(),
                expires_in: 60,
                scope: String::new(),
                raw_response: String::new(),
            },
        };
        assert_eq!(stored.expires_at_ms(), 1_060_000);
        assert!(!stored.is_expired_at(1_059_999));
        assert!(stored.is_expired_at(1_060_000));
    }

    #[test]
    fn test_zero_lifetime_never_expires() {
        let stored = StoredToken {
            retrieved_at_ms: 0,
            token: TokenRecord {
                access_token: "a".into(),
                refresh_token: String::new(),
                token_type: "bearer".into(),
                expires_in: 0,
                scope: String::new(),
                raw_response: String::new(),
            },
        };
        assert!(!stored.is_expired_at(i64::MAX));
    }
}
