//! Account state backed by a hosted identity service
//!
//! The transformation pipeline never consults this module. The server owns an
//! [`AccountSession`] and hands out watch receivers to whatever needs to
//! follow the signed-in account.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A signed-in account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub uid: String,
    pub email: String,
    #[serde(skip)]
    pub id_token: String,
    #[serde(skip)]
    pub refresh_token: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn sign_up(&self, email: &str, password: &str) -> Result<Account>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Account>;
}

/// Provider used when no identity service is configured
#[derive(Debug, Default)]
pub struct DisabledIdentity;

#[async_trait]
impl IdentityProvider for DisabledIdentity {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Account> {
        Err(Error::IdentityUnavailable)
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<Account> {
        Err(Error::IdentityUnavailable)
    }
}

/// Firebase Authentication over its REST endpoints
pub struct FirebaseIdentity {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FirebaseIdentity {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://identitytoolkit.googleapis.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn call(&self, endpoint: &str, email: &str, password: &str) -> Result<Account> {
        let body = CredentialRequest {
            email,
            password,
            return_secure_token: true,
        };

        debug!(endpoint, "calling identity service");
        let response = self
            .client
            .post(format!("{}/accounts:{}", self.base_url, endpoint))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let code = response
                .json::<ErrorEnvelope>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.to_string());
            warn!(endpoint, %status, code = %code, "identity request rejected");
            return Err(Error::Identity {
                reason: describe_error_code(&code),
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(Account {
            uid: token.local_id,
            email: token.email,
            id_token: token.id_token,
            refresh_token: token.refresh_token,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    local_id: String,
    email: String,
    id_token: String,
    #[serde(default)]
    refresh_token: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Human-readable text for the service's error codes
fn describe_error_code(code: &str) -> String {
    // codes may carry a suffix, e.g. "WEAK_PASSWORD : Password should be ..."
    let key = code.split(':').next().unwrap_or(code).trim();
    match key {
        "EMAIL_EXISTS" => "An account with this email already exists.".to_string(),
        "INVALID_EMAIL" => "The email address is badly formatted.".to_string(),
        "WEAK_PASSWORD" => "Password should be at least 6 characters.".to_string(),
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            "Invalid email or password.".to_string()
        }
        "USER_DISABLED" => "This account has been disabled.".to_string(),
        "TOO_MANY_ATTEMPTS_TRY_LATER" => {
            "Too many attempts. Please try again later.".to_string()
        }
        "OPERATION_NOT_ALLOWED" => "Password sign-in is disabled.".to_string(),
        other => format!("Authentication failed ({})", other),
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    fn name(&self) -> &str {
        "firebase"
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Account> {
        self.call("signUp", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Account> {
        self.call("signInWithPassword", email, password).await
    }
}

/// The signed-in account as an observable value
pub struct AccountSession {
    provider: Arc<dyn IdentityProvider>,
    tx: watch::Sender<Option<Account>>,
}

impl AccountSession {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (tx, _) = watch::channel(None);
        Self { provider, tx }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledIdentity))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Receives the current account now and on every change
    pub fn subscribe(&self) -> watch::Receiver<Option<Account>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<Account> {
        self.tx.borrow().clone()
    }

    /// Create an account; on success it becomes the signed-in account
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Account> {
        let account = self.provider.sign_up(email, password).await?;
        info!(uid = %account.uid, "account created");
        self.tx.send_replace(Some(account.clone()));
        Ok(account)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Account> {
        let account = self.provider.sign_in(email, password).await?;
        info!(uid = %account.uid, "signed in");
        self.tx.send_replace(Some(account.clone()));
        Ok(account)
    }

    /// Returns the account that was signed in, if any
    pub fn sign_out(&self) -> Option<Account> {
        let previous = self.tx.send_replace(None);
        if let Some(account) = &previous {
            info!(uid = %account.uid, "signed out");
        }
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct MockIdentity;

    #[async_trait]
    impl IdentityProvider for MockIdentity {
        fn name(&self) -> &str {
            "mock"
        }

        async fn sign_up(&self, email: &str, _password: &str) -> Result<Account> {
            if email == "taken@example.com" {
                return Err(Error::Identity {
                    reason: describe_error_code("EMAIL_EXISTS"),
                });
            }
            Ok(account(email))
        }

        async fn sign_in(&self, email: &str, password: &str) -> Result<Account> {
            if password != "secret" {
                return Err(Error::Identity {
                    reason: describe_error_code("INVALID_PASSWORD"),
                });
            }
            Ok(account(email))
        }
    }

    fn account(email: &str) -> Account {
        Account {
            uid: format!("uid-{}", email),
            email: email.to_string(),
            id_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sign_in_notifies_subscribers() {
        let session = AccountSession::new(Arc::new(MockIdentity));
        let mut rx = session.subscribe();
        assert!(rx.borrow().is_none());

        session.sign_in("a@example.com", "secret").await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().email, "a@example.com");

        let previous = session.sign_out();
        assert_eq!(previous.unwrap().uid, "uid-a@example.com");
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn test_failed_sign_in_keeps_state() {
        let session = AccountSession::new(Arc::new(MockIdentity));
        session.sign_up("b@example.com", "whatever").await.unwrap();

        let err = session.sign_in("c@example.com", "wrong").await.unwrap_err();
        assert_eq!(err.client_message(), "Invalid email or password.");
        assert_eq!(session.current().unwrap().email, "b@example.com");

        let err = session.sign_up("taken@example.com", "x").await.unwrap_err();
        assert!(err.client_message().contains("already exists"));
    }

    #[tokio::test]
    async fn test_disabled_identity() {
        let session = AccountSession::disabled();
        assert_eq!(session.provider_name(), "disabled");
        assert!(matches!(
            session.sign_in("a@example.com", "secret").await,
            Err(Error::IdentityUnavailable)
        ));
        assert!(session.sign_out().is_none());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            describe_error_code("WEAK_PASSWORD : Password should be at least 6 characters"),
            "Password should be at least 6 characters."
        );
        assert_eq!(
            describe_error_code("SOMETHING_NEW"),
            "Authentication failed (SOMETHING_NEW)"
        );
    }

    #[test]
    fn test_account_serialization_hides_tokens() {
        let json = serde_json::to_string(&account("a@example.com")).unwrap();
        assert!(json.contains("a@example.com"));
        assert!(!json.contains("token"));
    }
}
