//! Token verification for the handshake.
//!
//! Verification is a seam: the dispatcher only needs `verify(token)` to
//! either produce a [`UserAccount`] or fail. The production implementation
//! checks an RS256 signature against the API server's public key. When no
//! key material is configured the server runs in a degraded, auth-disabled
//! mode instead of refusing to start.

use std::fs;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::warn;
use serde::Deserialize;
use thiserror::Error;

use shared::protocol::UserAccount;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token rejected: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token is not valid for this server")]
    WrongAudience,
}

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserAccount, AuthError>;
}

/// Claims issued by the API server. Both user tokens and external tokens
/// scoped to this server's domain are accepted.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "type")]
    kind: String,
    #[allow(dead_code)]
    id: String,
    #[allow(dead_code)]
    service: String,
    user_id: String,
    username: String,
    avatar_url: String,
    aud: Option<String>,
}

pub struct JwtVerifier {
    key: DecodingKey,
    host: Option<String>,
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<UserAccount, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        // Audience is checked manually: user tokens carry none.
        validation.validate_aud = false;
        let data = decode::<Claims>(token, &self.key, &validation)?;
        let claims = data.claims;

        let audience_ok = claims.kind == "user"
            || (claims.kind == "external" && claims.aud.as_deref() == self.host.as_deref());
        if !audience_ok {
            return Err(AuthError::WrongAudience);
        }

        Ok(UserAccount {
            id: claims.user_id,
            username: claims.username,
            avatar_url: claims.avatar_url,
        })
    }
}

/// Loads the verifier from the configured key file, or returns `None` for
/// degraded auth-disabled mode.
pub fn load_verifier(config: &Config) -> Option<Box<dyn TokenVerifier>> {
    let pem = match fs::read(&config.public_key_file) {
        Ok(pem) => pem,
        Err(_) => {
            warn!(
                "No public key found at {}, user authentication will not work",
                config.public_key_file.display()
            );
            warn!("Provide the public key of the api server and set HOST to this server's domain");
            return None;
        }
    };

    match DecodingKey::from_rsa_pem(&pem) {
        Ok(key) => Some(Box::new(JwtVerifier { key, host: config.host.clone() })),
        Err(e) => {
            warn!("Public key at {} is unusable ({}), authentication disabled", config.public_key_file.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_key_file_degrades_to_disabled_auth() {
        let config = Config {
            port: 0,
            host: None,
            public_key_file: PathBuf::from("/nonexistent/public.key"),
            service_token: None,
            runner_bin: None,
        };
        assert!(load_verifier(&config).is_none());
    }
}
