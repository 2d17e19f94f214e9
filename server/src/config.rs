//! Environment-driven server configuration.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 10364;

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the transport listens on.
    pub port: u16,
    /// Server host domain, used as the audience check for external tokens.
    pub host: Option<String>,
    /// Public key of the API server; absence disables authentication.
    pub public_key_file: PathBuf,
    /// Bearer token the runner process uses for backend calls.
    pub service_token: Option<String>,
    /// Override for the runner executable; defaults to a sibling of the
    /// server binary named `runner`.
    pub runner_bin: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        Self {
            port,
            host: env::var("HOST").ok().map(|h| normalize_host(&h)),
            public_key_file: env::var("PUBLIC_KEY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public.key")),
            service_token: env::var("SERVICE_TOKEN").ok(),
            runner_bin: env::var("RUNNER_BIN").ok().map(PathBuf::from),
        }
    }
}

/// Strips the scheme and any trailing slash so the value compares directly
/// against a token audience claim.
pub fn normalize_host(raw: &str) -> String {
    raw.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_reduced_to_a_bare_domain() {
        assert_eq!(normalize_host("https://play.example.org/"), "play.example.org");
        assert_eq!(normalize_host("http://play.example.org"), "play.example.org");
        assert_eq!(normalize_host("play.example.org"), "play.example.org");
    }
}
