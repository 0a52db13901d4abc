//! Configuration validation logic.

use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a ProxyConfig for semantic correctness.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError(format!(
            "listener.bind_address '{}' is not a valid socket address",
            config.listener.bind_address
        )));
    }

    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError(
            "upstream.timeout_secs must be > 0".to_string(),
        ));
    }

    if config.upstream.max_redirects > 20 {
        errors.push(ValidationError(
            "upstream.max_redirects must be <= 20".to_string(),
        ));
    }

    if config.upstream.user_agent.trim().is_empty() {
        errors.push(ValidationError(
            "upstream.user_agent must not be empty".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn rejects_bad_bind_address() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        let errs = validate_config(&config).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].0.contains("bind_address"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut config = ProxyConfig::default();
        config.upstream.timeout_secs = 0;
        let errs = validate_config(&config).unwrap_err();
        assert!(errs[0].0.contains("timeout_secs"));
    }
}
