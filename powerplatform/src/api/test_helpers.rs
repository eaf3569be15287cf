//! Test helpers for the Power Platform API

use crate::config::ProviderConfig;

/// Test-mode client with every API pointed at `url`
pub fn create_test_client(url: &str) -> super::Client {
    super::Client::new(ProviderConfig::for_test(url)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_skips_authentication() {
        let client = create_test_client("http://127.0.0.1:1");
        assert!(client.config().test_mode);
        assert_eq!(client.config().urls.bapi_url, "http://127.0.0.1:1");
    }

    #[test]
    fn retry_config_defaults() {
        let config = super::super::RetryConfig::default();
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.min_backoff_ms, 5000);
        assert_eq!(config.max_backoff_ms, 10000);
    }
}
