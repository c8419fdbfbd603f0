//! Connection settings for the control-plane API.
//!
//! Resolution order in [`KubeConfig::from_env`]:
//!
//! 1. `KUBE_API_URL` (+ optional `KUBE_TOKEN`, `KUBE_CA_FILE`) -- explicit
//! 2. `KUBERNETES_SERVICE_HOST` / `KUBERNETES_SERVICE_PORT` -- in-cluster,
//!    token and CA read from the service-account mount
//! 3. `http://127.0.0.1:8001` -- a local `kubectl proxy`

use std::path::PathBuf;
use std::time::Duration;

use crate::error::KubeError;

/// Service-account token path inside a pod.
pub const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Service-account CA bundle path inside a pod.
pub const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Default API address when nothing is configured.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8001";

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeConfig {
    /// API server base URL, without a trailing slash.
    pub api_url: String,
    /// Bearer token given inline.
    pub token: Option<String>,
    /// File to read the bearer token from when no inline token is set.
    pub token_file: Option<PathBuf>,
    /// PEM bundle to trust in addition to the system roots.
    pub ca_file: Option<PathBuf>,
    /// Connect timeout for every request.
    pub connect_timeout: Duration,
    /// Total timeout for non-streaming requests.
    pub request_timeout: Duration,
    /// Server-side lifetime requested for each watch; the relay reconnects
    /// when it expires.
    pub watch_timeout: Duration,
}

impl Default for KubeConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            token: None,
            token_file: None,
            ca_file: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            watch_timeout: Duration::from_secs(300),
        }
    }
}

impl KubeConfig {
    /// Load configuration from process environment variables.
    ///
    /// Optional variables:
    /// - `KUBE_API_URL` -- API server base URL
    /// - `KUBE_TOKEN` -- bearer token
    /// - `KUBE_CA_FILE` -- extra CA bundle (PEM)
    /// - `KUBE_REQUEST_TIMEOUT_MS` -- non-streaming request timeout (default 10000)
    /// - `KUBE_WATCH_TIMEOUT_SECS` -- server-side watch lifetime (default 300)
    pub fn from_env() -> Result<Self, KubeError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, KubeError> {
        let defaults = Self::default();
        let mut config = if let Some(api_url) = lookup("KUBE_API_URL") {
            Self {
                api_url: api_url.trim_end_matches('/').to_owned(),
                token: lookup("KUBE_TOKEN"),
                ca_file: lookup("KUBE_CA_FILE").map(PathBuf::from),
                ..defaults
            }
        } else if let Some(host) = lookup("KUBERNETES_SERVICE_HOST") {
            let port = lookup("KUBERNETES_SERVICE_PORT").unwrap_or_else(|| "443".to_owned());
            let host = if host.contains(':') { format!("[{host}]") } else { host };
            Self {
                api_url: format!("https://{host}:{port}"),
                token_file: Some(PathBuf::from(SERVICE_ACCOUNT_TOKEN)),
                ca_file: Some(PathBuf::from(SERVICE_ACCOUNT_CA)),
                ..defaults
            }
        } else {
            defaults
        };

        if let Some(ms) = lookup("KUBE_REQUEST_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|e| KubeError::Config(format!("invalid KUBE_REQUEST_TIMEOUT_MS: {e}")))?;
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = lookup("KUBE_WATCH_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| KubeError::Config(format!("invalid KUBE_WATCH_TIMEOUT_SECS: {e}")))?;
            config.watch_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_local_proxy() {
        let config = KubeConfig::from_lookup(lookup(&[])).unwrap_or_default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.token.is_none());
        assert!(config.token_file.is_none());
    }

    #[test]
    fn explicit_url_wins_over_in_cluster() {
        let config = KubeConfig::from_lookup(lookup(&[
            ("KUBE_API_URL", "https://api.example:6443/"),
            ("KUBE_TOKEN", "secret"),
            ("KUBERNETES_SERVICE_HOST", "10.0.0.1"),
        ]))
        .unwrap_or_default();
        assert_eq!(config.api_url, "https://api.example:6443");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert!(config.token_file.is_none());
    }

    #[test]
    fn in_cluster_uses_service_account() {
        let config = KubeConfig::from_lookup(lookup(&[
            ("KUBERNETES_SERVICE_HOST", "10.0.0.1"),
            ("KUBERNETES_SERVICE_PORT", "6443"),
        ]))
        .unwrap_or_default();
        assert_eq!(config.api_url, "https://10.0.0.1:6443");
        assert_eq!(config.token_file, Some(PathBuf::from(SERVICE_ACCOUNT_TOKEN)));
        assert_eq!(config.ca_file, Some(PathBuf::from(SERVICE_ACCOUNT_CA)));
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        let result = KubeConfig::from_lookup(lookup(&[("KUBE_WATCH_TIMEOUT_SECS", "soon")]));
        assert!(matches!(result, Err(KubeError::Config(_))));
    }
}
