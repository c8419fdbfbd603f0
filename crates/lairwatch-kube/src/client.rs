//! HTTP client for the control-plane REST API.

use std::time::Duration;

use futures::StreamExt as _;
use lairwatch_relay::watch::{WatchSource, WatchStream};
use lairwatch_types::ResourceCollection;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::KubeConfig;
use crate::error::KubeError;
use crate::stream::decode_watch_stream;

/// Request path for a collection, optionally scoped to one namespace.
///
/// An empty `namespace` addresses the collection across all namespaces.
pub fn collection_path(collection: &ResourceCollection, namespace: &str) -> String {
    let mut path = if collection.group.is_empty() {
        format!("/api/{}", collection.version)
    } else {
        format!("/apis/{}/{}", collection.group, collection.version)
    };
    if !namespace.is_empty() {
        path.push_str("/namespaces/");
        path.push_str(namespace);
    }
    path.push('/');
    path.push_str(collection.resource);
    path
}

/// Control-plane client shared by the watch relays and the attack gateway.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Clone)]
pub struct KubeClient {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    request_timeout: Duration,
    watch_timeout: Duration,
}

impl KubeClient {
    /// Build a client from configuration.
    ///
    /// Reads the token file and CA bundle eagerly so misconfiguration is
    /// reported at startup rather than on the first watch.
    pub fn new(config: &KubeConfig) -> Result<Self, KubeError> {
        let token = match (&config.token, &config.token_file) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(path)) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    KubeError::Config(format!("failed to read token file {}: {e}", path.display()))
                })?;
                Some(raw.trim().to_owned())
            }
            (None, None) => None,
        };

        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if let Some(path) = &config.ca_file {
            let pem = std::fs::read(path).map_err(|e| {
                KubeError::Config(format!("failed to read CA file {}: {e}", path.display()))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder.build()?;

        info!(api_url = config.api_url, authenticated = token.is_some(), "control-plane client ready");

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            token,
            request_timeout: config.request_timeout,
            watch_timeout: config.watch_timeout,
        })
    }

    fn url(&self, collection: &ResourceCollection, namespace: &str) -> String {
        format!("{}{}", self.api_url, collection_path(collection, namespace))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Open a list-and-watch stream on `collection` across all namespaces.
    ///
    /// # Errors
    ///
    /// Returns [`KubeError::Http`] if the request fails and
    /// [`KubeError::Status`] if the API server refuses the watch.
    pub async fn open_watch(
        &self,
        collection: ResourceCollection,
    ) -> Result<WatchStream<KubeError>, KubeError> {
        let url = self.url(&collection, "");
        let mut query = vec![
            ("watch", "true".to_owned()),
            ("timeoutSeconds", self.watch_timeout.as_secs().to_string()),
        ];
        if let Some(selector) = collection.label_selector {
            query.push(("labelSelector", selector.to_owned()));
        }

        debug!(url, "opening watch");
        let response = self
            .authorize(self.client.get(&url).query(&query))
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(decode_watch_stream(response.bytes_stream()).boxed())
    }

    /// Create a resource in `namespace` and return the stored object.
    ///
    /// # Errors
    ///
    /// Returns [`KubeError::Status`] when the API server rejects the object
    /// (validation, conflict, authorization) and [`KubeError::Http`] on
    /// transport failure.
    pub async fn create(
        &self,
        collection: ResourceCollection,
        namespace: &str,
        object: &Value,
    ) -> Result<Value, KubeError> {
        let url = self.url(&collection, namespace);
        let response = self
            .authorize(self.client.post(&url).json(object))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

impl WatchSource for KubeClient {
    type Error = KubeError;

    fn watch(
        &self,
        collection: ResourceCollection,
    ) -> impl Future<Output = Result<WatchStream<KubeError>, KubeError>> + Send {
        self.open_watch(collection)
    }
}

impl std::fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClient")
            .field("api_url", &self.api_url)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

/// Pass through success responses; turn anything else into [`KubeError::Status`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, KubeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_owned());
    Err(KubeError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_collection_paths() {
        assert_eq!(
            collection_path(&ResourceCollection::DUNGEONS, ""),
            "/apis/game.k8s.example/v1alpha1/dungeons"
        );
        assert_eq!(
            collection_path(&ResourceCollection::ATTACKS, "default"),
            "/apis/game.k8s.example/v1alpha1/namespaces/default/attacks"
        );
    }

    #[test]
    fn core_collection_paths() {
        assert_eq!(collection_path(&ResourceCollection::ENTITY_PODS, ""), "/api/v1/pods");
        assert_eq!(
            collection_path(&ResourceCollection::ENTITY_PODS, "default"),
            "/api/v1/namespaces/default/pods"
        );
    }

    #[test]
    fn inline_token_needs_no_file() {
        let config = KubeConfig {
            token: Some("abc".to_owned()),
            token_file: Some("/nonexistent/token".into()),
            ..KubeConfig::default()
        };
        let client = KubeClient::new(&config);
        assert!(client.is_ok_and(|c| c.token.as_deref() == Some("abc")));
    }

    #[test]
    fn missing_token_file_is_a_config_error() {
        let config = KubeConfig {
            token_file: Some("/nonexistent/token".into()),
            ..KubeConfig::default()
        };
        assert!(matches!(KubeClient::new(&config), Err(KubeError::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_api_fails_to_open_watch() {
        // Port 9 (discard) on localhost is closed in test environments.
        let config = KubeConfig {
            api_url: "http://127.0.0.1:9".to_owned(),
            connect_timeout: Duration::from_millis(500),
            ..KubeConfig::default()
        };
        let client = KubeClient::new(&config);
        assert!(client.is_ok());
        if let Ok(client) = client {
            assert!(client.open_watch(ResourceCollection::DUNGEONS).await.is_err());
        }
    }
}
