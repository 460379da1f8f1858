// ABOUTME: ClusterApi implementation speaking the core/v1 REST paths over HTTP/1.
// ABOUTME: Intended for a node-local API proxy; maps 404/409 to typed errors.

use super::{ClusterApi, ClusterError, DeleteOptions, ListSelector, Node, Pod, PodList};
use crate::http::{Endpoint, HttpError, Response};
use async_trait::async_trait;
use hyper::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Body of a non-2xx reply from the API server.
#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

fn map_transport_error(e: HttpError) -> ClusterError {
    ClusterError::Transport(e.to_string())
}

fn map_status(resp: &Response, kind: &'static str, name: &str) -> ClusterError {
    match resp.status {
        StatusCode::NOT_FOUND => ClusterError::NotFound {
            kind,
            name: name.to_string(),
        },
        StatusCode::CONFLICT => ClusterError::AlreadyExists {
            kind,
            name: name.to_string(),
        },
        status => {
            let message = serde_json::from_slice::<Status>(&resp.body)
                .map(|s| s.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&resp.body).into_owned());
            ClusterError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

fn decode<T: DeserializeOwned>(resp: &Response) -> Result<T, ClusterError> {
    serde_json::from_slice(&resp.body).map_err(|e| ClusterError::Decode(e.to_string()))
}

/// Cluster client for a plain-HTTP API endpoint such as `kubectl proxy`.
#[derive(Debug, Clone)]
pub struct ApiServerClient {
    endpoint: Endpoint,
}

impl ApiServerClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn connect(api_url: &str) -> Result<Self, ClusterError> {
        Endpoint::parse(api_url)
            .map(Self::new)
            .map_err(map_transport_error)
    }

    fn pod_path(namespace: &str, name: &str) -> String {
        format!(
            "/api/v1/namespaces/{}/pods/{}",
            urlencoding::encode(namespace),
            urlencoding::encode(name)
        )
    }

    fn list_path(namespace: &str, selector: &ListSelector) -> String {
        let mut path = format!("/api/v1/namespaces/{}/pods", urlencoding::encode(namespace));
        let mut params = Vec::new();
        if let Some(field) = &selector.field {
            params.push(format!("fieldSelector={}", urlencoding::encode(field)));
        }
        if let Some(label) = &selector.label {
            params.push(format!("labelSelector={}", urlencoding::encode(label)));
        }
        if !params.is_empty() {
            path.push('?');
            path.push_str(&params.join("&"));
        }
        path
    }
}

#[async_trait]
impl ClusterApi for ApiServerClient {
    async fn get_node(&self, name: &str) -> Result<Node, ClusterError> {
        let path = format!("/api/v1/nodes/{}", urlencoding::encode(name));
        let resp = self
            .endpoint
            .send(Method::GET, &path, None)
            .await
            .map_err(map_transport_error)?;

        if !resp.status.is_success() {
            return Err(map_status(&resp, "node", name));
        }
        decode(&resp)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        let resp = self
            .endpoint
            .send(Method::GET, &Self::pod_path(namespace, name), None)
            .await
            .map_err(map_transport_error)?;

        if !resp.status.is_success() {
            return Err(map_status(&resp, "pod", name));
        }
        decode(&resp)
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, ClusterError> {
        let body = serde_json::to_vec(pod).map_err(|e| ClusterError::Decode(e.to_string()))?;
        let path = format!(
            "/api/v1/namespaces/{}/pods",
            urlencoding::encode(pod.namespace())
        );
        let resp = self
            .endpoint
            .send(Method::POST, &path, Some(body))
            .await
            .map_err(map_transport_error)?;

        if !resp.status.is_success() {
            return Err(map_status(&resp, "pod", pod.name()));
        }
        decode(&resp)
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        opts: DeleteOptions,
    ) -> Result<(), ClusterError> {
        let mut path = Self::pod_path(namespace, name);
        if let Some(grace) = opts.grace_period_seconds {
            path.push_str(&format!("?gracePeriodSeconds={}", grace));
        }

        let resp = self
            .endpoint
            .send(Method::DELETE, &path, None)
            .await
            .map_err(map_transport_error)?;

        if !resp.status.is_success() {
            return Err(map_status(&resp, "pod", name));
        }
        Ok(())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &ListSelector,
    ) -> Result<Vec<Pod>, ClusterError> {
        let resp = self
            .endpoint
            .send(Method::GET, &Self::list_path(namespace, selector), None)
            .await
            .map_err(map_transport_error)?;

        if !resp.status.is_success() {
            return Err(map_status(&resp, "namespace", namespace));
        }
        decode::<PodList>(&resp).map(|list| list.items)
    }
}
