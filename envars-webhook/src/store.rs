//! Access to the cluster objects the webhook reads and writes.
//!
//! The service account running the webhook needs read access to nodes, read access to pods and
//! create/delete access to secrets.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::{
    api::core::v1::{Node, Pod, Secret},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    api::{DeleteParams, PostParams},
    Api,
};

use crate::{
    consts::{LABEL_MANAGED_BY, MANAGED_BY},
    error::{Error, Result},
};

/// The object store used by the secret lifecycle.
/// Every call is a single request, failures are returned as they are and never retried.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get a node by name, `None` when the node does not exist.
    async fn get_node(&self, name: &str) -> Result<Option<Node>>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Create an opaque secret, failing if a secret with that name already exists.
    async fn create_secret(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<()>;

    /// Delete a secret. A secret that is already gone is not an error.
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;
}

/// [`ObjectStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    kube_client: kube::Client,
}

impl KubeStore {
    pub fn new(kube_client: kube::Client) -> Self {
        Self { kube_client }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        let nodes: Api<Node> = Api::all(self.kube_client.clone());
        Ok(nodes.get_opt(name).await?)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let pods: Api<Pod> = Api::namespaced(self.kube_client.clone(), namespace);
        Ok(pods.get(name).await?)
    }

    async fn create_secret(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<()> {
        let secrets: Api<Secret> = Api::namespaced(self.kube_client.clone(), namespace);
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    LABEL_MANAGED_BY.to_string(),
                    MANAGED_BY.to_string(),
                )])),
                ..Default::default()
            },
            string_data: Some(data),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };

        secrets.create(&PostParams::default(), &secret).await?;
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        let secrets: Api<Secret> = Api::namespaced(self.kube_client.clone(), namespace);
        match secrets.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = Error::from(err);
                if err.is_not_found() {
                    tracing::debug!(secret = name, namespace, "secret already deleted");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}

/// In-memory [`ObjectStore`] used by the tests.
#[cfg(test)]
pub(crate) mod memory {
    use std::sync::Mutex;

    use super::*;

    fn api_error(code: u16, reason: &str, message: String) -> Error {
        Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message,
            reason: reason.to_string(),
            code,
        }))
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        CreateSecret {
            namespace: String,
            name: String,
            data: BTreeMap<String, String>,
        },
        DeleteSecret {
            namespace: String,
            name: String,
        },
    }

    #[derive(Default)]
    pub struct MemoryStore {
        pub nodes: Mutex<BTreeMap<String, Node>>,
        pub pods: Mutex<BTreeMap<(String, String), Pod>>,
        pub secrets: Mutex<BTreeMap<(String, String), BTreeMap<String, String>>>,
        pub calls: Mutex<Vec<Call>>,
        /// Make every call fail with this HTTP status code.
        pub fail_with: Mutex<Option<u16>>,
        /// Make node lookups fail with this HTTP status code.
        pub node_fail_with: Mutex<Option<u16>>,
    }

    impl MemoryStore {
        pub fn with_node(self, node: Node) -> Self {
            let name = node.metadata.name.clone().unwrap_or_default();
            self.nodes.lock().unwrap().insert(name, node);
            self
        }

        pub fn with_pod(self, pod: Pod) -> Self {
            let key = (
                pod.metadata.namespace.clone().unwrap_or_default(),
                pod.metadata.name.clone().unwrap_or_default(),
            );
            self.pods.lock().unwrap().insert(key, pod);
            self
        }

        pub fn with_secret(self, namespace: &str, name: &str) -> Self {
            self.secrets
                .lock()
                .unwrap()
                .insert((namespace.to_string(), name.to_string()), BTreeMap::new());
            self
        }

        pub fn failing_with(self, code: u16) -> Self {
            *self.fail_with.lock().unwrap() = Some(code);
            self
        }

        pub fn failing_nodes_with(self, code: u16) -> Self {
            *self.node_fail_with.lock().unwrap() = Some(code);
            self
        }

        pub fn secret(&self, namespace: &str, name: &str) -> Option<BTreeMap<String, String>> {
            self.secrets
                .lock()
                .unwrap()
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn check_failure(&self) -> Result<()> {
            match *self.fail_with.lock().unwrap() {
                Some(code) => Err(api_error(code, "InternalError", "injected failure".to_string())),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn get_node(&self, name: &str) -> Result<Option<Node>> {
            self.check_failure()?;
            if let Some(code) = *self.node_fail_with.lock().unwrap() {
                return Err(api_error(code, "InternalError", "injected node failure".to_string()));
            }
            Ok(self.nodes.lock().unwrap().get(name).cloned())
        }

        async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
            self.check_failure()?;
            self.pods
                .lock()
                .unwrap()
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| api_error(404, "NotFound", format!("pods \"{name}\" not found")))
        }

        async fn create_secret(
            &self,
            namespace: &str,
            name: &str,
            data: BTreeMap<String, String>,
        ) -> Result<()> {
            self.calls.lock().unwrap().push(Call::CreateSecret {
                namespace: namespace.to_string(),
                name: name.to_string(),
                data: data.clone(),
            });
            self.check_failure()?;

            let mut secrets = self.secrets.lock().unwrap();
            let key = (namespace.to_string(), name.to_string());
            if secrets.contains_key(&key) {
                return Err(api_error(
                    409,
                    "AlreadyExists",
                    format!("secrets \"{name}\" already exists"),
                ));
            }
            secrets.insert(key, data);
            Ok(())
        }

        async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Call::DeleteSecret {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
            self.check_failure()?;

            self.secrets
                .lock()
                .unwrap()
                .remove(&(namespace.to_string(), name.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use http::{Request, Response};
    use kube::client::Body;
    use serde_json::json;

    use super::*;

    /// A store whose API server answers every request with a `Status` of the given code.
    fn store_answering(code: u16, reason: &'static str) -> KubeStore {
        let service = tower::service_fn(move |_req: Request<Body>| async move {
            let status = json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "message": format!("request failed: {reason}"),
                "reason": reason,
                "code": code
            });
            let response = Response::builder()
                .status(code)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&status).unwrap()))
                .unwrap();
            Ok::<_, Infallible>(response)
        });
        KubeStore::new(kube::Client::new(service, "default"))
    }

    #[tokio::test]
    async fn test_delete_missing_secret_succeeds() {
        let store = store_answering(404, "NotFound");

        store.delete_secret("metrics", "envars-abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_secret_server_error() {
        let store = store_answering(500, "InternalError");

        let err = store
            .delete_secret("metrics", "envars-abc")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Kube(_)));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_missing_node() {
        let store = store_answering(404, "NotFound");

        assert!(store.get_node("node-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_node_server_error() {
        let store = store_answering(500, "InternalError");

        assert!(store.get_node("node-1").await.is_err());
    }

    #[tokio::test]
    async fn test_get_missing_pod_is_not_found() {
        let store = store_answering(404, "NotFound");

        let err = store.get_pod("metrics", "ingester-0").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_existing_secret_fails() {
        let store = store_answering(409, "AlreadyExists");

        let err = store
            .create_secret("metrics", "envars-abc", BTreeMap::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("AlreadyExists"));
    }
}
