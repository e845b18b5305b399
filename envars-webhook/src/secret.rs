//! Lifecycle of the secret holding the node environment of a pod.
//!
//! The secret name is reserved in a pod label when the pod is admitted, the secret itself is
//! created once the scheduler binds the pod to a node, and deleted together with the pod.
//! Creation relies on the label patch being visible when the binding arrives; a pod bound before
//! that runs without the node environment.

use k8s_openapi::api::core::v1::{Binding, Pod};

use crate::{
    error::Result,
    node_env::env_from_node_labels,
    patch::{pod_name, secret_name_label},
    store::ObjectStore,
};

/// Create the secret with the environment variables of the node the pod is bound to.
///
/// The pod named by the binding is read back to find its secret name. Pods without the label
/// never had a secret reserved and are left alone. A missing node yields an empty secret rather
/// than holding back the scheduling of the pod.
///
/// `request_namespace` is the namespace of the admission request, used when the binding body
/// does not carry one.
pub async fn create_for_binding(
    store: &dyn ObjectStore,
    binding: &Binding,
    request_namespace: Option<&str>,
) -> Result<()> {
    let namespace = binding
        .metadata
        .namespace
        .as_deref()
        .or(request_namespace)
        .unwrap_or_default();
    let name = binding.metadata.name.as_deref().unwrap_or_default();
    let node_name = binding.target.name.as_deref().unwrap_or_default();

    let pod = store.get_pod(namespace, name).await?;
    let secret_name = secret_name_label(&pod);
    if secret_name.is_empty() {
        tracing::debug!(pod = name, namespace, "no secret name label, nothing to create");
        return Ok(());
    }

    let node_labels = match store.get_node(node_name).await? {
        Some(node) => {
            tracing::debug!(node = node_name, "found node");
            node.metadata.labels.unwrap_or_default()
        }
        None => {
            tracing::warn!(node = node_name, pod = name, namespace, "node not found");
            Default::default()
        }
    };
    let env = env_from_node_labels(&node_labels);

    let namespace = pod.metadata.namespace.as_deref().unwrap_or(namespace);
    store.create_secret(namespace, secret_name, env).await?;
    tracing::info!(
        secret = secret_name,
        namespace,
        pod = name,
        node = node_name,
        "secret created"
    );

    Ok(())
}

/// Delete the secret of a pod, using the pod as it was at its delete event.
pub async fn delete_for_pod(store: &dyn ObjectStore, pod: &Pod) -> Result<()> {
    let secret_name = secret_name_label(pod);
    if secret_name.is_empty() {
        tracing::debug!(pod = pod_name(pod), "no secret name label, nothing to delete");
        return Ok(());
    }

    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    store.delete_secret(namespace, secret_name).await?;
    tracing::info!(secret = secret_name, namespace, pod = pod_name(pod), "secret deleted");

    Ok(())
}
