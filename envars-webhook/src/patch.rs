//! JSON patches that attach the node environment secret to the eligible containers of a pod.
//!
//! The secret reference is appended next to the `envFrom` sources that are already on the
//! container, so configuration coming from an upstream manifest (i.e. a Helm chart) is kept.
//! The secret name is stored in a pod label, which links the pod to its secret for the binding
//! and delete events.

use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use jsonptr::Pointer;
use k8s_openapi::api::core::v1::{Container, EnvFromSource, Pod, SecretEnvSource};
use serde_json::json;
use uuid::Uuid;

use crate::{
    config::Config,
    consts::{LABEL_SECRET_NAME, SECRET_NAME_PREFIX},
    error::Result,
};

/// The secret name stored in the pod label, or an empty string when the pod has none.
pub fn secret_name_label(pod: &Pod) -> &str {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(LABEL_SECRET_NAME))
        .map(String::as_str)
        .unwrap_or_default()
}

/// Create event: make a random secret name.
/// Update event: keep the secret name found in the pod label.
pub fn resolve_secret_name(existing: &str) -> String {
    if existing.is_empty() {
        format!("{}{}", SECRET_NAME_PREFIX, Uuid::new_v4())
    } else {
        existing.to_string()
    }
}

/// The pod name, or the generated name prefix for pods owned by a controller.
pub fn pod_name(pod: &Pod) -> &str {
    match pod.metadata.name.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => pod.metadata.generate_name.as_deref().unwrap_or_default(),
    }
}

/// Append a reference to the secret unless one with the same name is already there.
///
/// The API server does not echo our previous patch consistently in the new object of an UPDATE:
/// with upstream sources present the reference is missing and has to be added again, without
/// upstream sources it is already there and must not be added twice.
pub fn env_from_with_secret(env_from: &[EnvFromSource], secret_name: &str) -> Vec<EnvFromSource> {
    let mut sources = env_from.to_vec();

    let referenced = sources.iter().any(|source| {
        source
            .secret_ref
            .as_ref()
            .is_some_and(|secret_ref| secret_ref.name == secret_name)
    });
    if !referenced {
        sources.push(EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: secret_name.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    sources
}

/// Patch the `envFrom` sources of a single container.
/// Containers without an `envFrom` list get it added, since a JSON patch `replace` needs an existing target.
fn patch_container(
    container: &Container,
    containers_field: &str,
    index: usize,
    secret_name: &str,
) -> Result<PatchOperation> {
    let index = index.to_string();
    let path = Pointer::new(["spec", containers_field, index.as_str(), "envFrom"]);

    let env_from = container.env_from.as_deref().unwrap_or_default();
    let value = serde_json::to_value(env_from_with_secret(env_from, secret_name))?;

    Ok(match container.env_from {
        Some(_) => PatchOperation::Replace(ReplaceOperation { path, value }),
        None => PatchOperation::Add(AddOperation { path, value }),
    })
}

/// Build the patches for a pod of a CREATE or UPDATE event.
///
/// An UPDATE does not recreate the pod, only its containers are restarted, so the pod keeps its
/// node and its secret: the same patches as on CREATE are applied again with the stored name.
/// A pod without eligible containers gets no patches at all.
pub fn patch_pod(pod: &Pod, config: &Config) -> Result<Vec<PatchOperation>> {
    let secret_name = resolve_secret_name(secret_name_label(pod));
    let mut patches = Vec::new();

    if let Some(spec) = &pod.spec {
        let init_containers = spec.init_containers.as_deref().unwrap_or_default();
        for (field, containers) in [
            ("initContainers", init_containers),
            ("containers", spec.containers.as_slice()),
        ] {
            for (index, container) in containers.iter().enumerate() {
                if !config.is_container_allowed(&container.name) {
                    tracing::debug!(
                        container = %container.name,
                        pod = pod_name(pod),
                        "container patching not allowed"
                    );
                    continue;
                }

                patches.push(patch_container(container, field, index, &secret_name)?);
                tracing::debug!(
                    container = %container.name,
                    pod = pod_name(pod),
                    secret = %secret_name,
                    "patched envFrom sources"
                );
            }
        }
    }

    if patches.is_empty() {
        return Ok(patches);
    }

    // Ensures that labels exists before adding to it
    if pod.metadata.labels.is_none() {
        patches.push(PatchOperation::Add(AddOperation {
            path: Pointer::new(["metadata", "labels"]),
            value: json!({}),
        }));
    }

    // A JSON patch add replaces the value when the label is already there (RFC 6902, section 4.1)
    patches.push(PatchOperation::Add(AddOperation {
        path: Pointer::new(["metadata", "labels", LABEL_SECRET_NAME]),
        value: json!(secret_name),
    }));

    Ok(patches)
}
