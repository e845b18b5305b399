//! Routing of admission requests to the patch and secret lifecycle flows.

use std::sync::Arc;

use json_patch::PatchOperation;
use k8s_openapi::api::core::v1::{Binding, Pod};
use kube::{
    core::{
        admission::{AdmissionRequest, Operation},
        DynamicObject,
    },
    Resource,
};
use serde::de::DeserializeOwned;

use crate::{
    config::Config,
    consts::{KIND_BINDING, KIND_POD, RESOURCE_PODS},
    error::{Error, Result},
    patch::patch_pod,
    secret::{create_for_binding, delete_for_pod},
    store::ObjectStore,
};

/// The kinds of objects the webhook acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewKind {
    /// A pod, admitted on create, update and delete.
    Workload,
    /// The `pods/binding` subresource, sent when the scheduler assigns a pod to a node.
    Binding,
    /// Anything else passes through unchanged.
    Other,
}

/// A single admission call, reduced to what the dispatcher needs.
#[derive(Debug, Clone)]
pub struct ReviewEvent {
    pub kind: ReviewKind,
    pub operation: Operation,
    /// Namespace of the admission request.
    pub namespace: Option<String>,
    pub object: Option<DynamicObject>,
    /// Only populated for DELETE.
    pub old_object: Option<DynamicObject>,
}

impl From<&AdmissionRequest<DynamicObject>> for ReviewEvent {
    fn from(req: &AdmissionRequest<DynamicObject>) -> Self {
        let kind = if req.resource.group.is_empty() && req.resource.resource == RESOURCE_PODS {
            let gvk = req.request_kind.as_ref().unwrap_or(&req.kind);
            match gvk.kind.as_str() {
                KIND_POD => ReviewKind::Workload,
                KIND_BINDING => ReviewKind::Binding,
                _ => ReviewKind::Other,
            }
        } else {
            ReviewKind::Other
        };

        Self {
            kind,
            operation: req.operation.clone(),
            namespace: req.namespace.clone(),
            object: req.object.clone(),
            old_object: req.old_object.clone(),
        }
    }
}

/// Decode the admitted object into its typed form.
fn decode<K>(object: Option<&DynamicObject>, kind: &'static str) -> Result<K>
where
    K: Resource + DeserializeOwned,
{
    object
        .ok_or_else(|| Error::decode(kind, "no object in request"))?
        .clone()
        .try_parse()
        .map_err(|err| Error::decode(kind, err))
}

/// Routes every admission event to the flow handling it.
///
/// | kind     | operation        | action                                    |
/// |----------|------------------|-------------------------------------------|
/// | Workload | CREATE or UPDATE | patch the pod containers and label        |
/// | Binding  | CREATE           | create the secret from the node labels    |
/// | Workload | DELETE           | delete the secret named by the old object |
///
/// Anything else passes through without patches.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
    store: Arc<dyn ObjectStore>,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>, store: Arc<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    /// Handle one event, returning the patches to apply to the admitted object.
    /// Nothing is patched or written when the object cannot be decoded.
    pub async fn dispatch(&self, event: &ReviewEvent) -> Result<Vec<PatchOperation>> {
        match (event.kind, &event.operation) {
            (ReviewKind::Workload, Operation::Create | Operation::Update) => {
                let pod: Pod = decode(event.object.as_ref(), "pod")?;
                patch_pod(&pod, &self.config)
            }
            (ReviewKind::Binding, Operation::Create) => {
                let binding: Binding = decode(event.object.as_ref(), "binding")?;
                create_for_binding(self.store.as_ref(), &binding, event.namespace.as_deref())
                    .await?;
                Ok(Vec::new())
            }
            (ReviewKind::Workload, Operation::Delete) => {
                let pod: Pod = decode(event.old_object.as_ref(), "pod")?;
                delete_for_pod(self.store.as_ref(), &pod).await?;
                Ok(Vec::new())
            }
            (kind, operation) => {
                tracing::debug!(?kind, ?operation, "pass the buck, nothing to do");
                Ok(Vec::new())
            }
        }
    }
}
