//! Well-known names shared by the webhook and the objects it manages.

/// The pod label that links a pod to its environment secret.
pub const LABEL_SECRET_NAME: &str = "envars-secret-name";

/// Prefix of every generated secret name.
pub const SECRET_NAME_PREFIX: &str = "envars-";

/// Prefix of every environment variable projected from a node label.
pub const ENV_NODE_PREFIX: &str = "NODE_";

pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "envars-webhook";

/// The API resource the webhook admits. Bindings arrive as the `pods/binding` subresource.
pub const RESOURCE_PODS: &str = "pods";

pub const KIND_POD: &str = "Pod";
pub const KIND_BINDING: &str = "Binding";
