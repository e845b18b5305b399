//! A mutating admission webhook that injects the labels of the node a pod is scheduled on into
//! the environment of its containers.
//!
//! The node is unknown when the pod is admitted, so the pod gets a reference to a secret that
//! does not exist yet. The secret is created from the node labels when the pod is bound, and
//! deleted with the pod.

pub mod config;
pub mod consts;
pub mod dispatch;
pub mod error;
pub mod node_env;
pub mod patch;
pub mod secret;
pub mod server;
pub mod store;

pub use error::{Error, Result};
