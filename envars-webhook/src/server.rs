//! The admission webhook HTTP surface.

use std::{convert::Infallible, future::Future, path::Path, sync::Arc};

use json_patch::{Patch, PatchOperation};
use kube::core::{
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
    DynamicObject,
};
use tracing::info;
use warp::{reply, Filter};

use crate::{
    dispatch::{Dispatcher, ReviewEvent},
    error::Result,
};

/// Build the response for a dispatched event: a JSON patch when there is something to patch,
/// otherwise an allowed response that leaves the object unchanged.
fn patch_response(
    req: &AdmissionRequest<DynamicObject>,
    patches: Vec<PatchOperation>,
) -> Result<AdmissionResponse> {
    let response = AdmissionResponse::from(req);
    if patches.is_empty() {
        return Ok(response);
    }
    Ok(response.with_patch(Patch(patches))?)
}

/// This function is responsible for handling a single admission review.
/// Errors from the dispatcher deny the request, nothing is patched in that case.
async fn admission_handler(
    body: AdmissionReview<DynamicObject>,
    dispatcher: &Dispatcher,
) -> anyhow::Result<reply::Json> {
    tracing::trace!("Admission Handler request {:?}", body);

    // Parse incoming webhook AdmissionRequest first
    let req: AdmissionRequest<DynamicObject> = body.try_into()?;
    let event = ReviewEvent::from(&req);

    tracing::debug!(
        kind = ?event.kind,
        operation = ?event.operation,
        name = %req.name,
        namespace = ?req.namespace,
        "Admitting object"
    );

    let response = match dispatcher
        .dispatch(&event)
        .await
        .and_then(|patches| patch_response(&req, patches))
    {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(
                name = %req.name,
                namespace = ?req.namespace,
                "Error: {}",
                err
            );
            AdmissionResponse::from(&req).deny(err.to_string())
        }
    };

    tracing::trace!("Admission response: {:?}", response);
    Ok(reply::json(&response.into_review()))
}

/// The `POST /mutate` route.
pub fn mutate_route(
    dispatcher: Arc<Dispatcher>,
) -> impl Filter<Extract = (reply::Json,), Error = warp::Rejection> + Clone {
    warp::post()
        .and(warp::path("mutate"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and_then(move |body: AdmissionReview<DynamicObject>| {
            let dispatcher = dispatcher.clone();
            async move {
                match admission_handler(body, &dispatcher).await {
                    Ok(reply) => Ok::<reply::Json, Infallible>(reply),
                    Err(err) => {
                        tracing::error!("Error: {:?}", err);
                        let res = AdmissionResponse::invalid(err.to_string());
                        Ok(reply::json(&res.into_review()))
                    }
                }
            }
        })
}

/// Serve the webhook over TLS until `shutdown` resolves.
pub fn webhook_task(
    tls_cert: &Path,
    tls_key: &Path,
    port: u16,
    dispatcher: Arc<Dispatcher>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> impl Future<Output = ()> + 'static {
    let routes = mutate_route(dispatcher).with(warp::trace::request());

    info!("Starting webhook server on port {}", port);
    let (_addr, fut) = warp::serve(routes)
        .tls()
        .cert_path(tls_cert)
        .key_path(tls_key)
        .bind_with_graceful_shutdown(([0, 0, 0, 0], port), shutdown);
    fut
}
