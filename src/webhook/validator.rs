//! Validating admission webhook for SSP resources

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use tracing::{error, info, instrument};

use crate::crd::Ssp;
use crate::error::Result;
use crate::manager::Manager;
use crate::scheme::Scheme;

/// Path the API server posts SSP admission reviews to
pub const VALIDATE_PATH: &str = "/validate-ssp-kubevirt-io-v1beta1-ssp";

pub struct SspValidator;

impl SspValidator {
    pub fn setup_webhook_with_manager(mgr: &mut Manager) -> Result<()> {
        let scheme = mgr.scheme();
        mgr.webhook_server()
            .register(VALIDATE_PATH, post(validate_handler).with_state(scheme))
    }
}

/// Decide on a parsed admission request
pub fn review(scheme: &Scheme, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let gvk = &req.kind;
    if !scheme.recognizes(gvk) {
        return AdmissionResponse::from(req).deny(format!(
            "kind {}/{} {} is not served by this webhook",
            gvk.group, gvk.version, gvk.kind
        ));
    }

    if !matches!(req.operation, Operation::Create | Operation::Update) {
        return AdmissionResponse::from(req);
    }

    let Some(object) = req.object.as_ref() else {
        return AdmissionResponse::from(req).deny("admission request carries no object");
    };

    let ssp: Ssp = match serde_json::to_value(object).and_then(serde_json::from_value) {
        Ok(ssp) => ssp,
        Err(e) => {
            return AdmissionResponse::from(req).deny(format!("invalid SSP object: {e}"));
        }
    };

    match ssp.spec.validate() {
        Ok(()) => AdmissionResponse::from(req),
        Err(errors) => {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            AdmissionResponse::from(req).deny(messages.join("; "))
        }
    }
}

#[instrument(skip(scheme, admission_review))]
async fn validate_handler(
    State(scheme): State<Arc<Scheme>>,
    Json(admission_review): Json<AdmissionReview<DynamicObject>>,
) -> (StatusCode, Json<AdmissionReview<DynamicObject>>) {
    let req: AdmissionRequest<DynamicObject> = match admission_review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!("Failed to parse admission request: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    AdmissionResponse::invalid(format!("Invalid admission request: {e}"))
                        .into_review(),
                ),
            );
        }
    };

    let response = review(&scheme, &req);
    info!(
        name = %req.name,
        namespace = ?req.namespace,
        allowed = response.allowed,
        "Validated SSP"
    );

    (StatusCode::OK, Json(response.into_review()))
}
