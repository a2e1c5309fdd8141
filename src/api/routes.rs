use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::services::CertificateService;

use super::handlers::{
    create_certificate_handler, download_certificate_handler, get_certificate_handler,
    health_handler, list_certificates_handler, upload_certificate_handler,
};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<CertificateService>,
}

pub fn build_router(service: Arc<CertificateService>) -> Router {
    let api_state = ApiState { service };

    let cert_ops = Router::new()
        .route("/create-certificate", post(create_certificate_handler))
        .route("/upload-certificate", post(upload_certificate_handler))
        .route("/certificates", get(list_certificates_handler))
        .route("/certificates/{id}", get(get_certificate_handler))
        .route("/certificates/{id}/pem", get(download_certificate_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/cert-ops", cert_ops)
        .with_state(api_state)
        .layer(TraceLayer::new_for_http())
}
