use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::{
    domain::{CertificateId, OwnerId},
    errors::Error,
    pki::IdentityRequest,
    services::Acknowledgment,
    storage::CertificateRecord,
};

use crate::api::error::ApiError;
use crate::api::routes::ApiState;

/// Body of `POST /cert-ops/create-certificate`
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCertificateBody {
    #[validate(length(min = 1, max = 128, message = "owner_id must be 1-128 characters"))]
    #[serde(alias = "user_id")]
    pub owner_id: String,

    /// Optional caller-chosen id; generated when absent
    #[serde(default)]
    pub certificate_id: Option<String>,

    #[serde(flatten)]
    pub request: IdentityRequest,
}

pub async fn create_certificate_handler(
    State(state): State<ApiState>,
    Json(body): Json<CreateCertificateBody>,
) -> Result<(StatusCode, Json<Acknowledgment>), ApiError> {
    body.validate().map_err(Error::from)?;

    let owner_id = OwnerId::new(body.owner_id);
    let acknowledgment = match body.certificate_id {
        Some(id) => {
            let certificate_id = CertificateId::parse(&id).map_err(|_| {
                ApiError::bad_request(format!("certificate_id '{}' is not a UUID", id))
            })?;
            state.service.issue_as(certificate_id, owner_id, body.request)?
        }
        None => state.service.issue(owner_id, body.request)?,
    };

    Ok((StatusCode::ACCEPTED, Json(acknowledgment)))
}

pub async fn upload_certificate_handler(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Acknowledgment>), ApiError> {
    let mut pem_file = None;
    let mut user_id = None;
    let mut cert_name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "pem_file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read pem_file: {}", e)))?;
                pem_file = Some(bytes);
            }
            "user_id" | "cert_name" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read {}: {}", name, e)))?;
                if name == "user_id" {
                    user_id = Some(value);
                } else {
                    cert_name = Some(value);
                }
            }
            _ => {}
        }
    }

    let pem_file = pem_file.ok_or_else(|| ApiError::bad_request("missing form field 'pem_file'"))?;
    let user_id = user_id
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing form field 'user_id'"))?;
    let cert_name = cert_name
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing form field 'cert_name'"))?;

    let acknowledgment =
        state.service.upload_and_ingest(&pem_file, OwnerId::new(user_id), cert_name).await?;

    info!(certificate_id = %acknowledgment.certificate_id, "Certificate upload accepted");
    Ok((StatusCode::CREATED, Json(acknowledgment)))
}

/// Query of `GET /cert-ops/certificates`
#[derive(Debug, Deserialize)]
pub struct ListCertificatesQuery {
    #[serde(alias = "user_id")]
    pub owner_id: String,
}

pub async fn list_certificates_handler(
    State(state): State<ApiState>,
    Query(query): Query<ListCertificatesQuery>,
) -> Result<Json<Vec<CertificateRecord>>, ApiError> {
    if query.owner_id.trim().is_empty() {
        return Err(ApiError::bad_request("owner_id must not be empty"));
    }

    let records = state.service.list_certificates(&OwnerId::new(query.owner_id)).await?;
    Ok(Json(records))
}

pub async fn download_certificate_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let certificate_id = CertificateId::parse(&id)
        .map_err(|_| ApiError::NotFound(format!("Certificate '{}' not found", id)))?;

    let pem = state.service.get_certificate_pem(&certificate_id).await?;
    Ok(([(header::CONTENT_TYPE, "application/x-pem-file")], pem))
}

pub async fn get_certificate_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<CertificateRecord>, ApiError> {
    let certificate_id = CertificateId::parse(&id)
        .map_err(|_| ApiError::NotFound(format!("Certificate '{}' not found", id)))?;

    let record = state.service.get_certificate(&certificate_id).await?;
    Ok(Json(record))
}
