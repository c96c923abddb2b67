use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequest, Multipart, Request, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::caption::CaptionProvider;
use crate::error::ApiError;
use crate::middleware::client_ip;
use crate::response::{CaptionResponse, HealthResponse};
use crate::usage::UsageTracker;

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Application state containing the usage tracker and caption provider.
/// `captioner` is `None` when no API key is configured.
pub struct AppState {
    pub usage: UsageTracker,
    pub captioner: Option<CaptionProvider>,
}

#[derive(Debug, Deserialize)]
pub struct CaptionRequest {
    #[serde(rename = "imageBase64", alias = "image_base64", default)]
    pub image_base64: Option<String>,
}

const MISSING_IMAGE: &str = "Either image file or imageBase64 is required";

/// The single input shape handed to the caption provider: a media-type
/// prefixed base64 data URI.
enum ImageSource {
    Upload { bytes: Bytes, media_type: String },
    Encoded(String),
}

impl ImageSource {
    fn into_data_uri(self) -> String {
        match self {
            ImageSource::Upload { bytes, media_type } => {
                format!("data:{};base64,{}", media_type, BASE64.encode(&bytes))
            }
            ImageSource::Encoded(encoded) => {
                if encoded.starts_with("data:image/") {
                    encoded
                } else {
                    format!("data:image/jpeg;base64,{encoded}")
                }
            }
        }
    }
}

/// Generate a caption for an uploaded or pre-encoded image
pub async fn generate_caption(
    State(state): State<SharedState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    request: Request,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = identify_caller(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    let image = extract_image(&headers, request).await?;
    let data_uri = image.into_data_uri();

    let decision = state.usage.check(&identifier);
    if !decision.allowed {
        warn!(
            identifier = %identifier,
            total_used = decision.total_used,
            "daily caption limit exceeded"
        );
        return Err(ApiError::QuotaExceeded {
            plan: decision.plan,
            reset_time: decision.reset_time,
        });
    }

    let captioner = state.captioner.as_ref().ok_or_else(|| {
        ApiError::Configuration("OPENROUTER_API_KEY is not set".to_string())
    })?;

    let caption = captioner.caption(&data_uri).await?;

    info!(
        identifier = %identifier,
        plan = decision.plan.as_str(),
        "caption generated"
    );

    Ok(Json(CaptionResponse::new(
        caption,
        decision.plan,
        decision.remaining,
    )))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse::ok())
}

/// Caller identity: `X-User-Id` header, else client network address, else a
/// fresh anonymous identifier. Caller-supplied and unauthenticated.
fn identify_caller(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(user_id) = headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
        if !user_id.is_empty() {
            return user_id.to_string();
        }
    }

    if let Some(ip) = client_ip(headers, peer) {
        return ip;
    }

    Uuid::new_v4().to_string()
}

/// Pull the image out of the request body: multipart form with an `image`
/// file field or an `imageBase64` text field, or a JSON body carrying
/// `imageBase64`.
async fn extract_image(headers: &HeaderMap, request: Request) -> Result<ImageSource, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("multipart/form-data") {
        return extract_from_multipart(request).await;
    }

    let Json(payload) = Json::<CaptionRequest>::from_request(request, &())
        .await
        .map_err(|_| ApiError::InvalidInput(MISSING_IMAGE.to_string()))?;

    match payload.image_base64.filter(|s| !s.is_empty()) {
        Some(encoded) => Ok(ImageSource::Encoded(encoded)),
        None => Err(ApiError::InvalidInput(MISSING_IMAGE.to_string())),
    }
}

async fn extract_from_multipart(request: Request) -> Result<ImageSource, ApiError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let mut upload: Option<(Bytes, String)> = None;
    let mut encoded: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("image") => {
                let media_type = field.content_type().unwrap_or("image/jpeg").to_string();
                if !media_type.starts_with("image/") {
                    return Err(ApiError::InvalidInput(
                        "Only image files are allowed".to_string(),
                    ));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
                upload = Some((bytes, media_type));
            }
            Some("imageBase64") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
                if !text.is_empty() {
                    encoded = Some(text);
                }
            }
            _ => {}
        }
    }

    match (upload, encoded) {
        (Some((bytes, media_type)), _) => Ok(ImageSource::Upload { bytes, media_type }),
        (None, Some(encoded)) => Ok(ImageSource::Encoded(encoded)),
        (None, None) => Err(ApiError::InvalidInput(MISSING_IMAGE.to_string())),
    }
}
