//! Token request body extraction
//!
//! `POST /generateToken` accepts the same fields as JSON, URL-encoded form,
//! multipart form or XML, dispatched on `Content-Type`.

use axum::{
    Form,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::Error;
use crate::oauth::TokenRequest;

/// Extractor for a [`TokenRequest`] in any supported encoding
#[derive(Debug)]
pub struct TokenRequestBody(pub TokenRequest);

impl<S> FromRequest<S> for TokenRequestBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mime = media_type(&req);
        debug!(content_type = %mime, "Decoding token request");

        let request: TokenRequest = match mime.as_str() {
            // No content type: assume JSON, the common API client default
            "" | "application/json" => {
                let bytes = Bytes::from_request(req, state)
                    .await
                    .map_err(IntoResponse::into_response)?;
                serde_json::from_slice(&bytes).map_err(|e| invalid_body("JSON", &e))?
            }
            "application/x-www-form-urlencoded" => {
                let Form(request) = Form::<TokenRequest>::from_request(req, state)
                    .await
                    .map_err(IntoResponse::into_response)?;
                request
            }
            "multipart/form-data" => {
                let multipart = Multipart::from_request(req, state)
                    .await
                    .map_err(IntoResponse::into_response)?;
                read_multipart(multipart).await?
            }
            "application/xml" | "text/xml" => {
                let bytes = Bytes::from_request(req, state)
                    .await
                    .map_err(IntoResponse::into_response)?;
                quick_xml::de::from_reader(bytes.as_ref()).map_err(|e| invalid_body("XML", &e))?
            }
            other => {
                return Err((
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    format!("Unsupported content type: {other}"),
                )
                    .into_response());
            }
        };

        Ok(Self(request))
    }
}

/// Lower-cased media type without parameters (`; charset=...`, `; boundary=...`)
fn media_type(req: &Request) -> String {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn invalid_body(format: &str, e: &dyn std::fmt::Display) -> Response {
    Error::InvalidArgument(format!("invalid {format} body: {e}")).into_response()
}

async fn read_multipart(mut multipart: Multipart) -> Result<TokenRequest, Response> {
    let mut request = TokenRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(IntoResponse::into_response)?
    {
        let name = field.name().unwrap_or_default().to_string();
        let value = field.text().await.map_err(IntoResponse::into_response)?;
        let slot = match name.as_str() {
            "code" => &mut request.code,
            "appKey" => &mut request.app_key,
            "appSecret" => &mut request.app_secret,
            "codeVerifier" => &mut request.code_verifier,
            "redirectUri" => &mut request.redirect_uri,
            _ => {
                debug!(field = %name, "Ignoring unknown multipart field");
                continue;
            }
        };
        *slot = Some(value);
    }

    Ok(request)
}
