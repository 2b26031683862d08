use axum::{
    Json,
    extract::{
        ConnectInfo, FromRef, FromRequest, FromRequestParts, Request, rejection::JsonRejection,
    },
    http::{HeaderMap, request::Parts},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::error::AppError;
use crate::state::AppState;

// JSON extractor whose rejections use the standard error envelope
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppJsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(value) => Ok(Self(value.0)),
            Err(rejection) => Err(AppJsonRejection(rejection)),
        }
    }
}

pub struct AppJsonRejection(JsonRejection);

impl IntoResponse for AppJsonRejection {
    fn into_response(self) -> Response {
        let message = match self.0 {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON data: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("Invalid JSON syntax: {}", err),
            JsonRejection::MissingJsonContentType(err) => {
                format!("Missing JSON content type: {}", err)
            }
            _ => "Failed to parse JSON body".to_string(),
        };

        AppError::BadRequest(message).into_response()
    }
}

// Visitor identity for per-client rate limiting. Forwarding headers are the
// client's to write, so they only count behind a trusted proxy; otherwise the
// peer address is used, "global" when neither is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> Self {
        let forwarded = if trust_proxy {
            normalized_forwarded_for(headers).or_else(|| normalized_real_ip(headers))
        } else {
            None
        };

        let id = forwarded
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| "global".to_string());
        ClientId(id)
    }
}

impl<S> FromRequestParts<S> for ClientId
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientId::resolve(&parts.headers, peer, state.trust_proxy))
    }
}

const MAX_FORWARDED_LEN: usize = 64;

// first hop only, and only when it is an actual ip address
fn normalized_forwarded_for(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;
    parse_ip(raw.split(',').next()?)
}

fn normalized_real_ip(headers: &HeaderMap) -> Option<String> {
    parse_ip(headers.get("x-real-ip")?.to_str().ok()?)
}

fn parse_ip(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > MAX_FORWARDED_LEN {
        return None;
    }
    raw.parse::<IpAddr>().ok().map(|ip| ip.to_string())
}
