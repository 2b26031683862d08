use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, header},
    http::header::InvalidHeaderValue,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub const DEV_ORIGINS: &[&str] = &["http://localhost:5173", "http://localhost:3000"];

// Sources the Content-Security-Policy is built from
#[derive(Debug, Clone, Default)]
pub struct CspSources {
    pub dev: bool,
    pub provider_origin: Option<String>,
    pub analytics_endpoint: Option<String>,
    pub websocket_url: Option<String>,
}

// "directive v1 v2; directive2 ...", directives without values render bare
pub fn build_csp(sources: &CspSources) -> String {
    let provider = sources.provider_origin.as_deref();

    let mut script_src = vec!["'self'"];
    if sources.dev {
        script_src.push("'unsafe-inline'");
    }
    script_src.push("https://apis.google.com");
    script_src.extend(provider);

    let mut connect_src = vec!["'self'"];
    connect_src.extend(provider);
    if sources.dev {
        connect_src.push("ws:");
    }
    connect_src.extend(sources.analytics_endpoint.as_deref());
    connect_src.extend(sources.websocket_url.as_deref());

    let directives: Vec<(&str, Vec<&str>)> = vec![
        ("default-src", vec!["'self'"]),
        ("script-src", script_src),
        ("style-src", vec!["'self'", "'unsafe-inline'"]),
        ("img-src", vec!["'self'", "data:", "https:", "blob:"]),
        ("font-src", vec!["'self'", "data:", "https:"]),
        ("connect-src", connect_src),
        ("frame-src", vec!["'none'"]),
        ("object-src", vec!["'none'"]),
        ("base-uri", vec!["'self'"]),
        ("form-action", vec!["'self'"]),
        ("upgrade-insecure-requests", vec![]),
        ("block-all-mixed-content", vec![]),
    ];

    directives
        .into_iter()
        .map(|(name, values)| {
            let values: Vec<&str> = values.into_iter().filter(|v| !v.is_empty()).collect();
            if values.is_empty() {
                name.to_string()
            } else {
                format!("{} {}", name, values.join(" "))
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// Headers stamped on every response
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    pub fn new(sources: &CspSources) -> Result<Self, InvalidHeaderValue> {
        let csp = HeaderValue::from_str(&build_csp(sources))?;

        Ok(Self {
            headers: vec![
                (header::CONTENT_SECURITY_POLICY, csp),
                (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
                (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
                (header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
                (
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("strict-origin-when-cross-origin"),
                ),
                (
                    HeaderName::from_static("permissions-policy"),
                    HeaderValue::from_static("geolocation=(), camera=(), microphone=()"),
                ),
            ],
        })
    }
}

pub async fn security_headers(
    State(security): State<Arc<SecurityHeaders>>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    for (name, value) in &security.headers {
        headers.insert(name.clone(), value.clone());
    }
    response
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    // If origins list contains "*", allow any origin
    if allowed_origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

// "https://api.openai.com/v1" -> "https://api.openai.com"
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}
