use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::metrics::CONTACT_SUBMISSIONS;
use crate::models::ContactForm;
use crate::rate_limit::{CONTACT_FORM_KEY, SlidingWindowLimiter, client_key};
use crate::sanitize::{FieldError, FieldKind, MAX_TEXT_LENGTH, sanitize_text, validate_field};

pub const MAX_SUBJECT_LENGTH: usize = 200;

const DELIVERY_FAILED: &str = "Failed to deliver message";

// Contact submission after sanitizing, what gets forwarded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
}

pub struct ContactService {
    http: reqwest::Client,
    forward_url: Option<String>,
    limiter: Arc<SlidingWindowLimiter>,
}

impl ContactService {
    pub fn new(
        http: reqwest::Client,
        forward_url: Option<String>,
        limiter: Arc<SlidingWindowLimiter>,
    ) -> Self {
        Self {
            http,
            forward_url,
            limiter,
        }
    }

    pub async fn submit(&self, client: &str, form: &ContactForm) -> Result<ContactMessage> {
        let message = sanitize_form(form)?;

        self.limiter.check(&client_key(CONTACT_FORM_KEY, client))?;

        match &self.forward_url {
            Some(url) => self.forward(url, &message).await?,
            None => tracing::info!(
                name = %message.name,
                email = %message.email,
                subject = %message.subject,
                length = message.message.chars().count(),
                "Contact submission received"
            ),
        }

        CONTACT_SUBMISSIONS.inc();
        Ok(message)
    }

    async fn forward(&self, url: &str, message: &ContactMessage) -> Result<()> {
        let res = self.http.post(url).json(message).send().await.map_err(|e| {
            tracing::error!(url, "Contact delivery failed: {}", e);
            AppError::Upstream(DELIVERY_FAILED.to_string())
        })?;

        if !res.status().is_success() {
            tracing::error!(url, status = res.status().as_u16(), "Contact delivery rejected");
            return Err(AppError::Upstream(DELIVERY_FAILED.to_string()));
        }
        Ok(())
    }
}

// Name, email and message are required; phone and subject may be blank
pub fn sanitize_form(form: &ContactForm) -> Result<ContactMessage> {
    let mut errors = Vec::new();

    let name = required(&form.name, FieldKind::Name, &mut errors);
    let email = required(&form.email, FieldKind::Email, &mut errors);

    let phone = match validate_field(&form.phone, FieldKind::Phone) {
        Ok(phone) => Some(phone),
        Err(FieldError::Missing) => None,
        Err(FieldError::Invalid) => {
            errors.push("phone is invalid".to_string());
            None
        }
    };

    let message = sanitize_text(&form.message, MAX_TEXT_LENGTH);
    if message.is_empty() {
        errors.push("message is required".to_string());
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    Ok(ContactMessage {
        name,
        email,
        phone,
        subject: sanitize_text(&form.subject, MAX_SUBJECT_LENGTH),
        message,
    })
}

fn required(input: &str, kind: FieldKind, errors: &mut Vec<String>) -> String {
    match validate_field(input, kind) {
        Ok(value) => value,
        Err(FieldError::Missing) => {
            errors.push(format!("{} is required", kind));
            String::new()
        }
        Err(FieldError::Invalid) => {
            errors.push(format!("{} is invalid", kind));
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::RateLimitPolicy;
    use crate::test_helpers::spawn_upstream;
    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use std::sync::Mutex;
    use std::time::Duration;

    type Inbox = Arc<Mutex<Vec<ContactMessage>>>;

    async fn inbox(State(inbox): State<Inbox>, Json(msg): Json<ContactMessage>) -> StatusCode {
        inbox.lock().unwrap().push(msg);
        StatusCode::NO_CONTENT
    }

    async fn rejecting() -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }

    fn limiter() -> Arc<SlidingWindowLimiter> {
        Arc::new(SlidingWindowLimiter::new(
            RateLimitPolicy::new(5, Duration::from_secs(900)),
            Arc::new(ManualClock::new(1_700_000_000_000)),
        ))
    }

    fn form() -> ContactForm {
        ContactForm {
            name: " Ana <b>García</b> ".to_string(),
            email: "Ana@Example.COM".to_string(),
            phone: "".to_string(),
            subject: "Proyecto de IA".to_string(),
            message: "<p>Queremos automatizar</p> reportes".to_string(),
        }
    }

    #[test]
    fn test_sanitize_form() {
        let msg = sanitize_form(&form()).unwrap();
        assert_eq!(
            msg,
            ContactMessage {
                name: "Ana García".to_string(),
                email: "ana@example.com".to_string(),
                phone: None,
                subject: "Proyecto de IA".to_string(),
                message: "Queremos automatizar reportes".to_string(),
            }
        );
    }

    #[test]
    fn test_sanitize_form_reports_missing_and_invalid_separately() {
        let bad = ContactForm {
            name: "".to_string(),
            email: "not-an-email".to_string(),
            phone: "12".to_string(),
            subject: "".to_string(),
            message: "<script>x()</script>".to_string(),
        };

        match sanitize_form(&bad) {
            Err(AppError::Validation(errors)) => assert_eq!(
                errors,
                vec![
                    "name is required".to_string(),
                    "email is invalid".to_string(),
                    "phone is invalid".to_string(),
                    "message is required".to_string(),
                ]
            ),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_phone_is_kept_when_valid() {
        let mut with_phone = form();
        with_phone.phone = " 555.123.4567 ".to_string();
        assert_eq!(
            sanitize_form(&with_phone).unwrap().phone,
            Some("555.123.4567".to_string())
        );
    }

    #[test]
    fn test_subject_is_truncated() {
        let mut long = form();
        long.subject = "s".repeat(500);
        assert_eq!(sanitize_form(&long).unwrap().subject.len(), MAX_SUBJECT_LENGTH);
    }

    #[tokio::test]
    async fn test_submit_forwards_sanitized_message() {
        let received: Inbox = Arc::default();
        let app = Router::new()
            .route("/hook", post(inbox))
            .with_state(received.clone());
        let base = spawn_upstream(app).await;

        let service = ContactService::new(
            reqwest::Client::new(),
            Some(format!("{}/hook", base)),
            limiter(),
        );
        service.submit("global", &form()).await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].email, "ana@example.com");
    }

    #[tokio::test]
    async fn test_submit_without_forward_url_is_accepted() {
        let service = ContactService::new(reqwest::Client::new(), None, limiter());
        assert!(service.submit("global", &form()).await.is_ok());
    }

    #[tokio::test]
    async fn test_sixth_submission_is_rate_limited() {
        let service = ContactService::new(reqwest::Client::new(), None, limiter());

        for _ in 0..5 {
            service.submit("203.0.113.7", &form()).await.unwrap();
        }
        let sixth = service.submit("203.0.113.7", &form()).await;
        assert!(matches!(sixth, Err(AppError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_invalid_submissions_do_not_use_quota() {
        let limiter = limiter();
        let service = ContactService::new(reqwest::Client::new(), None, limiter.clone());

        let _ = service.submit("global", &ContactForm::default()).await;
        assert_eq!(limiter.remaining_requests("contact-form:global"), 5);
    }

    #[tokio::test]
    async fn test_rejected_delivery_is_upstream_error() {
        let base = spawn_upstream(Router::new().route("/hook", post(rejecting))).await;
        let service = ContactService::new(
            reqwest::Client::new(),
            Some(format!("{}/hook", base)),
            limiter(),
        );

        match service.submit("global", &form()).await {
            Err(AppError::Upstream(msg)) => assert_eq!(msg, "Failed to deliver message"),
            other => panic!("expected upstream error, got {:?}", other),
        }
    }
}
