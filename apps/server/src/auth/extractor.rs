//! Actix-web extractor for operator authentication.
//!
//! The key header is wrapped in `SecretString` as soon as it is read and is
//! never logged.

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError, web};
use secrecy::{ExposeSecret, SecretString};
use std::future::{Ready, ready};

use super::{AdminKey, validate_actor};
use crate::config::{ACTOR_HEADER, ADMIN_KEY_HEADER};
use crate::error::ErrorResponse;

fn extract_secret_header(req: &HttpRequest, header_name: &str) -> Option<SecretString> {
    req.headers()
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(|s| SecretString::from(s.to_string()))
}

/// Authentication error for extractors.
#[derive(Debug)]
pub struct AuthError {
    status: StatusCode,
    message: String,
}

impl AuthError {
    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        let error = if self.status == StatusCode::UNAUTHORIZED {
            "UNAUTHORIZED"
        } else {
            "INVALID_INPUT"
        };
        HttpResponse::build(self.status).json(ErrorResponse {
            error: error.to_string(),
            message: self.message.clone(),
        })
    }
}

/// Extractor that requires the operator key and an acting identity.
///
/// ```ignore
/// async fn handler(auth: OperatorAuth) -> impl Responder {
///     // auth.actor is passed to the engine
/// }
/// ```
#[derive(Debug, Clone)]
pub struct OperatorAuth {
    pub actor: String,
}

impl FromRequest for OperatorAuth {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(stored_key) = req.app_data::<web::Data<AdminKey>>() else {
            return ready(Err(AuthError::unauthorized(
                "Internal configuration error",
            )));
        };

        let Some(provided) = extract_secret_header(req, ADMIN_KEY_HEADER) else {
            return ready(Err(AuthError::unauthorized(format!(
                "Missing operator key. Provide {} header.",
                ADMIN_KEY_HEADER
            ))));
        };

        if !stored_key.verify(provided.expose_secret()) {
            return ready(Err(AuthError::unauthorized("Invalid operator key")));
        }

        let actor = req
            .headers()
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        match validate_actor(actor) {
            Ok(actor) => ready(Ok(OperatorAuth {
                actor: actor.to_string(),
            })),
            Err(reason) => ready(Err(AuthError::bad_request(format!(
                "{} header: {}",
                ACTOR_HEADER, reason
            )))),
        }
    }
}
