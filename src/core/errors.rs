use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Field name to message, sorted by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(pub BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.values().map(String::as_str).collect();
        write!(f, "{}", messages.join(", "))
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),
    #[error("Invalid username or password")]
    Authentication,
    #[error("Authentication required")]
    Unauthenticated,
    #[error("File format should be PNG, JPG, or JPEG (got {0})")]
    UnsupportedMediaType(String),
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Image upload failed: {0}")]
    Upstream(String),
    #[error("Internal Error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication | ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show a client.
    fn public_message(&self) -> String {
        match self {
            ApiError::Upstream(_) => "Error uploading post".to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    fn log(&self) {
        match self {
            ApiError::Upstream(msg) => tracing::error!("Upstream failure: {}", msg),
            ApiError::Internal(msg) => tracing::error!("Internal failure: {}", msg),
            ApiError::Authentication => tracing::warn!("Rejected credentials"),
            _ => tracing::debug!("Request failed: {}", self),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}

impl From<actix_web::Error> for ApiError {
    fn from(err: actix_web::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// How an endpoint reports failures to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// HTML pages: redirects for auth failures, plain text otherwise.
    View,
    /// JSON endpoints: structured error bodies, 401 for auth failures.
    Api,
}

pub trait Mode: 'static {
    const MODE: ResponseMode;
}

#[derive(Debug, Clone, Copy)]
pub struct View;

#[derive(Debug, Clone, Copy)]
pub struct Api;

impl Mode for View {
    const MODE: ResponseMode = ResponseMode::View;
}

impl Mode for Api {
    const MODE: ResponseMode = ResponseMode::Api;
}

/// An [`ApiError`] tagged with the response mode of the endpoint that raised it.
pub struct Failure<M> {
    pub error: ApiError,
    _mode: PhantomData<M>,
}

pub type ViewResult<T = HttpResponse> = Result<T, Failure<View>>;
pub type ApiResult<T = HttpResponse> = Result<T, Failure<Api>>;

impl<M> From<ApiError> for Failure<M> {
    fn from(error: ApiError) -> Self {
        Self { error, _mode: PhantomData }
    }
}

impl<M> From<anyhow::Error> for Failure<M> {
    fn from(err: anyhow::Error) -> Self {
        ApiError::from(err).into()
    }
}

impl<M> fmt::Debug for Failure<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.error, f)
    }
}

impl<M> fmt::Display for Failure<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

fn validation_body(errors: &FieldErrors) -> serde_json::Value {
    json!({
        "name": "ValidationError",
        "message": errors.to_string(),
        "errors": errors.0,
    })
}

pub fn error_response(error: &ApiError, mode: ResponseMode) -> HttpResponse {
    error.log();
    match (mode, error) {
        (_, ApiError::Validation(errors)) => {
            HttpResponse::BadRequest().json(validation_body(errors))
        }
        (ResponseMode::View, ApiError::Unauthenticated) => redirect("/login"),
        (ResponseMode::View, ApiError::Authentication) => redirect("/"),
        (ResponseMode::View, other) => HttpResponse::build(other.status())
            .content_type("text/plain; charset=utf-8")
            .body(other.public_message()),
        (ResponseMode::Api, other) => HttpResponse::build(other.status())
            .json(json!({ "error": other.public_message() })),
    }
}

impl<M: Mode> ResponseError for Failure<M> {
    fn status_code(&self) -> StatusCode {
        match (M::MODE, &self.error) {
            (ResponseMode::View, ApiError::Unauthenticated | ApiError::Authentication) => {
                StatusCode::SEE_OTHER
            }
            (_, e) => e.status(),
        }
    }

    fn error_response(&self) -> HttpResponse {
        error_response(&self.error, M::MODE)
    }
}
