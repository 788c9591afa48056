//! Canned response bodies.
//!
//! Handlers build their bodies through [`Reply`] so that every success and
//! error shares one shape. The bodies are plain data; the envelope middleware
//! adds the request metadata on the way out.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form error details, keyed by field or topic.
pub type Details = Map<String, Value>;

/// Pagination metadata attached to list responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_data: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_page: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub code: u16,
    pub message: String,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T> SuccessResponse<T> {
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_meta(mut self, meta: PageMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: u16,
    pub message: String,
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn with_details(mut self, details: Details) -> Self {
        self.error.details = Some(details);
        self
    }

    /// HTTP status matching `code`; unknown codes degrade to 500.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Either shape of response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiResponse<T> {
    Success(SuccessResponse<T>),
    Error(ErrorResponse),
}

impl<T> From<SuccessResponse<T>> for ApiResponse<T> {
    fn from(value: SuccessResponse<T>) -> Self {
        ApiResponse::Success(value)
    }
}

impl<T> From<ErrorResponse> for ApiResponse<T> {
    fn from(value: ErrorResponse) -> Self {
        ApiResponse::Error(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaginationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Constructors for [`SuccessResponse`] and [`ErrorResponse`].
pub struct Reply;

impl Reply {
    pub const DEFAULT_SUCCESS: &'static str = "Success";
    pub const DEFAULT_RESOURCE: &'static str = "Resource";

    pub fn success<T>(data: T) -> SuccessResponse<T> {
        SuccessResponse {
            success: true,
            code: 200,
            message: Self::DEFAULT_SUCCESS.to_string(),
            data,
            meta: None,
        }
    }

    pub fn error(message: impl Into<String>, code: u16) -> ErrorResponse {
        let message = message.into();
        ErrorResponse {
            success: false,
            code,
            message: message.clone(),
            error: ErrorBody { message, details: None },
        }
    }

    pub fn not_found(resource: Option<&str>) -> ErrorResponse {
        Self::error(format!("{} not found", resource.unwrap_or(Self::DEFAULT_RESOURCE)), 404)
    }

    pub fn bad_request(message: impl Into<String>, details: Option<Details>) -> ErrorResponse {
        attach(Self::error(message, 400), details)
    }

    pub fn unauthorized(message: Option<&str>) -> ErrorResponse {
        Self::error(message.unwrap_or("Unauthorized"), 401)
    }

    pub fn forbidden(message: Option<&str>) -> ErrorResponse {
        Self::error(message.unwrap_or("Forbidden"), 403)
    }

    pub fn validation_error(details: Details, message: Option<&str>) -> ErrorResponse {
        Self::error(message.unwrap_or("Validation Error"), 422).with_details(details)
    }

    /// Builds one page of a list response.
    ///
    /// `totalPage` is `ceil(total_data / limit)`. A zero `limit` is rejected
    /// instead of producing a division by zero.
    pub fn paginate<T>(
        data: Vec<T>,
        total_data: u64,
        page: u64,
        limit: u64,
        message: Option<&str>,
    ) -> Result<SuccessResponse<Vec<T>>, PaginationError> {
        if limit == 0 {
            return Err(PaginationError::InvalidArgument("limit must be greater than 0"));
        }
        let meta = PageMeta {
            page: Some(page),
            limit: Some(limit),
            total_data: Some(total_data),
            total_page: Some(total_data.div_ceil(limit)),
        };
        Ok(Self::success(data)
            .with_message(message.unwrap_or(Self::DEFAULT_SUCCESS))
            .with_meta(meta))
    }
}

fn attach(resp: ErrorResponse, details: Option<Details>) -> ErrorResponse {
    match details {
        Some(d) => resp.with_details(d),
        None => resp,
    }
}

impl<T: Serialize> IntoResponse for SuccessResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success(s) => s.into_response(),
            ApiResponse::Error(e) => e.into_response(),
        }
    }
}
