use std::borrow::Cow;
use std::fmt::Display;

use async_graphql::{Error as GraphqlError, ErrorExtensions};
use http::StatusCode;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Stable error codes carried by [`ApiError`].
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION: &str = "VALIDATION";
    pub const CONFLICT: &str = "CONFLICT";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const NULL_VALUE: &str = "NULL_VALUE";
    pub const CANCELLED: &str = "CANCELLED";
    /// Infrastructure fault captured at a store boundary.
    pub const EXCEPTION: &str = "EXCEPTION";
    /// Masked fault as seen by external callers.
    pub const INTERNAL: &str = "INTERNAL";
}

/// Error half of an [`Outcome`](crate::Outcome).
///
/// `ApiError::NONE` is the "no error" sentinel and compares unequal to every
/// constructed error.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    code: Cow<'static, str>,
    message: Cow<'static, str>,
    status: StatusCode,
}

impl ApiError {
    pub const NONE: ApiError = ApiError {
        code: Cow::Borrowed(""),
        message: Cow::Borrowed(""),
        status: StatusCode::OK,
    };

    pub const NULL_VALUE: ApiError = ApiError {
        code: Cow::Borrowed(codes::NULL_VALUE),
        message: Cow::Borrowed("the requested value is null"),
        status: StatusCode::NOT_FOUND,
    };

    pub fn custom(
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
        status: StatusCode,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status,
        }
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::custom(codes::NOT_FOUND, message, StatusCode::NOT_FOUND)
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::custom(codes::VALIDATION, message, StatusCode::BAD_REQUEST)
    }

    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::custom(codes::CONFLICT, message, StatusCode::CONFLICT)
    }

    pub fn unauthenticated() -> Self {
        Self::custom(
            codes::UNAUTHENTICATED,
            "authentication required",
            StatusCode::UNAUTHORIZED,
        )
    }

    pub fn unauthorized() -> Self {
        Self::custom(codes::UNAUTHORIZED, "permission denied", StatusCode::FORBIDDEN)
    }

    pub fn cancelled() -> Self {
        Self::custom(
            codes::CANCELLED,
            "operation cancelled",
            StatusCode::REQUEST_TIMEOUT,
        )
    }

    /// Wraps an unexpected fault. Only a safe description is kept; callers
    /// log the underlying error themselves.
    pub fn from_error<E>(_err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        Self::custom(
            codes::EXCEPTION,
            "an unexpected error occurred while processing the request",
            StatusCode::INTERNAL_SERVER_ERROR,
        )
    }

    pub fn internal(correlation_id: &str) -> Self {
        Self::custom(
            codes::INTERNAL,
            format!("internal server error (ref: {correlation_id})"),
            StatusCode::INTERNAL_SERVER_ERROR,
        )
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    pub fn is_infrastructure(&self) -> bool {
        matches!(self.code.as_ref(), codes::EXCEPTION | codes::INTERNAL)
            || self.status.is_server_error()
    }

    /// Replaces infrastructure faults with a generic `INTERNAL` error that
    /// only carries a correlation id. The original is logged under that id.
    pub fn mask(self) -> Self {
        if !self.is_infrastructure() || self.code == codes::INTERNAL {
            return self;
        }
        let reference = correlation_id();
        error!(
            correlation_id = %reference,
            code = %self.code,
            message = %self.message,
            status = self.status.as_u16(),
            "masking internal error"
        );
        Self::internal(&reference)
    }
}

impl ErrorExtensions for ApiError {
    fn extend(&self) -> GraphqlError {
        let masked = self.clone().mask();
        GraphqlError::new(masked.message()).extend_with(|_err, e| {
            e.set("code", masked.code());
            e.set("status", i32::from(masked.status().as_u16()));
        })
    }
}

/// Short upper-case reference printed to callers and logged server-side.
pub fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_ascii_uppercase()
}

/// Convert any error into a GraphQL error payload while hiding internals.
pub fn internal_error(err: impl Display) -> GraphqlError {
    let reference = correlation_id();
    error!(correlation_id = %reference, error = %err, "unhandled error");
    ApiError::internal(&reference).extend()
}
