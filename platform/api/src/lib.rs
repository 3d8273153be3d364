//! Outcome model and error taxonomy shared by the store, the authorization
//! engine and the transport boundary.

mod error;
mod outcome;

pub use error::{ApiError, codes, correlation_id, internal_error};
pub use outcome::Outcome;

/// Shared result type for code that propagates errors with `?`.
pub type ApiResult<T> = Result<T, ApiError>;
