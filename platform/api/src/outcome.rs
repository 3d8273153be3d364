use crate::error::ApiError;

/// Success-or-failure capsule returned by every store and service call.
///
/// A success holds a value, a failure holds an [`ApiError`] other than
/// [`ApiError::NONE`]. Reading the value of a failure, or the error of a
/// success, is a programmer error and panics.
#[must_use]
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome<T> {
    state: State<T>,
    message: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
enum State<T> {
    Success(T),
    Failure(ApiError),
}

impl<T> Outcome<T> {
    pub fn success(value: T) -> Self {
        Self {
            state: State::Success(value),
            message: None,
        }
    }

    pub fn success_with_message(value: T, message: impl Into<String>) -> Self {
        Self {
            state: State::Success(value),
            message: Some(message.into()),
        }
    }

    #[track_caller]
    pub fn failure(error: ApiError) -> Self {
        assert!(!error.is_none(), "failure outcome must carry an error");
        Self {
            state: State::Failure(error),
            message: None,
        }
    }

    #[track_caller]
    pub fn failure_with_message(error: ApiError, message: impl Into<String>) -> Self {
        let mut outcome = Self::failure(error);
        outcome.message = Some(message.into());
        outcome
    }

    /// `None` becomes a `NULL_VALUE` failure.
    pub fn from_nullable(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::success(value),
            None => Self::failure(ApiError::NULL_VALUE),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state, State::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    #[track_caller]
    pub fn value(&self) -> &T {
        match &self.state {
            State::Success(value) => value,
            State::Failure(_) => panic!("cannot access the value of a failed outcome"),
        }
    }

    #[track_caller]
    pub fn into_value(self) -> T {
        match self.state {
            State::Success(value) => value,
            State::Failure(_) => panic!("cannot access the value of a failed outcome"),
        }
    }

    #[track_caller]
    pub fn error(&self) -> &ApiError {
        match &self.state {
            State::Failure(error) => error,
            State::Success(_) => panic!("cannot access the error of a successful outcome"),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn as_result(&self) -> Result<&T, &ApiError> {
        match &self.state {
            State::Success(value) => Ok(value),
            State::Failure(error) => Err(error),
        }
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match self.state {
            State::Success(value) => Ok(value),
            State::Failure(error) => Err(error),
        }
    }

    pub fn ok(self) -> Option<T> {
        self.into_result().ok()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        let state = match self.state {
            State::Success(value) => State::Success(f(value)),
            State::Failure(error) => State::Failure(error),
        };
        Outcome {
            state,
            message: self.message,
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self.state {
            State::Success(value) => f(value),
            State::Failure(error) => Outcome {
                state: State::Failure(error),
                message: self.message,
            },
        }
    }
}

impl<T> From<Result<T, ApiError>> for Outcome<T> {
    #[track_caller]
    fn from(value: Result<T, ApiError>) -> Self {
        match value {
            Ok(value) => Self::success(value),
            Err(error) => Self::failure(error),
        }
    }
}
