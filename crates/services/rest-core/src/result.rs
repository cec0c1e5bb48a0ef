use crate::error::{ClassifiedError, ErrorKind};

/// Outcome of every client call: a decoded value or a classified error
///
/// Exactly one branch is populated. Branch on it, or convert with
/// [`ApiResult::into_result`] to use `?`.
#[must_use = "an ApiResult may hold an error that should be inspected"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResult<T> {
    /// The call succeeded and the body decoded
    Ok {
        /// Decoded payload
        value: T,
    },
    /// The call failed
    Err {
        /// What went wrong
        error: ClassifiedError,
    },
}

impl<T> ApiResult<T> {
    /// Wraps a value
    pub const fn success(value: T) -> Self {
        Self::Ok { value }
    }

    /// Wraps an error
    pub const fn failure(error: ClassifiedError) -> Self {
        Self::Err { error }
    }

    /// `true` for [`ApiResult::Ok`]
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// `true` for [`ApiResult::Err`]
    #[must_use]
    pub const fn is_err(&self) -> bool {
        matches!(self, Self::Err { .. })
    }

    /// Borrows the value, if any
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Ok { value } => Some(value),
            Self::Err { .. } => None,
        }
    }

    /// Borrows the error, if any
    #[must_use]
    pub const fn error(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Ok { .. } => None,
            Self::Err { error } => Some(error),
        }
    }

    /// Error kind, if the call failed
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ok { .. } => None,
            Self::Err { error } => Some(error.kind()),
        }
    }

    /// Takes the value, discarding any error
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Ok { value } => Some(value),
            Self::Err { .. } => None,
        }
    }

    /// Takes the error, discarding any value
    #[must_use]
    pub fn into_error(self) -> Option<ClassifiedError> {
        match self {
            Self::Ok { .. } => None,
            Self::Err { error } => Some(error),
        }
    }

    /// Maps the value, leaving an error untouched
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ApiResult<U> {
        match self {
            Self::Ok { value } => ApiResult::Ok { value: f(value) },
            Self::Err { error } => ApiResult::Err { error },
        }
    }

    /// Converts into a standard `Result`
    ///
    /// # Errors
    ///
    /// Returns the classified error for [`ApiResult::Err`].
    pub fn into_result(self) -> Result<T, ClassifiedError> {
        match self {
            Self::Ok { value } => Ok(value),
            Self::Err { error } => Err(error),
        }
    }
}

impl<T> From<ApiResult<T>> for Result<T, ClassifiedError> {
    fn from(result: ApiResult<T>) -> Self {
        result.into_result()
    }
}

impl<T> From<Result<T, ClassifiedError>> for ApiResult<T> {
    fn from(result: Result<T, ClassifiedError>) -> Self {
        match result {
            Ok(value) => Self::Ok { value },
            Err(error) => Self::Err { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_branch() {
        let r = ApiResult::success(7);
        assert!(r.is_ok());
        assert!(!r.is_err());
        assert_eq!(r.value(), Some(&7));
        assert!(r.error().is_none());
        assert_eq!(r.kind(), None);
        assert_eq!(r.map(|v| v * 2).into_value(), Some(14));
    }

    #[test]
    fn err_branch() {
        let r: ApiResult<u32> =
            ApiResult::failure(ClassifiedError::new(ErrorKind::ClientError, "HTTP 404"));
        assert!(r.is_err());
        assert_eq!(r.kind(), Some(ErrorKind::ClientError));
        assert!(r.value().is_none());
        let mapped = r.clone().map(|v| v + 1);
        assert_eq!(mapped.kind(), Some(ErrorKind::ClientError));
        assert_eq!(r.into_error().map(|e| e.kind()), Some(ErrorKind::ClientError));
    }

    #[test]
    fn converts_to_and_from_result() -> anyhow::Result<()> {
        let ok: Result<u32, ClassifiedError> = ApiResult::success(1).into();
        assert_eq!(ok?, 1);

        let err: ApiResult<u32> =
            Err(ClassifiedError::new(ErrorKind::Timeout, "slow")).into();
        assert_eq!(err.kind(), Some(ErrorKind::Timeout));
        assert!(err.into_result().is_err());
        Ok(())
    }
}
