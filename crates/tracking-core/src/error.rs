//! Tracking service errors

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the tracking crates.
pub type Result<T> = anyhow::Result<T, Error>;

/// Domain level error type returned by tracking operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Error {
    /// The shipment, vehicle or sample could not be found.
    #[error("code: 404, description: {0}")]
    NotFound(String),

    /// Missing coordinates or vehicle, out-of-range values, malformed telemetry.
    #[error("code: 400, description: {0}")]
    Validation(String),

    /// The requester may not read the resource.
    #[error("code: 403, description: {0}")]
    Forbidden(String),

    /// A simulation is already running and the restart policy rejects replacement.
    #[error("code: 409, description: {0}")]
    Conflict(String),

    /// A collaborator store failed to read or write.
    #[error("code: 500, description: persistence_error {0}")]
    Persistence(String),

    /// Configuration could not be loaded.
    #[error("code: 500, description: configuration_error {0}")]
    Configuration(String),

    /// A non recoverable internal error occurred.
    #[error("code: 500, description: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the HTTP status an adapter should map the variant to.
    #[must_use]
    pub const fn code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable, machine readable kind of the error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::Persistence(_) => "persistence_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }
}

// Collaborator stores report failures as `anyhow::Error`. Anything that is not
// already a domain error is treated as a persistence failure.
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        let chain = err.chain().map(ToString::to_string).collect::<Vec<_>>().join(" -> ");

        if let Some(inner) = err.downcast_ref::<Self>() {
            tracing::debug!("Error: {err}, caused by: {inner}");

            return match inner {
                Self::NotFound(_) => Self::NotFound(chain),
                Self::Validation(_) => Self::Validation(chain),
                Self::Forbidden(_) => Self::Forbidden(chain),
                Self::Conflict(_) => Self::Conflict(chain),
                Self::Persistence(e) => Self::Persistence(format!("{err}: {e}")),
                Self::Configuration(e) => Self::Configuration(format!("{err}: {e}")),
                Self::Internal(_) => Self::Internal(chain),
            };
        }

        Self::Persistence(chain)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("malformed payload: {err}"))
    }
}

#[macro_export]
macro_rules! bad_request {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Validation(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::Validation(format!($err))
    };
}

#[macro_export]
macro_rules! not_found {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::NotFound(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::NotFound(format!($err))
    };
}

#[macro_export]
macro_rules! forbidden {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Forbidden(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::Forbidden(format!($err))
    };
}

#[cfg(test)]
mod tests {
    use anyhow::{Context, Result, anyhow};
    use http::StatusCode;
    use serde_json::Value;

    use super::Error;

    #[test]
    fn error_display() {
        let err = Error::Validation("latitude out of range".to_string());
        assert_eq!(format!("{err}"), "code: 400, description: latitude out of range");
        assert_eq!(err.code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn with_context() {
        let context_error = || -> Result<(), Error> {
            Err::<(), Error>(Error::NotFound("shipment s-1".to_string()))
                .context("loading booking")
                .context("starting simulation")?;
            Ok(())
        };

        let result = context_error();
        assert_eq!(
            result.unwrap_err(),
            Error::NotFound(
                "starting simulation -> loading booking -> code: 404, description: shipment s-1"
                    .to_string()
            )
        );
    }

    #[test]
    fn store_failure_is_persistence() {
        let result =
            Err::<(), anyhow::Error>(anyhow!("connection reset")).context("appending sample");
        let err: Error = result.unwrap_err().into();

        assert_eq!(
            err.to_string(),
            "code: 500, description: persistence_error appending sample -> connection reset"
        );
        assert_eq!(err.code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn serde_failure_is_validation() {
        let err: Error = serde_json::from_str::<Value>(r#"{"lat": 1"#).unwrap_err().into();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn macros() {
        let id = "s-9";
        assert_eq!(bad_request!("bad id {id}"), Error::Validation("bad id s-9".to_string()));
        assert_eq!(not_found!("shipment {}", id), Error::NotFound("shipment s-9".to_string()));
        assert_eq!(forbidden!("admin only"), Error::Forbidden("admin only".to_string()));
    }
}
