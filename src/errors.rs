//! Error utilities

use crate::gvk::GroupVersionResource;

/// Describes error reason
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Conflict,
    AlreadyExists,
    BadRequest,
    Invalid,
    UnsupportedMediaType,
    /// Catch-all variant. Since this enum is non-exhaustive,
    /// it should be handled with `_` pattern
    Unknown,
}

/// Tries to classify k8s error
pub fn classify(error_reason: &str) -> ErrorClass {
    match error_reason {
        "NotFound" => ErrorClass::NotFound,
        "Conflict" => ErrorClass::Conflict,
        "AlreadyExists" => ErrorClass::AlreadyExists,
        "BadRequest" => ErrorClass::BadRequest,
        "Invalid" => ErrorClass::Invalid,
        "UnsupportedMediaType" => ErrorClass::UnsupportedMediaType,
        _ => ErrorClass::Unknown,
    }
}

/// Tries to classify k8s error response, e.g. the one wrapped in `kube::Error::Api`
pub fn classify_response(response: &kube::core::ErrorResponse) -> ErrorClass {
    classify(&response.reason)
}

/// Errors returned by the fake store and the clients on top of it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{resource} \"{name}\" not found")]
    NotFound {
        resource: GroupVersionResource,
        name: String,
    },
    #[error("{resource} \"{name}\" already exists")]
    AlreadyExists {
        resource: GroupVersionResource,
        name: String,
    },
    /// Patch body does not have the shape its patch type requires.
    /// Message is surfaced as-is.
    #[error("{0}")]
    InvalidPatch(String),
    #[error("unsupported patch type: {0}")]
    UnsupportedPatchType(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error("no list kind is known for {0}")]
    UnknownListKind(GroupVersionResource),
    #[error("request cancelled")]
    Cancelled,
    /// Error injected by a reactor.
    #[error("{0}")]
    Reactor(String),
}

impl Error {
    pub(crate) fn not_found(resource: &GroupVersionResource, name: &str) -> Self {
        Error::NotFound {
            resource: resource.clone(),
            name: name.to_string(),
        }
    }

    pub(crate) fn already_exists(resource: &GroupVersionResource, name: &str) -> Self {
        Error::AlreadyExists {
            resource: resource.clone(),
            name: name.to_string(),
        }
    }

    /// Status reason the real API server would report for this error.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NotFound",
            Error::AlreadyExists { .. } => "AlreadyExists",
            Error::InvalidPatch(_) | Error::BadRequest(_) => "BadRequest",
            Error::Invalid(_) => "Invalid",
            Error::UnsupportedPatchType(_) => "UnsupportedMediaType",
            Error::UnknownListKind(_) | Error::Cancelled | Error::Reactor(_) => "Unknown",
        }
    }

    /// HTTP status code matching `reason()`
    pub fn code(&self) -> u16 {
        match self.class() {
            ErrorClass::NotFound => 404,
            ErrorClass::Conflict | ErrorClass::AlreadyExists => 409,
            ErrorClass::BadRequest => 400,
            ErrorClass::Invalid => 422,
            ErrorClass::UnsupportedMediaType => 415,
            ErrorClass::Unknown => 500,
        }
    }

    /// Renders the error the way the API server reports it
    pub fn to_response(&self) -> kube::core::ErrorResponse {
        kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: self.to_string(),
            reason: self.reason().to_string(),
            code: self.code(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        classify(self.reason())
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.class() == ErrorClass::AlreadyExists
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
