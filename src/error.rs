use jsonwebtoken::errors::Error as JwtError;
use rocket::{
    http::{Status, StatusClass},
    response::{self, status::Custom, Responder},
    serde::json::Json,
    Catcher, Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::logging::RequestId;
use crate::model::mongodb::Id;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a request can fail. Apart from [`Error::StoreUnavailable`],
/// all of these are permanent and must never be retried internally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Election {0} is not accepting votes")]
    ElectionNotOpen(Id),
    #[error("Candidate {candidate} is not standing in election {election}")]
    InvalidCandidate { election: Id, candidate: Id },
    #[error("You have already voted in election {0}")]
    AlreadyVoted(Id),
    #[error("Election store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

impl Error {
    /// Convenience constructor for a [`Error::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Only transient infrastructure failures may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NotAuthorized(_) => "not_authorized",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::ElectionNotOpen(_) => "election_not_open",
            Self::InvalidCandidate { .. } => "invalid_candidate",
            Self::AlreadyVoted(_) => "already_voted",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthenticated(_) | Self::Jwt(_) => "unauthenticated",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::NotFound,
            Self::NotAuthorized(_) => Status::Forbidden,
            Self::InvalidTransition(_) | Self::AlreadyVoted(_) => Status::Conflict,
            Self::ElectionNotOpen(_) | Self::InvalidCandidate { .. } => {
                Status::UnprocessableEntity
            }
            Self::StoreUnavailable(_) => Status::ServiceUnavailable,
            Self::BadRequest(_) => Status::BadRequest,
            // Any token that fails to decode proves nothing about the caller.
            Self::Unauthenticated(_) | Self::Jwt(_) => Status::Unauthorized,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => Self::BadRequest("Record already exists".to_string()),
            StoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    error: &'static str,
    message: String,
    /// Matches the `X-Request-Id` response header.
    request_id: usize,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let id = RequestId::of(req);
        if status.class() == StatusClass::ServerError {
            error!("{id}: {self}");
        } else {
            debug!("{id}: {self}");
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            request_id: id.0,
        };
        Custom(status, Json(body)).respond_to(req)
    }
}

/// Requests rejected before reaching a handler (failed guards, bad JSON,
/// unknown routes) get the same body shape as handler errors.
#[catch(default)]
fn json_catcher(status: Status, req: &Request) -> Custom<Json<ErrorBody>> {
    let error = match status.code {
        401 => "unauthenticated",
        403 => "not_authorized",
        404 => "not_found",
        400 | 422 => "bad_request",
        _ if status.class() == StatusClass::ServerError => "internal",
        _ => "http_error",
    };
    let body = ErrorBody {
        error,
        message: status.reason_lossy().to_string(),
        request_id: RequestId::of(req).0,
    };
    Custom(status, Json(body))
}

pub fn catchers() -> Vec<Catcher> {
    catchers![json_catcher]
}
