use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::{
    http::{Status, StatusClass},
    response::Responder,
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::logging::RequestId;
use crate::model::{MemberId, VoteId, VoteState};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid vote definition: {0}")]
    InvalidVoteDefinition(String),
    #[error("Vote {vote_id} is {state} and cannot {action}")]
    InvalidState {
        vote_id: VoteId,
        state: VoteState,
        action: &'static str,
    },
    #[error("Member {0} is not eligible to vote")]
    NotEligible(MemberId),
    #[error("Vote {vote_id} has no option `{option}`")]
    UnknownOption { vote_id: VoteId, option: String },
    #[error("Vote {0} has not closed yet")]
    NotClosed(VoteId),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn status(&self) -> Status {
        match self {
            Self::InvalidVoteDefinition(_) | Self::UnknownOption { .. } | Self::BadRequest(_) => {
                Status::BadRequest
            }
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::NotEligible(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
            Self::InvalidState { .. } | Self::NotClosed(_) => Status::Conflict,
            Self::Db(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
        }
    }
}

/// Body sent alongside every error status.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        let id = req.local_cache(RequestId::next);
        let error = if status.class() == StatusClass::ServerError {
            error!("req{id} failed: {self}");
            "Internal server error".to_string()
        } else {
            info!("req{id} rejected: {self}");
            self.to_string()
        };
        (status, Json(ErrorBody { error })).respond_to(req)
    }
}
