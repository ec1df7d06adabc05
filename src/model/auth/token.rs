use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{
    errors::Error as JwtError, DecodingKey, EncodingKey, Header, TokenData, Validation,
};
use rocket::{
    http::Status,
    request::{self, FromRequest},
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::MemberId;
use crate::Config;

use super::rights::{Rights, Role};

/// Scheme prefix of the `Authorization` header.
const BEARER: &str = "Bearer ";

/// An authentication token for a chat user acting with specific rights.
///
/// As a request guard, `AuthToken<R>` only succeeds if the token permits role `R`.
#[derive(Serialize, Deserialize)]
pub struct AuthToken<R> {
    #[serde(rename = "sub")]
    member_id: MemberId,
    #[serde(rename = "rgt")]
    rights: Rights,
    #[serde(skip)]
    phantom: PhantomData<R>,
}

impl<R> AuthToken<R> {
    /// Get the chat user ID the token was issued to.
    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    /// Get the token's rights.
    pub fn rights(&self) -> Rights {
        self.rights
    }

    /// Does this token permit the given rights?
    pub fn permits(&self, target: Rights) -> bool {
        self.rights >= target
    }

    /// Sign this token, valid for the configured lifetime.
    pub fn encode(self, config: &Config) -> Result<String, JwtError> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
    }

    /// Verify and decode a signed token.
    pub fn decode(raw: &str, config: &Config) -> Result<Self, JwtError> {
        jsonwebtoken::decode(
            raw,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<R>>| claims.claims.token)
    }
}

impl<R> AuthToken<R>
where
    R: Role,
{
    /// Create a new token for `member_id` carrying role `R`'s rights.
    pub fn new(member_id: MemberId) -> Self {
        Self {
            member_id,
            rights: R::RIGHTS,
            phantom: PhantomData,
        }
    }
}

/// Token claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<R> {
    #[serde(flatten, bound = "")]
    token: AuthToken<R>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r, R> FromRequest<'r> for AuthToken<R>
where
    R: Role,
{
    type Error = Error;

    /// Get an `AuthToken` from the bearer header and check it carries enough rights.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let config = match req.guard::<&State<Config>>().await {
            request::Outcome::Success(config) => config,
            _ => {
                return request::Outcome::Error((
                    Status::InternalServerError,
                    Error::Unauthorized("authentication is not configured".to_string()),
                ))
            }
        };

        let raw = match req
            .headers()
            .get_one("Authorization")
            .and_then(|header| header.strip_prefix(BEARER))
        {
            Some(raw) => raw,
            None => {
                return request::Outcome::Error((
                    Status::Unauthorized,
                    Error::Unauthorized("missing bearer token".to_string()),
                ))
            }
        };

        let token = match Self::decode(raw, config) {
            Ok(token) => token,
            Err(err) => return request::Outcome::Error((Status::Unauthorized, err.into())),
        };

        if token.permits(R::RIGHTS) {
            request::Outcome::Success(token)
        } else {
            request::Outcome::Error((
                Status::Forbidden,
                Error::Unauthorized(format!("{} rights required", R::RIGHTS)),
            ))
        }
    }
}
