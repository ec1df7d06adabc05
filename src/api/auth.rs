use std::sync::Arc;

use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{
        auth::{Admin, AuthToken, Rights, Voter},
        MemberId,
    },
    store::Store,
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![issue_token]
}

/// The chat bot asking for a token on behalf of one of its users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub secret: String,
    pub member_id: MemberId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub rights: Rights,
}

#[post("/auth/token", data = "<request>", format = "json")]
pub async fn issue_token(
    request: Json<TokenRequest>,
    store: &State<Arc<dyn Store>>,
    config: &State<Config>,
) -> Result<Json<TokenResponse>> {
    if !config.is_api_secret(&request.secret) {
        warn!("Token requested for member {} with a bad secret", request.member_id);
        return Err(Error::Unauthorized("invalid API secret".to_string()));
    }

    let member_id = request.member_id;
    let flagged_admin = store
        .member(member_id)
        .await?
        .map_or(false, |member| member.is_admin);

    let response = if config.is_admin(member_id) || flagged_admin {
        TokenResponse {
            token: AuthToken::<Admin>::new(member_id).encode(config)?,
            rights: Rights::Admin,
        }
    } else {
        TokenResponse {
            token: AuthToken::<Voter>::new(member_id).encode(config)?,
            rights: Rights::Voter,
        }
    };
    debug!("Issued {} token for member {member_id}", response.rights);
    Ok(Json(response))
}
