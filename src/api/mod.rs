use rocket::Route;

pub mod admin;
pub mod auth;
pub mod public;
pub mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(public::routes());
    routes.extend(auth::routes());
    routes.extend(voting::routes());
    routes
}

#[cfg(test)]
pub(crate) mod test_util {
    use rocket::http::Header;

    use crate::model::{
        auth::{Admin, AuthToken, Voter},
        MemberId,
    };
    use crate::Config;

    /// Bearer header for the example config's admin.
    pub fn admin_auth() -> Header<'static> {
        bearer(AuthToken::<Admin>::new(1).encode(&Config::example()).unwrap())
    }

    /// Bearer header for an ordinary member.
    pub fn voter_auth(member_id: MemberId) -> Header<'static> {
        bearer(
            AuthToken::<Voter>::new(member_id)
                .encode(&Config::example())
                .unwrap(),
        )
    }

    fn bearer(token: String) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {token}"))
    }
}
