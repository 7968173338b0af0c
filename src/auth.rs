use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;
use ulid::Ulid;

use crate::engine::Caller;

/// Shared cleartext password for every session. Identity comes from the user name.
#[derive(Debug)]
pub struct ParkshareAuthSource {
    password: String,
}

impl ParkshareAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for ParkshareAuthSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

/// Map a session user name to the engine caller: the admin name, or a member ULID.
pub fn resolve_caller(user: Option<&str>, admin_user: &str) -> Option<Caller> {
    let user = user?;
    if user == admin_user {
        return Some(Caller::Admin);
    }
    Ulid::from_string(user).ok().map(Caller::Member)
}
