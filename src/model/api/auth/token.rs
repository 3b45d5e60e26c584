use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, TokenData, Validation};
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::common::identity::{Identity, Role, SubjectId};

use super::member::Member;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// A verified authentication token issued by the external auth provider,
/// restricted to the roles admitted by `M`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthToken<M> {
    #[serde(rename = "sub")]
    pub subject: SubjectId,
    pub role: Role,
    #[serde(skip)]
    phantom: PhantomData<M>,
}

impl<M> AuthToken<M> {
    /// The identity this token vouches for.
    pub fn identity(&self) -> Identity {
        Identity {
            subject: self.subject.clone(),
            role: self.role,
        }
    }

    /// Verify and decode a signed token.
    pub fn decode(token: &str, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<M>>| claims.claims.token)?;
        Ok(token)
    }
}

/// Tokens are issued by the auth provider; tests sign their own.
#[cfg(test)]
impl<M> AuthToken<M> {
    pub fn new(identity: Identity) -> Self {
        Self {
            subject: identity.subject,
            role: identity.role,
            phantom: PhantomData,
        }
    }

    /// Sign this token, valid for `ttl`.
    pub fn encode(self, config: &Config, ttl: chrono::Duration) -> Result<String, Error> {
        use jsonwebtoken::{EncodingKey, Header};

        let claims = Claims {
            token: self,
            expire_at: Utc::now() + ttl,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;
        Ok(token)
    }
}

/// Token claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<M> {
    #[serde(flatten, bound = "")]
    token: AuthToken<M>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// The raw token, from the cookie or else an `Authorization: Bearer` header.
fn raw_token<'r>(req: &'r Request<'_>) -> Option<&'r str> {
    if let Some(cookie) = req.cookies().get(AUTH_TOKEN_COOKIE) {
        return Some(cookie.value());
    }
    req.headers()
        .get_one("Authorization")
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
}

#[rocket::async_trait]
impl<'r, M> FromRequest<'r> for AuthToken<M>
where
    M: Member + Send,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the request and check that its role is
    /// admitted by `M`. A missing or invalid token fails with 401, a valid
    /// token with the wrong role with 403.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(config) = req.rocket().state::<Config>() else {
            error!("Auth token requested but no config is managed");
            return Outcome::Failure((
                Status::InternalServerError,
                Error::Unauthenticated("Token verification unavailable".to_string()),
            ));
        };

        let Some(raw) = raw_token(req) else {
            return Outcome::Failure((
                Status::Unauthorized,
                Error::Unauthenticated("No auth token supplied".to_string()),
            ));
        };

        let token = match Self::decode(raw, config) {
            Ok(token) => token,
            Err(e) => {
                debug!("Rejected auth token: {e}");
                return Outcome::Failure((Status::Unauthorized, e));
            }
        };

        if !M::admits(token.role) {
            return Outcome::Failure((
                Status::Forbidden,
                Error::NotAuthorized(format!(
                    "{} is a {}, only {} may do this",
                    token.subject,
                    token.role,
                    M::DESCRIPTION
                )),
            ));
        }
        Outcome::Success(token)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use jsonwebtoken::{errors::ErrorKind, EncodingKey, Header};

    use super::*;

    use crate::model::api::auth::{AnyRole, Committee, Voter};

    #[test]
    fn token_survives_signing() {
        let config = Config::example();
        let raw = AuthToken::<AnyRole>::new(Identity::committee("officer"))
            .encode(&config, Duration::minutes(5))
            .unwrap();
        let token = AuthToken::<Committee>::decode(&raw, &config).unwrap();
        assert_eq!(token.identity(), Identity::committee("officer"));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let config = Config::example();
        let raw = AuthToken::<Voter>::new(Identity::voter("v1"))
            .encode(&config, Duration::minutes(-5))
            .unwrap();
        match AuthToken::<Voter>::decode(&raw, &config) {
            Err(Error::Jwt(e)) => assert_eq!(e.kind(), &ErrorKind::ExpiredSignature),
            other => panic!("expected expiry error, got {other:?}"),
        }
    }

    #[test]
    fn foreign_signatures_are_rejected() {
        let raw = AuthToken::<Voter>::new(Identity::voter("v1"))
            .encode(&Config::example(), Duration::minutes(5))
            .unwrap();
        let other = Config::with_secret("someone else's secret");
        let result = AuthToken::<Voter>::decode(&raw, &other);
        assert!(matches!(result, Err(Error::Jwt(_))));
    }

    #[test]
    fn malformed_claims_are_unauthenticated() {
        let config = Config::example();
        // Correctly signed, but without a role.
        let claims = rocket::serde::json::json!({
            "sub": "v1",
            "exp": (Utc::now() + Duration::minutes(5)).timestamp(),
        });
        let raw = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .unwrap();
        let err = AuthToken::<Voter>::decode(&raw, &config).unwrap_err();
        assert_eq!(err.status(), Status::Unauthorized);
        assert_eq!(err.kind(), "unauthenticated");
    }
}
