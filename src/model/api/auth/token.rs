use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};

use super::user::{Rights, User};

const AUTHORIZATION: &str = "Authorization";
const BEARER_PREFIX: &str = "Bearer ";

/// An authentication token representing a specific caller with specific rights.
///
/// Tokens are issued by the external identity provider; this service only
/// verifies them against the shared secret.
#[derive(Serialize, Deserialize)]
pub struct AuthToken<U> {
    /// Caller identity.
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(rename = "rgt")]
    pub rights: Rights,
    #[serde(skip)]
    phantom: PhantomData<U>,
}

impl<U> AuthToken<U> {
    pub fn new(subject: impl Into<String>, rights: Rights) -> Self {
        Self {
            subject: subject.into(),
            rights,
            phantom: PhantomData,
        }
    }

    /// The identity this token speaks for.
    pub fn id(&self) -> &str {
        &self.subject
    }

    /// Sign this token into a compact JWT that expires after `ttl`.
    pub fn into_bearer(self, config: &Config, ttl: Duration) -> Result<String> {
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

    /// Verify and decode a compact JWT.
    pub fn from_bearer(token: &str, config: &Config) -> Result<Self> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.token_leeway();
        let token = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &validation,
        )
        .map(|claims: TokenData<Claims<U>>| claims.claims.token)?;
        Ok(token)
    }
}

impl<U> AuthToken<U>
where
    U: User,
{
    /// Does this token carry rights acceptable for `U`?
    pub fn permits(&self) -> bool {
        U::ACCEPTS.contains(&self.rights)
    }

    fn from_headers(req: &Request<'_>, config: &Config) -> Result<Self> {
        let header = req
            .headers()
            .get_one(AUTHORIZATION)
            .ok_or_else(|| Error::Unauthorized("missing bearer token".to_string()))?;
        let bearer = header.strip_prefix(BEARER_PREFIX).ok_or_else(|| {
            Error::Unauthorized("authorization header is not a bearer token".to_string())
        })?;
        let token = Self::from_bearer(bearer.trim(), config)
            .map_err(|e| Error::Unauthorized(format!("invalid bearer token: {e}")))?;
        if !token.permits() {
            return Err(Error::Unauthorized(format!(
                "{:?} token cannot access this resource",
                token.rights
            )));
        }
        Ok(token)
    }
}

/// Token claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<U> {
    #[serde(flatten, bound = "")]
    token: AuthToken<U>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// Why the last bearer token on this request was refused.
/// Left in the request-local cache for the 401 catcher.
#[derive(Debug, Clone, Default)]
pub struct AuthFailure(pub Option<String>);

#[rocket::async_trait]
impl<'r, U> FromRequest<'r> for AuthToken<U>
where
    U: User + Send,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the `Authorization` header and verify that it
    /// has acceptable rights for this user type.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => {
                return Outcome::Failure((
                    Status::InternalServerError,
                    Error::Internal("application config is not managed".to_string()),
                ))
            }
        };

        match Self::from_headers(req, config) {
            Ok(token) => Outcome::Success(token),
            Err(e) => {
                req.local_cache(|| AuthFailure(Some(e.to_string())));
                Outcome::Failure((Status::Unauthorized, e))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::api::auth::{Admin, AnyUser, Voter};

    #[test]
    fn bearer_round_trip() {
        let config = Config::example();
        let bearer = AuthToken::<Voter>::new("v1", Rights::Voter)
            .into_bearer(&config, Duration::minutes(5))
            .unwrap();
        let token = AuthToken::<Voter>::from_bearer(&bearer, &config).unwrap();
        assert_eq!(token.id(), "v1");
        assert_eq!(token.rights, Rights::Voter);
        assert!(token.permits());
    }

    #[test]
    fn expired_tokens_are_refused() {
        let config = Config::example();
        let bearer = AuthToken::<Voter>::new("v1", Rights::Voter)
            .into_bearer(&config, Duration::minutes(-5))
            .unwrap();
        assert!(matches!(
            AuthToken::<Voter>::from_bearer(&bearer, &config),
            Err(Error::Jwt(_))
        ));
    }

    #[test]
    fn foreign_signatures_are_refused() {
        let bearer = AuthToken::<Voter>::new("v1", Rights::Voter)
            .into_bearer(&Config::new("other secret", 0), Duration::minutes(5))
            .unwrap();
        assert!(AuthToken::<Voter>::from_bearer(&bearer, &Config::example()).is_err());
    }

    #[test]
    fn rights_gate_user_types() {
        assert!(!AuthToken::<Admin>::new("v1", Rights::Voter).permits());
        assert!(!AuthToken::<Voter>::new("a1", Rights::Admin).permits());
        assert!(AuthToken::<AnyUser>::new("v1", Rights::Voter).permits());
        assert!(AuthToken::<AnyUser>::new("a1", Rights::Admin).permits());
    }
}
