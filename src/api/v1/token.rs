use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{config::Config, error::Error};

use super::auth::{ActorModel, Role};

pub const ISSUER: &str = "colis-api";

/// Signing material and expiry horizon for access tokens. Built once at
/// start-up and never mutated.
#[derive(Clone)]
pub struct JwtState {
    validation: Validation,
    header: Header,
    expiration: Duration,

    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtState {
    pub fn new(secret: &[u8], expiration: Duration) -> Self {
        let header = Header::new(Algorithm::HS256);
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = 0;

        Self {
            header,
            validation,
            expiration,

            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.jwt_secret, config.jwt_expiration)
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }
}

pub fn current_timestamp() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AccessTokenClaims {
    /// Login of the actor the token was issued to.
    pub sub: String,
    pub role: Role,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessTokenClaims {
    pub fn is_expired(&self) -> bool {
        self.exp <= current_timestamp().unix_timestamp()
    }
}

pub struct GenerateAccessTokenResponse {
    pub expired_at: OffsetDateTime,
    pub token: String,
}

pub fn generate_access_token(
    jwt_state: &JwtState,
    actor: &ActorModel,
) -> Result<GenerateAccessTokenResponse, Error> {
    let expired_at = current_timestamp() + jwt_state.expiration;
    let token = generate_access_token_with_exp(jwt_state, actor, expired_at.unix_timestamp())?;

    Ok(GenerateAccessTokenResponse { expired_at, token })
}

pub fn generate_access_token_with_exp(
    jwt_state: &JwtState,
    actor: &ActorModel,
    exp: i64,
) -> Result<String, Error> {
    encode_claims(
        jwt_state,
        &AccessTokenClaims {
            sub: actor.login.clone(),
            role: actor.role.role(),
            iss: ISSUER.to_string(),
            iat: current_timestamp().unix_timestamp(),
            exp,
        },
    )
}

pub fn encode_claims(jwt_state: &JwtState, claims: &AccessTokenClaims) -> Result<String, Error> {
    jsonwebtoken::encode(&jwt_state.header, claims, &jwt_state.encoding_key).map_err(Into::into)
}

/// Checks signature, issuer and expiry.
pub fn decode_access_token(
    jwt_state: &JwtState,
    token: &str,
) -> Result<TokenData<AccessTokenClaims>, Error> {
    let token: TokenData<AccessTokenClaims> =
        jsonwebtoken::decode(token, &jwt_state.decoding_key, &jwt_state.validation)?;

    if token.claims.is_expired() {
        return Err(Error::JWTError(
            jsonwebtoken::errors::ErrorKind::ExpiredSignature.into(),
        ));
    }

    Ok(token)
}
