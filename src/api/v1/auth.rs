use std::{fmt, sync::Arc};

use argon2::Argon2;
use axum::{
    extract::{FromRef, FromRequestParts, State},
    headers::{authorization::Bearer, Authorization},
    http::request::Parts,
    Json, RequestPartsExt, TypedHeader,
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tap::TapFallible;

use crate::{
    error::{Error, UnauthorizedType},
    store::{Entity, Filter, Store},
    util::{hash_password, verify_password, FormattedDateTime, ObjectIdString},
};

use super::token::{decode_access_token, generate_access_token, JwtState};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Courier,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Courier => "COURIER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parcel category a courier is equipped to carry.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Specialty {
    Standard,
    Fragile,
    Refrigerated,
}

impl Specialty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Specialty::Standard => "STANDARD",
            Specialty::Fragile => "FRAGILE",
            Specialty::Refrigerated => "REFRIGERATED",
        }
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    Available,
    Busy,
    OffDuty,
}

/// Role plus the payload that only exists for that role.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Admin,
    Courier {
        specialty: Specialty,
        availability: Availability,
    },
}

impl ActorRole {
    /// Builds the role payload from loose request fields, rejecting
    /// combinations where the fields do not belong to the role.
    pub fn from_parts(
        role: Role,
        specialty: Option<Specialty>,
        availability: Option<Availability>,
    ) -> Result<Self, Error> {
        match role {
            Role::Admin => {
                if specialty.is_some() || availability.is_some() {
                    return Err(Error::business(
                        "ADMIN cannot have specialty or availability",
                    ));
                }
                Ok(ActorRole::Admin)
            }
            Role::Courier => {
                let specialty = specialty
                    .ok_or_else(|| Error::business("specialty is required for COURIER"))?;
                let availability = availability
                    .ok_or_else(|| Error::business("availability is required for COURIER"))?;

                Ok(ActorRole::Courier {
                    specialty,
                    availability,
                })
            }
        }
    }

    /// Applies a sparse update and re-checks the role invariant on the result.
    pub fn merged(
        &self,
        specialty: Option<Specialty>,
        availability: Option<Availability>,
    ) -> Result<Self, Error> {
        Self::from_parts(
            self.role(),
            specialty.or(self.specialty()),
            availability.or(self.availability()),
        )
    }

    pub fn role(&self) -> Role {
        match self {
            ActorRole::Admin => Role::Admin,
            ActorRole::Courier { .. } => Role::Courier,
        }
    }

    pub fn specialty(&self) -> Option<Specialty> {
        match self {
            ActorRole::Admin => None,
            ActorRole::Courier { specialty, .. } => Some(*specialty),
        }
    }

    pub fn availability(&self) -> Option<Availability> {
        match self {
            ActorRole::Admin => None,
            ActorRole::Courier { availability, .. } => Some(*availability),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActorModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub login: String,
    pub password: String,
    pub active: bool,

    #[serde(flatten)]
    pub role: ActorRole,

    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl ActorModel {
    pub fn is_admin(&self) -> bool {
        self.role.role() == Role::Admin
    }
}

impl Entity for ActorModel {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn unique_key(&self) -> Option<(&'static str, &str)> {
        Some(("login", &self.login))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActorFilter {
    pub login: Option<String>,
    pub role: Option<Role>,
    pub specialty: Option<Specialty>,
    pub active: Option<bool>,
}

impl ActorFilter {
    pub fn login(login: impl Into<String>) -> Self {
        Self {
            login: Some(login.into()),
            ..Default::default()
        }
    }

    pub fn active_login(login: impl Into<String>) -> Self {
        Self {
            login: Some(login.into()),
            active: Some(true),
            ..Default::default()
        }
    }
}

impl Filter<ActorModel> for ActorFilter {
    fn matches(&self, actor: &ActorModel) -> bool {
        self.login.as_ref().map_or(true, |it| *it == actor.login)
            && self.role.map_or(true, |it| it == actor.role.role())
            && self
                .specialty
                .map_or(true, |it| Some(it) == actor.role.specialty())
            && self.active.map_or(true, |it| it == actor.active)
    }

    fn to_document(&self) -> bson::Document {
        let mut doc = bson::Document::new();
        if let Some(login) = &self.login {
            doc.insert("login", login.as_str());
        }
        if let Some(role) = self.role {
            doc.insert("role", role.as_str());
        }
        if let Some(specialty) = self.specialty {
            doc.insert("specialty", specialty.as_str());
        }
        if let Some(active) = self.active {
            doc.insert("active", active);
        }
        doc
    }
}

#[derive(Clone)]
pub struct ActorCollection(pub Arc<dyn Store<ActorModel, ActorFilter>>);

impl std::ops::Deref for ActorCollection {
    type Target = dyn Store<ActorModel, ActorFilter>;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Outward view of an actor; never carries the credential hash.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Actor {
    pub id: ObjectIdString,
    pub login: String,
    pub active: bool,

    #[serde(flatten)]
    pub role: ActorRole,

    pub created_at: FormattedDateTime,
    pub updated_at: FormattedDateTime,
}

impl From<ActorModel> for Actor {
    fn from(value: ActorModel) -> Self {
        Self {
            id: value.id.into(),
            login: value.login,
            active: value.active,
            role: value.role,

            created_at: value.created_at.into(),
            updated_at: value.updated_at.into(),
        }
    }
}

/// Resolves a bearer token to an active actor.
///
/// Any defect in the token, or a subject that no longer maps to an active
/// actor, yields `None`; only store failures are reported as errors.
pub async fn resolve_identity(
    jwt_state: &JwtState,
    actors: &ActorCollection,
    token: Option<&str>,
) -> Result<Option<ActorModel>, Error> {
    let Some(token) = token else {
        return Ok(None);
    };

    let claims = match decode_access_token(jwt_state, token) {
        Ok(token) => token.claims,
        Err(err) => {
            tracing::debug!("rejected access token: {err}");
            return Ok(None);
        }
    };

    let actor = actors
        .find_one(&ActorFilter::active_login(&claims.sub))
        .await?;

    if actor.is_none() {
        tracing::debug!(login = %claims.sub, "token subject is unknown or inactive");
    }

    Ok(actor)
}

/// The identity of the current request, possibly anonymous. Resolved at most
/// once per request and cached in the request extensions.
#[derive(Debug, Clone)]
pub struct Identity(pub Option<ActorModel>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    JwtState: FromRef<S>,
    ActorCollection: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(identity.clone());
        }

        let bearer = parts
            .extract::<Option<TypedHeader<Authorization<Bearer>>>>()
            .await
            .ok()
            .flatten();

        let jwt = JwtState::from_ref(state);
        let actors = ActorCollection::from_ref(state);

        let actor = resolve_identity(
            &jwt,
            &actors,
            bearer.as_ref().map(|TypedHeader(Authorization(it))| it.token()),
        )
        .await?;

        let identity = Identity(actor);
        parts.extensions.insert(identity.clone());

        Ok(identity)
    }
}

/// An authenticated actor; anonymous requests are rejected.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub ActorModel);

impl std::ops::Deref for CurrentActor {
    type Target = ActorModel;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    JwtState: FromRef<S>,
    ActorCollection: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Identity(actor) = parts.extract_with_state::<Identity, _>(state).await?;

        actor
            .map(CurrentActor)
            .ok_or(Error::Unauthorized(UnauthorizedType::InvalidAccessToken))
            .tap_err(|_| tracing::debug!("anonymous request to protected resource"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginResponse {
    pub token: String,
    pub login: String,
    pub role: Role,
    pub expired_at: FormattedDateTime,
}

/// Checks `password` against the candidate's hash. Without a candidate the
/// password is hashed anyway, so a miss costs as much as a wrong password.
pub fn authenticate(
    argon: &Argon2,
    candidate: Option<ActorModel>,
    password: &str,
) -> Option<ActorModel> {
    match candidate {
        Some(actor) if verify_password(argon, password, &actor.password) => Some(actor),
        Some(_) => None,
        None => {
            let _ = hash_password(argon, password);
            None
        }
    }
}

/// Unknown login, wrong secret and deactivated account all fail the same way.
#[tracing::instrument(skip_all, fields(login = %request.login))]
pub async fn login(
    State(actors): State<ActorCollection>,
    State(jwt_state): State<JwtState>,
    State(argon): State<Argon2<'static>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Error> {
    let actor = actors
        .find_one(&ActorFilter::active_login(&request.login))
        .await?;

    let Some(actor) = authenticate(&argon, actor, &request.password) else {
        return Err(Error::Unauthorized(UnauthorizedType::WrongLoginOrPassword))
            .tap_err(|_| tracing::debug!("failed login attempt"));
    };

    let access_token = generate_access_token(&jwt_state, &actor)?;

    Ok(Json(LoginResponse {
        token: access_token.token,
        login: actor.login,
        role: actor.role.role(),
        expired_at: access_token.expired_at.into(),
    }))
}

pub async fn profile(CurrentActor(actor): CurrentActor) -> Json<Actor> {
    Json(actor.into())
}
