use argon2::Argon2;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use validator::Validate;

use crate::{
    error::Error,
    store::{Page, PageRequest, Store},
    util::{hash_password, now, parse_object_id},
};

use super::{
    auth::{
        Actor, ActorCollection, ActorFilter, ActorModel, ActorRole, Availability, CurrentActor,
        Role, Specialty,
    },
    scope::require_admin,
};

impl ActorCollection {
    pub async fn get(&self, id: ObjectId) -> Result<ActorModel, Error> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("actor"))
            .tap_err(|_| tracing::debug!("tried accessing non existing actor"))
    }

    /// Whether `login` is taken by anyone other than `except`.
    pub async fn login_taken(&self, login: &str, except: Option<ObjectId>) -> Result<bool, Error> {
        Ok(self
            .find_one(&ActorFilter::login(login))
            .await?
            .is_some_and(|it| Some(it.id) != except))
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct CreateActorRequest {
    #[validate(length(min = 1, max = 64))]
    pub login: String,

    #[validate(length(min = 1))]
    pub password: String,

    pub role: Role,
    pub specialty: Option<Specialty>,
    pub availability: Option<Availability>,
}

pub async fn create_actor(
    actors: &ActorCollection,
    argon: &Argon2<'_>,
    request: CreateActorRequest,
) -> Result<ActorModel, Error> {
    request.validate()?;

    if actors.login_taken(&request.login, None).await? {
        return Err(Error::MustUniqueError("login".to_string()))
            .tap_err(|_| tracing::debug!(login = %request.login, "login already exists"));
    }

    let role = ActorRole::from_parts(request.role, request.specialty, request.availability)?;

    let model = ActorModel {
        id: ObjectId::new(),
        password: hash_password(argon, &request.password)?,
        login: request.login,
        active: true,
        role,

        created_at: now(),
        updated_at: now(),
    };

    tracing::debug!(login = %model.login, role = %model.role.role(), "creating actor");
    actors.insert(&model).await?;

    Ok(model)
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct IndexQuery {
    pub page: Option<u64>,
    pub size: Option<u64>,
}

#[tracing::instrument(skip_all, fields(actor = %actor.login))]
pub async fn index(
    actor: CurrentActor,
    State(actors): State<ActorCollection>,
    Query(query): Query<IndexQuery>,
) -> Result<Json<Page<Actor>>, Error> {
    require_admin(&actor)?;

    let page = actors
        .find_page(
            &ActorFilter::default(),
            PageRequest::new(query.page, query.size),
        )
        .await?;

    Ok(Json(page.map(Into::into)))
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CouriersQuery {
    pub specialty: Option<Specialty>,
    pub page: Option<u64>,
    pub size: Option<u64>,
}

#[tracing::instrument(skip_all, fields(actor = %actor.login))]
pub async fn couriers(
    actor: CurrentActor,
    State(actors): State<ActorCollection>,
    Query(query): Query<CouriersQuery>,
) -> Result<Json<Page<Actor>>, Error> {
    require_admin(&actor)?;

    let filter = ActorFilter {
        role: Some(Role::Courier),
        specialty: query.specialty,
        ..Default::default()
    };

    let page = actors
        .find_page(&filter, PageRequest::new(query.page, query.size))
        .await?;

    Ok(Json(page.map(Into::into)))
}

#[tracing::instrument(skip_all, fields(actor = %actor.login, id = %actor_id))]
pub async fn show(
    actor: CurrentActor,
    State(actors): State<ActorCollection>,
    Path(actor_id): Path<String>,
) -> Result<Json<Actor>, Error> {
    require_admin(&actor)?;

    let target = actors.get(parse_object_id(&actor_id, "actor")?).await?;

    Ok(Json(target.into()))
}

#[tracing::instrument(skip_all, fields(actor = %actor.login))]
pub async fn create(
    actor: CurrentActor,
    State(actors): State<ActorCollection>,
    State(argon): State<Argon2<'static>>,
    Json(request): Json<CreateActorRequest>,
) -> Result<(StatusCode, Json<Actor>), Error> {
    require_admin(&actor)?;

    let model = create_actor(&actors, &argon, request).await?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateActorRequest {
    #[validate(length(min = 1, max = 64))]
    pub login: Option<String>,

    #[validate(length(min = 1))]
    pub password: Option<String>,

    pub active: Option<bool>,
    pub specialty: Option<Specialty>,
    pub availability: Option<Availability>,
}

#[tracing::instrument(skip_all, fields(actor = %actor.login, id = %actor_id))]
pub async fn update(
    actor: CurrentActor,
    State(actors): State<ActorCollection>,
    State(argon): State<Argon2<'static>>,
    Path(actor_id): Path<String>,
    Json(request): Json<UpdateActorRequest>,
) -> Result<Json<Actor>, Error> {
    require_admin(&actor)?;
    request.validate()?;

    let target = actors.get(parse_object_id(&actor_id, "actor")?).await?;

    if target.id == actor.id && request.active == Some(false) {
        return Err(Error::Forbidden).tap_err(|_| tracing::debug!("tried deactivating self"));
    }

    if let Some(login) = &request.login {
        if actors.login_taken(login, Some(target.id)).await? {
            return Err(Error::MustUniqueError("login".to_string()))
                .tap_err(|_| tracing::debug!(login = %login, "login already exists"));
        }
    }

    let target = ActorModel {
        role: target
            .role
            .merged(request.specialty, request.availability)?,
        password: request
            .password
            .map(|it| hash_password(&argon, &it))
            .unwrap_or(Ok(target.password))?,
        login: request.login.unwrap_or(target.login),
        active: request.active.unwrap_or(target.active),
        updated_at: now(),

        id: target.id,
        created_at: target.created_at,
    };

    tracing::debug!(login = %target.login, "updating actor");
    actors.replace(&target).await?;

    Ok(Json(target.into()))
}

async fn set_active(
    actor: &ActorModel,
    actors: &ActorCollection,
    actor_id: &str,
    active: bool,
) -> Result<Actor, Error> {
    require_admin(actor)?;

    let mut target = actors.get(parse_object_id(actor_id, "actor")?).await?;

    if !active && target.id == actor.id {
        return Err(Error::Forbidden).tap_err(|_| tracing::debug!("tried deactivating self"));
    }

    target.active = active;
    target.updated_at = now();
    actors.replace(&target).await?;

    Ok(target.into())
}

#[tracing::instrument(skip_all, fields(actor = %actor.login, id = %actor_id))]
pub async fn activate(
    actor: CurrentActor,
    State(actors): State<ActorCollection>,
    Path(actor_id): Path<String>,
) -> Result<Json<Actor>, Error> {
    set_active(&actor, &actors, &actor_id, true).await.map(Json)
}

#[tracing::instrument(skip_all, fields(actor = %actor.login, id = %actor_id))]
pub async fn deactivate(
    actor: CurrentActor,
    State(actors): State<ActorCollection>,
    Path(actor_id): Path<String>,
) -> Result<Json<Actor>, Error> {
    set_active(&actor, &actors, &actor_id, false).await.map(Json)
}

#[tracing::instrument(skip_all, fields(actor = %actor.login, id = %actor_id))]
pub async fn delete(
    actor: CurrentActor,
    State(actors): State<ActorCollection>,
    Path(actor_id): Path<String>,
) -> Result<StatusCode, Error> {
    require_admin(&actor)?;

    let actor_id = parse_object_id(&actor_id, "actor")?;

    if actor_id == actor.id {
        return Err(Error::Forbidden).tap_err(|_| tracing::debug!("tried deleting self"));
    }

    if !actors.delete_by_id(actor_id).await? {
        return Err(Error::not_found("actor"))
            .tap_err(|_| tracing::debug!("tried deleting non existing actor"));
    }

    Ok(StatusCode::NO_CONTENT)
}
