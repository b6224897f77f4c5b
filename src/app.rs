use std::sync::Arc;

use argon2::Argon2;
use axum::{extract::FromRef, routing, Router};

use crate::{
    api::v1::{
        account,
        assignment,
        auth::{self, ActorCollection, ActorModel},
        parcel::{self, ParcelCollection, ParcelModel},
        token::JwtState,
    },
    config::{Config, StoreKind},
    error::Error,
    store::{Collection, MemoryStore},
};

#[derive(FromRef, Clone)]
pub struct AppState {
    pub argon: Argon2<'static>,
    pub jwt_state: JwtState,

    pub actor_collection: ActorCollection,
    pub parcel_collection: ParcelCollection,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Self, Error> {
        let jwt_state = JwtState::from_config(config);

        match &config.store {
            StoreKind::Mongo { uri, database } => {
                let mongo_client_opt = mongodb::options::ClientOptions::parse(uri).await?;
                let mongo_client = mongodb::Client::with_options(mongo_client_opt)?;
                let db = mongo_client.database(database);

                let actors: Collection<ActorModel> = db.collection("actors").into();
                actors.ensure_unique_index("login").await?;
                let parcels: Collection<ParcelModel> = db.collection("parcels").into();

                tracing::info!(database = %database, "using mongodb store");
                Ok(Self {
                    argon: Argon2::default(),
                    jwt_state,

                    actor_collection: ActorCollection(Arc::new(actors)),
                    parcel_collection: ParcelCollection(Arc::new(parcels)),
                })
            }
            StoreKind::Memory => {
                tracing::warn!("using in-memory store, data is lost on shutdown");
                Ok(Self::in_memory(jwt_state, Argon2::default()))
            }
        }
    }

    pub fn in_memory(jwt_state: JwtState, argon: Argon2<'static>) -> Self {
        Self {
            argon,
            jwt_state,

            actor_collection: ActorCollection(Arc::new(MemoryStore::<ActorModel>::new())),
            parcel_collection: ParcelCollection(Arc::new(MemoryStore::<ParcelModel>::new())),
        }
    }
}

pub fn router(app_state: AppState) -> Router {
    let api = Router::new().nest(
        "/v1",
        Router::new()
            .nest(
                "/auth",
                Router::new()
                    .route("/login", routing::post(auth::login))
                    .route("/profile", routing::get(auth::profile)),
            )
            .nest(
                "/admin",
                Router::new()
                    .route(
                        "/actors",
                        routing::get(account::index).post(account::create),
                    )
                    .route(
                        "/actors/:id",
                        routing::get(account::show)
                            .put(account::update)
                            .delete(account::delete),
                    )
                    .route("/actors/:id/activate", routing::put(account::activate))
                    .route("/actors/:id/deactivate", routing::put(account::deactivate))
                    .route("/couriers", routing::get(account::couriers)),
            )
            .nest(
                "/parcels",
                Router::new()
                    .route("/", routing::get(parcel::index).post(parcel::create))
                    .route("/search", routing::get(parcel::search))
                    .route(
                        "/:id",
                        routing::get(parcel::show)
                            .put(parcel::update)
                            .delete(parcel::delete),
                    )
                    .route("/:id/assign", routing::post(assignment::assign))
                    .route("/:id/status", routing::patch(parcel::update_status)),
            ),
    );

    Router::new()
        .nest("/api", api)
        .with_state(app_state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Argon2 with the cheapest parameters, so tests do not spend seconds hashing.
#[cfg(test)]
pub fn test_argon() -> Argon2<'static> {
    use argon2::{Algorithm, Params, Version};

    Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(Params::MIN_M_COST, 1, 1, None).unwrap(),
    )
}
