//! Placeholder accounts created on start-up so a fresh deployment can be
//! logged into. Operators are expected to rotate these credentials.

use tap::TapFallible;

use crate::{
    api::v1::{
        account::{create_actor, CreateActorRequest},
        auth::{Availability, Role, Specialty},
    },
    app::AppState,
    error::Error,
};

pub const ADMIN_LOGIN: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const COURIER_PASSWORD: &str = "courier123";

const COURIERS: [(&str, Specialty); 3] = [
    ("courier_standard", Specialty::Standard),
    ("courier_fragile", Specialty::Fragile),
    ("courier_refrigerated", Specialty::Refrigerated),
];

impl AppState {
    /// Creates the seed accounts whose login is still free. Running it again
    /// leaves existing accounts untouched.
    pub async fn seed(&self) -> Result<(), Error> {
        self.seed_actor(CreateActorRequest {
            login: ADMIN_LOGIN.to_string(),
            password: ADMIN_PASSWORD.to_string(),
            role: Role::Admin,
            specialty: None,
            availability: None,
        })
        .await?;

        for (login, specialty) in COURIERS {
            self.seed_actor(CreateActorRequest {
                login: login.to_string(),
                password: COURIER_PASSWORD.to_string(),
                role: Role::Courier,
                specialty: Some(specialty),
                availability: Some(Availability::Available),
            })
            .await?;
        }

        Ok(())
    }

    async fn seed_actor(&self, request: CreateActorRequest) -> Result<(), Error> {
        if self
            .actor_collection
            .login_taken(&request.login, None)
            .await?
        {
            return Ok(());
        }

        let actor = create_actor(&self.actor_collection, &self.argon, request)
            .await
            .tap_err(|err| tracing::error!("failed to seed actor: {err}"))?;

        tracing::warn!(
            login = %actor.login,
            role = %actor.role.role(),
            "created placeholder account with a default password, change it"
        );

        Ok(())
    }
}
