use bson::oid::ObjectId;
use tap::TapFallible;

use crate::error::Error;

use super::{
    auth::{ActorModel, ActorRole},
    parcel::{ParcelFilter, ParcelModel},
};

/// Which parcels an actor may see and act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Unrestricted,
    /// Only parcels assigned to this courier.
    Owned(ObjectId),
}

impl Scope {
    pub fn of(actor: &ActorModel) -> Self {
        match actor.role {
            ActorRole::Admin => Scope::Unrestricted,
            ActorRole::Courier { .. } => Scope::Owned(actor.id),
        }
    }

    /// Restricts a listing filter to what the actor may see. A courier id
    /// supplied by the caller is overridden.
    pub fn narrow(&self, filter: ParcelFilter) -> ParcelFilter {
        match self {
            Scope::Unrestricted => filter,
            Scope::Owned(courier_id) => ParcelFilter {
                courier_id: Some(*courier_id),
                ..filter
            },
        }
    }

    pub fn authorize(&self, parcel: &ParcelModel) -> Result<(), Error> {
        match self {
            Scope::Unrestricted => Ok(()),
            Scope::Owned(courier_id) if parcel.courier_id == Some(*courier_id) => Ok(()),
            Scope::Owned(_) => Err(Error::Forbidden),
        }
    }
}

pub fn require_admin(actor: &ActorModel) -> Result<(), Error> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(Error::Forbidden).tap_err(|_| tracing::debug!(login = %actor.login, "admin required"))
    }
}
