use axum::{
    extract::{Path, State},
    Json,
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tap::TapFallible;

use crate::{
    error::Error,
    store::Store,
    util::{now, parse_object_id},
};

use super::{
    auth::{ActorCollection, ActorRole, CurrentActor, Specialty},
    parcel::{Category, Parcel, ParcelCollection, ParcelModel},
    scope::require_admin,
};

/// The courier specialty able to carry a parcel category.
impl From<Category> for Specialty {
    fn from(category: Category) -> Self {
        match category {
            Category::Standard => Specialty::Standard,
            Category::Fragile => Specialty::Fragile,
            Category::Refrigerated => Specialty::Refrigerated,
        }
    }
}

/// Binds a parcel to a courier whose specialty matches its category. An
/// existing assignment is overwritten and the status is left as is.
#[tracing::instrument(skip(parcels, actors))]
pub async fn assign_parcel(
    parcels: &ParcelCollection,
    actors: &ActorCollection,
    parcel_id: ObjectId,
    courier_id: ObjectId,
) -> Result<ParcelModel, Error> {
    let mut parcel = parcels.get(parcel_id).await?;

    let courier = actors
        .find_by_id(courier_id)
        .await?
        .ok_or_else(|| Error::not_found("courier"))
        .tap_err(|_| tracing::debug!("tried assigning to non existing actor"))?;

    let ActorRole::Courier { specialty, .. } = courier.role else {
        return Err(Error::business(format!(
            "actor {} is not a COURIER",
            courier.login
        )))
        .tap_err(|_| tracing::debug!("tried assigning to non courier"));
    };

    let required = Specialty::from(parcel.category);
    if specialty != required {
        return Err(Error::business(format!(
            "courier specialty {specialty} does not match required specialty {required} for {} parcel",
            parcel.category
        )))
        .tap_err(|_| tracing::debug!("specialty mismatch"));
    }

    parcel.courier_id = Some(courier.id);
    parcel.updated_at = now();

    tracing::debug!(courier = %courier.login, "assigning parcel");
    parcels.replace(&parcel).await?;

    Ok(parcel)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssignRequest {
    pub courier_id: String,
}

#[tracing::instrument(skip_all, fields(actor = %actor.login, id = %parcel_id))]
pub async fn assign(
    actor: CurrentActor,
    State(parcels): State<ParcelCollection>,
    State(actors): State<ActorCollection>,
    Path(parcel_id): Path<String>,
    Json(request): Json<AssignRequest>,
) -> Result<Json<Parcel>, Error> {
    require_admin(&actor).tap_err(|_| tracing::debug!("tried assigning parcel as courier"))?;

    let parcel = assign_parcel(
        &parcels,
        &actors,
        parse_object_id(&parcel_id, "parcel")?,
        parse_object_id(&request.courier_id, "courier")?,
    )
    .await?;

    Ok(Json(parcel.into()))
}
