use std::{fmt, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tap::TapFallible;

use crate::{
    error::Error,
    store::{mongo::escape_regex, Entity, Filter, Page, PageRequest, Store},
    util::{now, parse_object_id, FormattedDateTime, ObjectIdString},
};

use super::{
    auth::CurrentActor,
    scope::{require_admin, Scope},
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Standard,
    Fragile,
    Refrigerated,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Standard => "STANDARD",
            Category::Fragile => "FRAGILE",
            Category::Refrigerated => "REFRIGERATED",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParcelStatus {
    #[default]
    Pending,
    Assigned,
    InTransit,
    Delivered,
    Cancelled,
}

impl ParcelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelStatus::Pending => "PENDING",
            ParcelStatus::Assigned => "ASSIGNED",
            ParcelStatus::InTransit => "IN_TRANSIT",
            ParcelStatus::Delivered => "DELIVERED",
            ParcelStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ParcelStatus::Delivered | ParcelStatus::Cancelled)
    }

    /// Statuses that only make sense once a courier carries the parcel.
    pub fn requires_courier(&self) -> bool {
        matches!(
            self,
            ParcelStatus::Assigned | ParcelStatus::InTransit | ParcelStatus::Delivered
        )
    }

    pub fn can_transition_to(&self, next: ParcelStatus) -> bool {
        use ParcelStatus::*;

        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (Pending, Assigned | InTransit | Cancelled) => true,
            (Assigned, InTransit | Cancelled) => true,
            (InTransit, Delivered | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParcelModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub category: Category,
    pub weight: f64,
    pub destination_address: String,
    pub status: ParcelStatus,
    pub courier_id: Option<ObjectId>,

    pub handling_instructions: Option<String>,
    pub temperature_min: Option<f64>,
    pub temperature_max: Option<f64>,

    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Entity for ParcelModel {
    fn id(&self) -> ObjectId {
        self.id
    }
}

impl ParcelModel {
    /// Checks the fields whose presence depends on the category, plus the
    /// unconditional ones.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.weight.is_finite() && self.weight > 0.0) {
            return Err(Error::business("weight must be positive"));
        }

        if self.destination_address.trim().is_empty() {
            return Err(Error::business("destination address is required"));
        }

        match self.category {
            Category::Standard => {}
            Category::Fragile => {
                let has_instructions = self
                    .handling_instructions
                    .as_deref()
                    .is_some_and(|it| !it.trim().is_empty());

                if !has_instructions {
                    return Err(Error::business(
                        "handling instructions are required for FRAGILE parcels",
                    ));
                }
            }
            Category::Refrigerated => {
                let (Some(min), Some(max)) = (self.temperature_min, self.temperature_max) else {
                    return Err(Error::business(
                        "temperature min and max are required for REFRIGERATED parcels",
                    ));
                };

                if !(min < max) {
                    return Err(Error::business(
                        "temperature min must be less than temperature max",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Drops the fields that only apply to other categories.
    pub fn retain_category_fields(&mut self) {
        if self.category != Category::Fragile {
            self.handling_instructions = None;
        }
        if self.category != Category::Refrigerated {
            self.temperature_min = None;
            self.temperature_max = None;
        }
    }

    /// Moves the parcel to `next`, enforcing the lifecycle.
    pub fn transition(&mut self, next: ParcelStatus) -> Result<(), Error> {
        if !self.status.can_transition_to(next) {
            return Err(Error::IllegalTransition {
                from: self.status,
                to: next,
            });
        }

        if next.requires_courier() && self.courier_id.is_none() {
            return Err(Error::business(format!(
                "parcel must be assigned to a courier before it can be {next}"
            )));
        }

        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParcelFilter {
    pub category: Option<Category>,
    pub status: Option<ParcelStatus>,
    pub courier_id: Option<ObjectId>,
    /// Case-insensitive substring of the destination address.
    pub address: Option<String>,
}

impl Filter<ParcelModel> for ParcelFilter {
    fn matches(&self, parcel: &ParcelModel) -> bool {
        self.category.map_or(true, |it| it == parcel.category)
            && self.status.map_or(true, |it| it == parcel.status)
            && self
                .courier_id
                .map_or(true, |it| Some(it) == parcel.courier_id)
            && self.address.as_ref().map_or(true, |it| {
                parcel
                    .destination_address
                    .to_lowercase()
                    .contains(&it.to_lowercase())
            })
    }

    fn to_document(&self) -> bson::Document {
        let mut doc = bson::Document::new();
        if let Some(category) = self.category {
            doc.insert("category", category.as_str());
        }
        if let Some(status) = self.status {
            doc.insert("status", status.as_str());
        }
        if let Some(courier_id) = self.courier_id {
            doc.insert("courier_id", courier_id);
        }
        if let Some(address) = &self.address {
            doc.insert(
                "destination_address",
                bson::doc! { "$regex": escape_regex(address), "$options": "i" },
            );
        }
        doc
    }
}

#[derive(Clone)]
pub struct ParcelCollection(pub Arc<dyn Store<ParcelModel, ParcelFilter>>);

impl std::ops::Deref for ParcelCollection {
    type Target = dyn Store<ParcelModel, ParcelFilter>;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl ParcelCollection {
    pub async fn get(&self, id: ObjectId) -> Result<ParcelModel, Error> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("parcel"))
            .tap_err(|_| tracing::debug!("tried accessing non existing parcel"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Parcel {
    pub id: ObjectIdString,
    pub category: Category,
    pub weight: f64,
    pub destination_address: String,
    pub status: ParcelStatus,
    pub courier_id: Option<ObjectIdString>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub handling_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_max: Option<f64>,

    pub created_at: FormattedDateTime,
    pub updated_at: FormattedDateTime,
}

impl From<ParcelModel> for Parcel {
    fn from(parcel: ParcelModel) -> Self {
        Self {
            id: parcel.id.into(),
            category: parcel.category,
            weight: parcel.weight,
            destination_address: parcel.destination_address,
            status: parcel.status,
            courier_id: parcel.courier_id.map(Into::into),

            handling_instructions: parcel.handling_instructions,
            temperature_min: parcel.temperature_min,
            temperature_max: parcel.temperature_max,

            created_at: parcel.created_at.into(),
            updated_at: parcel.updated_at.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct IndexQuery {
    pub category: Option<Category>,
    pub status: Option<ParcelStatus>,
    pub page: Option<u64>,
    pub size: Option<u64>,
}

#[tracing::instrument(skip_all, fields(actor = %actor.login))]
pub async fn index(
    actor: CurrentActor,
    State(parcels): State<ParcelCollection>,
    Query(query): Query<IndexQuery>,
) -> Result<Json<Page<Parcel>>, Error> {
    let filter = Scope::of(&actor).narrow(ParcelFilter {
        category: query.category,
        status: query.status,
        ..Default::default()
    });

    let page = parcels
        .find_page(&filter, PageRequest::new(query.page, query.size))
        .await?;

    Ok(Json(page.map(Into::into)))
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SearchQuery {
    pub address: String,
    pub page: Option<u64>,
    pub size: Option<u64>,
}

#[tracing::instrument(skip_all, fields(actor = %actor.login))]
pub async fn search(
    actor: CurrentActor,
    State(parcels): State<ParcelCollection>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Page<Parcel>>, Error> {
    let filter = Scope::of(&actor).narrow(ParcelFilter {
        address: Some(query.address),
        ..Default::default()
    });

    let page = parcels
        .find_page(&filter, PageRequest::new(query.page, query.size))
        .await?;

    Ok(Json(page.map(Into::into)))
}

#[tracing::instrument(skip_all, fields(actor = %actor.login, id = %parcel_id))]
pub async fn show(
    actor: CurrentActor,
    State(parcels): State<ParcelCollection>,
    Path(parcel_id): Path<String>,
) -> Result<Json<Parcel>, Error> {
    let parcel = parcels
        .get(parse_object_id(&parcel_id, "parcel")?)
        .await?;

    Scope::of(&actor).authorize(&parcel)?;

    Ok(Json(parcel.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateRequest {
    pub category: Category,
    pub weight: f64,
    pub destination_address: String,

    pub handling_instructions: Option<String>,
    pub temperature_min: Option<f64>,
    pub temperature_max: Option<f64>,
}

/// Validates and stores a new parcel. It always starts out pending and
/// unassigned.
pub async fn create_parcel(
    parcels: &ParcelCollection,
    request: CreateRequest,
) -> Result<ParcelModel, Error> {
    let mut model = ParcelModel {
        id: ObjectId::new(),
        category: request.category,
        weight: request.weight,
        destination_address: request.destination_address,
        status: ParcelStatus::Pending,
        courier_id: None,

        handling_instructions: request.handling_instructions,
        temperature_min: request.temperature_min,
        temperature_max: request.temperature_max,

        created_at: now(),
        updated_at: now(),
    };
    model.retain_category_fields();

    model
        .validate()
        .tap_err(|err| tracing::debug!("rejected parcel: {err}"))?;

    tracing::debug!("creating parcel {:#?}", model);
    parcels.insert(&model).await?;

    Ok(model)
}

#[tracing::instrument(skip_all, fields(actor = %actor.login))]
pub async fn create(
    actor: CurrentActor,
    State(parcels): State<ParcelCollection>,
    Json(request): Json<CreateRequest>,
) -> Result<(StatusCode, Json<Parcel>), Error> {
    require_admin(&actor).tap_err(|_| tracing::debug!("tried creating parcel as courier"))?;

    let model = create_parcel(&parcels, request).await?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateRequest {
    pub category: Option<Category>,
    pub weight: Option<f64>,
    pub destination_address: Option<String>,

    pub handling_instructions: Option<String>,
    pub temperature_min: Option<f64>,
    pub temperature_max: Option<f64>,
}

#[tracing::instrument(skip_all, fields(actor = %actor.login, id = %parcel_id))]
pub async fn update(
    actor: CurrentActor,
    State(parcels): State<ParcelCollection>,
    Path(parcel_id): Path<String>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<Parcel>, Error> {
    require_admin(&actor).tap_err(|_| tracing::debug!("tried updating parcel as courier"))?;

    let parcel = parcels
        .get(parse_object_id(&parcel_id, "parcel")?)
        .await?;

    let mut parcel = ParcelModel {
        category: request.category.unwrap_or(parcel.category),
        weight: request.weight.unwrap_or(parcel.weight),
        destination_address: request
            .destination_address
            .unwrap_or(parcel.destination_address),
        handling_instructions: request
            .handling_instructions
            .or(parcel.handling_instructions),
        temperature_min: request.temperature_min.or(parcel.temperature_min),
        temperature_max: request.temperature_max.or(parcel.temperature_max),
        updated_at: now(),

        id: parcel.id,
        status: parcel.status,
        courier_id: parcel.courier_id,
        created_at: parcel.created_at,
    };
    parcel.retain_category_fields();

    parcel
        .validate()
        .tap_err(|err| tracing::debug!("rejected parcel update: {err}"))?;

    tracing::debug!("updating parcel {:#?}", parcel);
    parcels.replace(&parcel).await?;

    Ok(Json(parcel.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateStatusRequest {
    pub status: ParcelStatus,
}

#[tracing::instrument(skip_all, fields(actor = %actor.login, id = %parcel_id))]
pub async fn update_status(
    actor: CurrentActor,
    State(parcels): State<ParcelCollection>,
    Path(parcel_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Parcel>, Error> {
    let mut parcel = parcels
        .get(parse_object_id(&parcel_id, "parcel")?)
        .await?;

    Scope::of(&actor)
        .authorize(&parcel)
        .tap_err(|_| tracing::debug!("tried updating status of other courier parcel"))?;

    parcel
        .transition(request.status)
        .tap_err(|err| tracing::debug!("rejected status change: {err}"))?;
    parcel.updated_at = now();

    parcels.replace(&parcel).await?;

    Ok(Json(parcel.into()))
}

#[tracing::instrument(skip_all, fields(actor = %actor.login, id = %parcel_id))]
pub async fn delete(
    actor: CurrentActor,
    State(parcels): State<ParcelCollection>,
    Path(parcel_id): Path<String>,
) -> Result<StatusCode, Error> {
    require_admin(&actor).tap_err(|_| tracing::debug!("tried deleting parcel as courier"))?;

    let parcel_id = parse_object_id(&parcel_id, "parcel")?;

    if !parcels.delete_by_id(parcel_id).await? {
        return Err(Error::not_found("parcel"))
            .tap_err(|_| tracing::debug!("tried deleting non existing parcel"));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::{
        extract::{Path, Query},
        Json,
    };
    use bson::oid::ObjectId;

    use super::*;
    use crate::{
        api::v1::{
            assignment::assign_parcel,
            auth::Specialty,
            tests::{bootstrap, Bootstrap},
        },
        error::Error,
    };

    fn standard(address: &str) -> CreateRequest {
        CreateRequest {
            category: Category::Standard,
            weight: 1.5,
            destination_address: address.to_string(),
            handling_instructions: None,
            temperature_min: None,
            temperature_max: None,
        }
    }

    fn fragile(instructions: Option<&str>) -> CreateRequest {
        CreateRequest {
            category: Category::Fragile,
            weight: 5.0,
            destination_address: "12 Glass Road".to_string(),
            handling_instructions: instructions.map(str::to_string),
            temperature_min: None,
            temperature_max: None,
        }
    }

    fn refrigerated(min: Option<f64>, max: Option<f64>) -> CreateRequest {
        CreateRequest {
            category: Category::Refrigerated,
            weight: 10.0,
            destination_address: "1 Main St".to_string(),
            handling_instructions: None,
            temperature_min: min,
            temperature_max: max,
        }
    }

    #[test]
    fn test_status_transitions() {
        use ParcelStatus::*;

        let all = [Pending, Assigned, InTransit, Delivered, Cancelled];
        let allowed = [
            (Pending, Assigned),
            (Pending, InTransit),
            (Pending, Cancelled),
            (Assigned, InTransit),
            (Assigned, Cancelled),
            (InTransit, Delivered),
            (InTransit, Cancelled),
        ];

        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }

        assert!(Delivered.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!InTransit.is_terminal());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(ParcelStatus::InTransit).unwrap(),
            serde_json::json!("IN_TRANSIT")
        );
        let status: ParcelStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(status, ParcelStatus::Cancelled);
    }

    #[test]
    fn test_address_filter_is_case_insensitive() {
        let parcel = ParcelModel {
            id: ObjectId::new(),
            category: Category::Standard,
            weight: 1.0,
            destination_address: "1 Main St, Springfield".to_string(),
            status: ParcelStatus::Pending,
            courier_id: None,
            handling_instructions: None,
            temperature_min: None,
            temperature_max: None,
            created_at: now(),
            updated_at: now(),
        };

        let filter = |address: &str| ParcelFilter {
            address: Some(address.to_string()),
            ..Default::default()
        };

        assert!(filter("main st").matches(&parcel));
        assert!(filter("SPRINGFIELD").matches(&parcel));
        assert!(!filter("Elm").matches(&parcel));
        assert_eq!(
            filter("a.b").to_document(),
            bson::doc! { "destination_address": { "$regex": "a\\.b", "$options": "i" } }
        );
    }

    #[tokio::test]
    async fn test_create_starts_pending_and_unassigned() {
        let bootstrap = bootstrap().await;

        let (status, Json(parcel)) = super::create(
            bootstrap.current_actor().await,
            bootstrap.parcel_collection(),
            Json(refrigerated(Some(2.0), Some(6.0))),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(parcel.status, ParcelStatus::Pending);
        assert_eq!(parcel.courier_id, None);
        assert_eq!(parcel.temperature_min, Some(2.0));

        let stored = bootstrap
            .app_state
            .parcel_collection
            .get(parcel.id.into())
            .await
            .unwrap();
        assert_eq!(parcel, Parcel::from(stored));
    }

    #[tokio::test]
    async fn test_fragile_requires_handling_instructions() {
        let bootstrap = bootstrap().await;

        for instructions in [None, Some(""), Some("   ")] {
            let err = super::create(
                bootstrap.current_actor().await,
                bootstrap.parcel_collection(),
                Json(fragile(instructions)),
            )
            .await
            .unwrap_err();
            assert_matches!(err, Error::BusinessRule(reason) if reason.contains("handling instructions"));
        }

        let (_, Json(parcel)) = super::create(
            bootstrap.current_actor().await,
            bootstrap.parcel_collection(),
            Json(fragile(Some("this side up"))),
        )
        .await
        .unwrap();
        assert_eq!(parcel.category, Category::Fragile);
    }

    #[tokio::test]
    async fn test_refrigerated_requires_ordered_temperatures() {
        let bootstrap = bootstrap().await;

        for (min, max) in [
            (None, None),
            (Some(2.0), None),
            (None, Some(6.0)),
            (Some(6.0), Some(6.0)),
            (Some(8.0), Some(2.0)),
            (Some(f64::NAN), Some(2.0)),
        ] {
            let err = super::create(
                bootstrap.current_actor().await,
                bootstrap.parcel_collection(),
                Json(refrigerated(min, max)),
            )
            .await
            .unwrap_err();
            assert_matches!(err, Error::BusinessRule(_));
        }

        super::create(
            bootstrap.current_actor().await,
            bootstrap.parcel_collection(),
            Json(refrigerated(Some(-18.0), Some(-15.5))),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_weight_and_address_are_checked() {
        let bootstrap = bootstrap().await;

        for weight in [0.0, -1.0, f64::INFINITY] {
            let err = super::create(
                bootstrap.current_actor().await,
                bootstrap.parcel_collection(),
                Json(CreateRequest {
                    weight,
                    ..standard("somewhere")
                }),
            )
            .await
            .unwrap_err();
            assert_matches!(err, Error::BusinessRule(reason) if reason.contains("weight"));
        }

        let err = super::create(
            bootstrap.current_actor().await,
            bootstrap.parcel_collection(),
            Json(standard(" ")),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::BusinessRule(reason) if reason.contains("address"));
    }

    #[tokio::test]
    async fn test_courier_cannot_manage_parcels() {
        let bootstrap = bootstrap().await;
        let parcel = create_parcel(&bootstrap.app_state.parcel_collection, standard("a"))
            .await
            .unwrap();
        let courier = bootstrap.courier("courier", Specialty::Standard).await;

        let err = super::create(
            courier.current_actor().await,
            courier.parcel_collection(),
            Json(standard("b")),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Forbidden);

        let err = super::update(
            courier.current_actor().await,
            courier.parcel_collection(),
            Path(parcel.id.to_string()),
            Json(UpdateRequest::default()),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Forbidden);

        let err = super::delete(
            courier.current_actor().await,
            courier.parcel_collection(),
            Path(parcel.id.to_string()),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Forbidden);
    }

    #[tokio::test]
    async fn test_update_is_sparse() {
        let bootstrap = bootstrap().await;
        let parcel = create_parcel(
            &bootstrap.app_state.parcel_collection,
            fragile(Some("keep upright")),
        )
        .await
        .unwrap();

        let Json(updated) = super::update(
            bootstrap.current_actor().await,
            bootstrap.parcel_collection(),
            Path(parcel.id.to_string()),
            Json(UpdateRequest {
                weight: Some(7.25),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        assert_eq!(updated.weight, 7.25);
        assert_eq!(updated.category, Category::Fragile);
        assert_eq!(updated.destination_address, "12 Glass Road");
        assert_eq!(updated.handling_instructions.as_deref(), Some("keep upright"));
        assert_eq!(updated.status, ParcelStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_revalidates_merged_parcel() {
        let bootstrap = bootstrap().await;
        let parcel = create_parcel(&bootstrap.app_state.parcel_collection, standard("a"))
            .await
            .unwrap();

        let err = super::update(
            bootstrap.current_actor().await,
            bootstrap.parcel_collection(),
            Path(parcel.id.to_string()),
            Json(UpdateRequest {
                category: Some(Category::Refrigerated),
                temperature_min: Some(4.0),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::BusinessRule(_));

        let unchanged = bootstrap
            .app_state
            .parcel_collection
            .get(parcel.id)
            .await
            .unwrap();
        assert_eq!(unchanged.category, Category::Standard);

        let Json(updated) = super::update(
            bootstrap.current_actor().await,
            bootstrap.parcel_collection(),
            Path(parcel.id.to_string()),
            Json(UpdateRequest {
                category: Some(Category::Refrigerated),
                temperature_min: Some(4.0),
                temperature_max: Some(8.0),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.category, Category::Refrigerated);
    }

    #[tokio::test]
    async fn test_delete() {
        let bootstrap = bootstrap().await;
        let parcel = create_parcel(&bootstrap.app_state.parcel_collection, standard("a"))
            .await
            .unwrap();

        let status = super::delete(
            bootstrap.current_actor().await,
            bootstrap.parcel_collection(),
            Path(parcel.id.to_string()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = super::show(
            bootstrap.current_actor().await,
            bootstrap.parcel_collection(),
            Path(parcel.id.to_string()),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::NotFound(_));
    }

    #[tokio::test]
    async fn test_non_existing_parcel() {
        let bootstrap = bootstrap().await;

        for id in [ObjectId::new().to_string(), "not-an-id".to_string()] {
            let err = super::show(
                bootstrap.current_actor().await,
                bootstrap.parcel_collection(),
                Path(id.clone()),
            )
            .await
            .unwrap_err();
            assert_matches!(err, Error::NotFound(_));

            let err = super::update(
                bootstrap.current_actor().await,
                bootstrap.parcel_collection(),
                Path(id.clone()),
                Json(UpdateRequest::default()),
            )
            .await
            .unwrap_err();
            assert_matches!(err, Error::NotFound(_));

            let err = super::update_status(
                bootstrap.current_actor().await,
                bootstrap.parcel_collection(),
                Path(id.clone()),
                Json(UpdateStatusRequest {
                    status: ParcelStatus::Cancelled,
                }),
            )
            .await
            .unwrap_err();
            assert_matches!(err, Error::NotFound(_));

            let err = super::delete(
                bootstrap.current_actor().await,
                bootstrap.parcel_collection(),
                Path(id),
            )
            .await
            .unwrap_err();
            assert_matches!(err, Error::NotFound(_));
        }
    }

    async fn list(bootstrap: &Bootstrap, query: IndexQuery) -> Page<Parcel> {
        super::index(
            bootstrap.current_actor().await,
            bootstrap.parcel_collection(),
            Query(query),
        )
        .await
        .unwrap()
        .0
    }

    #[tokio::test]
    async fn test_admin_lists_with_filters() {
        let bootstrap = bootstrap().await;
        let parcels = &bootstrap.app_state.parcel_collection;

        create_parcel(parcels, standard("a")).await.unwrap();
        create_parcel(parcels, standard("b")).await.unwrap();
        create_parcel(parcels, fragile(Some("careful"))).await.unwrap();
        let mut cancelled = create_parcel(parcels, fragile(Some("careful"))).await.unwrap();
        cancelled.transition(ParcelStatus::Cancelled).unwrap();
        parcels.replace(&cancelled).await.unwrap();

        assert_eq!(list(&bootstrap, IndexQuery::default()).await.total_elements, 4);
        assert_eq!(
            list(&bootstrap, IndexQuery {
                category: Some(Category::Fragile),
                ..Default::default()
            })
            .await
            .total_elements,
            2
        );
        assert_eq!(
            list(&bootstrap, IndexQuery {
                status: Some(ParcelStatus::Pending),
                ..Default::default()
            })
            .await
            .total_elements,
            3
        );

        let page = list(&bootstrap, IndexQuery {
            category: Some(Category::Fragile),
            status: Some(ParcelStatus::Cancelled),
            ..Default::default()
        })
        .await;
        assert_eq!(page.total_elements, 1);
        assert_eq!(page.content[0].id, cancelled.id);

        let page = list(&bootstrap, IndexQuery {
            page: Some(1),
            size: Some(3),
            ..Default::default()
        })
        .await;
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.total_pages, 2);
    }

    #[tokio::test]
    async fn test_admin_search_by_address() {
        let bootstrap = bootstrap().await;
        let parcels = &bootstrap.app_state.parcel_collection;

        create_parcel(parcels, standard("1 Main St")).await.unwrap();
        create_parcel(parcels, standard("22 MAIN street")).await.unwrap();
        create_parcel(parcels, standard("3 Elm Road")).await.unwrap();

        let Json(page) = super::search(
            bootstrap.current_actor().await,
            bootstrap.parcel_collection(),
            Query(SearchQuery {
                address: "main".to_string(),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        assert_eq!(page.total_elements, 2);
    }

    #[tokio::test]
    async fn test_category_change_drops_stale_fields() {
        let bootstrap = bootstrap().await;
        let parcel = create_parcel(
            &bootstrap.app_state.parcel_collection,
            refrigerated(Some(2.0), Some(6.0)),
        )
        .await
        .unwrap();

        let Json(updated) = super::update(
            bootstrap.current_actor().await,
            bootstrap.parcel_collection(),
            Path(parcel.id.to_string()),
            Json(UpdateRequest {
                category: Some(Category::Standard),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        assert_eq!(updated.category, Category::Standard);
        assert_eq!(updated.temperature_min, None);
        assert_eq!(updated.temperature_max, None);

        let json = serde_json::to_value(&updated).unwrap();
        assert!(json.get("temperature_min").is_none());

        let stored = bootstrap
            .app_state
            .parcel_collection
            .get(parcel.id)
            .await
            .unwrap();
        assert_eq!(stored.temperature_min, None);

        let created = create_parcel(
            &bootstrap.app_state.parcel_collection,
            CreateRequest {
                handling_instructions: Some("ignored".to_string()),
                temperature_min: Some(1.0),
                ..standard("a")
            },
        )
        .await
        .unwrap();
        assert_eq!(created.handling_instructions, None);
        assert_eq!(created.temperature_min, None);
    }

    #[tokio::test]
    async fn test_courier_only_reaches_own_parcels() {
        let bootstrap = bootstrap().await;
        let parcels = &bootstrap.app_state.parcel_collection;
        let actors = &bootstrap.app_state.actor_collection;
        let first = bootstrap.courier("first", Specialty::Standard).await;
        let second = bootstrap.courier("second", Specialty::Standard).await;

        let own = create_parcel(parcels, standard("1 Main St")).await.unwrap();
        let mut in_transit = create_parcel(parcels, standard("2 Main St")).await.unwrap();
        let other = create_parcel(parcels, standard("3 Main St")).await.unwrap();
        let unassigned = create_parcel(parcels, standard("4 Main St")).await.unwrap();

        assign_parcel(parcels, actors, own.id, first.actor_id())
            .await
            .unwrap();
        in_transit = assign_parcel(parcels, actors, in_transit.id, first.actor_id())
            .await
            .unwrap();
        in_transit.transition(ParcelStatus::InTransit).unwrap();
        parcels.replace(&in_transit).await.unwrap();
        assign_parcel(parcels, actors, other.id, second.actor_id())
            .await
            .unwrap();

        let owned_by = |page: &Page<Parcel>, courier: ObjectId| {
            page.content
                .iter()
                .all(|it| it.courier_id.map(ObjectId::from) == Some(courier))
        };

        let page = list(&first, IndexQuery::default()).await;
        assert_eq!(page.total_elements, 2);
        assert!(owned_by(&page, first.actor_id()));

        let page = list(
            &first,
            IndexQuery {
                category: Some(Category::Standard),
                status: Some(ParcelStatus::Pending),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(page.total_elements, 1);
        assert_eq!(page.content[0].id, own.id);

        let page = list(&second, IndexQuery::default()).await;
        assert_eq!(page.total_elements, 1);
        assert_eq!(page.content[0].id, other.id);

        let page = list(
            &second,
            IndexQuery {
                status: Some(ParcelStatus::InTransit),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(page.total_elements, 0);

        for (courier, expected) in [(&first, 2), (&second, 1)] {
            let Json(page) = super::search(
                courier.current_actor().await,
                courier.parcel_collection(),
                Query(SearchQuery {
                    address: "main st".to_string(),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
            assert_eq!(page.total_elements, expected);
            assert!(owned_by(&page, courier.actor_id()));
        }

        let Json(parcel) = super::show(
            first.current_actor().await,
            first.parcel_collection(),
            Path(own.id.to_string()),
        )
        .await
        .unwrap();
        assert_eq!(parcel.id, own.id);

        for id in [other.id, unassigned.id] {
            let err = super::show(
                first.current_actor().await,
                first.parcel_collection(),
                Path(id.to_string()),
            )
            .await
            .unwrap_err();
            assert_matches!(err, Error::Forbidden);
        }

        let err = super::update_status(
            first.current_actor().await,
            first.parcel_collection(),
            Path(unassigned.id.to_string()),
            Json(UpdateStatusRequest {
                status: ParcelStatus::Cancelled,
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Forbidden);
    }

    #[test]
    fn test_terminal_status_is_final() {
        use ParcelStatus::*;

        for from in [Delivered, Cancelled] {
            for to in [Pending, Assigned, InTransit, Delivered, Cancelled] {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }
}
