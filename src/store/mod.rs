//! Persistence seam shared by the actor directory and the parcel store.
//!
//! Everything above this module talks to a [`Store`] and describes what it
//! wants with a [`Filter`]; the backends decide how to evaluate it.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::Collection;

/// A record addressable by its store-assigned id.
pub trait Entity: Clone + Send + Sync {
    fn id(&self) -> ObjectId;

    /// Field name and value that no two records may share. Backends reject
    /// an insert or replace that would duplicate it.
    fn unique_key(&self) -> Option<(&'static str, &str)> {
        None
    }
}

/// A predicate over `T` that can be evaluated in process or pushed down to
/// MongoDB.
pub trait Filter<T>: Send + Sync {
    fn matches(&self, item: &T) -> bool;

    fn to_document(&self) -> bson::Document;
}

#[axum::async_trait]
pub trait Store<T, F>: Send + Sync
where
    T: Entity,
    F: Filter<T>,
{
    async fn find_by_id(&self, id: ObjectId) -> Result<Option<T>, Error>;

    async fn find_one(&self, filter: &F) -> Result<Option<T>, Error>;

    /// Insertion-ordered page of the records matching `filter`.
    async fn find_page(&self, filter: &F, page: PageRequest) -> Result<Page<T>, Error>;

    /// Fails with `MustUniqueError` when another record holds the same
    /// [`Entity::unique_key`].
    async fn insert(&self, item: &T) -> Result<(), Error>;

    /// Replaces the record with the same id. Replacing a record that was
    /// deleted in the meantime is a no-op. Uniqueness is enforced as for
    /// `insert`.
    async fn replace(&self, item: &T) -> Result<(), Error>;

    async fn delete_by_id(&self, id: ObjectId) -> Result<bool, Error>;
}

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub size: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: Option<u64>, size: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(0),
            size: size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.size)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages: total_elements.div_ceil(request.size.max(1)),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}
