use std::ops::Deref;

use bson::oid::ObjectId;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::IndexModel;
use serde::{de::DeserializeOwned, Serialize};

use super::{Entity, Filter, Page, PageRequest, Store};
use crate::error::Error;

pub struct Collection<T>(pub mongodb::Collection<T>);

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Collection<T> {
    type Target = mongodb::Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> From<mongodb::Collection<T>> for Collection<T> {
    fn from(value: mongodb::Collection<T>) -> Self {
        Self(value)
    }
}

impl<T> Collection<T>
where
    T: Send + Sync,
{
    pub async fn ensure_unique_index(&self, field: &str) -> Result<(), Error> {
        let mut keys = bson::Document::new();
        keys.insert(field, 1);

        self.create_index(
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            None,
        )
        .await
        .map(|_| ())
        .map_err(Into::into)
    }
}

#[axum::async_trait]
impl<T, F> Store<T, F> for Collection<T>
where
    T: Entity + Serialize + DeserializeOwned + Unpin + 'static,
    F: Filter<T> + 'static,
{
    async fn find_by_id(&self, id: ObjectId) -> Result<Option<T>, Error> {
        self.0
            .find_one(bson::doc! { "_id": id }, None)
            .await
            .map_err(Into::into)
    }

    async fn find_one(&self, filter: &F) -> Result<Option<T>, Error> {
        self.0
            .find_one(filter.to_document(), None)
            .await
            .map_err(Into::into)
    }

    async fn find_page(&self, filter: &F, page: PageRequest) -> Result<Page<T>, Error> {
        let query = filter.to_document();
        let total = self.count_documents(query.clone(), None).await?;

        let options = FindOptions::builder()
            .sort(bson::doc! { "_id": 1 })
            .skip(page.offset())
            .limit(page.size as i64)
            .build();

        let mut cursor = self.find(query, options).await?;
        let mut content = vec![];

        while cursor.advance().await? {
            content.push(cursor.deserialize_current()?);
        }

        Ok(Page::new(content, page, total))
    }

    async fn insert(&self, item: &T) -> Result<(), Error> {
        self.insert_one(item, None)
            .await
            .map(|_| ())
            .map_err(|err| write_error(item, err))
    }

    async fn replace(&self, item: &T) -> Result<(), Error> {
        self.replace_one(bson::doc! { "_id": item.id() }, item, None)
            .await
            .map(|_| ())
            .map_err(|err| write_error(item, err))
    }

    async fn delete_by_id(&self, id: ObjectId) -> Result<bool, Error> {
        self.delete_one(bson::doc! { "_id": id }, None)
            .await
            .map(|it| it.deleted_count > 0)
            .map_err(Into::into)
    }
}

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(it)) if it.code == DUPLICATE_KEY
    )
}

/// Reports a unique index violation the same way the in-memory backend does.
fn write_error<T: Entity>(item: &T, err: mongodb::error::Error) -> Error {
    match item.unique_key() {
        Some((field, _)) if is_duplicate_key(&err) => {
            tracing::debug!("duplicate {field} rejected by unique index");
            Error::MustUniqueError(field.to_string())
        }
        _ => err.into(),
    }
}

/// Escapes `input` so MongoDB's `$regex` treats it literally.
pub fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
