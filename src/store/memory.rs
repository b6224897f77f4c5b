use bson::oid::ObjectId;
use tokio::sync::RwLock;

use super::{Entity, Filter, Page, PageRequest, Store};
use crate::error::Error;

/// Insertion-ordered in-process store.
pub struct MemoryStore<T> {
    items: RwLock<Vec<T>>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Rejects `item` when a different record already holds its unique key.
/// Must be called with the write lock held.
fn check_unique<T: Entity>(items: &[T], item: &T) -> Result<(), Error> {
    let Some((field, value)) = item.unique_key() else {
        return Ok(());
    };

    let taken = items.iter().any(|it| {
        it.id() != item.id() && it.unique_key().is_some_and(|(_, other)| other == value)
    });

    if taken {
        return Err(Error::MustUniqueError(field.to_string()));
    }

    Ok(())
}

#[axum::async_trait]
impl<T, F> Store<T, F> for MemoryStore<T>
where
    T: Entity + 'static,
    F: Filter<T> + 'static,
{
    async fn find_by_id(&self, id: ObjectId) -> Result<Option<T>, Error> {
        let items = self.items.read().await;
        Ok(items.iter().find(|it| it.id() == id).cloned())
    }

    async fn find_one(&self, filter: &F) -> Result<Option<T>, Error> {
        let items = self.items.read().await;
        Ok(items.iter().find(|it| filter.matches(it)).cloned())
    }

    async fn find_page(&self, filter: &F, page: PageRequest) -> Result<Page<T>, Error> {
        let items = self.items.read().await;
        let matching: Vec<&T> = items.iter().filter(|it| filter.matches(it)).collect();
        let total = matching.len() as u64;

        let content = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .cloned()
            .collect();

        Ok(Page::new(content, page, total))
    }

    async fn insert(&self, item: &T) -> Result<(), Error> {
        let mut items = self.items.write().await;
        check_unique(&items, item)?;
        items.push(item.clone());
        Ok(())
    }

    async fn replace(&self, item: &T) -> Result<(), Error> {
        let mut items = self.items.write().await;
        check_unique(&items, item)?;
        if let Some(slot) = items.iter_mut().find(|it| it.id() == item.id()) {
            *slot = item.clone();
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: ObjectId) -> Result<bool, Error> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|it| it.id() != id);
        Ok(items.len() != before)
    }
}
