//! Repository boundary: a storage seam the kernel itself never calls into,
//! offered as test/demo glue for callers that want to persist plugin
//! descriptors or metadata outside the kernel's own state.
//!
//! Follows a plain storage-provider trait shape, reduced to an in-memory
//! map since the kernel proper has no persistence requirement of its own.

use crate::error::KernelError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type RepoResult<T> = Result<T, KernelError>;

/// Minimal identity a stored record must provide.
pub trait Identify {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

#[async_trait]
pub trait Repository<T: Identify + Clone + Send + Sync>: Send + Sync {
    async fn save(&self, item: T) -> RepoResult<()>;
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<T>>;
    async fn find_by_name(&self, name: &str) -> RepoResult<Option<T>>;
    async fn find_all(&self) -> RepoResult<Vec<T>>;
    async fn remove(&self, id: &str) -> RepoResult<bool>;
    async fn exists(&self, id: &str) -> RepoResult<bool>;
}

/// An in-memory `Repository`, keyed by id.
#[derive(Clone)]
pub struct InMemoryRepository<T> {
    items: Arc<Mutex<HashMap<String, T>>>,
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        InMemoryRepository {
            items: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<T: Identify + Clone + Send + Sync + 'static> Repository<T> for InMemoryRepository<T> {
    async fn save(&self, item: T) -> RepoResult<()> {
        self.items.lock().await.insert(item.id().to_string(), item);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> RepoResult<Option<T>> {
        Ok(self.items.lock().await.get(id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> RepoResult<Option<T>> {
        Ok(self.items.lock().await.values().find(|i| i.name() == name).cloned())
    }

    async fn find_all(&self) -> RepoResult<Vec<T>> {
        Ok(self.items.lock().await.values().cloned().collect())
    }

    async fn remove(&self, id: &str) -> RepoResult<bool> {
        Ok(self.items.lock().await.remove(id).is_some())
    }

    async fn exists(&self, id: &str) -> RepoResult<bool> {
        Ok(self.items.lock().await.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Record {
        id: String,
        name: String,
    }

    impl Identify for Record {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let repo = InMemoryRepository::<Record>::new();
        repo.save(Record { id: "math".to_string(), name: "Math Plugin".to_string() }).await.unwrap();
        assert!(repo.exists("math").await.unwrap());
        assert_eq!(repo.find_by_name("Math Plugin").await.unwrap().map(|r| r.id), Some("math".to_string()));
        assert!(repo.remove("math").await.unwrap());
        assert!(!repo.exists("math").await.unwrap());
    }
}
