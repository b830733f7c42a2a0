//! One-shot lazy construction of admin clients.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use stratus_common::Result;
use stratus_pubsub::TopicAdmin;

type AdminInit = Box<dyn Fn() -> Result<Arc<dyn TopicAdmin>> + Send + Sync>;

/// Admin client constructed on first use, exactly once even under
/// contention.
pub(crate) struct LazyAdmin {
    role: &'static str,
    cell: OnceCell<Arc<dyn TopicAdmin>>,
    init: AdminInit,
}

impl LazyAdmin {
    pub(crate) fn new(role: &'static str, init: AdminInit) -> Self {
        Self {
            role,
            cell: OnceCell::new(),
            init,
        }
    }

    /// Wrap an already-constructed client.
    pub(crate) fn preset(role: &'static str, admin: Arc<dyn TopicAdmin>) -> Self {
        Self {
            role,
            cell: OnceCell::new_with(Some(admin)),
            init: Box::new(|| unreachable!("preset admin is always initialized")),
        }
    }

    pub(crate) async fn get(&self) -> Result<Arc<dyn TopicAdmin>> {
        let admin = self
            .cell
            .get_or_try_init(|| async {
                let admin = (self.init)()?;
                info!(
                    role = self.role,
                    implementation = admin.class_name(),
                    "Constructed admin client"
                );
                Ok(admin)
            })
            .await?;
        Ok(Arc::clone(admin))
    }

    /// The client, if anything has constructed it yet.
    pub(crate) fn get_if_initialized(&self) -> Option<Arc<dyn TopicAdmin>> {
        self.cell.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use stratus_pubsub::admin::MemoryTopicAdmin;

    #[tokio::test]
    async fn test_single_construction_under_contention() {
        let constructions = Arc::new(AtomicU32::new(0));
        let counter = constructions.clone();
        let lazy = Arc::new(LazyAdmin::new(
            "read-only",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MemoryTopicAdmin::new()) as Arc<dyn TopicAdmin>)
            }),
        ));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let lazy = lazy.clone();
            handles.push(tokio::spawn(async move { lazy.get().await.is_ok() }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_uninitialized_until_first_use() {
        let lazy = LazyAdmin::new(
            "write-only",
            Box::new(|| Ok(Arc::new(MemoryTopicAdmin::new()) as Arc<dyn TopicAdmin>)),
        );
        assert!(lazy.get_if_initialized().is_none());
        lazy.get().await.unwrap();
        assert!(lazy.get_if_initialized().is_some());
    }
}
