//! Storage-layer adapters built on top of the executor.

use async_trait::async_trait;

use crate::error::Result;

/// Persists entities of type `T`.
///
/// Implementations usually turn the entity into one statement and run it
/// through a [`StatementExecutor`](crate::query::StatementExecutor), choosing
/// the synchronous or fire-and-forget path depending on how much the caller
/// cares about the outcome.
#[async_trait]
pub trait Repository<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Stores `entity`.
    async fn persist(&self, entity: T) -> Result<()>;

    /// Stores every entity in order, stopping at the first failure.
    async fn persist_all(&self, entities: Vec<T>) -> Result<()> {
        for entity in entities {
            self.persist(entity).await?;
        }
        Ok(())
    }
}
