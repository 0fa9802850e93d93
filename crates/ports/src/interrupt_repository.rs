//! Interrupt Repository Port
//!
//! Interrupts are append-only audit records with one mutable control bit:
//! `seized`. `seize` is the at-most-once primitive, a compare-and-set of
//! seized false→true that tells the winner apart from every other racer.

use crate::error::PersistenceResult;
use async_trait::async_trait;
use ibai_core::{Interrupt, InterruptId, PlanExecutionId};

#[async_trait]
pub trait InterruptRepository: Send + Sync {
    async fn insert(&self, interrupt: &Interrupt) -> PersistenceResult<()>;

    async fn find(&self, id: &InterruptId) -> PersistenceResult<Option<Interrupt>>;

    async fn fetch(&self, id: &InterruptId) -> PersistenceResult<Interrupt>;

    /// Atomically flip `seized` false→true. Returns `true` only for the one
    /// caller that performed the flip; everyone else gets `false`.
    async fn seize(&self, id: &InterruptId) -> PersistenceResult<bool>;

    /// Versioned update, used to persist audit state after handling.
    async fn update(&self, interrupt: &Interrupt) -> PersistenceResult<Interrupt>;

    async fn find_by_plan_execution(
        &self,
        plan_execution_id: &PlanExecutionId,
    ) -> PersistenceResult<Vec<Interrupt>>;
}
