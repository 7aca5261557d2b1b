//! Persistence collaborator.
//!
//! The split and settlement code never touches storage. Everything here hands
//! fully loaded `Group`s and `Member`s to the service layer. Writes touch only
//! the field they change, so concurrent writers to one group never overwrite
//! each other's expenses.

use async_trait::async_trait;
use thiserror::Error;

use crate::schemas::{Expense, Group, Member};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("could not encode document: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("duplicate key: {0}")]
    Duplicate(String),
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn insert_member(&self, member: Member) -> Result<(), StoreError>;

    async fn find_member(&self, id: &str) -> Result<Option<Member>, StoreError>;

    /// Members among `ids` that exist; unknown ids are skipped.
    async fn find_members(&self, ids: &[String]) -> Result<Vec<Member>, StoreError>;

    async fn insert_group(&self, group: Group) -> Result<(), StoreError>;

    async fn find_group(&self, id: &str) -> Result<Option<Group>, StoreError>;

    async fn groups_of_member(&self, member: &str) -> Result<Vec<Group>, StoreError>;

    /// Adds `member` unless it is already there. Returns false if the group
    /// does not exist.
    async fn add_group_member(&self, group_id: &str, member: &str) -> Result<bool, StoreError>;

    /// Returns false if the group does not exist.
    async fn remove_group_member(&self, group_id: &str, member: &str) -> Result<bool, StoreError>;

    /// Returns false if the group does not exist.
    async fn push_expense(&self, group_id: &str, expense: &Expense) -> Result<bool, StoreError>;

    /// Sets `paid` on `member`'s split of one expense. Returns false if the
    /// group does not exist.
    async fn mark_split_paid(
        &self,
        group_id: &str,
        expense_id: &str,
        member: &str,
    ) -> Result<bool, StoreError>;

    async fn delete_group(&self, id: &str) -> Result<bool, StoreError>;
}
