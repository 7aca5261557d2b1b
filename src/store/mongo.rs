use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::UpdateOptions, Client, Collection};

use super::{GroupStore, StoreError};
use crate::schemas::{Expense, Group, Member};

/// Groups live in one document each, expenses embedded.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    database: String,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        Ok(MongoStore {
            client,
            database: database.into(),
        })
    }

    fn groups(&self) -> Collection<Group> {
        self.client.database(&self.database).collection("Groups")
    }

    fn members(&self) -> Collection<Member> {
        self.client.database(&self.database).collection("Members")
    }
}

#[async_trait]
impl GroupStore for MongoStore {
    async fn insert_member(&self, member: Member) -> Result<(), StoreError> {
        if self.find_member(&member.id).await?.is_some() {
            return Err(StoreError::Duplicate(member.id));
        }
        self.members().insert_one(member, None).await?;
        Ok(())
    }

    async fn find_member(&self, id: &str) -> Result<Option<Member>, StoreError> {
        Ok(self.members().find_one(doc! { "id": id }, None).await?)
    }

    async fn find_members(&self, ids: &[String]) -> Result<Vec<Member>, StoreError> {
        let cursor = self
            .members()
            .find(doc! { "id": { "$in": ids.to_vec() } }, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_group(&self, group: Group) -> Result<(), StoreError> {
        if self.find_group(&group.id).await?.is_some() {
            return Err(StoreError::Duplicate(group.id));
        }
        self.groups().insert_one(group, None).await?;
        Ok(())
    }

    async fn find_group(&self, id: &str) -> Result<Option<Group>, StoreError> {
        Ok(self.groups().find_one(doc! { "id": id }, None).await?)
    }

    async fn groups_of_member(&self, member: &str) -> Result<Vec<Group>, StoreError> {
        let cursor = self.groups().find(doc! { "members": member }, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn add_group_member(&self, group_id: &str, member: &str) -> Result<bool, StoreError> {
        let result = self
            .groups()
            .update_one(
                doc! { "id": group_id },
                doc! { "$addToSet": { "members": member } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn remove_group_member(&self, group_id: &str, member: &str) -> Result<bool, StoreError> {
        let result = self
            .groups()
            .update_one(
                doc! { "id": group_id },
                doc! { "$pull": { "members": member } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn push_expense(&self, group_id: &str, expense: &Expense) -> Result<bool, StoreError> {
        let result = self
            .groups()
            .update_one(
                doc! { "id": group_id },
                doc! { "$push": { "expenses": bson::to_bson(expense)? } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn mark_split_paid(
        &self,
        group_id: &str,
        expense_id: &str,
        member: &str,
    ) -> Result<bool, StoreError> {
        let options = UpdateOptions::builder()
            .array_filters(vec![
                doc! { "e.id": expense_id },
                doc! { "s.member": member },
            ])
            .build();
        let result = self
            .groups()
            .update_one(
                doc! { "id": group_id },
                doc! { "$set": { "expenses.$[e].splits.$[s].paid": true } },
                options,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_group(&self, id: &str) -> Result<bool, StoreError> {
        let result = self.groups().delete_one(doc! { "id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }
}
