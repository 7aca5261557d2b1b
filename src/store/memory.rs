use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{GroupStore, StoreError};
use crate::schemas::{Expense, Group, Member};

/// Process-local store, for tests and running without a database.
#[derive(Default)]
pub struct MemoryStore {
    members: RwLock<BTreeMap<String, Member>>,
    groups: RwLock<BTreeMap<String, Group>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn insert_member(&self, member: Member) -> Result<(), StoreError> {
        let mut members = self.members.write();
        if members.contains_key(&member.id) {
            return Err(StoreError::Duplicate(member.id));
        }
        members.insert(member.id.clone(), member);
        Ok(())
    }

    async fn find_member(&self, id: &str) -> Result<Option<Member>, StoreError> {
        Ok(self.members.read().get(id).cloned())
    }

    async fn find_members(&self, ids: &[String]) -> Result<Vec<Member>, StoreError> {
        let members = self.members.read();
        Ok(ids.iter().filter_map(|id| members.get(id).cloned()).collect())
    }

    async fn insert_group(&self, group: Group) -> Result<(), StoreError> {
        let mut groups = self.groups.write();
        if groups.contains_key(&group.id) {
            return Err(StoreError::Duplicate(group.id));
        }
        groups.insert(group.id.clone(), group);
        Ok(())
    }

    async fn find_group(&self, id: &str) -> Result<Option<Group>, StoreError> {
        Ok(self.groups.read().get(id).cloned())
    }

    async fn groups_of_member(&self, member: &str) -> Result<Vec<Group>, StoreError> {
        Ok(self
            .groups
            .read()
            .values()
            .filter(|g| g.is_member(member))
            .cloned()
            .collect())
    }

    async fn add_group_member(&self, group_id: &str, member: &str) -> Result<bool, StoreError> {
        match self.groups.write().get_mut(group_id) {
            Some(group) => {
                group.add_member(member.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_group_member(&self, group_id: &str, member: &str) -> Result<bool, StoreError> {
        match self.groups.write().get_mut(group_id) {
            Some(group) => {
                group.remove_member(member);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn push_expense(&self, group_id: &str, expense: &Expense) -> Result<bool, StoreError> {
        match self.groups.write().get_mut(group_id) {
            Some(group) => {
                group.expenses.push(expense.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_split_paid(
        &self,
        group_id: &str,
        expense_id: &str,
        member: &str,
    ) -> Result<bool, StoreError> {
        let mut groups = self.groups.write();
        let Some(group) = groups.get_mut(group_id) else {
            return Ok(false);
        };
        let splits = group
            .expense_mut(expense_id)
            .into_iter()
            .flat_map(|expense| expense.splits.iter_mut());
        for split in splits.filter(|s| s.member == member) {
            split.paid = true;
        }
        Ok(true)
    }

    async fn delete_group(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.groups.write().remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::schemas::Split;
    use chrono::Utc;

    fn member(id: &str) -> Member {
        Member {
            id: id.to_string(),
            name: id.to_uppercase(),
            email: format!("{id}@example.com"),
            password_hash: String::new(),
        }
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = MemoryStore::new();
        store.insert_member(member("alice")).await.unwrap();
        assert!(matches!(
            store.insert_member(member("alice")).await,
            Err(StoreError::Duplicate(id)) if id == "alice"
        ));

        let group = Group::new("g1".into(), "Flat".into(), None, "alice".into());
        store.insert_group(group.clone()).await.unwrap();
        assert!(store.insert_group(group).await.is_err());
    }

    #[tokio::test]
    async fn lists_only_groups_the_member_is_in() {
        let store = MemoryStore::new();
        let mut flat = Group::new("g1".into(), "Flat".into(), None, "alice".into());
        flat.add_member("bob".into());
        store.insert_group(flat).await.unwrap();
        store
            .insert_group(Group::new("g2".into(), "Trip".into(), None, "carol".into()))
            .await
            .unwrap();

        let groups = store.groups_of_member("bob").await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, "g1");
        assert!(store.delete_group("g2").await.unwrap());
        assert!(!store.delete_group("g2").await.unwrap());
    }

    #[tokio::test]
    async fn field_updates_leave_expenses_alone() {
        let store = MemoryStore::new();
        store
            .insert_group(Group::new("g1".into(), "Flat".into(), None, "alice".into()))
            .await
            .unwrap();
        let expense = Expense {
            id: "e1".into(),
            description: "Rent".into(),
            amount: Money::from_cents(1000),
            group_id: "g1".into(),
            paid_by: "alice".into(),
            created_at: Utc::now(),
            splits: vec![Split {
                member: "bob".into(),
                amount: Money::from_cents(1000),
                paid: false,
            }],
        };
        assert!(store.push_expense("g1", &expense).await.unwrap());

        assert!(store.add_group_member("g1", "bob").await.unwrap());
        assert!(store.add_group_member("g1", "bob").await.unwrap());
        assert!(store.mark_split_paid("g1", "e1", "bob").await.unwrap());
        assert!(store.remove_group_member("g1", "bob").await.unwrap());
        assert!(!store.add_group_member("nope", "bob").await.unwrap());
        assert!(!store.mark_split_paid("nope", "e1", "bob").await.unwrap());

        let group = store.find_group("g1").await.unwrap().unwrap();
        assert_eq!(group.members, vec!["alice".to_string()]);
        assert_eq!(group.expenses.len(), 1);
        assert!(group.expenses[0].splits[0].paid);
    }

    #[tokio::test]
    async fn find_members_skips_unknown_ids() {
        let store = MemoryStore::new();
        store.insert_member(member("alice")).await.unwrap();
        let found = store
            .find_members(&["alice".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(found, vec![member("alice")]);
    }
}
