use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

pub type MemberId = String;
pub type GroupId = String;
pub type ExpenseId = String;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub email: String,
    /// Output of `auth::hash_password`. Never leaves the service layer.
    #[serde(default)]
    pub password_hash: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_by: MemberId,
    /// Insertion ordered, never holds the same id twice.
    pub members: Vec<MemberId>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// A fresh group whose only member is its creator.
    pub fn new(id: GroupId, name: String, description: Option<String>, creator: MemberId) -> Self {
        Group {
            id,
            name,
            description,
            members: vec![creator.clone()],
            created_by: creator,
            expenses: vec![],
            created_at: Utc::now(),
        }
    }

    pub fn is_member(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }

    /// Returns false when the member was already there.
    pub fn add_member(&mut self, member: MemberId) -> bool {
        if self.is_member(&member) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// Past expenses keep their splits for removed members.
    pub fn remove_member(&mut self, member: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != member);
        self.members.len() != before
    }

    pub fn expense(&self, id: &str) -> Option<&Expense> {
        self.expenses.iter().find(|e| e.id == id)
    }

    pub fn expense_mut(&mut self, id: &str) -> Option<&mut Expense> {
        self.expenses.iter_mut().find(|e| e.id == id)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub description: String,
    pub amount: Money,
    pub group_id: GroupId,
    pub paid_by: MemberId,
    pub created_at: DateTime<Utc>,
    pub splits: Vec<Split>,
}

impl Expense {
    /// Sum of the split amounts, `None` if it overflows.
    pub fn split_total(&self) -> Option<Money> {
        Money::checked_sum(self.splits.iter().map(|s| &s.amount))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Split {
    pub member: MemberId,
    pub amount: Money,
    pub paid: bool,
}

/// A payment that moves `amount` from `from` to `to`. Computed on request,
/// never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Money,
}
