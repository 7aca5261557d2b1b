//! Group, expense and settlement operations on top of a `GroupStore`.
//!
//! Every read re-loads the group and recomputes derived values (balances,
//! settlements) from its expenses; nothing derived is cached.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::auth::{hash_password, verify_password, Requester};
use crate::balance::compute_balances;
use crate::error::{ServiceError, ServiceResult};
use crate::exchange::settle_balances;
use crate::money::Money;
use crate::schemas::{Expense, Group, GroupId, Member, MemberId, Split};
use crate::split::{allocate, SplitMode};
use crate::store::{GroupStore, StoreError};

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone, Debug, Deserialize)]
pub struct NewMember {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Credentials {
    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewGroup {
    #[serde(default)]
    pub id: Option<GroupId>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of a create-expense request. Exactly one of `splits` (manual amounts)
/// or `split_equally` (participants, first one takes leftover cents) is set.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub description: String,
    pub amount: Money,
    #[serde(default, deserialize_with = "unique_keys::deserialize")]
    pub splits: BTreeMap<MemberId, Money>,
    #[serde(default)]
    pub split_equally: Vec<MemberId>,
}

impl NewExpense {
    fn split_mode(&self) -> ServiceResult<SplitMode> {
        match (self.splits.is_empty(), self.split_equally.is_empty()) {
            (false, true) => Ok(SplitMode::Manual(self.splits.clone())),
            (true, false) => Ok(SplitMode::Equal(self.split_equally.clone())),
            (false, false) => Err(ServiceError::bad_request(
                "give either splits or splitEqually, not both",
            )),
            (true, true) => Err(ServiceError::bad_request(
                "an expense needs splits or splitEqually",
            )),
        }
    }
}

/// Reads a JSON object into a map, failing on a repeated key instead of
/// keeping the last value.
mod unique_keys {
    use std::collections::BTreeMap;
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{Error, MapAccess, Visitor};
    use serde::{Deserialize, Deserializer};

    struct UniqueKeys<K, V>(PhantomData<(K, V)>);

    impl<'de, K, V> Visitor<'de> for UniqueKeys<K, V>
    where
        K: Deserialize<'de> + Ord + fmt::Display,
        V: Deserialize<'de>,
    {
        type Value = BTreeMap<K, V>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object without repeated keys")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut map = BTreeMap::new();
            while let Some((key, value)) = access.next_entry::<K, V>()? {
                if map.contains_key(&key) {
                    return Err(A::Error::custom(format!("{key} appears more than once")));
                }
                map.insert(key, value);
            }
            Ok(map)
        }
    }

    pub fn deserialize<'de, D, K, V>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        D: Deserializer<'de>,
        K: Deserialize<'de> + Ord + fmt::Display,
        V: Deserialize<'de>,
    {
        deserializer.deserialize_map(UniqueKeys(PhantomData))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct EqualSplitRequest {
    pub amount: Money,
    pub participants: Vec<MemberId>,
}

/// A member as shown to that member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: MemberId,
    pub name: String,
    pub email: String,
}

impl From<Member> for Profile {
    fn from(member: Member) -> Self {
        Profile {
            id: member.id,
            name: member.name,
            email: member.email,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub id: MemberId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub created_by_id: MemberId,
    pub created_by_name: String,
    pub members: Vec<MemberView>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitView {
    pub member_id: MemberId,
    pub member_name: String,
    pub amount: Money,
    pub paid: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseView {
    pub id: String,
    pub description: String,
    pub amount: Money,
    pub group_id: GroupId,
    pub paid_by_id: MemberId,
    pub paid_by_name: String,
    pub created_at: DateTime<Utc>,
    pub splits: Vec<SplitView>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareView {
    pub member_id: MemberId,
    pub amount: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub member_id: MemberId,
    pub member_name: String,
    pub balance: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementView {
    pub from_member_id: MemberId,
    pub from_member_name: String,
    pub to_member_id: MemberId,
    pub to_member_name: String,
    pub amount: Money,
}

/// Display names by member id. Unknown members show their id.
struct Names(HashMap<MemberId, String>);

impl Names {
    fn of(&self, id: &str) -> String {
        self.0.get(id).cloned().unwrap_or_else(|| id.to_string())
    }
}

#[derive(Clone)]
pub struct Service {
    store: Arc<dyn GroupStore>,
}

impl Service {
    pub fn new(store: Arc<dyn GroupStore>) -> Self {
        Service { store }
    }

    pub async fn register_member(&self, id: MemberId, new: NewMember) -> ServiceResult<Profile> {
        if id.trim().is_empty() {
            return Err(ServiceError::bad_request("member id must not be empty"));
        }
        if new.name.trim().is_empty() {
            return Err(ServiceError::bad_request("name must not be empty"));
        }
        if new.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::bad_request(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let member = Member {
            id,
            name: new.name,
            email: new.email,
            password_hash: hash_password(&new.password),
        };
        match self.store.insert_member(member.clone()).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(id)) => {
                return Err(ServiceError::conflict(format!("member {id} already exists")))
            }
            Err(err) => return Err(err.into()),
        }
        info!(member = %member.id, "member registered");
        Ok(member.into())
    }

    /// Checks a member's password. Unknown members and wrong passwords are
    /// both reported as `Unauthorized`.
    pub async fn login(&self, member_id: &str, credentials: Credentials) -> ServiceResult<Profile> {
        let member = self
            .store
            .find_member(member_id)
            .await?
            .filter(|m| verify_password(&credentials.password, &m.password_hash));
        match member {
            Some(member) => {
                info!(member = %member.id, "member logged in");
                Ok(member.into())
            }
            None => {
                warn!(member = %member_id, "rejected login");
                Err(ServiceError::Unauthorized)
            }
        }
    }

    pub async fn current_member(&self, requester: &Requester) -> ServiceResult<Profile> {
        self.store
            .find_member(&requester.member)
            .await?
            .map(Profile::from)
            .ok_or(ServiceError::Unauthorized)
    }

    pub async fn create_group(&self, requester: &Requester, new: NewGroup) -> ServiceResult<GroupView> {
        self.current_member(requester).await?;
        if new.name.trim().is_empty() {
            return Err(ServiceError::bad_request("group name must not be empty"));
        }
        let id = new.id.unwrap_or_else(|| ObjectId::new().to_hex());
        let group = Group::new(id, new.name, new.description, requester.member.clone());
        match self.store.insert_group(group.clone()).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(id)) => {
                return Err(ServiceError::conflict(format!("group {id} already exists")))
            }
            Err(err) => return Err(err.into()),
        }
        info!(group = %group.id, creator = %requester.member, "group created");
        self.group_view(&group).await
    }

    pub async fn list_groups(&self, requester: &Requester) -> ServiceResult<Vec<GroupView>> {
        let groups = self.store.groups_of_member(&requester.member).await?;
        let mut views = Vec::with_capacity(groups.len());
        for group in &groups {
            views.push(self.group_view(group).await?);
        }
        Ok(views)
    }

    pub async fn get_group(&self, requester: &Requester, group_id: &str) -> ServiceResult<GroupView> {
        let group = self.member_group(requester, group_id).await?;
        self.group_view(&group).await
    }

    pub async fn delete_group(&self, requester: &Requester, group_id: &str) -> ServiceResult<()> {
        let group = self.load_group(group_id).await?;
        ensure_creator(&group, requester, "delete the group")?;
        if !self.store.delete_group(group_id).await? {
            return Err(ServiceError::not_found(format!("group {group_id}")));
        }
        info!(group = %group_id, "group deleted");
        Ok(())
    }

    pub async fn add_member(
        &self,
        requester: &Requester,
        group_id: &str,
        member_id: MemberId,
    ) -> ServiceResult<GroupView> {
        let group = self.load_group(group_id).await?;
        ensure_creator(&group, requester, "add members")?;
        if self.store.find_member(&member_id).await?.is_none() {
            return Err(ServiceError::not_found(format!("member {member_id}")));
        }
        if !group.is_member(&member_id) {
            if !self.store.add_group_member(group_id, &member_id).await? {
                return Err(ServiceError::not_found(format!("group {group_id}")));
            }
            info!(group = %group_id, member = %member_id, "member added");
        }
        let group = self.load_group(group_id).await?;
        self.group_view(&group).await
    }

    pub async fn remove_member(
        &self,
        requester: &Requester,
        group_id: &str,
        member_id: &str,
    ) -> ServiceResult<GroupView> {
        let group = self.load_group(group_id).await?;
        ensure_creator(&group, requester, "remove members")?;
        if group.created_by == member_id {
            return Err(ServiceError::forbidden("the group creator cannot be removed"));
        }
        if group.is_member(member_id) {
            if !self.store.remove_group_member(group_id, member_id).await? {
                return Err(ServiceError::not_found(format!("group {group_id}")));
            }
            info!(group = %group_id, member = %member_id, "member removed");
        }
        let group = self.load_group(group_id).await?;
        self.group_view(&group).await
    }

    /// Records an expense paid by the requester. The payer's own share is
    /// stored as already paid.
    pub async fn create_expense(
        &self,
        requester: &Requester,
        group_id: &str,
        new: NewExpense,
    ) -> ServiceResult<ExpenseView> {
        let group = self.member_group(requester, group_id).await?;
        if new.description.trim().is_empty() {
            return Err(ServiceError::bad_request("description must not be empty"));
        }
        let mode = new.split_mode()?;
        let allocation = allocate(new.amount, &mode, &group.members)?;

        let payer = requester.member.clone();
        let splits = allocation
            .into_iter()
            .map(|(member, amount)| Split {
                paid: member == payer,
                member,
                amount,
            })
            .collect();
        let expense = Expense {
            id: ObjectId::new().to_hex(),
            description: new.description,
            amount: new.amount,
            group_id: group.id.clone(),
            paid_by: payer,
            created_at: Utc::now(),
            splits,
        };

        if !self.store.push_expense(group_id, &expense).await? {
            return Err(ServiceError::not_found(format!("group {group_id}")));
        }
        info!(
            group = %group_id,
            expense = %expense.id,
            amount = %expense.amount,
            "expense created"
        );
        let names = self.names(expense_member_ids(&expense)).await?;
        Ok(expense_view(&expense, &names))
    }

    pub async fn list_expenses(
        &self,
        requester: &Requester,
        group_id: &str,
    ) -> ServiceResult<Vec<ExpenseView>> {
        let group = self.member_group(requester, group_id).await?;
        let names = self
            .names(group.expenses.iter().flat_map(expense_member_ids))
            .await?;
        Ok(group
            .expenses
            .iter()
            .map(|expense| expense_view(expense, &names))
            .collect())
    }

    pub async fn get_expense(
        &self,
        requester: &Requester,
        group_id: &str,
        expense_id: &str,
    ) -> ServiceResult<ExpenseView> {
        let group = self.member_group(requester, group_id).await?;
        let expense = group
            .expense(expense_id)
            .ok_or_else(|| ServiceError::not_found(format!("expense {expense_id}")))?;
        let names = self.names(expense_member_ids(expense)).await?;
        Ok(expense_view(expense, &names))
    }

    /// Only the member who owes a split may mark it paid. Marking twice is a no-op.
    pub async fn mark_split_paid(
        &self,
        requester: &Requester,
        group_id: &str,
        expense_id: &str,
        member_id: &str,
    ) -> ServiceResult<SplitView> {
        if requester.member != member_id {
            return Err(ServiceError::forbidden("members can only mark their own splits as paid"));
        }
        let group = self.load_group(group_id).await?;
        let expense = group
            .expense(expense_id)
            .ok_or_else(|| ServiceError::not_found(format!("expense {expense_id}")))?;
        let mut split = expense
            .splits
            .iter()
            .find(|s| s.member == member_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("split of {member_id} on expense {expense_id}")))?;

        if !split.paid {
            if !self.store.mark_split_paid(group_id, expense_id, member_id).await? {
                return Err(ServiceError::not_found(format!("group {group_id}")));
            }
            split.paid = true;
            info!(group = %group_id, expense = %expense_id, member = %member_id, "split paid");
        }

        let names = self.names([split.member.clone()]).await?;
        Ok(split_view(&split, &names))
    }

    /// What an equal split would look like, without recording anything.
    pub async fn preview_equal_split(
        &self,
        requester: &Requester,
        group_id: &str,
        request: EqualSplitRequest,
    ) -> ServiceResult<Vec<ShareView>> {
        let group = self.member_group(requester, group_id).await?;
        let allocation = allocate(
            request.amount,
            &SplitMode::Equal(request.participants),
            &group.members,
        )?;
        Ok(allocation
            .into_iter()
            .map(|(member_id, amount)| ShareView { member_id, amount })
            .collect())
    }

    pub async fn balances(&self, requester: &Requester, group_id: &str) -> ServiceResult<Vec<BalanceView>> {
        let group = self.member_group(requester, group_id).await?;
        let balance = compute_balances(&group.expenses).map_err(|err| {
            error!(group = %group_id, error = %err, "stored expenses are inconsistent");
            err
        })?;
        let names = self.names(balance.keys().cloned()).await?;
        Ok(balance
            .into_iter()
            .map(|(member_id, balance)| BalanceView {
                member_name: names.of(&member_id),
                member_id,
                balance,
            })
            .collect())
    }

    pub async fn settlements(
        &self,
        requester: &Requester,
        group_id: &str,
    ) -> ServiceResult<Vec<SettlementView>> {
        let group = self.member_group(requester, group_id).await?;
        let balance = compute_balances(&group.expenses).map_err(|err| {
            error!(group = %group_id, error = %err, "stored expenses are inconsistent");
            err
        })?;
        let settlements = settle_balances(&balance);
        debug!(group = %group_id, count = settlements.len(), "settlements computed");

        let names = self.names(balance.keys().cloned()).await?;
        Ok(settlements
            .into_iter()
            .map(|s| SettlementView {
                from_member_name: names.of(&s.from),
                from_member_id: s.from,
                to_member_name: names.of(&s.to),
                to_member_id: s.to,
                amount: s.amount,
            })
            .collect())
    }

    async fn load_group(&self, group_id: &str) -> ServiceResult<Group> {
        self.store
            .find_group(group_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("group {group_id}")))
    }

    async fn member_group(&self, requester: &Requester, group_id: &str) -> ServiceResult<Group> {
        let group = self.load_group(group_id).await?;
        if !group.is_member(&requester.member) {
            return Err(ServiceError::forbidden("you are not a member of this group"));
        }
        Ok(group)
    }

    async fn names(&self, ids: impl IntoIterator<Item = MemberId>) -> ServiceResult<Names> {
        let mut ids: Vec<MemberId> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        let members = self.store.find_members(&ids).await?;
        Ok(Names(members.into_iter().map(|m| (m.id, m.name)).collect()))
    }

    async fn group_view(&self, group: &Group) -> ServiceResult<GroupView> {
        let mut ids = group.members.clone();
        ids.push(group.created_by.clone());
        let names = self.names(ids).await?;
        Ok(GroupView {
            id: group.id.clone(),
            name: group.name.clone(),
            description: group.description.clone(),
            created_by_id: group.created_by.clone(),
            created_by_name: names.of(&group.created_by),
            members: group
                .members
                .iter()
                .map(|id| MemberView {
                    id: id.clone(),
                    name: names.of(id),
                })
                .collect(),
            created_at: group.created_at,
        })
    }
}

fn ensure_creator(group: &Group, requester: &Requester, action: &str) -> ServiceResult<()> {
    if group.created_by != requester.member {
        return Err(ServiceError::forbidden(format!("only the group creator can {action}")));
    }
    Ok(())
}

fn expense_member_ids(expense: &Expense) -> impl Iterator<Item = MemberId> + '_ {
    std::iter::once(expense.paid_by.clone()).chain(expense.splits.iter().map(|s| s.member.clone()))
}

fn split_view(split: &Split, names: &Names) -> SplitView {
    SplitView {
        member_id: split.member.clone(),
        member_name: names.of(&split.member),
        amount: split.amount,
        paid: split.paid,
    }
}

fn expense_view(expense: &Expense, names: &Names) -> ExpenseView {
    ExpenseView {
        id: expense.id.clone(),
        description: expense.description.clone(),
        amount: expense.amount,
        group_id: expense.group_id.clone(),
        paid_by_id: expense.paid_by.clone(),
        paid_by_name: names.of(&expense.paid_by),
        created_at: expense.created_at,
        splits: expense.splits.iter().map(|s| split_view(s, names)).collect(),
    }
}
