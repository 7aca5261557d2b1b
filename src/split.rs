use std::collections::{BTreeMap, HashSet};

use crate::error::AllocationError;
use crate::money::Money;
use crate::schemas::MemberId;

/// Owed amount per member, in the order the shares were produced.
pub type Allocation = Vec<(MemberId, Money)>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SplitMode {
    /// Divide evenly among these members; the first one absorbs the leftover cents.
    Equal(Vec<MemberId>),
    /// Caller-chosen amounts, only validated.
    Manual(BTreeMap<MemberId, Money>),
}

/// Splits `total` according to `mode`, checking every referenced member
/// against the group's current `members`.
pub fn allocate(
    total: Money,
    mode: &SplitMode,
    members: &[MemberId],
) -> Result<Allocation, AllocationError> {
    ensure_positive(total)?;
    match mode {
        SplitMode::Equal(participants) => {
            ensure_members(participants.iter(), members)?;
            split_equally(total, participants)
        }
        SplitMode::Manual(shares) => check_manual(total, shares, members),
    }
}

/// Floors every share to the cent and hands the residual to the first
/// participant, so the shares always add back up to `total`.
pub fn split_equally(
    total: Money,
    participants: &[MemberId],
) -> Result<Allocation, AllocationError> {
    ensure_positive(total)?;
    if participants.is_empty() {
        return Err(AllocationError::NoParticipants);
    }
    let mut seen = HashSet::new();
    for participant in participants {
        if !seen.insert(participant) {
            return Err(AllocationError::DuplicateParticipant(participant.clone()));
        }
    }

    let share = total.floor_share(participants.len());
    let mut allocation: Allocation = participants
        .iter()
        .map(|member| (member.clone(), share))
        .collect();

    let allocated: Money = allocation.iter().map(|(_, amount)| *amount).sum();
    allocation[0].1 += total - allocated;
    Ok(allocation)
}

/// Gate for manually entered shares. Rejects, never corrects.
pub fn check_manual(
    total: Money,
    shares: &BTreeMap<MemberId, Money>,
    members: &[MemberId],
) -> Result<Allocation, AllocationError> {
    ensure_positive(total)?;
    ensure_members(shares.keys(), members)?;

    if let Some((member, amount)) = shares.iter().find(|(_, amount)| amount.is_negative()) {
        return Err(AllocationError::NegativeShare {
            member: member.clone(),
            amount: *amount,
        });
    }

    let actual = Money::checked_sum(shares.values()).ok_or(AllocationError::Overflow)?;
    if actual != total {
        return Err(AllocationError::SumMismatch {
            expected: total,
            actual,
        });
    }

    Ok(shares
        .iter()
        .map(|(member, amount)| (member.clone(), *amount))
        .collect())
}

fn ensure_positive(total: Money) -> Result<(), AllocationError> {
    if total.is_positive() {
        Ok(())
    } else {
        Err(AllocationError::NonPositiveAmount(total))
    }
}

fn ensure_members<'a>(
    referenced: impl Iterator<Item = &'a MemberId>,
    members: &[MemberId],
) -> Result<(), AllocationError> {
    for member in referenced {
        if !members.contains(member) {
            return Err(AllocationError::NotAMember(member.clone()));
        }
    }
    Ok(())
}
