use std::collections::BTreeMap;

use crate::error::IntegrityError;
use crate::money::Money;
use crate::schemas::{Expense, MemberId};

/// Net position per member: positive means the member is owed money.
pub type Balance = BTreeMap<MemberId, Money>;

/// Nets every unpaid split against the expense payer.
///
/// Each expense is checked first; an expense whose splits don't add up to its
/// amount aborts the whole computation.
pub fn compute_balances(expenses: &[Expense]) -> Result<Balance, IntegrityError> {
    let mut balance = Balance::new();
    for expense in expenses {
        check_integrity(expense)?;

        let overflow = || IntegrityError::Overflow {
            expense: expense.id.clone(),
        };
        balance.entry(expense.paid_by.clone()).or_insert_with(Money::zero);
        for split in &expense.splits {
            let entry = balance.entry(split.member.clone()).or_insert_with(Money::zero);
            if split.paid || split.member == expense.paid_by {
                continue;
            }
            *entry = entry.checked_sub(split.amount).ok_or_else(overflow)?;
            if let Some(owed) = balance.get_mut(&expense.paid_by) {
                *owed = owed.checked_add(split.amount).ok_or_else(overflow)?;
            }
        }
    }
    Ok(balance)
}

pub fn check_integrity(expense: &Expense) -> Result<(), IntegrityError> {
    if !expense.amount.is_positive() {
        return Err(IntegrityError::NonPositiveAmount {
            expense: expense.id.clone(),
            amount: expense.amount,
        });
    }
    let actual = expense.split_total().ok_or_else(|| IntegrityError::Overflow {
        expense: expense.id.clone(),
    })?;
    if actual != expense.amount {
        return Err(IntegrityError::SplitSumMismatch {
            expense: expense.id.clone(),
            expected: expense.amount,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::Split;
    use chrono::Utc;

    fn expense(id: &str, payer: &str, splits: &[(&str, i64, bool)]) -> Expense {
        let splits: Vec<Split> = splits
            .iter()
            .map(|(member, cents, paid)| Split {
                member: member.to_string(),
                amount: Money::from_cents(*cents),
                paid: *paid,
            })
            .collect();
        Expense {
            id: id.to_string(),
            description: id.to_string(),
            amount: splits.iter().map(|s| s.amount).sum(),
            group_id: "g".to_string(),
            paid_by: payer.to_string(),
            created_at: Utc::now(),
            splits,
        }
    }

    #[test]
    fn payer_is_owed_unpaid_splits() {
        let expenses = vec![expense("e1", "c", &[("a", 1000, false), ("b", 1000, false), ("c", 1000, false)])];
        let balance = compute_balances(&expenses).unwrap();
        assert_eq!(balance["a"], Money::from_cents(-1000));
        assert_eq!(balance["b"], Money::from_cents(-1000));
        assert_eq!(balance["c"], Money::from_cents(2000));
    }

    #[test]
    fn paid_splits_do_not_count() {
        let expenses = vec![expense("e1", "c", &[("a", 1000, true), ("b", 1000, false), ("c", 1000, true)])];
        let balance = compute_balances(&expenses).unwrap();
        assert_eq!(balance["a"], Money::zero());
        assert_eq!(balance["b"], Money::from_cents(-1000));
        assert_eq!(balance["c"], Money::from_cents(1000));
    }

    #[test]
    fn payer_without_own_split_still_gets_an_entry() {
        let expenses = vec![expense("e1", "p", &[("a", 500, false)])];
        let balance = compute_balances(&expenses).unwrap();
        assert_eq!(balance["p"], Money::from_cents(500));
        assert_eq!(balance.values().sum::<Money>(), Money::zero());
    }

    #[test]
    fn maximum_amounts_accumulate_without_overflow() {
        let max_cents = crate::money::MAX_CENTS;
        let expenses = vec![
            expense("e1", "a", &[("b", max_cents, false)]),
            expense("e2", "a", &[("b", max_cents, false)]),
        ];
        let balance = compute_balances(&expenses).unwrap();
        assert_eq!(balance["a"], Money::from_cents(2 * max_cents));
        assert_eq!(balance["b"], Money::from_cents(-2 * max_cents));
    }

    #[test]
    fn malformed_expense_is_an_integrity_error() {
        let mut broken = expense("e2", "a", &[("a", 500, false), ("b", 500, false)]);
        broken.amount = Money::from_cents(1001);
        let expenses = vec![expense("e1", "a", &[("b", 100, false)]), broken];
        assert_eq!(
            compute_balances(&expenses),
            Err(IntegrityError::SplitSumMismatch {
                expense: "e2".to_string(),
                expected: Money::from_cents(1001),
                actual: Money::from_cents(1000),
            })
        );
    }
}
