use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::balance::{compute_balances, Balance};
use crate::error::IntegrityError;
use crate::money::Money;
use crate::schemas::{Expense, MemberId, Settlement};

/// Outstanding magnitude for one side of the settlement.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PersonalBalance {
    id: MemberId,
    balance: Money,
}

// Largest balance first; equal balances go to the lower member id.
impl Ord for PersonalBalance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.balance
            .cmp(&other.balance)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for PersonalBalance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Who pays whom so that every unpaid split in `expenses` is squared up.
pub fn reduce_settlements(expenses: &[Expense]) -> Result<Vec<Settlement>, IntegrityError> {
    let balance = compute_balances(expenses)?;
    Ok(settle_balances(&balance))
}

/// Greedy reduction: the biggest debtor pays the biggest creditor as much as
/// one of them can absorb, until someone runs out.
///
/// Emits at most `k - 1` settlements for `k` non-zero balances, each with a
/// positive amount.
pub fn settle_balances(balance: &Balance) -> Vec<Settlement> {
    // Divide people into payers and receivers
    let mut payers = BinaryHeap::new();
    let mut receivers = BinaryHeap::new();
    for (id, amount) in balance {
        let person = PersonalBalance {
            id: id.clone(),
            balance: amount.abs(),
        };
        if amount.is_negative() {
            payers.push(person);
        } else if amount.is_positive() {
            receivers.push(person);
        }
    }

    let mut exchanges = Vec::new();
    while let (Some(mut payer), Some(mut receiver)) = (payers.pop(), receivers.pop()) {
        let amount = payer.balance.min(receiver.balance);
        exchanges.push(Settlement {
            from: payer.id.clone(),
            to: receiver.id.clone(),
            amount,
        });

        payer.balance -= amount;
        receiver.balance -= amount;
        if !payer.balance.is_zero() {
            payers.push(payer);
        }
        if !receiver.balance.is_zero() {
            receivers.push(receiver);
        }
    }
    exchanges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::Split;
    use crate::split::split_equally;
    use chrono::Utc;
    use proptest::prelude::*;

    fn equal_expense(id: &str, payer: &str, cents: i64, participants: &[&str]) -> Expense {
        let participants: Vec<MemberId> = participants.iter().map(|p| p.to_string()).collect();
        let splits = split_equally(Money::from_cents(cents), &participants)
            .unwrap()
            .into_iter()
            .map(|(member, amount)| Split {
                paid: member == payer,
                member,
                amount,
            })
            .collect();
        Expense {
            id: id.to_string(),
            description: id.to_string(),
            amount: Money::from_cents(cents),
            group_id: "g".to_string(),
            paid_by: payer.to_string(),
            created_at: Utc::now(),
            splits,
        }
    }

    fn settlement(from: &str, to: &str, cents: i64) -> Settlement {
        Settlement {
            from: from.to_string(),
            to: to.to_string(),
            amount: Money::from_cents(cents),
        }
    }

    fn apply(balance: &Balance, settlements: &[Settlement]) -> Balance {
        let mut after = balance.clone();
        for s in settlements {
            *after.get_mut(&s.from).unwrap() += s.amount;
            *after.get_mut(&s.to).unwrap() -= s.amount;
        }
        after
    }

    #[test]
    fn three_friends_two_dinners() {
        let expenses = vec![
            equal_expense("e1", "c", 3000, &["a", "b", "c"]),
            equal_expense("e2", "a", 1000, &["a", "b", "c"]),
        ];

        let balance = compute_balances(&expenses).unwrap();
        assert_eq!(balance["a"], Money::from_cents(-334));
        assert_eq!(balance["b"], Money::from_cents(-1333));
        assert_eq!(balance["c"], Money::from_cents(1667));

        assert_eq!(
            reduce_settlements(&expenses).unwrap(),
            vec![settlement("b", "c", 1333), settlement("a", "c", 334)]
        );
    }

    #[test]
    fn nothing_owed_means_no_settlements() {
        assert!(reduce_settlements(&[]).unwrap().is_empty());

        let mut expense = equal_expense("e1", "a", 900, &["a", "b", "c"]);
        for split in &mut expense.splits {
            split.paid = true;
        }
        assert!(reduce_settlements(&[expense]).unwrap().is_empty());

        // Two members who paid for each other the same amount cancel out.
        let expenses = vec![
            equal_expense("e1", "a", 1000, &["a", "b"]),
            equal_expense("e2", "b", 1000, &["a", "b"]),
        ];
        assert!(reduce_settlements(&expenses).unwrap().is_empty());
    }

    #[test]
    fn ties_go_to_the_lower_member_id() {
        let balance: Balance = [
            ("c".to_string(), Money::from_cents(1000)),
            ("b".to_string(), Money::from_cents(-500)),
            ("a".to_string(), Money::from_cents(-500)),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            settle_balances(&balance),
            vec![settlement("a", "c", 500), settlement("b", "c", 500)]
        );
    }

    #[test]
    fn tied_creditors_are_paid_in_member_id_order() {
        let balance: Balance = [
            ("z".to_string(), Money::from_cents(-1000)),
            ("d".to_string(), Money::from_cents(500)),
            ("b".to_string(), Money::from_cents(500)),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            settle_balances(&balance),
            vec![settlement("z", "b", 500), settlement("z", "d", 500)]
        );
    }

    #[test]
    fn largest_pair_settles_first() {
        let balance: Balance = [
            ("a".to_string(), Money::from_cents(700)),
            ("b".to_string(), Money::from_cents(300)),
            ("c".to_string(), Money::from_cents(-200)),
            ("d".to_string(), Money::from_cents(-800)),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            settle_balances(&balance),
            vec![
                settlement("d", "a", 700),
                settlement("c", "b", 200),
                settlement("d", "b", 100),
            ]
        );
    }

    #[test]
    fn integrity_errors_propagate() {
        let mut broken = equal_expense("e1", "a", 1000, &["a", "b"]);
        broken.splits[1].amount = Money::from_cents(1);
        assert!(matches!(
            reduce_settlements(&[broken]),
            Err(IntegrityError::SplitSumMismatch { .. })
        ));
    }

    fn expenses_strategy() -> impl Strategy<Value = Vec<Expense>> {
        let expense = (
            1i64..500_000,
            0usize..6,
            prop::collection::vec(any::<bool>(), 6),
            prop::collection::vec(any::<bool>(), 6),
        );
        prop::collection::vec(expense, 0..25).prop_map(|drafts| {
            drafts
                .into_iter()
                .enumerate()
                .filter_map(|(i, (cents, payer, included, paid))| {
                    let participants: Vec<MemberId> = (0..6)
                        .filter(|m| included[*m])
                        .map(|m| format!("m{m}"))
                        .collect();
                    if participants.is_empty() {
                        return None;
                    }
                    let payer = format!("m{payer}");
                    let splits = split_equally(Money::from_cents(cents), &participants)
                        .ok()?
                        .into_iter()
                        .enumerate()
                        .map(|(j, (member, amount))| Split {
                            paid: paid[j] || member == payer,
                            member,
                            amount,
                        })
                        .collect();
                    Some(Expense {
                        id: format!("e{i}"),
                        description: String::new(),
                        amount: Money::from_cents(cents),
                        group_id: "g".to_string(),
                        paid_by: payer,
                        created_at: Utc::now(),
                        splits,
                    })
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn settlements_clear_every_balance(expenses in expenses_strategy()) {
            let balance = compute_balances(&expenses).unwrap();
            let settlements = settle_balances(&balance);

            let after = apply(&balance, &settlements);
            prop_assert!(after.values().all(Money::is_zero));

            let outstanding = balance.values().filter(|b| !b.is_zero()).count();
            prop_assert!(settlements.len() <= outstanding.saturating_sub(1));
            prop_assert!(settlements.iter().all(|s| s.amount.is_positive()));
        }

        #[test]
        fn reducer_is_idempotent(expenses in expenses_strategy()) {
            prop_assert_eq!(
                reduce_settlements(&expenses).unwrap(),
                reduce_settlements(&expenses).unwrap()
            );
        }
    }
}
