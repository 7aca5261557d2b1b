//! OpenSplit: shared expenses for groups, split to the cent and settled with
//! as few payments as the greedy reduction finds.
//!
//! `split`, `balance` and `exchange` are pure and hold no state. `service`
//! and `routes` put them behind an HTTP API backed by a `store::GroupStore`.

pub mod auth;
pub mod balance;
pub mod config;
pub mod error;
pub mod exchange;
pub mod money;
pub mod routes;
pub mod schemas;
pub mod service;
pub mod split;
pub mod store;
pub mod telemetry;

pub use balance::{compute_balances, Balance};
pub use error::{AllocationError, IntegrityError, ServiceError};
pub use exchange::{reduce_settlements, settle_balances};
pub use money::Money;
pub use schemas::{Expense, Group, Member, Settlement, Split};
pub use split::{allocate, split_equally, Allocation, SplitMode};
