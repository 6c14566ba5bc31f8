//! Credit ledger and resale rules.
//!
//! All functions are pure: they read the entity they are given and return
//! plan fragments. Balances only change when the coordinator applies the
//! returned plan, so a purchase's debit and its item grant land atomically.

use crate::error::{ErrorSeverity, SheetError};
use crate::plan::{MergeConflict, MutationPlan, RecordSpec};
use crate::state::{AttrPath, Entity, EntityId, RecordId, Value};

/// Resale value as a fraction of the original cost. Not configurable.
pub const RESALE_MULTIPLIER: f64 = 0.5;

/// `RESALE_MULTIPLIER` as an integer divisor, so large costs stay exact.
const RESALE_DIVISOR: u64 = 2;

/// Attribute holding an entity's balance, relative to `base`.
pub const CREDITS_ATTRIBUTE: &str = "credits";

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LedgerError {
    #[error("entity {entity} holds {balance} credits but needs {required}")]
    InsufficientFunds {
        entity: EntityId,
        balance: f64,
        required: f64,
    },

    #[error("entity {entity} has a non-numeric credit balance")]
    NonNumericBalance { entity: EntityId },

    #[error("entity {entity} does not own record {record}")]
    RecordNotOwned { entity: EntityId, record: RecordId },

    #[error(transparent)]
    Merge(#[from] MergeConflict),
}

impl SheetError for LedgerError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InsufficientFunds { .. } => ErrorSeverity::Recoverable,
            Self::NonNumericBalance { .. } | Self::RecordNotOwned { .. } => {
                ErrorSeverity::Validation
            }
            Self::Merge(_) => ErrorSeverity::Internal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "LEDGER_INSUFFICIENT_FUNDS",
            Self::NonNumericBalance { .. } => "LEDGER_NON_NUMERIC_BALANCE",
            Self::RecordNotOwned { .. } => "LEDGER_RECORD_NOT_OWNED",
            Self::Merge(_) => "LEDGER_MERGE_CONFLICT",
        }
    }
}

fn credits_path() -> AttrPath {
    AttrPath::from_static(CREDITS_ATTRIBUTE)
}

/// Plan path of the balance (`base.credits`).
pub fn credits_plan_path() -> AttrPath {
    AttrPath::from_static("base").join(&credits_path())
}

/// Current balance. A missing balance counts as zero.
pub fn balance(entity: &Entity) -> Result<f64, LedgerError> {
    match entity.base.get(&credits_path()) {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) if n.is_finite() => Ok(*n),
        Some(_) => Err(LedgerError::NonNumericBalance { entity: entity.id }),
    }
}

/// True when the entity can pay `amount`.
pub fn validate_funds(entity: &Entity, amount: u64) -> bool {
    balance(entity).is_ok_and(|balance| balance >= amount as f64)
}

/// Plan fragment moving the balance by a signed `amount`.
///
/// The fragment writes the new absolute balance, so merging it with any other
/// write to the same balance is a conflict rather than a lost update.
pub fn build_credit_delta(entity: &Entity, amount: i64) -> Result<MutationPlan, LedgerError> {
    let current = balance(entity)?;
    let next = current + amount as f64;
    if next < 0.0 {
        return Err(LedgerError::InsufficientFunds {
            entity: entity.id,
            balance: current,
            required: -(amount as f64),
        });
    }
    Ok(MutationPlan::new().with_set(entity.id, credits_plan_path(), next))
}

/// Resale value of an item, rounded down.
pub fn calculate_resale(original_cost: u64) -> u64 {
    original_cost / RESALE_DIVISOR
}

/// Debits `cost` and grants the record in one plan.
pub fn build_purchase(
    entity: &Entity,
    cost: u64,
    record: RecordSpec,
) -> Result<MutationPlan, LedgerError> {
    let debit = build_credit_delta(entity, -signed(cost))?;
    let grant = MutationPlan::new().with_add(entity.id, record);
    Ok(debit.merge_with(grant)?)
}

/// Removes an owned record and credits its resale value in one plan.
pub fn build_sale(
    entity: &Entity,
    record: RecordId,
    original_cost: u64,
) -> Result<MutationPlan, LedgerError> {
    if entity.record(record).is_none() {
        return Err(LedgerError::RecordNotOwned {
            entity: entity.id,
            record,
        });
    }
    let credit = build_credit_delta(entity, signed(calculate_resale(original_cost)))?;
    let removal = MutationPlan::new().with_delete_owned(entity.id, record);
    Ok(credit.merge_with(removal)?)
}

fn signed(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}
