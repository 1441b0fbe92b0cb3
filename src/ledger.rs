//! Balance mutations.
//!
//! The only place user balances change. Every operation takes the open
//! transaction it is logically part of, and always writes the `users`
//! record and its role mirror together.
use crate::error::SettlementError;
use crate::money::Money;
use crate::store::{self, tx_fetch, tx_put};
use crate::user::{Role, StudentProfile, TutorProfile, UserRecord};
use sled::transaction::{abort, ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};

/// Decrease a user's balance. Aborts the transaction with
/// `InsufficientBalance` if the balance would go negative.
pub(crate) fn debit(
    tx: &TransactionalTree,
    user_id: &str,
    amount: Money,
) -> ConflictableTransactionResult<UserRecord, SettlementError> {
    let mut user = load(tx, user_id)?;
    let next = match user.balance.checked_sub(amount) {
        Some(balance) => balance,
        None => {
            return abort(SettlementError::InsufficientBalance {
                needed: amount,
                available: user.balance,
            });
        }
    };
    user.balance = next;
    write_back(tx, &user)?;
    Ok(user)
}

/// Increase a user's balance. No upper bound beyond the representation.
pub(crate) fn credit(
    tx: &TransactionalTree,
    user_id: &str,
    amount: Money,
) -> ConflictableTransactionResult<UserRecord, SettlementError> {
    let mut user = load(tx, user_id)?;
    let next = match user.balance.checked_add(amount) {
        Some(balance) => balance,
        // a balance that no longer fits i64 cents is corrupt data
        None => return abort(SettlementError::Codec("balance overflow".into())),
    };
    user.balance = next;
    write_back(tx, &user)?;
    Ok(user)
}

fn load(
    tx: &TransactionalTree,
    user_id: &str,
) -> ConflictableTransactionResult<UserRecord, SettlementError> {
    tx_fetch(tx, store::user_key(user_id))?.ok_or_else(|| {
        ConflictableTransactionError::Abort(SettlementError::UnknownUser(user_id.to_owned()))
    })
}

// users record and role mirror move in lockstep
fn write_back(
    tx: &TransactionalTree,
    user: &UserRecord,
) -> ConflictableTransactionResult<(), SettlementError> {
    match user.role {
        Role::Student => {
            let mut profile: StudentProfile = tx_fetch(tx, store::student_key(&user.id))?
                .ok_or_else(|| {
                    ConflictableTransactionError::Abort(SettlementError::UnknownUser(
                        user.id.clone(),
                    ))
                })?;
            profile.balance = user.balance;
            tx_put(tx, store::student_key(&user.id), &profile)?;
        }
        Role::Tutor => {
            let mut profile: TutorProfile =
                tx_fetch(tx, store::tutor_key(&user.id))?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(SettlementError::UnknownUser(
                        user.id.clone(),
                    ))
                })?;
            profile.balance = user.balance;
            tx_put(tx, store::tutor_key(&user.id), &profile)?;
        }
    }
    tx_put(tx, store::user_key(&user.id), user)?;
    Ok(())
}
