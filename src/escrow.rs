//! Escrow settlement.
//!
//! A booking's cost is debited from the student when the request is created
//! and held until both parties acknowledge the session. Settlement releases
//! the held amount to the tutor exactly once: the status check, the credit,
//! the earnings record and the flip to `Completed` are one transaction, so
//! a retried or concurrent settle observes `Completed` and aborts with
//! `AlreadySettled` instead of paying twice.
use crate::booking::{Booking, BookingStatus};
use crate::error::SettlementError;
use crate::ledger;
use crate::payment::{booking_payment_key, Payment, PaymentMethod};
use crate::store::{booking_key, payment_key, tx_fetch, tx_put, Store};
use crate::timestamp::TimeStamp;
use chrono::Utc;
use sled::transaction::{abort, ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};

/// Release escrow within an already-open transaction.
///
/// The status guard doubles as the compare-and-swap: under sled's
/// serializable transactions, whichever invocation commits first flips the
/// status, and any later one aborts here.
pub(crate) fn settle_in_tx(
    tx: &TransactionalTree,
    booking: &mut Booking,
    now: &TimeStamp<Utc>,
) -> ConflictableTransactionResult<(), SettlementError> {
    if booking.status != BookingStatus::Accepted {
        return abort(SettlementError::AlreadySettled);
    }
    if !(booking.student_ack && booking.tutor_ack) {
        return abort(SettlementError::InvalidTransition {
            from: booking.status,
            action: "settle",
        });
    }

    ledger::credit(tx, &booking.tutor.id, booking.cost)?;

    let key = booking_payment_key(&booking.id, PaymentMethod::Earnings)
        .map_err(ConflictableTransactionError::Abort)?;
    let earnings = Payment {
        payer_id: booking.student.id.clone(),
        payer_name: booking.student.name.clone(),
        recipient_id: Some(booking.tutor.id.clone()),
        recipient_name: Some(booking.tutor.name.clone()),
        amount: booking.cost,
        method: PaymentMethod::Earnings,
        booking_id: Some(booking.id.clone()),
        created_at: now.clone(),
    };
    tx_put(tx, payment_key(&key), &earnings)?;

    booking.status = BookingStatus::Completed;
    tx_put(tx, booking_key(&booking.id), booking)?;
    Ok(())
}

/// Standalone settlement entry point, the retry surface for callers whose
/// acknowledge call failed mid-flight.
pub(crate) fn settle(store: &Store, booking_id: &str) -> Result<Booking, SettlementError> {
    let now = TimeStamp::now();
    store.run(|tx| {
        let mut booking: Booking = tx_fetch(tx, booking_key(booking_id))?.ok_or_else(|| {
            ConflictableTransactionError::Abort(SettlementError::UnknownBooking(
                booking_id.to_owned(),
            ))
        })?;

        match booking.status {
            BookingStatus::Completed => return abort(SettlementError::AlreadySettled),
            BookingStatus::Accepted => {}
            other => {
                return abort(SettlementError::InvalidTransition {
                    from: other,
                    action: "settle",
                });
            }
        }

        settle_in_tx(tx, &mut booking, &now)?;
        Ok(booking)
    })
}
