//! Append-only payment records.
//!
//! Booking-scoped payments are keyed by the hash of (booking id, method), so
//! a retried settlement or refund lands on the same key instead of appending
//! a second record. Wallet movements get a fresh id per call.
use crate::money::Money;
use crate::timestamp::TimeStamp;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    #[n(0)]
    SessionPayment,
    #[n(1)]
    Earnings,
    #[n(2)]
    Withdrawal,
    #[n(3)]
    CreditLoad,
    #[n(4)]
    Refund,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone)]
pub struct Payment {
    #[n(0)]
    pub payer_id: String,
    #[n(1)]
    pub payer_name: String,
    #[n(2)]
    pub recipient_id: Option<String>,
    #[n(3)]
    pub recipient_name: Option<String>,
    // negative for debits from the payer's perspective
    #[n(4)]
    pub amount: Money,
    #[n(5)]
    pub method: PaymentMethod,
    #[n(6)]
    pub booking_id: Option<String>,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
}

impl Payment {
    pub fn touches(&self, user_id: &str) -> bool {
        self.payer_id == user_id || self.recipient_id.as_deref() == Some(user_id)
    }
}

/// Deterministic key for a booking-scoped payment: the same booking can hold
/// at most one record per method, which is what makes retries append-safe.
pub fn booking_payment_key(
    booking_id: &str,
    method: PaymentMethod,
) -> Result<String, crate::error::SettlementError> {
    let cbor = minicbor::to_vec((booking_id, method))
        .map_err(|e| crate::error::SettlementError::Codec(e.to_string()))?;
    Ok(sha256::digest(&cbor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_payment_keys_are_deterministic() {
        let a = booking_payment_key("bkg_1", PaymentMethod::SessionPayment).unwrap();
        let b = booking_payment_key("bkg_1", PaymentMethod::SessionPayment).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn booking_payment_keys_separate_methods_and_bookings() {
        let pay = booking_payment_key("bkg_1", PaymentMethod::SessionPayment).unwrap();
        let earn = booking_payment_key("bkg_1", PaymentMethod::Earnings).unwrap();
        let other = booking_payment_key("bkg_2", PaymentMethod::SessionPayment).unwrap();
        assert_ne!(pay, earn);
        assert_ne!(pay, other);
    }
}
