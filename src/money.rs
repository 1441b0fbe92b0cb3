//! Fixed-point currency amounts.
//!
//! Balances, session costs and payment amounts are all carried as integer
//! minor units (cents). Signed, because payment records use negative amounts
//! for debits from the payer's perspective.
use std::fmt;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }
    /// Whole currency units, e.g. `Money::from_major(100)` is 100.00.
    pub fn from_major(units: i64) -> Self {
        Self(units * 100)
    }
    pub fn cents(&self) -> i64 {
        self.0
    }
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
    /// None when the result would go negative. Balances are never negative,
    /// so this is the only subtraction the ledger needs.
    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        let rest = self.0.checked_sub(other.0)?;
        if rest < 0 { None } else { Some(Money(rest)) }
    }
    pub fn negated(&self) -> Money {
        Money(-self.0)
    }

    /// Session cost for an hourly rate over a duration in minutes, rounded
    /// half-up to the nearest cent.
    pub fn session_cost(rate_per_hour: Money, minutes: i64) -> Money {
        let num = rate_per_hour.0 as i128 * minutes as i128;
        Money(((num + 30) / 60) as i64)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl<C> minicbor::Encode<C> for Money {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i64(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Money {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Money(d.i64()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_encoding() {
        let original = Money::from_cents(-12_345);

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: Money = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn session_cost_rounds_to_cents() {
        // 100.00/hr for 2h
        assert_eq!(
            Money::session_cost(Money::from_major(100), 120),
            Money::from_major(200)
        );
        // 99.99/hr for 90min = 149.985 -> 149.99
        assert_eq!(
            Money::session_cost(Money::from_cents(9_999), 90),
            Money::from_cents(14_999)
        );
        // 10.00/hr for 1min = 0.1666.. -> 0.17
        assert_eq!(
            Money::session_cost(Money::from_major(10), 1),
            Money::from_cents(17)
        );
    }

    #[test]
    fn checked_sub_refuses_negative_balances() {
        let balance = Money::from_major(50);
        assert_eq!(balance.checked_sub(Money::from_major(200)), None);
        assert_eq!(
            balance.checked_sub(Money::from_major(50)),
            Some(Money::ZERO)
        );
    }

    #[test]
    fn display_formats_minor_units() {
        assert_eq!(Money::from_cents(20_050).to_string(), "200.50");
        assert_eq!(Money::from_cents(-305).to_string(), "-3.05");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }
}
