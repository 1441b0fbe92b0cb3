//! Property-based tests for money conservation and rating aggregation
//!
//! This module uses the proptest crate to verify the invariants that must
//! hold for all inputs, not just the scenario values: escrow never creates
//! or destroys money, settlement happens at most once, and the running
//! rating average stays inside the 1.0..=5.0 band.

use booking_settlement::booking::{
    BookingDecision, BookingRequest, BookingStatus, SessionMode, SessionOutcome, SessionWindow,
};
use booking_settlement::money::Money;
use booking_settlement::rating::merge_rating;
use booking_settlement::service::BookingService;
use booking_settlement::timestamp::TimeStamp;
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::tempdir;

// PROPERTY TEST STRATEGIES

/// Hourly rates between 1.00 and 500.00, in whole cents
fn rate_strategy() -> impl Strategy<Value = Money> {
    (100i64..=50_000).prop_map(Money::from_cents)
}

/// Session lengths between 15 minutes and 8 hours
fn duration_strategy() -> impl Strategy<Value = i64> {
    15i64..=480
}

/// Ratings are integers 1..=5
fn rating_strategy() -> impl Strategy<Value = u8> {
    1u8..=5
}

/// Which party acknowledges first
fn ack_order_strategy() -> impl Strategy<Value = bool> {
    prop::bool::ANY
}

fn window_of(minutes: i64) -> SessionWindow {
    let start = TimeStamp::new_with(2026, 9, 1, 8, 0, 0);
    let end = (start.to_datetime_utc() + chrono::Duration::minutes(minutes)).into();
    SessionWindow::new(start, end)
}

fn fresh_service(dir: &tempfile::TempDir, name: &str) -> BookingService {
    let db = sled::open(dir.path().join(name)).expect("open test db");
    db.clear().expect("clear test db");
    BookingService::new(Arc::new(db))
}

// PROPERTY TESTS
proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: a full request -> accept -> dual-ack run conserves money.
    ///
    /// The student ends exactly `cost` down, the tutor exactly `cost` up,
    /// and the booking's payment records sum to zero, for any rate,
    /// duration and acknowledgment order.
    #[test]
    fn prop_settlement_conserves_money(
        rate in rate_strategy(),
        minutes in duration_strategy(),
        tutor_first in ack_order_strategy(),
    ) {
        let dir = tempdir().unwrap();
        let service = fresh_service(&dir, "prop_conserve.db");

        let student = service.register_student("Amira").unwrap();
        let tutor = service
            .register_tutor("Bogdan", rate, vec!["algebra".into()])
            .unwrap();
        // enough for any generated rate and duration
        let opening = Money::from_major(10_000);
        service.load_credits(&student.id, opening).unwrap();

        let booking = service
            .request_booking(
                BookingRequest::new()
                    .from_student(&student.id)
                    .with_tutor(&tutor.id)
                    .set_course("algebra")
                    .set_mode(SessionMode::Online)
                    .set_window(window_of(minutes)),
            )
            .unwrap();

        let expected_cost = Money::session_cost(rate, minutes);
        prop_assert_eq!(booking.cost, expected_cost);

        service
            .respond_to_booking(&booking.id, &tutor.id, BookingDecision::Accept)
            .unwrap();

        let (first, second) = if tutor_first {
            (&tutor.id, &student.id)
        } else {
            (&student.id, &tutor.id)
        };
        service
            .acknowledge_completion(&booking.id, first, SessionOutcome::Complete)
            .unwrap();
        // escrow still held after one ack
        prop_assert_eq!(service.balance_of(&tutor.id).unwrap(), Money::ZERO);
        let settled = service
            .acknowledge_completion(&booking.id, second, SessionOutcome::Complete)
            .unwrap();

        prop_assert_eq!(settled.status, BookingStatus::Completed);
        prop_assert_eq!(
            service.balance_of(&student.id).unwrap(),
            opening.checked_sub(expected_cost).unwrap()
        );
        prop_assert_eq!(service.balance_of(&tutor.id).unwrap(), expected_cost);

        let sum: i64 = service
            .payments_for(&student.id)
            .unwrap()
            .iter()
            .filter(|p| p.booking_id.as_deref() == Some(booking.id.as_str()))
            .map(|p| p.amount.cents())
            .sum();
        prop_assert_eq!(sum, 0);
    }

    /// Property: declining always refunds exactly what was held.
    #[test]
    fn prop_decline_refunds_exactly(
        rate in rate_strategy(),
        minutes in duration_strategy(),
    ) {
        let dir = tempdir().unwrap();
        let service = fresh_service(&dir, "prop_decline.db");

        let student = service.register_student("Amira").unwrap();
        let tutor = service
            .register_tutor("Bogdan", rate, vec!["algebra".into()])
            .unwrap();
        let opening = Money::from_major(10_000);
        service.load_credits(&student.id, opening).unwrap();

        let booking = service
            .request_booking(
                BookingRequest::new()
                    .from_student(&student.id)
                    .with_tutor(&tutor.id)
                    .set_course("algebra")
                    .set_mode(SessionMode::Online)
                    .set_window(window_of(minutes)),
            )
            .unwrap();
        service
            .respond_to_booking(&booking.id, &tutor.id, BookingDecision::Decline)
            .unwrap();

        prop_assert_eq!(service.balance_of(&student.id).unwrap(), opening);
        prop_assert_eq!(service.balance_of(&tutor.id).unwrap(), Money::ZERO);
    }

    /// Property: the running average stays within [1.0, 5.0] and the count
    /// tracks the number of merged reviews, for any review sequence.
    #[test]
    fn prop_rating_average_stays_in_bounds(ratings in prop::collection::vec(rating_strategy(), 1..40)) {
        let mut avg_tenths = 0u32;
        let mut count = 0u32;

        for rating in &ratings {
            let (a, c) = merge_rating(avg_tenths, count, *rating);
            avg_tenths = a;
            count = c;

            prop_assert!(
                (10..=50).contains(&avg_tenths),
                "average {} out of bounds after merging {}",
                avg_tenths,
                rating
            );
        }
        prop_assert_eq!(count as usize, ratings.len());
    }

    /// Property: merging equal ratings is a fixed point of the average.
    #[test]
    fn prop_constant_ratings_keep_constant_average(
        rating in rating_strategy(),
        repeats in 1usize..20,
    ) {
        let mut avg_tenths = 0u32;
        let mut count = 0u32;
        for _ in 0..repeats {
            let (a, c) = merge_rating(avg_tenths, count, rating);
            avg_tenths = a;
            count = c;
        }
        prop_assert_eq!(avg_tenths, rating as u32 * 10);
    }

    /// Property: session cost rounds half-up to the cent.
    #[test]
    fn prop_session_cost_rounds_half_up(
        rate in rate_strategy(),
        minutes in duration_strategy(),
    ) {
        let cost = Money::session_cost(rate, minutes);
        let exact_times_60 = rate.cents() as i128 * minutes as i128;
        let down = exact_times_60 / 60;
        let diff = cost.cents() as i128 - down;
        // either truncation or a single half-up step
        prop_assert!(diff == 0 || diff == 1);
        // and the rounded value stays within half a cent of exact
        prop_assert!((cost.cents() as i128 * 60 - exact_times_60).abs() <= 30);
    }
}
