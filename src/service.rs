//! Service layer API for booking lifecycle operations.
//!
//! Every operation takes the acting user's id as an explicit parameter; the
//! service holds no ambient session state. Callers are assumed to be
//! authenticated by the surrounding application.
use crate::booking::{
    Booking, BookingDecision, BookingRequest, BookingStatus, PartySnapshot, SessionOutcome,
};
use crate::error::SettlementError;
use crate::escrow;
use crate::ledger;
use crate::money::Money;
use crate::payment::{booking_payment_key, Payment, PaymentMethod};
use crate::rating;
use crate::store::{
    booking_key, payment_key, student_key, tutor_key, tx_fetch, tx_put, user_key, BookingWatcher,
    Store,
};
use crate::timestamp::TimeStamp;
use crate::user::{Review, Role, StudentProfile, TutorProfile, UserRecord};
use crate::utils;
use sled::transaction::{abort, ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use std::sync::Arc;
use tracing::{debug, info};

pub struct BookingService {
    store: Store,
    // in future we could add a config for pricing/fee policies
}

impl BookingService {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self {
            store: Store::new(instance),
        }
    }

    /// Subscribe to booking creations and updates.
    pub fn watch_bookings(&self) -> BookingWatcher {
        self.store.watch_bookings()
    }

    /// Register a new student with an empty wallet.
    pub fn register_student(&self, name: &str) -> anyhow::Result<StudentProfile> {
        let id = utils::new_uuid_to_bech32("student_")?;
        let user = UserRecord {
            id: id.clone(),
            name: name.to_owned(),
            role: Role::Student,
            balance: Money::ZERO,
        };
        let profile = StudentProfile {
            id: id.clone(),
            name: name.to_owned(),
            balance: Money::ZERO,
            reviews: vec![],
        };
        self.store.run(|tx| {
            tx_put(tx, user_key(&id), &user)?;
            tx_put(tx, student_key(&id), &profile)?;
            Ok(())
        })?;

        info!(student = %id, "registered student");
        Ok(profile)
    }

    /// Register a new tutor with an hourly rate and the courses they offer.
    pub fn register_tutor(
        &self,
        name: &str,
        hourly_rate: Money,
        courses: Vec<String>,
    ) -> anyhow::Result<TutorProfile> {
        if !hourly_rate.is_positive() {
            return Err(anyhow::anyhow!(
                "hourly rate must be positive, got {hourly_rate}"
            ));
        }

        let id = utils::new_uuid_to_bech32("tutor_")?;
        let user = UserRecord {
            id: id.clone(),
            name: name.to_owned(),
            role: Role::Tutor,
            balance: Money::ZERO,
        };
        let profile = TutorProfile {
            id: id.clone(),
            name: name.to_owned(),
            hourly_rate,
            courses,
            balance: Money::ZERO,
            rating_tenths: 0,
            rating_count: 0,
            reviews: vec![],
        };
        self.store.run(|tx| {
            tx_put(tx, user_key(&id), &user)?;
            tx_put(tx, tutor_key(&id), &profile)?;
            Ok(())
        })?;

        info!(tutor = %id, "registered tutor");
        Ok(profile)
    }

    /// Top up a wallet. Credit and the `CreditLoad` payment record commit
    /// together.
    pub fn load_credits(&self, user_id: &str, amount: Money) -> anyhow::Result<Money> {
        if !amount.is_positive() {
            return Err(anyhow::anyhow!("credit amount must be positive, got {amount}"));
        }

        let payment_id = utils::new_uuid_to_bech32("pay_")?;
        let now = TimeStamp::now();
        let balance = self.store.run(|tx| {
            let user = ledger::credit(tx, user_id, amount)?;
            let record = Payment {
                payer_id: user.id.clone(),
                payer_name: user.name.clone(),
                recipient_id: None,
                recipient_name: None,
                amount,
                method: PaymentMethod::CreditLoad,
                booking_id: None,
                created_at: now.clone(),
            };
            tx_put(tx, payment_key(&payment_id), &record)?;
            Ok(user.balance)
        })?;

        debug!(user = %user_id, %amount, %balance, "loaded credits");
        Ok(balance)
    }

    /// Withdraw from a wallet. Fails with `InsufficientBalance` when the
    /// wallet is short; nothing is written in that case.
    pub fn withdraw(&self, user_id: &str, amount: Money) -> anyhow::Result<Money> {
        if !amount.is_positive() {
            return Err(anyhow::anyhow!(
                "withdrawal amount must be positive, got {amount}"
            ));
        }

        let payment_id = utils::new_uuid_to_bech32("pay_")?;
        let now = TimeStamp::now();
        let balance = self.store.run(|tx| {
            let user = ledger::debit(tx, user_id, amount)?;
            let record = Payment {
                payer_id: user.id.clone(),
                payer_name: user.name.clone(),
                recipient_id: None,
                recipient_name: None,
                amount: amount.negated(),
                method: PaymentMethod::Withdrawal,
                booking_id: None,
                created_at: now.clone(),
            };
            tx_put(tx, payment_key(&payment_id), &record)?;
            Ok(user.balance)
        })?;

        debug!(user = %user_id, %amount, %balance, "withdrew credits");
        Ok(balance)
    }

    /// Submit a new booking request.
    ///
    /// Computes the session cost from the tutor's current rate, debits the
    /// student, creates the pending booking and the `SessionPayment` record.
    /// All of it is one transaction: an `InsufficientBalance` request leaves
    /// no trace.
    pub fn request_booking(&self, draft: BookingRequest) -> anyhow::Result<Booking> {
        let req = draft.validate()?;

        let booking_id = utils::new_uuid_to_bech32("bkg_")?;
        let pay_key = booking_payment_key(&booking_id, PaymentMethod::SessionPayment)?;
        let now = TimeStamp::now();

        let booking = self.store.run(|tx| {
            let tutor: TutorProfile =
                tx_fetch(tx, tutor_key(&req.tutor_id))?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(SettlementError::UnknownUser(
                        req.tutor_id.clone(),
                    ))
                })?;
            if !tutor.offers(&req.course) {
                return abort(SettlementError::CourseNotOffered(req.course.clone()));
            }

            let cost = Money::session_cost(tutor.hourly_rate, req.window.duration_minutes());

            let student = ledger::debit(tx, &req.student_id, cost)?;
            if student.role != Role::Student {
                return abort(SettlementError::Unauthorized {
                    user: req.student_id.clone(),
                    action: "request",
                });
            }

            let booking = Booking {
                id: booking_id.clone(),
                student: PartySnapshot {
                    id: student.id.clone(),
                    name: student.name.clone(),
                },
                tutor: PartySnapshot {
                    id: tutor.id.clone(),
                    name: tutor.name.clone(),
                },
                course: req.course.clone(),
                mode: req.mode,
                custom_request: req.custom_request.clone(),
                window: req.window.clone(),
                cost,
                status: BookingStatus::Pending,
                student_ack: false,
                tutor_ack: false,
                reviewed_by: vec![],
                read_by_student: true,
                read_by_tutor: false,
                created_at: now.clone(),
            };
            tx_put(tx, booking_key(&booking_id), &booking)?;

            let held = Payment {
                payer_id: student.id.clone(),
                payer_name: student.name.clone(),
                recipient_id: Some(tutor.id.clone()),
                recipient_name: Some(tutor.name.clone()),
                amount: cost.negated(),
                method: PaymentMethod::SessionPayment,
                booking_id: Some(booking_id.clone()),
                created_at: now.clone(),
            };
            tx_put(tx, payment_key(&pay_key), &held)?;

            Ok(booking)
        })?;

        info!(booking = %booking.id, cost = %booking.cost, "booking requested");
        Ok(booking)
    }

    /// Tutor accepts or declines a pending booking.
    ///
    /// Decline refunds the held cost to the student in the same transaction.
    pub fn respond_to_booking(
        &self,
        booking_id: &str,
        tutor_id: &str,
        decision: BookingDecision,
    ) -> anyhow::Result<Booking> {
        let refund_key = booking_payment_key(booking_id, PaymentMethod::Refund)?;
        let now = TimeStamp::now();

        let booking = self.store.run(|tx| {
            let mut booking = load_booking(tx, booking_id)?;

            if booking.status != BookingStatus::Pending {
                return abort(SettlementError::InvalidTransition {
                    from: booking.status,
                    action: "respond to",
                });
            }
            if booking.tutor.id != tutor_id {
                return abort(SettlementError::Unauthorized {
                    user: tutor_id.to_owned(),
                    action: "respond to",
                });
            }

            match decision {
                BookingDecision::Accept => booking.status = BookingStatus::Accepted,
                BookingDecision::Decline => {
                    booking.status = BookingStatus::Declined;
                    refund_in_tx(tx, &booking, &refund_key, &now)?;
                }
            }

            booking.note_action_by(Role::Tutor);
            tx_put(tx, booking_key(booking_id), &booking)?;
            Ok(booking)
        })?;

        info!(booking = %booking_id, status = ?booking.status, "tutor responded");
        Ok(booking)
    }

    /// Record a party's view of how an accepted session ended.
    ///
    /// `Complete` sets the actor's ack flag; once both flags are set the
    /// escrow settles in the same transaction. `DidntHappen` is student-only
    /// and one-sided: it terminates the booking immediately and returns the
    /// held funds. Divergent outcomes resolve first-write-wins, the loser
    /// gets `ConflictingOutcome`.
    pub fn acknowledge_completion(
        &self,
        booking_id: &str,
        actor_id: &str,
        outcome: SessionOutcome,
    ) -> anyhow::Result<Booking> {
        let refund_key = booking_payment_key(booking_id, PaymentMethod::Refund)?;
        let now = TimeStamp::now();

        let booking = self.store.run(|tx| {
            let mut booking = load_booking(tx, booking_id)?;
            let role = booking.party_role(actor_id).ok_or_else(|| {
                ConflictableTransactionError::Abort(SettlementError::Unauthorized {
                    user: actor_id.to_owned(),
                    action: "acknowledge",
                })
            })?;

            match outcome {
                SessionOutcome::Complete => {
                    let acked = match role {
                        Role::Student => booking.student_ack,
                        Role::Tutor => booking.tutor_ack,
                    };
                    match booking.status {
                        BookingStatus::Accepted => {}
                        // repeat of an ack that already settled
                        BookingStatus::Completed if acked => return Ok(booking),
                        BookingStatus::DidntHappen | BookingStatus::Completed => {
                            return abort(SettlementError::ConflictingOutcome);
                        }
                        other => {
                            return abort(SettlementError::InvalidTransition {
                                from: other,
                                action: "acknowledge",
                            });
                        }
                    }
                    if acked {
                        // flags only go false -> true; re-acking changes nothing
                        return Ok(booking);
                    }
                    match role {
                        Role::Student => booking.student_ack = true,
                        Role::Tutor => booking.tutor_ack = true,
                    }
                    booking.note_action_by(role);
                    if booking.student_ack && booking.tutor_ack {
                        escrow::settle_in_tx(tx, &mut booking, &now)?;
                    } else {
                        tx_put(tx, booking_key(booking_id), &booking)?;
                    }
                    Ok(booking)
                }
                SessionOutcome::DidntHappen => {
                    if role != Role::Student {
                        return abort(SettlementError::Unauthorized {
                            user: actor_id.to_owned(),
                            action: "mark not-occurred for",
                        });
                    }
                    match booking.status {
                        BookingStatus::DidntHappen => return Ok(booking),
                        BookingStatus::Completed => {
                            return abort(SettlementError::ConflictingOutcome);
                        }
                        BookingStatus::Accepted => {}
                        other => {
                            return abort(SettlementError::InvalidTransition {
                                from: other,
                                action: "mark not-occurred for",
                            });
                        }
                    }
                    if booking.student_ack {
                        // the student already vouched for completion
                        return abort(SettlementError::ConflictingOutcome);
                    }

                    booking.status = BookingStatus::DidntHappen;
                    refund_in_tx(tx, &booking, &refund_key, &now)?;
                    booking.note_action_by(Role::Student);
                    tx_put(tx, booking_key(booking_id), &booking)?;
                    Ok(booking)
                }
            }
        })?;

        info!(
            booking = %booking_id,
            status = ?booking.status,
            student_ack = booking.student_ack,
            tutor_ack = booking.tutor_ack,
            "acknowledgment recorded"
        );
        Ok(booking)
    }

    /// Retry surface for settlement: release escrow for a booking whose
    /// acknowledge call failed mid-flight. A second call after success
    /// reports `AlreadySettled` and credits nothing.
    pub fn settle(&self, booking_id: &str) -> anyhow::Result<Booking> {
        let booking = escrow::settle(&self.store, booking_id)?;
        info!(booking = %booking_id, "escrow settled");
        Ok(booking)
    }

    /// Review the counterparty of a completed booking.
    pub fn submit_review(
        &self,
        booking_id: &str,
        reviewer_id: &str,
        rating: u8,
        text: &str,
    ) -> anyhow::Result<Booking> {
        if !(1..=5).contains(&rating) {
            return Err(SettlementError::InvalidRating(rating).into());
        }
        let now = TimeStamp::now();

        let booking = self.store.run(|tx| {
            let mut booking = load_booking(tx, booking_id)?;
            let role = booking.party_role(reviewer_id).ok_or_else(|| {
                ConflictableTransactionError::Abort(SettlementError::Unauthorized {
                    user: reviewer_id.to_owned(),
                    action: "review",
                })
            })?;

            if booking.status != BookingStatus::Completed {
                return abort(SettlementError::InvalidTransition {
                    from: booking.status,
                    action: "review",
                });
            }
            if booking.has_review_from(reviewer_id) {
                return abort(SettlementError::DuplicateReview);
            }

            let reviewer_name = match role {
                Role::Student => booking.student.name.clone(),
                Role::Tutor => booking.tutor.name.clone(),
            };
            let review = Review {
                reviewer_name,
                rating,
                text: text.to_owned(),
                submitted_at: now.clone(),
            };
            match role {
                Role::Student => {
                    rating::add_review_to_tutor(tx, &booking.tutor.id, review)?;
                }
                Role::Tutor => {
                    rating::add_review_to_student(tx, &booking.student.id, review)?;
                }
            }

            booking.reviewed_by.push(reviewer_id.to_owned());
            tx_put(tx, booking_key(booking_id), &booking)?;
            Ok(booking)
        })?;

        info!(booking = %booking_id, reviewer = %reviewer_id, rating, "review submitted");
        Ok(booking)
    }

    /// Mark a booking as read by one of its parties.
    pub fn mark_read(&self, booking_id: &str, reader_id: &str) -> anyhow::Result<Booking> {
        let booking = self.store.run(|tx| {
            let mut booking = load_booking(tx, booking_id)?;
            let role = booking.party_role(reader_id).ok_or_else(|| {
                ConflictableTransactionError::Abort(SettlementError::Unauthorized {
                    user: reader_id.to_owned(),
                    action: "read",
                })
            })?;
            match role {
                Role::Student => booking.read_by_student = true,
                Role::Tutor => booking.read_by_tutor = true,
            }
            tx_put(tx, booking_key(booking_id), &booking)?;
            Ok(booking)
        })?;
        Ok(booking)
    }

    // Queries

    pub fn booking(&self, booking_id: &str) -> anyhow::Result<Booking> {
        self.store
            .fetch(booking_key(booking_id))?
            .ok_or_else(|| SettlementError::UnknownBooking(booking_id.to_owned()).into())
    }

    /// All bookings a user is party to, ordered by session start.
    pub fn bookings_for(&self, user_id: &str) -> anyhow::Result<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .store
            .scan_bookings()?
            .into_iter()
            .filter(|b| b.party_role(user_id).is_some())
            .collect();
        bookings.sort_by_key(|b| b.window.start.clone());
        Ok(bookings)
    }

    /// Bookings with activity the user hasn't seen yet.
    pub fn unread_count(&self, user_id: &str) -> anyhow::Result<usize> {
        let count = self
            .store
            .scan_bookings()?
            .into_iter()
            .filter(|b| match b.party_role(user_id) {
                Some(role) => !b.read_by(role),
                None => false,
            })
            .count();
        Ok(count)
    }

    /// Payment history touching a user, oldest first.
    pub fn payments_for(&self, user_id: &str) -> anyhow::Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .store
            .scan_payments()?
            .into_iter()
            .filter(|p| p.touches(user_id))
            .collect();
        payments.sort_by_key(|p| p.created_at.clone());
        Ok(payments)
    }

    pub fn balance_of(&self, user_id: &str) -> anyhow::Result<Money> {
        let user: UserRecord = self
            .store
            .fetch(user_key(user_id))?
            .ok_or_else(|| SettlementError::UnknownUser(user_id.to_owned()))?;
        Ok(user.balance)
    }

    pub fn student(&self, student_id: &str) -> anyhow::Result<StudentProfile> {
        self.store
            .fetch(student_key(student_id))?
            .ok_or_else(|| SettlementError::UnknownUser(student_id.to_owned()).into())
    }

    pub fn tutor(&self, tutor_id: &str) -> anyhow::Result<TutorProfile> {
        self.store
            .fetch(tutor_key(tutor_id))?
            .ok_or_else(|| SettlementError::UnknownUser(tutor_id.to_owned()).into())
    }
}

fn load_booking(
    tx: &TransactionalTree,
    booking_id: &str,
) -> ConflictableTransactionResult<Booking, SettlementError> {
    tx_fetch(tx, booking_key(booking_id))?.ok_or_else(|| {
        ConflictableTransactionError::Abort(SettlementError::UnknownBooking(
            booking_id.to_owned(),
        ))
    })
}

/// Return held funds to the student and record the `Refund` payment. Used by
/// decline and by the not-occurred path; keyed per booking so a retry lands
/// on the same record.
fn refund_in_tx(
    tx: &TransactionalTree,
    booking: &Booking,
    refund_key: &str,
    now: &TimeStamp<chrono::Utc>,
) -> ConflictableTransactionResult<(), SettlementError> {
    ledger::credit(tx, &booking.student.id, booking.cost)?;
    let refund = Payment {
        payer_id: booking.student.id.clone(),
        payer_name: booking.student.name.clone(),
        recipient_id: None,
        recipient_name: None,
        amount: booking.cost,
        method: PaymentMethod::Refund,
        booking_id: Some(booking.id.clone()),
        created_at: now.clone(),
    };
    tx_put(tx, payment_key(refund_key), &refund)?;
    Ok(())
}
