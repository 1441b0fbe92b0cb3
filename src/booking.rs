//! Booking documents and the lifecycle vocabulary.
//!
//! Status transitions are monotonic: `Pending -> {Accepted, Declined}`,
//! `Accepted -> {Completed, DidntHappen}`. `Declined`, `Completed` and
//! `DidntHappen` are terminal. Ack flags only ever go false -> true.
use crate::error::SettlementError;
use crate::money::Money;
use crate::timestamp::TimeStamp;
use crate::user::Role;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Declined,
    #[n(3)]
    Completed,
    #[n(4)]
    DidntHappen,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    #[n(0)]
    Online,
    #[n(1)]
    InPerson,
}

/// Tutor's answer to a pending booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingDecision {
    Accept,
    Decline,
}

/// What a party reports about an accepted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Complete,
    DidntHappen,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct SessionWindow {
    #[n(0)]
    pub start: TimeStamp<Utc>,
    #[n(1)]
    pub end: TimeStamp<Utc>,
}

impl SessionWindow {
    pub fn new(start: TimeStamp<Utc>, end: TimeStamp<Utc>) -> Self {
        Self { start, end }
    }
    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }
    pub fn duration_minutes(&self) -> i64 {
        (self.end.to_datetime_utc() - self.start.to_datetime_utc()).num_minutes()
    }
}

/// Embedded copy of a party at request time. Bookings are history and must
/// stay readable even if the live profile later changes.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone)]
pub struct PartySnapshot {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone)]
pub struct Booking {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub student: PartySnapshot,
    #[n(2)]
    pub tutor: PartySnapshot,
    #[n(3)]
    pub course: String,
    #[n(4)]
    pub mode: SessionMode,
    #[n(5)]
    pub custom_request: Option<String>,
    #[n(6)]
    pub window: SessionWindow,
    // fixed at creation, never recomputed
    #[n(7)]
    pub cost: Money,
    #[n(8)]
    pub status: BookingStatus,
    #[n(9)]
    pub student_ack: bool,
    #[n(10)]
    pub tutor_ack: bool,
    #[n(11)]
    pub reviewed_by: Vec<String>,
    #[n(12)]
    pub read_by_student: bool,
    #[n(13)]
    pub read_by_tutor: bool,
    #[n(14)]
    pub created_at: TimeStamp<Utc>,
}

impl Booking {
    /// Which side of the booking a user id is on, if any.
    pub fn party_role(&self, user_id: &str) -> Option<Role> {
        if self.student.id == user_id {
            Some(Role::Student)
        } else if self.tutor.id == user_id {
            Some(Role::Tutor)
        } else {
            None
        }
    }
    pub fn counterparty(&self, user_id: &str) -> Option<&PartySnapshot> {
        match self.party_role(user_id)? {
            Role::Student => Some(&self.tutor),
            Role::Tutor => Some(&self.student),
        }
    }
    pub fn has_review_from(&self, user_id: &str) -> bool {
        self.reviewed_by.iter().any(|id| id == user_id)
    }
    /// A lifecycle transition is news for the party that didn't act: the
    /// actor's read flag is set, the counterparty's cleared.
    pub fn note_action_by(&mut self, actor: Role) {
        match actor {
            Role::Student => {
                self.read_by_student = true;
                self.read_by_tutor = false;
            }
            Role::Tutor => {
                self.read_by_tutor = true;
                self.read_by_student = false;
            }
        }
    }
    pub fn read_by(&self, role: Role) -> bool {
        match role {
            Role::Student => self.read_by_student,
            Role::Tutor => self.read_by_tutor,
        }
    }
}

// Also used for constructing drafts before anything is persisted
#[derive(Debug, Default)]
pub struct BookingRequest {
    pub student_id: Option<String>,
    pub tutor_id: Option<String>,
    pub course: Option<String>,
    pub mode: Option<SessionMode>,
    pub custom_request: Option<String>,
    pub window: Option<SessionWindow>,
}

impl BookingRequest {
    /// Construct a new draft object, filled in via the builder methods below
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_student(mut self, student_id: &str) -> Self {
        self.student_id = Some(student_id.to_owned());
        self
    }
    pub fn with_tutor(mut self, tutor_id: &str) -> Self {
        self.tutor_id = Some(tutor_id.to_owned());
        self
    }
    pub fn set_course(mut self, course: &str) -> Self {
        self.course = Some(course.to_owned());
        self
    }
    pub fn set_mode(mut self, mode: SessionMode) -> Self {
        self.mode = Some(mode);
        self
    }
    pub fn set_custom_request(mut self, text: &str) -> Self {
        self.custom_request = Some(text.to_owned());
        self
    }
    pub fn set_window(mut self, window: SessionWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Checks fields and performs validation, returning the parts the
    /// service needs to build the persisted booking.
    pub fn validate(self) -> anyhow::Result<ValidatedRequest> {
        let student_id = self
            .student_id
            .ok_or_else(|| anyhow::Error::msg("student id is not set"))?;
        let tutor_id = self
            .tutor_id
            .ok_or_else(|| anyhow::Error::msg("tutor id is not set"))?;
        let course = self
            .course
            .ok_or_else(|| anyhow::Error::msg("course is not set"))?;
        let mode = self
            .mode
            .ok_or_else(|| anyhow::Error::msg("session mode is not set"))?;
        let window = self
            .window
            .ok_or_else(|| anyhow::Error::msg("session window is not set"))?;

        if !window.is_valid() {
            return Err(SettlementError::InvalidWindow.into());
        }

        Ok(ValidatedRequest {
            student_id,
            tutor_id,
            course,
            mode,
            custom_request: self.custom_request,
            window,
        })
    }
}

/// A draft that passed validation.
#[derive(Debug)]
pub struct ValidatedRequest {
    pub student_id: String,
    pub tutor_id: String,
    pub course: String,
    pub mode: SessionMode,
    pub custom_request: Option<String>,
    pub window: SessionWindow,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(h_start: u32, h_end: u32) -> SessionWindow {
        SessionWindow::new(
            TimeStamp::new_with(2026, 3, 1, h_start, 0, 0),
            TimeStamp::new_with(2026, 3, 1, h_end, 0, 0),
        )
    }

    #[test]
    fn window_must_end_after_start() {
        assert!(window(10, 12).is_valid());
        assert!(!window(12, 10).is_valid());
        assert!(!window(10, 10).is_valid());
    }

    #[test]
    fn duration_is_in_minutes() {
        assert_eq!(window(10, 12).duration_minutes(), 120);
    }

    #[test]
    fn draft_validation_requires_all_fields() {
        let draft = BookingRequest::new()
            .from_student("student_a")
            .with_tutor("tutor_b")
            .set_mode(SessionMode::Online)
            .set_window(window(10, 11));

        // course missing
        assert!(draft.validate().is_err());
    }

    #[test]
    fn draft_validation_rejects_inverted_window() {
        let draft = BookingRequest::new()
            .from_student("student_a")
            .with_tutor("tutor_b")
            .set_course("algebra")
            .set_mode(SessionMode::InPerson)
            .set_window(window(12, 10));

        let err = draft.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SettlementError>(),
            Some(SettlementError::InvalidWindow)
        ));
    }
}
