//! User documents and their role-specific mirrors.
//!
//! Every user has a record in the `users` collection carrying the balance.
//! Tutors and students additionally carry a role mirror (`tutors/` or
//! `students/`) with the same balance plus role-specific fields. The two
//! copies are always written in the same transaction, never separately.
use crate::money::Money;
use crate::timestamp::TimeStamp;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    #[n(0)]
    Student,
    #[n(1)]
    Tutor,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone)]
pub struct UserRecord {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub role: Role,
    #[n(3)]
    pub balance: Money,
}

/// A submitted review, embedded in the target's profile. Immutable once
/// appended.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Review {
    #[n(0)]
    pub reviewer_name: String,
    #[n(1)]
    pub rating: u8,
    #[n(2)]
    pub text: String,
    #[n(3)]
    pub submitted_at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone)]
pub struct TutorProfile {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub hourly_rate: Money,
    #[n(3)]
    pub courses: Vec<String>,
    #[n(4)]
    pub balance: Money,
    // running average in tenths of a star, 0 until the first review lands
    #[n(5)]
    pub rating_tenths: u32,
    #[n(6)]
    pub rating_count: u32,
    #[n(7)]
    pub reviews: Vec<Review>,
}

impl TutorProfile {
    pub fn offers(&self, course: &str) -> bool {
        self.courses.iter().any(|c| c == course)
    }
    /// One-decimal average as a float, for display.
    pub fn average_rating(&self) -> f64 {
        self.rating_tenths as f64 / 10.0
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone)]
pub struct StudentProfile {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub balance: Money,
    #[n(3)]
    pub reviews: Vec<Review>,
}
