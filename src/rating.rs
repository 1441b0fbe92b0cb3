//! Review aggregation.
//!
//! Tutor ratings are a running one-decimal average kept in tenths, merged
//! under the store transaction that also appends the review, so two
//! concurrent reviews of the same tutor cannot lose an update.
use crate::error::SettlementError;
use crate::store::{self, tx_fetch, tx_put};
use crate::user::{Review, StudentProfile, TutorProfile};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};

/// Fold one rating into a running (average-in-tenths, count) pair, rounding
/// half-up to one decimal.
pub fn merge_rating(avg_tenths: u32, count: u32, rating: u8) -> (u32, u32) {
    let num = avg_tenths as u64 * count as u64 + rating as u64 * 10;
    let den = count as u64 + 1;
    let merged = (num + den / 2) / den;
    (merged as u32, count + 1)
}

/// Append a review to a tutor and fold its rating into the running average.
pub(crate) fn add_review_to_tutor(
    tx: &TransactionalTree,
    tutor_id: &str,
    review: Review,
) -> ConflictableTransactionResult<TutorProfile, SettlementError> {
    let mut profile: TutorProfile = tx_fetch(tx, store::tutor_key(tutor_id))?.ok_or_else(|| {
        ConflictableTransactionError::Abort(SettlementError::UnknownUser(tutor_id.to_owned()))
    })?;

    let (tenths, count) = merge_rating(profile.rating_tenths, profile.rating_count, review.rating);
    profile.rating_tenths = tenths;
    profile.rating_count = count;
    profile.reviews.push(review);

    tx_put(tx, store::tutor_key(tutor_id), &profile)?;
    Ok(profile)
}

/// Append a review to a student. Students carry reviews but no aggregate
/// rating.
pub(crate) fn add_review_to_student(
    tx: &TransactionalTree,
    student_id: &str,
    review: Review,
) -> ConflictableTransactionResult<StudentProfile, SettlementError> {
    let mut profile: StudentProfile =
        tx_fetch(tx, store::student_key(student_id))?.ok_or_else(|| {
            ConflictableTransactionError::Abort(SettlementError::UnknownUser(
                student_id.to_owned(),
            ))
        })?;

    profile.reviews.push(review);
    tx_put(tx, store::student_key(student_id), &profile)?;
    Ok(profile)
}
