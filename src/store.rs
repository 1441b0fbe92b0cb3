//! Document store access.
//!
//! Collections live in one sled keyspace under a per-collection prefix
//! (`users/`, `tutors/`, `students/`, `bookings/`, `payments/`). Keeping
//! them in a single tree means every multi-document write the lifecycle
//! needs runs as one serializable `sled` transaction: the debit+create of a
//! request, the ack+settle of completion, and the rating read-modify-write
//! all commit or abort together.
use crate::booking::Booking;
use crate::error::SettlementError;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use std::sync::Arc;
use std::time::Duration;

const USERS: &str = "users/";
const TUTORS: &str = "tutors/";
const STUDENTS: &str = "students/";
const BOOKINGS: &str = "bookings/";
const PAYMENTS: &str = "payments/";

pub(crate) fn user_key(id: &str) -> Vec<u8> {
    [USERS.as_bytes(), id.as_bytes()].concat()
}
pub(crate) fn tutor_key(id: &str) -> Vec<u8> {
    [TUTORS.as_bytes(), id.as_bytes()].concat()
}
pub(crate) fn student_key(id: &str) -> Vec<u8> {
    [STUDENTS.as_bytes(), id.as_bytes()].concat()
}
pub(crate) fn booking_key(id: &str) -> Vec<u8> {
    [BOOKINGS.as_bytes(), id.as_bytes()].concat()
}
pub(crate) fn payment_key(id: &str) -> Vec<u8> {
    [PAYMENTS.as_bytes(), id.as_bytes()].concat()
}

/// Documents are rejected rather than trusted: a decode failure surfaces as
/// `Codec`, never a default value.
pub(crate) fn decode<T>(bytes: &[u8]) -> Result<T, SettlementError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(|e| SettlementError::Codec(e.to_string()))
}

pub(crate) fn encode<T: minicbor::Encode<()>>(doc: &T) -> Result<Vec<u8>, SettlementError> {
    minicbor::to_vec(doc).map_err(|e| SettlementError::Codec(e.to_string()))
}

/// Transactional read of a typed document.
pub(crate) fn tx_fetch<T>(
    tx: &TransactionalTree,
    key: Vec<u8>,
) -> ConflictableTransactionResult<Option<T>, SettlementError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tx.get(key)? {
        Some(bytes) => {
            let doc = decode(&bytes).map_err(ConflictableTransactionError::Abort)?;
            Ok(Some(doc))
        }
        None => Ok(None),
    }
}

/// Transactional write of a typed document.
pub(crate) fn tx_put<T: minicbor::Encode<()>>(
    tx: &TransactionalTree,
    key: Vec<u8>,
    doc: &T,
) -> ConflictableTransactionResult<(), SettlementError> {
    let bytes = encode(doc).map_err(ConflictableTransactionError::Abort)?;
    tx.insert(key, bytes)?;
    Ok(())
}

pub struct Store {
    db: Arc<sled::Db>,
}

impl Store {
    pub fn new(db: Arc<sled::Db>) -> Self {
        Self { db }
    }

    /// Run one serializable transaction over the whole keyspace.
    pub(crate) fn run<A>(
        &self,
        f: impl Fn(&TransactionalTree) -> ConflictableTransactionResult<A, SettlementError>,
    ) -> Result<A, SettlementError> {
        self.db.transaction(f).map_err(|e| match e {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => SettlementError::Store(err),
        })
    }

    /// Non-transactional point read.
    pub(crate) fn fetch<T>(&self, key: Vec<u8>) -> Result<Option<T>, SettlementError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match self.db.get(key).map_err(SettlementError::Store)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn scan_bookings(&self) -> Result<Vec<Booking>, SettlementError> {
        self.scan(BOOKINGS)
    }

    pub(crate) fn scan_payments(&self) -> Result<Vec<crate::payment::Payment>, SettlementError> {
        self.scan(PAYMENTS)
    }

    fn scan<T>(&self, prefix: &str) -> Result<Vec<T>, SettlementError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let mut out = Vec::new();
        for entry in self.db.scan_prefix(prefix) {
            let (_, value) = entry.map_err(SettlementError::Store)?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    /// Subscribe to booking creations and updates.
    pub fn watch_bookings(&self) -> BookingWatcher {
        BookingWatcher {
            inner: self.db.watch_prefix(BOOKINGS),
        }
    }
}

/// Stream of booking snapshots, one per committed create or update.
pub struct BookingWatcher {
    inner: sled::Subscriber,
}

impl BookingWatcher {
    /// Blocks until the next change; `None` once the store shuts down.
    pub fn next_change(&mut self) -> Option<Result<Booking, SettlementError>> {
        loop {
            match self.inner.next()? {
                sled::Event::Insert { value, .. } => return Some(decode(&value)),
                // bookings are never physically deleted
                sled::Event::Remove { .. } => continue,
            }
        }
    }

    /// Like `next_change` but gives up after `timeout`.
    pub fn next_change_timeout(
        &mut self,
        timeout: Duration,
    ) -> Option<Result<Booking, SettlementError>> {
        loop {
            match self.inner.next_timeout(timeout) {
                Ok(sled::Event::Insert { value, .. }) => return Some(decode(&value)),
                Ok(sled::Event::Remove { .. }) => continue,
                Err(_) => return None,
            }
        }
    }
}
