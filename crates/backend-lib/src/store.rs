// ============================
// crates/backend-lib/src/store.rs
// ============================
//! Booking record store abstraction with in-memory and flat-file backends.
//!
//! The store is read-only from the gate's perspective; `put_booking` exists
//! for the seed/admin path and for tests. Lookup accepts three key forms:
//! exact booking id, exact payment reference, or a substring of the
//! meeting-link token. When more than one booking matches, precedence is
//! id, then payment ref, then link substring, first winner in id order.
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::{fs as tokio_fs, io::AsyncWriteExt};
use meetgate_common::Booking;
use crate::error::AppError;

/// Trait for booking store backends
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Resolve a lookup key to a booking, or `None` when nothing matches.
    /// An `Err` here is an infrastructure fault, never a business outcome.
    async fn find_booking(&self, lookup_key: &str) -> Result<Option<Booking>, AppError>;

    /// Insert or replace a booking record.
    async fn put_booking(&self, booking: Booking) -> Result<(), AppError>;

    /// All known bookings, in id order.
    async fn list_bookings(&self) -> Result<Vec<Booking>, AppError>;
}

/// Apply the three match strategies in precedence order against a snapshot
/// sorted by id, so multi-match behavior is deterministic.
pub fn resolve_lookup(bookings: &[Booking], lookup_key: &str) -> Option<Booking> {
    bookings
        .iter()
        .find(|b| b.id == lookup_key)
        .or_else(|| {
            bookings
                .iter()
                .find(|b| b.external_payment_ref == lookup_key)
        })
        .or_else(|| {
            bookings
                .iter()
                .find(|b| b.meeting_link_token.contains(lookup_key))
        })
        .cloned()
}

/// In-memory implementation backed by a `DashMap`, keyed by booking id.
#[derive(Clone, Default)]
pub struct MemoryBookingStore {
    bookings: Arc<DashMap<String, Booking>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Vec<Booking> {
        let mut all: Vec<Booking> = self
            .bookings
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn find_booking(&self, lookup_key: &str) -> Result<Option<Booking>, AppError> {
        Ok(resolve_lookup(&self.snapshot(), lookup_key))
    }

    async fn put_booking(&self, booking: Booking) -> Result<(), AppError> {
        self.bookings.insert(booking.id.clone(), booking);
        Ok(())
    }

    async fn list_bookings(&self) -> Result<Vec<Booking>, AppError> {
        Ok(self.snapshot())
    }
}

/// Flat-file implementation: one JSON line per booking in `bookings.jsonl`,
/// loaded into a `DashMap` at startup and appended on write.
#[derive(Clone)]
pub struct FlatFileBookingStore {
    root: PathBuf,
    bookings: Arc<DashMap<String, Booking>>,
}

impl FlatFileBookingStore {
    /// Open a store rooted at `root`, creating the directory if needed and
    /// loading any existing booking log.
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self, AppError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let bookings = Arc::new(DashMap::new());
        let path = root.join("bookings.jsonl");
        if path.exists() {
            let content = tokio_fs::read_to_string(&path).await?;
            for line in content.lines().filter(|line| !line.trim().is_empty()) {
                let booking: Booking = serde_json::from_str(line)?;
                bookings.insert(booking.id.clone(), booking);
            }
        }

        Ok(Self { root, bookings })
    }

    fn log_path(&self) -> PathBuf {
        self.root.join("bookings.jsonl")
    }

    fn snapshot(&self) -> Vec<Booking> {
        let mut all: Vec<Booking> = self
            .bookings
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

#[async_trait]
impl BookingStore for FlatFileBookingStore {
    async fn find_booking(&self, lookup_key: &str) -> Result<Option<Booking>, AppError> {
        Ok(resolve_lookup(&self.snapshot(), lookup_key))
    }

    /// Append a JSON line to `bookings.jsonl` and update the in-memory map.
    async fn put_booking(&self, booking: Booking) -> Result<(), AppError> {
        let json = serde_json::to_string(&booking)?;

        let mut file = tokio_fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .await
            .map_err(AppError::from)?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;

        self.bookings.insert(booking.id.clone(), booking);
        Ok(())
    }

    async fn list_bookings(&self) -> Result<Vec<Booking>, AppError> {
        Ok(self.snapshot())
    }
}
