//! Booking admission rules.
//!
//! [`ConflictPolicy::admit`] decides whether a candidate booking may coexist with the bookings
//! already on its room. Checks run in a fixed order and the first failure is reported:
//!
//! 1. window validity (`end > start`) - [`Error::InvalidWindow`]
//! 2. duration bounds - [`Error::DurationOutOfBounds`]
//! 3. no confirmed booking entirely in the past - [`Error::PastSchedulingNotAllowed`]
//! 4. no intersecting confirmed booking on the same room - [`Error::Overlap`]
//!
//! Cancelled bookings never conflict, and windows that merely touch (`a.end == b.start`) are
//! allowed.

use crate::errors::{Error, Result};
use crate::models::bookings::{Booking, BookingStatus};
use crate::types::{BookingId, RoomId};
use crate::window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConflictPolicy {
    /// Shortest bookable window (default: 15m)
    #[serde(with = "humantime_serde")]
    pub min_duration: Duration,
    /// Longest bookable window (default: 8h)
    #[serde(with = "humantime_serde")]
    pub max_duration: Duration,
    /// When true, updating an existing booking whose window is already in the past is not
    /// rejected with `PastSchedulingNotAllowed`. New bookings are always checked.
    pub allow_past_self_update: bool,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            min_duration: Duration::from_secs(15 * 60),
            max_duration: Duration::from_secs(8 * 60 * 60),
            allow_past_self_update: false,
        }
    }
}

/// A booking proposed for creation or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub room_id: RoomId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// The booking being updated; it is never compared against itself.
    pub exclude: Option<BookingId>,
    /// Status the booking would have once admitted.
    pub status: BookingStatus,
}

impl Candidate {
    pub fn new(room_id: RoomId, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            room_id,
            start,
            end,
            exclude: None,
            status: BookingStatus::Confirmed,
        }
    }

    /// Candidate describing `booking` itself, for re-admission after an update.
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            room_id: booking.room_id,
            start: booking.start_time,
            end: booking.end_time,
            exclude: Some(booking.id),
            status: booking.status,
        }
    }

    pub fn excluding(mut self, id: BookingId) -> Self {
        self.exclude = Some(id);
        self
    }
}

impl ConflictPolicy {
    /// Check the window alone: validity and duration bounds.
    pub fn check_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TimeWindow> {
        let window = TimeWindow::new(start, end)?;
        let duration = window.duration().to_std().unwrap_or(Duration::ZERO);
        if duration < self.min_duration || duration > self.max_duration {
            return Err(Error::DurationOutOfBounds {
                duration,
                min: self.min_duration,
                max: self.max_duration,
            });
        }
        Ok(window)
    }

    /// Admit or reject `candidate` against `existing`, which may contain bookings for any room
    /// in any state.
    #[instrument(skip(self, existing), fields(room_id = candidate.room_id, exclude = ?candidate.exclude))]
    pub fn admit<'a, I>(&self, candidate: &Candidate, existing: I, now: DateTime<Utc>) -> Result<()>
    where
        I: IntoIterator<Item = &'a Booking>,
    {
        let window = self.check_window(candidate.start, candidate.end)?;

        let is_self_update = candidate.exclude.is_some() && self.allow_past_self_update;
        if candidate.status == BookingStatus::Confirmed && window.is_past(now) && !is_self_update {
            return Err(Error::PastSchedulingNotAllowed { end: window.end() });
        }

        // A cancelled result never occupies the room
        if candidate.status == BookingStatus::Cancelled {
            return Ok(());
        }

        let conflicting: Vec<BookingId> = existing
            .into_iter()
            .filter(|b| b.room_id == candidate.room_id && b.is_confirmed())
            .filter(|b| Some(b.id) != candidate.exclude)
            .filter(|b| b.window().is_ok_and(|w| w.overlaps(&window)))
            .map(|b| b.id)
            .collect();

        if !conflicting.is_empty() {
            debug!(?conflicting, "Candidate overlaps existing bookings");
            return Err(Error::Overlap {
                room_id: Some(candidate.room_id),
                conflicting,
            });
        }

        Ok(())
    }
}
