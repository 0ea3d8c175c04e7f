use crate::errors::{Error, Result};
use crate::models::pagination::{clamp_limit, clamp_skip};
use crate::models::users::UserSummary;
use crate::types::{BookingId, RoomId, UserId};
use crate::window::TimeWindow;
use bon::Builder;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Booking lifecycle state. A draft has no status until the service accepts it as `Confirmed`;
/// `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        match (self, next) {
            (BookingStatus::Confirmed, BookingStatus::Confirmed) => true,
            (BookingStatus::Confirmed, BookingStatus::Cancelled) => true,
            (BookingStatus::Cancelled, _) => false,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub room_id: RoomId,
    pub created_by: UserSummary,
    pub status: BookingStatus,
    #[serde(default)]
    pub attendees: Vec<UserSummary>,
}

impl Booking {
    pub fn window(&self) -> Result<TimeWindow> {
        TimeWindow::new(self.start_time, self.end_time)
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }

    /// Move to `next`, refusing any transition out of `Cancelled`.
    pub fn transition(&mut self, next: BookingStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Rejected {
                status: 409,
                message: format!("Booking {} is {} and cannot become {}", self.id, self.status, next),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Returns the user ids that appear more than once, in first-repeat order.
pub fn duplicate_attendees(attendees: &[UserSummary]) -> Vec<UserId> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for attendee in attendees {
        if !seen.insert(attendee.id) && !duplicates.contains(&attendee.id) {
            duplicates.push(attendee.id);
        }
    }
    duplicates
}

/// Normalized payload submitted to create a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingCreate {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub room_id: RoomId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<UserSummary>,
}

/// Partial update. Absent fields are left unchanged by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<UserSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BookingStatus>,
}

impl BookingUpdate {
    /// True if applying this update can move the booking in time or space.
    pub fn touches_schedule(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some() || self.room_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelBooking {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingSort {
    #[default]
    #[serde(rename = "start_time")]
    StartAsc,
    #[serde(rename = "-start_time")]
    StartDesc,
    #[serde(rename = "title")]
    Title,
}

/// Query parameters for listing bookings.
///
/// ```ignore
/// let filter = BookingFilter::builder()
///     .room_id(101)
///     .status(BookingStatus::Confirmed)
///     .limit(50)
///     .build();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct BookingFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BookingStatus>,
    /// Matches bookings whose start falls on this UTC date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<BookingSort>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.room_id.is_none_or(|room| booking.room_id == room)
            && self.created_by.is_none_or(|user| booking.created_by.id == user)
            && self.status.is_none_or(|status| booking.status == status)
            && self.date.is_none_or(|date| booking.start_time.date_naive() == date)
    }

    #[inline]
    pub fn skip(&self) -> i64 {
        clamp_skip(self.skip)
    }

    #[inline]
    pub fn limit(&self) -> i64 {
        clamp_limit(self.limit)
    }

    /// Stable cache key covering every filter field.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
