use crate::types::{BookingId, RoomId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The window's end is not after its start
    #[error("Invalid time window: end ({end}) must be after start ({start})")]
    InvalidWindow { start: DateTime<Utc>, end: DateTime<Utc> },

    /// Window is valid but shorter than the minimum or longer than the maximum duration
    #[error("{}", duration_message(.duration, .min, .max))]
    DurationOutOfBounds { duration: Duration, min: Duration, max: Duration },

    /// A confirmed booking may not lie entirely in the past
    #[error("Cannot schedule a booking that ends before now ({end})")]
    PastSchedulingNotAllowed { end: DateTime<Utc> },

    /// Another confirmed booking on the same room intersects the requested window
    #[error("{}", overlap_message(.room_id))]
    Overlap { room_id: Option<RoomId>, conflicting: Vec<BookingId> },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Acting user lacks the role or ownership required
    #[error("Not allowed to {action}")]
    AuthorizationDenied { action: String },

    /// Field-level validation failures, resolved locally before any network call
    #[error("Invalid booking draft: {}", join_fields(.errors))]
    Validation { errors: Vec<FieldError> },

    /// The server rejected the request with a reason outside the named kinds
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// No response was received from the booking service
    #[error("Booking service unreachable: {message}")]
    NetworkUnavailable { message: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    UnexpectedFailure(#[from] anyhow::Error),
}

fn duration_message(duration: &Duration, min: &Duration, max: &Duration) -> String {
    format!(
        "Booking duration {} is outside the allowed range of {} to {}",
        humantime::format_duration(*duration),
        humantime::format_duration(*min),
        humantime::format_duration(*max)
    )
}

fn overlap_message(room_id: &Option<RoomId>) -> String {
    match room_id {
        Some(id) => format!("Room {id} is already booked during the requested window"),
        None => "The room is already booked during the requested window".to_string(),
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

/// Form fields of a booking draft that can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftField {
    Title,
    Description,
    Date,
    StartTime,
    EndTime,
    Room,
    Attendees,
}

impl fmt::Display for DraftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DraftField::Title => "title",
            DraftField::Description => "description",
            DraftField::Date => "date",
            DraftField::StartTime => "start_time",
            DraftField::EndTime => "end_time",
            DraftField::Room => "room",
            DraftField::Attendees => "attendees",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: DraftField,
    pub message: String,
}

impl FieldError {
    pub fn new(field: DraftField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Error {
    /// Stable machine-readable code, shared with the wire format of API rejections.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidWindow { .. } => "invalid_window",
            Error::DurationOutOfBounds { .. } => "duration_out_of_bounds",
            Error::PastSchedulingNotAllowed { .. } => "past_scheduling_not_allowed",
            Error::Overlap { .. } => "overlap",
            Error::NotFound { .. } => "not_found",
            Error::AuthorizationDenied { .. } => "authorization_denied",
            Error::Validation { .. } => "validation",
            Error::Rejected { .. } => "rejected",
            Error::NetworkUnavailable { .. } => "network_unavailable",
            Error::UnexpectedFailure(_) => "unexpected_failure",
        }
    }

    /// True for errors detected without talking to the booking service.
    pub fn is_local(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Overlap { room_id, conflicting } if !conflicting.is_empty() => {
                let ids = conflicting.iter().map(|id| format!("#{id}")).collect::<Vec<_>>().join(", ");
                format!("{} (conflicts with {ids})", overlap_message(room_id))
            }
            Error::Validation { errors } => errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n"),
            Error::NetworkUnavailable { .. } => "The booking service could not be reached. Check your connection and try again.".to_string(),
            Error::UnexpectedFailure(_) => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_message_is_human_readable() {
        let err = Error::DurationOutOfBounds {
            duration: Duration::from_secs(5 * 60),
            min: Duration::from_secs(15 * 60),
            max: Duration::from_secs(8 * 3600),
        };
        assert_eq!(err.to_string(), "Booking duration 5m is outside the allowed range of 15m to 8h");
    }

    #[test]
    fn test_validation_message_lists_fields() {
        let err = Error::Validation {
            errors: vec![
                FieldError::new(DraftField::Title, "must be at least 3 characters"),
                FieldError::new(DraftField::Room, "is required"),
            ],
        };
        assert_eq!(err.to_string(), "Invalid booking draft: title: must be at least 3 characters; room: is required");
        assert!(err.is_local());
    }

    #[test]
    fn test_overlap_user_message_names_conflicts() {
        let err = Error::Overlap {
            room_id: Some(101),
            conflicting: vec![3, 9],
        };
        assert_eq!(err.code(), "overlap");
        assert_eq!(
            err.user_message(),
            "Room 101 is already booked during the requested window (conflicts with #3, #9)"
        );
        assert!(!err.is_local());
    }

    #[test]
    fn test_unexpected_failure_hides_details() {
        let err = Error::from(anyhow::anyhow!("connection pool exploded"));
        assert_eq!(err.user_message(), "An unexpected error occurred");
        assert_eq!(err.to_string(), "connection pool exploded");
    }
}
