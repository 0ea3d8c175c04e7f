//! Booking service abstraction.
//!
//! [`BookingApi`] lists every remote operation the client consumes. Two implementations exist:
//!
//! - [`http::HttpBookingApi`] talks JSON over HTTP to the real service.
//! - [`in_memory::InMemoryBookingApi`] keeps everything in process and enforces the same
//!   admission rules as the service; it backs the tests and the CLI's `--offline` mode.
//!
//! Rejections on the wire use the [`ApiRejection`] body, tagged by `code`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{Error, FieldError, Result};
use crate::models::bookings::{Booking, BookingCreate, BookingFilter, BookingUpdate, CancelBooking};
use crate::models::pagination::Page;
use crate::models::rooms::{Room, RoomCreate, RoomUpdate};
use crate::models::users::{LoginRequest, User, UserCreate, UserUpdate};
use crate::session::Session;
use crate::types::{BookingId, RoomId, UserId};
use crate::window::TimeWindow;

pub mod http;
pub mod in_memory;

#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn login(&self, credentials: &LoginRequest) -> Result<Session>;

    async fn list_rooms(&self, session: &Session) -> Result<Vec<Room>>;

    async fn get_room(&self, session: &Session, id: RoomId) -> Result<Room>;

    async fn create_room(&self, session: &Session, room: &RoomCreate) -> Result<Room>;

    async fn update_room(&self, session: &Session, id: RoomId, update: &RoomUpdate) -> Result<Room>;

    async fn delete_room(&self, session: &Session, id: RoomId) -> Result<()>;

    /// Rooms with no confirmed booking overlapping `window`, ordered by id.
    async fn available_rooms(&self, session: &Session, window: &TimeWindow) -> Result<Vec<Room>>;

    async fn list_bookings(&self, session: &Session, filter: &BookingFilter) -> Result<Page<Booking>>;

    async fn get_booking(&self, session: &Session, id: BookingId) -> Result<Booking>;

    /// Create a booking. The service applies the conflict policy and is the final authority.
    async fn create_booking(&self, session: &Session, booking: &BookingCreate) -> Result<Booking>;

    async fn update_booking(&self, session: &Session, id: BookingId, update: &BookingUpdate) -> Result<Booking>;

    async fn cancel_booking(&self, session: &Session, id: BookingId, cancel: &CancelBooking) -> Result<Booking>;

    async fn list_users(&self, session: &Session) -> Result<Vec<User>>;

    async fn create_user(&self, session: &Session, user: &UserCreate) -> Result<User>;

    async fn update_user(&self, session: &Session, id: UserId, update: &UserUpdate) -> Result<User>;

    async fn delete_user(&self, session: &Session, id: UserId) -> Result<()>;
}

/// Structured rejection body returned by the booking service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ApiRejection {
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    DurationOutOfBounds {
        #[serde(with = "humantime_serde")]
        duration: Duration,
        #[serde(with = "humantime_serde")]
        min: Duration,
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
    PastSchedulingNotAllowed {
        end: DateTime<Utc>,
    },
    Overlap {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        conflicting_booking_ids: Vec<BookingId>,
    },
    NotFound {
        resource: String,
        id: String,
    },
    AuthorizationDenied {
        action: String,
    },
    Validation {
        errors: Vec<FieldError>,
    },
}

impl ApiRejection {
    /// HTTP status the service uses for this rejection.
    pub fn status(&self) -> u16 {
        match self {
            ApiRejection::InvalidWindow { .. }
            | ApiRejection::DurationOutOfBounds { .. }
            | ApiRejection::PastSchedulingNotAllowed { .. }
            | ApiRejection::Validation { .. } => 422,
            ApiRejection::Overlap { .. } => 409,
            ApiRejection::NotFound { .. } => 404,
            ApiRejection::AuthorizationDenied { .. } => 403,
        }
    }
}

impl From<ApiRejection> for Error {
    fn from(rejection: ApiRejection) -> Self {
        match rejection {
            ApiRejection::InvalidWindow { start, end } => Error::InvalidWindow { start, end },
            ApiRejection::DurationOutOfBounds { duration, min, max } => Error::DurationOutOfBounds { duration, min, max },
            ApiRejection::PastSchedulingNotAllowed { end } => Error::PastSchedulingNotAllowed { end },
            ApiRejection::Overlap {
                room_id,
                conflicting_booking_ids,
            } => Error::Overlap {
                room_id,
                conflicting: conflicting_booking_ids,
            },
            ApiRejection::NotFound { resource, id } => Error::NotFound { resource, id },
            ApiRejection::AuthorizationDenied { action } => Error::AuthorizationDenied { action },
            ApiRejection::Validation { errors } => Error::Validation { errors },
        }
    }
}
