//! Common type definitions and the role-based permission system.
//!
//! # ID Types
//!
//! Every entity exposed by the booking API is identified by an integer. The aliases below keep
//! signatures readable:
//!
//! - [`RoomId`]: Meeting room identifier
//! - [`BookingId`]: Booking identifier
//! - [`UserId`]: User (employee) identifier
//!
//! # Permission System
//!
//! Access decisions are made from two closed enums:
//!
//! - [`Role`]: Who is acting (`Admin` or `Employee`)
//! - [`Action`]: What they are trying to do
//!
//! [`Role::permits`] matches exhaustively on both, so adding a new action forces every role to
//! take a position on it.

use serde::{Deserialize, Serialize};
use std::fmt;

// Type aliases for IDs
pub type RoomId = i64;
pub type BookingId = i64;
pub type UserId = i64;

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employee,
}

/// Gated operations. Ownership-scoped actions carry the owner of the target so the decision can
/// be made without another lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadRooms,
    ManageRooms,
    ReadUsers,
    ManageUsers,
    ReadBookings,
    CreateBooking,
    ModifyBooking { owner: UserId },
}

impl Role {
    /// Decide whether `actor` holding this role may perform `action`.
    pub fn permits(&self, actor: UserId, action: Action) -> bool {
        match (self, action) {
            (Role::Admin, _) => true,
            (Role::Employee, Action::ReadRooms | Action::ReadUsers | Action::ReadBookings | Action::CreateBooking) => true,
            (Role::Employee, Action::ManageRooms | Action::ManageUsers) => false,
            (Role::Employee, Action::ModifyBooking { owner }) => owner == actor,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Employee => write!(f, "employee"),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::ReadRooms => write!(f, "read rooms"),
            Action::ManageRooms => write!(f, "manage rooms"),
            Action::ReadUsers => write!(f, "read users"),
            Action::ManageUsers => write!(f, "manage users"),
            Action::ReadBookings => write!(f, "read bookings"),
            Action::CreateBooking => write!(f, "create bookings"),
            Action::ModifyBooking { owner } => write!(f, "modify bookings owned by user {owner}"),
        }
    }
}

/// Cache invalidation unit. Mutations invalidate whole kinds rather than individual keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Rooms,
    Bookings,
    Users,
    Availability,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Rooms => write!(f, "rooms"),
            ResourceKind::Bookings => write!(f, "bookings"),
            ResourceKind::Users => write!(f, "users"),
            ResourceKind::Availability => write!(f, "availability"),
        }
    }
}
