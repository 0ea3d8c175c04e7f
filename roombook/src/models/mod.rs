//! Data transfer types exchanged with the booking service.

pub mod bookings;
pub mod pagination;
pub mod rooms;
pub mod users;
