//! Which rooms are free during a window.
//!
//! The answer is advisory: bookings can change between the query and a submission, so the
//! submission is checked again by the booking service.

use crate::models::bookings::Booking;
use crate::models::rooms::Room;
use crate::types::RoomId;
use crate::window::TimeWindow;
use std::collections::HashSet;

/// Rooms with no confirmed booking overlapping `window`, ordered by room id.
pub fn available_rooms<'a, R, B>(rooms: R, bookings: B, window: &TimeWindow) -> Vec<Room>
where
    R: IntoIterator<Item = &'a Room>,
    B: IntoIterator<Item = &'a Booking>,
{
    let busy: HashSet<RoomId> = bookings
        .into_iter()
        .filter(|b| b.is_confirmed())
        .filter(|b| b.window().is_ok_and(|w| w.overlaps(window)))
        .map(|b| b.room_id)
        .collect();

    let mut free: Vec<Room> = rooms.into_iter().filter(|r| !busy.contains(&r.id)).cloned().collect();
    free.sort_by_key(|r| r.id);
    free
}
