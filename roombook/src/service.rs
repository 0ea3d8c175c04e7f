//! The booking workflow as seen by one signed-in user.
//!
//! [`BookingService`] ties together the remote [`BookingApi`], the short-lived [`ResourceStore`]
//! cache, the user's recoverable drafts and the acting [`Session`]. Every operation follows the
//! same shape:
//!
//! 1. gate on the session's role (and ownership for existing bookings)
//! 2. run the checks that need no network (draft fields, window ordering)
//! 3. call the service, surfacing its rejection unchanged
//! 4. invalidate the cache kinds the mutation affects
//!
//! Conflict checks are never decided here. The availability answer is advisory and the
//! service's `Overlap` rejection is final.

use bon::Builder;
use chrono::{DateTime, SecondsFormat, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::api::BookingApi;
use crate::cache::{Cached, ResourceStore};
use crate::draft::{BookingDraft, DraftRules};
use crate::draft_store::DraftStore;
use crate::errors::{DraftField, Error, FieldError, Result};
use crate::models::bookings::{Booking, BookingFilter, BookingUpdate, CancelBooking, duplicate_attendees};
use crate::models::pagination::Page;
use crate::models::rooms::{Room, RoomCreate, RoomUpdate};
use crate::models::users::{User, UserCreate, UserUpdate};
use crate::session::Session;
use crate::types::{Action, BookingId, ResourceKind, RoomId, UserId};
use crate::window::TimeWindow;

#[derive(Clone, Builder)]
pub struct BookingService {
    api: Arc<dyn BookingApi>,
    cache: Arc<dyn ResourceStore>,
    drafts: Arc<dyn DraftStore>,
    session: Session,
    #[builder(default)]
    rules: DraftRules,
}

impl BookingService {
    pub fn session(&self) -> &Session {
        &self.session
    }

    async fn cached<T, Fut>(
        &self,
        kind: ResourceKind,
        key: String,
        extract: impl Fn(Cached) -> Option<Arc<T>>,
        wrap: impl Fn(Arc<T>) -> Cached,
        fetch: Fut,
    ) -> Result<T>
    where
        T: Clone,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.cache.get(kind, &key).await.and_then(extract) {
            debug!(%kind, key = %key, "Serving from cache");
            return Ok(T::clone(&hit));
        }
        let value = Arc::new(fetch.await?);
        self.cache.insert(kind, key, wrap(Arc::clone(&value))).await;
        Ok(Arc::unwrap_or_clone(value))
    }

    async fn invalidate(&self, kinds: &[ResourceKind]) {
        for kind in kinds {
            self.cache.invalidate(*kind).await;
        }
    }

    // ------------------------------------------------------------------------
    // Rooms and availability
    // ------------------------------------------------------------------------

    /// Rooms free during `[start, end)`, ordered by id.
    #[instrument(skip(self), err)]
    pub async fn available_rooms(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Room>> {
        let window = TimeWindow::new(start, end)?;
        self.session.authorize(Action::ReadRooms)?;

        let key = format!(
            "{}/{}",
            window.start().to_rfc3339_opts(SecondsFormat::Secs, true),
            window.end().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let fetch = async {
            let mut rooms = self.api.available_rooms(&self.session, &window).await?;
            rooms.sort_by_key(|r| r.id);
            Ok(rooms)
        };
        self.cached(ResourceKind::Availability, key, rooms_entry, |r| Cached::Rooms(r), fetch)
            .await
    }

    pub async fn rooms(&self) -> Result<Vec<Room>> {
        self.session.authorize(Action::ReadRooms)?;
        self.cached(
            ResourceKind::Rooms,
            "all".to_string(),
            rooms_entry,
            |r| Cached::Rooms(r),
            self.api.list_rooms(&self.session),
        )
        .await
    }

    pub async fn room(&self, id: RoomId) -> Result<Room> {
        self.session.authorize(Action::ReadRooms)?;
        self.cached(
            ResourceKind::Rooms,
            id.to_string(),
            |c| match c {
                Cached::Room(r) => Some(r),
                _ => None,
            },
            Cached::Room,
            self.api.get_room(&self.session, id),
        )
        .await
    }

    #[instrument(skip(self, room), fields(name = %room.name), err)]
    pub async fn create_room(&self, room: &RoomCreate) -> Result<Room> {
        self.session.authorize(Action::ManageRooms)?;
        let created = self.api.create_room(&self.session, room).await?;
        self.invalidate(&[ResourceKind::Rooms, ResourceKind::Availability]).await;
        info!(room_id = created.id, "Room created");
        Ok(created)
    }

    #[instrument(skip(self, update), err)]
    pub async fn update_room(&self, id: RoomId, update: &RoomUpdate) -> Result<Room> {
        self.session.authorize(Action::ManageRooms)?;
        let updated = self.api.update_room(&self.session, id, update).await?;
        self.invalidate(&[ResourceKind::Rooms, ResourceKind::Availability]).await;
        Ok(updated)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_room(&self, id: RoomId) -> Result<()> {
        self.session.authorize(Action::ManageRooms)?;
        self.api.delete_room(&self.session, id).await?;
        self.invalidate(&[ResourceKind::Rooms, ResourceKind::Availability]).await;
        info!(room_id = id, "Room deleted");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Bookings
    // ------------------------------------------------------------------------

    pub async fn bookings(&self, filter: &BookingFilter) -> Result<Page<Booking>> {
        self.session.authorize(Action::ReadBookings)?;
        self.cached(
            ResourceKind::Bookings,
            filter.cache_key(),
            |c| match c {
                Cached::Bookings(page) => Some(page),
                _ => None,
            },
            Cached::Bookings,
            self.api.list_bookings(&self.session, filter),
        )
        .await
    }

    pub async fn booking(&self, id: BookingId) -> Result<Booking> {
        self.session.authorize(Action::ReadBookings)?;
        self.cached(
            ResourceKind::Bookings,
            format!("id:{id}"),
            |c| match c {
                Cached::Booking(b) => Some(b),
                _ => None,
            },
            Cached::Booking,
            self.api.get_booking(&self.session, id),
        )
        .await
    }

    /// Validate the draft locally and submit it.
    ///
    /// On success the user's saved draft is discarded. On any failure the draft is kept so the
    /// user can fix and resubmit it.
    #[instrument(skip_all, fields(user_id = self.session.user_id(), room_id = ?draft.room_id), err)]
    pub async fn submit_draft(&self, draft: &BookingDraft) -> Result<Booking> {
        match self.try_submit(draft).await {
            Ok(booking) => {
                if let Err(e) = self.drafts.discard(self.session.user_id()).await {
                    warn!(error = %e, "Failed to discard submitted draft");
                }
                Ok(booking)
            }
            Err(err) => {
                if let Err(e) = self.drafts.save(self.session.user_id(), draft).await {
                    warn!(error = %e, "Failed to keep draft after rejected submission");
                }
                Err(err)
            }
        }
    }

    async fn try_submit(&self, draft: &BookingDraft) -> Result<Booking> {
        self.session.authorize(Action::CreateBooking)?;
        let payload = draft.validate(&self.rules)?;
        let booking = self.api.create_booking(&self.session, &payload).await?;
        self.invalidate(&[ResourceKind::Bookings, ResourceKind::Availability]).await;
        info!(booking_id = booking.id, "Booking confirmed");
        Ok(booking)
    }

    #[instrument(skip(self, update), err)]
    pub async fn update_booking(&self, id: BookingId, update: &BookingUpdate) -> Result<Booking> {
        let current = self.api.get_booking(&self.session, id).await?;
        self.session.authorize(Action::ModifyBooking {
            owner: current.created_by.id,
        })?;

        if update.touches_schedule() {
            TimeWindow::new(
                update.start_time.unwrap_or(current.start_time),
                update.end_time.unwrap_or(current.end_time),
            )?;
        }
        if let Some(attendees) = &update.attendees {
            let duplicates = duplicate_attendees(attendees);
            if !duplicates.is_empty() {
                let ids = duplicates.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
                return Err(Error::Validation {
                    errors: vec![FieldError::new(
                        DraftField::Attendees,
                        format!("contains duplicate user ids: {ids}"),
                    )],
                });
            }
        }

        let updated = self.api.update_booking(&self.session, id, update).await?;
        self.invalidate(&[ResourceKind::Bookings, ResourceKind::Availability]).await;
        Ok(updated)
    }

    #[instrument(skip(self), err)]
    pub async fn cancel_booking(&self, id: BookingId) -> Result<Booking> {
        let current = self.api.get_booking(&self.session, id).await?;
        self.session.authorize(Action::ModifyBooking {
            owner: current.created_by.id,
        })?;

        let cancel = CancelBooking {
            user_id: self.session.user_id(),
        };
        let cancelled = self.api.cancel_booking(&self.session, id, &cancel).await?;
        self.invalidate(&[ResourceKind::Bookings, ResourceKind::Availability]).await;
        info!(booking_id = id, "Booking cancelled");
        Ok(cancelled)
    }

    // ------------------------------------------------------------------------
    // Drafts
    // ------------------------------------------------------------------------

    pub async fn save_draft(&self, draft: &BookingDraft) -> Result<()> {
        self.drafts.save(self.session.user_id(), draft).await
    }

    pub async fn saved_draft(&self) -> Result<Option<BookingDraft>> {
        self.drafts.load(self.session.user_id()).await
    }

    pub async fn discard_draft(&self) -> Result<()> {
        self.drafts.discard(self.session.user_id()).await
    }

    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    pub async fn users(&self) -> Result<Vec<User>> {
        self.session.authorize(Action::ReadUsers)?;
        self.cached(
            ResourceKind::Users,
            "all".to_string(),
            |c| match c {
                Cached::Users(u) => Some(u),
                _ => None,
            },
            Cached::Users,
            self.api.list_users(&self.session),
        )
        .await
    }

    #[instrument(skip(self, user), fields(email = %user.email), err)]
    pub async fn create_user(&self, user: &UserCreate) -> Result<User> {
        self.session.authorize(Action::ManageUsers)?;
        let created = self.api.create_user(&self.session, user).await?;
        self.invalidate(&[ResourceKind::Users]).await;
        Ok(created)
    }

    #[instrument(skip(self, update), err)]
    pub async fn update_user(&self, id: UserId, update: &UserUpdate) -> Result<User> {
        self.session.authorize(Action::ManageUsers)?;
        let updated = self.api.update_user(&self.session, id, update).await?;
        self.invalidate(&[ResourceKind::Users]).await;
        Ok(updated)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_user(&self, id: UserId) -> Result<()> {
        self.session.authorize(Action::ManageUsers)?;
        self.api.delete_user(&self.session, id).await?;
        self.invalidate(&[ResourceKind::Users]).await;
        Ok(())
    }
}

fn rooms_entry(cached: Cached) -> Option<Arc<Vec<Room>>> {
    match cached {
        Cached::Rooms(rooms) => Some(rooms),
        _ => None,
    }
}
