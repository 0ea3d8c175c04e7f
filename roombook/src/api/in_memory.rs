//! In-process booking service.
//!
//! Holds rooms, bookings, users and sessions in memory and applies the same admission rules as
//! the remote service: every write checks and applies under a single write lock, and booking
//! writes go through [`ConflictPolicy::admit`], so confirmed bookings on a room never overlap. Data is lost when dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::BookingApi;
use crate::errors::{DraftField, Error, FieldError, Result};
use crate::models::bookings::{
    Booking, BookingCreate, BookingFilter, BookingSort, BookingStatus, BookingUpdate, CancelBooking, duplicate_attendees,
};
use crate::models::pagination::Page;
use crate::models::rooms::{Room, RoomCreate, RoomUpdate};
use crate::models::users::{LoginRequest, User, UserCreate, UserSummary, UserUpdate};
use crate::policy::{Candidate, ConflictPolicy};
use crate::session::Session;
use crate::types::{Action, BookingId, Role, RoomId, UserId};
use crate::window::TimeWindow;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct StoredUser {
    user: User,
    password: String,
}

#[derive(Default)]
struct State {
    rooms: BTreeMap<RoomId, Room>,
    bookings: BTreeMap<BookingId, Booking>,
    users: BTreeMap<UserId, StoredUser>,
    /// token -> user
    sessions: HashMap<String, UserId>,
    next_room_id: RoomId,
    next_booking_id: BookingId,
    next_user_id: UserId,
}

impl State {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    /// Resolve the acting user from the session token and check `action` against their current
    /// role, not the role cached in the session.
    fn authorize(&self, session: &Session, action: Action) -> Result<User> {
        let user = self
            .sessions
            .get(&session.token)
            .and_then(|id| self.users.get(id))
            .map(|stored| stored.user.clone())
            .ok_or_else(|| Error::AuthorizationDenied {
                action: "use an unknown or expired session".to_string(),
            })?;
        if !user.role.permits(user.id, action) {
            return Err(Error::AuthorizationDenied {
                action: action.to_string(),
            });
        }
        Ok(user)
    }

    fn room(&self, id: RoomId) -> Result<&Room> {
        self.rooms.get(&id).ok_or_else(|| not_found("Room", id))
    }

    fn booking(&self, id: BookingId) -> Result<&Booking> {
        self.bookings.get(&id).ok_or_else(|| not_found("Booking", id))
    }

    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.user.email.eq_ignore_ascii_case(email) && Some(u.user.id) != except)
    }

    fn insert_user(&mut self, name: &str, email: &str, password: &str, role: Role) -> User {
        let id = State::next_id(&mut self.next_user_id);
        let user = User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            role,
        };
        self.users.insert(
            id,
            StoredUser {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        user
    }

    fn insert_room(&mut self, room: RoomCreate) -> Room {
        let id = State::next_id(&mut self.next_room_id);
        let room = Room {
            id,
            name: room.name,
            location: room.location,
            capacity: room.capacity,
            equipment: room.equipment,
        };
        self.rooms.insert(id, room.clone());
        room
    }
}

fn not_found(resource: &str, id: i64) -> Error {
    Error::NotFound {
        resource: resource.to_string(),
        id: id.to_string(),
    }
}

fn check_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::Validation {
            errors: vec![FieldError::new(DraftField::Title, "is required")],
        });
    }
    Ok(())
}

fn check_attendees(attendees: &[UserSummary]) -> Result<()> {
    let duplicates = duplicate_attendees(attendees);
    if duplicates.is_empty() {
        return Ok(());
    }
    let ids = duplicates.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
    Err(Error::Validation {
        errors: vec![FieldError::new(DraftField::Attendees, format!("duplicate user ids: {ids}"))],
    })
}

fn check_room(name: &str, capacity: u32) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Rejected {
            status: 422,
            message: "Room name must not be empty".to_string(),
        });
    }
    if capacity == 0 {
        return Err(Error::Rejected {
            status: 422,
            message: "Room capacity must be positive".to_string(),
        });
    }
    Ok(())
}

/// [`BookingApi`] that keeps everything in process.
///
/// # Example
/// ```ignore
/// let api = InMemoryBookingApi::new(ConflictPolicy::default());
/// api.add_user("Ada", "ada@example.com", "pw", Role::Admin);
/// let session = api.login(&LoginRequest { email: "ada@example.com".into(), password: "pw".into() }).await?;
/// ```
#[derive(Clone)]
pub struct InMemoryBookingApi {
    policy: ConflictPolicy,
    state: Arc<RwLock<State>>,
    clock: Clock,
}

impl InMemoryBookingApi {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            state: Arc::new(RwLock::new(State::default())),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for past-scheduling checks.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn policy(&self) -> &ConflictPolicy {
        &self.policy
    }

    /// Register a user directly, bypassing role checks.
    pub fn add_user(&self, name: &str, email: &str, password: &str, role: Role) -> User {
        self.state.write().insert_user(name, email, password, role)
    }

    /// Register a room directly, bypassing role checks.
    pub fn add_room(&self, room: RoomCreate) -> Room {
        self.state.write().insert_room(room)
    }
}

#[async_trait]
impl BookingApi for InMemoryBookingApi {
    async fn login(&self, credentials: &LoginRequest) -> Result<Session> {
        let mut state = self.state.write();
        let user = state
            .users
            .values()
            .find(|u| u.user.email.eq_ignore_ascii_case(&credentials.email) && u.password == credentials.password)
            .map(|u| u.user.clone())
            .ok_or_else(|| Error::AuthorizationDenied {
                action: "log in with these credentials".to_string(),
            })?;

        let token = Uuid::new_v4().to_string();
        state.sessions.insert(token.clone(), user.id);
        info!(user_id = user.id, "User logged in");
        Ok(Session::new(user, token))
    }

    async fn list_rooms(&self, session: &Session) -> Result<Vec<Room>> {
        let state = self.state.read();
        state.authorize(session, Action::ReadRooms)?;
        Ok(state.rooms.values().cloned().collect())
    }

    async fn get_room(&self, session: &Session, id: RoomId) -> Result<Room> {
        let state = self.state.read();
        state.authorize(session, Action::ReadRooms)?;
        state.room(id).cloned()
    }

    async fn create_room(&self, session: &Session, room: &RoomCreate) -> Result<Room> {
        let mut state = self.state.write();
        state.authorize(session, Action::ManageRooms)?;
        check_room(&room.name, room.capacity)?;
        let room = state.insert_room(room.clone());
        info!(room_id = room.id, name = %room.name, "Room created");
        Ok(room)
    }

    async fn update_room(&self, session: &Session, id: RoomId, update: &RoomUpdate) -> Result<Room> {
        let mut state = self.state.write();
        state.authorize(session, Action::ManageRooms)?;
        let mut room = state.room(id)?.clone();
        room.apply(update.clone());
        check_room(&room.name, room.capacity)?;
        state.rooms.insert(id, room.clone());
        Ok(room)
    }

    async fn delete_room(&self, session: &Session, id: RoomId) -> Result<()> {
        let mut state = self.state.write();
        state.authorize(session, Action::ManageRooms)?;
        state.rooms.remove(&id).ok_or_else(|| not_found("Room", id))?;
        info!(room_id = id, "Room deleted");
        Ok(())
    }

    async fn available_rooms(&self, session: &Session, window: &TimeWindow) -> Result<Vec<Room>> {
        let state = self.state.read();
        state.authorize(session, Action::ReadRooms)?;
        Ok(crate::availability::available_rooms(
            state.rooms.values(),
            state.bookings.values(),
            window,
        ))
    }

    async fn list_bookings(&self, session: &Session, filter: &BookingFilter) -> Result<Page<Booking>> {
        let state = self.state.read();
        state.authorize(session, Action::ReadBookings)?;

        let mut matching: Vec<Booking> = state.bookings.values().filter(|b| filter.matches(b)).cloned().collect();
        match filter.sort.unwrap_or_default() {
            BookingSort::StartAsc => matching.sort_by_key(|b| (b.start_time, b.id)),
            BookingSort::StartDesc => matching.sort_by(|a, b| (b.start_time, b.id).cmp(&(a.start_time, a.id))),
            BookingSort::Title => matching.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id))),
        }

        let total_count = matching.len() as i64;
        let (skip, limit) = (filter.skip(), filter.limit());
        let data = matching.into_iter().skip(skip as usize).take(limit as usize).collect();
        Ok(Page::new(data, total_count, skip, limit))
    }

    async fn get_booking(&self, session: &Session, id: BookingId) -> Result<Booking> {
        let state = self.state.read();
        state.authorize(session, Action::ReadBookings)?;
        state.booking(id).cloned()
    }

    async fn create_booking(&self, session: &Session, booking: &BookingCreate) -> Result<Booking> {
        let mut state = self.state.write();
        let actor = state.authorize(session, Action::CreateBooking)?;
        check_title(&booking.title)?;
        state.room(booking.room_id)?;
        check_attendees(&booking.attendees)?;

        let candidate = Candidate::new(booking.room_id, booking.start_time, booking.end_time);
        self.policy.admit(&candidate, state.bookings.values(), (self.clock)())?;

        let id = State::next_id(&mut state.next_booking_id);
        let created = Booking {
            id,
            title: booking.title.trim().to_string(),
            description: booking.description.clone(),
            start_time: booking.start_time,
            end_time: booking.end_time,
            room_id: booking.room_id,
            created_by: UserSummary::from(&actor),
            status: BookingStatus::Confirmed,
            attendees: booking.attendees.clone(),
        };
        state.bookings.insert(id, created.clone());
        info!(booking_id = id, room_id = created.room_id, user_id = actor.id, "Booking created");
        Ok(created)
    }

    async fn update_booking(&self, session: &Session, id: BookingId, update: &BookingUpdate) -> Result<Booking> {
        let mut state = self.state.write();
        let current = state.booking(id)?.clone();
        state.authorize(
            session,
            Action::ModifyBooking {
                owner: current.created_by.id,
            },
        )?;

        let mut updated = current.clone();
        updated.transition(update.status.unwrap_or(current.status))?;
        if let Some(title) = &update.title {
            check_title(title)?;
            updated.title = title.trim().to_string();
        }
        if let Some(description) = &update.description {
            updated.description = Some(description.clone()).filter(|d| !d.trim().is_empty());
        }
        if let Some(attendees) = &update.attendees {
            check_attendees(attendees)?;
            updated.attendees = attendees.clone();
        }
        if let Some(room_id) = update.room_id {
            state.room(room_id)?;
            updated.room_id = room_id;
        }
        updated.start_time = update.start_time.unwrap_or(current.start_time);
        updated.end_time = update.end_time.unwrap_or(current.end_time);

        if update.touches_schedule() {
            let candidate = Candidate::from_booking(&updated);
            self.policy.admit(&candidate, state.bookings.values(), (self.clock)())?;
        }

        debug!(booking_id = id, status = %updated.status, "Booking updated");
        state.bookings.insert(id, updated.clone());
        Ok(updated)
    }

    async fn cancel_booking(&self, session: &Session, id: BookingId, cancel: &CancelBooking) -> Result<Booking> {
        let mut state = self.state.write();
        let owner = state.booking(id)?.created_by.id;
        let actor = state.authorize(session, Action::ModifyBooking { owner })?;
        if cancel.user_id != actor.id {
            return Err(Error::AuthorizationDenied {
                action: format!("cancel bookings on behalf of user {}", cancel.user_id),
            });
        }

        let booking = state.bookings.get_mut(&id).ok_or_else(|| not_found("Booking", id))?;
        booking.transition(BookingStatus::Cancelled)?;
        info!(booking_id = id, user_id = actor.id, "Booking cancelled");
        Ok(booking.clone())
    }

    async fn list_users(&self, session: &Session) -> Result<Vec<User>> {
        let state = self.state.read();
        state.authorize(session, Action::ReadUsers)?;
        Ok(state.users.values().map(|u| u.user.clone()).collect())
    }

    async fn create_user(&self, session: &Session, user: &UserCreate) -> Result<User> {
        let mut state = self.state.write();
        state.authorize(session, Action::ManageUsers)?;
        if state.email_taken(&user.email, None) {
            return Err(Error::Rejected {
                status: 409,
                message: format!("A user with email {} already exists", user.email),
            });
        }
        let created = state.insert_user(&user.name, &user.email, &user.password, user.role);
        info!(user_id = created.id, role = %created.role, "User created");
        Ok(created)
    }

    async fn update_user(&self, session: &Session, id: UserId, update: &UserUpdate) -> Result<User> {
        let mut state = self.state.write();
        state.authorize(session, Action::ManageUsers)?;
        if let Some(email) = update.email.as_deref().filter(|e| state.email_taken(e, Some(id))) {
            return Err(Error::Rejected {
                status: 409,
                message: format!("A user with email {email} already exists"),
            });
        }
        let stored = state.users.get_mut(&id).ok_or_else(|| not_found("User", id))?;
        if let Some(name) = &update.name {
            stored.user.name = name.clone();
        }
        if let Some(email) = &update.email {
            stored.user.email = email.clone();
        }
        if let Some(role) = update.role {
            stored.user.role = role;
        }
        Ok(stored.user.clone())
    }

    async fn delete_user(&self, session: &Session, id: UserId) -> Result<()> {
        let mut state = self.state.write();
        let actor = state.authorize(session, Action::ManageUsers)?;
        if actor.id == id {
            return Err(Error::Rejected {
                status: 409,
                message: "You cannot delete your own account".to_string(),
            });
        }
        state.users.remove(&id).ok_or_else(|| not_found("User", id))?;
        state.sessions.retain(|_, user_id| *user_id != id);
        info!(user_id = id, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 5, 14, h, m, 0).unwrap()
    }

    struct Fixture {
        api: InMemoryBookingApi,
        admin: Session,
        ada: Session,
        bo: Session,
        r101: Room,
        r102: Room,
    }

    async fn fixture() -> Fixture {
        let api = InMemoryBookingApi::new(ConflictPolicy::default()).with_clock(|| at(8, 0));
        api.add_user("Root", "root@example.com", "root", Role::Admin);
        api.add_user("Ada", "ada@example.com", "ada", Role::Employee);
        api.add_user("Bo", "bo@example.com", "bo", Role::Employee);
        let r101 = api.add_room(room("R101"));
        let r102 = api.add_room(room("R102"));

        let login = |email: &str, password: &str| LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let admin = api.login(&login("root@example.com", "root")).await.unwrap();
        let ada = api.login(&login("ada@example.com", "ada")).await.unwrap();
        let bo = api.login(&login("bo@example.com", "bo")).await.unwrap();
        Fixture {
            api,
            admin,
            ada,
            bo,
            r101,
            r102,
        }
    }

    fn room(name: &str) -> RoomCreate {
        RoomCreate {
            name: name.to_string(),
            location: "1F".to_string(),
            capacity: 8,
            equipment: BTreeSet::from(["projector".to_string()]),
        }
    }

    fn create(room_id: RoomId, start: DateTime<Utc>, end: DateTime<Utc>) -> BookingCreate {
        BookingCreate {
            title: "Planning".to_string(),
            description: None,
            start_time: start,
            end_time: end,
            room_id,
            attendees: vec![],
        }
    }

    fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeWindow {
        TimeWindow::new(start, end).unwrap()
    }

    #[tokio::test]
    async fn test_login_rejects_bad_password() {
        let f = fixture().await;
        let err = f
            .api
            .login(&LoginRequest {
                email: "ada@example.com".to_string(),
                password: "wrong".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthorizationDenied { .. }));
    }

    #[tokio::test]
    async fn test_unknown_session_is_denied() {
        let f = fixture().await;
        let forged = Session::new(f.ada.user.clone(), "not-a-token");
        let err = f.api.list_rooms(&forged).await.unwrap_err();
        assert!(matches!(err, Error::AuthorizationDenied { .. }));
    }

    #[tokio::test]
    async fn test_r101_overlap_and_back_to_back() {
        let f = fixture().await;
        let first = f.api.create_booking(&f.ada, &create(f.r101.id, at(10, 0), at(11, 0))).await.unwrap();
        assert_eq!(first.status, BookingStatus::Confirmed);
        assert_eq!(first.created_by.id, f.ada.user_id());

        let err = f
            .api
            .create_booking(&f.bo, &create(f.r101.id, at(10, 30), at(11, 30)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Overlap { room_id: Some(id), ref conflicting } if id == f.r101.id && conflicting == &vec![first.id]));

        f.api.create_booking(&f.bo, &create(f.r101.id, at(11, 0), at(12, 0))).await.unwrap();
        f.api.create_booking(&f.bo, &create(f.r101.id, at(9, 0), at(10, 0))).await.unwrap();
        // Same window on a different room is fine
        f.api.create_booking(&f.bo, &create(f.r102.id, at(10, 0), at(11, 0))).await.unwrap();
    }

    #[tokio::test]
    async fn test_availability_excludes_busy_rooms() {
        let f = fixture().await;
        f.api.create_booking(&f.ada, &create(f.r101.id, at(10, 0), at(11, 0))).await.unwrap();

        let free = f.api.available_rooms(&f.bo, &window(at(10, 30), at(11, 30))).await.unwrap();
        assert_eq!(free.iter().map(|r| r.id).collect::<Vec<_>>(), vec![f.r102.id]);

        let free = f.api.available_rooms(&f.bo, &window(at(11, 0), at(12, 0))).await.unwrap();
        assert_eq!(free.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_frees_the_room() {
        let f = fixture().await;
        let booking = f.api.create_booking(&f.ada, &create(f.r101.id, at(10, 0), at(11, 0))).await.unwrap();

        let cancelled = f
            .api
            .cancel_booking(&f.ada, booking.id, &CancelBooking { user_id: f.ada.user_id() })
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        f.api.create_booking(&f.bo, &create(f.r101.id, at(10, 0), at(11, 0))).await.unwrap();
        let free = f.api.available_rooms(&f.ada, &window(at(10, 0), at(11, 0))).await.unwrap();
        assert_eq!(free.iter().map(|r| r.id).collect::<Vec<_>>(), vec![f.r102.id]);
    }

    #[tokio::test]
    async fn test_cancelled_booking_is_immutable() {
        let f = fixture().await;
        let booking = f.api.create_booking(&f.ada, &create(f.r101.id, at(10, 0), at(11, 0))).await.unwrap();
        let cancel = CancelBooking { user_id: f.ada.user_id() };
        f.api.cancel_booking(&f.ada, booking.id, &cancel).await.unwrap();

        assert!(matches!(
            f.api.cancel_booking(&f.ada, booking.id, &cancel).await,
            Err(Error::Rejected { status: 409, .. })
        ));
        let reconfirm = BookingUpdate {
            status: Some(BookingStatus::Confirmed),
            ..Default::default()
        };
        assert!(f.api.update_booking(&f.ada, booking.id, &reconfirm).await.is_err());
        let retitle = BookingUpdate {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        assert!(f.api.update_booking(&f.ada, booking.id, &retitle).await.is_err());
    }

    #[tokio::test]
    async fn test_update_excludes_itself_but_not_others() {
        let f = fixture().await;
        let booking = f.api.create_booking(&f.ada, &create(f.r101.id, at(10, 0), at(11, 0))).await.unwrap();
        let other = f.api.create_booking(&f.bo, &create(f.r101.id, at(12, 0), at(13, 0))).await.unwrap();

        let extend = BookingUpdate {
            end_time: Some(at(11, 30)),
            ..Default::default()
        };
        let updated = f.api.update_booking(&f.ada, booking.id, &extend).await.unwrap();
        assert_eq!(updated.end_time, at(11, 30));

        let collide = BookingUpdate {
            end_time: Some(at(12, 30)),
            ..Default::default()
        };
        let err = f.api.update_booking(&f.ada, booking.id, &collide).await.unwrap_err();
        assert!(matches!(err, Error::Overlap { ref conflicting, .. } if conflicting == &vec![other.id]));

        // The rejected update left the stored booking alone
        assert_eq!(f.api.get_booking(&f.ada, booking.id).await.unwrap().end_time, at(11, 30));
    }

    #[tokio::test]
    async fn test_only_owner_or_admin_modifies() {
        let f = fixture().await;
        let booking = f.api.create_booking(&f.ada, &create(f.r101.id, at(10, 0), at(11, 0))).await.unwrap();
        let retitle = BookingUpdate {
            title: Some("Taken over".to_string()),
            ..Default::default()
        };

        let err = f.api.update_booking(&f.bo, booking.id, &retitle).await.unwrap_err();
        assert!(matches!(err, Error::AuthorizationDenied { .. }));
        let err = f
            .api
            .cancel_booking(&f.bo, booking.id, &CancelBooking { user_id: f.bo.user_id() })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthorizationDenied { .. }));

        let updated = f.api.update_booking(&f.admin, booking.id, &retitle).await.unwrap();
        assert_eq!(updated.title, "Taken over");
        // Creator is unchanged by an admin edit
        assert_eq!(updated.created_by.id, f.ada.user_id());
    }

    #[tokio::test]
    async fn test_past_and_duration_rules() {
        let f = fixture().await;
        let past = Utc.with_ymd_and_hms(2030, 5, 13, 10, 0, 0).unwrap();
        let err = f
            .api
            .create_booking(&f.ada, &create(f.r101.id, past, past + chrono::Duration::hours(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PastSchedulingNotAllowed { .. }));

        let err = f.api.create_booking(&f.ada, &create(f.r101.id, at(10, 0), at(10, 5))).await.unwrap_err();
        assert!(matches!(err, Error::DurationOutOfBounds { duration, .. } if duration == Duration::from_secs(300)));

        let err = f.api.create_booking(&f.ada, &create(f.r101.id, at(11, 0), at(10, 0))).await.unwrap_err();
        assert!(matches!(err, Error::InvalidWindow { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_attendees_rejected() {
        let f = fixture().await;
        let mut booking = create(f.r101.id, at(10, 0), at(11, 0));
        let bo = f.bo.summary();
        booking.attendees = vec![bo.clone(), bo];
        let err = f.api.create_booking(&f.ada, &booking).await.unwrap_err();
        assert!(matches!(err, Error::Validation { ref errors } if errors[0].field == DraftField::Attendees));
    }

    #[tokio::test]
    async fn test_unknown_room_is_not_found() {
        let f = fixture().await;
        let err = f.api.create_booking(&f.ada, &create(999, at(10, 0), at(11, 0))).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { ref resource, .. } if resource == "Room"));
    }

    #[tokio::test]
    async fn test_room_management_is_admin_only() {
        let f = fixture().await;
        let err = f.api.create_room(&f.ada, &room("R201")).await.unwrap_err();
        assert!(matches!(err, Error::AuthorizationDenied { .. }));

        let created = f.api.create_room(&f.admin, &room("R201")).await.unwrap();
        let updated = f
            .api
            .update_room(
                &f.admin,
                created.id,
                &RoomUpdate {
                    capacity: Some(20),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.capacity, 20);

        f.api.delete_room(&f.admin, f.r101.id).await.unwrap();
        let free = f.api.available_rooms(&f.ada, &window(at(10, 0), at(11, 0))).await.unwrap();
        assert!(free.iter().all(|r| r.id != f.r101.id));
        assert!(matches!(f.api.get_room(&f.ada, f.r101.id).await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_bookings_filters_and_pages() {
        let f = fixture().await;
        for h in [9, 11, 13] {
            f.api.create_booking(&f.ada, &create(f.r101.id, at(h, 0), at(h + 1, 0))).await.unwrap();
        }
        f.api.create_booking(&f.bo, &create(f.r102.id, at(9, 0), at(10, 0))).await.unwrap();

        let filter = BookingFilter::builder().room_id(f.r101.id).limit(2).sort(BookingSort::StartDesc).build();
        let page = f.api.list_bookings(&f.bo, &filter).await.unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].start_time, at(13, 0));
        assert!(page.has_more());

        let mine = BookingFilter::builder().created_by(f.bo.user_id()).build();
        assert_eq!(f.api.list_bookings(&f.bo, &mine).await.unwrap().total_count, 1);
    }

    #[tokio::test]
    async fn test_user_management() {
        let f = fixture().await;
        let new_user = UserCreate {
            name: "Cy".to_string(),
            email: "cy@example.com".to_string(),
            password: "cy".to_string(),
            role: Role::Employee,
        };
        assert!(matches!(
            f.api.create_user(&f.ada, &new_user).await,
            Err(Error::AuthorizationDenied { .. })
        ));

        let cy = f.api.create_user(&f.admin, &new_user).await.unwrap();
        assert!(matches!(
            f.api.create_user(&f.admin, &new_user).await,
            Err(Error::Rejected { status: 409, .. })
        ));

        let promoted = f
            .api
            .update_user(
                &f.admin,
                cy.id,
                &UserUpdate {
                    role: Some(Role::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Admin);

        assert!(f.api.delete_user(&f.admin, f.admin.user_id()).await.is_err());
        f.api.delete_user(&f.admin, f.bo.user_id()).await.unwrap();
        // Deleted users lose their sessions
        assert!(matches!(f.api.list_rooms(&f.bo).await, Err(Error::AuthorizationDenied { .. })));
        assert_eq!(f.api.list_users(&f.admin).await.unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_user_creation_registers_email_once() {
        let f = fixture().await;
        let new_user = UserCreate {
            name: "Cy".to_string(),
            email: "cy@example.com".to_string(),
            password: "cy".to_string(),
            role: Role::Employee,
        };

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let api = f.api.clone();
                let admin = f.admin.clone();
                let new_user = new_user.clone();
                tokio::spawn(async move { api.create_user(&admin, &new_user).await })
            })
            .collect();
        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(Error::Rejected { status: 409, .. }) => {}
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!(created, 1);

        let users = f.api.list_users(&f.admin).await.unwrap();
        assert_eq!(users.iter().filter(|u| u.email == "cy@example.com").count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_room_creation_assigns_distinct_ids() {
        let f = fixture().await;
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let api = f.api.clone();
                let admin = f.admin.clone();
                tokio::spawn(async move { api.create_room(&admin, &room(&format!("Annex {i}"))).await })
            })
            .collect();
        let mut ids = BTreeSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap().unwrap().id);
        }
        assert_eq!(ids.len(), 8);
        assert_eq!(f.api.list_rooms(&f.admin).await.unwrap().len(), 10);
    }
}
