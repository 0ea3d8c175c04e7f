//! Command-line front end.
//!
//! Each subcommand maps onto one [`BookingService`] operation and prints its result as JSON on
//! stdout.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::draft::BookingDraft;
use crate::errors::{DraftField, Error, FieldError, Result};
use crate::models::bookings::{BookingFilter, BookingSort, BookingStatus, BookingUpdate};
use crate::models::rooms::{RoomCreate, RoomUpdate};
use crate::models::users::{UserCreate, UserSummary};
use crate::service::BookingService;
use crate::types::{BookingId, Role, RoomId, UserId};

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List all rooms
    Rooms,
    /// Show one room
    Room { id: RoomId },
    /// List rooms free during a window
    Available {
        /// Window start (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,
        /// Window end (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,
    },
    /// Add a room (admin)
    AddRoom {
        #[arg(long)]
        name: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        capacity: u32,
        /// Equipment label, may be repeated
        #[arg(long = "equipment")]
        equipment: Vec<String>,
    },
    /// Change a room's capacity or location (admin)
    EditRoom {
        id: RoomId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        capacity: Option<u32>,
    },
    /// Remove a room (admin)
    RemoveRoom { id: RoomId },
    /// List bookings
    Bookings {
        #[arg(long)]
        room: Option<RoomId>,
        /// Only bookings created by the signed-in user
        #[arg(long)]
        mine: bool,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Bookings starting on this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
        #[arg(long)]
        skip: Option<i64>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show one booking
    Booking { id: BookingId },
    /// Book a room
    Book {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Meeting date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Start time of day (HH:MM:SS)
        #[arg(long)]
        start: NaiveTime,
        /// End time of day (HH:MM:SS)
        #[arg(long)]
        end: NaiveTime,
        #[arg(long)]
        room: RoomId,
        /// Attendee user id, may be repeated
        #[arg(long = "attendee")]
        attendees: Vec<UserId>,
    },
    /// Edit a booking; unset flags leave the field unchanged
    Update {
        id: BookingId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        #[arg(long)]
        end: Option<DateTime<Utc>>,
        #[arg(long)]
        room: Option<RoomId>,
        #[arg(long)]
        description: Option<String>,
        /// Replacement attendee user id, may be repeated
        #[arg(long = "attendee", conflicts_with = "clear_attendees")]
        attendees: Vec<UserId>,
        /// Remove every attendee
        #[arg(long)]
        clear_attendees: bool,
    },
    /// Cancel a booking
    Cancel { id: BookingId },
    /// Manage the draft kept from a failed submission
    #[command(subcommand)]
    Draft(DraftCommand),
    /// List users
    Users,
    /// Add a user (admin)
    AddUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "ROOMBOOK_NEW_USER_PASSWORD")]
        password: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Employee)]
        role: RoleArg,
    },
    /// Remove a user (admin)
    RemoveUser { id: UserId },
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum DraftCommand {
    /// Print the saved draft
    Show,
    /// Submit the saved draft again
    Submit,
    /// Throw the saved draft away
    Discard,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum StatusArg {
    Confirmed,
    Cancelled,
}

impl From<StatusArg> for BookingStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Confirmed => BookingStatus::Confirmed,
            StatusArg::Cancelled => BookingStatus::Cancelled,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum SortArg {
    Start,
    StartDesc,
    Title,
}

impl From<SortArg> for BookingSort {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Start => BookingSort::StartAsc,
            SortArg::StartDesc => BookingSort::StartDesc,
            SortArg::Title => BookingSort::Title,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleArg {
    Admin,
    Employee,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Admin => Role::Admin,
            RoleArg::Employee => Role::Employee,
        }
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
    println!("{json}");
    Ok(())
}

/// Turn attendee ids into summaries using the user directory. Unknown ids are a field error.
async fn resolve_attendees(service: &BookingService, ids: &[UserId]) -> Result<Vec<UserSummary>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let users = service.users().await?;
    let mut unknown = Vec::new();
    let mut attendees = Vec::with_capacity(ids.len());
    for id in ids {
        match users.iter().find(|u| u.id == *id) {
            Some(user) => attendees.push(UserSummary::from(user)),
            None => unknown.push(id.to_string()),
        }
    }
    if !unknown.is_empty() {
        return Err(Error::Validation {
            errors: vec![FieldError::new(
                DraftField::Attendees,
                format!("unknown user ids: {}", unknown.join(", ")),
            )],
        });
    }
    Ok(attendees)
}

pub async fn run(service: &BookingService, command: Command) -> Result<()> {
    match command {
        Command::Rooms => print(&service.rooms().await?),
        Command::Room { id } => print(&service.room(id).await?),
        Command::Available { start, end } => print(&service.available_rooms(start, end).await?),
        Command::AddRoom {
            name,
            location,
            capacity,
            equipment,
        } => {
            let room = RoomCreate {
                name,
                location,
                capacity,
                equipment: equipment.into_iter().collect::<BTreeSet<_>>(),
            };
            print(&service.create_room(&room).await?)
        }
        Command::EditRoom {
            id,
            name,
            location,
            capacity,
        } => {
            let update = RoomUpdate {
                name,
                location,
                capacity,
                equipment: None,
            };
            print(&service.update_room(id, &update).await?)
        }
        Command::RemoveRoom { id } => service.delete_room(id).await,
        Command::Bookings {
            room,
            mine,
            status,
            date,
            sort,
            skip,
            limit,
        } => {
            let filter = BookingFilter {
                room_id: room,
                created_by: mine.then(|| service.session().user_id()),
                status: status.map(Into::into),
                date,
                skip,
                limit,
                sort: sort.map(Into::into),
            };
            print(&service.bookings(&filter).await?)
        }
        Command::Booking { id } => print(&service.booking(id).await?),
        Command::Book {
            title,
            description,
            date,
            start,
            end,
            room,
            attendees,
        } => {
            let draft = BookingDraft {
                title,
                description,
                date: Some(date),
                start_time: Some(start),
                end_time: Some(end),
                room_id: Some(room),
                attendees: Vec::new(),
            };
            let draft = match resolve_attendees(service, &attendees).await {
                Ok(attendees) => BookingDraft { attendees, ..draft },
                Err(e) => {
                    service.save_draft(&draft).await?;
                    return Err(e);
                }
            };
            print(&service.submit_draft(&draft).await?)
        }
        Command::Update {
            id,
            title,
            start,
            end,
            room,
            description,
            attendees,
            clear_attendees,
        } => {
            let attendees = if clear_attendees {
                Some(Vec::new())
            } else if attendees.is_empty() {
                None
            } else {
                Some(resolve_attendees(service, &attendees).await?)
            };
            let update = BookingUpdate {
                title,
                description,
                start_time: start,
                end_time: end,
                room_id: room,
                attendees,
                ..Default::default()
            };
            print(&service.update_booking(id, &update).await?)
        }
        Command::Cancel { id } => print(&service.cancel_booking(id).await?),
        Command::Draft(DraftCommand::Show) => print(&service.saved_draft().await?),
        Command::Draft(DraftCommand::Submit) => match service.saved_draft().await? {
            Some(draft) => print(&service.submit_draft(&draft).await?),
            None => Err(Error::NotFound {
                resource: "Draft".to_string(),
                id: service.session().user_id().to_string(),
            }),
        },
        Command::Draft(DraftCommand::Discard) => service.discard_draft().await,
        Command::Users => print(&service.users().await?),
        Command::AddUser {
            name,
            email,
            password,
            role,
        } => {
            let user = UserCreate {
                name,
                email,
                password,
                role: role.into(),
            };
            print(&service.create_user(&user).await?)
        }
        Command::RemoveUser { id } => service.delete_user(id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use clap::Parser;

    #[test]
    fn test_parse_book_command() {
        let args = Args::try_parse_from([
            "roombook",
            "book",
            "--title",
            "Planning",
            "--date",
            "2030-05-14",
            "--start",
            "10:00:00",
            "--end",
            "11:00:00",
            "--room",
            "101",
            "--attendee",
            "2",
            "--attendee",
            "3",
        ])
        .unwrap();
        match args.command {
            Some(Command::Book {
                room, attendees, start, ..
            }) => {
                assert_eq!(room, 101);
                assert_eq!(attendees, vec![2, 3]);
                assert_eq!(start, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_available_window() {
        let args = Args::try_parse_from([
            "roombook",
            "available",
            "--start",
            "2030-05-14T10:00:00Z",
            "--end",
            "2030-05-14T11:00:00Z",
        ])
        .unwrap();
        assert!(matches!(args.command, Some(Command::Available { .. })));
    }

    #[test]
    fn test_parse_bookings_filters() {
        let args = Args::try_parse_from(["roombook", "bookings", "--mine", "--status", "cancelled", "--sort", "start-desc"]).unwrap();
        match args.command {
            Some(Command::Bookings { mine, status, sort, .. }) => {
                assert!(mine);
                assert_eq!(status.map(BookingStatus::from), Some(BookingStatus::Cancelled));
                assert_eq!(sort.map(BookingSort::from), Some(BookingSort::StartDesc));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_draft_subcommand() {
        let args = Args::try_parse_from(["roombook", "draft", "discard"]).unwrap();
        assert!(matches!(args.command, Some(Command::Draft(DraftCommand::Discard))));
    }

    #[test]
    fn test_parse_update_attendees_and_description() {
        let args = Args::try_parse_from([
            "roombook",
            "update",
            "7",
            "--description",
            "Moved to the afternoon",
            "--attendee",
            "2",
            "--attendee",
            "3",
        ])
        .unwrap();
        match args.command {
            Some(Command::Update {
                id,
                description,
                attendees,
                clear_attendees,
                ..
            }) => {
                assert_eq!(id, 7);
                assert_eq!(description.as_deref(), Some("Moved to the afternoon"));
                assert_eq!(attendees, vec![2, 3]);
                assert!(!clear_attendees);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Args::try_parse_from(["roombook", "update", "7", "--attendee", "2", "--clear-attendees"]).is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_update_command_replaces_attendees_and_description() {
        use crate::api::BookingApi;
        use crate::api::in_memory::InMemoryBookingApi;
        use crate::cache::MokaStore;
        use crate::config::CacheConfig;
        use crate::draft_store::InMemoryDraftStore;
        use crate::models::bookings::BookingCreate;
        use crate::models::rooms::RoomCreate;
        use crate::models::users::LoginRequest;
        use crate::policy::ConflictPolicy;
        use chrono::{Duration, Utc};
        use std::collections::BTreeSet;
        use std::sync::Arc;

        let api = InMemoryBookingApi::new(ConflictPolicy::default());
        let ada = api.add_user("Ada", "ada@example.com", "ada", Role::Employee);
        let bo = api.add_user("Bo", "bo@example.com", "bo", Role::Employee);
        let room = api.add_room(RoomCreate {
            name: "R101".to_string(),
            location: "1F".to_string(),
            capacity: 8,
            equipment: BTreeSet::new(),
        });
        let session = api
            .login(&LoginRequest {
                email: ada.email.clone(),
                password: "ada".to_string(),
            })
            .await
            .unwrap();

        let start = Utc::now() + Duration::days(7);
        let booking = api
            .create_booking(
                &session,
                &BookingCreate {
                    title: "Planning".to_string(),
                    description: None,
                    start_time: start,
                    end_time: start + Duration::hours(1),
                    room_id: room.id,
                    attendees: vec![],
                },
            )
            .await
            .unwrap();

        let service = BookingService::builder()
            .api(Arc::new(api))
            .cache(Arc::new(MokaStore::new(&CacheConfig::default())))
            .drafts(Arc::new(InMemoryDraftStore::new()))
            .session(session)
            .build();

        run(
            &service,
            Command::Update {
                id: booking.id,
                title: None,
                start: None,
                end: None,
                room: None,
                description: Some("Bring numbers".to_string()),
                attendees: vec![bo.id],
                clear_attendees: false,
            },
        )
        .await
        .unwrap();

        let updated = service.booking(booking.id).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("Bring numbers"));
        assert_eq!(updated.attendees, vec![UserSummary::from(&bo)]);

        let err = run(
            &service,
            Command::Update {
                id: booking.id,
                title: None,
                start: None,
                end: None,
                room: None,
                description: None,
                attendees: vec![99],
                clear_attendees: false,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
