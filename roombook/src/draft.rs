//! Local validation of booking drafts.
//!
//! A [`BookingDraft`] mirrors the booking form: every field may still be empty. Validation is
//! pure and synchronous; it turns a complete draft into a [`BookingCreate`] payload or reports
//! every failing field at once. Conflict checks are left to the booking service.

use crate::errors::{DraftField, Error, FieldError, Result};
use crate::models::bookings::{BookingCreate, duplicate_attendees};
use crate::models::users::UserSummary;
use crate::types::RoomId;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Bounds applied to draft fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DraftRules {
    /// Minimum title length in characters, after trimming
    pub title_min_len: usize,
    /// Maximum title length in characters
    pub title_max_len: usize,
    /// Maximum description length in characters
    pub description_max_len: usize,
    /// Offset from UTC, in minutes, used to interpret the draft's date and times of day
    pub utc_offset_minutes: i32,
}

impl Default for DraftRules {
    fn default() -> Self {
        Self {
            title_min_len: 3,
            title_max_len: 100,
            description_max_len: 500,
            utc_offset_minutes: 0,
        }
    }
}

impl DraftRules {
    pub fn offset(&self) -> Option<FixedOffset> {
        self.utc_offset_minutes.checked_mul(60).and_then(FixedOffset::east_opt)
    }
}

/// An unsubmitted booking as entered in the booking form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub attendees: Vec<UserSummary>,
}

impl BookingDraft {
    /// Validate every field and produce the normalized submission payload.
    pub fn validate(&self, rules: &DraftRules) -> Result<BookingCreate> {
        let mut errors = Vec::new();

        let title = self.title.trim();
        let title_len = title.chars().count();
        if title.is_empty() {
            errors.push(FieldError::new(DraftField::Title, "is required"));
        } else if title_len < rules.title_min_len {
            errors.push(FieldError::new(
                DraftField::Title,
                format!("must be at least {} characters", rules.title_min_len),
            ));
        } else if title_len > rules.title_max_len {
            errors.push(FieldError::new(
                DraftField::Title,
                format!("must be at most {} characters", rules.title_max_len),
            ));
        }

        let description = self.description.as_deref().map(str::trim).filter(|d| !d.is_empty());
        if description.is_some_and(|d| d.chars().count() > rules.description_max_len) {
            errors.push(FieldError::new(
                DraftField::Description,
                format!("must be at most {} characters", rules.description_max_len),
            ));
        }

        if self.date.is_none() {
            errors.push(FieldError::new(DraftField::Date, "is required"));
        }
        if self.start_time.is_none() {
            errors.push(FieldError::new(DraftField::StartTime, "is required"));
        }
        if self.end_time.is_none() {
            errors.push(FieldError::new(DraftField::EndTime, "is required"));
        }

        let offset = rules.offset();
        if offset.is_none() {
            errors.push(FieldError::new(DraftField::Date, "cannot be interpreted in the configured UTC offset"));
        }

        let window = match (self.date, self.start_time, self.end_time, offset) {
            (Some(date), Some(start), Some(end), Some(offset)) => {
                match (combine(date, start, offset), combine(date, end, offset)) {
                    (Some(start), Some(end)) => {
                        if end <= start {
                            errors.push(FieldError::new(DraftField::EndTime, "must be after the start time"));
                        }
                        Some((start, end))
                    }
                    _ => {
                        errors.push(FieldError::new(DraftField::Date, "is out of range"));
                        None
                    }
                }
            }
            _ => None,
        };

        match self.room_id {
            None => errors.push(FieldError::new(DraftField::Room, "is required")),
            Some(id) if id <= 0 => errors.push(FieldError::new(DraftField::Room, format!("{id} is not a valid room"))),
            Some(_) => {}
        }

        let duplicates = duplicate_attendees(&self.attendees);
        if !duplicates.is_empty() {
            let ids = duplicates.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
            errors.push(FieldError::new(DraftField::Attendees, format!("contains duplicate user ids: {ids}")));
        }

        match (errors.is_empty(), window, self.room_id) {
            (true, Some((start_time, end_time)), Some(room_id)) => Ok(BookingCreate {
                title: title.to_string(),
                description: description.map(str::to_string),
                start_time,
                end_time,
                room_id,
                attendees: self.attendees.clone(),
            }),
            _ => Err(Error::Validation { errors }),
        }
    }
}

/// Local wall-clock time to UTC. `None` when the shift leaves chrono's representable range.
fn combine(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    date.and_time(time)
        .checked_sub_signed(TimeDelta::seconds(offset.local_minus_utc().into()))
        .map(|t| t.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: i64, name: &str) -> UserSummary {
        UserSummary { id, name: name.to_string() }
    }

    fn complete_draft() -> BookingDraft {
        BookingDraft {
            title: "  Quarterly review ".to_string(),
            description: Some("Numbers and plans".to_string()),
            date: NaiveDate::from_ymd_opt(2030, 5, 14),
            start_time: NaiveTime::from_hms_opt(10, 0, 0),
            end_time: NaiveTime::from_hms_opt(11, 30, 0),
            room_id: Some(101),
            attendees: vec![person(2, "Bo"), person(3, "Cy")],
        }
    }

    fn fields(err: Error) -> Vec<DraftField> {
        match err {
            Error::Validation { errors } => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_complete_draft_normalizes() {
        let payload = complete_draft().validate(&DraftRules::default()).unwrap();
        assert_eq!(payload.title, "Quarterly review");
        assert_eq!(payload.room_id, 101);
        assert_eq!(payload.start_time.to_rfc3339(), "2030-05-14T10:00:00+00:00");
        assert_eq!(payload.end_time.to_rfc3339(), "2030-05-14T11:30:00+00:00");
        assert_eq!(payload.attendees.len(), 2);
    }

    #[test]
    fn test_two_character_title_fails() {
        let draft = BookingDraft {
            title: "Hi".to_string(),
            ..complete_draft()
        };
        assert_eq!(fields(draft.validate(&DraftRules::default()).unwrap_err()), vec![DraftField::Title]);
    }

    #[test]
    fn test_title_and_description_upper_bounds() {
        let rules = DraftRules::default();
        let draft = BookingDraft {
            title: "x".repeat(101),
            description: Some("y".repeat(501)),
            ..complete_draft()
        };
        assert_eq!(fields(draft.validate(&rules).unwrap_err()), vec![DraftField::Title, DraftField::Description]);
    }

    #[test]
    fn test_blank_description_is_dropped() {
        let draft = BookingDraft {
            description: Some("   ".to_string()),
            ..complete_draft()
        };
        assert_eq!(draft.validate(&DraftRules::default()).unwrap().description, None);
    }

    #[test]
    fn test_empty_draft_reports_every_missing_field() {
        let errs = fields(BookingDraft::default().validate(&DraftRules::default()).unwrap_err());
        assert_eq!(
            errs,
            vec![DraftField::Title, DraftField::Date, DraftField::StartTime, DraftField::EndTime, DraftField::Room]
        );
    }

    #[test]
    fn test_end_before_start() {
        let draft = BookingDraft {
            start_time: NaiveTime::from_hms_opt(12, 0, 0),
            end_time: NaiveTime::from_hms_opt(12, 0, 0),
            ..complete_draft()
        };
        assert_eq!(fields(draft.validate(&DraftRules::default()).unwrap_err()), vec![DraftField::EndTime]);
    }

    #[test]
    fn test_duplicate_attendee_ids_rejected() {
        let draft = BookingDraft {
            attendees: vec![person(2, "Bo"), person(2, "bo")],
            ..complete_draft()
        };
        let err = draft.validate(&DraftRules::default()).unwrap_err();
        assert!(err.to_string().contains("duplicate user ids: 2"));
    }

    #[test]
    fn test_offset_is_applied() {
        let rules = DraftRules {
            utc_offset_minutes: 9 * 60,
            ..Default::default()
        };
        let payload = complete_draft().validate(&rules).unwrap();
        assert_eq!(payload.start_time.to_rfc3339(), "2030-05-14T01:00:00+00:00");
    }

    #[test]
    fn test_date_shifted_past_the_calendar_is_a_field_error() {
        let rules = DraftRules {
            utc_offset_minutes: -60,
            ..Default::default()
        };
        let draft = BookingDraft {
            date: Some(NaiveDate::MAX),
            start_time: NaiveTime::from_hms_opt(23, 0, 0),
            end_time: NaiveTime::from_hms_opt(23, 30, 0),
            ..complete_draft()
        };
        let err = draft.validate(&rules).unwrap_err();
        assert!(err.to_string().contains("date: is out of range"));
        assert_eq!(fields(err), vec![DraftField::Date]);
    }

    #[test]
    fn test_invalid_room_id() {
        let draft = BookingDraft {
            room_id: Some(0),
            ..complete_draft()
        };
        assert_eq!(fields(draft.validate(&DraftRules::default()).unwrap_err()), vec![DraftField::Room]);
    }
}
