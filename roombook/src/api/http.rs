//! JSON-over-HTTP implementation of [`BookingApi`] using `reqwest`.
//!
//! Failures are classified into three groups:
//!
//! - no response received (connect errors, timeouts) - [`Error::NetworkUnavailable`]
//! - a structured rejection ([`ApiRejection`] body, or a 4xx status) - the matching error kind
//! - anything else (5xx, undecodable bodies) - [`Error::UnexpectedFailure`]
//!
//! A bare 409 only means an overlap when it answers a booking create or reschedule. Elsewhere
//! (cancelling a cancelled booking, a taken email) it is a plain [`Error::Rejected`].

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};
use url::Url;

use super::{ApiRejection, BookingApi};
use crate::config::ApiConfig;
use crate::errors::{Error, Result};
use crate::models::bookings::{Booking, BookingCreate, BookingFilter, BookingUpdate, CancelBooking};
use crate::models::pagination::Page;
use crate::models::rooms::{Room, RoomCreate, RoomUpdate};
use crate::models::users::{LoginRequest, LoginResponse, User, UserCreate, UserUpdate};
use crate::session::Session;
use crate::types::{BookingId, RoomId, UserId};
use crate::window::TimeWindow;

pub struct HttpBookingApi {
    client: Client,
    base_url: Url,
}

impl HttpBookingApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            base_url: ensure_slash(&config.url),
        })
    }

    fn request(&self, method: Method, path: &str, session: Option<&Session>) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| anyhow!("Failed to construct URL for '{path}': {e}"))?;
        let request = self.client.request(method, url);
        Ok(match session {
            Some(session) => request.bearer_auth(&session.token),
            None => request,
        })
    }

    /// Send `request` and decode a JSON body on success.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let (url, body) = self.execute(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            error!(%url, error = %e, "Failed to parse booking service response");
            debug!(body = %body, "Response body was");
            Error::UnexpectedFailure(anyhow!("error decoding response body: {e}"))
        })
    }

    /// Send `request`, ignoring any body on success.
    async fn send_empty(&self, request: RequestBuilder) -> Result<()> {
        self.execute(request).await.map(|_| ())
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(Url, String)> {
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await.map_err(classify_transport)?;

        debug!(%url, status = status.as_u16(), response_len = body.len(), "Booking service responded");

        if !status.is_success() {
            return Err(rejection_error(status, &url, &body));
        }
        Ok((url, body))
    }
}

/// Makes sure a url has a trailing slash, so that `join` appends instead of replacing the last
/// path segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

fn classify_transport(err: reqwest::Error) -> Error {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        warn!(error = %err, "Booking service unreachable");
        Error::NetworkUnavailable { message: err.to_string() }
    } else {
        error!(error = %err, "HTTP transport failure");
        Error::UnexpectedFailure(err.into())
    }
}

fn rejection_error(status: StatusCode, url: &Url, body: &str) -> Error {
    if let Ok(rejection) = serde_json::from_str::<ApiRejection>(body) {
        debug!(status = status.as_u16(), ?rejection, "Structured rejection");
        return rejection.into();
    }

    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::AuthorizationDenied {
            action: if message.is_empty() {
                format!("access {}", url.path())
            } else {
                message
            },
        },
        StatusCode::NOT_FOUND => not_found(url),
        StatusCode::CONFLICT if is_booking_write(url) => Error::Overlap {
            room_id: None,
            conflicting: Vec::new(),
        },
        s if s.is_client_error() => Error::Rejected {
            status: s.as_u16(),
            message,
        },
        s => {
            error!(%url, status = s.as_u16(), body = %message, "Booking service error");
            Error::UnexpectedFailure(anyhow!("Booking service error {s}: {message}"))
        }
    }
}

fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default()
}

/// `bookings` or `bookings/{id}`, the only endpoints where a conflict is a schedule clash.
fn is_booking_write(url: &Url) -> bool {
    match path_segments(url).as_slice() {
        [.., "bookings"] => true,
        [.., "bookings", id] => id.parse::<i64>().is_ok(),
        _ => false,
    }
}

fn not_found(url: &Url) -> Error {
    match path_segments(url).as_slice() {
        [.., resource, id] if id.parse::<i64>().is_ok() => Error::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        },
        _ => Error::NotFound {
            resource: "resource".to_string(),
            id: url.path().to_string(),
        },
    }
}

#[async_trait]
impl BookingApi for HttpBookingApi {
    #[instrument(skip_all, fields(email = %credentials.email))]
    async fn login(&self, credentials: &LoginRequest) -> Result<Session> {
        let request = self.request(Method::POST, "auth/login", None)?.json(credentials);
        let response: LoginResponse = self.send(request).await?;
        Ok(Session::new(response.user, response.token))
    }

    #[instrument(skip_all)]
    async fn list_rooms(&self, session: &Session) -> Result<Vec<Room>> {
        self.send(self.request(Method::GET, "rooms", Some(session))?).await
    }

    #[instrument(skip(self, session))]
    async fn get_room(&self, session: &Session, id: RoomId) -> Result<Room> {
        self.send(self.request(Method::GET, &format!("rooms/{id}"), Some(session))?)
            .await
    }

    #[instrument(skip_all, fields(name = %room.name))]
    async fn create_room(&self, session: &Session, room: &RoomCreate) -> Result<Room> {
        self.send(self.request(Method::POST, "rooms", Some(session))?.json(room)).await
    }

    #[instrument(skip(self, session, update))]
    async fn update_room(&self, session: &Session, id: RoomId, update: &RoomUpdate) -> Result<Room> {
        self.send(self.request(Method::PATCH, &format!("rooms/{id}"), Some(session))?.json(update))
            .await
    }

    #[instrument(skip(self, session))]
    async fn delete_room(&self, session: &Session, id: RoomId) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("rooms/{id}"), Some(session))?)
            .await
    }

    #[instrument(skip(self, session, window), fields(window = %window))]
    async fn available_rooms(&self, session: &Session, window: &TimeWindow) -> Result<Vec<Room>> {
        let query = [
            ("start", window.start().to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("end", window.end().to_rfc3339_opts(SecondsFormat::Secs, true)),
        ];
        self.send(self.request(Method::GET, "rooms/available", Some(session))?.query(&query))
            .await
    }

    #[instrument(skip(self, session))]
    async fn list_bookings(&self, session: &Session, filter: &BookingFilter) -> Result<Page<Booking>> {
        self.send(self.request(Method::GET, "bookings", Some(session))?.query(filter))
            .await
    }

    #[instrument(skip(self, session))]
    async fn get_booking(&self, session: &Session, id: BookingId) -> Result<Booking> {
        self.send(self.request(Method::GET, &format!("bookings/{id}"), Some(session))?)
            .await
    }

    #[instrument(skip_all, fields(room_id = booking.room_id))]
    async fn create_booking(&self, session: &Session, booking: &BookingCreate) -> Result<Booking> {
        self.send(self.request(Method::POST, "bookings", Some(session))?.json(booking))
            .await
    }

    #[instrument(skip(self, session, update))]
    async fn update_booking(&self, session: &Session, id: BookingId, update: &BookingUpdate) -> Result<Booking> {
        self.send(self.request(Method::PATCH, &format!("bookings/{id}"), Some(session))?.json(update))
            .await
    }

    #[instrument(skip(self, session, cancel))]
    async fn cancel_booking(&self, session: &Session, id: BookingId, cancel: &CancelBooking) -> Result<Booking> {
        self.send(
            self.request(Method::POST, &format!("bookings/{id}/cancel"), Some(session))?
                .json(cancel),
        )
        .await
    }

    #[instrument(skip_all)]
    async fn list_users(&self, session: &Session) -> Result<Vec<User>> {
        self.send(self.request(Method::GET, "users", Some(session))?).await
    }

    #[instrument(skip_all, fields(email = %user.email))]
    async fn create_user(&self, session: &Session, user: &UserCreate) -> Result<User> {
        self.send(self.request(Method::POST, "users", Some(session))?.json(user)).await
    }

    #[instrument(skip(self, session, update))]
    async fn update_user(&self, session: &Session, id: UserId, update: &UserUpdate) -> Result<User> {
        self.send(self.request(Method::PATCH, &format!("users/{id}"), Some(session))?.json(update))
            .await
    }

    #[instrument(skip(self, session))]
    async fn delete_user(&self, session: &Session, id: UserId) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("users/{id}"), Some(session))?)
            .await
    }
}
