use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend-assigned appointment identity.
pub type AppointmentId = i64;

/// Lifecycle status of an appointment.
///
/// Serialized in lowercase snake_case. Deserialization goes through
/// [`FromStr`], so inbound values are accepted in any casing and normalized
/// here; nothing downstream ever sees a raw status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum AppointmentStatus {
    Waitlist,
    New,
    Confirmed,
    InProgress,
    Done,
    Cancelled,
}

impl AppointmentStatus {
    /// Every status, in board order. `Cancelled` is last.
    pub const ALL: [AppointmentStatus; 6] = [
        Self::Waitlist,
        Self::New,
        Self::Confirmed,
        Self::InProgress,
        Self::Done,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waitlist => "waitlist",
            Self::New => "new",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    /// Human-readable column title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Waitlist => "Waitlist",
            Self::New => "New",
            Self::Confirmed => "Confirmed",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid appointment status '{0}'")]
pub struct StatusParseError(pub String);

impl FromStr for AppointmentStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "waitlist" => Ok(Self::Waitlist),
            // Older backends created bookings as "pending".
            "new" | "pending" => Ok(Self::New),
            "confirmed" => Ok(Self::Confirmed),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(StatusParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for AppointmentStatus {
    type Error = StatusParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One scheduled (or waitlisted) service visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub shop_id: i64,
    pub service_id: i64,
    pub client_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
}

impl Appointment {
    /// `end_time` must be strictly after `start_time`.
    pub fn has_valid_span(&self) -> bool {
        self.end_time > self.start_time
    }
}

/// Booking request, as produced by the booking surface or manual creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub shop_id: i64,
    pub service_id: i64,
    pub start_time: DateTime<Utc>,
    pub client_name: String,
    pub client_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_telegram_id: Option<i64>,
}

/// Edit of the non-status fields. Applied as an atomic replace by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

impl AppointmentPatch {
    pub fn is_empty(&self) -> bool {
        self.service_id.is_none() && self.start_time.is_none()
    }
}

/// Body of `PATCH /appointments/{id}/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPatch {
    pub status: AppointmentStatus,
}
