//! Shared domain types for slotboard.
//!
//! Appointments and their status enum, the service/client catalog records the
//! backend stores, and the live-update messages pushed to connected boards.
//! Both the backend and the board client depend on this crate so the wire
//! format has a single definition.

pub mod appointment;
pub mod catalog;
pub mod live;

pub use appointment::{
    Appointment, AppointmentId, AppointmentPatch, AppointmentStatus, NewAppointment,
    StatusParseError, StatusPatch,
};
pub use catalog::{Client, NewService, Service};
pub use live::LiveMessage;
