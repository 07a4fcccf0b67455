//! Appointment status board: client-side state and synchronization.
//!
//! ## Module Map
//!
//! ```text
//!  pointer / touch / keys          push frames (WsTransport)
//!          │                                │
//!          v                                v
//!  dragdrop.rs (DragDrop)           channel.rs (LiveChannel)
//!          │ DropResolution::Moved          │ invalidations (watch)
//!          v                                v
//!  coordinator.rs (MutationCoordinator) ── BoardApi ──> HTTP backend
//!          │ apply_status_change / replace_all
//!          v
//!  store.rs (AppointmentStore) ──> columns() grouped by status.rs (StatusModel)
//! ```
//!
//! The store is written only by the coordinator. Status changes are applied
//! optimistically, reconciled per appointment with last-request-wins, and
//! rolled back on rejection. Every live message triggers a refetch that keeps
//! in-flight optimistic statuses.

pub mod channel;
pub mod coordinator;
pub mod dragdrop;
pub mod status;
pub mod store;

pub use channel::{ConnectionState, LiveChannel, LiveConnection, LiveTransport, LiveUpdate};
pub use coordinator::{BoardApi, MutationCoordinator, TransitionOutcome};
pub use dragdrop::{DragDrop, DragState, DropResolution};
pub use status::StatusModel;
pub use store::{AppointmentStore, BoardColumn};
