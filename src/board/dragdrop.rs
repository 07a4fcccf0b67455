use std::sync::Arc;

use slotboard_common::{Appointment, AppointmentId, AppointmentStatus};
use tokio::task::JoinHandle;
use tracing::debug;

use super::coordinator::{MutationCoordinator, TransitionOutcome};
use super::status::StatusModel;
use crate::errors::{BoardError, DragError};

/// Where a drag currently is. Input-device agnostic: pointer, touch or
/// keyboard handlers all drive the same three states.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        appointment: Appointment,
        origin: AppointmentStatus,
    },
    Hovering {
        appointment: Appointment,
        origin: AppointmentStatus,
        column: AppointmentStatus,
    },
}

impl DragState {
    pub fn is_active(&self) -> bool {
        !matches!(self, DragState::Idle)
    }

    /// Id of the card being dragged.
    pub fn dragged(&self) -> Option<AppointmentId> {
        match self {
            DragState::Idle => None,
            DragState::Dragging { appointment, .. } | DragState::Hovering { appointment, .. } => {
                Some(appointment.id)
            }
        }
    }
}

/// What a release amounted to. Only `Moved` reaches the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropResolution {
    Moved {
        id: AppointmentId,
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    /// Dropped back on the column it came from.
    SameColumn { id: AppointmentId },
    /// Released over nothing that is a column.
    Outside { id: AppointmentId },
    NothingDragged,
}

impl DropResolution {
    /// Route a `Moved` drop to the coordinator on a background task. Every other
    /// resolution has no side effect and returns `None`.
    pub fn dispatch(
        self,
        coordinator: &Arc<MutationCoordinator>,
    ) -> Option<JoinHandle<Result<TransitionOutcome, BoardError>>> {
        let DropResolution::Moved { id, to, .. } = self else {
            return None;
        };
        let coordinator = coordinator.clone();
        Some(tokio::spawn(async move {
            coordinator.request_status_change(id, to).await
        }))
    }
}

/// Drag/drop state machine over board columns. One drag at a time.
#[derive(Debug, Clone, Default)]
pub struct DragDrop {
    model: StatusModel,
    state: DragState,
}

impl DragDrop {
    pub fn new(model: StatusModel) -> Self {
        Self {
            model,
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    /// Pick up `appointment` from its current column.
    pub fn start(&mut self, appointment: &Appointment) -> Result<(), DragError> {
        if let Some(active) = self.state.dragged() {
            return Err(DragError::AlreadyDragging { active });
        }
        self.state = DragState::Dragging {
            appointment: appointment.clone(),
            origin: appointment.status,
        };
        debug!(id = appointment.id, origin = %appointment.status, "Drag started");
        Ok(())
    }

    /// Pick up a card by id, as shown by `coordinator`.
    pub fn start_by_id(
        &mut self,
        coordinator: &MutationCoordinator,
        id: AppointmentId,
    ) -> Result<(), DragError> {
        let appointment = coordinator
            .get(id)
            .filter(|appt| self.model.is_visible_on_board(appt.status))
            .ok_or(DragError::UnknownAppointment { id })?;
        self.start(&appointment)
    }

    /// Pointer is over `column_id`. Anything that is not a visible column
    /// counts as leaving. Ignored while idle.
    pub fn hover(&mut self, column_id: &str) {
        let Some(column) = self.model.column_for(column_id) else {
            self.leave();
            return;
        };
        self.state = match std::mem::take(&mut self.state) {
            DragState::Idle => DragState::Idle,
            DragState::Dragging {
                appointment,
                origin,
            }
            | DragState::Hovering {
                appointment,
                origin,
                ..
            } => DragState::Hovering {
                appointment,
                origin,
                column,
            },
        };
    }

    /// Pointer left every column.
    pub fn leave(&mut self) {
        self.state = match std::mem::take(&mut self.state) {
            DragState::Hovering {
                appointment,
                origin,
                ..
            } => DragState::Dragging {
                appointment,
                origin,
            },
            other => other,
        };
    }

    /// Abort the drag. Returns whether one was active.
    pub fn cancel(&mut self) -> bool {
        let was_active = self.state.is_active();
        if let Some(id) = self.state.dragged() {
            debug!(id, "Drag cancelled");
        }
        self.state = DragState::Idle;
        was_active
    }

    /// Release the card. Always returns to idle.
    pub fn release(&mut self) -> DropResolution {
        let resolution = match std::mem::take(&mut self.state) {
            DragState::Idle => DropResolution::NothingDragged,
            DragState::Dragging { appointment, .. } => DropResolution::Outside { id: appointment.id },
            DragState::Hovering {
                appointment,
                origin,
                column,
            } if column == origin => DropResolution::SameColumn { id: appointment.id },
            DragState::Hovering {
                appointment,
                origin,
                column,
            } => DropResolution::Moved {
                id: appointment.id,
                from: origin,
                to: column,
            },
        };
        debug!(?resolution, "Drag released");
        resolution
    }
}
