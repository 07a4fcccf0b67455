use serde::{Deserialize, Serialize};

use crate::appointment::{Appointment, AppointmentId, AppointmentStatus};
use crate::catalog::Service;

/// Push message broadcast by the backend after every mutation.
///
/// Boards treat any decodable frame as "refetch now"; the typed payload is
/// there for consumers that want finer-grained handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LiveMessage {
    AppointmentCreated {
        appointment: Appointment,
    },
    AppointmentUpdated {
        appointment: Appointment,
    },
    AppointmentStatusChanged {
        appointment_id: AppointmentId,
        from_status: AppointmentStatus,
        to_status: AppointmentStatus,
    },
    ServiceCreated {
        service: Service,
    },
}

impl LiveMessage {
    /// Appointment the message is about, if any.
    pub fn appointment_id(&self) -> Option<AppointmentId> {
        match self {
            Self::AppointmentCreated { appointment } | Self::AppointmentUpdated { appointment } => {
                Some(appointment.id)
            }
            Self::AppointmentStatusChanged { appointment_id, .. } => Some(*appointment_id),
            Self::ServiceCreated { .. } => None,
        }
    }
}
