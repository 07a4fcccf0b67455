use slotboard_common::AppointmentStatus;

/// Column order, board visibility and transition policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusModel {
    hide_waitlist: bool,
}

impl StatusModel {
    pub fn new(hide_waitlist: bool) -> Self {
        Self { hide_waitlist }
    }

    /// Every status in board order, `Cancelled` last.
    pub fn all_statuses(&self) -> &'static [AppointmentStatus] {
        &AppointmentStatus::ALL
    }

    /// `Cancelled` never gets a column; `Waitlist` only when not hidden.
    pub fn is_visible_on_board(&self, status: AppointmentStatus) -> bool {
        match status {
            AppointmentStatus::Cancelled => false,
            AppointmentStatus::Waitlist => !self.hide_waitlist,
            _ => true,
        }
    }

    /// Visible statuses, in board order.
    pub fn columns(&self) -> impl Iterator<Item = AppointmentStatus> + '_ {
        self.all_statuses()
            .iter()
            .copied()
            .filter(|status| self.is_visible_on_board(*status))
    }

    /// Any move to a different status is allowed, including out of `Done` and
    /// `Cancelled`: staff can always override the workflow by hand.
    pub fn can_transition(&self, from: AppointmentStatus, to: AppointmentStatus) -> bool {
        from != to
    }

    /// Resolve a drop-target column id (any casing) to a visible column.
    pub fn column_for(&self, column_id: &str) -> Option<AppointmentStatus> {
        column_id
            .parse::<AppointmentStatus>()
            .ok()
            .filter(|status| self.is_visible_on_board(*status))
    }
}
