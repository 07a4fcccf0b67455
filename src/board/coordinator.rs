use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use slotboard_common::{
    Appointment, AppointmentId, AppointmentPatch, AppointmentStatus, NewAppointment,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::status::StatusModel;
use super::store::{AppointmentStore, BoardColumn};
use crate::errors::{ApiError, BoardError};

/// Backend operations the board consumes.
/// Real implementation: `client::HttpBoardApi`. Test double: `ScriptedApi`.
#[async_trait]
pub trait BoardApi: Send + Sync {
    async fn fetch_appointments(&self) -> Result<Vec<Appointment>, ApiError>;

    /// `Ok(Some(record))` when the backend answers with the authoritative record.
    async fn patch_status(
        &self,
        id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, ApiError>;

    async fn patch_appointment(
        &self,
        id: AppointmentId,
        patch: &AppointmentPatch,
    ) -> Result<Appointment, ApiError>;

    async fn create_appointment(&self, booking: &NewAppointment) -> Result<Appointment, ApiError>;
}

/// Non-error results of [`MutationCoordinator::request_status_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Same status, or disallowed by policy. Nothing was sent.
    NoOp,
    /// The backend accepted; the store holds `status`.
    Confirmed { status: AppointmentStatus },
    /// A later request for the same appointment was issued before this one
    /// resolved, so this result was ignored.
    Superseded,
}

/// The newest outstanding status request for one appointment.
#[derive(Debug, Clone, Copy)]
struct Pending {
    seq: u64,
    previous: AppointmentStatus,
    target: AppointmentStatus,
}

/// Status an appointment settled on, and when. A refetch issued before
/// `tick` cannot know about it.
#[derive(Debug, Clone, Copy)]
struct Settled {
    tick: u64,
    status: AppointmentStatus,
}

struct BoardState {
    store: AppointmentStore,
    pending: HashMap<AppointmentId, Pending>,
    settled: HashMap<AppointmentId, Settled>,
    clock: u64,
    newest_refresh: u64,
}

impl BoardState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Merge a server snapshot fetched at `issued` into the store.
    ///
    /// Appointments with a request in flight keep their optimistic status, as
    /// do those that settled after the snapshot was requested. Snapshots older
    /// than one already applied are discarded.
    fn apply_snapshot(&mut self, issued: u64, appointments: Vec<Appointment>) -> bool {
        if issued < self.newest_refresh {
            debug!(issued, newest = self.newest_refresh, "Discarding stale snapshot");
            return false;
        }
        self.newest_refresh = issued;

        let merged: Vec<Appointment> = appointments
            .into_iter()
            .map(|mut appt| {
                if let Some(pending) = self.pending.get(&appt.id) {
                    appt.status = pending.target;
                } else if let Some(settled) = self.settled.get(&appt.id)
                    && settled.tick > issued
                {
                    appt.status = settled.status;
                }
                appt
            })
            .collect();
        self.store.replace_all(merged);
        self.settled.retain(|_, settled| settled.tick > issued);
        true
    }
}

/// Owns the appointment store and turns intended status changes into
/// optimistic apply → request → reconcile.
///
/// The state lock is never held across an `.await`, so every store write is
/// atomic with respect to the other event sources.
pub struct MutationCoordinator {
    api: Arc<dyn BoardApi>,
    state: Mutex<BoardState>,
}

impl MutationCoordinator {
    pub fn new(api: Arc<dyn BoardApi>, model: StatusModel) -> Self {
        Self {
            api,
            state: Mutex::new(BoardState {
                store: AppointmentStore::new(model),
                pending: HashMap::new(),
                settled: HashMap::new(),
                clock: 0,
                newest_refresh: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn model(&self) -> StatusModel {
        self.lock().store.model()
    }

    pub fn columns(&self) -> Vec<BoardColumn> {
        self.lock().store.columns()
    }

    pub fn get(&self, id: AppointmentId) -> Option<Appointment> {
        self.lock().store.get(id).cloned()
    }

    pub fn is_pending(&self, id: AppointmentId) -> bool {
        self.lock().pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Store change notifications.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.lock().store.subscribe()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Merge appointments delivered outside [`refresh`](Self::refresh), e.g.
    /// an initial snapshot. Follows the same merge rules as a refetch.
    pub fn load_snapshot(&self, appointments: Vec<Appointment>) {
        let mut state = self.lock();
        let issued = state.tick();
        state.apply_snapshot(issued, appointments);
    }

    /// Refetch everything and merge it into the store.
    ///
    /// Returns `Ok(false)` when a refetch issued later has already been
    /// applied and this one was discarded.
    pub async fn refresh(&self) -> Result<bool, BoardError> {
        let issued = self.lock().tick();
        let appointments = self
            .api
            .fetch_appointments()
            .await
            .map_err(BoardError::RefreshFailed)?;
        let count = appointments.len();
        let applied = self.lock().apply_snapshot(issued, appointments);
        if applied {
            debug!(count, "Board refreshed");
        }
        Ok(applied)
    }

    /// Move appointment `id` to `to`.
    ///
    /// The store shows `to` as soon as this is polled. When the backend
    /// rejects, the store goes back to the status the appointment had right
    /// before this call and `TransitionRejected` is returned. If another
    /// request for the same id is issued before this one resolves, this
    /// result is ignored (`Superseded`).
    pub async fn request_status_change(
        &self,
        id: AppointmentId,
        to: AppointmentStatus,
    ) -> Result<TransitionOutcome, BoardError> {
        let (seq, from) = {
            let mut state = self.lock();
            let current = match state.store.get(id) {
                Some(appt) => appt.status,
                None => return Err(BoardError::NotFound { id }),
            };
            if !state.store.model().can_transition(current, to) {
                debug!(id, status = %to, "Ignoring no-op transition");
                return Ok(TransitionOutcome::NoOp);
            }
            let seq = state.tick();
            state.pending.insert(
                id,
                Pending {
                    seq,
                    previous: current,
                    target: to,
                },
            );
            state.store.apply_status_change(id, to);
            (seq, current)
        };
        debug!(id, %from, %to, seq, "Optimistic status change applied");

        let result = self.api.patch_status(id, to).await;

        let mut state = self.lock();
        if state.pending.get(&id).map(|p| p.seq) != Some(seq) {
            debug!(id, seq, ok = result.is_ok(), "Ignoring superseded status response");
            return Ok(TransitionOutcome::Superseded);
        }
        state.pending.remove(&id);
        let tick = state.tick();

        match result {
            Ok(record) => {
                let status = match record {
                    Some(record) if record.status != to => {
                        info!(id, requested = %to, actual = %record.status, "Backend chose a different status");
                        state.store.apply_status_change(id, record.status);
                        record.status
                    }
                    _ => to,
                };
                state.settled.insert(id, Settled { tick, status });
                Ok(TransitionOutcome::Confirmed { status })
            }
            Err(reason) => {
                state.store.apply_status_change(id, from);
                state.settled.insert(id, Settled { tick, status: from });
                warn!(id, %from, %to, code = reason.code(), error = %reason, "Status change rejected, rolled back");
                Err(BoardError::TransitionRejected {
                    id,
                    from,
                    to,
                    reason,
                })
            }
        }
    }

    /// Edit service and/or start time. Applied as an atomic replace: the
    /// board refetches once the backend accepts.
    pub async fn update_appointment(
        &self,
        id: AppointmentId,
        patch: AppointmentPatch,
    ) -> Result<Appointment, BoardError> {
        if self.get(id).is_none() {
            return Err(BoardError::NotFound { id });
        }
        let updated = self
            .api
            .patch_appointment(id, &patch)
            .await
            .map_err(|source| BoardError::EditFailed { id, source })?;
        if let Err(e) = self.refresh().await {
            warn!(id, error = %e, "Refresh after edit failed");
        }
        Ok(updated)
    }

    /// Create an appointment (booking surface or manual entry), then refetch.
    pub async fn book(&self, booking: NewAppointment) -> Result<Appointment, BoardError> {
        let created = self
            .api
            .create_appointment(&booking)
            .await
            .map_err(BoardError::BookingFailed)?;
        info!(id = created.id, start = %created.start_time, "Appointment booked");
        if let Err(e) = self.refresh().await {
            warn!(id = created.id, error = %e, "Refresh after booking failed");
        }
        Ok(created)
    }

    /// Refetch on every invalidation until the sender goes away. Bursts of
    /// invalidations that arrive during a refetch coalesce into one more.
    pub async fn follow(self: Arc<Self>, mut invalidations: watch::Receiver<u64>) {
        while invalidations.changed().await.is_ok() {
            invalidations.borrow_and_update();
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Refresh after live update failed");
            }
        }
        debug!("Invalidation source closed");
    }
}
