use std::collections::HashMap;

use serde::Serialize;
use slotboard_common::{Appointment, AppointmentId, AppointmentStatus};
use tokio::sync::watch;

use super::status::StatusModel;

/// One board column: every visible appointment in `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardColumn {
    pub status: AppointmentStatus,
    pub appointments: Vec<Appointment>,
}

/// Local cache of appointments keyed by id.
///
/// Only [`replace_all`](Self::replace_all) and
/// [`apply_status_change`](Self::apply_status_change) write; every write bumps
/// the version seen by [`subscribe`](Self::subscribe) receivers. The column
/// grouping is derived on each read.
#[derive(Debug)]
pub struct AppointmentStore {
    model: StatusModel,
    records: HashMap<AppointmentId, Appointment>,
    version: watch::Sender<u64>,
}

impl AppointmentStore {
    pub fn new(model: StatusModel) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            model,
            records: HashMap::new(),
            version,
        }
    }

    pub fn model(&self) -> StatusModel {
        self.model
    }

    /// Replace the whole cache. Later duplicates of an id win.
    pub fn replace_all<I>(&mut self, appointments: I)
    where
        I: IntoIterator<Item = Appointment>,
    {
        self.records = appointments
            .into_iter()
            .map(|appt| (appt.id, appt))
            .collect();
        self.bump();
    }

    /// Set the status of `id`. Returns `false` (and changes nothing) when the
    /// id is not cached, e.g. because a refetch already dropped it.
    pub fn apply_status_change(&mut self, id: AppointmentId, status: AppointmentStatus) -> bool {
        match self.records.get_mut(&id) {
            Some(appt) => {
                appt.status = status;
                self.bump();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: AppointmentId) -> Option<&Appointment> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Visible columns in board order, each sorted by start time then id.
    pub fn columns(&self) -> Vec<BoardColumn> {
        let mut columns: Vec<BoardColumn> = self
            .model
            .columns()
            .map(|status| BoardColumn {
                status,
                appointments: Vec::new(),
            })
            .collect();

        for appt in self.records.values() {
            if let Some(column) = columns.iter_mut().find(|c| c.status == appt.status) {
                column.appointments.push(appt.clone());
            }
        }
        for column in &mut columns {
            column
                .appointments
                .sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        }
        columns
    }

    /// Change notifications; the value is a write counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use AppointmentStatus::*;

    pub(crate) fn appt(id: AppointmentId, status: AppointmentStatus) -> Appointment {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::hours(id);
        Appointment {
            id,
            shop_id: 1,
            service_id: 1,
            client_id: id,
            start_time: start,
            end_time: start + Duration::minutes(45),
            status,
        }
    }

    fn ids(column: &BoardColumn) -> Vec<AppointmentId> {
        column.appointments.iter().map(|a| a.id).collect()
    }

    #[test]
    fn test_replace_all_groups_visible_members_in_board_order() {
        let mut store = AppointmentStore::new(StatusModel::default());
        store.replace_all(vec![
            appt(1, New),
            appt(2, Cancelled),
            appt(3, Done),
            appt(4, Waitlist),
            appt(5, New),
        ]);

        let columns = store.columns();
        let statuses: Vec<_> = columns.iter().map(|c| c.status).collect();
        assert_eq!(statuses, vec![Waitlist, New, Confirmed, InProgress, Done]);
        assert_eq!(ids(&columns[0]), vec![4]);
        assert_eq!(ids(&columns[1]), vec![1, 5]);
        assert!(columns[2].appointments.is_empty());
        assert_eq!(ids(&columns[4]), vec![3]);

        let shown: usize = columns.iter().map(|c| c.appointments.len()).sum();
        assert_eq!(shown, 4);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_replace_all_drops_stale_entries() {
        let mut store = AppointmentStore::new(StatusModel::default());
        store.replace_all(vec![appt(1, New), appt(2, New)]);
        store.replace_all(vec![appt(2, Confirmed)]);

        assert!(store.get(1).is_none());
        assert_eq!(store.get(2).map(|a| a.status), Some(Confirmed));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_columns_sorted_by_start_time() {
        let mut store = AppointmentStore::new(StatusModel::default());
        let mut early = appt(9, New);
        early.start_time = appt(1, New).start_time - Duration::hours(2);
        early.end_time = early.start_time + Duration::minutes(30);
        store.replace_all(vec![appt(3, New), early, appt(1, New)]);

        assert_eq!(ids(&store.columns()[1]), vec![9, 1, 3]);
    }

    #[test]
    fn test_apply_status_change_updates_present_record() {
        let mut store = AppointmentStore::new(StatusModel::default());
        store.replace_all(vec![appt(1, New)]);

        assert!(store.apply_status_change(1, InProgress));
        assert_eq!(store.get(1).map(|a| a.status), Some(InProgress));
        assert_eq!(ids(&store.columns()[3]), vec![1]);
    }

    #[test]
    fn test_apply_status_change_absent_is_noop() {
        let mut store = AppointmentStore::new(StatusModel::default());
        store.replace_all(vec![appt(1, New)]);
        let before = store.version();

        assert!(!store.apply_status_change(42, Done));
        assert_eq!(store.version(), before);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_cancelled_leaves_board_but_stays_cached() {
        let mut store = AppointmentStore::new(StatusModel::default());
        store.replace_all(vec![appt(1, Confirmed)]);
        store.apply_status_change(1, Cancelled);

        assert!(store.columns().iter().all(|c| c.appointments.is_empty()));
        assert_eq!(store.get(1).map(|a| a.status), Some(Cancelled));
    }

    #[test]
    fn test_hidden_waitlist_not_grouped() {
        let mut store = AppointmentStore::new(StatusModel::new(true));
        store.replace_all(vec![appt(1, Waitlist), appt(2, New)]);

        let columns = store.columns();
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].status, New);
        assert_eq!(ids(&columns[0]), vec![2]);
    }

    #[tokio::test]
    async fn test_subscribers_see_every_write() {
        let mut store = AppointmentStore::new(StatusModel::default());
        let mut rx = store.subscribe();

        store.replace_all(vec![appt(1, New)]);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);

        store.apply_status_change(1, Done);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 2);
    }
}
