use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use slotboard_common::{
    Appointment, AppointmentId, AppointmentPatch, AppointmentStatus, Client, NewAppointment,
    NewService, Service,
};

use crate::errors::BackendError;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct BoardDb {
    conn: Connection,
}

/// Longest bookable service: one day.
pub const MAX_SERVICE_MINUTES: i64 = 24 * 60;

/// Timestamps are stored as fixed-width nanosecond RFC 3339 in UTC, so text
/// order is time order and nothing is lost on the way back.
fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// `start + duration_minutes`, or `BadRequest` when the result is not
/// representable.
fn end_time_for(start: DateTime<Utc>, duration_minutes: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_minutes(duration_minutes)
        .and_then(|duration| start.checked_add_signed(duration))
        .ok_or_else(|| {
            BackendError::BadRequest(format!(
                "start_time {} plus {} minutes is out of range",
                start, duration_minutes
            ))
            .into()
        })
}

fn decode_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid stored timestamp '{}'", text))
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS services (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    duration_minutes INTEGER NOT NULL,
                    base_price REAL NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS clients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    full_name TEXT NOT NULL,
                    phone TEXT NOT NULL UNIQUE,
                    telegram_id INTEGER
                );

                CREATE TABLE IF NOT EXISTS appointments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    shop_id INTEGER NOT NULL,
                    service_id INTEGER NOT NULL REFERENCES services(id),
                    client_id INTEGER NOT NULL REFERENCES clients(id),
                    start_time TEXT NOT NULL,
                    end_time TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'new'
                );

                CREATE INDEX IF NOT EXISTS idx_appointments_start ON appointments(start_time);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Services ─────────────────────────────────────────────────────

    pub fn create_service(&self, service: &NewService) -> Result<Service> {
        if !(1..=MAX_SERVICE_MINUTES).contains(&service.duration_minutes) {
            return Err(BackendError::BadRequest(format!(
                "duration_minutes must be between 1 and {}, got {}",
                MAX_SERVICE_MINUTES, service.duration_minutes
            ))
            .into());
        }
        self.conn
            .execute(
                "INSERT INTO services (name, duration_minutes, base_price) VALUES (?1, ?2, ?3)",
                params![service.name, service.duration_minutes, service.base_price],
            )
            .context("Failed to insert service")?;
        let id = self.conn.last_insert_rowid();
        self.get_service(id)?.context("Service not found after insert")
    }

    pub fn get_service(&self, id: i64) -> Result<Option<Service>> {
        self.conn
            .query_row(
                "SELECT id, name, duration_minutes, base_price FROM services WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Service {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        duration_minutes: row.get(2)?,
                        base_price: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to query service")
    }

    pub fn list_services(&self) -> Result<Vec<Service>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, duration_minutes, base_price FROM services ORDER BY id")
            .context("Failed to prepare list_services")?;
        let services = stmt
            .query_map([], |row| {
                Ok(Service {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    duration_minutes: row.get(2)?,
                    base_price: row.get(3)?,
                })
            })
            .context("Failed to query services")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read service row")?;
        Ok(services)
    }

    fn require_service(&self, id: i64) -> Result<Service> {
        self.get_service(id)?
            .ok_or_else(|| BackendError::ServiceNotFound { id }.into())
    }

    // ── Clients ──────────────────────────────────────────────────────

    pub fn get_client(&self, id: i64) -> Result<Option<Client>> {
        self.conn
            .query_row(
                "SELECT id, full_name, phone, telegram_id FROM clients WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Client {
                        id: row.get(0)?,
                        full_name: row.get(1)?,
                        phone: row.get(2)?,
                        telegram_id: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to query client")
    }

    pub fn list_clients(&self, skip: i64, limit: i64) -> Result<Vec<Client>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, full_name, phone, telegram_id FROM clients
                 ORDER BY id LIMIT ?1 OFFSET ?2",
            )
            .context("Failed to prepare list_clients")?;
        let clients = stmt
            .query_map(params![limit, skip], |row| {
                Ok(Client {
                    id: row.get(0)?,
                    full_name: row.get(1)?,
                    phone: row.get(2)?,
                    telegram_id: row.get(3)?,
                })
            })
            .context("Failed to query clients")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read client row")?;
        Ok(clients)
    }

    /// Clients are identified by phone number. An existing client keeps its
    /// name; a missing telegram id is filled in.
    pub fn find_or_create_client(
        &self,
        full_name: &str,
        phone: &str,
        telegram_id: Option<i64>,
    ) -> Result<Client> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM clients WHERE phone = ?1",
                params![phone],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up client")?;

        let id = match existing {
            Some(id) => {
                if let Some(telegram_id) = telegram_id {
                    self.conn
                        .execute(
                            "UPDATE clients SET telegram_id = ?1 WHERE id = ?2 AND telegram_id IS NULL",
                            params![telegram_id, id],
                        )
                        .context("Failed to update client telegram id")?;
                }
                id
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO clients (full_name, phone, telegram_id) VALUES (?1, ?2, ?3)",
                        params![full_name, phone, telegram_id],
                    )
                    .context("Failed to insert client")?;
                self.conn.last_insert_rowid()
            }
        };
        self.get_client(id)?.context("Client not found after upsert")
    }

    // ── Appointments ─────────────────────────────────────────────────

    /// Book an appointment: resolve the service, find or create the client,
    /// derive the end time from the service duration. Starts as `New`.
    pub fn create_appointment(&self, booking: &NewAppointment) -> Result<Appointment> {
        if booking.client_phone.trim().is_empty() {
            return Err(BackendError::BadRequest("client_phone is required".into()).into());
        }
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin booking transaction")?;

        let service = self.require_service(booking.service_id)?;
        let client = self.find_or_create_client(
            &booking.client_name,
            booking.client_phone.trim(),
            booking.client_telegram_id,
        )?;
        let end_time = end_time_for(booking.start_time, service.duration_minutes)?;

        self.conn
            .execute(
                "INSERT INTO appointments (shop_id, service_id, client_id, start_time, end_time, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    booking.shop_id,
                    service.id,
                    client.id,
                    encode_time(&booking.start_time),
                    encode_time(&end_time),
                    AppointmentStatus::New.as_str(),
                ],
            )
            .context("Failed to insert appointment")?;
        let id = self.conn.last_insert_rowid();
        tx.commit().context("Failed to commit booking")?;

        self.get_appointment(id)?
            .context("Appointment not found after insert")
    }

    pub fn get_appointment(&self, id: AppointmentId) -> Result<Option<Appointment>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, shop_id, service_id, client_id, start_time, end_time, status
                 FROM appointments WHERE id = ?1",
                params![id],
                AppointmentRow::from_row,
            )
            .optional()
            .context("Failed to query appointment")?;
        row.map(AppointmentRow::into_appointment).transpose()
    }

    /// Appointments ordered by start time.
    pub fn list_appointments(&self, skip: i64, limit: i64) -> Result<Vec<Appointment>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, shop_id, service_id, client_id, start_time, end_time, status
                 FROM appointments ORDER BY start_time, id LIMIT ?1 OFFSET ?2",
            )
            .context("Failed to prepare list_appointments")?;
        let rows = stmt
            .query_map(params![limit, skip], AppointmentRow::from_row)
            .context("Failed to query appointments")?;
        rows.map(|row| {
            row.context("Failed to read appointment row")?
                .into_appointment()
        })
        .collect()
    }

    /// Set the status. Returns the previous status with the updated record, or
    /// `None` when the id does not exist.
    pub fn update_status(
        &self,
        id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<Option<(AppointmentStatus, Appointment)>> {
        let Some(current) = self.get_appointment(id)? else {
            return Ok(None);
        };
        self.conn
            .execute(
                "UPDATE appointments SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update appointment status")?;
        let updated = self
            .get_appointment(id)?
            .context("Appointment not found after status update")?;
        Ok(Some((current.status, updated)))
    }

    /// Change service and/or start time. The end time is recomputed from the
    /// (possibly new) service's duration.
    pub fn update_appointment(
        &self,
        id: AppointmentId,
        patch: &AppointmentPatch,
    ) -> Result<Option<Appointment>> {
        let Some(current) = self.get_appointment(id)? else {
            return Ok(None);
        };
        let service = self.require_service(patch.service_id.unwrap_or(current.service_id))?;
        let start_time = patch.start_time.unwrap_or(current.start_time);
        let end_time = end_time_for(start_time, service.duration_minutes)?;

        self.conn
            .execute(
                "UPDATE appointments SET service_id = ?1, start_time = ?2, end_time = ?3 WHERE id = ?4",
                params![
                    service.id,
                    encode_time(&start_time),
                    encode_time(&end_time),
                    id
                ],
            )
            .context("Failed to update appointment")?;
        self.get_appointment(id)
    }
}

struct AppointmentRow {
    id: i64,
    shop_id: i64,
    service_id: i64,
    client_id: i64,
    start_time: String,
    end_time: String,
    status: String,
}

impl AppointmentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            shop_id: row.get(1)?,
            service_id: row.get(2)?,
            client_id: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            status: row.get(6)?,
        })
    }

    fn into_appointment(self) -> Result<Appointment> {
        let status = self
            .status
            .parse::<AppointmentStatus>()
            .context("Failed to parse appointment status")?;
        Ok(Appointment {
            id: self.id,
            shop_id: self.shop_id,
            service_id: self.service_id,
            client_id: self.client_id,
            start_time: decode_time(&self.start_time)?,
            end_time: decode_time(&self.end_time)?,
            status,
        })
    }
}

#[cfg(test)]
impl BoardDb {
    /// Insert a service row without validation, as an older schema might
    /// have stored it.
    pub(crate) fn insert_service_unchecked(&self, name: &str, duration_minutes: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO services (name, duration_minutes, base_price) VALUES (?1, ?2, 0)",
            params![name, duration_minutes],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}
