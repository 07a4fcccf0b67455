use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
};
use serde::Deserialize;
use slotboard_common::{
    AppointmentId, AppointmentPatch, AppointmentStatus, LiveMessage, NewAppointment, NewService,
};
use tokio::sync::broadcast;
use tracing::{error, info};

use super::db::DbHandle;
use super::ws::broadcast_message;
use crate::errors::BackendError;

/// Largest page a list endpoint will return.
const MAX_PAGE: i64 = 500;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

impl ListParams {
    /// `(skip, limit)` with the limit capped at [`MAX_PAGE`].
    fn page(&self) -> Result<(i64, i64), BackendError> {
        if self.skip < 0 || self.limit < 0 {
            return Err(BackendError::BadRequest(
                "skip and limit must not be negative".into(),
            ));
        }
        Ok((self.skip, self.limit.min(MAX_PAGE)))
    }
}

/// Status arrives as free text so unknown values get a 400 naming them.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// ── Error handling ────────────────────────────────────────────────────

impl From<anyhow::Error> for BackendError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<BackendError>() {
            Ok(typed) => typed,
            Err(other) => BackendError::Database(other),
        }
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = match &self {
            BackendError::AppointmentNotFound { .. } | BackendError::ServiceNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            BackendError::InvalidStatus(_) | BackendError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BackendError::Database(e) => {
                error!(error = %e, "Backend request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/v1/appointments",
            get(list_appointments).post(create_appointment),
        )
        .route("/api/v1/appointments/{id}", patch(update_appointment))
        .route("/api/v1/appointments/{id}/status", patch(update_status))
        .route("/api/v1/services", get(list_services).post(create_service))
        .route("/api/v1/clients", get(list_clients))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_appointments(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, BackendError> {
    let (skip, limit) = params.page()?;
    let appointments = state
        .db
        .call(move |db| db.list_appointments(skip, limit))
        .await?;
    Ok(Json(appointments))
}

async fn create_appointment(
    State(state): State<SharedState>,
    Json(req): Json<NewAppointment>,
) -> Result<impl IntoResponse, BackendError> {
    let appointment = state
        .db
        .call(move |db| db.create_appointment(&req))
        .await?;
    info!(id = appointment.id, start = %appointment.start_time, "Appointment booked");
    broadcast_message(
        &state.ws_tx,
        &LiveMessage::AppointmentCreated {
            appointment: appointment.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(appointment)))
}

async fn update_status(
    State(state): State<SharedState>,
    Path(id): Path<AppointmentId>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, BackendError> {
    let status: AppointmentStatus = req
        .status
        .parse()
        .map_err(|_| BackendError::InvalidStatus(req.status.clone()))?;
    let (from_status, appointment) = state
        .db
        .call(move |db| db.update_status(id, status))
        .await?
        .ok_or(BackendError::AppointmentNotFound { id })?;
    info!(id, from = %from_status, to = %status, "Appointment status changed");
    broadcast_message(
        &state.ws_tx,
        &LiveMessage::AppointmentStatusChanged {
            appointment_id: id,
            from_status,
            to_status: status,
        },
    );
    Ok(Json(appointment))
}

async fn update_appointment(
    State(state): State<SharedState>,
    Path(id): Path<AppointmentId>,
    Json(patch): Json<AppointmentPatch>,
) -> Result<impl IntoResponse, BackendError> {
    let appointment = state
        .db
        .call(move |db| db.update_appointment(id, &patch))
        .await?
        .ok_or(BackendError::AppointmentNotFound { id })?;
    broadcast_message(
        &state.ws_tx,
        &LiveMessage::AppointmentUpdated {
            appointment: appointment.clone(),
        },
    );
    Ok(Json(appointment))
}

async fn list_services(State(state): State<SharedState>) -> Result<impl IntoResponse, BackendError> {
    let services = state.db.call(|db| db.list_services()).await?;
    Ok(Json(services))
}

/// Staff-facing client list, ordered by id.
async fn list_clients(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, BackendError> {
    let (skip, limit) = params.page()?;
    let clients = state
        .db
        .call(move |db| db.list_clients(skip, limit))
        .await?;
    Ok(Json(clients))
}

async fn create_service(
    State(state): State<SharedState>,
    Json(req): Json<NewService>,
) -> Result<impl IntoResponse, BackendError> {
    let service = state.db.call(move |db| db.create_service(&req)).await?;
    broadcast_message(
        &state.ws_tx,
        &LiveMessage::ServiceCreated {
            service: service.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(service)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::db::BoardDb;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        let db = BoardDb::new_in_memory().unwrap();
        let (ws_tx, _) = broadcast::channel(16);
        Arc::new(AppState {
            db: DbHandle::new(db),
            ws_tx,
        })
    }

    fn test_app(state: &SharedState) -> Router {
        api_router().with_state(state.clone())
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn seed_service(app: &Router) -> i64 {
        let (status, service) = send(
            app,
            "POST",
            "/api/v1/services",
            Some(json!({"name": "Haircut", "duration_minutes": 45, "base_price": 25.0})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        service["id"].as_i64().unwrap()
    }

    async fn book(app: &Router, service_id: i64, start: &str) -> Value {
        let (status, appt) = send(
            app,
            "POST",
            "/api/v1/appointments",
            Some(json!({
                "shop_id": 1,
                "service_id": service_id,
                "start_time": start,
                "client_name": "Ana",
                "client_phone": "+100",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{appt}");
        appt
    }

    #[tokio::test]
    async fn test_health_check() {
        let state = test_state();
        let response = test_app(&state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_list_appointments_empty() {
        let state = test_state();
        let (status, body) = send(&test_app(&state), "GET", "/api/v1/appointments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_booking_creates_new_appointment_and_broadcasts() {
        let state = test_state();
        let app = test_app(&state);
        let service_id = seed_service(&app).await;
        let mut rx = state.ws_tx.subscribe();

        let appt = book(&app, service_id, "2024-05-01T09:00:00Z").await;
        assert_eq!(appt["status"], "new");
        assert_eq!(appt["end_time"], "2024-05-01T09:45:00Z");

        let msg: LiveMessage = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert!(matches!(msg, LiveMessage::AppointmentCreated { .. }));
    }

    #[tokio::test]
    async fn test_booking_unknown_service_is_404() {
        let state = test_state();
        let (status, body) = send(
            &test_app(&state),
            "POST",
            "/api/v1/appointments",
            Some(json!({
                "shop_id": 1,
                "service_id": 9,
                "start_time": "2024-05-01T09:00:00Z",
                "client_name": "Ana",
                "client_phone": "+100",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Service 9 not found");
    }

    #[tokio::test]
    async fn test_status_update_is_case_insensitive_and_broadcasts() {
        let state = test_state();
        let app = test_app(&state);
        let service_id = seed_service(&app).await;
        let appt = book(&app, service_id, "2024-05-01T09:00:00Z").await;
        let id = appt["id"].as_i64().unwrap();
        let mut rx = state.ws_tx.subscribe();

        let (status, body) = send(
            &app,
            "PATCH",
            &format!("/api/v1/appointments/{id}/status"),
            Some(json!({"status": "IN_PROGRESS"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "in_progress");

        let msg: LiveMessage = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(
            msg,
            LiveMessage::AppointmentStatusChanged {
                appointment_id: id,
                from_status: AppointmentStatus::New,
                to_status: AppointmentStatus::InProgress,
            }
        );
    }

    #[tokio::test]
    async fn test_status_update_rejects_unknown_status() {
        let state = test_state();
        let app = test_app(&state);
        let service_id = seed_service(&app).await;
        let id = book(&app, service_id, "2024-05-01T09:00:00Z").await["id"]
            .as_i64()
            .unwrap();

        let (status, body) = send(
            &app,
            "PATCH",
            &format!("/api/v1/appointments/{id}/status"),
            Some(json!({"status": "archived"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid status 'archived'");
    }

    #[tokio::test]
    async fn test_status_update_missing_appointment_is_404() {
        let state = test_state();
        let (status, _) = send(
            &test_app(&state),
            "PATCH",
            "/api/v1/appointments/77/status",
            Some(json!({"status": "done"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_edit_moves_start_and_recomputes_end() {
        let state = test_state();
        let app = test_app(&state);
        let service_id = seed_service(&app).await;
        let id = book(&app, service_id, "2024-05-01T09:00:00Z").await["id"]
            .as_i64()
            .unwrap();

        let (status, body) = send(
            &app,
            "PATCH",
            &format!("/api/v1/appointments/{id}"),
            Some(json!({"start_time": "2024-05-01T14:00:00Z"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["start_time"], "2024-05-01T14:00:00Z");
        assert_eq!(body["end_time"], "2024-05-01T14:45:00Z");
        assert_eq!(body["status"], "new");
    }

    #[tokio::test]
    async fn test_list_is_ordered_and_paged() {
        let state = test_state();
        let app = test_app(&state);
        let service_id = seed_service(&app).await;
        book(&app, service_id, "2024-05-01T15:00:00Z").await;
        book(&app, service_id, "2024-05-01T08:00:00Z").await;
        book(&app, service_id, "2024-05-01T11:00:00Z").await;

        let (_, all) = send(&app, "GET", "/api/v1/appointments", None).await;
        let starts: Vec<_> = all
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["start_time"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            starts,
            vec![
                "2024-05-01T08:00:00Z",
                "2024-05-01T11:00:00Z",
                "2024-05-01T15:00:00Z"
            ]
        );

        let (_, page) = send(&app, "GET", "/api/v1/appointments?skip=2&limit=5", None).await;
        assert_eq!(page.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "GET", "/api/v1/appointments?skip=-1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_duration_is_rejected_and_db_stays_usable() {
        let state = test_state();
        let app = test_app(&state);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/services",
            Some(json!({"name": "Forever", "duration_minutes": 1_000_000_000_000i64})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

        // A row stored before the cap existed must not take the backend down.
        let legacy = state
            .db
            .call(|db| db.insert_service_unchecked("Legacy", 1_000_000_000_000))
            .await
            .unwrap();
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/appointments",
            Some(json!({
                "shop_id": 1,
                "service_id": legacy,
                "start_time": "2024-05-01T09:00:00Z",
                "client_name": "Ana",
                "client_phone": "+100",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(body["error"].as_str().unwrap().contains("out of range"));

        let service_id = seed_service(&app).await;
        let id = book(&app, service_id, "2024-05-01T09:00:00Z").await["id"]
            .as_i64()
            .unwrap();
        let (status, body) = send(
            &app,
            "PATCH",
            &format!("/api/v1/appointments/{id}"),
            Some(json!({"service_id": legacy})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

        let (status, appts) = send(&app, "GET", "/api/v1/appointments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(appts.as_array().unwrap().len(), 1);
        let (status, _) = send(&app, "GET", "/api/v1/services", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sub_second_start_time_is_kept() {
        let state = test_state();
        let app = test_app(&state);
        let service_id = seed_service(&app).await;

        let appt = book(&app, service_id, "2024-05-01T09:00:00.250Z").await;
        let start: chrono::DateTime<chrono::Utc> =
            serde_json::from_value(appt["start_time"].clone()).unwrap();
        let end: chrono::DateTime<chrono::Utc> =
            serde_json::from_value(appt["end_time"].clone()).unwrap();
        assert_eq!(start.timestamp_subsec_millis(), 250);
        assert_eq!(end - start, chrono::Duration::minutes(45));
    }

    #[tokio::test]
    async fn test_clients_listed_after_bookings() {
        let state = test_state();
        let app = test_app(&state);
        let (status, clients) = send(&app, "GET", "/api/v1/clients", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(clients, json!([]));

        let service_id = seed_service(&app).await;
        book(&app, service_id, "2024-05-01T09:00:00Z").await;
        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/appointments",
            Some(json!({
                "shop_id": 1,
                "service_id": service_id,
                "start_time": "2024-05-01T10:00:00Z",
                "client_name": "Ben",
                "client_phone": "+200",
                "client_telegram_id": 77,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, clients) = send(&app, "GET", "/api/v1/clients", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(clients[0]["full_name"], "Ana");
        assert_eq!(clients[0]["telegram_id"], Value::Null);
        assert_eq!(clients[1]["phone"], "+200");
        assert_eq!(clients[1]["telegram_id"], 77);

        let (_, page) = send(&app, "GET", "/api/v1/clients?skip=1&limit=10", None).await;
        assert_eq!(page.as_array().unwrap().len(), 1);
        let (status, _) = send(&app, "GET", "/api/v1/clients?limit=-5", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_services_roundtrip() {
        let state = test_state();
        let app = test_app(&state);
        seed_service(&app).await;

        let (status, services) = send(&app, "GET", "/api/v1/services", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(services[0]["name"], "Haircut");
        assert_eq!(services[0]["duration_minutes"], 45);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/services",
            Some(json!({"name": "Broken", "duration_minutes": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("duration_minutes"));
    }
}
