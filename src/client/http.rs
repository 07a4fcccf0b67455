use async_trait::async_trait;
use reqwest::Response;
use serde::de::DeserializeOwned;
use slotboard_common::{
    Appointment, AppointmentId, AppointmentPatch, AppointmentStatus, Client, NewAppointment,
    NewService, Service, StatusPatch,
};
use tracing::{debug, warn};

use crate::board::BoardApi;
use crate::errors::ApiError;

/// Page size when listing appointments; matches the backend's default limit.
const PAGE_SIZE: usize = 100;

/// `BoardApi` over the backend's JSON HTTP interface.
#[derive(Debug, Clone)]
pub struct HttpBoardApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBoardApi {
    /// `base_url` includes the API prefix, e.g. `http://127.0.0.1:8000/api/v1`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn list_services(&self) -> Result<Vec<Service>, ApiError> {
        let resp = self
            .client
            .get(self.url("services"))
            .send()
            .await
            .map_err(transport)?;
        decode(resp).await
    }

    pub async fn create_service(&self, service: &NewService) -> Result<Service, ApiError> {
        let resp = self
            .client
            .post(self.url("services"))
            .json(service)
            .send()
            .await
            .map_err(transport)?;
        decode(resp).await
    }

    /// One page of the staff client list, ordered by id.
    pub async fn list_clients(&self, skip: usize, limit: usize) -> Result<Vec<Client>, ApiError> {
        let resp = self
            .client
            .get(self.url("clients"))
            .query(&[("skip", skip.to_string()), ("limit", limit.to_string())])
            .send()
            .await
            .map_err(transport)?;
        decode(resp).await
    }
}

#[async_trait]
impl BoardApi for HttpBoardApi {
    async fn fetch_appointments(&self) -> Result<Vec<Appointment>, ApiError> {
        let url = self.url("appointments");
        let mut all = Vec::new();
        let mut skip = 0usize;

        loop {
            let resp = self
                .client
                .get(&url)
                .query(&[("skip", skip.to_string()), ("limit", PAGE_SIZE.to_string())])
                .send()
                .await
                .map_err(transport)?;
            let page: Vec<Appointment> = decode(resp).await?;
            let count = page.len();
            all.extend(page);
            if count < PAGE_SIZE {
                break;
            }
            skip += count;
        }

        Ok(keep_valid_spans(all))
    }

    async fn patch_status(
        &self,
        id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, ApiError> {
        let resp = self
            .client
            .patch(self.url(&format!("appointments/{id}/status")))
            .json(&StatusPatch { status })
            .send()
            .await
            .map_err(transport)?;
        let record: Appointment = decode(resp).await?;
        debug!(id, status = %record.status, "Status patch accepted");
        Ok(Some(record))
    }

    async fn patch_appointment(
        &self,
        id: AppointmentId,
        patch: &AppointmentPatch,
    ) -> Result<Appointment, ApiError> {
        let resp = self
            .client
            .patch(self.url(&format!("appointments/{id}")))
            .json(patch)
            .send()
            .await
            .map_err(transport)?;
        decode(resp).await
    }

    async fn create_appointment(&self, booking: &NewAppointment) -> Result<Appointment, ApiError> {
        let resp = self
            .client
            .post(self.url("appointments"))
            .json(booking)
            .send()
            .await
            .map_err(transport)?;
        decode(resp).await
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}

/// Parse a success body, or classify the failure by status code.
async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(|e| ApiError::Unexpected {
            status: status.as_u16(),
            message: format!("Failed to parse response body: {e}"),
        });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::from_status(status.as_u16(), error_message(&body)))
}

/// The backend answers errors with `{"error": "..."}`; anything else is
/// passed through as text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn keep_valid_spans(appointments: Vec<Appointment>) -> Vec<Appointment> {
    appointments
        .into_iter()
        .filter(|appt| {
            let valid = appt.has_valid_span();
            if !valid {
                warn!(id = appt.id, start = %appt.start_time, end = %appt.end_time, "Dropping appointment with end before start");
            }
            valid
        })
        .collect()
}
