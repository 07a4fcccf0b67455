use serde::{Deserialize, Serialize};

/// A bookable service. `duration_minutes` decides an appointment's end time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub duration_minutes: i64,
    pub base_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewService {
    pub name: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub base_price: f64,
}

/// End customer. Identified by phone number when booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub full_name: String,
    pub phone: String,
    pub telegram_id: Option<i64>,
}
