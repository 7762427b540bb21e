//! Payloads of the resource endpoints
//!
//! Only the fields the client reads are modelled. Missing fields fall back
//! to their defaults and unknown ones are ignored, so additions on the
//! server side do not break decoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account behind the bearer token (`GET /user`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub fio: String,
    pub company: String,
    pub user_type: String,
    pub phone: Option<String>,
    pub is_email_confirmed: bool,
    pub mqtt_user: Option<MqttUser>,
}

/// Broker login the cloud issues for push updates.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttUser {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl fmt::Debug for MqttUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttUser")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A building and the devices placed in it (`GET /buildings`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Building {
    pub id: i64,
    pub title: String,
    pub address: String,
    pub time_zone: String,
    pub utc: i32,
    pub access: String,
    pub places_count: u32,
    pub places: Vec<Place>,
}

/// A device slot inside a building.
///
/// `state` is passed through undecoded; its shape depends on the device
/// type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Place {
    pub id: i64,
    pub serial: String,
    pub title: String,
    pub status: String,
    pub device_type: String,
    pub building_id: i64,
    pub online: bool,
    pub cur_temp: Option<f64>,
    pub state: Value,
}
