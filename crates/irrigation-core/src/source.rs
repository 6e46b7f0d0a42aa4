//! Historical data source
//!
//! The engine only needs a bounded, optionally time-filtered list of
//! readings. [`HttpSource`] talks to the ingestion service's query
//! endpoint; [`StaticSource`] serves readings held in memory.

use crate::error::{EngineError, Result};
use crate::models::RawReading;
use chrono::{DateTime, NaiveDateTime};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Path of the ingestion service's query endpoint
const QUERY_PATH: &str = "dados/consulta";

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Trait for historical reading providers
pub trait HistoricalSource: Send + Sync {
    /// Fetch up to `limit` readings, only those at or after `since` when given
    fn fetch(&self, limit: usize, since: Option<NaiveDateTime>) -> Result<Vec<RawReading>>;
}

/// Nutrient flag as stored upstream: `0/1`, boolean, or text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Flag {
    pub fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Number(n) => *n != 0.0,
            Flag::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "sim"),
        }
    }
}

/// Wire shape of one record returned by the ingestion service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(rename = "HUMIDITY", default)]
    pub humidity: Option<f64>,
    #[serde(rename = "TEMPERATURE", default)]
    pub temperature: Option<f64>,
    #[serde(rename = "PH", default)]
    pub ph: Option<f64>,
    #[serde(rename = "FOSFORO_PRESENTE", default)]
    pub phosphorus_present: Option<Flag>,
    #[serde(rename = "POTASSIO_PRESENTE", default)]
    pub potassium_present: Option<Flag>,
    #[serde(rename = "BOMBA_STATUS", default)]
    pub pump_status: Option<String>,
    #[serde(rename = "DATA_COLETA", default)]
    pub collected_at: Option<String>,
}

impl TryFrom<SourceRecord> for RawReading {
    type Error = EngineError;

    fn try_from(record: SourceRecord) -> Result<Self> {
        let pump_on = record.pump_status.as_deref().map(is_pump_on).unwrap_or(false);
        RawReading::new(
            record.humidity.unwrap_or(0.0),
            record.temperature.unwrap_or(0.0),
            record.ph.unwrap_or(0.0),
            record.phosphorus_present.as_ref().map(Flag::is_set).unwrap_or(false),
            record.potassium_present.as_ref().map(Flag::is_set).unwrap_or(false),
            pump_on,
            record.collected_at.as_deref().and_then(parse_timestamp),
        )
    }
}

/// `ON` or `LIGADA`, case-insensitive
pub fn is_pump_on(status: &str) -> bool {
    let status = status.trim();
    status.eq_ignore_ascii_case("ON") || status.eq_ignore_ascii_case("LIGADA")
}

/// Parse the collection timestamp formats seen upstream; `None` if unrecognized
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    DateTime::parse_from_rfc2822(raw).ok().map(|dt| dt.naive_local())
}

/// Convert wire records, skipping the ones that fail validation
pub fn readings_from_records(records: Vec<SourceRecord>) -> Vec<RawReading> {
    let total = records.len();
    let readings: Vec<RawReading> = records
        .into_iter()
        .filter_map(|record| match RawReading::try_from(record) {
            Ok(reading) => Some(reading),
            Err(e) => {
                debug!(error = %e, "Skipping invalid source record");
                None
            }
        })
        .collect();
    if readings.len() < total {
        warn!(
            skipped = total - readings.len(),
            total = total,
            "Dropped source records that failed validation"
        );
    }
    readings
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    dados: Vec<SourceRecord>,
}

/// Source backed by the ingestion service's HTTP API
pub struct HttpSource {
    client: Client,
    base_url: Url,
}

impl HttpSource {
    /// Create a new source; `timeout` of `None` blocks until the server answers
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Source(format!("failed to create HTTP client: {}", e)))?;

        let mut base_url = Url::parse(base_url)
            .map_err(|e| EngineError::Source(format!("invalid data source URL {}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| EngineError::Source(format!("invalid path {}: {}", path, e)))
    }
}

impl HistoricalSource for HttpSource {
    fn fetch(&self, limit: usize, since: Option<NaiveDateTime>) -> Result<Vec<RawReading>> {
        let url = self.endpoint(QUERY_PATH)?;
        let mut params = vec![("limite", limit.to_string())];
        if let Some(since) = since {
            params.push(("data_inicio", since.format("%Y-%m-%dT%H:%M:%S").to_string()));
        }

        debug!(url = %url, limit = limit, since = ?since, "Fetching historical readings");

        let response = self
            .client
            .get(url)
            .query(&params)
            .send()
            .map_err(|e| EngineError::Source(format!("failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(EngineError::Source(format!("API error ({}): {}", status, body)));
        }

        let body: QueryResponse = response
            .json()
            .map_err(|e| EngineError::Source(format!("failed to parse response: {}", e)))?;

        let mut readings = readings_from_records(body.dados);
        readings.truncate(limit);
        Ok(readings)
    }
}

/// Source over readings already in memory
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    readings: Vec<RawReading>,
}

impl StaticSource {
    pub fn new(readings: Vec<RawReading>) -> Self {
        Self { readings }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

impl HistoricalSource for StaticSource {
    fn fetch(&self, limit: usize, since: Option<NaiveDateTime>) -> Result<Vec<RawReading>> {
        Ok(self
            .readings
            .iter()
            .filter(|r| match since {
                Some(since) => r.timestamp.map(|t| t >= since).unwrap_or(false),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
