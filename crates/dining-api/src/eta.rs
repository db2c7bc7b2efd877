/// Walking and biking ETAs to every dining hall via a distance-matrix API.
///
/// One origin, all halls as destinations, two requests (walking, bicycling) issued together.
/// The API guarantees `rows[0].elements[i]` describes `destinations[i]`, so the merge is by
/// position against the configured hall list, never by name.
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::model::{Coordinate, EtaResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Hall {
    pub name: String,
    pub location: Coordinate,
}

impl Hall {
    pub fn new(name: &str, lat: f64, lon: f64) -> Self {
        Self {
            name: name.to_string(),
            location: Coordinate::new(lat, lon),
        }
    }
}

/// The campus halls, in the order results are reported.
pub fn default_halls() -> Vec<Hall> {
    vec![
        Hall::new("Arrillaga Family Dining Commons", 37.4254899164213, -122.164203213491),
        Hall::new("Branner Dining", 37.4258450648514, -122.1627032657454),
        Hall::new("Florence Moore Dining", 37.42226212615886, -122.17179705029382),
        Hall::new("Lakeside Dining", 37.42467330589694, -122.17633688795281),
        Hall::new("Ricker Dining", 37.425480437342756, -122.18052942714579),
        Hall::new("Stern Dining", 37.424536020889356, -122.1656459941451),
        Hall::new("Wilbur Dining", 37.42401672059748, -122.16311743032858),
    ]
}

#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("matrix_http_{0}")]
    Http(u16),

    #[error("matrix_invalid_response")]
    InvalidResponse,

    /// Built with the URL stripped, since the query string carries the API key.
    #[error("matrix_request_failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy)]
enum TravelMode {
    Walking,
    Bicycling,
}

impl TravelMode {
    fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
        }
    }
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Default, Deserialize)]
struct MatrixElement {
    #[serde(default)]
    status: String,
    distance: Option<MatrixValue>,
    duration: Option<MatrixValue>,
}

#[derive(Debug, Deserialize)]
struct MatrixValue {
    value: Option<f64>,
}

impl MatrixElement {
    fn is_ok(&self) -> bool {
        self.status == "OK"
    }

    fn kilometers(&self) -> Option<f64> {
        let meters = self.distance.as_ref()?.value?;
        self.is_ok().then(|| round_to(meters / 1000.0, 2))
    }

    fn minutes(&self) -> Option<f64> {
        let seconds = self.duration.as_ref()?.value?;
        self.is_ok().then(|| round_to(seconds / 60.0, 1))
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub struct DistanceMatrixClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    halls: Vec<Hall>,
}

impl DistanceMatrixClient {
    pub fn new(base_url: &str, api_key: Option<String>, halls: Vec<Hall>) -> Result<Self, MatrixError> {
        let http = reqwest::Client::builder()
            .user_agent("dining-api/etas")
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            api_key,
            halls,
        })
    }

    pub fn halls(&self) -> &[Hall] {
        &self.halls
    }

    /// One `EtaResult` per configured hall, in hall order.
    ///
    /// Both modes are awaited before anything is assembled; a failure of either fails the call.
    pub async fn compute_etas(&self, origin: Coordinate) -> Result<Vec<EtaResult>, AppError> {
        let api_key = self.api_key.as_deref().ok_or(AppError::MissingApiKey)?;

        let (walking, biking) = tokio::join!(
            self.fetch_elements(origin, TravelMode::Walking, api_key),
            self.fetch_elements(origin, TravelMode::Bicycling, api_key),
        );
        let walking = walking?;
        let biking = biking?;

        let results = self
            .halls
            .iter()
            .enumerate()
            .map(|(index, hall)| {
                let walk = walking.get(index);
                let bike = biking.get(index);
                EtaResult {
                    hall_name: hall.name.clone(),
                    distance_km: walk
                        .and_then(MatrixElement::kilometers)
                        .or_else(|| bike.and_then(MatrixElement::kilometers)),
                    walk_minutes: walk.and_then(MatrixElement::minutes),
                    bike_minutes: bike.and_then(MatrixElement::minutes),
                }
            })
            .collect();
        Ok(results)
    }

    async fn fetch_elements(
        &self,
        origin: Coordinate,
        mode: TravelMode,
        api_key: &str,
    ) -> Result<Vec<MatrixElement>, MatrixError> {
        let destinations = self
            .halls
            .iter()
            .map(|h| h.location.to_query_value())
            .collect::<Vec<_>>()
            .join("|");

        let resp = self
            .http
            .get(&self.base_url)
            .query(&[
                ("origins", origin.to_query_value().as_str()),
                ("destinations", destinations.as_str()),
                ("mode", mode.as_str()),
                ("key", api_key),
            ])
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .inspect_err(|e| warn!(error = %e, mode = mode.as_str(), "distance matrix request failed"))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), mode = mode.as_str(), "distance matrix returned error status");
            return Err(MatrixError::Http(status.as_u16()));
        }

        let bytes = resp.bytes().await.map_err(reqwest::Error::without_url)?;
        let parsed: MatrixResponse = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(error = %e, mode = mode.as_str(), "distance matrix body is not the expected JSON");
            MatrixError::InvalidResponse
        })?;
        if parsed.status != "OK" {
            warn!(status = %parsed.status, mode = mode.as_str(), "distance matrix top-level status not OK");
            return Err(MatrixError::InvalidResponse);
        }
        let row = parsed
            .rows
            .into_iter()
            .next()
            .ok_or(MatrixError::InvalidResponse)?;
        debug!(mode = mode.as_str(), elements = row.elements.len(), "distance matrix row received");
        Ok(row.elements)
    }
}
