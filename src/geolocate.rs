//! Best-effort "where is this peer" lookup used to pick a spawn area.
//!
//! Failures never reach the player: any problem degrades to the fixed
//! spawn pool.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::geo::LatLng;
use crate::spawn::SpawnArea;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup {
    Found(LatLng),
    Degraded,
}

impl Lookup {
    pub fn spawn_area(self) -> SpawnArea {
        match self {
            Lookup::Found(center) => SpawnArea::Around(center),
            Lookup::Degraded => SpawnArea::Pool,
        }
    }
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn locate(&self, ip: IpAddr) -> Lookup;
}

pub struct NoGeolocation;

#[async_trait]
impl Geolocator for NoGeolocation {
    async fn locate(&self, _ip: IpAddr) -> Lookup {
        Lookup::Degraded
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("lookup rejected: {0}")]
    Rejected(String),
    #[error("invalid coordinate {lat},{lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

impl IpApiResponse {
    fn into_position(self) -> Result<LatLng, GeoError> {
        if self.status != "success" {
            return Err(GeoError::Rejected(
                self.message.unwrap_or_else(|| self.status.clone()),
            ));
        }
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            return Err(GeoError::Rejected("response without coordinates".to_string()));
        };
        let position = LatLng::new(lat, lon);
        if !position.is_valid() {
            return Err(GeoError::InvalidCoordinate { lat, lon });
        }
        Ok(position)
    }
}

/// Client for an ip-api.com style endpoint: `GET {base}/{ip}`.
pub struct IpApiGeolocator {
    client: reqwest::Client,
    base_url: String,
}

impl IpApiGeolocator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, ip: IpAddr) -> Result<LatLng, GeoError> {
        let url = format!("{}/{}", self.base_url, ip);
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<IpApiResponse>()
            .await?;
        response.into_position()
    }
}

#[async_trait]
impl Geolocator for IpApiGeolocator {
    async fn locate(&self, ip: IpAddr) -> Lookup {
        if !is_routable(ip) {
            debug!("{} is not a public address, using spawn pool", ip);
            return Lookup::Degraded;
        }
        match self.fetch(ip).await {
            Ok(position) => {
                debug!("located {} at {:.4},{:.4}", ip, position.lat, position.lng);
                Lookup::Found(position)
            }
            Err(err) => {
                warn!("geolocation for {} failed: {}", ip, err);
                Lookup::Degraded
            }
        }
    }
}

/// Whether a lookup for this address can say anything useful.
pub fn is_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                // 100.64.0.0/10, carrier-grade NAT
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64))
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_routable(IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80)
        }
    }
}

/// Resolves the spawn area for a peer, falling back to the pool.
pub async fn spawn_area_for(geolocator: &dyn Geolocator, ip: IpAddr) -> SpawnArea {
    geolocator.locate(ip).await.spawn_area()
}
