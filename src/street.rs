//! Advisory street snapping.
//!
//! The snapper may pull a point onto the nearest road, but it never blocks
//! anything: an off-street verdict or a failed lookup leaves the point as
//! the client reported it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::geo::{haversine, LatLng};

/// A snapped point farther than this from the query is considered off-street.
pub const ON_STREET_TOLERANCE_M: f64 = 25.0;
/// Rings searched around a spawn point that is not on a street.
pub const SPAWN_SEARCH_RADII_M: [f64; 5] = [50.0, 100.0, 200.0, 500.0, 1000.0];
/// North/east unit steps: N, NE, E, SE, S, SW, W, NW.
const COMPASS: [(f64, f64); 8] = [
    (1.0, 0.0),
    (1.0, 1.0),
    (0.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 0.0),
    (-1.0, -1.0),
    (0.0, -1.0),
    (1.0, -1.0),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Snap {
    OnStreet(LatLng),
    OffStreet,
    Degraded,
}

#[async_trait]
pub trait StreetSnapper: Send + Sync {
    async fn snap(&self, point: LatLng) -> Snap;
}

/// Used when no routing service is configured.
pub struct NoSnapping;

#[async_trait]
impl StreetSnapper for NoSnapping {
    async fn snap(&self, _point: LatLng) -> Snap {
        Snap::Degraded
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("routing service answered {0}")]
    Rejected(String),
}

#[derive(Debug, Deserialize)]
struct NearestResponse {
    code: String,
    #[serde(default)]
    waypoints: Vec<Waypoint>,
}

#[derive(Debug, Deserialize)]
struct Waypoint {
    /// `[lng, lat]`
    location: [f64; 2],
    #[serde(default)]
    distance: Option<f64>,
}

impl NearestResponse {
    fn verdict(self, query: LatLng) -> Result<Snap, SnapError> {
        if self.code != "Ok" {
            return Err(SnapError::Rejected(self.code));
        }
        let Some(waypoint) = self.waypoints.into_iter().next() else {
            return Ok(Snap::OffStreet);
        };
        let snapped = LatLng::new(waypoint.location[1], waypoint.location[0]);
        if !snapped.is_valid() {
            return Err(SnapError::Rejected("invalid waypoint".to_string()));
        }
        let distance = waypoint
            .distance
            .unwrap_or_else(|| haversine(&query, &snapped));
        if distance <= ON_STREET_TOLERANCE_M {
            Ok(Snap::OnStreet(snapped))
        } else {
            Ok(Snap::OffStreet)
        }
    }
}

/// Client for an OSRM `nearest` service.
pub struct OsrmSnapper {
    client: reqwest::Client,
    base_url: String,
}

impl OsrmSnapper {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SnapError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn nearest(&self, point: LatLng) -> Result<Snap, SnapError> {
        let url = format!(
            "{}/nearest/v1/driving/{},{}?number=1",
            self.base_url, point.lng, point.lat
        );
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .json::<NearestResponse>()
            .await?;
        response.verdict(point)
    }
}

#[async_trait]
impl StreetSnapper for OsrmSnapper {
    async fn snap(&self, point: LatLng) -> Snap {
        match self.nearest(point).await {
            Ok(snap) => snap,
            Err(err) => {
                warn!("street snapping failed, allowing point: {}", err);
                Snap::Degraded
            }
        }
    }
}

/// Where a movement should land: the snapped point when the snapper has
/// one, the reported point otherwise.
pub async fn advise_move(snapper: &dyn StreetSnapper, reported: LatLng) -> LatLng {
    match snapper.snap(reported).await {
        Snap::OnStreet(snapped) => snapped,
        Snap::OffStreet | Snap::Degraded => reported,
    }
}

/// Searches outward from a spawn point for the closest street. Returns
/// the spawn point itself when it is already on a street, when nothing
/// is found, or as soon as the snapper stops answering.
pub async fn find_nearest_street(snapper: &dyn StreetSnapper, spawn: LatLng) -> LatLng {
    match snapper.snap(spawn).await {
        Snap::OnStreet(_) | Snap::Degraded => return spawn,
        Snap::OffStreet => {}
    }

    for radius in SPAWN_SEARCH_RADII_M {
        for (north, east) in COMPASS {
            let probe = spawn.offset_meters(north * radius, east * radius);
            if !probe.is_valid() {
                continue;
            }
            match snapper.snap(probe).await {
                Snap::OnStreet(snapped) => {
                    debug!("found street {:.0}m from spawn", radius);
                    return snapped;
                }
                Snap::OffStreet => {}
                Snap::Degraded => return spawn,
            }
        }
    }

    debug!("no street near spawn {:.5},{:.5}", spawn.lat, spawn.lng);
    spawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Streets are everything north of `street_lat`; every query is logged.
    struct NorthOfLine {
        street_lat: f64,
        queries: Mutex<Vec<LatLng>>,
    }

    impl NorthOfLine {
        fn new(street_lat: f64) -> Self {
            Self {
                street_lat,
                queries: Mutex::new(Vec::new()),
            }
        }

        fn query_count(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StreetSnapper for NorthOfLine {
        async fn snap(&self, point: LatLng) -> Snap {
            self.queries.lock().unwrap().push(point);
            if point.lat >= self.street_lat {
                Snap::OnStreet(LatLng::new(point.lat, point.lng + 0.00001))
            } else {
                Snap::OffStreet
            }
        }
    }

    struct Broken;

    #[async_trait]
    impl StreetSnapper for Broken {
        async fn snap(&self, _point: LatLng) -> Snap {
            Snap::Degraded
        }
    }

    const SPAWN: LatLng = LatLng::new(51.5074, -0.1278);

    #[tokio::test]
    async fn moves_snap_only_when_on_street() {
        let snapper = NorthOfLine::new(SPAWN.lat);
        let on_street = advise_move(&snapper, SPAWN).await;
        assert_eq!(on_street, LatLng::new(SPAWN.lat, SPAWN.lng + 0.00001));

        let south = LatLng::new(SPAWN.lat - 0.001, SPAWN.lng);
        assert_eq!(advise_move(&snapper, south).await, south);
    }

    #[tokio::test]
    async fn failing_snapper_never_blocks_movement() {
        assert_eq!(advise_move(&Broken, SPAWN).await, SPAWN);
        assert_eq!(advise_move(&NoSnapping, SPAWN).await, SPAWN);
        assert_eq!(find_nearest_street(&Broken, SPAWN).await, SPAWN);
    }

    #[tokio::test]
    async fn spawn_on_street_is_kept() {
        let snapper = NorthOfLine::new(SPAWN.lat - 1.0);
        assert_eq!(find_nearest_street(&snapper, SPAWN).await, SPAWN);
        assert_eq!(snapper.query_count(), 1);
    }

    #[tokio::test]
    async fn search_takes_the_first_ring_that_reaches_a_street() {
        // A street 150m north: the 50m and 100m rings miss, 200m north hits.
        let street_lat = SPAWN.offset_meters(150.0, 0.0).lat;
        let snapper = NorthOfLine::new(street_lat);
        let found = find_nearest_street(&snapper, SPAWN).await;
        assert!(found.lat >= street_lat);
        assert!((haversine(&SPAWN, &found) - 200.0).abs() < 5.0);
        // Spawn itself, two full rings, then the first probe of the third.
        assert_eq!(snapper.query_count(), 1 + 8 + 8 + 1);
    }

    #[tokio::test]
    async fn search_gives_up_after_the_last_ring() {
        let snapper = NorthOfLine::new(SPAWN.lat + 1.0);
        assert_eq!(find_nearest_street(&snapper, SPAWN).await, SPAWN);
        assert_eq!(snapper.query_count(), 1 + 8 * SPAWN_SEARCH_RADII_M.len());
    }

    #[tokio::test]
    async fn unreachable_routing_service_degrades() {
        let snapper = OsrmSnapper::new("http://127.0.0.1:9/", Duration::from_millis(200)).unwrap();
        assert_eq!(snapper.snap(SPAWN).await, Snap::Degraded);
    }

    #[test]
    fn nearest_response_verdicts() {
        let near: NearestResponse = serde_json::from_str(
            r#"{"code":"Ok","waypoints":[{"location":[-0.12785,51.50741],"distance":3.2,"name":"Strand"}]}"#,
        )
        .unwrap();
        assert_eq!(
            near.verdict(SPAWN).unwrap(),
            Snap::OnStreet(LatLng::new(51.50741, -0.12785))
        );

        let far: NearestResponse = serde_json::from_str(
            r#"{"code":"Ok","waypoints":[{"location":[-0.1290,51.5080],"distance":120.0}]}"#,
        )
        .unwrap();
        assert_eq!(far.verdict(SPAWN).unwrap(), Snap::OffStreet);

        let empty: NearestResponse = serde_json::from_str(r#"{"code":"Ok"}"#).unwrap();
        assert_eq!(empty.verdict(SPAWN).unwrap(), Snap::OffStreet);

        let rejected: NearestResponse =
            serde_json::from_str(r#"{"code":"InvalidQuery","message":"bad"}"#).unwrap();
        assert!(matches!(rejected.verdict(SPAWN), Err(SnapError::Rejected(_))));
    }
}
