use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::{HeaderMap, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broadcast::ClientHub;
use crate::config::Config;
use crate::game::Game;
use crate::geo::LatLng;
use crate::geolocate::{spawn_area_for, Geolocator, IpApiGeolocator, NoGeolocation};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::spawn::{Dice, SeededDice, ThreadDice};
use crate::street::{advise_move, find_nearest_street, NoSnapping, OsrmSnapper, StreetSnapper};
use crate::AppResult;

/// Everything guarded by the one lock: the game and the queues it talks to.
pub struct Hub {
    pub game: Game,
    pub clients: ClientHub,
}

#[derive(Clone)]
pub struct AppState {
    hub: Arc<RwLock<Hub>>,
    geolocator: Arc<dyn Geolocator>,
    snapper: Arc<dyn StreetSnapper>,
}

impl AppState {
    pub fn new(
        game: Game,
        geolocator: Arc<dyn Geolocator>,
        snapper: Arc<dyn StreetSnapper>,
    ) -> Self {
        Self {
            hub: Arc::new(RwLock::new(Hub {
                game,
                clients: ClientHub::new(),
            })),
            geolocator,
            snapper,
        }
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let dice: Box<dyn Dice> = match config.spawn_seed {
            Some(seed) => Box::new(SeededDice::new(seed)),
            None => Box::new(ThreadDice),
        };
        let geolocator: Arc<dyn Geolocator> = match &config.geolocation_url {
            Some(url) => Arc::new(IpApiGeolocator::new(url, config.geolocation_timeout)?),
            None => Arc::new(NoGeolocation),
        };
        let snapper: Arc<dyn StreetSnapper> = match &config.snap_url {
            Some(url) => Arc::new(OsrmSnapper::new(url, config.snap_timeout)?),
            None => Arc::new(NoSnapping),
        };
        Ok(Self::new(Game::new(config.rules, dice), geolocator, snapper))
    }

    pub fn hub(&self) -> &Arc<RwLock<Hub>> {
        &self.hub
    }
}

pub fn router(app_state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .fallback_service(
            ServeDir::new(&config.static_dir).append_index_html_on_directories(true),
        )
        .layer(cors_layer(&config.allowed_origin))
        .with_state(app_state)
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST]);
    if allowed_origin == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(allowed_origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(err) => {
            warn!("ALLOWED_ORIGIN {:?} is unusable ({}), no origin allowed", allowed_origin, err);
            layer
        }
    }
}

#[derive(Serialize)]
struct StatusResponse {
    players: usize,
}

async fn status_handler(State(app_state): State<AppState>) -> Json<StatusResponse> {
    let hub = app_state.hub.read().await;
    Json(StatusResponse {
        players: hub.game.len(),
    })
}

async fn ws_handler(
    State(app_state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let ip = client_ip(&headers, peer);
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, ip))
}

/// The first `X-Forwarded-For` hop when a proxy supplied one, else the peer.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
        .unwrap_or_else(|| peer.ip())
}

async fn handle_socket(socket: WebSocket, app_state: AppState, ip: IpAddr) {
    let sid = Uuid::new_v4().to_string();
    let (mut socket_sender, mut socket_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!("serialize {} failed: {}", event.name(), err);
                    continue;
                }
            };
            if socket_sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    join(&app_state, &sid, ip, tx).await;

    while let Some(Ok(msg)) = socket_receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(&app_state, &sid, event).await,
                Err(err) => debug!("ignoring frame from {}: {}", sid, err),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    leave(&app_state, &sid).await;
    let _ = send_task.await;
}

/// Registers the connection's queue and creates its session in one step,
/// so nothing reaches the queue ahead of the snapshot.
pub async fn join(
    app_state: &AppState,
    sid: &str,
    ip: IpAddr,
    sender: mpsc::UnboundedSender<ServerEvent>,
) -> LatLng {
    let area = spawn_area_for(app_state.geolocator.as_ref(), ip).await;
    let spawn = {
        let mut guard = app_state.hub.write().await;
        let hub = &mut *guard;
        hub.clients.register(sid.to_string(), sender);
        hub.game.connect(sid.to_string(), area, &hub.clients).position
    };
    settle_spawn_later(app_state.clone(), sid.to_string(), spawn);
    spawn
}

pub async fn leave(app_state: &AppState, sid: &str) {
    let mut guard = app_state.hub.write().await;
    let hub = &mut *guard;
    hub.clients.unregister(sid);
    hub.game.disconnect(sid, &hub.clients);
}

pub async fn handle_client_event(app_state: &AppState, sid: &str, event: ClientEvent) {
    match event {
        ClientEvent::UpdatePosition(reported) => {
            let position = advise_move(app_state.snapper.as_ref(), reported).await;
            let mut guard = app_state.hub.write().await;
            let hub = &mut *guard;
            hub.game.update_position(sid, position, &hub.clients);
        }
        ClientEvent::Shoot { target_id } => {
            let mut guard = app_state.hub.write().await;
            let hub = &mut *guard;
            hub.game.shoot(sid, &target_id, &hub.clients);
        }
        ClientEvent::Respawn {} => {
            let respawned = {
                let mut guard = app_state.hub.write().await;
                let hub = &mut *guard;
                hub.game.respawn(sid, &hub.clients)
            };
            if let Some(spawn) = respawned {
                settle_spawn_later(app_state.clone(), sid.to_string(), spawn);
            }
        }
    }
}

fn settle_spawn_later(app_state: AppState, sid: String, spawn: LatLng) {
    tokio::spawn(async move {
        let street = find_nearest_street(app_state.snapper.as_ref(), spawn).await;
        if street == spawn {
            return;
        }
        let mut guard = app_state.hub.write().await;
        let hub = &mut *guard;
        hub.game.settle_spawn(&sid, spawn, street, &hub.clients);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{CombatRules, MAX_HEALTH};
    use crate::geolocate::Lookup;
    use crate::spawn::{FixedDice, SpawnArea, SPAWN_POOL};
    use crate::street::Snap;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedLocation(LatLng);

    #[async_trait]
    impl Geolocator for FixedLocation {
        async fn locate(&self, _ip: IpAddr) -> Lookup {
            Lookup::Found(self.0)
        }
    }

    /// Only points at or north of `street_lat` are on a street.
    struct StreetNorthOf(f64);

    #[async_trait]
    impl StreetSnapper for StreetNorthOf {
        async fn snap(&self, point: LatLng) -> Snap {
            if point.lat >= self.0 {
                Snap::OnStreet(point)
            } else {
                Snap::OffStreet
            }
        }
    }

    fn app(geolocator: Arc<dyn Geolocator>, snapper: Arc<dyn StreetSnapper>) -> AppState {
        let game = Game::new(CombatRules::default(), Box::new(FixedDice::new(0)));
        AppState::new(game, geolocator, snapper)
    }

    fn local() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn forwarded_for_wins_over_peer() {
        let peer: SocketAddr = "10.0.0.2:5123".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer), peer.ip());

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_ip(&headers, peer), "203.0.113.9".parse::<IpAddr>().unwrap());

        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage"));
        assert_eq!(client_ip(&headers, peer), peer.ip());
    }

    #[tokio::test]
    async fn join_battle_and_leave_over_queues() {
        let app_state = app(Arc::new(NoGeolocation), Arc::new(NoSnapping));
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        join(&app_state, "a", local(), tx_a).await;
        join(&app_state, "b", local(), tx_b).await;

        let names: Vec<&str> = drain(&mut rx_a).iter().map(ServerEvent::name).collect();
        assert_eq!(names, ["welcome", "existingPlayers", "playerJoined"]);
        let names: Vec<&str> = drain(&mut rx_b).iter().map(ServerEvent::name).collect();
        assert_eq!(names, ["welcome", "existingPlayers"]);

        for _ in 0..4 {
            handle_client_event(
                &app_state,
                "a",
                ClientEvent::Shoot {
                    target_id: "b".into(),
                },
            )
            .await;
        }
        let events = drain(&mut rx_b);
        assert_eq!(events.len(), 5);
        assert_eq!(
            events[4],
            ServerEvent::PlayerEliminated {
                player_id: "b".into(),
                killer_id: "a".into()
            }
        );
        assert_eq!(drain(&mut rx_a), events);

        handle_client_event(&app_state, "b", ClientEvent::Respawn {}).await;
        assert_eq!(
            drain(&mut rx_a),
            vec![ServerEvent::PlayerRespawned {
                player_id: "b".into(),
                position: SPAWN_POOL[0]
            }]
        );
        {
            let hub = app_state.hub().read().await;
            assert_eq!(hub.game.get("b").map(|b| b.health), Some(MAX_HEALTH));
        }

        leave(&app_state, "b").await;
        assert_eq!(drain(&mut rx_a), vec![ServerEvent::PlayerLeft("b".into())]);
        handle_client_event(
            &app_state,
            "a",
            ClientEvent::Shoot {
                target_id: "b".into(),
            },
        )
        .await;
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(app_state.hub().read().await.clients.len(), 1);
    }

    #[tokio::test]
    async fn geolocated_players_spawn_around_their_location() {
        let home = LatLng::new(35.6762, 139.6503);
        let app_state = app(Arc::new(FixedLocation(home)), Arc::new(NoSnapping));
        let (tx, _rx) = mpsc::unbounded_channel();
        let spawn = join(&app_state, "a", "8.8.8.8".parse().unwrap(), tx).await;
        assert_eq!(spawn, home);
        let hub = app_state.hub().read().await;
        assert_eq!(
            hub.game.get("a").map(|a| a.spawn_area),
            Some(SpawnArea::Around(home))
        );
    }

    #[tokio::test]
    async fn movement_is_snapped_when_on_street_and_kept_otherwise() {
        let street_lat = SPAWN_POOL[0].lat;
        let app_state = app(Arc::new(NoGeolocation), Arc::new(StreetNorthOf(street_lat)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        join(&app_state, "a", local(), tx).await;
        drain(&mut rx);

        let south = LatLng::new(street_lat - 0.001, SPAWN_POOL[0].lng);
        handle_client_event(&app_state, "a", ClientEvent::UpdatePosition(south)).await;
        assert_eq!(
            drain(&mut rx),
            vec![ServerEvent::PlayerMoved {
                id: "a".into(),
                position: south
            }]
        );
    }

    #[tokio::test]
    async fn off_street_spawn_is_settled_in_the_background() {
        // The street runs 40m north of every pool spawn.
        let street_lat = SPAWN_POOL[0].offset_meters(40.0, 0.0).lat;
        let app_state = app(Arc::new(NoGeolocation), Arc::new(StreetNorthOf(street_lat)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let spawn = join(&app_state, "a", local(), tx).await;
        assert_eq!(spawn, SPAWN_POOL[0]);

        let mut settled = None;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            if let ServerEvent::PlayerMoved { position, .. } = event {
                settled = Some(position);
                break;
            }
        }
        let settled = settled.expect("spawn was never settled");
        assert!(settled.lat >= street_lat);
        assert_eq!(settled, SPAWN_POOL[0].offset_meters(50.0, 0.0));
    }
}
