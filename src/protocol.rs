//! JSON frames exchanged over the WebSocket.
//!
//! Every frame is `{"event": <name>, "data": <payload>}` with camelCase
//! names, matching what the browser client listens for.

use serde::{Deserialize, Serialize};

use crate::geo::LatLng;
use crate::roster::{deserialize_character, Character};
use crate::spawn::SpawnArea;

pub type SessionId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSession {
    pub id: SessionId,
    pub position: LatLng,
    pub health: u32,
    pub kills: u32,
    pub is_dead: bool,
    #[serde(deserialize_with = "deserialize_character")]
    pub character: &'static Character,
    #[serde(skip)]
    pub spawn_area: SpawnArea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Welcome {
        id: SessionId,
    },
    ExistingPlayers(Vec<PlayerSession>),
    PlayerJoined(PlayerSession),
    PlayerMoved {
        id: SessionId,
        position: LatLng,
    },
    PlayerShot {
        shooter_id: SessionId,
        target_id: SessionId,
        damage: u32,
    },
    PlayerEliminated {
        player_id: SessionId,
        killer_id: SessionId,
    },
    PlayerRespawned {
        player_id: SessionId,
        position: LatLng,
    },
    PlayerLeft(SessionId),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Welcome { .. } => "welcome",
            ServerEvent::ExistingPlayers(_) => "existingPlayers",
            ServerEvent::PlayerJoined(_) => "playerJoined",
            ServerEvent::PlayerMoved { .. } => "playerMoved",
            ServerEvent::PlayerShot { .. } => "playerShot",
            ServerEvent::PlayerEliminated { .. } => "playerEliminated",
            ServerEvent::PlayerRespawned { .. } => "playerRespawned",
            ServerEvent::PlayerLeft(_) => "playerLeft",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    UpdatePosition(LatLng),
    Shoot { target_id: SessionId },
    Respawn {},
}
