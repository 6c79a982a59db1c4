//! Client-side replica of the server state, fed by the same events the
//! browser receives. It also answers the fight-mode question "who can I
//! shoot right now".

use std::collections::HashMap;

use crate::game::MAX_HEALTH;
use crate::geo::haversine;
use crate::protocol::{PlayerSession, ServerEvent, SessionId};

#[derive(Debug, Default)]
pub struct ClientMirror {
    self_id: Option<SessionId>,
    players: HashMap<SessionId, PlayerSession>,
}

impl ClientMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Welcome { id } => {
                self.self_id = Some(id.clone());
            }
            ServerEvent::ExistingPlayers(players) => {
                self.players = players
                    .iter()
                    .map(|player| (player.id.clone(), player.clone()))
                    .collect();
            }
            ServerEvent::PlayerJoined(player) => {
                self.players.insert(player.id.clone(), player.clone());
            }
            ServerEvent::PlayerMoved { id, position } => {
                if let Some(player) = self.players.get_mut(id) {
                    player.position = *position;
                }
            }
            ServerEvent::PlayerShot {
                target_id, damage, ..
            } => {
                if let Some(target) = self.players.get_mut(target_id) {
                    target.health = target.health.saturating_sub(*damage);
                    target.is_dead = target.health == 0;
                }
            }
            ServerEvent::PlayerEliminated {
                player_id,
                killer_id,
            } => {
                if let Some(victim) = self.players.get_mut(player_id) {
                    victim.health = 0;
                    victim.is_dead = true;
                }
                if let Some(killer) = self.players.get_mut(killer_id) {
                    killer.kills += 1;
                }
            }
            ServerEvent::PlayerRespawned {
                player_id,
                position,
            } => {
                if let Some(player) = self.players.get_mut(player_id) {
                    player.position = *position;
                    player.health = MAX_HEALTH;
                    player.is_dead = false;
                }
            }
            ServerEvent::PlayerLeft(id) => {
                self.players.remove(id);
            }
        }
    }

    pub fn self_id(&self) -> Option<&str> {
        self.self_id.as_deref()
    }

    pub fn me(&self) -> Option<&PlayerSession> {
        self.self_id.as_ref().and_then(|id| self.players.get(id))
    }

    pub fn player(&self, id: &str) -> Option<&PlayerSession> {
        self.players.get(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Living opponents within `range_m`, closest first.
    pub fn targets_in_range(&self, range_m: f64) -> Vec<&PlayerSession> {
        let Some(me) = self.me() else {
            return Vec::new();
        };
        let mut targets: Vec<(f64, &PlayerSession)> = self
            .players
            .values()
            .filter(|player| player.id != me.id && !player.is_dead)
            .map(|player| (haversine(&me.position, &player.position), player))
            .filter(|(distance, _)| *distance <= range_m)
            .collect();
        targets.sort_by(|a, b| a.0.total_cmp(&b.0));
        targets.into_iter().map(|(_, player)| player).collect()
    }

    pub fn can_shoot(&self, range_m: f64) -> bool {
        self.me().is_some_and(|me| !me.is_dead) && !self.targets_in_range(range_m).is_empty()
    }

    pub fn can_respawn(&self) -> bool {
        self.me().is_some_and(|me| me.is_dead)
    }
}
