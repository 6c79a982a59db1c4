//! Authoritative game state: one [`PlayerSession`] per live connection.
//!
//! Every operation runs to completion against `&mut Game` and reports its
//! deltas through a [`Broadcaster`], so the store can be driven without a
//! transport. Invalid requests (unknown ids, dead players, targets out of
//! range) are silent no-ops.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::geo::{haversine, LatLng};
use crate::protocol::{PlayerSession, ServerEvent, SessionId};
use crate::spawn::{pick_character, pick_spawn, Dice, SpawnArea};

pub const MAX_HEALTH: u32 = 100;
pub const SHOT_DAMAGE: u32 = 25;
pub const SHOT_RANGE_M: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatRules {
    pub damage: u32,
    pub range_m: f64,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            damage: SHOT_DAMAGE,
            range_m: SHOT_RANGE_M,
        }
    }
}

impl CombatRules {
    /// Range is inclusive: a target exactly `range_m` away can be hit.
    pub fn reaches(&self, distance: f64) -> bool {
        distance <= self.range_m
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShotOutcome {
    Ignored,
    OutOfRange { distance: f64 },
    Hit { distance: f64, remaining: u32 },
    Eliminated { distance: f64 },
}

pub struct Game {
    sessions: HashMap<SessionId, PlayerSession>,
    rules: CombatRules,
    dice: Box<dyn Dice>,
}

impl Game {
    pub fn new(rules: CombatRules, dice: Box<dyn Dice>) -> Self {
        Self {
            sessions: HashMap::new(),
            rules,
            dice,
        }
    }

    pub fn rules(&self) -> CombatRules {
        self.rules
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PlayerSession> {
        self.sessions.get(id)
    }

    pub fn snapshot(&self) -> Vec<PlayerSession> {
        self.sessions.values().cloned().collect()
    }

    /// Creates the session for a new connection. The newcomer gets its id
    /// and the full snapshot (itself included) before anyone else hears
    /// about it.
    pub fn connect(
        &mut self,
        id: SessionId,
        area: SpawnArea,
        out: &dyn Broadcaster,
    ) -> &PlayerSession {
        let session = PlayerSession {
            id: id.clone(),
            position: pick_spawn(self.dice.as_ref(), area),
            health: MAX_HEALTH,
            kills: 0,
            is_dead: false,
            character: pick_character(self.dice.as_ref()),
            spawn_area: area,
        };
        let joined = ServerEvent::PlayerJoined(session.clone());
        if self.sessions.insert(id.clone(), session).is_some() {
            warn!("session {} connected twice, replacing it", id);
        }

        out.send_to(&id, &ServerEvent::Welcome { id: id.clone() });
        out.send_to(&id, &ServerEvent::ExistingPlayers(self.snapshot()));
        out.publish(&joined, Some(&id));

        let session = &self.sessions[&id];
        info!(
            "player {} joined as {} at {:.5},{:.5} ({} online)",
            id,
            session.character.name,
            session.position.lat,
            session.position.lng,
            self.sessions.len()
        );
        session
    }

    pub fn disconnect(&mut self, id: &str, out: &dyn Broadcaster) -> bool {
        if self.sessions.remove(id).is_none() {
            return false;
        }
        out.publish(&ServerEvent::PlayerLeft(id.to_string()), None);
        info!("player {} left ({} online)", id, self.sessions.len());
        true
    }

    /// Trusts the client-reported position; the echo includes the sender.
    pub fn update_position(&mut self, id: &str, position: LatLng, out: &dyn Broadcaster) -> bool {
        if !position.is_valid() {
            debug!("dropping invalid position from {}: {:?}", id, position);
            return false;
        }
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        session.position = position;
        out.publish(
            &ServerEvent::PlayerMoved {
                id: id.to_string(),
                position,
            },
            None,
        );
        true
    }

    pub fn shoot(&mut self, shooter_id: &str, target_id: &str, out: &dyn Broadcaster) -> ShotOutcome {
        if shooter_id == target_id {
            return ShotOutcome::Ignored;
        }
        let (Some(shooter), Some(target)) =
            (self.sessions.get(shooter_id), self.sessions.get(target_id))
        else {
            return ShotOutcome::Ignored;
        };
        if shooter.is_dead || target.is_dead || target.health == 0 {
            return ShotOutcome::Ignored;
        }

        let distance = haversine(&shooter.position, &target.position);
        if !self.rules.reaches(distance) {
            debug!(
                "{} missed {}: {:.1}m is beyond {:.1}m",
                shooter_id, target_id, distance, self.rules.range_m
            );
            return ShotOutcome::OutOfRange { distance };
        }

        let damage = self.rules.damage;
        let Some(target) = self.sessions.get_mut(target_id) else {
            return ShotOutcome::Ignored;
        };
        target.health = target.health.saturating_sub(damage);
        target.is_dead = target.health == 0;
        let remaining = target.health;

        out.publish(
            &ServerEvent::PlayerShot {
                shooter_id: shooter_id.to_string(),
                target_id: target_id.to_string(),
                damage,
            },
            None,
        );

        if remaining > 0 {
            debug!("{} hit {} ({} hp left)", shooter_id, target_id, remaining);
            return ShotOutcome::Hit {
                distance,
                remaining,
            };
        }

        if let Some(shooter) = self.sessions.get_mut(shooter_id) {
            shooter.kills += 1;
        }
        out.publish(
            &ServerEvent::PlayerEliminated {
                player_id: target_id.to_string(),
                killer_id: shooter_id.to_string(),
            },
            None,
        );
        info!("{} eliminated {}", shooter_id, target_id);
        ShotOutcome::Eliminated { distance }
    }

    /// Brings a dead session back at a fresh spawn point. Alive sessions
    /// are left alone so respawn can't be used to teleport.
    pub fn respawn(&mut self, id: &str, out: &dyn Broadcaster) -> Option<LatLng> {
        let session = self.sessions.get_mut(id)?;
        if !session.is_dead {
            return None;
        }
        let position = pick_spawn(self.dice.as_ref(), session.spawn_area);
        session.position = position;
        session.health = MAX_HEALTH;
        session.is_dead = false;

        out.publish(
            &ServerEvent::PlayerRespawned {
                player_id: id.to_string(),
                position,
            },
            None,
        );
        info!("player {} respawned", id);
        Some(position)
    }

    /// Moves a freshly spawned player onto the street found for its spawn
    /// point, unless the player has moved, died or respawned since.
    pub fn settle_spawn(
        &mut self,
        id: &str,
        from: LatLng,
        to: LatLng,
        out: &dyn Broadcaster,
    ) -> bool {
        if from == to || !to.is_valid() {
            return false;
        }
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        if session.is_dead || session.position != from {
            return false;
        }
        session.position = to;
        out.publish(
            &ServerEvent::PlayerMoved {
                id: id.to_string(),
                position: to,
            },
            None,
        );
        debug!(
            "settled {} onto street, {:.0}m from spawn",
            id,
            haversine(&from, &to)
        );
        true
    }
}
