//! Authoritative server for a street-map battle royale.
//!
//! Browsers connect over a WebSocket, spawn at a real-world coordinate,
//! walk the map and shoot whoever is within range. The server owns the
//! only copy of the truth and rebroadcasts every change as a JSON event.

pub mod broadcast;
pub mod config;
pub mod game;
pub mod geo;
pub mod geolocate;
pub mod mirror;
pub mod protocol;
pub mod roster;
pub mod server;
pub mod spawn;
pub mod street;

pub type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
