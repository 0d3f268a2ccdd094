//! Read-only admin endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::handlers::unix_millis;
use crate::AppState;

/// Payload of `GET /health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
   pub status: &'static str,
   pub timestamp: u64,
}

pub async fn health() -> Json<HealthResponse> {
   Json(HealthResponse {
      status: "ok",
      timestamp: unix_millis(),
   })
}

/// Payload of `GET /stats`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
   pub total_rooms: usize,
   pub total_participants: usize,
   /// Room count keyed by participant count. Keys are strings because JSON
   /// object keys are.
   pub rooms_by_size: BTreeMap<String, usize>,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
   let stats = state.rooms.stats();
   Json(StatsResponse {
      total_rooms: stats.total_rooms,
      total_participants: stats.total_participants,
      rooms_by_size: stats
         .rooms_by_size
         .into_iter()
         .map(|(size, count)| (size.to_string(), count))
         .collect(),
   })
}
