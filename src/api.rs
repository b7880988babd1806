//! JSON request/response boundary.
//!
//! Transport-independent handlers for the two exposed operations. An HTTP
//! layer passes the raw request body in and writes `status` and `body` back.
//!
//! Similarity request:
//! ```json
//! {"trajectory": [{"latitude": 40.7, "longitude": -74.0, "hour": 9}]}
//! ```
//! responds with an array of `{"userId", "similarity", "distance",
//! "trajectory", "matchingPath"}`.
//!
//! Recommendation request:
//! ```json
//! {"userIds": ["u1", "u2"]}
//! ```
//! responds with an array of `{"venue_id", "category", "latitude",
//! "longitude", "user_count", "visit_count"}`.

use log::{error, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::engine::SimilarityEngine;
use crate::error::{OptionExt, Result, TrajectoryError};
use crate::store::TrajectoryStore;
use crate::SpaceTimePoint;

/// Status code for a request abandoned by its caller.
const STATUS_CLIENT_CLOSED: u16 = 499;

/// Status and JSON body of a handled request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    fn ok<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_string(payload) {
            Ok(body) => Self { status: 200, body },
            Err(e) => {
                error!("[api] Failed to serialize response: {}", e);
                Self::error_body(500, "Failed to serialize response")
            }
        }
    }

    fn from_error(err: &TrajectoryError) -> Self {
        let status = match err {
            e if e.is_client_error() => 400,
            TrajectoryError::Cancelled => STATUS_CLIENT_CLOSED,
            _ => 500,
        };
        if status >= 500 {
            error!("[api] Request failed: {}", err);
        } else {
            warn!("[api] Request rejected: {}", err);
        }
        Self::error_body(status, &err.to_string())
    }

    fn error_body(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }).to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SimilarityRequest {
    trajectory: Option<Vec<SpaceTimePoint>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationRequest {
    user_ids: Option<Vec<String>>,
}

fn parse<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| TrajectoryError::InvalidInput {
        message: format!("malformed request body: {}", e),
    })
}

/// Handle a similarity request body.
pub fn handle_similarity_request<S: TrajectoryStore>(
    engine: &SimilarityEngine<S>,
    body: &str,
) -> ApiResponse {
    let result = parse::<SimilarityRequest>(body)
        .and_then(|req| req.trajectory.ok_or_invalid_input("missing trajectory"))
        .and_then(|trajectory| engine.find_similar(&trajectory));

    match result {
        Ok(matches) => ApiResponse::ok(&matches),
        Err(e) => ApiResponse::from_error(&e),
    }
}

/// Handle a recommendation request body.
pub fn handle_recommendation_request<S: TrajectoryStore>(
    engine: &SimilarityEngine<S>,
    body: &str,
) -> ApiResponse {
    let result = parse::<RecommendationRequest>(body)
        .and_then(|req| req.user_ids.ok_or_invalid_input("missing userIds"))
        .and_then(|ids| engine.recommend_venues(&ids));

    match result {
        Ok(venues) => ApiResponse::ok(&venues),
        Err(e) => ApiResponse::from_error(&e),
    }
}
