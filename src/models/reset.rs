use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for the reset broadcast
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
    pub notified: u32,
}
