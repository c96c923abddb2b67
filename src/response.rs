use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::usage::{Plan, Remaining};

#[derive(Debug, Serialize)]
pub struct CaptionResponse {
    pub caption: String,
    pub plan: Plan,
    pub remaining: Remaining,
    pub success: bool,
}

impl CaptionResponse {
    pub fn new(caption: String, plan: Plan, remaining: Remaining) -> Self {
        Self {
            caption,
            plan,
            remaining,
            success: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_response_wire_shape() {
        let response =
            CaptionResponse::new("a red bicycle".to_string(), Plan::Free, Remaining::Count(4));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["caption"], "a red bicycle");
        assert_eq!(value["plan"], "free");
        assert_eq!(value["remaining"], 4);
        assert_eq!(value["success"], true);
    }

    #[test]
    fn paid_remaining_serializes_as_unlimited() {
        let response =
            CaptionResponse::new("a dog".to_string(), Plan::Paid, Remaining::Unlimited);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["remaining"], "unlimited");
    }
}
