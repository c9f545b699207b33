//! Responses handed to the request layer

use serde::{Deserialize, Serialize};

use adex_core::{AdPlacement, AdexError, FillOutcome};

/// Answer to a fill request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FillResponse {
    Filled(AdPlacement),
    NoInventory,
}

impl From<FillOutcome> for FillResponse {
    fn from(outcome: FillOutcome) -> Self {
        match outcome {
            FillOutcome::Filled(placement) => FillResponse::Filled(placement),
            FillOutcome::NoInventory => FillResponse::NoInventory,
        }
    }
}

/// Answer to a click report; there is only one
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClickAck {
    Ok,
}

/// Failure body for requests that could not be served
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub retryable: bool,
}

impl From<&AdexError> for ErrorResponse {
    fn from(err: &AdexError) -> Self {
        ErrorResponse {
            error: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adex_core::AppId;
    use serde_json::json;

    #[test]
    fn test_filled_response_shape() {
        let response = FillResponse::Filled(AdPlacement {
            app_id: AppId::new("c0ffee"),
            icon_url: "https://cdn/c.png".into(),
            link: "https://apps/c".into(),
            text: "Play C".into(),
        });

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "status": "filled",
                "app_id": "c0ffee",
                "icon_url": "https://cdn/c.png",
                "link": "https://apps/c",
                "text": "Play C"
            })
        );
    }

    #[test]
    fn test_no_inventory_and_click_shapes() {
        assert_eq!(
            serde_json::to_value(FillResponse::NoInventory).unwrap(),
            json!({"status": "no_inventory"})
        );
        assert_eq!(
            serde_json::to_value(ClickAck::Ok).unwrap(),
            json!({"status": "ok"})
        );
    }

    #[test]
    fn test_error_response_marks_retryable() {
        let body = ErrorResponse::from(&AdexError::TransientConflict { attempts: 5 });
        assert!(body.retryable);

        let body = ErrorResponse::from(&AdexError::InvalidAppId(String::new()));
        assert!(!body.retryable);
    }
}
