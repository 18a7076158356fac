//! Sending the payload and making sense of the endpoint's answer.

use serde_json::Value;
use thiserror::Error;

use crate::validate::FieldIssue;

pub const INVALID_FORM_MESSAGE: &str =
    "未入力または形式が正しくない項目があります。確認してください。";
pub const MISSING_ENDPOINT_MESSAGE: &str =
    "送信先URLが未設定です。管理者に連絡してください。";
pub const RETRY_MESSAGE: &str =
    "送信に失敗しました。通信環境をご確認のうえ再度お試しください。";
pub const SUCCESS_MESSAGE: &str = "送信が完了しました。ご協力ありがとうございます。";
pub const SENDING_MESSAGE: &str = "送信中です…";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Raw answer of the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Network boundary: one JSON POST.
pub trait Transport {
    fn post_json(&self, url: &str, body: &str) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    /// A body declared as JSON must parse; anything else is kept as text
    /// when it does not.
    pub fn parse(response: &TransportResponse) -> Result<Self, SubmitError> {
        let declared_json = response
            .content_type
            .as_deref()
            .is_some_and(|content_type| content_type.contains("application/json"));
        match serde_json::from_str::<Value>(&response.body) {
            Ok(value) => Ok(ResponseBody::Json(value)),
            Err(source) if declared_json => {
                tracing::warn!(error = %source, "endpoint declared JSON but sent something else");
                Err(SubmitError::MalformedResponse {
                    status: response.status,
                    source,
                })
            }
            Err(_) => Ok(ResponseBody::Text(response.body.clone())),
        }
    }

    fn message(&self) -> Option<String> {
        match self {
            ResponseBody::Json(Value::Object(map)) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|message| !message.is_empty())
                .map(str::to_string),
            _ => None,
        }
    }

    fn failure_flag(&self) -> bool {
        matches!(self, ResponseBody::Json(Value::Object(map)) if map.get("success") == Some(&Value::Bool(false)))
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("a submission is already in progress")]
    InFlight,
    #[error("{}", INVALID_FORM_MESSAGE)]
    Invalid { issue: FieldIssue },
    #[error("{}", MISSING_ENDPOINT_MESSAGE)]
    MissingEndpoint,
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("endpoint answered {status} with an unreadable JSON body")]
    MalformedResponse {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SubmitError {
    /// Text shown in the status area.
    pub fn user_message(&self) -> &'static str {
        match self {
            SubmitError::Invalid { .. } => INVALID_FORM_MESSAGE,
            SubmitError::MissingEndpoint => MISSING_ENDPOINT_MESSAGE,
            SubmitError::InFlight => SENDING_MESSAGE,
            _ => RETRY_MESSAGE,
        }
    }
}

/// A payload ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub endpoint: String,
    pub payload: Value,
}

impl Submission {
    pub fn send(&self, transport: &dyn Transport) -> Result<ResponseBody, SubmitError> {
        let body = serde_json::to_string(&self.payload)?;
        let response = transport.post_json(&self.endpoint, &body)?;
        interpret_response(&response)
    }
}

/// Success means a 2xx status and no `success: false` in a JSON object.
pub fn interpret_response(response: &TransportResponse) -> Result<ResponseBody, SubmitError> {
    let body = ResponseBody::parse(response)?;
    let ok_status = (200..300).contains(&response.status);
    if ok_status && !body.failure_flag() {
        return Ok(body);
    }
    let message = body
        .message()
        .unwrap_or_else(|| format!("Failed with status {}", response.status));
    Err(SubmitError::Rejected {
        status: response.status,
        message,
    })
}
