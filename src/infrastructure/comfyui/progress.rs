//! ComfyUI progress feed (`/ws?clientId=...`)
//!
//! The server pushes JSON status frames for every job queued under the
//! client id, interleaved with binary preview frames which are ignored.

use futures_util::{future, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::application::ports::outbound::{ImageGenError, ProgressEvent, ProgressStream};

#[derive(Debug, Deserialize)]
struct FeedFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedData {
    prompt_id: Option<String>,
    value: u32,
    max: u32,
    node: Option<String>,
    exception_message: String,
}

/// Feed URL for `base_url` (`http` becomes `ws`, `https` becomes `wss`)
pub fn feed_url(base_url: &str, client_id: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        format!("ws://{}", base)
    };
    format!("{}/ws?clientId={}", ws_base, client_id)
}

/// Interpret one text frame; `None` for frames we do not track
pub fn parse_feed_message(text: &str) -> Option<ProgressEvent> {
    let frame: FeedFrame = serde_json::from_str(text).ok()?;
    let data: FeedData = serde_json::from_value(frame.data).unwrap_or_default();

    match frame.kind.as_str() {
        "progress" => Some(ProgressEvent::Progress {
            prompt_id: data.prompt_id,
            value: data.value,
            max: data.max,
        }),
        "executing" => Some(ProgressEvent::Executing {
            prompt_id: data.prompt_id,
            node: data.node,
        }),
        "execution_error" => Some(ProgressEvent::ExecutionError {
            prompt_id: data.prompt_id,
            message: data.exception_message,
        }),
        _ => None,
    }
}

/// Connect to the feed and stream its events until the socket closes
pub async fn watch(base_url: &str, client_id: &str) -> Result<ProgressStream, ImageGenError> {
    let url = feed_url(base_url, client_id);
    let (socket, _) = connect_async(url.as_str())
        .await
        .map_err(|e| ImageGenError::RequestFailed(format!("Progress feed: {}", e)))?;
    tracing::debug!("Connected to progress feed {}", url);

    let events = socket
        .take_while(|frame| future::ready(frame.is_ok()))
        .filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => parse_feed_message(&text),
                _ => None,
            }
        })
        .boxed();

    Ok(events)
}
