//! Event types streamed to the request surface.
//!
//! Every long-running operation yields an ordered sequence of events to a
//! single consumer over a `tokio::sync::mpsc` channel. Dropping the receiver
//! stops delivery; producers treat a closed channel as cancellation.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::containers::Container;

/// Output of a streamed subprocess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CommandEvent {
    Stdout(String),
    Stderr(String),
    Completed { code: i32 },
}

/// Progress of a multi-step operation (group start, debug-mode restart).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProgressEvent {
    Step { step: String, message: String },
    Output(String),
    Done,
    Failed(String),
}

/// One container-status poll result. The snapshot replaces any earlier one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub containers: Vec<Container>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Send without caring whether anyone is still listening.
pub async fn emit<T>(tx: &mpsc::Sender<T>, event: T) {
    let _ = tx.send(event).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_event_serializes_tagged() {
        let json = serde_json::to_string(&CommandEvent::Completed { code: 0 }).unwrap();
        assert_eq!(json, r#"{"type":"Completed","data":{"code":0}}"#);

        let json = serde_json::to_string(&CommandEvent::Stdout("ok".into())).unwrap();
        assert_eq!(json, r#"{"type":"Stdout","data":"ok"}"#);
    }

    #[test]
    fn status_update_omits_missing_error() {
        let json = serde_json::to_string(&StatusUpdate::default()).unwrap();
        assert_eq!(json, r#"{"containers":[]}"#);
    }

    #[tokio::test]
    async fn emit_ignores_closed_channel() {
        let (tx, rx) = mpsc::channel::<ProgressEvent>(1);
        drop(rx);
        emit(&tx, ProgressEvent::Done).await;
    }
}
