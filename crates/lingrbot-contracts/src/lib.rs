use serde::{Deserialize, Deserializer, Serialize};

/// Reads an explicit `null` the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Payload delivered per webhook call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBatch {
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "event_id", default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

/// A chat message as posted to the room. Only `text` drives replies; the rest
/// is carried for logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub room: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub public_session_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub icon_url: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub message_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub speaker_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nickname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
}

/// Response of the playground compile endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaygroundResult {
    #[serde(rename = "Errors", default, deserialize_with = "null_as_default")]
    pub errors: String,
    #[serde(rename = "Events", default)]
    pub events: Option<Vec<PlaygroundEvent>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaygroundEvent {
    #[serde(rename = "Message", default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(rename = "Delay", default)]
    pub delay: i64,
}

impl PlaygroundResult {
    /// Compiler errors win; otherwise the first output event. `None` when the
    /// service answered with neither.
    pub fn output(self) -> Option<String> {
        if !self.errors.is_empty() {
            return Some(self.errors);
        }
        self.events?.into_iter().next().map(|e| e.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_tolerates_sparse_messages() {
        let batch: EventBatch =
            serde_json::from_str(r#"{"events":[{"event_id":1,"message":{"text":"foo++"}},{"event_id":2}]}"#)
                .unwrap();
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0].message.as_ref().unwrap().text, "foo++");
        assert!(batch.events[1].message.is_none());
    }

    #[test]
    fn null_fields_read_as_empty() {
        let batch: EventBatch = serde_json::from_str(
            r#"{"events":[{"event_id":1,"message":{"icon_url":null,"text":"foo++"}},{"event_id":null,"message":{"text":null,"nickname":null}}]}"#,
        )
        .unwrap();
        let first = batch.events[0].message.as_ref().unwrap();
        assert_eq!(first.text, "foo++");
        assert!(first.icon_url.is_empty());
        assert_eq!(batch.events[1].id, 0);
        let second = batch.events[1].message.as_ref().unwrap();
        assert!(second.text.is_empty());
        assert!(second.nickname.is_empty());

        let empty: EventBatch = serde_json::from_str(r#"{"events":null}"#).unwrap();
        assert!(empty.events.is_empty());
    }

    #[test]
    fn message_type_is_renamed() {
        let msg: Message = serde_json::from_str(r#"{"type":"user","nickname":"mattn"}"#).unwrap();
        assert_eq!(msg.message_type, "user");
        assert_eq!(msg.nickname, "mattn");
        assert!(msg.text.is_empty());
    }

    #[test]
    fn playground_prefers_errors() {
        let res: PlaygroundResult = serde_json::from_str(
            r#"{"Errors":"prog.go:1: syntax error","Events":[{"Message":"hi","Delay":0}]}"#,
        )
        .unwrap();
        assert_eq!(res.output().as_deref(), Some("prog.go:1: syntax error"));
    }

    #[test]
    fn playground_takes_first_event() {
        let res: PlaygroundResult = serde_json::from_str(
            r#"{"Errors":"","Events":[{"Message":"hello\n","Delay":0},{"Message":"x","Delay":5}]}"#,
        )
        .unwrap();
        assert_eq!(res.output().as_deref(), Some("hello\n"));
    }

    #[test]
    fn playground_without_events_has_no_output() {
        let res: PlaygroundResult = serde_json::from_str(r#"{"Errors":"","Events":null}"#).unwrap();
        assert!(res.output().is_none());
        let res: PlaygroundResult = serde_json::from_str(r#"{"Errors":null,"Events":[]}"#).unwrap();
        assert!(res.output().is_none());
    }
}
