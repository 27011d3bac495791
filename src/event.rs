use std::sync::Arc;

use serde::Serialize;

use crate::member::Member;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    #[serde(rename = "to-sleep")]
    Sleep,
    #[serde(rename = "to-awake")]
    Wake,
    #[serde(rename = "to-snooze")]
    Snooze,
}

/// One state change, as fanned out to a group's room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    #[serde(rename = "operation")]
    pub kind: EventKind,
    #[serde(rename = "username")]
    pub actor: String,
    #[serde(rename = "message")]
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payload {
    pub message: String,
    pub asleep: Vec<String>,
    pub awake: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<u32>,
    pub dissolved: bool,
}

impl Payload {
    /// Splits the group into who is asleep and who is awake right now.
    pub fn status(members: &[Member]) -> Self {
        let (asleep, awake): (Vec<&Member>, Vec<&Member>) = members.iter().partition(|m| m.is_asleep());
        Payload {
            message: String::new(),
            asleep: asleep.into_iter().map(|m| m.username.clone()).collect(),
            awake: awake.into_iter().map(|m| m.username.clone()).collect(),
            score: None,
            days_remaining: None,
            dissolved: false,
        }
    }
}

impl Event {
    pub fn encode(&self) -> serde_json::Result<Arc<str>> {
        serde_json::to_string(self).map(Arc::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let mut ada = Member::new("ada");
        ada.sleep_state = crate::member::SleepState::Asleep;
        let bob = Member::new("bob");

        let mut payload = Payload::status(&[ada, bob]);
        payload.message = "ada is out".to_owned();
        let event = Event {
            kind: EventKind::Sleep,
            actor: "ada".to_owned(),
            payload,
        };

        let json: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "operation": "to-sleep",
                "username": "ada",
                "message": {
                    "message": "ada is out",
                    "asleep": ["ada"],
                    "awake": ["bob"],
                    "dissolved": false,
                }
            })
        );
    }
}
