//! typed notifications emitted by the session core
//!
//! The controller never calls back into collaborators; it sends these
//! through an mpsc channel and the host routes them to the network layer
//! and the U/X.  `as_json` renders the websocket flavor for the U/X side.
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChannelInfo {
    pub name: String,
    pub channels: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    BeatChanged(u16),
    IntervalStarted { bpm: u16, bpi: u16 },
    BpmChanged(u16),
    BpiChanged(u16),
    ChannelAdded { user: String, channel: ChannelInfo },
    ChannelUpdated { user: String, channel: ChannelInfo },
    ChannelRemoved { user: String, channel: String },
    ChannelXmitChanged { channel: usize, transmitting: bool },
    /// encoded audio ready for the network layer
    ChunkReady { channel: usize, bytes: Vec<u8>, is_first: bool, is_last: bool },
    ChunkDownloadProgress { user: String, channel: String, percent: u8 },
    ChunkFullyDownloaded { user: String, channel: String },
    ChatReceived { user: String, message: String },
    /// outbound chat (including NINJAM vote commands)
    ChatSend { message: String },
    UserEntered(String),
    UserExited(String),
    UserBlockedInChat(String),
    UserUnblockedInChat(String),
    PreparingTransmission,
    PreparedToTransmit,
    Stopped,
}

impl SessionNotification {
    pub fn as_json(&self) -> serde_json::Value {
        match self {
            SessionNotification::BeatChanged(beat) => {
                json!({ "event": "beatChanged", "beat": beat })
            }
            SessionNotification::IntervalStarted { bpm, bpi } => {
                json!({ "event": "intervalStarted", "bpm": bpm, "bpi": bpi })
            }
            SessionNotification::BpmChanged(bpm) => {
                json!({ "event": "bpmChanged", "bpm": bpm })
            }
            SessionNotification::BpiChanged(bpi) => {
                json!({ "event": "bpiChanged", "bpi": bpi })
            }
            SessionNotification::ChannelAdded { user, channel } => {
                json!({ "event": "channelAdded", "user": user, "channel": channel })
            }
            SessionNotification::ChannelUpdated { user, channel } => {
                json!({ "event": "channelUpdated", "user": user, "channel": channel })
            }
            SessionNotification::ChannelRemoved { user, channel } => {
                json!({ "event": "channelRemoved", "user": user, "channel": channel })
            }
            SessionNotification::ChannelXmitChanged {
                channel,
                transmitting,
            } => {
                json!({ "event": "channelXmitChanged", "channel": channel, "transmitting": transmitting })
            }
            SessionNotification::ChunkReady {
                channel,
                bytes,
                is_first,
                is_last,
            } => {
                // the U/X only cares about sizes, the raw bytes go to the
                // network layer through the typed variant
                json!({ "event": "chunkReady", "channel": channel, "len": bytes.len(), "isFirstPart": is_first, "isLastPart": is_last })
            }
            SessionNotification::ChunkDownloadProgress {
                user,
                channel,
                percent,
            } => {
                json!({ "event": "chunkDownloadProgress", "user": user, "channel": channel, "percent": percent })
            }
            SessionNotification::ChunkFullyDownloaded { user, channel } => {
                json!({ "event": "chunkFullyDownloaded", "user": user, "channel": channel })
            }
            SessionNotification::ChatReceived { user, message } => {
                json!({ "event": "chatReceived", "user": user, "message": message })
            }
            SessionNotification::ChatSend { message } => {
                json!({ "event": "chatSend", "message": message })
            }
            SessionNotification::UserEntered(user) => {
                json!({ "event": "userEntered", "user": user })
            }
            SessionNotification::UserExited(user) => {
                json!({ "event": "userExited", "user": user })
            }
            SessionNotification::UserBlockedInChat(user) => {
                json!({ "event": "userBlockedInChat", "user": user })
            }
            SessionNotification::UserUnblockedInChat(user) => {
                json!({ "event": "userUnblockedInChat", "user": user })
            }
            SessionNotification::PreparingTransmission => {
                json!({ "event": "preparingTransmission" })
            }
            SessionNotification::PreparedToTransmit => {
                json!({ "event": "preparedToTransmit" })
            }
            SessionNotification::Stopped => {
                json!({ "event": "stopped" })
            }
        }
    }
}

#[cfg(test)]
mod test_events {
    use super::*;

    #[test]
    fn json_shape() {
        let note = SessionNotification::IntervalStarted { bpm: 120, bpi: 4 };
        let val = note.as_json();
        assert_eq!(val["event"], "intervalStarted");
        assert_eq!(val["bpm"], 120);
    }
    #[test]
    fn chunk_json_carries_length_not_bytes() {
        let note = SessionNotification::ChunkReady {
            channel: 1,
            bytes: vec![1, 2, 3],
            is_first: true,
            is_last: false,
        };
        let val = note.as_json();
        assert_eq!(val["len"], 3);
        assert_eq!(val["isFirstPart"], true);
    }
    #[test]
    fn channel_info_serializes() {
        let note = SessionNotification::ChannelAdded {
            user: String::from("alice"),
            channel: ChannelInfo {
                name: String::from("guitar"),
                channels: 1,
            },
        };
        let val = note.as_json();
        assert_eq!(val["channel"]["name"], "guitar");
    }
}
