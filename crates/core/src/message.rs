// SPDX-License-Identifier: MIT

//! Message and thread entities. The supervisor only reads these; the
//! append-only log they live in is owned by the external Store.

use crate::id::{AgentId, MessageId, ThreadId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a message was posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Home {
    Room,
    Thread(ThreadId),
}

impl Home {
    pub fn label(&self) -> String {
        match self {
            Home::Room => "Room".to_string(),
            Home::Thread(id) => format!("Thread {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    Agent,
    Event,
    Surface,
    Tombstone,
}

/// A single append-only log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub ts: u64,
    pub home: Home,
    pub from_agent: AgentId,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub body: String,
    pub mentions: Vec<String>,
    /// `@agent#sessid` bindings carried by this message, if any.
    #[serde(default)]
    pub fork_sessions: HashMap<String, String>,
    pub reply_to: Option<MessageId>,
}

/// A thread; only `owner_agent` matters to the supervisor, for spawn
/// authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub owner_agent: Option<AgentId>,
    pub parent: Option<ThreadId>,
    pub status: String,
}
