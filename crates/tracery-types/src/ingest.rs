//! Ingestion requests consumed from the conversation-capture collaborator.

use serde::{Deserialize, Serialize};

use crate::{Timestamp, now};

/// Opaque attribution tags attached by the collaboration layer.
///
/// Stored on nodes as properties; never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

/// Everything about an ingestion except the text itself.
///
/// Passed explicitly into every ingestion call in place of ambient
/// "current session" state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestContext {
    /// Session the conversation belongs to.
    pub session_id: String,
    /// Files touched by the conversation.
    #[serde(default)]
    pub file_paths: Vec<String>,
    /// When the conversation happened. Defaults to the time of parsing.
    #[serde(default = "crate::now")]
    pub timestamp: Timestamp,
    /// Source conversation id, kept as a weak back-reference on nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Attribution tags.
    #[serde(default)]
    pub attribution: Attribution,
    /// Whether the text came from a completion event (e.g. a finished test run).
    #[serde(default)]
    pub completion_event: bool,
    /// Session that preceded this one, linked with `FOLLOWS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_session_id: Option<String>,
}

impl IngestContext {
    /// Create a context for a session, stamped now.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            file_paths: Vec::new(),
            timestamp: now(),
            conversation_id: None,
            attribution: Attribution::default(),
            completion_event: false,
            previous_session_id: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_paths.push(path.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_attribution(mut self, attribution: Attribution) -> Self {
        self.attribution = attribution;
        self
    }

    pub fn with_completion_event(mut self, completion: bool) -> Self {
        self.completion_event = completion;
        self
    }

    pub fn with_previous_session(mut self, session_id: impl Into<String>) -> Self {
        self.previous_session_id = Some(session_id.into());
        self
    }
}

/// A single ingestion request: raw conversational text plus its context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub raw_text: String,
    #[serde(flatten)]
    pub context: IngestContext,
}

impl IngestRequest {
    pub fn new(context: IngestContext, raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            context,
        }
    }
}
