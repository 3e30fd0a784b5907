//! Conversation state for one chat session.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::capability::CapabilityResponse;
use crate::error::Result;
use crate::render::Figure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry. Assistant turns may carry a rendered figure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure: Option<Figure>,
    pub timestamp: DateTime<Utc>,
}

/// Per-session conversation state. Single-writer: the shell owns it mutably
/// for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub related_queries: Vec<String>,
    /// Serialized conversation history blob, round-tripped through the
    /// generation capability.
    pub history: String,
    pub started: bool,
    pub pending_query: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            related_queries: Vec::new(),
            history: "{}".to_string(),
            started: false,
            pending_query: None,
        }
    }

    /// Load the optional seed suggestions shipped with the dataset. A
    /// missing file is not an error.
    pub fn seed_related(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            debug!("No seed suggestions at {}", path.display());
            return Ok(());
        }
        let contents = std::fs::read_to_string(path)?;
        self.related_queries = serde_json::from_str(&contents)?;
        Ok(())
    }

    pub fn push_user(&mut self, content: &str) {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: content.to_string(),
            figure: None,
            timestamp: Utc::now(),
        });
    }

    pub fn push_assistant(&mut self, content: &str, figure: Option<Figure>) {
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: content.to_string(),
            figure,
            timestamp: Utc::now(),
        });
    }

    /// Promote the generation capability's conversation state into the
    /// session. Later pipeline stages do not carry history.
    pub fn absorb_generation(&mut self, response: &CapabilityResponse) {
        self.related_queries = response.related_queries.clone();
        self.history = response.conversation_history.clone();
    }

    /// Queue a suggestion as if the user had typed it.
    pub fn inject_query(&mut self, query: &str) {
        self.pending_query = Some(query.to_string());
        self.started = true;
    }

    pub fn take_pending(&mut self) -> Option<String> {
        self.pending_query.take()
    }

    /// Up to three related queries, shortest first.
    pub fn suggestions(&self) -> Vec<String> {
        let mut related = self.related_queries.clone();
        related.sort_by_key(|q| q.len());
        related.truncate(3);
        related
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn starts_with_empty_history_blob() {
        let session = SessionState::new();
        assert_eq!(session.history, "{}");
        assert!(session.messages.is_empty());
        assert!(session.related_queries.is_empty());
        assert!(!session.started);
        assert!(Uuid::parse_str(&session.id).is_ok());
    }

    #[test]
    fn suggestions_are_shortest_three() {
        let mut session = SessionState::new();
        session.related_queries = vec![
            "a very long related question indeed".to_string(),
            "short".to_string(),
            "medium one".to_string(),
            "tiny".to_string(),
        ];
        assert_eq!(
            session.suggestions(),
            vec![
                "tiny".to_string(),
                "short".to_string(),
                "medium one".to_string(),
            ]
        );
    }

    #[test]
    fn suggestion_order_is_stable_for_equal_lengths() {
        let mut session = SessionState::new();
        session.related_queries = vec!["bb".to_string(), "aa".to_string()];
        assert_eq!(
            session.suggestions(),
            vec!["bb".to_string(), "aa".to_string()]
        );
    }

    #[test]
    fn missing_seed_file_is_not_an_error() {
        let mut session = SessionState::new();
        session
            .seed_related(Path::new("/definitely/not/here/related.json"))
            .unwrap();
        assert!(session.related_queries.is_empty());
    }

    #[test]
    fn seed_file_populates_related_queries() {
        let path = std::env::temp_dir().join("pulse_session_related.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"["first question", "second question"]"#)
            .unwrap();

        let mut session = SessionState::new();
        session.seed_related(&path).unwrap();
        assert_eq!(session.related_queries.len(), 2);
        assert_eq!(session.related_queries[0], "first question");
    }

    #[test]
    fn generation_response_replaces_related_and_history() {
        let mut session = SessionState::new();
        session.related_queries = vec!["stale".to_string()];

        let response = CapabilityResponse {
            related_queries: vec!["fresh".to_string()],
            conversation_history: r#"{"turn":1}"#.to_string(),
            ..CapabilityResponse::default()
        };
        session.absorb_generation(&response);
        assert_eq!(session.related_queries, vec!["fresh".to_string()]);
        assert_eq!(session.history, r#"{"turn":1}"#);

        session.absorb_generation(&CapabilityResponse::default());
        assert!(session.related_queries.is_empty());
        assert_eq!(session.history, "");
    }

    #[test]
    fn injected_query_marks_the_session_started() {
        let mut session = SessionState::new();
        session.inject_query("how many users in kerala");
        assert!(session.started);
        assert_eq!(
            session.take_pending().as_deref(),
            Some("how many users in kerala")
        );
        assert_eq!(session.take_pending(), None);
    }

    #[test]
    fn transcript_keeps_turn_order() {
        let mut session = SessionState::new();
        session.push_user("question");
        session.push_assistant("answer", Some(Figure::blank()));

        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, Role::User);
        assert!(session.messages[0].figure.is_none());
        assert_eq!(session.messages[1].role, Role::Assistant);
        assert!(session.messages[1].figure.is_some());
    }
}
