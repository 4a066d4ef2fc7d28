use crate::models::{ChatRole, ChatTurn};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

pub const RAG_SYSTEM_PROMPT: &str = "Am Anfang jeder Nachricht steht ein Kontext, den du verwendest, um deine Antworten zu erstellen. Dieser Kontext ist ein Auszug aus Versicherungstexten der DEVK. Du beantwortest hauptsächlich Fragen zu Versicherungsthemen mit Hilfe dieser Kontexte.";

pub const QNA_SYSTEM_PROMPT: &str = "You are a helpful assistant having a friendly conversation.";

pub const DEFAULT_QNA_WINDOW: usize = 10;

const CONTEXT_PREFIX: &str = "Context: ";
const CONTEXT_SEPARATOR: &str = "\n\n";

/// One conversation. The first turn is always the system prompt; turns are
/// only ever appended.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    turns: Vec<ChatTurn>,
    window: Option<usize>,
}

impl ChatSession {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_active: now,
            turns: vec![ChatTurn::system(system_prompt)],
            window: None,
        }
    }

    /// Session for the document chat. Its history is sent in full every turn.
    pub fn rag() -> Self {
        Self::new(RAG_SYSTEM_PROMPT)
    }

    /// Session for the plain Q&A chat, which only sends the last `window`
    /// exchanges.
    pub fn qna(window: usize) -> Self {
        Self::new(QNA_SYSTEM_PROMPT).with_window(window)
    }

    pub fn with_window(mut self, exchanges: usize) -> Self {
        self.window = Some(exchanges);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// Time since the last appended turn, zero if `now` lies before it.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_active).to_std().unwrap_or_default()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.last_active = Utc::now();
        self.turns.push(turn);
    }

    /// Drops the last turn if it is a user turn. Used when the completion for
    /// that turn failed.
    pub fn rollback_user_turn(&mut self) -> Option<ChatTurn> {
        match self.turns.last() {
            Some(turn) if turn.role == ChatRole::User => self.turns.pop(),
            _ => None,
        }
    }

    /// Turns to send to the completion API: everything, or the system prompt
    /// plus the newest `window` exchanges and any pending user turn.
    pub fn request_turns(&self) -> Vec<ChatTurn> {
        let Some(window) = self.window else {
            return self.turns.clone();
        };

        let (system, rest) = self.turns.split_at(1);
        let pending = usize::from(rest.len() % 2 == 1);
        let keep = window.saturating_mul(2).saturating_add(pending).min(rest.len());

        system
            .iter()
            .chain(&rest[rest.len() - keep..])
            .cloned()
            .collect()
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.turns
            .iter()
            .filter_map(|turn| match turn.role {
                ChatRole::System => None,
                ChatRole::User => {
                    let (context, question) = split_user_content(&turn.content);
                    Some(TranscriptEntry {
                        role: ChatRole::User,
                        context: context.map(str::to_string),
                        text: question.to_string(),
                    })
                }
                ChatRole::Assistant => Some(TranscriptEntry {
                    role: ChatRole::Assistant,
                    context: None,
                    text: turn.content.clone(),
                }),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub role: ChatRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub text: String,
}

/// `Context: <lines>\n\n<question>`, with the retrieved lines joined as-is.
pub fn build_user_content(context_lines: &[String], question: &str) -> String {
    let context = context_lines.join("\n");
    format!("{CONTEXT_PREFIX}{context}{CONTEXT_SEPARATOR}{question}")
}

/// Splits stored user content at the first blank line into the context part
/// (without its prefix) and the question.
pub fn split_user_content(content: &str) -> (Option<&str>, &str) {
    match content.split_once(CONTEXT_SEPARATOR) {
        Some((context, question)) => {
            let context = context.strip_prefix(CONTEXT_PREFIX).unwrap_or(context);
            (Some(context), question)
        }
        None => (None, content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(session: &mut ChatSession, question: &str, answer: &str) {
        session.push(ChatTurn::user(question));
        session.push(ChatTurn::assistant(answer));
    }

    #[test]
    fn user_content_round_trips_for_display() {
        let content = build_user_content(
            &["Satz eins.".to_string(), " Satz zwei.".to_string()],
            "Was ist versichert?\n\nGenau.",
        );
        assert_eq!(
            content,
            "Context: Satz eins.\n Satz zwei.\n\nWas ist versichert?\n\nGenau."
        );

        let (context, question) = split_user_content(&content);
        assert_eq!(context, Some("Satz eins.\n Satz zwei."));
        assert_eq!(question, "Was ist versichert?\n\nGenau.");
    }

    #[test]
    fn empty_context_still_splits() {
        let content = build_user_content(&[], "Hallo");
        assert_eq!(split_user_content(&content), (Some(""), "Hallo"));
    }

    #[test]
    fn rag_session_starts_with_system_prompt() {
        let session = ChatSession::rag();
        assert_eq!(session.len(), 1);
        assert_eq!(session.turns()[0], ChatTurn::system(RAG_SYSTEM_PROMPT));
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn unbounded_session_sends_everything() {
        let mut session = ChatSession::rag();
        for index in 0..20 {
            exchange(&mut session, &format!("q{index}"), &format!("a{index}"));
        }
        assert_eq!(session.request_turns().len(), 41);
    }

    #[test]
    fn windowed_session_keeps_latest_exchanges() {
        let mut session = ChatSession::qna(2);
        for index in 0..5 {
            exchange(&mut session, &format!("q{index}"), &format!("a{index}"));
        }
        session.push(ChatTurn::user("q5"));

        let turns = session.request_turns();
        let contents: Vec<_> = turns.iter().map(|turn| turn.content.as_str()).collect();
        assert_eq!(contents, vec![QNA_SYSTEM_PROMPT, "q3", "a3", "q4", "a4", "q5"]);
        assert_eq!(session.len(), 12);
    }

    #[test]
    fn window_larger_than_history_keeps_all() {
        let mut session = ChatSession::qna(DEFAULT_QNA_WINDOW);
        session.push(ChatTurn::user("q0"));
        assert_eq!(session.request_turns().len(), 2);
    }

    #[test]
    fn huge_window_does_not_overflow() {
        let mut session = ChatSession::qna(usize::MAX);
        exchange(&mut session, "q0", "a0");
        session.push(ChatTurn::user("q1"));
        assert_eq!(session.request_turns().len(), 4);
    }

    #[test]
    fn pushing_a_turn_refreshes_activity() {
        let mut session = ChatSession::rag();
        let later = session.last_active() + chrono::Duration::seconds(90);
        assert_eq!(session.idle_for(later), Duration::from_secs(90));
        assert_eq!(session.idle_for(session.created_at()), Duration::ZERO);

        session.push(ChatTurn::user("q"));
        assert!(session.last_active() >= session.created_at());
        assert!(session.idle_for(session.created_at()).is_zero());
    }

    #[test]
    fn rollback_only_removes_user_turns() {
        let mut session = ChatSession::rag();
        assert!(session.rollback_user_turn().is_none());
        session.push(ChatTurn::user("q"));
        assert_eq!(session.rollback_user_turn(), Some(ChatTurn::user("q")));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn transcript_hides_context_prefix() {
        let mut session = ChatSession::rag();
        exchange(
            &mut session,
            &build_user_content(&["Kontext".to_string()], "Frage"),
            "Antwort",
        );

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].text, "Frage");
        assert_eq!(transcript[0].context.as_deref(), Some("Kontext"));
        assert_eq!(transcript[1].role, ChatRole::Assistant);
    }
}
