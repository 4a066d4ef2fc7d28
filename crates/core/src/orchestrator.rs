use crate::chat::{build_user_content, ChatSession};
use crate::error::ChatError;
use crate::models::{ChatTurn, CompletionParams};
use crate::traits::{ChatCompletion, Retriever};
use tracing::{debug, info, warn};

/// Runs one retrieval-augmented turn against a session.
pub struct ChatOrchestrator<R, C> {
    retriever: R,
    completer: C,
    params: CompletionParams,
}

impl<R, C> ChatOrchestrator<R, C>
where
    R: Retriever + Send + Sync,
    C: ChatCompletion + Send + Sync,
{
    pub fn new(retriever: R, completer: C) -> Self {
        Self {
            retriever,
            completer,
            params: CompletionParams::rag(),
        }
    }

    /// Retrieves context for `input`, appends the augmented user turn, asks
    /// for a completion, and appends the reply.
    ///
    /// On error the session is left as it was before the call.
    pub async fn handle_turn(
        &self,
        session: &mut ChatSession,
        input: &str,
    ) -> Result<String, ChatError> {
        if input.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        let context = self.retriever.retrieve(input).await?;
        debug!(session = %session.id(), hits = context.len(), "retrieved context");

        session.push(ChatTurn::user(build_user_content(&context, input)));

        match self
            .completer
            .complete(&session.request_turns(), &self.params)
            .await
        {
            Ok(answer) => {
                session.push(ChatTurn::assistant(answer.clone()));
                info!(session = %session.id(), turns = session.len(), "chat turn completed");
                Ok(answer)
            }
            Err(error) => {
                session.rollback_user_turn();
                warn!(session = %session.id(), %error, "chat completion failed");
                Err(error)
            }
        }
    }
}

/// Sends one question through a windowed session without retrieval.
pub async fn ask<C>(
    completer: &C,
    session: &mut ChatSession,
    params: &CompletionParams,
    input: &str,
) -> Result<String, ChatError>
where
    C: ChatCompletion + Sync + ?Sized,
{
    if input.trim().is_empty() {
        return Err(ChatError::EmptyInput);
    }

    session.push(ChatTurn::user(input));
    match completer.complete(&session.request_turns(), params).await {
        Ok(answer) => {
            session.push(ChatTurn::assistant(answer.clone()));
            Ok(answer)
        }
        Err(error) => {
            session.rollback_user_turn();
            Err(error)
        }
    }
}
