use std::sync::Arc;

use ragfuse_core::{ConversationHistory, Error, ProviderError, Result, Stage};

use crate::pipeline::{Clock, Pipeline, QueryOptions, QueryResult};

/// A generated answer and the retrieval that grounded it.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub result: QueryResult,
}

/// One conversation over a shared pipeline. Owns its history; sessions never share one.
pub struct Session {
    pipeline: Arc<Pipeline>,
    history: ConversationHistory,
}

impl Session {
    pub fn new(pipeline: Arc<Pipeline>) -> Self { Self { pipeline, history: ConversationHistory::new() } }

    pub fn with_history(pipeline: Arc<Pipeline>, history: ConversationHistory) -> Self { Self { pipeline, history } }

    pub fn history(&self) -> &ConversationHistory { &self.history }

    /// Retrieve for `text` in the context of this conversation without recording a turn.
    pub async fn query(&self, text: &str, options: &QueryOptions) -> Result<QueryResult> {
        self.pipeline.query_with_history(text, &self.history, options).await
    }

    /// Append a turn produced outside `ask`.
    pub fn record(&mut self, utterance: impl Into<String>, response: impl Into<String>) {
        self.history.push(utterance, response);
    }

    /// Retrieve, generate an answer from the prompt and record the turn.
    ///
    /// The generator is called even when no context survived; the prompt
    /// says so. The deadline covers retrieval and generation together.
    pub async fn ask(&mut self, text: &str, options: &QueryOptions) -> Result<Answer> {
        let generator = self.pipeline.generator().cloned().ok_or_else(|| {
            Error::provider(Stage::Generation, ProviderError::Unavailable("no generator configured".to_string()))
        })?;
        let settings = self.pipeline.resolve(options)?;
        let clock = Clock::start(settings.deadline());
        let result = self.pipeline.run_query(text, &self.history, options, settings, &clock).await?;
        let answer = clock
            .run(Stage::Generation, generator.generate(&result.prompt))
            .await?
            .map_err(|e| Error::provider(Stage::Generation, e))?;
        let answer = answer.trim().to_string();
        self.history.push(text.trim(), answer.clone());
        tracing::debug!(turns = self.history.len(), "turn recorded");
        Ok(Answer { text: answer, result })
    }
}
