use ragfuse_core::ConversationHistory;

use crate::pipeline::RankedContext;

pub const NO_CONTEXT_NOTICE: &str = "No supporting context was found for this query.";

const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant. Answer the user query using ONLY the context provided. \
If the context does not contain the answer, say that you do not know.";

/// Assemble the answer-generation prompt.
///
/// Sections appear in a fixed order: system instruction, prior conversation
/// (only when present), the user's original query, the numbered context
/// passages (or a notice that none were found) and an open answer slot.
pub fn build_prompt(query: &str, history: &ConversationHistory, contexts: &[RankedContext]) -> String {
    let mut prompt = format!("[System]: {SYSTEM_INSTRUCTION}\n\n");
    if !history.is_empty() {
        prompt.push_str("[Conversation]:\n");
        for turn in history.turns() {
            prompt.push_str(&format!("User: {}\nAssistant: {}\n", turn.user_utterance, turn.system_response));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!("[User Query]: {}\n\n[Context]:\n", query.trim()));
    if contexts.is_empty() {
        prompt.push_str(NO_CONTEXT_NOTICE);
        prompt.push('\n');
    } else {
        for (i, ctx) in contexts.iter().enumerate() {
            prompt.push_str(&format!("{}. [{}] {}\n", i + 1, ctx.document.id, ctx.document.content.trim()));
        }
    }
    prompt.push_str("\n[Answer]:");
    prompt
}
