//! Prompt templates handed to the language model.

use buddy_rag::{Hit, context_block};

/// Render the advisor prompt for `question` grounded in `hits`.
///
/// With no hits the prompt says so instead of listing an empty context.
pub fn render_prompt(question: &str, hits: &[Hit]) -> String {
    if hits.is_empty() {
        return no_context_prompt(question);
    }
    format!(
        "Question: {question}\n\n\
         Relevant context from this user's data:\n\
         {}\n\n\
         When answering, focus on the context above. Be specific, explain any assumptions,\n\
         and clearly separate general advice from user-specific information.",
        context_block(hits)
    )
}

/// The prompt used when no context could be retrieved.
pub fn no_context_prompt(question: &str) -> String {
    format!("Question: {question}\n\n(No contextual data available yet.)")
}
