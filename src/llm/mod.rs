//! Generative model boundary: classification, answer generation, vision.
//!
//! The pipeline's contract with the model service is purely textual (prompt
//! in, text out); provider mechanics live behind [`GenerativeModel`].

pub mod gemini;

use crate::error::Result;
use async_trait::async_trait;

pub use gemini::{GeminiClient, GeminiConfig};

/// Literal token whose presence in a classification response means "yes".
///
/// The match is a case-sensitive substring check, exactly as the
/// classifier prompt requests.
pub const AFFIRMATIVE_TOKEN: &str = "Yes";

/// An image payload handed to the vision model.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Raw image bytes.
    pub data: Vec<u8>,
}

/// Opaque `generate(prompt[, image]) -> text` service.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Generate a text response to a text prompt.
    ///
    /// # Errors
    ///
    /// Returns a service error if the call fails or the response carries no
    /// text.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate a text response to a prompt plus an inline image.
    ///
    /// # Errors
    ///
    /// Returns a service error if the call fails or the response carries no
    /// text.
    async fn generate_with_image(&self, prompt: &str, image: &ImagePayload) -> Result<String>;
}

/// Stage-1 prompt: is this fragment a technical/interview question?
#[must_use]
pub fn classification_prompt(transcript: &str) -> String {
    format!(
        "Is the following text a programming-related question, backend development question, \
         or a technical interview question?\n\
         This includes questions about APIs, databases, server architecture, microservices, \
         DevOps, system design, or any programming concepts.\n\
         Answer with only a single word: 'Yes' or 'No'.\n\n\
         Text: \"{transcript}\""
    )
}

/// Stage-2 prompt: answer the question directly and concisely.
#[must_use]
pub fn answer_prompt(transcript: &str) -> String {
    format!(
        "Please provide a clear and concise answer to the following question: {transcript}\n\n\
         For simple questions or definitions, provide a one-line answer.\n\
         For complex questions, provide a detailed explanation.\n\n\
         If your answer includes code examples, please provide them in Python programming \
         language only.\n\
         Format any code using triple backticks with 'python' as the language identifier.\n\n\
         For backend development questions (APIs, databases, system design, etc.), provide \
         practical answers.\n\
         Do not give unnecessary explanations - be direct and to the point."
    )
}

/// Fixed instruction set for screenshot analysis.
///
/// The dispatcher forwards the model's output verbatim; it never parses or
/// validates this contract.
pub const IMAGE_INSTRUCTIONS: &str = "Look at this screenshot and answer what it asks.\n\
If it is a multiple-choice question, respond with only the letter of the correct choice.\n\
If it is a coding question, respond with only the code solution - no prose, no explanations, \
no formatting fences.";

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn classification_prompt_embeds_transcript_and_token_choices() {
        let prompt = classification_prompt("what is a mutex");
        assert!(prompt.contains("Text: \"what is a mutex\""));
        assert!(prompt.contains("'Yes' or 'No'"));
    }

    #[test]
    fn answer_prompt_embeds_question() {
        let prompt = answer_prompt("how do APIs work");
        assert!(prompt.contains("how do APIs work"));
        assert!(prompt.contains("python"));
    }

    #[test]
    fn affirmative_token_is_case_sensitive_literal() {
        assert!("Yes, it is".contains(AFFIRMATIVE_TOKEN));
        assert!(!"yes".contains(AFFIRMATIVE_TOKEN));
    }
}
