//! Instructions sent to the vision model with each image.
//!
//! The instruction is a pure function of the recognition options, so the
//! same request always produces the same prompt and tests can inspect the
//! text without calling the model.

use crate::pipeline::recognize::RecognitionMode;

/// Plain-text extraction: prose only, no Markdown.
pub const TEXT_MODE_PROMPT: &str = "Recognize the text in the image. Return plain text only, \
keep the basic paragraph structure, and do not use any Markdown or other markup.";

/// Document extraction: keep the original layout as Markdown.
pub const DOCUMENT_MODE_PROMPT: &str =
    "Recognize the text in the image and keep the formatting of the original document as Markdown.";

/// Appended in document mode when math is requested.
pub const MATH_CLAUSE: &str = " Write mathematical formulas in LaTeX.";

/// Appended in document mode when tables are requested.
pub const TABLE_CLAUSE: &str = " Write tables as Markdown tables.";

/// Used for any mode the service does not know.
pub const GENERIC_PROMPT: &str = "Recognize the text in the image.";

/// Build the instruction for one recognition request.
pub fn build_recognition_prompt(
    mode: &RecognitionMode,
    include_math: bool,
    include_tables: bool,
) -> String {
    match mode {
        RecognitionMode::Text => TEXT_MODE_PROMPT.to_string(),
        RecognitionMode::Document => {
            let mut prompt = String::from(DOCUMENT_MODE_PROMPT);
            if include_math {
                prompt.push_str(MATH_CLAUSE);
            }
            if include_tables {
                prompt.push_str(TABLE_CLAUSE);
            }
            prompt
        }
        RecognitionMode::Other(_) => GENERIC_PROMPT.to_string(),
    }
}
