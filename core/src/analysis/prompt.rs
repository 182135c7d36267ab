//! Prompt template shared by both transports.

use crate::verdict::{COMPLIANT_GLYPH, VIOLATING_GLYPH};

/// Build the analysis prompt with the user's rules embedded.
pub fn build_prompt(rules: &str, image_count: usize) -> String {
    let screens = if image_count == 1 {
        "this screenshot".to_string()
    } else {
        format!("these {image_count} screenshots")
    };
    format!(
        "Analyze {screens} of the user's displays against the rules below.\n\
         \n\
         [RULES]\n\
         {rules}\n\
         \n\
         [INSTRUCTIONS]\n\
         1. Look at every image and describe briefly what the user is doing.\n\
         2. If the user's activity breaks the rules, end your answer with:\n   \
            VERDICT: {VIOLATING_GLYPH}\n   \
            Reason: <the specific violation>\n\
         3. If the user's activity follows the rules, end your answer with:\n   \
            VERDICT: {COMPLIANT_GLYPH}\n   \
            Activity: <what the user is doing, in one line>\n\
         Write exactly one VERDICT line containing exactly one of {COMPLIANT_GLYPH} or {VIOLATING_GLYPH}.\n\
         \n\
         Answer:",
        rules = rules.trim(),
    )
}
