//! Approximate token counting

/// Characters per token for the rough estimate
const CHARS_PER_TOKEN: usize = 4;

/// Extra tokens charged per message for role and framing
const MESSAGE_OVERHEAD_TOKENS: u32 = 3;

/// Estimate the token cost of one message's content.
///
/// Rough count: ~4 characters per token plus a small per-message overhead.
/// Good enough for trim thresholding; exact tokenization is the model's
/// business, not ours.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    (chars.div_ceil(CHARS_PER_TOKEN)) as u32 + MESSAGE_OVERHEAD_TOKENS
}
