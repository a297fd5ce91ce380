// Tokenization and optional preprocessing rules, run before normalization.

use tracing::debug;

use crate::error::ServiceError;
use crate::rules::RuleSet;
use crate::service::Tokenizes;

/// Stand-in for `%`, which tokenizers tend to split or swallow
pub const PERCENT_PLACEHOLDER: &str = " was_percent_sign";

/// Tokenize `text` and join the tokens with single spaces. With `rules`, the preprocessing
/// rules are applied afterwards; this is where past-tense candidates pick up the marker.
pub fn preprocess(
    text: &str,
    tokenizer: &dyn Tokenizes,
    rules: Option<&RuleSet>,
    final_trim: bool,
) -> Result<String, ServiceError> {
    let protected = if text.contains('%') {
        text.replace('%', PERCENT_PLACEHOLDER)
    } else {
        text.to_string()
    };

    let tokens = tokenizer.tokenize(&protected)?;
    debug!("Tokenized into {} tokens", tokens.len());
    let joined = tokens.join(" ");

    Ok(match rules {
        Some(rules) => rules.apply(&joined, final_trim),
        None => joined,
    })
}
