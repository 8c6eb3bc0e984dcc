//! Per-token pricing for the models we know about.

use rust_decimal::Decimal;

/// US cents per million tokens, (input, output).
const CENTS_PER_MILLION: &[(&str, i64, i64)] = &[
    ("claude-opus", 1500, 7500),
    ("claude-sonnet", 300, 1500),
    ("claude-3-5-sonnet", 300, 1500),
    ("claude-3-7-sonnet", 300, 1500),
    ("claude-3-5-haiku", 80, 400),
    ("gpt-4o-mini", 15, 60),
    ("gpt-4o", 250, 1000),
];

/// (input, output) cost per token for a model name; zero for unknown models.
pub fn cost_per_token(model: &str) -> (Decimal, Decimal) {
    // Longest matching prefix wins so "gpt-4o-mini" doesn't price as "gpt-4o".
    CENTS_PER_MILLION
        .iter()
        .filter(|(prefix, _, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _, _)| prefix.len())
        .map(|(_, input, output)| (Decimal::new(*input, 8), Decimal::new(*output, 8)))
        .unwrap_or((Decimal::ZERO, Decimal::ZERO))
}

/// Estimated cost of one call.
pub fn estimate_cost(model: &str, input_tokens: u32, output_tokens: u32) -> Decimal {
    let (input, output) = cost_per_token(model);
    input * Decimal::from(input_tokens) + output * Decimal::from(output_tokens)
}
