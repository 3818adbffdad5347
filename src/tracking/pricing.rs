// src/tracking/pricing.rs — Model pricing and cost calculation

/// Per-model rates in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

/// Pricing table, scanned in order; the first key contained in the normalized
/// model identifier wins. Order is the tie-break when several keys match
/// (`gpt-4o` shadows `gpt-4o-mini`).
pub const MODEL_PRICING: &[(&str, ModelPricing)] = &[
    ("gemini-2.5-flash", rates(0.15, 0.60)),
    ("gemini-2.5-pro", rates(1.25, 10.00)),
    ("gemini-2.0-flash", rates(0.10, 0.40)),
    ("claude-sonnet", rates(3.00, 15.00)),
    ("claude-opus", rates(15.00, 75.00)),
    ("claude-haiku", rates(0.25, 1.25)),
    ("gpt-4o", rates(2.50, 10.00)),
    ("gpt-4o-mini", rates(0.15, 0.60)),
];

const fn rates(input_per_mtok: f64, output_per_mtok: f64) -> ModelPricing {
    ModelPricing {
        input_per_mtok,
        output_per_mtok,
    }
}

/// Lowercase, with `_` and spaces turned into `-`.
pub fn normalize_model(model: &str) -> String {
    model
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == ' ' { '-' } else { c })
        .collect()
}

/// Returns the pricing entry matching `model`, if any.
pub fn model_pricing(model: &str) -> Option<(&'static str, ModelPricing)> {
    let normalized = normalize_model(model);
    MODEL_PRICING
        .iter()
        .find(|(key, _)| normalized.contains(key))
        .copied()
}

/// Calculate cost in USD for a token delta. Unknown models cost nothing.
pub fn calculate_cost(model: &str, tokens_input: u64, tokens_output: u64) -> f64 {
    let Some((_, pricing)) = model_pricing(model) else {
        return 0.0;
    };
    let input_cost = (tokens_input as f64 / 1_000_000.0) * pricing.input_per_mtok;
    let output_cost = (tokens_output as f64 / 1_000_000.0) * pricing.output_per_mtok;
    input_cost + output_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── model_pricing tests ────────────────────────────────────

    #[test]
    fn test_pricing_google() {
        let (key, p) = model_pricing("gemini-2.5-pro").unwrap();
        assert_eq!(key, "gemini-2.5-pro");
        assert_eq!(p, rates(1.25, 10.0));

        let (key, _) = model_pricing("models/gemini-2.0-flash-001").unwrap();
        assert_eq!(key, "gemini-2.0-flash");
    }

    #[test]
    fn test_pricing_anthropic() {
        assert_eq!(model_pricing("claude-opus-4").unwrap().1, rates(15.0, 75.0));
        assert_eq!(
            model_pricing("claude-sonnet-4-5-20250929").unwrap().1,
            rates(3.0, 15.0)
        );
        assert_eq!(model_pricing("claude-haiku-3.5").unwrap().1, rates(0.25, 1.25));
    }

    #[test]
    fn test_pricing_normalizes_case_and_separators() {
        assert_eq!(model_pricing("Gemini 2.5 Flash").unwrap().0, "gemini-2.5-flash");
        assert_eq!(model_pricing("CLAUDE_SONNET_4").unwrap().0, "claude-sonnet");
        assert_eq!(normalize_model("GPT 4o_Mini"), "gpt-4o-mini");
    }

    #[test]
    fn test_pricing_first_match_wins() {
        // gpt-4o comes first in the table, so it shadows gpt-4o-mini
        assert_eq!(model_pricing("gpt-4o-mini").unwrap().0, "gpt-4o");
        assert_eq!(model_pricing("gemini-2.5-flash-lite").unwrap().0, "gemini-2.5-flash");
    }

    #[test]
    fn test_pricing_unknown() {
        assert!(model_pricing("llama3.3").is_none());
        assert!(model_pricing("").is_none());
    }

    // ─── calculate_cost tests ───────────────────────────────────

    #[test]
    fn test_calculate_cost_flash_lite() {
        // 1M × $0.15 + 500K × $0.60 = $0.15 + $0.30
        let cost = calculate_cost("gemini-2.5-flash-lite", 1_000_000, 500_000);
        assert!((cost - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_cost_basic() {
        let cost = calculate_cost("claude-sonnet-4", 1_000_000, 500_000);
        assert!((cost - 10.50).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_cost_matches_formula_for_every_key() {
        for (key, p) in MODEL_PRICING {
            let model = format!("vendor/{key}-latest");
            let (matched, mp) = model_pricing(&model).unwrap();
            let expected = 2_000.0 / 1e6 * mp.input_per_mtok + 3_000.0 / 1e6 * mp.output_per_mtok;
            assert!((calculate_cost(&model, 2_000, 3_000) - expected).abs() < 1e-12);
            if *key != "gpt-4o-mini" {
                assert_eq!(matched, *key);
                assert_eq!(mp, *p);
            }
        }
    }

    #[test]
    fn test_calculate_cost_zero_usage() {
        assert_eq!(calculate_cost("claude-opus-4", 0, 0), 0.0);
    }

    #[test]
    fn test_calculate_cost_unknown_model_is_zero() {
        assert_eq!(calculate_cost("some-unknown-model", 10_000_000, 5_000_000), 0.0);
    }
}
