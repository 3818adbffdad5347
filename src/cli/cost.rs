// src/cli/cost.rs — `harmony-agent cost`

use crate::tracking::pricing;

/// One line describing the estimate, or why there is none.
pub fn describe_cost(model: &str, input: u64, output: u64) -> String {
    match pricing::model_pricing(model) {
        Some((matched, rates)) => format!(
            "{model} (priced as {matched}: ${}/M in, ${}/M out): {input} in + {output} out = ${:.6}",
            rates.input_per_mtok,
            rates.output_per_mtok,
            pricing::calculate_cost(model, input, output),
        ),
        None => format!("{model}: no price entry, cost reported as $0"),
    }
}

pub fn run_cost(model: &str, input: u64, output: u64) {
    println!("{}", describe_cost(model, input, output));
}
