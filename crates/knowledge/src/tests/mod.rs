//! Cross-module scenarios.

mod pipeline_scenarios;
