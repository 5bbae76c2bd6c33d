//! Rule-based detection.

pub mod rule_engine;

pub use rule_engine::RuleEngine;
