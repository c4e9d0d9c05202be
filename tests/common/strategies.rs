use proptest::prelude::*;

use super::{TypeA, TypeB};

/// Strategy for generating TypeA events across the full i64 range
pub fn type_a_strategy() -> impl Strategy<Value = TypeA> {
    any::<i64>().prop_map(|value| TypeA { value })
}

/// Strategy for generating labels, including unicode and JSON-hostile characters
pub fn label_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9_ ]{0,32}",
        Just("quote \" and backslash \\".to_string()),
        Just("ünïcødé ✓".to_string()),
        Just(String::new()),
    ]
}

/// Strategy for generating TypeB events
pub fn type_b_strategy() -> impl Strategy<Value = TypeB> {
    (label_strategy(), prop::collection::vec("[a-z]{1,8}", 0..5))
        .prop_map(|(label, tags)| TypeB { label, tags })
}
