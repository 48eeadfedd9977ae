//! Property-based tests for configuration coercion and session bookkeeping.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::expect_used)]

use std::path::Path;

use proptest::prelude::*;
use serde_json::{Value, json};

use blackberets_cli::domain::catalog::{BundleSettings, expand};
use blackberets_cli::domain::config::ConfigDocument;
use blackberets_cli::domain::module::{ActionSpec, Module, ModuleStatus, SessionReport};
use blackberets_cli::domain::session::SessionState;

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(|f| json!(f)),
        "[ -~]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn arb_status() -> impl Strategy<Value = ModuleStatus> {
    prop_oneof![
        Just(ModuleStatus::Installed),
        Just(ModuleStatus::InstalledWithWarnings),
        Just(ModuleStatus::Failed),
        Just(ModuleStatus::Skipped),
    ]
}

// ============================================================================
// ConfigDocument lookups
// ============================================================================

proptest! {
    /// Settings resolution is total: any document yields usable settings.
    #[test]
    fn prop_any_document_resolves(root in arb_json()) {
        let settings = BundleSettings::from_document(
            &ConfigDocument::new(root),
            Path::new("/home/op"),
            Path::new("/work"),
        );
        prop_assert!(settings.prefix.is_absolute());
        prop_assert!(settings.state_dir.is_absolute());
        prop_assert!(!settings.localai.bind_address.is_empty());
    }

    /// Numeric and string spellings of a port resolve identically.
    #[test]
    fn prop_port_accepts_number_or_string(port in 1u16..) {
        let as_number = ConfigDocument::new(json!({ "ai": { "localAI": { "defaultPort": port } } }));
        let as_string = ConfigDocument::new(json!({ "ai": { "localAI": { "defaultPort": port.to_string() } } }));
        prop_assert_eq!(as_number.get("ai.localAI.defaultPort", 8080u16), port);
        prop_assert_eq!(as_string.get("ai.localAI.defaultPort", 8080u16), port);
    }

    /// Values that do not fit the target type fall back to the default.
    #[test]
    fn prop_out_of_range_port_uses_default(port in 65_536u64..) {
        let doc = ConfigDocument::new(json!({ "ai": { "localAI": { "defaultPort": port } } }));
        prop_assert_eq!(doc.get("ai.localAI.defaultPort", 8080u16), 8080);
    }

    /// Words outside the boolean vocabulary never flip a flag.
    #[test]
    fn prop_unrecognized_bool_string_uses_default(word in "[a-z]{2,10}") {
        prop_assume!(!matches!(word.as_str(), "true" | "false" | "yes" | "no"));
        let doc = ConfigDocument::new(json!({ "mcp": { "enabled": word } }));
        prop_assert!(doc.get("mcp.enabled", true));
        prop_assert!(!doc.get("mcp.enabled", false));
    }

    /// Blank strings count as unset.
    #[test]
    fn prop_blank_string_is_unset(spaces in " {0,6}") {
        let doc = ConfigDocument::new(json!({ "ai": { "localAI": { "bindAddress": spaces } } }));
        prop_assert_eq!(doc.get("ai.localAI.bindAddress", "0.0.0.0".to_string()), "0.0.0.0");
    }
}

// ============================================================================
// Path expansion
// ============================================================================

proptest! {
    #[test]
    fn prop_expand_never_escapes_to_relative(raw in "(~/|\\./|/)?[a-z]{1,8}(/[a-z]{1,8}){0,3}") {
        let path = expand(&raw, Path::new("/home/op"), Path::new("/opt/bb"));
        prop_assert!(path.is_absolute(), "{} -> {}", raw, path.display());
        if raw.starts_with("~/") {
            prop_assert!(path.starts_with("/home/op"));
        } else if !raw.starts_with('/') {
            prop_assert!(path.starts_with("/opt/bb"));
        }
    }
}

// ============================================================================
// Session bookkeeping
// ============================================================================

proptest! {
    /// Without an abort, a session never fails regardless of module outcomes.
    #[test]
    fn prop_no_abort_exits_zero(statuses in prop::collection::vec(arb_status(), 0..8)) {
        let mut report = SessionReport::default();
        for (i, status) in statuses.iter().enumerate() {
            let module = Module::new(format!("m{i}"), ActionSpec::new("true", Vec::<String>::new()));
            report.record(&module, *status, "");
        }
        prop_assert_eq!(report.status().exit_code(), 0);
        let tally = report.tally();
        prop_assert_eq!(tally.passed + tally.warned + tally.failed + tally.skipped, statuses.len());
    }

    /// Terminal states accept no transitions.
    #[test]
    fn prop_terminal_states_are_final(to in prop_oneof![
        Just(SessionState::Created),
        Just(SessionState::Installing),
        Just(SessionState::Completed),
        Just(SessionState::Failed),
    ]) {
        prop_assert!(!SessionState::Completed.can_transition(to));
        prop_assert!(!SessionState::Failed.can_transition(to));
    }
}

#[test]
fn test_happy_path_reaches_completed() {
    let mut state = SessionState::Created;
    while !state.is_terminal() {
        let next = state.next();
        assert!(state.can_transition(next), "{state:?} -> {next:?}");
        state = next;
    }
    assert_eq!(state, SessionState::Completed);
}
