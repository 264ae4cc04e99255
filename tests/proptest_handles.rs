//! Property-based tests using proptest
//!
//! These tests verify handle encoding, legacy migration and shape detection,
//! plus OData literal quoting, using randomized inputs.

use dirrecon::backend::directory::{eq_filter, odata_literal};
use dirrecon::handle::{self, HandleShape};
use dirrecon::models::CredentialKind;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn arb_kind() -> impl Strategy<Value = CredentialKind> {
    prop_oneof![Just(CredentialKind::Password), Just(CredentialKind::Certificate)]
}

/// Object ids and key ids as the directory issues them
fn arb_uuid() -> impl Strategy<Value = String> {
    "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
}

/// Ids with no restriction beyond being non-empty
fn arb_any_id() -> impl Strategy<Value = String> {
    ".{1,40}"
}

/// A legacy segment: non-empty, no separator
fn arb_segment() -> impl Strategy<Value = String> {
    "[^/]{1,40}"
}

proptest! {
    /// Encoding then decoding a current handle gives back its parts
    #[test]
    fn current_handle_round_trips(
        parent in arb_any_id(),
        kind in arb_kind(),
        key in arb_any_id()
    ) {
        let encoded = handle::encode(&parent, kind, &key).unwrap();
        let decoded = handle::decode_current(&encoded).unwrap();

        prop_assert_eq!(decoded.parent_id, parent);
        prop_assert_eq!(decoded.kind, kind);
        prop_assert_eq!(decoded.key, key);
    }

    /// Separators inside ids never leak into the handle structure
    #[test]
    fn current_handle_has_three_segments(
        parent in arb_any_id(),
        kind in arb_kind(),
        key in arb_any_id()
    ) {
        let encoded = handle::encode(&parent, kind, &key).unwrap();
        prop_assert_eq!(encoded.split('/').count(), 3);
        prop_assert_eq!(handle::probe(&encoded), HandleShape::Current);
    }

    /// Directory-issued ids need no escaping
    #[test]
    fn uuid_handles_are_plain(parent in arb_uuid(), kind in arb_kind(), key in arb_uuid()) {
        let encoded = handle::encode(&parent, kind, &key).unwrap();
        prop_assert_eq!(encoded, format!("{parent}/{kind}/{key}"));
    }

    /// Migrating a legacy handle keeps both ids and takes the given kind
    #[test]
    fn legacy_handle_migrates(
        parent in arb_segment(),
        kind in arb_kind(),
        key in arb_segment()
    ) {
        let legacy = format!("{parent}/{key}");
        prop_assert_eq!(handle::probe(&legacy), HandleShape::Legacy);

        let migrated = handle::migrate(&legacy, kind).unwrap();
        let decoded = handle::decode_current(&migrated).unwrap();

        prop_assert_eq!(decoded.parent_id, parent);
        prop_assert_eq!(decoded.kind, kind);
        prop_assert_eq!(decoded.key, key);
    }

    /// A state upgrade is idempotent
    #[test]
    fn state_upgrade_is_idempotent(
        parent in arb_uuid(),
        kind in arb_kind(),
        key in arb_uuid()
    ) {
        let mut state = Map::new();
        state.insert("id".to_string(), json!(format!("{parent}/{key}")));
        state.insert("display_name".to_string(), json!("ci"));

        let once = handle::upgrade_state_v0(state, kind).unwrap();
        let twice = handle::upgrade_state_v0(once.clone(), kind).unwrap();

        let expected = format!("{parent}/{kind}/{key}");
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.get("display_name"), Some(&json!("ci")));
        prop_assert_eq!(once.get("id").and_then(Value::as_str), Some(expected.as_str()));
    }

    /// Strings without a separator are neither shape
    #[test]
    fn single_segment_is_unknown(s in "[^/]{0,40}") {
        prop_assert_eq!(handle::probe(&s), HandleShape::Unknown);
        prop_assert!(handle::decode_legacy(&s).is_err());
        prop_assert!(handle::decode_current(&s).is_err());
    }

    /// Four or more segments are neither shape
    #[test]
    fn too_many_segments_is_unknown(segments in prop::collection::vec(arb_segment(), 4..8)) {
        let s = segments.join("/");
        prop_assert_eq!(handle::probe(&s), HandleShape::Unknown);
    }

    /// An unknown kind in the middle segment is rejected
    #[test]
    fn unknown_kind_is_rejected(
        parent in arb_uuid(),
        kind in "[a-z]{1,12}",
        key in arb_uuid()
    ) {
        prop_assume!(kind != "password" && kind != "certificate");
        let s = format!("{parent}/{kind}/{key}");
        prop_assert!(handle::decode_current(&s).is_err());
        prop_assert_eq!(handle::probe(&s), HandleShape::Unknown);
    }
}

/// Tests for OData literal quoting
mod filter_tests {
    use super::*;

    /// Undo `odata_literal`: strip the outer quotes and collapse doubled ones
    fn unquote(literal: &str) -> Option<String> {
        let inner = literal.strip_prefix('\'')?.strip_suffix('\'')?;
        Some(inner.replace("''", "'"))
    }

    proptest! {
        /// Quoting is reversible for any value
        #[test]
        fn literal_round_trips(value in ".{0,40}") {
            let literal = odata_literal(&value);
            prop_assert_eq!(unquote(&literal), Some(value));
        }

        /// Every quote inside the literal is doubled
        #[test]
        fn inner_quotes_are_paired(value in "[a-z' ]{0,40}") {
            let literal = odata_literal(&value);
            let inner = &literal[1..literal.len() - 1];
            prop_assert_eq!(inner.matches('\'').count() % 2, 0);
            prop_assert_eq!(inner.matches('\'').count(), 2 * value.matches('\'').count());
        }

        /// The field name leads the expression unchanged
        #[test]
        fn eq_filter_shape(field in "[a-zA-Z]{1,20}", value in "[^']{0,20}") {
            let filter = eq_filter(&field, &value);
            prop_assert_eq!(filter, format!("{field} eq '{value}'"));
        }
    }
}
