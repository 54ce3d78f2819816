//! Canonical lookup keys for validation contexts.
//!
//! # Encoding
//!
//! ```text
//! vsc1|<len>:<test_suite_id><len>:<validator_name><count>#(<len>:<key><len>:<value>)*
//! ```
//!
//! `<len>` is the UTF-8 byte length in decimal and `<count>` the number of
//! option entries, which are written in ascending key order. Every field is
//! length-prefixed, so a key parses back into exactly one context
//! ([`CanonicalKey::decode`]). Two contexts therefore share a key only when
//! their suite ids, validator names and option sets are equal.

use std::fmt;

use crate::context::{SuiteOptionSet, ValidationContext};
use crate::error::{CacheError, Result};

const KEY_PREFIX: &str = "vsc1|";

/// Deterministic, order-independent storage key for a [`ValidationContext`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the key back into the context it was built from.
    ///
    /// Returns `None` for strings that are not well-formed keys.
    pub fn decode(&self) -> Option<ValidationContext> {
        let mut cursor = Cursor {
            rest: self.0.strip_prefix(KEY_PREFIX)?,
        };
        let test_suite_id = cursor.field()?;
        let validator_name = cursor.field()?;
        let count = cursor.number(b'#')?;

        let mut suite_options = SuiteOptionSet::new();
        let mut previous: Option<&str> = None;
        for _ in 0..count {
            let key = cursor.field()?;
            let value = cursor.field()?;
            // Entries must be strictly ascending, otherwise two strings would
            // decode to the same option set.
            if previous.is_some_and(|prev| prev >= key) {
                return None;
            }
            previous = Some(key);
            suite_options.insert(key, value);
        }

        if !cursor.rest.is_empty() {
            return None;
        }

        Some(ValidationContext::new(test_suite_id, validator_name, suite_options))
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the canonical key for `ctx`.
///
/// Fails with [`CacheError::InvalidContext`] when the suite id or validator
/// name is empty. Any other string, whitespace included, is a valid value.
pub fn canonicalize(ctx: &ValidationContext) -> Result<CanonicalKey> {
    if ctx.test_suite_id.is_empty() {
        return Err(CacheError::InvalidContext {
            field: "test_suite_id",
        });
    }
    if ctx.validator_name.is_empty() {
        return Err(CacheError::InvalidContext {
            field: "validator_name",
        });
    }

    let mut out = String::from(KEY_PREFIX);
    push_field(&mut out, &ctx.test_suite_id);
    push_field(&mut out, &ctx.validator_name);
    out.push_str(&ctx.suite_options.len().to_string());
    out.push('#');
    for (key, value) in ctx.suite_options.iter() {
        push_field(&mut out, key);
        push_field(&mut out, value);
    }

    Ok(CanonicalKey(out))
}

fn push_field(out: &mut String, value: &str) {
    out.push_str(&value.len().to_string());
    out.push(':');
    out.push_str(value);
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn number(&mut self, terminator: u8) -> Option<usize> {
        let end = self.rest.bytes().position(|b| b == terminator)?;
        let digits = &self.rest[..end];
        // Reject empty, signed and zero-padded forms so each number has one spelling.
        if digits.is_empty()
            || !digits.bytes().all(|b| b.is_ascii_digit())
            || (digits.len() > 1 && digits.starts_with('0'))
        {
            return None;
        }
        let value = digits.parse().ok()?;
        self.rest = &self.rest[end + 1..];
        Some(value)
    }

    fn field(&mut self) -> Option<&'a str> {
        let len = self.number(b':')?;
        let value = self.rest.get(..len)?;
        self.rest = &self.rest[len..];
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(suite: &str, validator: &str, options: &[(&str, &str)]) -> ValidationContext {
        ValidationContext::new(suite, validator, options.iter().copied().collect())
    }

    fn key(suite: &str, validator: &str, options: &[(&str, &str)]) -> CanonicalKey {
        canonicalize(&context(suite, validator, options)).expect("canonical key")
    }

    #[test]
    fn option_order_does_not_change_key() {
        let forward = key(
            "basic_suite",
            "basic_name",
            &[("ig_version", "1"), ("us_core_version", "4")],
        );
        let reversed = key(
            "basic_suite",
            "basic_name",
            &[("us_core_version", "4"), ("ig_version", "1")],
        );
        assert_eq!(forward, reversed);
    }

    #[test]
    fn encodes_known_layout() {
        let key = key("basic_suite", "basic_name", &[("ig_version", "2")]);
        assert_eq!(key.as_str(), "vsc1|11:basic_suite10:basic_name1#10:ig_version1:2");
    }

    #[test]
    fn any_single_field_difference_changes_key() {
        let base = key("basic_suite", "basic_name", &[("ig_version", "1")]);

        assert_ne!(base, key("alt id", "basic_name", &[("ig_version", "1")]));
        assert_ne!(base, key("basic_suite", "alt name", &[("ig_version", "1")]));
        assert_ne!(base, key("basic_suite", "basic_name", &[("ig_version", "2")]));
        assert_ne!(base, key("basic_suite", "basic_name", &[("ig_versio", "1")]));
        assert_ne!(base, key("basic_suite", "basic_name", &[]));
        assert_ne!(
            base,
            key(
                "basic_suite",
                "basic_name",
                &[("ig_version", "1"), ("us_core_version", "4")]
            )
        );
    }

    #[test]
    fn delimiter_characters_in_values_do_not_collide() {
        // A naive "suite|validator|k=v" join would map both of these to the same text.
        let a = key("a|b", "c", &[("k", "v=w")]);
        let b = key("a", "b|c", &[("k=v", "w")]);
        assert_ne!(a, b);

        let c = key("s", "v", &[("a", "1#1:b")]);
        let d = key("s", "v", &[("a", "1"), ("b", "")]);
        assert_ne!(c, d);
    }

    #[test]
    fn decode_recovers_the_context() {
        let original = context(
            "suite:with:colons",
            "validator ✓",
            &[("ig_version", "1"), ("", "empty key"), ("x", "")],
        );
        let key = canonicalize(&original).expect("canonical key");
        assert_eq!(key.decode(), Some(original));
    }

    #[test]
    fn decode_rejects_malformed_keys() {
        let bad = [
            "",
            "vsc1|",
            "vsc0|1:a1:b0#",
            "vsc1|1:a1:b0#trailing",
            "vsc1|01:a1:b0#",
            "vsc1|5:a1:b0#",
            "vsc1|1:a1:b1#1:z1:12:aa1:2",
            "vsc1|1:a1:b2#1:z1:11:a1:2",
        ];
        for raw in bad {
            assert_eq!(CanonicalKey(raw.to_string()).decode(), None, "{raw}");
        }
    }

    #[test]
    fn rejects_empty_suite_id() {
        let err = canonicalize(&context("", "basic_name", &[])).unwrap_err();
        assert!(matches!(err, CacheError::InvalidContext { field: "test_suite_id" }));
    }

    #[test]
    fn rejects_empty_validator_name() {
        let err = canonicalize(&context("basic_suite", "", &[])).unwrap_err();
        assert!(matches!(err, CacheError::InvalidContext { field: "validator_name" }));
    }

    #[test]
    fn whitespace_only_fields_are_valid_and_distinct() {
        let spaced_suite = key(" ", "basic_name", &[]);
        let spaced_validator = key("basic_suite", "  ", &[]);

        assert_ne!(spaced_suite, spaced_validator);
        assert_ne!(spaced_validator, key("basic_suite", " ", &[]));
        assert_eq!(spaced_validator.decode(), Some(context("basic_suite", "  ", &[])));
    }
}
