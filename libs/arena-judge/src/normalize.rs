//! Output normalization and comparison.
//!
//! These rules are heuristics tuned against how engines and language runtimes
//! format JSON, not a formal canonical form. They are known to produce both
//! false negatives and false positives:
//!
//! - objects with the same members in a different key order compare unequal
//! - whitespace inside string values is collapsed and stripped next to
//!   punctuation, so `"a ,b"` and `"a,b"` compare equal
//! - numbers are compared textually, so `42` and `42.0` differ
//!
//! Comparison works on normalized strings rather than parsed trees.

use serde_json::Value;

/// Characters next to which whitespace is insignificant
const PUNCTUATION: &[char] = &['[', ']', '{', '}', ',', ':'];

/// Canonical comparison form of `value`
///
/// Rules, in order:
/// 1. trim leading and trailing whitespace
/// 2. collapse internal whitespace runs to a single space
/// 3. drop whitespace adjacent to brackets, braces, commas and colons
///
/// Case and numeric text are preserved. `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(value: &str) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let chars: Vec<char> = collapsed.chars().collect();

    let mut out = String::with_capacity(collapsed.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' {
            let before = i.checked_sub(1).map(|j| chars[j]);
            let after = chars.get(i + 1).copied();
            let near_punctuation = before.map_or(false, |p| PUNCTUATION.contains(&p))
                || after.map_or(false, |n| PUNCTUATION.contains(&n));
            if near_punctuation {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Whether two textual outputs are equal after normalization
pub fn equals(actual: &str, expected: &str) -> bool {
    normalize(actual) == normalize(expected)
}

/// Compare two JSON values through their compact serialization
///
/// Each side is serialized independently, so member order is significant.
pub fn json_equals(actual: &Value, expected: &Value) -> bool {
    equals(&actual.to_string(), &expected.to_string())
}
