//! Natural ordering of requirement identifiers.
//!
//! A trailing run of digits is treated as a number, so `REQ-5` sorts before
//! `REQ-12`. Everything before the digits is the prefix and is compared
//! case-insensitively.

use std::cmp::Ordering;

use crate::requirement::model::Requirement;

/// Compare two identifiers in natural order.
///
/// When only one side carries a numeric suffix, the other string is compared
/// against its prefix and the suffixed entry wins ties. Remaining ties fall
/// back to ordinal comparison so the ordering is total.
pub fn compare(a: &str, b: &str) -> Ordering {
    let ordering = match (split_suffix(a), split_suffix(b)) {
        ((prefix_a, Some(num_a)), (prefix_b, Some(num_b))) => {
            cmp_ignore_case(prefix_a, prefix_b).then_with(|| compare_digits(num_a, num_b))
        }
        ((prefix_a, Some(_)), (_, None)) => cmp_ignore_case(prefix_a, b).then(Ordering::Less),
        ((_, None), (prefix_b, Some(_))) => cmp_ignore_case(a, prefix_b).then(Ordering::Greater),
        ((_, None), (_, None)) => cmp_ignore_case(a, b),
    };
    ordering.then_with(|| a.cmp(b))
}

/// Sort records by natural identifier order. Stable for equal identifiers.
pub fn sort_requirements(records: &mut [Requirement]) {
    records.sort_by(|a, b| compare(&a.global_id, &b.global_id));
}

/// Split `s` into its prefix and trailing digit run, if any.
fn split_suffix(s: &str) -> (&str, Option<&str>) {
    let digits = s.bytes().rev().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        (s, None)
    } else {
        let (prefix, suffix) = s.split_at(s.len() - digits);
        (prefix, Some(suffix))
    }
}

/// Numeric comparison of two ASCII digit runs of arbitrary length.
fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}
