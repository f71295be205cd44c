//! Small helpers shared across the core: hex normalization and the
//! natural-order name comparison used inside buckets.

use std::cmp::Ordering;

/// Normalize a hex digest to lowercase, stripping an optional `0x` prefix.
///
/// Returns `None` when the value is empty, the wrong length, or contains
/// non-hex characters. Malformed hashes degrade to "absent" rather than
/// erroring — catalog input is permissively coerced, never rejected.
pub fn normalize_hex(value: &str, expected_len: usize) -> Option<String> {
    let trimmed = value.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if trimmed.len() != expected_len || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Case-insensitive natural-order comparison: digit runs compare as numbers,
/// everything else compares character by character.
///
/// `"rom2" < "rom10"`, `"Foo" == "foo"`. Ties are left to the caller (a
/// stable sort preserves insertion order).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ca = a.chars().peekable();
    let mut cb = b.chars().peekable();

    loop {
        match (ca.peek().copied(), cb.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                if x.is_ascii_digit() && y.is_ascii_digit() {
                    let na = take_digits(&mut ca);
                    let nb = take_digits(&mut cb);
                    let ord = compare_digit_runs(&na, &nb);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                } else {
                    let xl = x.to_lowercase();
                    let yl = y.to_lowercase();
                    let ord = xl.cmp(yl);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    ca.next();
                    cb.next();
                }
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            out.push(c);
            chars.next();
        } else {
            break;
        }
    }
    out
}

/// Compare two digit runs numerically without parsing (runs may exceed u64).
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let sa = a.trim_start_matches('0');
    let sb = b.trim_start_matches('0');
    match sa.len().cmp(&sb.len()) {
        Ordering::Equal => sa.cmp(sb),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hex_valid() {
        assert_eq!(normalize_hex("DEADBEEF", 8).as_deref(), Some("deadbeef"));
        assert_eq!(normalize_hex("0xDEADBEEF", 8).as_deref(), Some("deadbeef"));
        assert_eq!(normalize_hex(" deadbeef ", 8).as_deref(), Some("deadbeef"));
    }

    #[test]
    fn test_normalize_hex_malformed() {
        assert_eq!(normalize_hex("", 8), None);
        assert_eq!(normalize_hex("dead", 8), None);
        assert_eq!(normalize_hex("deadbeefXX", 8), None);
        assert_eq!(normalize_hex("nothexno", 8), None);
    }

    #[test]
    fn test_natural_cmp_numbers() {
        assert_eq!(natural_cmp("rom2", "rom10"), Ordering::Less);
        assert_eq!(natural_cmp("rom10", "rom2"), Ordering::Greater);
        assert_eq!(natural_cmp("disk 9b", "disk 10a"), Ordering::Less);
    }

    #[test]
    fn test_natural_cmp_case_insensitive() {
        assert_eq!(natural_cmp("Foo", "foo"), Ordering::Equal);
        assert_eq!(natural_cmp("Bar", "foo"), Ordering::Less);
    }

    #[test]
    fn test_natural_cmp_leading_zeros() {
        assert_eq!(natural_cmp("rom002", "rom2"), Ordering::Equal);
        assert_eq!(natural_cmp("rom002", "rom3"), Ordering::Less);
    }
}
