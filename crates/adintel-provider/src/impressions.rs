//! Impression range parsing.
//!
//! The ad library reports reach as a human range such as `"1k–5k"` or
//! `"< 1k"`, often with thin or non-breaking spaces around the dash. The
//! numeric estimate is the midpoint of the range.

use std::sync::LazyLock;

use regex::Regex;

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)([km])?(?:-(\d+)([km])?)?$").expect("valid regex")
});

/// Canonical form of an impressions string: all Unicode whitespace removed,
/// en/em/minus dashes folded to `-`, lower-cased.
#[must_use]
pub fn normalize_impressions(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Midpoint estimate for an impressions string; `0` when it is not a
/// recognisable `N[k|m]` or `N[k|m]-M[k|m]` range.
///
/// Odd sums round half up, so `"1-2"` is `2`.
#[must_use]
pub fn parse_impressions(raw: &str) -> i64 {
    let normalized = normalize_impressions(raw);
    let Some(caps) = RANGE_RE.captures(&normalized) else {
        return 0;
    };

    let Some(low) = scaled(caps.get(1).map(|m| m.as_str()), caps.get(2).map(|m| m.as_str()))
    else {
        return 0;
    };

    match caps.get(3) {
        None => low,
        Some(high_digits) => {
            match scaled(Some(high_digits.as_str()), caps.get(4).map(|m| m.as_str())) {
                Some(high) => low
                    .checked_add(high)
                    .and_then(|sum| sum.checked_add(1))
                    .map_or(0, |sum| sum / 2),
                None => 0,
            }
        }
    }
}

fn scaled(digits: Option<&str>, suffix: Option<&str>) -> Option<i64> {
    let value: i64 = digits?.parse().ok()?;
    let factor = match suffix {
        Some("k") => 1_000,
        Some("m") => 1_000_000,
        _ => 1,
    };
    value.checked_mul(factor)
}

/// Parses a percentage share such as `"45%"`, `"12.5 %"` or `45`.
///
/// Returns `None` for anything that is not a finite non-negative number
/// (e.g. `"< 1%"`), so the caller can skip the row instead of zero-filling.
#[must_use]
pub fn parse_percentage(raw: &serde_json::Value) -> Option<f64> {
    let value = match raw {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
            cleaned.strip_suffix('%').unwrap_or(&cleaned).parse::<f64>().ok()?
        }
        _ => return None,
    };
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// `round(total × percentage / 100)`.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn country_share(total: i64, percentage: f64) -> i64 {
    (total as f64 * percentage / 100.0).round() as i64
}
