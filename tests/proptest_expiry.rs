//! Property-based tests using proptest
//!
//! These tests verify the TTL tag grammar: duration parsing, absolute
//! expiry evaluation, and tag lookup rules under randomized inputs.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use proptest::prelude::*;

use azure_janitor::azure::model::TagMap;
use azure_janitor::janitor::{parse_duration_value, ExpiryEvaluator};

fn evaluator() -> ExpiryEvaluator {
    ExpiryEvaluator::new("ttl", "ttl_expiry", false)
}

fn dry_run_evaluator() -> ExpiryEvaluator {
    ExpiryEvaluator::new("ttl", "ttl_expiry", true)
}

fn tag_set(key: &str, value: &str) -> TagMap {
    [(key.to_string(), value.to_string())].into_iter().collect()
}

fn rfc3339(epoch: i64) -> String {
    Utc.timestamp_opt(epoch, 0)
        .single()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Compact shorthand ("5d", "1h30m") together with its expected length in
/// seconds
fn arb_compact_duration() -> impl Strategy<Value = (String, i64)> {
    (0i64..60, 0i64..72, 0i64..180, 0i64..600)
        .prop_filter("at least one nonzero component", |(d, h, m, s)| {
            d + h + m + s > 0
        })
        .prop_map(|(d, h, m, s)| {
            (
                format!("{d}d{h}h{m}m{s}s"),
                d * 86_400 + h * 3_600 + m * 60 + s,
            )
        })
}

/// ISO-8601 period string together with its expected length in seconds
fn arb_iso_period() -> impl Strategy<Value = (String, i64)> {
    (
        prop_oneof![Just("P"), Just("p")],
        0i64..400,
        0i64..48,
        0i64..180,
    )
        .prop_filter("at least one nonzero component", |(_, d, h, m)| {
            d + h + m > 0
        })
        .prop_map(|(prefix, d, h, m)| {
            (
                format!("{prefix}{d}DT{h}H{m}M"),
                d * 86_400 + h * 3_600 + m * 60,
            )
        })
}

proptest! {
    /// Compact components add up exactly
    #[test]
    fn compact_durations_parse_exactly((value, expected_secs) in arb_compact_duration()) {
        let parsed = parse_duration_value(&value);
        prop_assert!(parsed.is_some());
        prop_assert_eq!(parsed.unwrap().num_seconds(), expected_secs);
    }

    /// ISO-8601 period components add up exactly, whatever the prefix case
    #[test]
    fn iso_periods_parse_exactly((value, expected_secs) in arb_iso_period()) {
        let parsed = parse_duration_value(&value);
        prop_assert!(parsed.is_some());
        prop_assert_eq!(parsed.unwrap().num_seconds(), expected_secs);
    }

    /// Unit aliases all mean the same thing
    #[test]
    fn hour_unit_aliases_agree(
        amount in 1i64..1000,
        unit in prop_oneof!["h", "hr", "hrs", "hour", "hours"]
    ) {
        let parsed = parse_duration_value(&format!("{amount}{unit}"));
        prop_assert_eq!(parsed.map(|d| d.num_seconds()), Some(amount * 3_600));
    }

    /// Pure-alphabetic input is never a duration
    #[test]
    fn letters_are_not_durations(value in "[a-zA-Z]{1,12}") {
        prop_assert!(parse_duration_value(&value).is_none());
    }

    /// A bare number without a unit is never a duration
    #[test]
    fn bare_numbers_are_not_durations(value in "[0-9]{1,9}") {
        prop_assert!(parse_duration_value(&value).is_none());
    }
}

/// Tests for absolute expiry evaluation
mod evaluation_tests {
    use super::*;

    proptest! {
        /// Absolute times in the past always expire
        #[test]
        fn past_times_expire(epoch in 86_400i64..1_600_000_000) {
            let eval = evaluator().evaluate(&tag_set("ttl_expiry", &rfc3339(epoch)));
            prop_assert!(eval.expired);
            prop_assert_eq!(eval.expiry_time.map(|t| t.timestamp()), Some(epoch));
            prop_assert!(!eval.rewrite_needed);
        }

        /// Absolute times in the future never expire and need no rewrite
        #[test]
        fn future_times_do_not_expire(epoch in 1_900_000_000i64..4_000_000_000) {
            let eval = evaluator().evaluate(&tag_set("ttl_expiry", &rfc3339(epoch)));
            prop_assert!(!eval.expired);
            prop_assert_eq!(eval.expiry_time.map(|t| t.timestamp()), Some(epoch));
            prop_assert!(!eval.rewrite_needed);
        }

        /// Bare dates are read as midnight UTC
        #[test]
        fn bare_dates_read_as_midnight_utc(
            year in 2030i32..2090,
            month in 1u32..=12,
            day in 1u32..=28
        ) {
            let value = format!("{year:04}-{month:02}-{day:02}");
            let eval = evaluator().evaluate(&tag_set("ttl_expiry", &value));
            let expected = Utc
                .with_ymd_and_hms(year, month, day, 0, 0, 0)
                .single();
            prop_assert_eq!(eval.expiry_time, expected);
            prop_assert!(!eval.expired);
        }

        /// Times at or before the Unix epoch are rejected as markers
        #[test]
        fn pre_epoch_dates_are_rejected(
            year in 1900i32..1970,
            month in 1u32..=12,
            day in 1u32..=28
        ) {
            let value = format!("{year:04}-{month:02}-{day:02}");
            let eval = evaluator().evaluate(&tag_set("ttl_expiry", &value));
            prop_assert!(eval.expiry_time.is_none());
            prop_assert!(!eval.expired);
        }

        /// Relative durations rewrite to an absolute value close to
        /// now + duration
        #[test]
        fn durations_rewrite_to_absolute((value, expected_secs) in arb_compact_duration()) {
            let before = Utc::now();
            let eval = evaluator().evaluate(&tag_set("ttl", &value));
            let after = Utc::now();

            prop_assert!(eval.rewrite_needed);
            prop_assert!(!eval.expired);
            let written = eval.new_tag_value.as_deref().unwrap_or("");
            let written = DateTime::parse_from_rfc3339(written)
                .map(|t| t.with_timezone(&Utc));
            prop_assert!(written.is_ok());
            let written = written.unwrap();
            prop_assert!(written.timestamp() >= before.timestamp() + expected_secs - 2);
            prop_assert!(written.timestamp() <= after.timestamp() + expected_secs + 2);
        }

        /// Dry-run still reports the expiry time but never flags expiry
        #[test]
        fn dry_run_never_expires(epoch in 86_400i64..1_600_000_000) {
            let eval = dry_run_evaluator().evaluate(&tag_set("ttl_expiry", &rfc3339(epoch)));
            prop_assert!(!eval.expired);
            prop_assert_eq!(eval.expiry_time.map(|t| t.timestamp()), Some(epoch));
        }

        /// Arbitrary tag values never panic, and outputs stay consistent
        #[test]
        fn garbage_upholds_evaluation_invariants(value in ".*") {
            let eval = evaluator().evaluate(&tag_set("ttl", &value));
            if eval.expired {
                prop_assert!(eval.expiry_time.is_some());
            }
            if eval.rewrite_needed {
                prop_assert!(eval.expiry_time.is_some());
                prop_assert!(eval.new_tag_value.is_some());
            } else {
                prop_assert!(eval.new_tag_value.is_none());
            }
        }
    }
}

/// Tests for tag lookup rules
mod tag_lookup_tests {
    use super::*;

    /// Re-case a word according to a boolean mask, cycling the mask
    fn apply_case(word: &str, mask: &[bool]) -> String {
        word.chars()
            .zip(mask.iter().cycle())
            .map(|(c, upper)| {
                if *upper {
                    c.to_ascii_uppercase()
                } else {
                    c.to_ascii_lowercase()
                }
            })
            .collect()
    }

    proptest! {
        /// Tag names match case-insensitively
        #[test]
        fn tag_names_ignore_case(mask in prop::collection::vec(any::<bool>(), 1..10)) {
            let key = apply_case("ttl_expiry", &mask);
            let eval = evaluator().evaluate(&tag_set(&key, "2031-01-01"));
            prop_assert!(eval.expiry_time.is_some());
        }

        /// Whitespace-only values mean the marker is absent
        #[test]
        fn blank_values_mean_absent(value in "[ \t]{0,10}") {
            let eval = evaluator().evaluate(&tag_set("ttl", &value));
            prop_assert!(eval.expiry_time.is_none());
            prop_assert!(!eval.expired);
        }

        /// Values are trimmed before parsing
        #[test]
        fn padded_values_are_trimmed(
            left in " {0,5}",
            right in " {0,5}",
            epoch in 1_900_000_000i64..4_000_000_000
        ) {
            let value = format!("{left}{}{right}", rfc3339(epoch));
            let eval = evaluator().evaluate(&tag_set("ttl_expiry", &value));
            prop_assert_eq!(eval.expiry_time.map(|t| t.timestamp()), Some(epoch));
        }

        /// The target tag decides when both tags are present
        #[test]
        fn target_tag_governs(
            past in 86_400i64..1_600_000_000,
            future in 1_900_000_000i64..4_000_000_000
        ) {
            let mut tags = tag_set("ttl", &rfc3339(future));
            tags.insert("ttl_expiry".to_string(), rfc3339(past));
            let eval = evaluator().evaluate(&tags);
            prop_assert!(eval.expired);

            let mut tags = tag_set("ttl", &rfc3339(past));
            tags.insert("ttl_expiry".to_string(), rfc3339(future));
            let eval = evaluator().evaluate(&tags);
            prop_assert!(!eval.expired);
        }
    }
}
