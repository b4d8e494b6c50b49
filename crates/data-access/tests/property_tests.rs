//! Property-based tests for the rate budget and cache classification.
//!
//! Time is driven by a `ManualClock`, so each generated case replays a
//! deterministic timeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use stockbro_data_access::{CacheLookup, ManualClock, RateBudget, RateWindowSpec, TtlCache};

// =============================================================================
// Generators
// =============================================================================

/// A timeline step: advance the clock, then attempt some acquisitions.
fn arb_steps() -> impl Strategy<Value = Vec<(u64, u32)>> {
    proptest::collection::vec((0u64..2_500, 0u32..6), 1..60)
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Within any aligned window, admissions never exceed the limit, and a
    /// window with enough demand admits exactly the limit.
    #[test]
    fn prop_rate_budget_admits_at_most_limit_per_window(
        limit in 1u32..8,
        window_ms in 100u64..2_000,
        steps in arb_steps(),
    ) {
        let clock = Arc::new(ManualClock::new());
        let budget = RateBudget::new(
            "prop",
            &[RateWindowSpec::new("w", limit, Duration::from_millis(window_ms))],
            clock.clone(),
        );

        let mut admitted: HashMap<u128, u32> = HashMap::new();
        let mut attempted: HashMap<u128, u32> = HashMap::new();

        for (advance_ms, attempts) in steps {
            clock.advance(Duration::from_millis(advance_ms));
            let window_index = clock.elapsed().as_millis() / u128::from(window_ms);
            for _ in 0..attempts {
                *attempted.entry(window_index).or_default() += 1;
                if budget.try_acquire().is_allowed() {
                    *admitted.entry(window_index).or_default() += 1;
                }
            }
        }

        for (window, tried) in attempted {
            let granted = admitted.get(&window).copied().unwrap_or(0);
            prop_assert!(granted <= limit, "window {} admitted {} > {}", window, granted, limit);
            prop_assert_eq!(granted, tried.min(limit), "window {} under-admitted", window);
        }
    }

    /// Denials always carry a positive wait no longer than the window.
    #[test]
    fn prop_retry_after_is_within_window(
        limit in 1u32..4,
        window_secs in 1u64..3_600,
        offset_secs in 0u64..3_600,
    ) {
        let clock = Arc::new(ManualClock::new());
        let window = Duration::from_secs(window_secs);
        let budget = RateBudget::new("prop", &[RateWindowSpec::new("w", limit, window)], clock.clone());

        clock.advance(Duration::from_secs(offset_secs % window_secs));
        for _ in 0..limit {
            prop_assert!(budget.try_acquire().is_allowed());
        }

        match budget.try_acquire() {
            stockbro_data_access::RateDecision::Denied { retry_after } => {
                prop_assert!(retry_after > Duration::ZERO);
                prop_assert!(retry_after <= window);
            }
            stockbro_data_access::RateDecision::Allowed => {
                prop_assert!(false, "call past the limit was admitted");
            }
        }
    }

    /// An entry is fresh before `fresh_ttl`, stale until `fresh_ttl + stale_window`,
    /// and a miss afterwards.
    #[test]
    fn prop_cache_classification_matches_deadlines(
        fresh_secs in 1u64..600,
        stale_secs in 0u64..600,
        elapsed_secs in 0u64..1_500,
    ) {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::new(clock.clone());
        cache.put(
            "quote:AAPL",
            1u8,
            Duration::from_secs(fresh_secs),
            Duration::from_secs(stale_secs),
        );

        clock.advance(Duration::from_secs(elapsed_secs));
        let lookup = cache.get("quote:AAPL");

        if elapsed_secs < fresh_secs {
            prop_assert!(matches!(lookup, CacheLookup::Fresh(_)));
        } else if elapsed_secs < fresh_secs + stale_secs {
            prop_assert!(matches!(lookup, CacheLookup::Stale(_)));
        } else {
            prop_assert!(matches!(lookup, CacheLookup::Miss));
            prop_assert!(cache.is_empty());
        }
    }
}
