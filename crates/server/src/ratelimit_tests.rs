// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use rp_core::ManualClock;
use std::sync::Arc;
use yare::parameterized;

const START_MS: u64 = 1_700_000_000_000;

fn limiter() -> (ManualClock, RateLimiter) {
    let clock = ManualClock::new(START_MS);
    let limiter = RateLimiter::new(clock.shared());
    (clock, limiter)
}

fn five_per_minute() -> RateLimitConfig {
    RateLimitConfig::new(5, Duration::from_secs(60))
}

#[test]
fn allows_up_to_max_then_denies() {
    let (_clock, limiter) = limiter();
    let config = five_per_minute();

    for i in 0..5 {
        let decision = limiter.check("user-1", &config);
        assert!(decision.allowed, "request {} should be allowed", i + 1);
        assert_eq!(decision.retry_after_secs, None);
        assert_eq!(decision.remaining, 4 - i);
    }

    let denied = limiter.check("user-1", &config);
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after_secs, Some(60));
    assert_eq!(denied.remaining, 0);
}

#[test]
fn retry_after_rounds_up_remaining_window() {
    let (clock, limiter) = limiter();
    let config = RateLimitConfig::new(1, Duration::from_secs(60));

    limiter.check("ip-1", &config);
    clock.advance(Duration::from_millis(59_001));

    let denied = limiter.check("ip-1", &config);
    assert!(!denied.allowed);
    // 999ms left rounds up to one second
    assert_eq!(denied.retry_after_secs, Some(1));
}

#[test]
fn window_resets_after_expiry() {
    let (clock, limiter) = limiter();
    let config = five_per_minute();

    for _ in 0..6 {
        limiter.check("user-1", &config);
    }
    assert!(!limiter.check("user-1", &config).allowed);

    clock.advance(Duration::from_secs(60));

    for i in 0..5 {
        assert!(
            limiter.check("user-1", &config).allowed,
            "request {} in new window",
            i + 1
        );
    }
    assert!(!limiter.check("user-1", &config).allowed);
}

#[test]
fn denied_requests_do_not_extend_window() {
    let (clock, limiter) = limiter();
    let config = RateLimitConfig::new(1, Duration::from_secs(10));

    let first = limiter.check("k", &config);
    clock.advance(Duration::from_secs(5));
    let denied = limiter.check("k", &config);
    assert_eq!(denied.reset_at_ms, first.reset_at_ms);

    clock.advance(Duration::from_secs(5));
    assert!(limiter.check("k", &config).allowed);
}

#[test]
fn identities_are_independent() {
    let (_clock, limiter) = limiter();
    let config = RateLimitConfig::new(1, Duration::from_secs(60));

    assert!(limiter.check("a", &config).allowed);
    assert!(!limiter.check("a", &config).allowed);
    assert!(limiter.check("b", &config).allowed);
}

#[test]
fn classes_are_keyed_independently() {
    let (_clock, limiter) = limiter();
    let limits = RateLimits {
        auth: RateLimitConfig::new(1, Duration::from_secs(60)),
        ..RateLimits::default()
    };

    assert!(limiter.check_class("u1", LimitClass::Auth, &limits).allowed);
    assert!(!limiter.check_class("u1", LimitClass::Auth, &limits).allowed);
    // Exhausting auth leaves reads untouched
    assert!(limiter.check_class("u1", LimitClass::Read, &limits).allowed);
    assert!(limiter.check_class("u1", LimitClass::Write, &limits).allowed);
}

#[test]
fn boundary_burst_exceeds_limit_briefly() {
    // Fixed-window artifact: 5 requests pass within 20ms against a limit of 3.
    let (clock, limiter) = limiter();
    let config = RateLimitConfig::new(3, Duration::from_secs(10));

    clock.advance(Duration::from_millis(1));
    limiter.check("k", &config);
    clock.advance(Duration::from_millis(9_990));
    let mut allowed = 0;
    for _ in 0..2 {
        if limiter.check("k", &config).allowed {
            allowed += 1;
        }
    }
    clock.advance(Duration::from_millis(20));
    for _ in 0..3 {
        if limiter.check("k", &config).allowed {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 5);
}

#[test]
fn sweep_removes_expired_counters() {
    let (clock, limiter) = limiter();
    limiter.check("short", &RateLimitConfig::new(5, Duration::from_secs(1)));
    limiter.check("long", &RateLimitConfig::new(5, Duration::from_secs(300)));
    assert_eq!(limiter.len(), 2);

    clock.advance(Duration::from_secs(2));
    assert_eq!(limiter.sweep(), 1);
    assert_eq!(limiter.len(), 1);
}

#[test]
fn decision_info_reports_reset_in_seconds() {
    let (_clock, limiter) = limiter();
    let decision = limiter.check("k", &five_per_minute());
    let info = decision.info();
    assert_eq!(info.limit, 5);
    assert_eq!(info.remaining, 4);
    assert_eq!(info.reset, START_MS / 1000 + 60);
}

#[test]
fn concurrent_checks_never_exceed_limit() {
    let limiter = Arc::new(RateLimiter::new(rp_core::SystemClock::shared()));
    let config = RateLimitConfig::new(50, Duration::from_secs(3600));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            std::thread::spawn(move || {
                (0..25)
                    .filter(|_| limiter.check("shared", &config).allowed)
                    .count()
            })
        })
        .collect();

    let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(allowed, 50);
}

#[parameterized(
    zero_requests = { RateLimitConfig { max_requests: 0, window_secs: 60 } },
    zero_window = { RateLimitConfig { max_requests: 5, window_secs: 0 } },
)]
fn validate_rejects(config: RateLimitConfig) {
    let limits = RateLimits {
        write: config,
        ..RateLimits::default()
    };
    let err = limits.validate().unwrap_err();
    assert!(err.to_string().contains("write"));
}

#[parameterized(
    auth = { "auth", LimitClass::Auth },
    write = { "write", LimitClass::Write },
    read = { "read", LimitClass::Read },
)]
fn limit_class_from_str(s: &str, expected: LimitClass) {
    assert_eq!(s.parse::<LimitClass>().unwrap(), expected);
}
