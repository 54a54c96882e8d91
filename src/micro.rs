//! Expected number of days an infected person is infectious and free.
//!
//! Notation, all in days:
//!
//! * `T`: time between surveillance tests (infinite without surveillance).
//! * `X`: start of the infectious period, uniform on `[0, T]`.
//! * `D`: delay between sampling and isolation after a positive test.
//! * `R`: maximum length of the infectious period.
//! * `N`: index of the first test that comes back positive, geometric in
//!   the test sensitivity.
//!
//! A person is free and infectious for `min(T - X + N T + D, R)` days. The
//! infection level is assumed constant over the whole detectable period.

/// `E[days free | test n is the first positive]`.
fn conditional_days_infectious(n: u32, between: f64, delay: f64, max_days: f64) -> f64 {
    // With U = (T - X) / T uniform on [0, 1] and b = (R - D - nT) / T,
    // E[min(U, b)] is 0 for b <= 0, b (1 - b / 2) for b in (0, 1) and 1/2 above.
    let n = f64::from(n);
    let b = (max_days - delay - n * between) / between;
    let y = if b < 0.0 {
        0.0
    } else if b > 1.0 {
        0.5
    } else {
        b * (1.0 - 0.5 * b)
    };
    delay + n * between + between * y
}

/// Expected days infectious and free under a surveillance testing cadence.
///
/// Pass `f64::INFINITY` for `between` when there is no surveillance.
pub fn days_infectious(between: f64, delay: f64, sensitivity: f64, max_days: f64) -> f64 {
    if between.is_infinite() || delay.is_infinite() || sensitivity <= 0.0 || between <= 0.0 {
        return max_days;
    }

    let mut n: u32 = 0;
    // Prob(N >= n) and Prob(N = n).
    let mut tail = 1.0;
    let mut prob_n = sensitivity;
    let mut days = 0.0;
    // Stop once later tests can no longer matter or are too late to catch anyone.
    while tail > f64::EPSILON && delay + f64::from(n) * between < max_days {
        days += prob_n * conditional_days_infectious(n, between, delay, max_days);
        tail -= prob_n;
        prob_n *= 1.0 - sensitivity;
        n += 1;
    }
    let tail = tail.max(0.0);
    // Once D + nT >= R every later test is too late and the person is free for R days.
    days + tail * max_days
}

pub fn days_infectious_perfect_sensitivity(between: f64, delay: f64, max_days: f64) -> f64 {
    if between.is_infinite() || delay.is_infinite() || between <= 0.0 {
        return max_days;
    }
    conditional_days_infectious(0, between, delay, max_days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_surveillance_is_free_for_the_whole_period() {
        assert_eq!(days_infectious(f64::INFINITY, 2.0, 0.5, 5.0), 5.0);
        assert_eq!(days_infectious(f64::INFINITY, 2.0, 0.7, 3.0), 3.0);
        assert_eq!(days_infectious(3.0, f64::INFINITY, 0.6, 5.0), 5.0);
        assert_eq!(days_infectious_perfect_sensitivity(5.0, f64::INFINITY, 1.0), 1.0);
    }

    #[test]
    fn perfect_sensitivity_matches_closed_form() {
        for (between, delay, max_days) in [(5.0, 2.0, 10.0), (3.0, 2.0, 10.0), (5.0, 3.0, 7.0)] {
            let x1 = days_infectious(between, delay, 1.0, max_days);
            let x2 = days_infectious_perfect_sensitivity(between, delay, max_days);
            assert!((x1 - x2).abs() < 1e-12);
        }
    }

    #[test]
    fn more_delay_means_more_days_free() {
        assert!(days_infectious(5.0, 2.0, 0.5, 10.0) < days_infectious(5.0, 3.0, 0.5, 10.0));
        assert!(days_infectious(5.0, 3.0, 0.8, 10.0) < days_infectious(5.0, 4.0, 0.8, 10.0));
    }

    #[test]
    fn more_sensitivity_means_fewer_days_free() {
        assert!(days_infectious(5.0, 2.0, 0.7, 10.0) < days_infectious(5.0, 2.0, 0.5, 10.0));
    }

    #[test]
    fn longer_infectious_period_means_more_days_free() {
        assert!(days_infectious(5.0, 2.0, 0.5, 10.0) < days_infectious(5.0, 2.0, 0.5, 13.0));
        assert!(days_infectious(5.0, 3.0, 0.8, 6.0) < days_infectious(5.0, 3.0, 0.8, 9.0));
    }

    #[test]
    fn very_frequent_testing_finishes_quickly() {
        // A test every 1e-9 days, far more than the infectious period holds.
        let days = days_infectious(1e-9, 1.0, 0.5, 5.0);
        assert!((days - 1.0).abs() < 1e-6);
        let days = days_infectious(7.0 / 1e12, 0.5, 0.9, 10.0);
        assert!((days - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_sensitivity_is_like_no_surveillance() {
        assert_eq!(
            days_infectious(5.0, 2.0, 0.0, 10.0),
            days_infectious(f64::INFINITY, 2.0, 0.0, 10.0)
        );
    }
}
