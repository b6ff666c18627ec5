//! Deadline policy shared by search dispatch and batch downloads.
//!
//! A call that fans out `n` requests over `routines` workers gets one overall
//! budget. The budget grows with the number of batches but is divided by the
//! available parallelism. It never drops below the base timeout and never
//! exceeds [`MAX_TIMEOUT`].

use std::time::Duration;

/// Requests above this count get a doubled base timeout.
const LARGE_REQUEST_THRESHOLD: usize = 100;

/// Upper bound for any computed budget.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Computes the overall deadline budget for a fan-out call.
///
/// # Arguments
///
/// * `image_num` - Number of items requested
/// * `batch_size` - Items returned by a single request (0 is treated as 1)
/// * `routines` - Worker pool size (0 is treated as 1)
/// * `base_timeout` - Budget for a single round of requests
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_timeout(
    image_num: usize,
    batch_size: usize,
    routines: usize,
    base_timeout: Duration,
) -> Duration {
    let batch_size = batch_size.max(1);
    let routines = routines.max(1);

    let batches = image_num.div_ceil(batch_size);
    let base = if image_num > LARGE_REQUEST_THRESHOLD {
        base_timeout * 2
    } else {
        base_timeout
    };

    let factor = (batches as f64 / routines as f64).max(1.0);
    Duration::try_from_secs_f64(base.as_secs_f64() * factor)
        .unwrap_or(MAX_TIMEOUT)
        .max(base_timeout)
        .min(MAX_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_scales_above_base_for_large_requests() {
        let timeout = calculate_timeout(200, 60, 6, Duration::from_secs(3));
        assert!(timeout > Duration::from_secs(3), "got {timeout:?}");
        assert_eq!(timeout, Duration::from_secs(6));
    }

    #[test]
    fn test_timeout_never_below_base() {
        let timeout = calculate_timeout(1, 60, 6, Duration::from_secs(3));
        assert_eq!(timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_timeout_grows_with_batches_per_worker() {
        let base = Duration::from_secs(3);
        let small = calculate_timeout(600, 60, 6, base);
        let large = calculate_timeout(1200, 60, 6, base);
        assert!(large > small, "{large:?} should exceed {small:?}");
        // 1200 / 60 = 20 batches over 6 workers, doubled base
        assert_eq!(large, Duration::from_secs(6).mul_f64(20.0 / 6.0));
    }

    #[test]
    fn test_timeout_shrinks_with_more_workers() {
        let base = Duration::from_secs(5);
        let narrow = calculate_timeout(80, 1, 2, base);
        let wide = calculate_timeout(80, 1, 8, base);
        assert!(wide < narrow);
    }

    #[test]
    fn test_timeout_zero_inputs_do_not_panic() {
        let base = Duration::from_secs(2);
        assert_eq!(calculate_timeout(0, 0, 0, base), base);
        assert_eq!(calculate_timeout(10, 0, 0, base), base * 10);
    }

    #[test]
    fn test_timeout_capped_for_huge_counts() {
        let timeout = calculate_timeout(usize::MAX, 1, 1, Duration::from_secs(10));
        assert_eq!(timeout, MAX_TIMEOUT);
    }
}
