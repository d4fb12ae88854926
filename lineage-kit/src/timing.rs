//! Operation timing
//!
//! ```rust,no_run
//! use lineage_kit::measure_time;
//!
//! let total = measure_time!("sum_records", { (1..=10).sum::<u32>() });
//! ```

/// Measure execution time of a synchronous block
///
/// Logs via `tracing::debug!` with fields `operation` and `elapsed_ms`, then
/// returns the block's value.
#[macro_export]
macro_rules! measure_time {
    ($label:expr, $block:block) => {{
        let __start = std::time::Instant::now();
        let __result = $block;
        let __elapsed = __start.elapsed();
        ::tracing::debug!(
            operation = $label,
            elapsed_ms = __elapsed.as_millis() as u64,
            "Operation completed"
        );
        __result
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_measure_time_returns_block_value() {
        let value = measure_time!("test_op", { 2 + 2 });
        assert_eq!(value, 4);
    }

    #[test]
    fn test_measure_time_propagates_result() {
        fn fallible() -> Result<u8, String> {
            let v = measure_time!("fallible", { "7".parse::<u8>().map_err(|e| e.to_string()) })?;
            Ok(v * 2)
        }
        assert_eq!(fallible(), Ok(14));
    }
}
