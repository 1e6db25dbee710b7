use std::future::Future;
use std::time::Instant;
use tracing::info;

/// Run an async stage and log how long it took.
///
/// `trace_log_fn` renders a short `key=value` summary of a successful result
/// for the log line.
pub async fn measure_dur_async<F, Fut, T, E>(
    stage: &str,
    operation: F,
    trace_log_fn: Option<fn(&T) -> String>,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = operation().await;
    let log_line = result
        .as_ref()
        .ok()
        .and_then(|r| trace_log_fn.map(|f| f(r)))
        .unwrap_or_default();
    info!(
        "{} | {}, took={}",
        stage,
        log_line,
        start.elapsed().as_millis()
    );
    result
}

/// Synchronous counterpart of [`measure_dur_async`] for infallible stages.
pub fn measure_dur<F, T>(stage: &str, operation: F, trace_log_fn: Option<fn(&T) -> String>) -> T
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = operation();
    let log_line = trace_log_fn.map(|f| f(&result)).unwrap_or_default();
    info!(
        "{} | {}, took={}",
        stage,
        log_line,
        start.elapsed().as_millis()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_line(n: &usize) -> String {
        format!("n={}", n)
    }

    fn sum_line(s: &u32) -> String {
        format!("sum={}", s)
    }

    #[tokio::test]
    async fn test_measure_dur_async_passes_result_through() {
        let ok: Result<usize, String> =
            measure_dur_async("stage", || async { Ok(3) }, Some(count_line))
                .await;
        assert_eq!(ok, Ok(3));

        let err: Result<usize, String> =
            measure_dur_async("stage", || async { Err("boom".to_string()) }, None).await;
        assert_eq!(err, Err("boom".to_string()));
    }

    #[test]
    fn test_measure_dur_sync() {
        let v = measure_dur("sum", || (1..=4).sum::<u32>(), Some(sum_line));
        assert_eq!(v, 10);
    }
}
