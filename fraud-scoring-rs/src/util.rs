//! Small helpers shared across modules

use std::time::{Duration, Instant};

/// Run an async closure and report how long it took
pub async fn measure_time_async<F, T, Fut>(f: F) -> (T, Duration)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let result = f().await;
    let duration = start.elapsed();
    (result, duration)
}

/// Truncate a string to at most `max_len` bytes, adding an ellipsis if cut.
///
/// Never splits a UTF-8 character.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let keep = if max_len <= 3 { max_len } else { max_len - 3 };
    let mut end = keep;
    while !s.is_char_boundary(end) {
        end -= 1;
    }

    if max_len <= 3 {
        s[..end].to_string()
    } else {
        format!("{}...", &s[..end])
    }
}

/// Split a comma separated list, dropping blanks
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("hi", 2), "hi");
        assert_eq!(truncate_string("héllo wörld", 5), "h...");
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("ml_model/predict.py"), vec!["ml_model/predict.py"]);
        assert_eq!(split_list(" -u, predict.py ,,"), vec!["-u", "predict.py"]);
        assert!(split_list("").is_empty());
    }

    #[tokio::test]
    async fn test_measure_time_async() {
        let (value, elapsed) = measure_time_async(|| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            7
        })
        .await;
        assert_eq!(value, 7);
        assert!(elapsed >= Duration::from_millis(5));
    }
}
