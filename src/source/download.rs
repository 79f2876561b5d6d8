use reqwest::StatusCode;
use reqwest::header::CONTENT_RANGE;

use super::now_ms;

pub(super) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

pub(super) async fn sleep_backoff(attempt: u32, base_ms: u64, max_ms: u64) {
    let exp = base_ms.saturating_mul(2u64.saturating_pow(attempt.min(6)));
    let mut ms = exp.min(max_ms);

    // Tiny jitter (0..=250ms) without pulling in RNG deps.
    let jitter = now_ms() % 251;
    ms = ms.saturating_add(jitter).min(max_ms);

    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
}

/// Total length of the resource, from `Content-Range: bytes a-b/total` on a
/// partial response or `Content-Length` plus the start offset otherwise.
pub(super) fn total_length(resp: &reqwest::Response, offset: u64) -> Option<u64> {
    if resp.status() == StatusCode::PARTIAL_CONTENT {
        return resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .or_else(|| resp.content_length().map(|n| n + offset));
    }
    resp.content_length()
}

fn parse_content_range_total(v: &str) -> Option<u64> {
    let (_, total) = v.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total() {
        assert_eq!(parse_content_range_total("bytes 100-199/1000"), Some(1000));
        assert_eq!(parse_content_range_total("bytes 100-199/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
    }
}
