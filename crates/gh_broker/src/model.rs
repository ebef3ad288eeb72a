use chrono::{DateTime, Utc};
use http::{header, HeaderMap};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RateLimitUpdate {
    pub limit: i64,
    pub remaining: i64,
    pub reset: DateTime<Utc>,
}

pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitUpdate> {
    let limit = header_i64(headers, "x-ratelimit-limit")?;
    let remaining = header_i64(headers, "x-ratelimit-remaining")?;
    let reset = DateTime::from_timestamp(header_i64(headers, "x-ratelimit-reset")?, 0)?;
    Some(RateLimitUpdate {
        limit,
        remaining,
        reset,
    })
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
}

#[derive(Debug, Clone)]
pub struct RetryAdvice {
    pub wait: Duration,
    pub reason: &'static str,
}

/// Reads `Retry-After` as either delta-seconds or an HTTP date.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<RetryAdvice> {
    let value = headers.get(header::RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(RetryAdvice {
            wait: Duration::from_secs(seconds),
            reason: "retry_after",
        });
    }
    let date = httpdate::parse_http_date(value).ok()?;
    let wait = date
        .duration_since(std::time::SystemTime::now())
        .unwrap_or_default();
    Some(RetryAdvice {
        wait,
        reason: "retry_after_date",
    })
}

/// Extracts the `rel="next"` target from a GitHub `Link` header.
pub fn parse_next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|part| {
            let mut segments = part.split(';');
            let target = segments.next()?.trim();
            let is_next = segments.any(|param| {
                let param = param.trim();
                param == "rel=\"next\"" || param == "rel=next"
            });
            if !is_next {
                return None;
            }
            let url = target.strip_prefix('<')?.strip_suffix('>')?;
            Some(url.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn next_link_is_found_among_relations() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::LINK,
            HeaderValue::from_static(
                "<https://api.github.com/organizations/1/repos?page=1>; rel=\"prev\", \
                 <https://api.github.com/organizations/1/repos?page=3>; rel=\"next\", \
                 <https://api.github.com/organizations/1/repos?page=9>; rel=\"last\"",
            ),
        );
        assert_eq!(
            parse_next_link(&headers).as_deref(),
            Some("https://api.github.com/organizations/1/repos?page=3")
        );
    }

    #[test]
    fn last_page_has_no_next_link() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::LINK,
            HeaderValue::from_static(
                "<https://api.github.com/repositories/7/commits?page=1>; rel=\"first\", \
                 <https://api.github.com/repositories/7/commits?page=4>; rel=\"prev\"",
            ),
        );
        assert_eq!(parse_next_link(&headers), None);
        assert_eq!(parse_next_link(&HeaderMap::new()), None);
    }

    #[test]
    fn rate_limit_headers_parse() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-limit", HeaderValue::from_static("5000"));
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));
        let update = parse_rate_limit(&headers).unwrap();
        assert_eq!(update.limit, 5000);
        assert_eq!(update.remaining, 0);
        assert_eq!(update.reset.timestamp(), 1_700_000_000);
    }

    #[test]
    fn retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, HeaderValue::from_static("7"));
        let advice = parse_retry_after(&headers).unwrap();
        assert_eq!(advice.wait, Duration::from_secs(7));
        assert_eq!(advice.reason, "retry_after");
    }
}
