use lazy_static::lazy_static;
use prometheus::{Counter, Histogram, register_counter, register_histogram};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("zettai_requests_total", "Total number of API requests").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("zettai_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("zettai_cache_misses_total", "Total cache misses").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter =
        register_counter!("zettai_rate_limited_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref CONTACT_SUBMISSIONS: Counter =
        register_counter!("zettai_contact_submissions_total", "Accepted contact form submissions").unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "zettai_upstream_latency_seconds",
        "Completion provider latency in seconds"
    )
    .unwrap();
}
