pub mod fs;
pub mod http;
pub mod poll;
pub mod strings;
pub mod traits;

pub use strings::{get_version_string, truncate_body};

#[cfg(test)]
pub(crate) fn assert_elapsed(start: tokio::time::Instant, expected: std::time::Duration) {
    let elapsed = start.elapsed();
    let slack = std::time::Duration::from_millis(10);
    assert!(
        elapsed >= expected && elapsed <= expected + slack,
        "expected ~{expected:?} to have elapsed, got {elapsed:?}"
    );
}
