//! Placeholder name generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for placeholder naming.
static PLACEHOLDER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a fresh placeholder name, unique within this process.
///
/// Names are valid bind identifiers (`p0`, `p1`, ...) and never collide across
/// separately built expressions, so composed trees can merge contexts freely.
pub(crate) fn next_placeholder() -> String {
    let n = PLACEHOLDER_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("p{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_are_unique() {
        let a = next_placeholder();
        let b = next_placeholder();
        assert_ne!(a, b);
        assert!(a.starts_with('p'));
        assert!(a[1..].chars().all(|c| c.is_ascii_digit()));
    }
}
