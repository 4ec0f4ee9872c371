//! Marks the single-threaded origin context (the thread that issues requests
//! and drains results) so blocking work can refuse to run there.

use std::cell::Cell;

thread_local! {
    static ORIGIN: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as the origin context.
pub fn mark_origin_context() {
    ORIGIN.with(|o| o.set(true));
}

/// Returns true on a thread marked by [`mark_origin_context`].
#[must_use]
pub fn is_origin_context() -> bool {
    ORIGIN.with(Cell::get)
}

/// Panics if called on the origin context.
///
/// # Panics
/// Always panics on the origin context; this is a programming error, not a
/// runtime failure.
pub fn assert_off_origin(operation: &str) {
    assert!(
        !is_origin_context(),
        "{operation} must not run on the origin context"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_thread_is_not_origin() {
        let marked = std::thread::spawn(is_origin_context).join().unwrap();
        assert!(!marked);
    }

    #[test]
    fn test_marking_is_per_thread() {
        let result = std::thread::spawn(|| {
            mark_origin_context();
            let other = std::thread::spawn(is_origin_context).join().unwrap();
            (is_origin_context(), other)
        })
        .join()
        .unwrap();
        assert_eq!(result, (true, false));
    }

    #[test]
    fn test_assert_off_origin_panics_on_origin() {
        let outcome = std::thread::spawn(|| {
            mark_origin_context();
            assert_off_origin("network fetch");
        })
        .join();
        assert!(outcome.is_err());
    }
}
