//! Repeated-subsequence detection over traversal paths.
//!
//! Identity tracking catches a node that contains itself; it cannot catch a
//! loop that flows through indirection — a variable resolving to an
//! expression resolving back to the variable, or a path pattern that keeps
//! re-expanding. This guard watches the raw token sequence instead: if some
//! contiguous block keeps repeating, the walk is going nowhere.
//!
//! The window search is intentionally approximate. Block length starts at
//! `run_length` and grows only while `length × max_repetitions` still fits
//! in the sequence, so a repeat whose natural period is never tested goes
//! undetected. Downstream behavior depends on that exact boundary; keep it.

/// Block-length floor / repetition threshold for traversal path stacks.
/// Six repetitions keeps honest deep nesting (a linked list rendered as
/// nested `next` keys) out of the blast radius while still firing well
/// inside the recursion cap.
pub const PATH_RUN_LENGTH: usize = 2;
pub const PATH_MAX_REPETITIONS: usize = 6;

/// Same, for the decoder's chain of followed references. A chain loop often
/// has period one (an expression resolving to itself), so the floor is 1.
pub const CHAIN_RUN_LENGTH: usize = 1;
pub const CHAIN_MAX_REPETITIONS: usize = 4;

/// True iff some contiguous block of length `L` repeats at least
/// `max_repetitions` times consecutively, for any `L` from `run_length`
/// while `L × max_repetitions ≤ seq.len()`, tried at every start offset
/// `0..L` to catch misaligned repeats.
pub fn detect_cycles<T: PartialEq>(seq: &[T], run_length: usize, max_repetitions: usize) -> bool {
    if run_length == 0 || max_repetitions == 0 {
        return false;
    }
    let len = seq.len();
    let mut run = run_length;
    while run.saturating_mul(max_repetitions) <= len {
        for offset in 0..run {
            let mut count = 1usize;
            let mut start = offset;
            while start + 2 * run <= len {
                if seq[start..start + run] == seq[start + run..start + 2 * run] {
                    count += 1;
                    if count >= max_repetitions {
                        return true;
                    }
                } else {
                    count = 1;
                }
                start += run;
            }
        }
        run += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_repeat_detected() {
        let seq = ["a", "b", "c", "a", "b", "c", "a", "b", "c"];
        assert!(detect_cycles(&seq, 3, 3));
    }

    #[test]
    fn test_no_repeat() {
        let seq = ["a", "b", "c", "d", "e"];
        assert!(!detect_cycles(&seq, 3, 3));
    }

    #[test]
    fn test_misaligned_repeat_detected() {
        // repeat starts at offset 1; only the stagger scan catches it
        let seq = ["x", "a", "b", "a", "b", "a", "b", "a", "b"];
        assert!(detect_cycles(&seq, 2, 4));
    }

    #[test]
    fn test_single_token_loop() {
        let seq = ["me", "me", "me", "me"];
        assert!(detect_cycles(&seq, 1, 4));
        assert!(!detect_cycles(&seq[..3], 1, 4));
    }

    #[test]
    fn test_interrupted_repeat_resets() {
        let seq = ["a", "a", "x", "a", "a", "x"];
        assert!(!detect_cycles(&seq, 1, 3));
    }

    #[test]
    fn test_known_false_negative_boundary() {
        // period-4 repeat, but 4 × 3 exceeds the sequence, so L=4 is never
        // tested and the repeat goes undetected
        let seq = ["a", "b", "c", "d", "a", "b", "c", "d"];
        assert!(!detect_cycles(&seq, 3, 3));
        // give it room and it is found
        let seq = ["a", "b", "c", "d", "a", "b", "c", "d", "a", "b", "c", "d"];
        assert!(detect_cycles(&seq, 3, 3));
    }

    #[test]
    fn test_degenerate_inputs() {
        let empty: [&str; 0] = [];
        assert!(!detect_cycles(&empty, 3, 3));
        assert!(!detect_cycles(&["a", "a", "a"], 0, 3));
        assert!(!detect_cycles(&["a", "a", "a"], 1, 0));
    }
}
