//! Time-windowed views and FIFO pruning of ordered logs

use crate::types::Sample;

/// Return the suffix of `log` whose timestamps fall within `window_ms` of
/// the most recent sample.
///
/// The window boundary is `latest.timestamp - window_ms`, inclusive, so
/// the most recent sample is always included. Returns an empty slice on
/// an empty log; callers that need two samples must guard on length
/// themselves. Pure, O(n) scan from the tail.
pub fn windowed(log: &[Sample], window_ms: u64) -> &[Sample] {
    let Some(latest) = log.last() else {
        return log;
    };
    let boundary = latest.timestamp_ms.saturating_sub(window_ms);
    let start = log
        .iter()
        .rposition(|s| s.timestamp_ms < boundary)
        .map(|i| i + 1)
        .unwrap_or(0);
    &log[start..]
}

/// Drop the oldest entries of `log` until it holds at most `max_len`
/// items, preserving order. Used for both the sample log and the score
/// logs.
pub fn prune_to<T>(log: &mut Vec<T>, max_len: usize) {
    if log.len() > max_len {
        let excess = log.len() - max_len;
        log.drain(..excess);
    }
}
