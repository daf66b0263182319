//! Merge rule for job records arriving over more than one channel.
//!
//! The status client receives the same job from the push socket and from
//! polling, in no particular order. Arrival order is ignored: a record
//! replaces the current view only if it is strictly newer by
//! `updated_at`, or ties on `updated_at` with a higher `progress`. A
//! terminal view is final.

use std::cmp::Ordering;

use crate::job::Job;

/// Whether `incoming` should replace `current` as the visible record.
pub fn supersedes(current: Option<&Job>, incoming: &Job) -> bool {
    let Some(current) = current else {
        return true;
    };
    if current.id != incoming.id || current.is_terminal() {
        return false;
    }
    match incoming.updated_at.cmp(&current.updated_at) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => incoming.progress > current.progress,
    }
}
