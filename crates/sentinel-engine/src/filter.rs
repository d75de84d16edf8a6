//! Evaluates an [`EventFilter`] over committed events.

use std::collections::BTreeSet;

use sentinel_protocol::EventFilter;

use crate::log::LoggedEvent;

/// True when `entry` passes every active dimension of `filter`.
pub fn matches(filter: &EventFilter, entry: &LoggedEvent) -> bool {
    matches_search(&filter.search, entry)
        && (filter.directions.is_empty() || filter.directions.contains(&entry.event.direction))
        && (filter.statuses.is_empty() || filter.statuses.contains(&entry.status()))
        && matches_method(filter, entry)
        && matches_latency(filter, entry)
}

fn matches_search(search: &str, entry: &LoggedEvent) -> bool {
    let needle = search.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }

    let event = &entry.event;
    event
        .method()
        .is_some_and(|method| method.to_lowercase().contains(&needle))
        || event
            .request_id
            .is_some_and(|id| id.to_string().contains(&needle))
        || event
            .span_id
            .as_deref()
            .is_some_and(|span| span.to_lowercase().contains(&needle))
}

// Raw method only: a response that omits its method never matches a
// non-empty method set, even when correlation could attribute it.
fn matches_method(filter: &EventFilter, entry: &LoggedEvent) -> bool {
    filter.methods.is_empty()
        || entry
            .event
            .method()
            .is_some_and(|method| filter.methods.contains(method))
}

// Outbound calls are exempt from the range whatever they carry, as are
// responses that were never timed.
fn matches_latency(filter: &EventFilter, entry: &LoggedEvent) -> bool {
    if entry.event.is_outbound() {
        return true;
    }
    let Some(latency) = entry.event.latency_ms else {
        return true;
    };
    filter.latency_min.is_none_or(|min| latency >= min)
        && filter.latency_max.is_none_or(|max| latency <= max)
}

/// Entries passing `filter`, in log order.
pub fn filter_events<'a>(
    filter: &'a EventFilter,
    entries: &'a [LoggedEvent],
) -> impl Iterator<Item = &'a LoggedEvent> + 'a {
    entries.iter().filter(move |entry| matches(filter, entry))
}

/// Distinct raw method names, sorted, for building the method facet.
pub fn unique_methods(entries: &[LoggedEvent]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| entry.event.method())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect()
}
