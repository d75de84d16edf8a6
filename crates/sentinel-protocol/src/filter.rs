//! List filter configuration.
//!
//! Five independent dimensions, AND-ed together. Inside a set dimension the
//! selected values are OR-ed, and an empty set means "no restriction".

use crate::event::{Direction, EventStatus};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Case-insensitive substring matched against method, request id and span id.
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub directions: IndexSet<Direction>,
    #[serde(default)]
    pub statuses: IndexSet<EventStatus>,
    #[serde(default)]
    pub methods: IndexSet<String>,
    #[serde(default)]
    pub latency_min: Option<u64>,
    #[serde(default)]
    pub latency_max: Option<u64>,
}

impl EventFilter {
    pub fn is_active(&self) -> bool {
        !self.search.is_empty()
            || !self.directions.is_empty()
            || !self.statuses.is_empty()
            || !self.methods.is_empty()
            || self.has_latency_range()
    }

    pub fn has_latency_range(&self) -> bool {
        self.latency_min.is_some() || self.latency_max.is_some()
    }

    pub fn toggle_direction(&mut self, direction: Direction) {
        if !self.directions.shift_remove(&direction) {
            self.directions.insert(direction);
        }
    }

    pub fn toggle_status(&mut self, status: EventStatus) {
        if !self.statuses.shift_remove(&status) {
            self.statuses.insert(status);
        }
    }

    pub fn toggle_method(&mut self, method: impl Into<String>) {
        let method = method.into();
        if !self.methods.shift_remove(&method) {
            self.methods.insert(method);
        }
    }

    pub fn clear_latency(&mut self) {
        self.latency_min = None;
        self.latency_max = None;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
