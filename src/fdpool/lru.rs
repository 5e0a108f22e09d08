// Copyright (c) 2024-present, ifcore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::collections::VecDeque;

/// A simple recency list: `refresh` moves an item to the most-recently-used
/// end, `get_least_recently_used` peeks (and re-queues) the oldest.
#[derive(Default)]
pub struct LruList<T: Clone + Eq + PartialEq>(VecDeque<T>);

impl<T: Clone + Eq + PartialEq> LruList<T> {
    #[must_use]
    pub fn with_capacity(n: usize) -> Self {
        Self(VecDeque::with_capacity(n))
    }

    pub fn remove(&mut self, item: &T) {
        self.0.retain(|x| x != item);
    }

    pub fn refresh(&mut self, item: T) {
        self.remove(&item);
        self.0.push_back(item);
    }

    /// Returns candidates from least- to most-recently-used, without
    /// mutating order (the caller decides which candidate it can evict).
    pub fn lru_order(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }
}
