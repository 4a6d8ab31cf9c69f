//! Render Queue - priority-tiered holding area for pending render requests.
//!
//! Four tiers drained in fixed order `immediate → high → normal → low`,
//! FIFO by enqueue time inside a tier.
//!
//! # Invariants
//!
//! - An element id occupies at most one tier.
//! - Re-adding an id at a more urgent tier moves it there. Re-adding at the
//!   same or a less urgent tier keeps the existing entry (escalation only).
//! - An id returned by [`RenderQueue::get_next_batch`] is not returned again
//!   until it is added again.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::{ElementId, Priority};

/// A pending request to render one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub element_id: ElementId,
    pub priority: Priority,
    pub enqueued_at: Instant,
    /// Insertion sequence; breaks timestamp ties so FIFO is total.
    pub(crate) seq: u64,
}

impl RenderRequest {
    pub fn new(element_id: impl Into<ElementId>, priority: Priority, enqueued_at: Instant) -> Self {
        Self {
            element_id: element_id.into(),
            priority,
            enqueued_at,
            seq: 0,
        }
    }
}

/// Snapshot of queue occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub immediate: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
    pub total: usize,
    /// Age of the oldest pending request, if any.
    pub oldest_pending: Option<Duration>,
}

/// Priority-tiered render queue.
#[derive(Debug, Default)]
pub struct RenderQueue {
    tiers: [HashMap<ElementId, RenderRequest>; 4],
    next_seq: u64,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request, escalating an existing entry if the new tier is more urgent.
    ///
    /// Returns `true` if the queue changed.
    pub fn add(&mut self, mut request: RenderRequest) -> bool {
        if let Some(existing) = self.find_element(&request.element_id) {
            if !request.priority.is_more_urgent_than(existing) {
                return false;
            }
            self.tiers[existing.index()].remove(&request.element_id);
        }

        request.seq = self.next_seq;
        self.next_seq += 1;
        self.tiers[request.priority.index()].insert(request.element_id.clone(), request);
        true
    }

    /// Remove and return up to `max_size` requests, most urgent tier first,
    /// oldest first within a tier.
    pub fn get_next_batch(&mut self, max_size: usize) -> Vec<RenderRequest> {
        let mut batch = Vec::with_capacity(max_size.min(self.len()));

        for tier in self.tiers.iter_mut() {
            if batch.len() >= max_size {
                break;
            }
            if tier.is_empty() {
                continue;
            }

            let mut pending: Vec<(Instant, u64, ElementId)> = tier
                .values()
                .map(|r| (r.enqueued_at, r.seq, r.element_id.clone()))
                .collect();
            pending.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

            for (_, _, id) in pending.into_iter().take(max_size - batch.len()) {
                if let Some(request) = tier.remove(&id) {
                    batch.push(request);
                }
            }
        }

        batch
    }

    /// Remove an element from whichever tier holds it.
    pub fn remove(&mut self, element_id: &ElementId) -> Option<RenderRequest> {
        self.tiers.iter_mut().find_map(|tier| tier.remove(element_id))
    }

    /// Tier currently holding `element_id`.
    pub fn find_element(&self, element_id: &ElementId) -> Option<Priority> {
        Priority::ALL
            .into_iter()
            .find(|p| self.tiers[p.index()].contains_key(element_id))
    }

    pub fn clear(&mut self) {
        for tier in self.tiers.iter_mut() {
            tier.clear();
        }
    }

    /// Occupancy per tier and the age of the oldest request relative to `now`.
    pub fn stats(&self, now: Instant) -> QueueStats {
        let count = |p: Priority| self.tiers[p.index()].len();
        let oldest = self
            .tiers
            .iter()
            .flat_map(|tier| tier.values())
            .map(|r| r.enqueued_at)
            .min();

        QueueStats {
            immediate: count(Priority::Immediate),
            high: count(Priority::High),
            normal: count(Priority::Normal),
            low: count(Priority::Low),
            total: self.len(),
            oldest_pending: oldest.map(|t| now.saturating_duration_since(t)),
        }
    }

    /// Every queued element id, in drain order.
    pub fn all_elements(&self) -> Vec<ElementId> {
        let mut out = Vec::with_capacity(self.len());
        for tier in &self.tiers {
            let mut ids: Vec<&RenderRequest> = tier.values().collect();
            ids.sort_unstable_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at).then(a.seq.cmp(&b.seq)));
            out.extend(ids.into_iter().map(|r| r.element_id.clone()));
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(HashMap::is_empty)
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(HashMap::len).sum()
    }
}

// =============================================================================
// Tests
// =============================================================================
