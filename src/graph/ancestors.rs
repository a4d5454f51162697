//! Lazy ancestor traversal over the entity graph.

use std::collections::{HashSet, VecDeque};

use crate::domain::entity::EntityId;

use super::EntityGraph;

/// A non-restartable, breadth-first sequence of ancestor ids.
///
/// Each call to `EntityGraph::ancestors` produces a fresh cursor; the
/// graph itself is never mutated during iteration (mutation happens only
/// from the single command-buffer consumer, never interleaved with a
/// query holding a reader lock).
pub struct Ancestors<'g> {
    graph: &'g EntityGraph,
    queue: VecDeque<EntityId>,
    seen: HashSet<EntityId>,
}

impl<'g> Ancestors<'g> {
    pub(super) fn new(graph: &'g EntityGraph, start: EntityId) -> Self {
        let queue = graph.parents_of(start).into_iter().collect();
        Self {
            graph,
            queue,
            seen: HashSet::new(),
        }
    }
}

impl<'g> Iterator for Ancestors<'g> {
    type Item = EntityId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = self.queue.pop_front()?;
            if !self.seen.insert(next) {
                continue;
            }
            self.queue.extend(self.graph.parents_of(next));
            return Some(next);
        }
    }
}
