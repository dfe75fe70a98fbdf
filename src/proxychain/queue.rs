//! Work list for once-only modifiers.
//!
//! Modifiers may enqueue further once-only modifiers while the pipeline is
//! draining the list. The pipeline pops from the front until the queue is
//! empty, so anything pushed mid-drain still runs during the same `execute`.

use std::collections::VecDeque;
use std::sync::Arc;

/// FIFO of shared modifiers, drained once per `execute`.
pub struct ModifierQueue<M: ?Sized> {
    items: VecDeque<Arc<M>>,
}

impl<M: ?Sized> Default for ModifierQueue<M> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<M: ?Sized> ModifierQueue<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Arc<M>) {
        self.items.push_back(item);
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = Arc<M>>) {
        self.items.extend(items);
    }

    /// Next modifier to run.
    pub fn pop(&mut self) -> Option<Arc<M>> {
        self.items.pop_front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
