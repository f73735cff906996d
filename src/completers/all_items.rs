//! Bounded fan-out of item completers over every incomplete item.
//!
//! At most `limit` item completers run at once. Whenever one finishes the
//! next item in the backlog starts, and the run is over once the backlog is
//! empty and nothing is in flight. Finished completers are not dropped on
//! the spot: they go to a retirement queue that is drained at the next idle
//! point ([`AllItemsCompleter::dispose_retired`] or the next run).

use super::{ItemCompleter, ItemCompleterFactory};
use crate::channel::SharedChannel;
use crate::news::ItemId;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use tracing::{debug, info, instrument};

pub struct AllItemsCompleter {
    channel: SharedChannel,
    factory: Rc<dyn ItemCompleterFactory>,
    limit: Option<usize>,
    in_flight: HashSet<ItemId>,
    retired: Vec<Box<dyn ItemCompleter>>,
}

impl AllItemsCompleter {
    /// # Arguments
    ///
    /// * `channel` - The channel whose items get completed
    /// * `factory` - Builds one completer per item
    /// * `limit` - Maximum number of completers in flight, `None` for no
    ///   bound. A limit of zero is treated as one.
    pub fn new(
        channel: SharedChannel,
        factory: Rc<dyn ItemCompleterFactory>,
        limit: Option<usize>,
    ) -> Self {
        Self {
            channel,
            factory,
            limit,
            in_flight: HashSet::new(),
            retired: Vec::new(),
        }
    }

    /// Items whose completer has started but not finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn retired(&self) -> usize {
        self.retired.len()
    }

    /// Drop completers that finished during earlier runs.
    pub fn dispose_retired(&mut self) {
        if !self.retired.is_empty() {
            debug!(count = self.retired.len(), "Disposing finished item completers");
            self.retired.clear();
        }
    }

    /// Complete every item of the channel that is not complete yet.
    ///
    /// Holding `&mut self` for the whole run keeps a second run from
    /// starting while one is active.
    ///
    /// # Returns
    ///
    /// The number of item completers that ran; zero if nothing was
    /// incomplete.
    #[instrument(level = "info", skip(self), fields(limit = ?self.limit))]
    pub async fn run(&mut self) -> usize {
        self.dispose_retired();
        let mut backlog: VecDeque<ItemId> = self.channel.borrow().incomplete_ids().into();
        if backlog.is_empty() {
            debug!("No incomplete items");
            return 0;
        }
        let width = self.limit.unwrap_or(backlog.len()).clamp(1, backlog.len());
        info!(backlog = backlog.len(), width, "Completing items");

        let mut tasks = FuturesUnordered::new();
        let mut finished = 0;
        loop {
            while tasks.len() < width {
                let Some(id) = backlog.pop_front() else {
                    break;
                };
                let completer = self.factory.create(Rc::clone(&self.channel), id);
                self.in_flight.insert(id);
                tasks.push(complete_one(id, completer));
            }
            let Some((id, completer)) = tasks.next().await else {
                break;
            };
            self.in_flight.remove(&id);
            self.retired.push(completer);
            finished += 1;
        }
        info!(finished, "All items completed");
        finished
    }
}

async fn complete_one(
    id: ItemId,
    mut completer: Box<dyn ItemCompleter>,
) -> (ItemId, Box<dyn ItemCompleter>) {
    completer.complete().await;
    (id, completer)
}
