//! Channel update orchestration.
//!
//! [`ChannelUpdater`] owns the update pipeline of one channel: fetch and
//! parse the feed, complete the channel, then complete every incomplete
//! item. Requests arrive as [`Command`]s. While a pipeline runs, `Update`
//! and `ClearAllNews` requests are not queued but folded into two pending
//! flags that are looked at whenever a phase ends:
//!
//! - after the fetch, a pending clear empties the channel and ends the run;
//! - after the channel completer and after the item completers, a pending
//!   clear wins over a pending update, and either one replaces whatever
//!   phase would have come next.
//!
//! Progress and errors are reported as [`UpdaterEvent`]s to subscribers.

use crate::channel::SharedChannel;
use crate::completers::{AllItemsCompleter, ChannelCompleter, ItemCompleterFactory};
use crate::feed::fetch_and_parse;
use crate::fetch::NetworkFetch;
use crate::news::ItemId;
use crate::records::RecordStore;
use crate::records::roles::news;
use std::future::Future;
use std::rc::Rc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Update,
    ClearAllNews,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdaterEvent {
    FetchStarted,
    FetchFinished,
    /// A fetch or parse failure, already formatted for display.
    Error(String),
    NewsCleared,
    /// The pipeline finished and nothing is pending.
    Idle,
}

/// Sending side of an updater's command queue.
#[derive(Debug, Clone)]
pub struct UpdaterHandle {
    tx: UnboundedSender<Command>,
}

impl UpdaterHandle {
    /// Request an update. Returns `false` if the updater has stopped.
    pub fn update(&self) -> bool {
        self.tx.send(Command::Update).is_ok()
    }

    /// Request that every listed news item be removed.
    pub fn clear_all_news(&self) -> bool {
        self.tx.send(Command::ClearAllNews).is_ok()
    }

    /// Stop the updater at the next phase boundary.
    pub fn shutdown(&self) -> bool {
        self.tx.send(Command::Shutdown).is_ok()
    }
}

/// Create a command queue for [`ChannelUpdater::run`].
pub fn command_channel() -> (UpdaterHandle, UnboundedReceiver<Command>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UpdaterHandle { tx }, rx)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fetch,
    CompleteChannel,
    CompleteItems,
}

#[derive(Debug, Default)]
struct Pending {
    update: bool,
    clear: bool,
    shutdown: bool,
    /// Every command sender is gone.
    closed: bool,
}

impl Pending {
    fn record(&mut self, command: Option<Command>) {
        match command {
            Some(Command::Update) => {
                if self.update {
                    debug!("Update already pending");
                }
                self.update = true;
            }
            Some(Command::ClearAllNews) => self.clear = true,
            Some(Command::Shutdown) => self.shutdown = true,
            None => self.closed = true,
        }
    }
}

pub struct ChannelUpdater {
    channel: SharedChannel,
    fetch: Rc<dyn NetworkFetch>,
    channel_completer: Box<dyn ChannelCompleter>,
    items: AllItemsCompleter,
    pending: Pending,
    subscribers: Vec<UnboundedSender<UpdaterEvent>>,
}

impl ChannelUpdater {
    /// # Arguments
    ///
    /// * `channel` - The channel to keep up to date
    /// * `fetch` - Network capability for the feed download
    /// * `channel_completer` - Runs after each fetch, before the items
    /// * `item_factory` - Builds the completer for each incomplete item
    /// * `max_parallel_items` - Bound on concurrent item completers, `None`
    ///   for unbounded
    pub fn new(
        channel: SharedChannel,
        fetch: Rc<dyn NetworkFetch>,
        channel_completer: Box<dyn ChannelCompleter>,
        item_factory: Rc<dyn ItemCompleterFactory>,
        max_parallel_items: Option<usize>,
    ) -> Self {
        let items = AllItemsCompleter::new(Rc::clone(&channel), item_factory, max_parallel_items);
        Self {
            channel,
            fetch,
            channel_completer,
            items,
            pending: Pending::default(),
            subscribers: Vec::new(),
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&mut self) -> UnboundedReceiver<UpdaterEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: UpdaterEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn clear_now(&mut self) {
        self.pending.clear = false;
        self.channel.borrow_mut().clear_all();
        self.emit(UpdaterEvent::NewsCleared);
    }

    /// Serve commands until `Shutdown` arrives or every sender is dropped.
    ///
    /// Requests still pending when the senders go away are honoured before
    /// returning. Every call starts from a clean state, so the updater can
    /// serve a new command queue after an earlier one ended.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&mut self, mut commands: UnboundedReceiver<Command>) {
        self.pending = Pending::default();
        info!("Channel updater started");
        loop {
            if self.pending.shutdown {
                break;
            }
            if self.pending.clear {
                self.clear_now();
                continue;
            }
            if self.pending.update {
                self.pending.update = false;
                self.pipeline(&mut commands).await;
                continue;
            }

            self.items.dispose_retired();
            self.emit(UpdaterEvent::Idle);
            if self.pending.closed {
                break;
            }
            let command = commands.recv().await;
            self.pending.record(command);
        }
        info!("Channel updater stopped");
    }

    /// One update run. Returns when the run ends or when a pending request
    /// replaces the next phase; [`ChannelUpdater::run`] then honours it.
    #[instrument(level = "info", skip_all)]
    async fn pipeline(&mut self, commands: &mut UnboundedReceiver<Command>) {
        let mut phase = Phase::Fetch;
        loop {
            debug!(?phase, "Updater phase");
            match phase {
                Phase::Fetch => {
                    self.emit(UpdaterEvent::FetchStarted);
                    self.channel.borrow_mut().begin_refresh();
                    let result = while_busy(
                        commands,
                        &mut self.pending,
                        fetch_and_parse(&self.channel, self.fetch.as_ref()),
                    )
                    .await;
                    self.channel.borrow_mut().end_refresh();
                    if let Err(e) = result {
                        warn!(error = %e, "Feed update failed");
                        self.emit(UpdaterEvent::Error(e.to_string()));
                    }
                    self.emit(UpdaterEvent::FetchFinished);
                    if self.pending.clear {
                        return;
                    }
                    phase = Phase::CompleteChannel;
                }
                Phase::CompleteChannel => {
                    while_busy(commands, &mut self.pending, self.channel_completer.complete()).await;
                    if self.pending.clear || self.pending.update {
                        debug!(clear = self.pending.clear, "Pending request replaces item completion");
                        return;
                    }
                    phase = Phase::CompleteItems;
                }
                Phase::CompleteItems => {
                    let completed = while_busy(commands, &mut self.pending, self.items.run()).await;
                    info!(completed, "Update finished");
                    return;
                }
            }
            if self.pending.shutdown {
                return;
            }
        }
    }
}

/// Drive `work` to completion while folding incoming commands into
/// `pending`. Commands are read before `work` is polled again.
async fn while_busy<F: Future>(
    commands: &mut UnboundedReceiver<Command>,
    pending: &mut Pending,
    work: F,
) -> F::Output {
    tokio::pin!(work);
    loop {
        tokio::select! {
            biased;
            command = commands.recv(), if !pending.closed => pending.record(command),
            output = &mut work => return output,
        }
    }
}

/// Show an article that may not be in the channel's list.
///
/// A cached temporary item for `url` is reused. Otherwise a temporary item
/// is created with only its link set and one completer runs on it. The
/// temporary cache is trimmed afterwards.
///
/// # Returns
///
/// The id of the temporary item. It is only missing from the channel
/// afterwards if the cache limit is zero.
#[instrument(level = "info", skip(channel, factory))]
pub async fn load_temporary_item(
    channel: &SharedChannel,
    factory: &dyn ItemCompleterFactory,
    url: &str,
) -> ItemId {
    let cached = channel.borrow_mut().temporary_item(url);
    if let Some(id) = cached {
        debug!(%id, "Temporary item served from cache");
        return id;
    }

    let mut fields = RecordStore::new(channel.borrow().item_schema());
    fields.set(news::LINK, url);
    let id = channel.borrow_mut().add_temporary_item(&fields);
    let mut completer = factory.create(Rc::clone(channel), id);
    completer.complete().await;
    channel.borrow_mut().trim_temporary_cache();
    id
}
