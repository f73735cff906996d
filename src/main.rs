//! # Ribelle News
//!
//! Keeps a local copy of the www.ilribelle.com news feed up to date: the
//! feed is fetched and parsed, each new article is completed by scraping its
//! page and downloading its images, and the channel is stored as JSON.
//!
//! ## Usage
//!
//! ```sh
//! ribelle_news --config ./config.yaml          # update every ttl minutes until Ctrl-C
//! ribelle_news --once                          # a single update
//! ribelle_news --article <URL>                 # complete and print one article
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Load**: configuration, then the stored channel (a broken store is
//!    discarded)
//! 2. **Update**: one update at start, then one per ttl
//! 3. **Exit**: expired news is dropped, the channel is saved, and files no
//!    item owns are deleted

use chrono::Utc;
use clap::Parser;
use ribelle_news::channel::{Channel, SharedChannel};
use ribelle_news::cli::Cli;
use ribelle_news::completers::ilribelle::IlRibelleCompleterFactory;
use ribelle_news::completers::{DefaultChannelCompleter, DefaultItemCompleterFactory, ItemCompleterFactory};
use ribelle_news::config::{Config, Site};
use ribelle_news::fetch::{HttpFetch, NetworkFetch};
use ribelle_news::records::Schema;
use ribelle_news::records::roles::{ILRIBELLE_NEWS_SCHEMA, NEWS_SCHEMA, channel as channel_roles, news};
use ribelle_news::store;
use ribelle_news::updater::{ChannelUpdater, UpdaterEvent, command_channel, load_temporary_item};
use ribelle_news::utils::{ensure_writable_dir, truncate_for_log};
use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main(flavor = "current_thread")]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("ribelle_news starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = Config::load(&args.config).await?.with_cli(&args);
    config.validate()?;
    info!(feed_url = %config.feed_url, site = ?config.site, data_dir = %config.data_dir.display(), "Configuration ready");

    // Early check: the data directory must be writable
    if let Err(e) = ensure_writable_dir(&config.files_dir()).await {
        error!(
            path = %config.files_dir().display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let schema: &'static Schema = match config.site {
        Site::IlRibelle => &*ILRIBELLE_NEWS_SCHEMA,
        Site::Generic => &*NEWS_SCHEMA,
    };
    let new_channel = || -> Result<Channel, Box<dyn Error>> {
        Ok(Channel::new(&config.feed_url, config.files_dir(), schema)?
            .with_temporary_limit(config.temporary_cache_size))
    };
    let channel: SharedChannel = Rc::new(RefCell::new(new_channel()?));

    // ---- Restore stored news ----
    let store_path = config.store_path();
    if let Err(e) = store::load_channel(&channel, &store_path).await {
        warn!(path = %store_path.display(), error = %e, "Discarding unreadable stored news");
        *channel.borrow_mut() = new_channel()?;
        if let Err(e) = channel.borrow().delete_files_not_owned() {
            warn!(error = %e, "Failed to clean data directory");
        }
    }
    if args.clear {
        channel.borrow_mut().clear_all();
    }

    let fetch: Rc<dyn NetworkFetch> = Rc::new(HttpFetch::new(&config.user_agent)?);
    let factory: Rc<dyn ItemCompleterFactory> = match config.site {
        Site::IlRibelle => Rc::new(IlRibelleCompleterFactory::new(
            Rc::clone(&fetch),
            config.downloads_dir.clone(),
        )),
        Site::Generic => Rc::new(DefaultItemCompleterFactory),
    };

    if let Some(url) = &args.article {
        show_article(&channel, factory.as_ref(), url).await;
    } else {
        let mut updater = ChannelUpdater::new(
            Rc::clone(&channel),
            Rc::clone(&fetch),
            Box::new(DefaultChannelCompleter),
            factory,
            config.max_parallel_items,
        );
        let mut events = updater.subscribe();
        let (handle, commands) = command_channel();
        handle.update();

        if args.once {
            drop(handle);
            tokio::select! {
                _ = updater.run(commands) => {}
                _ = report_events(&mut events) => {}
            }
        } else {
            let control = async {
                loop {
                    let ttl = channel.borrow().roles().uint(channel_roles::TTL);
                    let interval = config.update_interval(ttl);
                    debug!(minutes = interval.as_secs() / 60, "Next update scheduled");
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            handle.update();
                        }
                        res = tokio::signal::ctrl_c() => {
                            if let Err(e) = res {
                                warn!(error = %e, "Could not listen for Ctrl-C");
                            }
                            info!("Shutdown requested");
                            handle.shutdown();
                            break;
                        }
                    }
                }
            };
            tokio::select! {
                _ = async { tokio::join!(updater.run(commands), control) } => {}
                _ = report_events(&mut events) => {}
            }
        }
        while let Ok(event) = events.try_recv() {
            log_event(&event);
        }
    }

    // ---- Shut down ----
    let cutoff = config.expiry_cutoff(Utc::now().fixed_offset());
    channel.borrow_mut().delete_older_than(cutoff);
    store::save_channel(&channel, &store_path).await?;
    match channel.borrow().delete_files_not_owned() {
        Ok(removed) => debug!(removed, "Cleaned data directory"),
        Err(e) => warn!(error = %e, "Failed to clean data directory"),
    }

    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        items = channel.borrow().len(),
        "ribelle_news finished"
    );
    Ok(())
}

async fn report_events(events: &mut UnboundedReceiver<UpdaterEvent>) {
    while let Some(event) = events.recv().await {
        log_event(&event);
    }
}

fn log_event(event: &UpdaterEvent) {
    match event {
        UpdaterEvent::Error(message) => error!(%message, "Update failed"),
        UpdaterEvent::NewsCleared => info!("All news cleared"),
        other => debug!(event = ?other, "Updater event"),
    }
}

/// Complete one article through the temporary cache and print it.
async fn show_article(channel: &SharedChannel, factory: &dyn ItemCompleterFactory, url: &str) {
    let id = load_temporary_item(channel, factory, url).await;
    let channel = channel.borrow();
    let Some(item) = channel.item(id) else {
        warn!(%url, "Article dropped from the temporary cache");
        return;
    };
    let store = item.store();
    debug!(description = %truncate_for_log(store.text(news::DESCRIPTION), 120), "Article completed");
    println!("{}", item.title());
    println!("{}", item.link());
    println!();
    println!("{}", store.text(news::DESCRIPTION));
    for file in item.attached_files() {
        println!("file: {file}");
    }
}
