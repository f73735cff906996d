//! Command-line interface definitions for the news reader.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Values given here override the configuration file.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the news reader.
///
/// # Examples
///
/// ```sh
/// # Keep the channel updated until Ctrl-C
/// ribelle_news --config ./config.yaml
///
/// # Update once and exit
/// ribelle_news --once
///
/// # Show one article without adding it to the channel
/// ribelle_news --article http://www.ilribelle.com/la-voce-del-ribelle/2013/1/3/articolo.html
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the config.yaml file
    #[arg(short, long, env = "RIBELLE_NEWS_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Directory for the stored news and downloaded images
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// RSS feed to follow
    #[arg(short, long)]
    pub feed_url: Option<String>,

    /// Run a single update, then exit
    #[arg(long)]
    pub once: bool,

    /// Remove every stored news item before doing anything else
    #[arg(long)]
    pub clear: bool,

    /// Complete and print a single article given its URL
    #[arg(long, value_name = "URL")]
    pub article: Option<String>,
}
