// Bookmate Downloader - books and audiobooks for offline reading
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context};
use bookmate_core::api::auth::DEFAULT_TOKEN_FILE;
use bookmate_core::file::paths::DEFAULT_LIBRARY_ROOT;
use bookmate_core::logging::{self, LogOptions};
use bookmate_core::{
    load_token, AudiobookAssembler, BatchOptions, Bitrate, ClientConfig, DispatchOptions, Dispatcher,
    DownloaderError, Downloader, FfmpegTools, LibraryLayout, ResourceKind, TagSet,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "bookmate-dl")]
#[command(about = "Download Bookmate books, audiobooks and comics for offline reading", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Library root directory
    #[arg(long, global = true, default_value = DEFAULT_LIBRARY_ROOT)]
    root: PathBuf,

    /// Keep chapter files after merging
    #[arg(long, global = true)]
    keep_chapters: bool,

    /// Extra tag for the merged audiobook, repeatable
    #[arg(long = "tag", global = true, value_name = "KEY=VALUE")]
    tags: Vec<String>,

    /// ffmpeg binary
    #[arg(long, global = true, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe binary
    #[arg(long, global = true, default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// ffmpeg for the fallback merge, if not the one above
    #[arg(long, global = true)]
    fallback_ffmpeg: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a book as epub and fb2
    Book(DownloadArgs),
    /// Download an audiobook and merge its chapters
    Audiobook(DownloadArgs),
    /// Download a comic and render it to pdf
    Comicbook(DownloadArgs),
    /// Download every episode of a serial
    Serial(DownloadArgs),
    /// Download every part of a series
    Series(DownloadArgs),
    /// Merge already downloaded audiobook chapters
    Merge {
        /// Directory holding the chapter files
        #[arg(conflicts_with = "batch", required_unless_present = "batch")]
        dir: Option<PathBuf>,
        /// Merge every audiobook under <root>/audiobook
        #[arg(long)]
        batch: bool,
        /// Merge again even if the merged file exists
        #[arg(long, requires = "batch")]
        force: bool,
    },
}

#[derive(Args)]
struct DownloadArgs {
    /// Resource uuid
    uuid: String,

    /// Audio quality tier
    #[arg(long, default_value = "max")]
    bitrate: Bitrate,

    /// Keep audiobook chapters as separate files
    #[arg(long)]
    no_merge: bool,

    /// Auth token, overrides the environment and the token file
    #[arg(long)]
    token: Option<String>,

    /// File holding the auth token
    #[arg(long, default_value = DEFAULT_TOKEN_FILE)]
    token_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_options = LogOptions {
        debug: cli.debug,
        ..LogOptions::default()
    };
    if let Err(e) = logging::init(log_options) {
        eprintln!("failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<DownloaderError>() {
                Some(err) => tracing::error!("{}", err.user_message()),
                None => tracing::error!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut tools = FfmpegTools::default()
        .with_ffmpeg(&cli.ffmpeg)
        .with_ffprobe(&cli.ffprobe);
    if let Some(fallback) = &cli.fallback_ffmpeg {
        tools = tools.with_fallback_ffmpeg(fallback);
    }
    let assembler = AudiobookAssembler::with_tools(&tools);
    let extra_tags = TagSet::parse_pairs(&cli.tags)?;
    let layout = LibraryLayout::new(&cli.root);

    let (kind, args) = match cli.command {
        Commands::Merge { dir, batch, force } => {
            let options = BatchOptions {
                force,
                cleanup_chapters: !cli.keep_chapters,
                overrides: extra_tags,
            };
            return merge(&assembler, &layout, dir, batch, &options).await;
        }
        Commands::Book(args) => (ResourceKind::Book, args),
        Commands::Audiobook(args) => (ResourceKind::Audiobook, args),
        Commands::Comicbook(args) => (ResourceKind::Comicbook, args),
        Commands::Serial(args) => (ResourceKind::Serial, args),
        Commands::Series(args) => (ResourceKind::Series, args),
    };

    let token = load_token(args.token.as_deref(), &args.token_file)?;
    let config = ClientConfig::builder(token).build()?;
    let downloader = Downloader::new(config)?;

    let options = DispatchOptions {
        layout,
        bitrate: args.bitrate,
        merge_chapters: !args.no_merge,
        cleanup_chapters: !cli.keep_chapters,
        extra_tags,
    };
    let dispatcher = Dispatcher::new(downloader, options, assembler);

    let summary = dispatcher
        .run(kind.as_str(), &args.uuid)
        .await
        .with_context(|| format!("downloading {} {}", kind, args.uuid))?;

    tracing::info!(
        resources = summary.resources.len(),
        chapters_downloaded = summary.chapters_downloaded,
        chapters_skipped = summary.chapters_skipped,
        merged = summary.merges.len(),
        "download finished"
    );
    Ok(())
}

async fn merge(
    assembler: &AudiobookAssembler,
    layout: &LibraryLayout,
    dir: Option<PathBuf>,
    batch: bool,
    options: &BatchOptions,
) -> anyhow::Result<()> {
    if batch {
        let library = layout.audiobook_library();
        let summary = assembler.merge_library(&library, options).await?;
        tracing::info!("merged {}/{}", summary.merged.len(), summary.total);
        return Ok(());
    }

    let Some(dir) = dir else {
        bail!("merge needs a directory or --batch");
    };
    let outcome = assembler
        .merge_directory(&dir, &options.overrides, options.cleanup_chapters)
        .await
        .with_context(|| format!("merging {}", dir.display()))?;

    tracing::info!(path = %outcome.output.display(), markers = outcome.chapter_markers, "merged");
    Ok(())
}
