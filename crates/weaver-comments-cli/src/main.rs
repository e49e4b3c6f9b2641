use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::Serialize;
use smol_str::SmolStr;
use weaver_comments::layout::Measurements;
use weaver_comments::policy;
use weaver_comments::{
    CommentDocument, CommentsConfig, InlineDocument, LayoutOutcome, Viewport, compute_layout,
    layout::LayoutInput, orphan_sweep, scan,
};

#[derive(Parser)]
#[command(version, about = "Inspect comment threads stored in document marks", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (.json or .toml)
    #[arg(long, global = true, env = "WEAVER_COMMENTS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the threads in a document
    Scan {
        /// Document JSON file
        document: PathBuf,

        /// Report unread state for this user
        #[arg(long, default_value = "")]
        user: String,

        /// Include resolved threads
        #[arg(long)]
        show_resolved: bool,
    },
    /// Strip comment marks that lost their thread id
    Sweep {
        /// Document JSON file
        document: PathBuf,

        /// Where to write the cleaned document (defaults to stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Compute bubble positions from measured geometry
    Layout {
        /// Document JSON file
        document: PathBuf,

        /// JSON map of thread id to {height, anchorTop}
        measurements: PathBuf,

        #[arg(long, default_value_t = 1440.0)]
        width: f64,

        #[arg(long, default_value_t = 900.0)]
        height: f64,

        #[arg(long, default_value_t = 0.0)]
        scroll: f64,

        #[arg(long, default_value_t = 0.0)]
        editor_top: f64,

        /// Focused thread id
        #[arg(long)]
        focus: Option<String>,

        /// Whose unread counts to show
        #[arg(long, default_value = "")]
        user: String,
    },
}

fn main() -> Result<()> {
    init_miette();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CommentsConfig::load(path)?,
        None => CommentsConfig::default(),
    };

    match cli.command {
        Commands::Scan {
            document,
            user,
            show_resolved,
        } => scan_document(&document, &config, &user, show_resolved),
        Commands::Sweep { document, output } => sweep_document(&document, &config, output),
        Commands::Layout {
            document,
            measurements,
            width,
            height,
            scroll,
            editor_top,
            focus,
            user,
        } => {
            let viewport = Viewport {
                editor_top,
                scroll_offset: scroll,
                height,
                width,
            };
            layout_document(
                &document,
                &measurements,
                &config,
                viewport,
                focus.as_deref(),
                &user,
            )
        }
    }
}

fn load_document(path: &Path) -> Result<InlineDocument> {
    let text = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    InlineDocument::from_json(&text)
        .into_diagnostic()
        .wrap_err_with(|| format!("{} is not a valid document", path.display()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSummary<'a> {
    id: &'a str,
    from: usize,
    to: usize,
    comments: usize,
    resolved: bool,
    unread: bool,
    participants: Vec<SmolStr>,
}

fn scan_document(
    path: &Path,
    config: &CommentsConfig,
    user: &str,
    show_resolved: bool,
) -> Result<()> {
    let doc = load_document(path)?;
    let result = scan(&doc, &config.mark_name);

    let summaries: Vec<ThreadSummary<'_>> = result
        .comments
        .iter()
        .filter(|c| show_resolved || !c.thread.resolved)
        .map(|c| ThreadSummary {
            id: c.id(),
            from: c.pos,
            to: c.end(),
            comments: c.thread.comments.len(),
            resolved: c.thread.resolved,
            unread: policy::is_unread(&c.thread, user),
            participants: policy::participants(&c.thread),
        })
        .collect();

    if !result.orphans.is_empty() {
        tracing::warn!(
            orphans = result.orphans.len(),
            "document has orphan comment marks, run `sweep` to remove them"
        );
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&summaries).into_diagnostic()?
    );
    Ok(())
}

fn sweep_document(path: &Path, config: &CommentsConfig, output: Option<PathBuf>) -> Result<()> {
    let mut doc = load_document(path)?;
    match orphan_sweep(&doc, &config.mark_name) {
        Some(tr) => {
            doc.apply(&tr).into_diagnostic()?;
            tracing::info!(removed = tr.steps.len(), "removed orphan comment marks");
        }
        None => tracing::info!("no orphan comment marks"),
    }

    let json = doc.to_json().into_diagnostic()?;
    match output {
        Some(out) => std::fs::write(&out, json)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write {}", out.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn layout_document(
    path: &Path,
    measurements_path: &Path,
    config: &CommentsConfig,
    viewport: Viewport,
    focus: Option<&str>,
    user: &str,
) -> Result<()> {
    let doc = load_document(path)?;
    let text = std::fs::read_to_string(measurements_path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", measurements_path.display()))?;
    let measurements: Measurements = serde_json::from_str(&text)
        .into_diagnostic()
        .wrap_err("measurements must map thread ids to {height, anchorTop}")?;

    let visible: Vec<_> = scan(&doc, &config.mark_name)
        .comments
        .into_iter()
        .filter(|c| !c.thread.resolved)
        .filter(|c| !doc.is_hidden(c.pos))
        .collect();
    let focused = match focus {
        Some(id) => Some(
            visible
                .iter()
                .position(|c| c.id() == id)
                .ok_or_else(|| miette::miette!("no visible thread with id {id}"))?,
        ),
        None => None,
    };

    let outcome = compute_layout(
        &LayoutInput {
            visible: &visible,
            measurements: &measurements,
            unresolved: &HashSet::new(),
            focused,
            viewport,
            doc_size: doc.size(),
            user_id: user,
        },
        &config.layout,
    );

    match outcome {
        LayoutOutcome::Placed(bubbles) => {
            println!("{}", serde_json::to_string_pretty(&bubbles).into_diagnostic()?);
            Ok(())
        }
        LayoutOutcome::Stale => Err(miette::miette!(
            help = "measure every open thread that is not folded away",
            "measurements do not cover the visible threads"
        )),
    }
}

fn init_miette() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .expect("couldn't set the miette hook");
    miette::set_panic_hook();
}
