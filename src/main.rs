//! CLI entry point for `mailsexp`.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailsexp::config::{self, Config};
use mailsexp::index::builder;
use mailsexp::model::mail::{MessageInfo, Uid};
use mailsexp::search::{requires_in_memory, Cancellable, FolderSearch, MemoryIndex};
use mailsexp::sexp;
use mailsexp::store::sql::quote_identifier;
use mailsexp::store::{Folder, FolderOptions, MboxFolder, SexpToSql, SqlTranslator, SqliteStore};

#[derive(Parser)]
#[command(name = "mailsexp", version, about = "Search MBOX files with S-expressions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Force rebuild index even if one already exists
    #[arg(short, long, global = true)]
    force: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (defaults to the standard location)
    #[arg(long, value_name = "FILE", env = "MAILSEXP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// SQLite summary database used for delegated searches
    #[arg(long, value_name = "DB", global = true)]
    database: Option<PathBuf>,

    /// Always evaluate in memory, even with a summary database
    #[arg(long, global = true)]
    in_memory: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the messages matching an expression
    Search {
        path: PathBuf,
        /// Search expression; defaults to the configured one
        expression: Option<String>,
        /// Only consider these uids (comma separated)
        #[arg(long, value_delimiter = ',')]
        uids: Option<Vec<String>>,
        #[arg(long)]
        json: bool,
    },
    /// Count the messages matching an expression
    Count {
        path: PathBuf,
        expression: Option<String>,
    },
    /// Build the summary index of an MBOX file
    Index { path: PathBuf },
    /// Show how an expression parses and where it would run
    Explain {
        expression: String,
        /// Table name used in the generated SQL
        #[arg(long, default_value = "folder")]
        folder: String,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    if cli.database.is_some() {
        config.store.database = cli.database.clone();
    }
    if cli.in_memory {
        config.store.in_memory_only = true;
    }

    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    let force = cli.force;

    match cli.command {
        Commands::Search {
            path,
            expression,
            uids,
            json,
        } => {
            let expression = expression.unwrap_or_else(|| config.search.default_expression.clone());
            cmd_search(&path, &expression, uids, json, force, &config)
        }
        Commands::Count { path, expression } => {
            let expression = expression.unwrap_or_else(|| config.search.default_expression.clone());
            cmd_count(&path, &expression, force, &config)
        }
        Commands::Index { path } => cmd_index(&path, force, &config),
        Commands::Explain { expression, folder } => cmd_explain(&expression, &folder),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailsexp.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailsexp", &mut std::io::stdout());
    Ok(())
}

fn cmd_manpage() -> anyhow::Result<()> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

fn progress_bar(label: &str, total: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {label} [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{eta}})"
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Open an MBOX as a folder, building its index if needed and attaching
/// the configured summary database.
fn open_folder(path: &Path, force: bool, config: &Config) -> anyhow::Result<MboxFolder> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }

    let file_size = std::fs::metadata(path)
        .with_context(|| format!("reading {}", path.display()))?
        .len();
    let pb = progress_bar("Indexing", file_size)?;

    let options = FolderOptions {
        cache_dir: config::cache_dir(config),
        max_cached_messages: config.search.max_cached_messages,
        force_rebuild: force,
        in_memory_only: config.store.in_memory_only,
    };
    let folder = MboxFolder::open(
        path,
        &options,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    )
    .with_context(|| format!("opening {}", path.display()))?;
    pb.finish_and_clear();

    match &config.store.database {
        Some(db) => {
            let store = SqliteStore::open(db)
                .with_context(|| format!("opening summary database {}", db.display()))?;
            Ok(folder.with_database(store))
        }
        None => Ok(folder),
    }
}

fn prepare_search(folder: Rc<MboxFolder>, expression: &str, config: &Config) -> FolderSearch {
    let mut search = FolderSearch::new();
    search.set_thread_subject_grouping(config.search.thread_subject_grouping);

    // The word index only serves body-contains, which never delegates.
    if config.search.use_body_index && expression.contains("body-contains") {
        let index = MemoryIndex::build(&*folder, &Cancellable::new());
        tracing::info!(words = index.len(), "Built body word index");
        search.set_body_index(Some(Rc::new(index)));
    }

    search.set_folder(folder);
    search
}

fn cmd_search(
    path: &Path,
    expression: &str,
    uids: Option<Vec<String>>,
    json: bool,
    force: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let folder = Rc::new(open_folder(path, force, config)?);
    let mut search = prepare_search(folder.clone(), expression, config);

    let restriction: Option<Vec<Uid>> =
        uids.map(|list| list.iter().map(|u| Uid::from(u.trim())).collect());

    let start = Instant::now();
    let results = search.search(expression, restriction.as_deref(), &Cancellable::new())?;
    tracing::debug!(elapsed = ?start.elapsed(), matches = results.len(), "Search finished");

    let infos: Vec<std::sync::Arc<MessageInfo>> = results
        .iter()
        .filter_map(|uid| folder.message_info(uid))
        .collect();

    if json {
        print_search_results_json(&infos)?;
    } else {
        print_search_results_table(&infos);
    }
    Ok(())
}

fn cmd_count(path: &Path, expression: &str, force: bool, config: &Config) -> anyhow::Result<()> {
    let folder = Rc::new(open_folder(path, force, config)?);
    let mut search = prepare_search(folder, expression, config);
    let count = search.count(expression, &Cancellable::new())?;
    println!("{count}");
    Ok(())
}

fn cmd_index(path: &Path, force: bool, config: &Config) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let start = Instant::now();
    let folder = open_folder(path, force, config)?;
    let elapsed = start.elapsed();

    let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let idx_path = builder::index_path_for(path);
    let idx_path = if idx_path.exists() {
        idx_path
    } else {
        builder::cache_index_path_for(path, &config::cache_dir(config))
    };
    let idx_size = std::fs::metadata(&idx_path).map(|m| m.len()).unwrap_or(0);

    println!();
    println!("  {:<20} {}", "File", path.display());
    println!("  {:<20} {}", "File size", format_size(file_size, BINARY));
    println!("  {:<20} {}", "Messages", folder.len());
    if idx_size > 0 {
        println!("  {:<20} {}", "Index", idx_path.display());
        println!("  {:<20} {}", "Index size", format_size(idx_size, BINARY));
    }
    println!("  {:<20} {:.2?}", "Indexing time", elapsed);

    if config.store.database.is_some() {
        folder.sync_summary()?;
        println!("  {:<20} {}", "Summary table", folder.full_name());
    }
    println!();
    Ok(())
}

fn cmd_explain(expression: &str, folder: &str) -> anyhow::Result<()> {
    let parsed = sexp::parse(expression)?;
    println!("  {:<12} {}", "Parsed", parsed);

    if requires_in_memory(expression) {
        println!("  {:<12} in memory", "Runs");
        return Ok(());
    }
    match SexpToSql.translate(&parsed) {
        Some(fragment) if fragment == "1" => {
            println!("  {:<12} SELECT uid FROM {}", "SQL", quote_identifier(folder));
        }
        Some(fragment) => {
            println!(
                "  {:<12} SELECT uid FROM {} WHERE {}",
                "SQL",
                quote_identifier(folder),
                fragment
            );
        }
        None => println!("  {:<12} in memory", "Runs"),
    }
    Ok(())
}

fn format_date(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Print search results as a human-readable table.
fn print_search_results_table(infos: &[std::sync::Arc<MessageInfo>]) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {} result(s)", infos.len());
    println!();

    if infos.is_empty() {
        return;
    }

    println!(
        "  {:<6} {:<17} {:<25} {:<40} {:>8}",
        "Uid", "Date", "From", "Subject", "Size"
    );
    println!("  {}", "-".repeat(100));

    for info in infos {
        let from_trunc: String = info.from.chars().take(24).collect();
        let subj_trunc: String = info.subject.chars().take(39).collect();
        println!(
            "  {:<6} {:<17} {:<25} {:<40} {:>8}",
            info.uid,
            format_date(info.date_sent),
            from_trunc,
            subj_trunc,
            format_size(info.size, BINARY)
        );
    }
    println!();
}

/// Print search results as JSON.
fn print_search_results_json(infos: &[std::sync::Arc<MessageInfo>]) -> anyhow::Result<()> {
    let items: Vec<serde_json::Value> = infos
        .iter()
        .map(|info| {
            serde_json::json!({
                "uid": &*info.uid,
                "date": chrono::DateTime::from_timestamp(info.date_sent, 0).map(|d| d.to_rfc3339()),
                "from": info.from,
                "to": info.to,
                "subject": info.subject,
                "message_id": info.message_id,
                "size": info.size,
                "labels": info.user_flags,
            })
        })
        .collect();

    let output = serde_json::json!({
        "result_count": infos.len(),
        "results": items,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
