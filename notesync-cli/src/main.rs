use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use notesync_core::{NoteChanges, NoteDraft, StorageConfig};
use notesync_sync::{open_registry, Connectivity, DeleteOutcome, NoteSession, SyncConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod table;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Table format (default)
    Table,
    /// Pretty JSON
    Json,
}

#[derive(Parser)]
#[command(name = "notesync")]
#[command(about = "Offline-first notes with background sync", long_about = None)]
struct Cli {
    /// Base URL of the sync server
    #[arg(long, global = true, env = "NOTESYNC_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Local data directory
    #[arg(long, global = true, env = "NOTESYNC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// User to act as (defaults to the last user who logged in)
    #[arg(short, long, global = true, env = "NOTESYNC_USER")]
    user: Option<String>,

    /// Work offline: never contact the server
    #[arg(long, global = true)]
    offline: bool,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value = "5")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in as a user, creating an instance id on first use
    Login {
        /// User key
        user: String,
    },
    /// Forget the current user (local notes are kept)
    Logout,
    /// List users known on this device
    Users,
    /// Create a note
    New {
        /// Note title
        title: String,
        /// Note body
        #[arg(short, long, default_value = "")]
        body: String,
        /// Tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Explicit note id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },
    /// Edit a note
    Edit {
        /// Note id
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        body: Option<String>,
        /// Replace tags (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Delete a note
    Delete {
        /// Note id
        id: String,
    },
    /// List notes
    List {
        /// Only notes with unsynced changes
        #[arg(long)]
        unsynced: bool,
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
    /// Show one note
    Show {
        /// Note id
        id: String,
    },
    /// Push local changes, then pull server state
    Sync,
    /// Push local changes only
    Push,
    /// Pull server state only
    Pull,
    /// Show sync status
    Status,
    /// List deletions waiting for the server
    Tombstones,
    /// Keep syncing in the background until interrupted
    Watch {
        /// Sync interval in seconds
        #[arg(long, default_value = "300")]
        interval: u64,
    },
}

fn main() -> Result<()> {
    // Keep command output clean; RUST_LOG raises verbosity
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let storage_config = StorageConfig::default();

    match &cli.command {
        Commands::Login { user } => {
            let registry = open_registry(&data_dir, &storage_config)
                .context("Failed to open instance registry")?;
            let id = registry.resolve_or_create(user)?;
            registry.set_current_user(user)?;
            println!("{} {} ({})", "✓ Logged in as".green(), user.bold(), id);
            return Ok(());
        }
        Commands::Logout => {
            let registry = open_registry(&data_dir, &storage_config)
                .context("Failed to open instance registry")?;
            registry.clear_current_user()?;
            println!("{}", "✓ Logged out".green());
            return Ok(());
        }
        Commands::Users => {
            let registry = open_registry(&data_dir, &storage_config)
                .context("Failed to open instance registry")?;
            let users = registry.list_instances()?;
            let current = registry.current_user()?;
            println!("{}", table::format_users_table(&users, current.as_deref()));
            return Ok(());
        }
        _ => {}
    }

    let user = resolve_user(&cli, &data_dir, &storage_config)?;
    let mut config = SyncConfig::new(cli.server.clone())
        .with_request_timeout(Duration::from_secs(cli.timeout.max(1)));
    if let Commands::Watch { interval } = &cli.command {
        config = config.with_sync_interval(Duration::from_secs((*interval).max(1)));
    }

    let session = NoteSession::builder(config)
        .with_data_dir(&data_dir)
        .with_storage_config(storage_config)
        .with_user(user)
        .with_connectivity(Connectivity::new(!cli.offline))
        .build()
        .context("Failed to open note session")?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_command(cli.command, &session))
}

async fn run_command(command: Commands, session: &NoteSession) -> Result<()> {
    match command {
        Commands::New {
            title,
            body,
            tags,
            id,
        } => {
            let mut draft = NoteDraft::new(title).with_body(body).with_tags(tags);
            if let Some(id) = id {
                draft = draft.with_id(id);
            }
            let note = session.create_note(draft).context("Failed to create note")?;
            println!("{} {}", "✓ Created note".green(), note.id.bold());
        }

        Commands::Edit {
            id,
            title,
            body,
            tags,
        } => {
            let changes = NoteChanges {
                title,
                body,
                tags: if tags.is_empty() { None } else { Some(tags) },
                preview: None,
            };
            if changes.is_empty() {
                return Err(anyhow!("Nothing to change: pass --title, --body or --tag"));
            }
            let note = session
                .update_note(&id, changes)
                .with_context(|| format!("Failed to edit note {}", id))?;
            println!("{} {}", "✓ Updated note".green(), note.id.bold());
        }

        Commands::Delete { id } => match session.delete_note(&id).await? {
            DeleteOutcome::Confirmed => {
                println!("{} {}", "✓ Deleted note".green(), id.bold());
            }
            DeleteOutcome::Deferred { error } => {
                println!("{} {}", "✓ Deleted note locally".green(), id.bold());
                println!(
                    "  {} server deletion will be retried on next sync ({})",
                    "Note:".yellow().bold(),
                    error
                );
            }
        },

        Commands::List { unsynced, output } => {
            let notes = if unsynced {
                session.store().query_by_sync(false)?
            } else {
                session.list_notes()?
            };
            match output {
                OutputFormat::Table => {
                    println!("{}", table::format_notes_table(&notes));
                    println!();
                    println!("Count: {}", notes.len());
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&notes)?);
                }
            }
        }

        Commands::Show { id } => match session.get_note(&id)? {
            Some(note) => {
                let state = session.store().sync_state(&id)?;
                println!("{}", serde_json::to_string_pretty(&note)?);
                println!("{} {}", "Sync state:".bold(), state);
            }
            None => println!("{}", "Note not found".yellow()),
        },

        Commands::Sync => {
            let report = session.sync().await.context("Sync failed")?;
            if report.skipped {
                println!("{}", "A sync is already running".yellow());
            } else {
                println!(
                    "{} pushed {} notes, cleared {} deletions, pulled {} notes, removed {} ({} ms)",
                    "✓ Synced:".green(),
                    report.push.notes_confirmed,
                    report.push.tombstones_cleared,
                    report.pull.notes_applied,
                    report.pull.notes_deleted,
                    report.duration_ms
                );
                if report.push.notes_raced > 0 {
                    println!(
                        "  {} {} notes changed during sync and stay pending",
                        "Note:".yellow().bold(),
                        report.push.notes_raced
                    );
                }
            }
        }

        Commands::Push => {
            let report = session.push().await.context("Push failed")?;
            if report.empty {
                println!("{}", "Nothing to push".yellow());
            } else {
                println!(
                    "{} {} of {} notes confirmed, {} of {} deletions cleared",
                    "✓ Pushed:".green(),
                    report.notes_confirmed,
                    report.notes_sent,
                    report.tombstones_cleared,
                    report.tombstones_sent
                );
            }
        }

        Commands::Pull => {
            let report = session.pull().await.context("Pull failed")?;
            println!(
                "{} {} notes applied, {} removed by server deletions",
                "✓ Pulled:".green(),
                report.notes_applied,
                report.notes_deleted
            );
        }

        Commands::Status => {
            let status = session.status()?;
            let metadata = session.engine().get_metadata();

            println!("{}", "NoteSync Status".bold());
            println!("  User:            {}", status.user_key.as_deref().unwrap_or("-"));
            println!("  Instance id:     {}", status.instance_id);
            println!(
                "  Connectivity:    {}",
                if status.online { "online".green() } else { "offline".yellow() }
            );
            println!("  State:           {:?}", status.state);
            println!("  Notes:           {}", status.store.notes);
            println!("  Unsynced:        {}", status.store.unsynced);
            println!("  Pending deletes: {}", status.store.tombstones);
            println!(
                "  Syncs:           {} ok, {} failed, {} skipped",
                status.sync.successful_syncs, status.sync.failed_syncs, status.sync.skipped_syncs
            );
            match metadata.last_push_at {
                Some(at) => println!("  Last push:       {}", table::format_time(at)),
                None => println!("  Last push:       never"),
            }
            match metadata.last_pull_at {
                Some(at) => println!("  Last pull:       {}", table::format_time(at)),
                None => println!("  Last pull:       never"),
            }
            if let Some(error) = metadata.last_error {
                println!("  {} {}", "Last error:".red().bold(), error);
            }
        }

        Commands::Tombstones => {
            let tombstones = session.store().tombstones()?;
            println!("{}", table::format_tombstones_table(&tombstones));
        }

        Commands::Watch { .. } => {
            let mut events = session.engine().subscribe();
            let mut scheduler = session.scheduler();
            scheduler.start();
            println!(
                "{} {} (Ctrl-C to stop)",
                "Watching".green().bold(),
                session.instance_id()
            );

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Some(event) => println!("  {:?}", event),
                        None => break,
                    },
                }
            }

            scheduler.stop().await;
            println!("{}", "Stopped".yellow());
        }

        Commands::Login { .. } | Commands::Logout | Commands::Users => {
            return Err(anyhow!("registry commands do not open a session"));
        }
    }

    Ok(())
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("notesync"))
        .unwrap_or_else(|| PathBuf::from(".notesync"))
}

fn resolve_user(cli: &Cli, data_dir: &Path, storage_config: &StorageConfig) -> Result<String> {
    if let Some(user) = &cli.user {
        return Ok(user.clone());
    }
    let registry =
        open_registry(data_dir, storage_config).context("Failed to open instance registry")?;
    registry
        .current_user()?
        .ok_or_else(|| anyhow!("Not logged in. Run 'notesync login <user>' or pass --user"))
}
