use std::time::Duration;

use clap::{Parser, Subcommand};
use todosync::feed::DEFAULT_FEED_URL;
use todosync::{ChangeKind, StoreError, TaskRecord, TodoSync, TodoSyncBuilder, WriteOutcome};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "todosync", version, about = "Local task list synced from a remote feed")]
struct Cli {
    /// SQLite database URL
    #[arg(long, env = "TODOSYNC_DATABASE_URL", default_value = "sqlite://todosync.db?mode=rwc")]
    database_url: String,

    /// Base URL of the remote task feed
    #[arg(long, env = "TODOSYNC_FEED_URL", default_value = DEFAULT_FEED_URL)]
    feed_url: String,

    /// Records requested per feed page
    #[arg(long, default_value_t = 100)]
    page_size: usize,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tasks, newest first
    List {
        /// Only tasks whose title or description contains this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show one task
    Show { id: Uuid },
    /// Add a local task
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Change a task's title and/or description
    Edit {
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Replace a task's description; an empty string clears it
    Describe { id: Uuid, text: String },
    /// Flip a task between done and not done
    Toggle { id: Uuid },
    /// Delete a task
    Delete { id: Uuid },
    /// Fetch the remote feed once and merge it in
    Sync,
    /// Keep syncing on an interval until interrupted
    Watch {
        #[arg(long, default_value_t = 300)]
        every_secs: u64,
    },
    /// Print how many tasks the remote feed reports
    Count,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut builder = TodoSyncBuilder::new(&cli.database_url)
        .with_feed_url(&cli.feed_url)
        .with_page_size(cli.page_size)
        .with_request_timeout(Duration::from_secs(cli.timeout_secs));
    if let Command::Watch { every_secs } = cli.command {
        builder = builder.with_sync_interval(Duration::from_secs(every_secs));
    }
    let app = builder.build().await?;

    if let Err(e) = run(&app, cli.command).await {
        // Validation errors exit with status 2.
        if e.downcast_ref::<StoreError>().is_some_and(StoreError::is_validation) {
            eprintln!("{}", e);
            std::process::exit(2);
        }
        return Err(e);
    }
    Ok(())
}

async fn run(app: &TodoSync, command: Command) -> anyhow::Result<()> {
    let store = app.store();

    match command {
        Command::List { search } => {
            let tasks = match search {
                Some(text) => store.filter(&text).await?,
                None => store.all().await?,
            };
            for task in &tasks {
                print_task(task);
            }
            println!("{} tasks", tasks.len());
        }
        Command::Show { id } => {
            let task = store.get(id).await?;
            print_task(&task);
            if let Some(description) = &task.description {
                println!("    {}", description);
            }
        }
        Command::Add { title, description } => {
            let task = store.add(&title, description.as_deref()).await?;
            print_task(&task);
        }
        Command::Edit {
            id,
            title,
            description,
        } => {
            let current = store.get(id).await?;
            let edited = TaskRecord {
                title: title.unwrap_or_else(|| current.title.clone()),
                description: description.or_else(|| current.description.clone()),
                ..current
            };
            match store.update(edited).await? {
                WriteOutcome::Written(task) => print_task(&task),
                WriteOutcome::Unchanged(_) => println!("Nothing to change"),
            }
        }
        Command::Describe { id, text } => {
            let task = store.set_description(id, &text).await?;
            print_task(&task);
        }
        Command::Toggle { id } => {
            let task = store.toggle(id).await?;
            print_task(&task);
        }
        Command::Delete { id } => {
            let task = store.delete(id).await?;
            println!("Deleted {}", task.title);
        }
        Command::Sync => {
            let report = app.sync_now().await?;
            let total = report.remote_total.unwrap_or(report.fetched);
            println!(
                "{} added, {} updated, {} unchanged ({} remote tasks)",
                report.summary.added, report.summary.updated, report.summary.unchanged, total
            );
        }
        Command::Watch { every_secs } => {
            log::info!("Syncing every {}s, press Ctrl-C to stop", every_secs);
            let mut changes = app.change_rx();
            loop {
                tokio::select! {
                    change = changes.recv() => match change {
                        Ok(change) => {
                            if let ChangeKind::Reconciled(summary) = change.kind {
                                println!(
                                    "{} added, {} updated, {} unchanged",
                                    summary.added, summary.updated, summary.unchanged
                                );
                            }
                        }
                        Err(RecvError::Lagged(missed)) => {
                            log::warn!("Missed {} change notifications", missed)
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
        Command::Count => {
            println!("{}", app.remote_total().await?);
        }
    }

    Ok(())
}

fn print_task(task: &TaskRecord) {
    let mark = if task.is_completed { "x" } else { " " };
    let remote = task
        .remote_id
        .map(|id| format!(" #{}", id))
        .unwrap_or_default();
    println!(
        "[{}] {}  {}  {}{}",
        mark,
        task.title,
        task.created_at.format("%m/%d/%y"),
        task.local_id,
        remote
    );
}
