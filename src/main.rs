use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use nested_todos::api::{self, SecurityConfig};
use nested_todos::client::{quick_add, ClientConfig, OptimisticTodos, TodoClient};
use nested_todos::db;
use nested_todos::forest;
use nested_todos::models::TodoFilter;
use nested_todos::render;
use nested_todos::validation::{validate_create, validate_update, TodoForm};

#[derive(Parser)]
#[command(name = "ntd")]
#[command(about = "Personal hierarchical to-do list")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the todo server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// SQLite database file (defaults to the platform data directory)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Show your todos as a tree
    List {
        /// Which root todos to show: all, completed or pending
        #[arg(short, long, default_value = "all")]
        filter: TodoFilter,

        /// Print a flat newest-first list with ids instead of a tree
        #[arg(long)]
        flat: bool,
    },
    /// Create a todo
    Add(AddArgs),
    /// Create a medium-priority todo from just a title
    Quick {
        #[arg(required = true)]
        title: Vec<String>,
    },
    /// Change a todo's fields
    Edit(EditArgs),
    /// Mark a todo completed
    Done { id: String },
    /// Mark a todo pending again
    Undo { id: String },
    /// Delete a todo (its subtasks are not deleted)
    Rm { id: String },
    /// Save the server URL and token to the config file
    Login {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },
}

#[derive(Args)]
struct AddArgs {
    title: String,
    #[arg(short, long)]
    description: Option<String>,
    /// low, medium or high
    #[arg(short, long, default_value = "medium")]
    priority: String,
    /// Due date as YYYY-MM-DD
    #[arg(long)]
    due: Option<String>,
    /// Parent todo id (full or short)
    #[arg(long)]
    parent: Option<String>,
    /// Tag, may be repeated
    #[arg(short, long = "tag")]
    tags: Vec<String>,
}

#[derive(Args)]
struct EditArgs {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(short, long)]
    description: Option<String>,
    #[arg(short, long)]
    priority: Option<String>,
    #[arg(long, conflicts_with = "clear_due")]
    due: Option<String>,
    #[arg(long)]
    clear_due: bool,
    #[arg(long, conflicts_with = "clear_parent")]
    parent: Option<String>,
    /// Make this a root todo
    #[arg(long)]
    clear_parent: bool,
    /// Replace all tags, may be repeated
    #[arg(short, long = "tag")]
    tags: Vec<String>,
}

/// Initialize tracing with output to stderr (client commands) or stdout (server)
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| {
            if use_stderr {
                "nested_todos=warn".into()
            } else {
                "nested_todos=debug,tower_http=debug".into()
            }
        }),
    );

    if use_stderr {
        // Client output goes to stdout, keep logs out of it
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let is_server = matches!(cli.command, None | Some(Commands::Serve { .. }));
    init_tracing(!is_server);

    match cli.command {
        Some(Commands::Serve { port, db }) => serve(port, db).await,
        None => serve(3000, None).await,
        Some(Commands::Login { url, token }) => {
            let (config, path) = ClientConfig::login(url, token)?;
            println!("Saved {} to {}", config.server_url, path.display());
            Ok(())
        }
        Some(command) => {
            let client = TodoClient::from_config(&ClientConfig::load());
            run_client(&client, command).await
        }
    }
}

async fn serve(port: u16, db_path: Option<PathBuf>) -> anyhow::Result<()> {
    tracing::info!("Starting todo server on port {}", port);

    let db = match db_path {
        Some(path) => db::Database::open(path)?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;

    let config = SecurityConfig::from_env();
    if config.tokens.is_empty() {
        tracing::warn!("NESTED_TODOS_TOKENS not set, running in single-user local mode");
    }
    let app = api::create_router_with_config(db, config);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Todo server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_client(client: &TodoClient, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::List { filter, flat } => {
            if flat {
                print!("{}", render::render_flat(&client.list().await?));
            } else {
                let forest = client.tree(filter).await?;
                if forest.is_empty() {
                    println!("No todos found. Create your first todo!");
                } else {
                    print!("{}", render::render_tree(&forest));
                    println!("\n{} shown ({})", forest::count_nodes(&forest), filter);
                }
            }
        }
        Commands::Add(args) => {
            let parent_id = match args.parent {
                Some(raw) => Some(resolve_id(client, &raw).await?.to_string()),
                None => None,
            };
            let form = TodoForm {
                title: Some(args.title),
                description: args.description,
                priority: Some(args.priority),
                due_date: args.due,
                parent_id,
                tags: args.tags,
                ..Default::default()
            };
            validate_create(&form)?;
            let todo = client.create(&form).await?;
            println!("Created {}", render::render_line(&todo));
        }
        Commands::Quick { title } => {
            let mut list = OptimisticTodos::new(client.list().await?);
            if let Some(todo) = quick_add(client, &mut list, &title.join(" ")).await? {
                println!("Created {}", render::render_line(&todo));
            }
        }
        Commands::Edit(args) => {
            let id = resolve_id(client, &args.id).await?;
            let existing = client.get(id).await?;
            let mut form = TodoForm::from(&existing);

            if let Some(title) = args.title {
                form.title = Some(title);
            }
            if let Some(description) = args.description {
                form.description = Some(description);
            }
            if let Some(priority) = args.priority {
                form.priority = Some(priority);
            }
            if args.clear_due {
                form.due_date = None;
            } else if let Some(due) = args.due {
                form.due_date = Some(due);
            }
            if args.clear_parent {
                form.parent_id = None;
            } else if let Some(parent) = args.parent {
                form.parent_id = Some(resolve_id(client, &parent).await?.to_string());
            }
            if !args.tags.is_empty() {
                form.tags = args.tags;
            }

            validate_update(&form)?;
            let todo = client.update(id, &form).await?;
            println!("Updated {}", render::render_line(&todo));
        }
        Commands::Done { id } => {
            let id = resolve_id(client, &id).await?;
            client.toggle(id, true).await?;
            println!("Completed {}", id);
        }
        Commands::Undo { id } => {
            let id = resolve_id(client, &id).await?;
            client.toggle(id, false).await?;
            println!("Reopened {}", id);
        }
        Commands::Rm { id } => {
            let id = resolve_id(client, &id).await?;
            client.delete(id).await?;
            println!("Deleted {}", id);
        }
        Commands::Serve { .. } | Commands::Login { .. } => {}
    }
    Ok(())
}

/// Accept a full UUID or a unique prefix of the short id shown by `list --flat`.
async fn resolve_id(client: &TodoClient, raw: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = Uuid::try_parse(raw) {
        return Ok(id);
    }

    let prefix = raw.replace('-', "").to_lowercase();
    if prefix.is_empty() {
        anyhow::bail!("Empty todo id");
    }

    let todos = client.list().await.context("Failed to look up todo id")?;
    let mut matches = todos
        .iter()
        .filter(|t| t.id.simple().to_string().starts_with(&prefix));

    match (matches.next(), matches.next()) {
        (Some(todo), None) => Ok(todo.id),
        (None, _) => anyhow::bail!("No todo matches id '{}'", raw),
        (Some(_), Some(_)) => anyhow::bail!("Id '{}' is ambiguous, use more characters", raw),
    }
}
