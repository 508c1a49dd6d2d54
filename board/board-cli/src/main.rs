//! Board CLI
//!
//! Command-line access to postboard storage, bypassing the HTTP service.
//!
//! # Usage
//!
//! ```bash
//! # Create a user
//! board --url postgres://localhost/board users create --login yan --full-name "Yan Doe"
//!
//! # List users by login
//! board --url postgres://localhost/board users list --order-by login --limit 10
//!
//! # Posts against a document store
//! board --backend mongo --url mongodb://localhost:27017 posts list --user-id 1
//! ```

use std::time::Duration;

use board_core::{
    connect, BackendKind, ConnectOptions, NewPost, NewUser, OpContext, PostListParams,
    PostListQuery, Repository, UserId, UserListParams, UserListQuery,
    OPERATION_TIMEOUT_MS_DEFAULT,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "board")]
#[command(about = "Postboard storage CLI", long_about = None)]
struct Cli {
    /// Storage backend: postgres, mongo or memory
    #[arg(long, env = "POSTBOARD_BACKEND", default_value = "postgres")]
    backend: BackendKind,

    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    url: Option<String>,

    /// Mongo database name
    #[arg(long, env = "POSTBOARD_DATABASE_NAME")]
    database: Option<String>,

    /// Per-operation timeout in milliseconds
    #[arg(long, default_value_t = OPERATION_TIMEOUT_MS_DEFAULT)]
    timeout_ms: u64,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    #[command(subcommand)]
    Users(UserCommands),
    /// Manage posts
    #[command(subcommand)]
    Posts(PostCommands),
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user
    Create {
        /// Unique login
        #[arg(long)]
        login: String,
        /// Display name
        #[arg(long)]
        full_name: String,
    },
    /// Fetch a user by id
    Get {
        /// User id
        id: i64,
    },
    /// List users
    List(UserListArgs),
}

#[derive(Args)]
struct UserListArgs {
    /// Exact login
    #[arg(long)]
    login: Option<String>,
    /// Sort column: createdAt, login or id
    #[arg(long)]
    order_by: Option<String>,
    /// Maximum users
    #[arg(long)]
    limit: Option<String>,
    /// Users to skip
    #[arg(long)]
    offset: Option<String>,
}

#[derive(Subcommand)]
enum PostCommands {
    /// Create a post
    Create {
        /// Author id
        #[arg(long)]
        user_id: i64,
        /// Post body
        #[arg(long)]
        text: String,
    },
    /// List posts
    List {
        /// Author id
        #[arg(long)]
        user_id: Option<String>,
        /// Maximum posts
        #[arg(long)]
        limit: Option<String>,
        /// Posts to skip
        #[arg(long)]
        offset: Option<String>,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    let mut options = ConnectOptions::new(cli.backend);
    options.url = cli.url;
    if let Some(database) = cli.database {
        options.database = database;
    }
    options.op_timeout = Duration::from_millis(cli.timeout_ms);

    let repo = connect(&options).await?;
    tracing::debug!(backend = %options.backend, "connected");
    let ctx = OpContext::background();

    execute(repo.as_ref(), &ctx, cli.command).await
}

/// Run one command, then close the repository whether or not it succeeded.
async fn execute(repo: &dyn Repository, ctx: &OpContext, command: Commands) -> anyhow::Result<()> {
    let outcome = run(repo, ctx, command).await;
    repo.close().await?;
    outcome
}

async fn run(repo: &dyn Repository, ctx: &OpContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Users(UserCommands::Create { login, full_name }) => {
            let user = repo.create_user(ctx, NewUser::new(login, full_name)).await?;
            print_json(&user)
        }
        Commands::Users(UserCommands::Get { id }) => {
            let user = repo.get_user_by_id(ctx, UserId(id)).await?;
            print_json(&user)
        }
        Commands::Users(UserCommands::List(args)) => {
            let query = UserListQuery::parse(&UserListParams {
                login: args.login,
                order_by: args.order_by,
                limit: args.limit,
                offset: args.offset,
            })?;
            print_json(&repo.list_users(ctx, &query).await?)
        }
        Commands::Posts(PostCommands::Create { user_id, text }) => {
            let post = repo.create_post(ctx, NewPost::new(UserId(user_id), text)).await?;
            print_json(&post)
        }
        Commands::Posts(PostCommands::List {
            user_id,
            limit,
            offset,
        }) => {
            let query = PostListQuery::parse(&PostListParams {
                user_id,
                limit,
                offset,
            })?;
            print_json(&repo.list_posts_by_user(ctx, &query).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_core::{SimRepository, StorageError};

    #[tokio::test]
    async fn test_failed_command_still_closes_repository() {
        let repo = SimRepository::new();
        let ctx = OpContext::background();

        let err = execute(&repo, &ctx, Commands::Users(UserCommands::Get { id: 42 }))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::NotFound { .. })
        ));
        assert!(repo.is_closed());
    }

    #[tokio::test]
    async fn test_successful_command_closes_repository() {
        let repo = SimRepository::new();
        let ctx = OpContext::background();

        let command = Commands::Users(UserCommands::Create {
            login: "yan".into(),
            full_name: "Yan Doe".into(),
        });
        execute(&repo, &ctx, command).await.unwrap();
        assert!(repo.is_closed());
    }
}
