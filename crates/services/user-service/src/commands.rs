//! CLI command implementations.

use std::sync::Arc;

use common::{AppError, AppResult, OptionExt};
use domain::{NewUser, UserRole, UserView};

use crate::cli::{Commands, CreateArgs};
use crate::store::UserStore;

/// Execute one command against an open store.
pub async fn execute(command: Commands, store: Arc<UserStore>) -> AppResult<()> {
    match command {
        Commands::Stats => print_json(&store.stats().await),
        Commands::List => {
            print_users(&store.get_all().await);
            Ok(())
        }
        Commands::Search { query } => {
            print_users(&store.search(&query).await);
            Ok(())
        }
        Commands::Create(args) => create(&store, args).await,
        Commands::Delete { id } => {
            store.delete(id).await.then_some(()).ok_or_not_found()?;
            println!("Deleted {}", id);
            Ok(())
        }
        Commands::Export { output } => {
            let csv = store.export_csv().await;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, csv).await?;
                    tracing::info!(path = %path.display(), "Export written");
                }
                None => print!("{}", csv),
            }
            Ok(())
        }
        Commands::Import { file } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let report = store.import_csv(&text).await;
            println!("Imported {} user(s)", report.imported);
            for error in &report.errors {
                println!("  {}", error);
            }
            Ok(())
        }
        Commands::Backup => {
            let key = store.backup_now().await?;
            println!("{}", key);
            Ok(())
        }
        Commands::Backups => {
            for key in store.list_backups().await? {
                println!("{}", key);
            }
            Ok(())
        }
        Commands::Restore { key } => {
            let restored = store.restore_backup(&key).await?;
            println!("Restored {} user(s) from {}", restored, key);
            Ok(())
        }
        Commands::Verify => {
            let problems = store.verify_indexes().await;
            if problems.is_empty() {
                println!("Indexes consistent ({} users)", store.count().await);
                return Ok(());
            }
            for problem in &problems {
                println!("{}", problem);
            }
            Err(AppError::internal(format!("{} index problem(s)", problems.len())))
        }
        Commands::Watch => watch(&store).await,
    }
}

async fn create(store: &UserStore, args: CreateArgs) -> AppResult<()> {
    let role: UserRole = args.role.parse()?;
    let user = store
        .create(NewUser::new(args.email, args.name, args.password).with_role(role))
        .await?;
    print_json(&user)
}

/// Keep the process alive so the backup timer keeps firing.
async fn watch(store: &UserStore) -> AppResult<()> {
    if !store.backups_running() {
        return Err(AppError::validation("backup interval is zero, nothing to watch"));
    }
    tracing::info!(
        interval_secs = store.config().backup_interval_seconds,
        "Watching store. Press Ctrl+C to stop."
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping backups...");
    store.shutdown();
    Ok(())
}

fn print_users(users: &[UserView]) {
    for user in users {
        println!(
            "{}  {:<9}  {:<6}  {:<30}  {}",
            user.id,
            user.role.as_str(),
            if user.is_active { "active" } else { "off" },
            user.email,
            user.name
        );
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
