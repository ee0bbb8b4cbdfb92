use sea_orm_migration::MigratorTrait;
use tracing::{error, info};

use ramp_api::{db, migrator::Migrator};

/// Applies or rolls back the schema.
///
/// `migration` (or `migration up`) applies pending migrations,
/// `migration down` rolls back the latest one, `migration status` lists them.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://ramp.db?mode=rwc".to_string());
    info!("Connecting to database: {}", database_url);

    let pool = db::establish_connection(&database_url).await?;

    let result = match command.as_str() {
        "up" => Migrator::up(&pool, None).await,
        "down" => Migrator::down(&pool, Some(1)).await,
        "status" => Migrator::status(&pool).await,
        other => {
            error!("Unknown migration command: {}", other);
            anyhow::bail!("unknown command '{}', expected one of: up, down, status", other);
        }
    };

    if let Err(e) = result {
        error!("Migration '{}' failed: {}", command, e);
        return Err(e.into());
    }

    info!("Migration '{}' completed successfully", command);
    db::close_pool(pool).await?;
    Ok(())
}
