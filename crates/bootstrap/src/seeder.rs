//! The bootstrap routine.

use sqlx::postgres::PgConnection;
use tracing::{debug, info, warn};

use crate::auth::{hash_password, verify_password};
use crate::config::{AdminCredential, BootstrapConfig};
use crate::database::{self, Database};
use crate::errors::BootstrapError;
use crate::models::LayerSeed;
use crate::report::{BootstrapReport, UpsertOutcome};

/// Admin credential with the password already hashed.
struct PreparedAccount<'a> {
    credential: &'a AdminCredential,
    password_hash: String,
}

/// Ensures the configured account and layers exist with their latest
/// attributes. Safe to run repeatedly and concurrently against one store.
pub async fn run(config: BootstrapConfig) -> Result<BootstrapReport, BootstrapError> {
    config.validate()?;
    let seeds = config.distinct_layer_seeds()?;

    let account = match &config.admin {
        Some(credential) => Some(PreparedAccount {
            credential,
            password_hash: hash_password(&credential.password)?,
        }),
        None => None,
    };

    let db = Database::connect(&config.database_url).await?;
    info!("Connected to database");

    let result = seed(&db, &config, account.as_ref(), &seeds).await;
    db.close().await;
    result
}

async fn seed(
    db: &Database,
    config: &BootstrapConfig,
    account: Option<&PreparedAccount<'_>>,
    seeds: &[LayerSeed],
) -> Result<BootstrapReport, BootstrapError> {
    if config.run_migrations {
        db.migrate(config.layer_key).await?;
        info!("Schema is up to date");
    }

    let mut report = BootstrapReport::default();
    let mut tx = db.begin().await?;

    let owner = match account {
        Some(account) => {
            let (id, outcome) = ensure_account(&mut *tx, account).await?;
            report.accounts.record(outcome);
            Some(id)
        }
        None => {
            warn!("ADMIN_EMAIL/ADMIN_PASSWORD not set, skipping account provisioning");
            report.accounts.skip();
            None
        }
    };

    info!("Seeding {} layers...", seeds.len());
    for seed in seeds {
        let outcome =
            database::upsert_layer(&mut *tx, seed, owner, config.layer_key, config.conflict_policy)
                .await?;
        info!(
            "  Layer {} ({} {}, srid {}): {:?}",
            seed.name, seed.schema, seed.geom_type, seed.srid, outcome
        );
        report.layers.record(outcome);
    }

    tx.commit().await?;
    Ok(report)
}

/// Writes the account unless the stored row already carries the same role
/// and a hash of the same password.
async fn ensure_account(
    conn: &mut PgConnection,
    account: &PreparedAccount<'_>,
) -> Result<(i32, UpsertOutcome), BootstrapError> {
    let credential = account.credential;

    if let Some(existing) = database::find_account_by_email(conn, &credential.email).await? {
        let same_role = existing.role == credential.role.as_str();
        let same_password = match verify_password(&credential.password, &existing.password_hash)
        {
            Ok(matches) => matches,
            Err(e) => {
                debug!(email = %credential.email, "stored hash unreadable, rewriting: {e}");
                false
            }
        };
        if same_role && same_password {
            info!("Account {} is up to date", credential.email);
            return Ok((existing.id, UpsertOutcome::Unchanged));
        }
    }

    let (id, outcome) = database::upsert_account(
        conn,
        &credential.email,
        &account.password_hash,
        credential.role,
    )
    .await?;
    match outcome {
        UpsertOutcome::Created => info!("Created {} account {}", credential.role, credential.email),
        _ => info!("Updated {} account {}", credential.role, credential.email),
    }
    Ok((id, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeometryType, LayerSeed};

    #[tokio::test]
    async fn test_empty_connection_fails_before_connecting() {
        let config = BootstrapConfig::new("   ")
            .with_admin(AdminCredential::new("admin@demo.dev", "demo123"));
        let err = run(config).await.unwrap_err();
        assert!(matches!(err, BootstrapError::MissingConfiguration(_)));
    }

    #[tokio::test]
    async fn test_conflicting_seeds_fail_before_connecting() {
        // Nothing listens on port 1; seeds are checked before any connection attempt.
        let config = BootstrapConfig::new("postgres://nobody@127.0.0.1:1/none").with_layer_seeds(
            vec![
                LayerSeed::new("bairros", 31984, GeometryType::MultiPolygon),
                LayerSeed::new("bairros", 31984, GeometryType::Polygon),
            ],
        );
        let err = run(config).await.unwrap_err();
        assert!(matches!(err, BootstrapError::ConstraintViolation(_)));
    }
}
