use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::debug;

use crate::config::{ConflictPolicy, LayerKey};
use crate::errors::BootstrapError;
use crate::models::{Account, Layer, LayerSeed, Role};
use crate::report::UpsertOutcome;

/// Handle on the target store. Holds a single connection for the whole run.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, BootstrapError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .map_err(BootstrapError::Connection)?;
        Ok(Self::new(pool))
    }

    /// Creates `users` and `layers` when they are missing, then moves
    /// `layers` to the schema revision whose unique constraint is `key`.
    ///
    /// Both migration sets share one history table, so each ignores the
    /// versions only the other one knows.
    pub async fn migrate(&self, key: LayerKey) -> Result<(), BootstrapError> {
        let mut base: Migrator = sqlx::migrate!("./migrations");
        base.set_ignore_missing(true);
        base.run(&self.pool).await?;

        if key == LayerKey::NameProviderOwner {
            let mut composite: Migrator = sqlx::migrate!("./migrations_composite_key");
            composite.set_ignore_missing(true);
            composite.run(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, BootstrapError> {
        Ok(self.pool.begin().await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub async fn find_account_by_email(
    conn: &mut PgConnection,
    email: &str,
) -> Result<Option<Account>, BootstrapError> {
    let account = sqlx::query_as(
        r#"
        SELECT id, email, password_hash, role, created_at
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(account)
}

/// Inserts the account, or overwrites `password_hash` and `role` of the row
/// with the same email. Returns the account id.
pub async fn upsert_account(
    conn: &mut PgConnection,
    email: &str,
    password_hash: &str,
    role: Role,
) -> Result<(i32, UpsertOutcome), BootstrapError> {
    let (id, inserted): (i32, bool) = sqlx::query_as(
        r#"
        INSERT INTO users (email, password_hash, role, created_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (email) DO UPDATE
        SET password_hash = EXCLUDED.password_hash,
            role = EXCLUDED.role
        RETURNING id, (xmax = 0) AS inserted
        "#,
    )
    .bind(email)
    .bind(password_hash)
    .bind(role.as_str())
    .fetch_one(&mut *conn)
    .await?;

    let outcome = if inserted {
        UpsertOutcome::Created
    } else {
        UpsertOutcome::Updated
    };
    debug!(id, ?outcome, "account upserted");
    Ok((id, outcome))
}

const LAYER_COLUMNS: &str = r#"name, provider, uri, "schema", srid, epsg, geom_type, description, created_by_user_id"#;

/// Builds the conditional insert for one layer under the given key and
/// policy. Under [`ConflictPolicy::Refresh`] the update only fires when a
/// mutable column actually differs, so no row comes back for a no-op.
pub fn layer_upsert_sql(key: LayerKey, policy: ConflictPolicy) -> String {
    let conflict = match policy {
        ConflictPolicy::Keep => "DO NOTHING".to_string(),
        ConflictPolicy::Refresh => {
            let columns: Vec<String> = key
                .mutable_columns()
                .iter()
                .map(|c| format!("\"{c}\""))
                .collect();
            let assignments: Vec<String> = columns
                .iter()
                .map(|c| format!("{c} = EXCLUDED.{c}"))
                .collect();
            let current: Vec<String> = columns.iter().map(|c| format!("layers.{c}")).collect();
            let incoming: Vec<String> = columns.iter().map(|c| format!("EXCLUDED.{c}")).collect();
            format!(
                "DO UPDATE SET {} WHERE ({}) IS DISTINCT FROM ({})",
                assignments.join(", "),
                current.join(", "),
                incoming.join(", ")
            )
        }
    };

    format!(
        "INSERT INTO layers ({LAYER_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT {} {conflict} \
         RETURNING id, (xmax = 0) AS inserted",
        key.conflict_target()
    )
}

pub async fn upsert_layer(
    conn: &mut PgConnection,
    seed: &LayerSeed,
    owner: Option<i32>,
    key: LayerKey,
    policy: ConflictPolicy,
) -> Result<UpsertOutcome, BootstrapError> {
    let sql = layer_upsert_sql(key, policy);
    let row: Option<(i32, bool)> = sqlx::query_as(&sql)
        .bind(&seed.name)
        .bind(&seed.provider)
        .bind(&seed.uri)
        .bind(&seed.schema)
        .bind(seed.srid)
        .bind(seed.epsg)
        .bind(seed.geom_type.as_str())
        .bind(&seed.description)
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await?;

    let outcome = match row {
        Some((_, true)) => UpsertOutcome::Created,
        Some((_, false)) => UpsertOutcome::Updated,
        None => UpsertOutcome::Unchanged,
    };
    debug!(layer = %seed.name, id = ?row.map(|(id, _)| id), ?outcome, "layer upserted");
    Ok(outcome)
}

pub async fn find_layers_by_name(
    conn: &mut PgConnection,
    name: &str,
) -> Result<Vec<Layer>, BootstrapError> {
    let layers = sqlx::query_as(
        r#"
        SELECT id, name, provider, uri, "schema", srid, epsg, geom_type, description,
               created_at, created_by_user_id
        FROM layers
        WHERE name = $1
        ORDER BY id
        "#,
    )
    .bind(name)
    .fetch_all(&mut *conn)
    .await?;

    Ok(layers)
}
