//! Configuration for a bootstrap run.
//!
//! [`BootstrapConfig`] is built once at process start, usually with
//! [`BootstrapConfig::from_env`], and handed to [`crate::run`] by value.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::errors::BootstrapError;
use crate::models::{LayerSeed, Role, builtin_layer_seeds};

/// Primary connection variable.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
/// Legacy connection variable, read when `DATABASE_URL` is unset or empty.
pub const LEGACY_DATABASE_URL_VAR: &str = "POSTGRES_URL";

/// Columns that identify a layer independently of its surrogate id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerKey {
    /// `UNIQUE (name)`.
    #[default]
    Name,
    /// `UNIQUE (name, provider, created_by_user_id)`. Migrating with this key
    /// drops `layers_name_key`, after which `Name` no longer works.
    NameProviderOwner,
}

impl LayerKey {
    /// Column list for the `ON CONFLICT` target.
    pub fn conflict_target(&self) -> &'static str {
        match self {
            LayerKey::Name => "(name)",
            LayerKey::NameProviderOwner => "(name, provider, created_by_user_id)",
        }
    }

    /// Columns a refresh may overwrite on an existing row.
    pub fn mutable_columns(&self) -> &'static [&'static str] {
        match self {
            LayerKey::Name => &[
                "provider",
                "uri",
                "schema",
                "srid",
                "epsg",
                "geom_type",
                "description",
            ],
            LayerKey::NameProviderOwner => {
                &["uri", "schema", "srid", "epsg", "geom_type", "description"]
            }
        }
    }

    /// Identity of a seed under this key. The owner is the same for every
    /// seed of a run, so it does not take part.
    fn seed_identity<'a>(&self, seed: &'a LayerSeed) -> (&'a str, Option<&'a str>) {
        match self {
            LayerKey::Name => (seed.name.as_str(), None),
            LayerKey::NameProviderOwner => (seed.name.as_str(), Some(seed.provider.as_str())),
        }
    }
}

impl FromStr for LayerKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let columns: Vec<String> = s
            .split(',')
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        match columns.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["name"] => Ok(LayerKey::Name),
            ["name", "provider", "owner" | "created_by_user_id"] => {
                Ok(LayerKey::NameProviderOwner)
            }
            _ => Err(format!(
                "unsupported layer key '{s}', expected 'name' or 'name,provider,owner'"
            )),
        }
    }
}

/// What happens when a layer with the same natural key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Overwrite non-key attributes that differ from the seed.
    #[default]
    Refresh,
    /// Leave the existing row as it is.
    Keep,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refresh" | "update" => Ok(ConflictPolicy::Refresh),
            "keep" | "ignore" | "nothing" => Ok(ConflictPolicy::Keep),
            other => Err(format!(
                "unsupported conflict policy '{other}', expected 'refresh' or 'keep'"
            )),
        }
    }
}

/// Administrator account to provision.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredential {
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl AdminCredential {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            role: Role::Admin,
        }
    }
}

impl fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredential")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// Everything a bootstrap run needs.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Connection descriptor of the target store.
    pub database_url: String,

    /// Account to provision. `None` skips account provisioning.
    pub admin: Option<AdminCredential>,

    /// Layers to guarantee, in order.
    pub layer_seeds: Vec<LayerSeed>,

    /// Natural key of the active `layers` schema revision.
    pub layer_key: LayerKey,

    /// Behaviour for layers that already exist.
    pub conflict_policy: ConflictPolicy,

    /// Apply the embedded migrations before seeding.
    pub run_migrations: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            admin: None,
            layer_seeds: builtin_layer_seeds(),
            layer_key: LayerKey::default(),
            conflict_policy: ConflictPolicy::default(),
            run_migrations: true,
        }
    }
}

impl BootstrapConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    pub fn with_admin(mut self, admin: AdminCredential) -> Self {
        self.admin = Some(admin);
        self
    }

    pub fn with_layer_seeds(mut self, seeds: Vec<LayerSeed>) -> Self {
        self.layer_seeds = seeds;
        self
    }

    pub fn with_layer_key(mut self, key: LayerKey) -> Self {
        self.layer_key = key;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn with_migrations(mut self, run_migrations: bool) -> Self {
        self.run_migrations = run_migrations;
        self
    }

    /// Reads the process environment.
    pub fn from_env() -> Result<Self, BootstrapError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from a variable lookup. A missing connection
    /// descriptor is left empty here and rejected by [`Self::validate`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BootstrapError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = non_empty(DATABASE_URL_VAR)
            .or_else(|| non_empty(LEGACY_DATABASE_URL_VAR))
            .unwrap_or_default();

        let admin = match (non_empty("ADMIN_EMAIL"), non_empty("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => {
                let role = match non_empty("ADMIN_ROLE") {
                    Some(role) => role.parse().map_err(BootstrapError::InvalidConfiguration)?,
                    None => Role::Admin,
                };
                Some(AdminCredential {
                    email: email.trim().to_string(),
                    password,
                    role,
                })
            }
            _ => None,
        };

        let layer_seeds = match non_empty("LAYER_SEEDS_FILE") {
            Some(path) => load_layer_seeds(Path::new(path.trim()))?,
            None => builtin_layer_seeds(),
        };

        let layer_key = match non_empty("LAYER_NATURAL_KEY") {
            Some(key) => key.parse().map_err(BootstrapError::InvalidConfiguration)?,
            None => LayerKey::default(),
        };

        let conflict_policy = match non_empty("LAYER_CONFLICT_POLICY") {
            Some(policy) => policy
                .parse()
                .map_err(BootstrapError::InvalidConfiguration)?,
            None => ConflictPolicy::default(),
        };

        let run_migrations = match non_empty("BOOTSTRAP_MIGRATE") {
            Some(flag) => parse_flag("BOOTSTRAP_MIGRATE", &flag)?,
            None => true,
        };

        Ok(Self {
            database_url,
            admin,
            layer_seeds,
            layer_key,
            conflict_policy,
            run_migrations,
        })
    }

    /// Checks preconditions that must hold before touching the store.
    pub fn validate(&self) -> Result<(), BootstrapError> {
        if self.database_url.trim().is_empty() {
            return Err(BootstrapError::MissingConfiguration(format!(
                "{DATABASE_URL_VAR} is not set"
            )));
        }
        if let Some(admin) = &self.admin {
            if admin.email.trim().is_empty() || admin.password.is_empty() {
                return Err(BootstrapError::InvalidConfiguration(
                    "admin credential requires both email and password".to_string(),
                ));
            }
        }
        for seed in &self.layer_seeds {
            if seed.name.trim().is_empty() {
                return Err(BootstrapError::InvalidConfiguration(
                    "layer seed with empty name".to_string(),
                ));
            }
            if seed.srid <= 0 {
                return Err(BootstrapError::InvalidConfiguration(format!(
                    "layer '{}' has invalid srid {}",
                    seed.name, seed.srid
                )));
            }
        }
        Ok(())
    }

    /// Seeds with exact duplicates removed. Two seeds sharing a natural key
    /// but differing in any attribute are rejected.
    pub fn distinct_layer_seeds(&self) -> Result<Vec<LayerSeed>, BootstrapError> {
        let mut seen = HashSet::new();
        let mut distinct: Vec<LayerSeed> = Vec::with_capacity(self.layer_seeds.len());

        for seed in &self.layer_seeds {
            if seen.insert(self.layer_key.seed_identity(seed)) {
                distinct.push(seed.clone());
                continue;
            }
            let identity = self.layer_key.seed_identity(seed);
            let existing = distinct
                .iter()
                .find(|d| self.layer_key.seed_identity(d) == identity);
            if existing != Some(seed) {
                return Err(BootstrapError::ConstraintViolation(format!(
                    "layer seeds conflict on natural key {} for '{}'",
                    self.layer_key.conflict_target(),
                    seed.name
                )));
            }
        }

        Ok(distinct)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, BootstrapError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BootstrapError::InvalidConfiguration(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

/// Reads a JSON array of [`LayerSeed`]s.
pub fn load_layer_seeds(path: &Path) -> Result<Vec<LayerSeed>, BootstrapError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        BootstrapError::InvalidConfiguration(format!(
            "failed to read layer seeds at '{}': {e}",
            path.display()
        ))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        BootstrapError::InvalidConfiguration(format!(
            "invalid layer seeds in '{}': {e}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeometryType;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = BootstrapConfig::from_lookup(lookup(&[(
            "DATABASE_URL",
            "postgres://localhost/geo",
        )]))
        .unwrap();

        assert_eq!(config.database_url, "postgres://localhost/geo");
        assert!(config.admin.is_none());
        assert_eq!(config.layer_seeds, builtin_layer_seeds());
        assert_eq!(config.layer_key, LayerKey::Name);
        assert_eq!(config.conflict_policy, ConflictPolicy::Refresh);
        assert!(config.run_migrations);
    }

    #[test]
    fn test_legacy_url_fallback() {
        let config = BootstrapConfig::from_lookup(lookup(&[
            ("DATABASE_URL", ""),
            ("POSTGRES_URL", "postgres://legacy/geo"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "postgres://legacy/geo");
    }

    #[test]
    fn test_missing_url_fails_validation() {
        let config = BootstrapConfig::from_lookup(lookup(&[])).unwrap();
        assert!(matches!(
            config.validate(),
            Err(BootstrapError::MissingConfiguration(_))
        ));
    }

    #[test]
    fn test_partial_credential_is_skipped() {
        let config = BootstrapConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/geo"),
            ("ADMIN_EMAIL", "admin@demo.dev"),
        ]))
        .unwrap();
        assert!(config.admin.is_none());

        let config = BootstrapConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/geo"),
            ("ADMIN_EMAIL", "admin@demo.dev"),
            ("ADMIN_PASSWORD", ""),
        ]))
        .unwrap();
        assert!(config.admin.is_none());
    }

    #[test]
    fn test_full_credential() {
        let config = BootstrapConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/geo"),
            ("ADMIN_EMAIL", " admin@demo.dev "),
            ("ADMIN_PASSWORD", "demo123"),
        ]))
        .unwrap();
        assert_eq!(
            config.admin,
            Some(AdminCredential::new("admin@demo.dev", "demo123"))
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = BootstrapConfig::new("postgres://localhost/geo")
            .with_admin(AdminCredential::new("admin@demo.dev", "demo123"));
        let rendered = format!("{config:?}");
        assert!(rendered.contains("admin@demo.dev"));
        assert!(!rendered.contains("demo123"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (key, value) in [
            ("LAYER_NATURAL_KEY", "name,owner"),
            ("LAYER_CONFLICT_POLICY", "replace"),
            ("BOOTSTRAP_MIGRATE", "maybe"),
        ] {
            let result = BootstrapConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://localhost/geo"),
                (key, value),
            ]));
            assert!(
                matches!(result, Err(BootstrapError::InvalidConfiguration(_))),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_migrations_can_be_disabled() {
        let config = BootstrapConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/geo"),
            ("BOOTSTRAP_MIGRATE", "false"),
            ("LAYER_NATURAL_KEY", "name,provider,owner"),
            ("LAYER_CONFLICT_POLICY", "keep"),
        ]))
        .unwrap();
        assert!(!config.run_migrations);
        assert_eq!(config.layer_key, LayerKey::NameProviderOwner);
        assert_eq!(config.conflict_policy, ConflictPolicy::Keep);
    }

    #[test]
    fn test_layer_key_parse() {
        assert_eq!("name".parse::<LayerKey>().unwrap(), LayerKey::Name);
        assert_eq!(
            "name, provider, owner".parse::<LayerKey>().unwrap(),
            LayerKey::NameProviderOwner
        );
        assert_eq!(
            "name,provider,created_by_user_id".parse::<LayerKey>().unwrap(),
            LayerKey::NameProviderOwner
        );
    }

    #[test]
    fn test_composite_key_never_overwrites_key_columns() {
        let mutable = LayerKey::NameProviderOwner.mutable_columns();
        assert!(!mutable.contains(&"provider"));
        assert!(!mutable.contains(&"name"));
        assert!(LayerKey::Name.mutable_columns().contains(&"provider"));
    }

    #[test]
    fn test_seeds_file() {
        let path = std::env::temp_dir().join(format!("layer-seeds-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"name": "hidrantes", "srid": 31984, "geom_type": "point", "description": "Rede de hidrantes"}]"#,
        )
        .unwrap();

        let config = BootstrapConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/geo"),
            ("LAYER_SEEDS_FILE", path.to_str().unwrap()),
        ]));
        std::fs::remove_file(&path).unwrap();

        let seeds = config.unwrap().layer_seeds;
        assert_eq!(
            seeds,
            vec![
                LayerSeed::new("hidrantes", 31984, GeometryType::Point)
                    .with_description("Rede de hidrantes")
            ]
        );
    }

    #[test]
    fn test_missing_seeds_file() {
        let result = BootstrapConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/geo"),
            ("LAYER_SEEDS_FILE", "/nonexistent/layers.json"),
        ]));
        assert!(matches!(
            result,
            Err(BootstrapError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_invalid_seed_rejected() {
        let config = BootstrapConfig::new("postgres://localhost/geo")
            .with_layer_seeds(vec![LayerSeed::new("bairros", 0, GeometryType::MultiPolygon)]);
        assert!(matches!(
            config.validate(),
            Err(BootstrapError::InvalidConfiguration(_))
        ));

        let config = BootstrapConfig::new("postgres://localhost/geo")
            .with_layer_seeds(vec![LayerSeed::new("  ", 31984, GeometryType::Point)]);
        assert!(matches!(
            config.validate(),
            Err(BootstrapError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_exact_duplicate_seeds_collapse() {
        let seed = LayerSeed::new("bairros", 31984, GeometryType::MultiPolygon);
        let config = BootstrapConfig::new("postgres://localhost/geo")
            .with_layer_seeds(vec![seed.clone(), seed.clone()]);
        assert_eq!(config.distinct_layer_seeds().unwrap(), vec![seed]);
    }

    #[test]
    fn test_conflicting_seeds_rejected() {
        let config = BootstrapConfig::new("postgres://localhost/geo").with_layer_seeds(vec![
            LayerSeed::new("bairros", 31984, GeometryType::MultiPolygon),
            LayerSeed::new("bairros", 4326, GeometryType::MultiPolygon),
        ]);
        assert!(matches!(
            config.distinct_layer_seeds(),
            Err(BootstrapError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_composite_key_allows_same_name_different_provider() {
        let mut wfs = LayerSeed::new("bairros", 31984, GeometryType::MultiPolygon);
        wfs.provider = "wfs".to_string();
        let config = BootstrapConfig::new("postgres://localhost/geo")
            .with_layer_key(LayerKey::NameProviderOwner)
            .with_layer_seeds(vec![
                LayerSeed::new("bairros", 31984, GeometryType::MultiPolygon),
                wfs,
            ]);
        assert_eq!(config.distinct_layer_seeds().unwrap().len(), 2);
    }
}
