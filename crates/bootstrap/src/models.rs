use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// A row of the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i32,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: Option<OffsetDateTime>,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case(Role::Admin.as_str())
    }
}

/// A row of the `layers` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Layer {
    pub id: i32,
    pub name: String,
    pub provider: String,
    pub uri: Option<String>,
    pub schema: Option<String>,
    pub srid: Option<i32>,
    pub epsg: Option<i32>,
    pub geom_type: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<OffsetDateTime>,
    pub created_by_user_id: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OGC simple feature geometry types, stored upper case in `layers.geom_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
    Geometry,
}

impl GeometryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "POINT",
            GeometryType::LineString => "LINESTRING",
            GeometryType::Polygon => "POLYGON",
            GeometryType::MultiPoint => "MULTIPOINT",
            GeometryType::MultiLineString => "MULTILINESTRING",
            GeometryType::MultiPolygon => "MULTIPOLYGON",
            GeometryType::GeometryCollection => "GEOMETRYCOLLECTION",
            GeometryType::Geometry => "GEOMETRY",
        }
    }
}

impl FromStr for GeometryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POINT" => Ok(GeometryType::Point),
            "LINESTRING" => Ok(GeometryType::LineString),
            "POLYGON" => Ok(GeometryType::Polygon),
            "MULTIPOINT" => Ok(GeometryType::MultiPoint),
            "MULTILINESTRING" => Ok(GeometryType::MultiLineString),
            "MULTIPOLYGON" => Ok(GeometryType::MultiPolygon),
            "GEOMETRYCOLLECTION" => Ok(GeometryType::GeometryCollection),
            "GEOMETRY" => Ok(GeometryType::Geometry),
            other => Err(format!("unknown geometry type '{other}'")),
        }
    }
}

impl TryFrom<String> for GeometryType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_provider() -> String {
    "postgis".to_string()
}

/// Declarative description of a layer the bootstrap guarantees to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSeed {
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub srid: i32,
    pub geom_type: GeometryType,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub epsg: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
}

impl LayerSeed {
    /// A seed in the default schema and provider.
    pub fn new(name: impl Into<String>, srid: i32, geom_type: GeometryType) -> Self {
        Self {
            name: name.into(),
            schema: default_schema(),
            srid,
            geom_type,
            provider: default_provider(),
            uri: None,
            epsg: None,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Sanitation network layers shipped with every deployment.
pub fn builtin_layer_seeds() -> Vec<LayerSeed> {
    vec![
        LayerSeed::new("redes_esgoto", 31984, GeometryType::LineString),
        LayerSeed::new("pocos_bombeamento", 31984, GeometryType::Point),
        LayerSeed::new("bairros", 31984, GeometryType::MultiPolygon),
    ]
}
