use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub records_csv: PathBuf,
    pub boundaries: PathBuf,
    pub routes: Option<PathBuf>, // national road network, optional layer
    #[serde(default = "default_name_column")]
    pub name_column: String,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// proj string overriding whatever CRS the geometry files declare.
    pub source_crs: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    pub default_locality: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            default_locality: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub center_lon: f64,
    pub center_lat: f64,
    pub zoom: f64,
    pub marker: MarkerConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_lon: -64.1455681,
            center_lat: -30.7472872,
            zoom: 7.5,
            marker: MarkerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, serde::Serialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    pub icon_url: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            name: "Sarmiento".to_string(),
            lon: -64.105187,
            lat: -30.772768,
            icon_url: "https://img.icons8.com/color/48/000000/marker.png".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub map_png: PathBuf,
    pub width: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            map_png: PathBuf::from("output/overview.png"),
            width: 1200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
    /// Idle time after which a dashboard session is dropped.
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            static_dir: PathBuf::from("static"),
            session_ttl_secs: 3600,
        }
    }
}

fn default_name_column() -> String {
    "nombre".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_top_n() -> usize {
    10
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
