use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use coordinator::CancelPolicy;
use serde::Deserialize;
use shared::domain::FloorPlan;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind_addr: String,
    pub floor_plan_path: Option<PathBuf>,
    pub seed_demo_data: bool,
    /// Zero disables the motion timer.
    pub motion_interval_ms: u64,
    pub motion_jitter: f64,
    pub cancel_policy: CancelPolicy,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            floor_plan_path: None,
            seed_demo_data: true,
            motion_interval_ms: 3_000,
            motion_jitter: 5.0,
            cancel_policy: CancelPolicy::Retain,
            max_body_bytes: 64 * 1024,
        }
    }
}

pub fn load_settings() -> Settings {
    let file_cfg = fs::read_to_string("server.toml")
        .ok()
        .and_then(|raw| file_values(&raw))
        .unwrap_or_default();
    let env_cfg: HashMap<String, String> = std::env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix("APP__")
                .map(|name| (name.to_ascii_lowercase(), value))
        })
        .collect();
    resolve_settings(&file_cfg, &env_cfg)
}

/// Flattens top-level `server.toml` keys to strings so `seed_demo_data = true`
/// and `seed_demo_data = "true"` read the same.
pub fn file_values(raw: &str) -> Option<HashMap<String, String>> {
    let table = match toml::from_str::<toml::Table>(raw) {
        Ok(table) => table,
        Err(error) => {
            warn!(%error, "ignoring unreadable server.toml");
            return None;
        }
    };
    Some(
        table
            .into_iter()
            .filter_map(|(key, value)| match value {
                toml::Value::String(s) => Some((key, s)),
                toml::Value::Integer(i) => Some((key, i.to_string())),
                toml::Value::Float(f) => Some((key, f.to_string())),
                toml::Value::Boolean(b) => Some((key, b.to_string())),
                _ => None,
            })
            .collect(),
    )
}

/// Layers `server.toml` values over the defaults, then `APP__*` environment
/// values over those. Keys are lower-case setting names. Unparseable values
/// are logged and skipped.
pub fn resolve_settings(
    file_cfg: &HashMap<String, String>,
    env_cfg: &HashMap<String, String>,
) -> Settings {
    let mut settings = Settings::default();
    for layer in [file_cfg, env_cfg] {
        apply_layer(&mut settings, layer);
    }
    settings
}

fn apply_layer(settings: &mut Settings, layer: &HashMap<String, String>) {
    if let Some(v) = layer.get("bind_addr") {
        settings.bind_addr = v.trim().to_string();
    }
    if let Some(v) = layer.get("floor_plan_path") {
        let v = v.trim();
        settings.floor_plan_path = (!v.is_empty()).then(|| PathBuf::from(v));
    }
    if let Some(v) = layer.get("seed_demo_data") {
        match parse_bool(v) {
            Some(parsed) => settings.seed_demo_data = parsed,
            None => warn!(value = %v, "ignoring invalid seed_demo_data"),
        }
    }
    if let Some(v) = layer.get("motion_interval_ms") {
        match v.trim().parse::<u64>() {
            Ok(parsed) => settings.motion_interval_ms = parsed,
            Err(error) => warn!(value = %v, %error, "ignoring invalid motion_interval_ms"),
        }
    }
    if let Some(v) = layer.get("motion_jitter") {
        match v.trim().parse::<f64>() {
            Ok(parsed) if parsed.is_finite() && parsed >= 0.0 => settings.motion_jitter = parsed,
            _ => warn!(value = %v, "ignoring invalid motion_jitter"),
        }
    }
    if let Some(v) = layer.get("cancel_policy") {
        match v.parse::<CancelPolicy>() {
            Ok(parsed) => settings.cancel_policy = parsed,
            Err(error) => warn!(value = %v, %error, "ignoring invalid cancel_policy"),
        }
    }
    if let Some(v) = layer.get("max_body_bytes") {
        match v.trim().parse::<usize>() {
            Ok(parsed) if parsed > 0 => settings.max_body_bytes = parsed,
            _ => warn!(value = %v, "ignoring invalid max_body_bytes"),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct FloorPlanFile {
    #[serde(default)]
    floors: Vec<FloorPlan>,
}

/// Reads a `[[floors]]` TOML layout. An empty file is rejected so a typo
/// cannot silently leave the server without zones.
pub fn load_floor_plans(path: &Path) -> anyhow::Result<Vec<FloorPlan>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read floor plan file '{}'", path.display()))?;
    parse_floor_plans(&raw)
        .with_context(|| format!("invalid floor plan file '{}'", path.display()))
}

pub fn parse_floor_plans(raw: &str) -> anyhow::Result<Vec<FloorPlan>> {
    let file: FloorPlanFile = toml::from_str(raw)?;
    anyhow::ensure!(!file.floors.is_empty(), "no [[floors]] defined");
    for floor in &file.floors {
        for zone in &floor.zones {
            anyhow::ensure!(
                zone.bounds.is_well_formed(),
                "zone '{}' on floor {} needs finite bounds with non-negative width and height",
                zone.name,
                floor.floor
            );
        }
    }
    Ok(file.floors)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
