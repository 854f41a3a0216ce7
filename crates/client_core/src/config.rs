use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

use crate::mapping::SurfaceSize;

pub const DEFAULT_CONFIG_FILE: &str = "kmeans.toml";
pub const CONFIG_PATH_ENV: &str = "KMEANS_CONFIG";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub engine_url: String,
    pub surface_width: f32,
    pub surface_height: f32,
    pub out_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine_url: "http://localhost:5000".into(),
            surface_width: 500.0,
            surface_height: 500.0,
            out_dir: PathBuf::from("./frames"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    engine_url: Option<String>,
    surface_width: Option<f32>,
    surface_height: Option<f32>,
    out_dir: Option<PathBuf>,
}

impl Settings {
    pub fn surface_size(&self) -> SurfaceSize {
        SurfaceSize::new(self.surface_width, self.surface_height)
    }

    fn apply_file(&mut self, raw: &str) -> anyhow::Result<()> {
        let file_cfg: FileSettings = toml::from_str(raw)?;
        if let Some(v) = file_cfg.engine_url {
            self.engine_url = v;
        }
        if let Some(v) = file_cfg.surface_width {
            self.surface_width = v;
        }
        if let Some(v) = file_cfg.surface_height {
            self.surface_height = v;
        }
        if let Some(v) = file_cfg.out_dir {
            self.out_dir = v;
        }
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("KMEANS_ENGINE_URL") {
            self.engine_url = v;
        }
        if let Some(v) = lookup("APP__ENGINE_URL") {
            self.engine_url = v;
        }

        if let Some(parsed) = lookup("APP__SURFACE_WIDTH").and_then(|v| v.parse::<f32>().ok()) {
            self.surface_width = parsed;
        }
        if let Some(parsed) = lookup("APP__SURFACE_HEIGHT").and_then(|v| v.parse::<f32>().ok()) {
            self.surface_height = parsed;
        }

        if let Some(v) = lookup("APP__OUT_DIR") {
            self.out_dir = PathBuf::from(v);
        }
    }

    fn validate(self) -> anyhow::Result<Self> {
        if !(self.surface_width > 0.0 && self.surface_height > 0.0) {
            anyhow::bail!(
                "surface size must be positive, got {}x{}",
                self.surface_width,
                self.surface_height
            );
        }
        if self.engine_url.trim().is_empty() {
            anyhow::bail!("engine_url must not be empty");
        }
        Ok(self)
    }
}

/// Defaults, then the TOML file, then environment overrides.
pub fn load_settings() -> anyhow::Result<Settings> {
    let path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
    load_settings_from(&path, |name| std::env::var(name).ok())
}

pub fn load_settings_from(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => settings
            .apply_file(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))
        }
    }

    settings.apply_env(lookup);
    settings.validate()
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_file(label: &str, contents: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("kmeans_settings_{label}_{suffix}.toml"));
        fs::write(&path, contents).expect("write settings");
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings =
            load_settings_from(Path::new("/nonexistent/kmeans.toml"), |_| None).expect("settings");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn file_then_env_overrides_apply_in_order() {
        let path = temp_file("overrides", "engine_url = \"http://engine.local:9000\"\nsurface_width = 640.0\n");
        let env: HashMap<&str, &str> = [("APP__SURFACE_HEIGHT", "360"), ("APP__OUT_DIR", "/tmp/out")]
            .into_iter()
            .collect();

        let settings =
            load_settings_from(&path, |name| env.get(name).map(|v| v.to_string())).expect("settings");
        assert_eq!(settings.engine_url, "http://engine.local:9000");
        assert_eq!(settings.surface_width, 640.0);
        assert_eq!(settings.surface_height, 360.0);
        assert_eq!(settings.out_dir, PathBuf::from("/tmp/out"));

        let overridden = load_settings_from(&path, |name| {
            (name == "APP__ENGINE_URL").then(|| "http://override:1".to_string())
        })
        .expect("settings");
        assert_eq!(overridden.engine_url, "http://override:1");

        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn malformed_file_and_bad_sizes_are_errors() {
        let path = temp_file("malformed", "engine_url = 5\n");
        assert!(load_settings_from(&path, |_| None).is_err());
        fs::remove_file(path).expect("cleanup");

        let zero_width = load_settings_from(Path::new("/nonexistent/kmeans.toml"), |name| {
            (name == "APP__SURFACE_WIDTH").then(|| "0".to_string())
        });
        assert!(zero_width.is_err());
    }
}
