use std::path::{Path, PathBuf};

use super::{Config, ConfigError, ConfigLayer};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const MODEL_ENV: &str = "REBASER_MODEL";

/// Returns the project config path (`<repo>/.rebaser/config.toml`) when it exists.
pub fn project_config_path(project_root: &Path) -> Option<PathBuf> {
    let path = project_root.join(".rebaser").join("config.toml");
    path.is_file().then_some(path)
}

/// Returns the user-global config path (`~/.config/rebaser/config.toml` on Unix).
pub fn global_config_path() -> Option<PathBuf> {
    let base_dir = base_config_dir()?;
    Some(base_dir.join("rebaser").join("config.toml"))
}

pub fn base_config_dir() -> Option<PathBuf> {
    base_config_dir_with(|key| std::env::var(key).ok())
}

fn base_config_dir_with(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let non_blank = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(dir) = non_blank("REBASER_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Some(dir) = non_blank("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(dir));
    }
    if let Some(dir) = non_blank("APPDATA") {
        return Some(PathBuf::from(dir));
    }
    if let Some(home) = non_blank("HOME") {
        return Some(PathBuf::from(home).join(".config"));
    }
    if let Some(profile) = non_blank("USERPROFILE") {
        return Some(PathBuf::from(profile).join(".config"));
    }

    None
}

pub fn load_layer_from_path(path: &Path) -> Result<ConfigLayer, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut layer = load_layer_from_str(&contents, &path.display().to_string())?;

    // Prompt files are relative to the config file that names them.
    if let Some(base_dir) = path.parent() {
        for file in [
            &mut layer.prompts.instruction_file,
            &mut layer.prompts.initial_query_file,
        ]
        .into_iter()
        .flatten()
        {
            if file.is_relative() {
                *file = base_dir.join(&*file);
            }
        }
    }

    Ok(layer)
}

pub fn load_layer_from_str(contents: &str, origin: &str) -> Result<ConfigLayer, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: origin.to_string(),
        source,
    })
}

/// Build the effective config: defaults, global file, project file, `explicit`, then environment.
pub fn load_config(project_root: Option<&Path>, explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let mut paths = Vec::new();
    if let Some(global) = global_config_path().filter(|path| path.is_file()) {
        paths.push(global);
    }
    if let Some(project) = project_root.and_then(project_config_path) {
        paths.push(project);
    }
    if let Some(explicit) = explicit {
        paths.push(explicit.to_path_buf());
    }

    let mut config = Config::default();
    for path in &paths {
        tracing::debug!(path = %path.display(), "loading config layer");
        config.apply_layer(&load_layer_from_path(path)?);
    }
    apply_env(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

fn apply_env(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(model) = lookup(MODEL_ENV).filter(|value| !value.trim().is_empty()) {
        config.planner.model = model.trim().to_string();
    }
    config.planner.api_key = lookup(&config.planner.api_key_env)
        .or_else(|| lookup(API_KEY_ENV))
        .filter(|value| !value.trim().is_empty());
}
