use std::path::{Path, PathBuf};

use rebaser_core::config::{self, Config};
use rebaser_core::gemini::GeminiClient;

/// Per-repository state lives under `<repo>/.rebaser/`.
pub(crate) fn rebaser_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(".rebaser")
}

pub(crate) fn default_plan_file(repo_root: &Path) -> PathBuf {
    rebaser_dir(repo_root).join("plan.txt")
}

pub(crate) fn transcript_dir(repo_root: &Path, config: &Config) -> PathBuf {
    match config.logging.transcript_dir.as_ref() {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => repo_root.join(dir),
        None => rebaser_dir(repo_root).join("logs"),
    }
}

pub(crate) fn load_config(
    repo_root: &Path,
    explicit: Option<&Path>,
) -> Result<Config, Box<dyn std::error::Error>> {
    Ok(config::load_config(Some(repo_root), explicit)?)
}

pub(crate) fn planner_client(config: &Config) -> Result<GeminiClient, Box<dyn std::error::Error>> {
    let key = config.planner.require_api_key()?;
    Ok(GeminiClient::new(&config.planner, key))
}

pub(crate) fn short_sha(sha: &str) -> &str {
    &sha[..7.min(sha.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_dir_resolves_relative_paths_against_the_repo() {
        let repo = Path::new("/work/repo");
        let mut config = Config::default();
        assert_eq!(
            transcript_dir(repo, &config),
            PathBuf::from("/work/repo/.rebaser/logs")
        );

        config.logging.transcript_dir = Some(PathBuf::from("logs"));
        assert_eq!(transcript_dir(repo, &config), PathBuf::from("/work/repo/logs"));

        config.logging.transcript_dir = Some(PathBuf::from("/var/log/rebaser"));
        assert_eq!(
            transcript_dir(repo, &config),
            PathBuf::from("/var/log/rebaser")
        );
    }

    #[test]
    fn default_plan_file_sits_beside_project_config() {
        assert_eq!(
            default_plan_file(Path::new("/work/repo")),
            PathBuf::from("/work/repo/.rebaser/plan.txt")
        );
        assert_eq!(short_sha("abc1234def"), "abc1234");
        assert_eq!(short_sha("abc"), "abc");
    }
}
