use super::Config;
use std::path::PathBuf;

fn env_value(primary: &str, fallback: Option<&str>) -> Option<String> {
    std::env::var(primary)
        .ok()
        .or_else(|| fallback.and_then(|name| std::env::var(name).ok()))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Some(raw) = env_value("STEPFORGE_MAX_REPLANS", Some("MAX_REPLAN_ATTEMPTS"))
            && let Ok(max_replans) = raw.parse::<u32>()
        {
            self.engine.max_replans = max_replans;
        }

        if let Some(raw) = env_value("STEPFORGE_STEP_TIMEOUT_SECS", Some("STEP_TIMEOUT_SECONDS"))
            && let Ok(secs) = raw.parse::<u64>()
            && secs > 0
        {
            self.engine.default_step_timeout_secs = secs;
        }

        if let Some(raw) = env_value("STEPFORGE_MAX_PARALLEL_STEPS", Some("MAX_PARALLEL_STEPS"))
            && let Ok(parallel) = raw.parse::<usize>()
            && parallel > 0
        {
            self.engine.max_parallel_steps = parallel;
        }

        if let Some(workspace) = env_value("STEPFORGE_WORKSPACE", None) {
            self.tools.workspace_dir.clone_from(&workspace);
            self.workspace_dir = PathBuf::from(shellexpand::tilde(&workspace).as_ref());
        }

        if let Some(level) = env_value("STEPFORGE_LOG_LEVEL", None) {
            self.log_level = level.to_ascii_lowercase();
        }
    }
}
