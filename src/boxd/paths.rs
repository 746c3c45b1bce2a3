use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct BoxdPaths {
    pub boxd_home: PathBuf,
    pub vault_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub state_dir: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<BoxdPaths> {
    let home = required_home_dir()?;
    let boxd_home = env_or_default_path("BOXD_HOME", home.join(".boxdsync"));
    let cwd = env::current_dir()?;

    let vault_dir = env_or_default_path("BOXD_VAULT_DIR", cwd);
    let logs_dir = env_or_default_path("BOXD_LOGS_DIR", boxd_home.join("logs"));
    let state_dir = env_or_default_path("BOXD_STATE_DIR", boxd_home.join("state"));

    Ok(BoxdPaths {
        boxd_home,
        vault_dir,
        logs_dir,
        state_dir,
    })
}
