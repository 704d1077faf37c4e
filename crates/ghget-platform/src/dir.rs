use std::env;
use std::path::PathBuf;

pub fn user_home() -> Option<PathBuf> {
    home::home_dir()
}

pub fn user_config() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        env::var_os("APPDATA").map(PathBuf::from)
    }
    #[cfg(target_os = "macos")]
    {
        user_home().map(|p| p.join("Library/Application Support"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| user_home().map(|p| p.join(".config")))
    }
}

pub fn user_data() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        env::var_os("LOCALAPPDATA").map(PathBuf::from)
    }
    #[cfg(target_os = "macos")]
    {
        user_home().map(|p| p.join("Library/Application Support"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| user_home().map(|p| p.join(".local/share")))
    }
}

/// `<user data>/ghget`.
pub fn app_data() -> Option<PathBuf> {
    user_data().map(|p| p.join("ghget"))
}

/// `<user config>/ghget/config.toml`.
pub fn app_config_file() -> Option<PathBuf> {
    user_config().map(|p| p.join("ghget").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_dirs_nest_under_user_dirs() {
        if let (Some(data), Some(app)) = (user_data(), app_data()) {
            assert!(app.starts_with(data));
            assert!(app.ends_with("ghget"));
        }
        if let Some(config) = app_config_file() {
            assert!(config.ends_with("ghget/config.toml"));
        }
    }

    #[test]
    fn test_user_config_platform_specific() {
        let config = user_config();
        #[cfg(target_os = "windows")]
        {
            assert!(config.is_none() || config.unwrap().to_string_lossy().contains("AppData"));
        }
        #[cfg(not(target_os = "windows"))]
        {
            assert!(config.is_none() || !config.unwrap().as_os_str().is_empty());
        }
    }
}
