pub mod error;
pub mod settings;

pub use error::*;
pub use settings::*;

use std::path::PathBuf;

/// 設定ファイルを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "SHIPFLOW_CONFIG_PATH";

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 SHIPFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: shipflow.local.yml, shipflow.yml
/// 3. ~/.config/shipflow/settings.yml (グローバル設定)
pub fn find_settings_file() -> Result<Option<PathBuf>> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        tracing::warn!("{} が存在しないパスを指しています: {}", CONFIG_PATH_ENV, path.display());
    }

    // 2. カレントディレクトリで検索
    let current_dir = std::env::current_dir()?;
    for filename in ["shipflow.local.yml", "shipflow.yml"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    // 3. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("shipflow").join("settings.yml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// 設定を読み込む。設定ファイルがなければデフォルト値を返す
pub fn load_settings() -> Result<Settings> {
    match find_settings_file()? {
        Some(path) => {
            tracing::debug!("Loading settings from {}", path.display());
            Settings::from_file(&path)
        }
        None => {
            tracing::debug!("No settings file found, using defaults");
            Ok(Settings::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_find_settings_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yml");
        fs::write(&config_path, "log_level: warn\n").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(config_path.as_os_str()), || {
            let result = find_settings_file().unwrap();
            assert_eq!(result, Some(config_path.clone()));

            let settings = load_settings().unwrap();
            assert_eq!(settings.log_level, "warn");
        });
    }

    #[test]
    #[serial]
    fn test_find_settings_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("shipflow.yml"), "log_level: info\n").unwrap();
        fs::write(temp_dir.path().join("shipflow.local.yml"), "log_level: trace\n").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            let result = find_settings_file().unwrap().unwrap();
            // shipflow.local.yml が優先される
            assert!(result.ends_with("shipflow.local.yml"));
        });

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_load_settings_invalid_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("broken.yml");
        fs::write(&config_path, "repositories: [").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(config_path.as_os_str()), || {
            let result = load_settings();
            assert!(matches!(result, Err(ConfigError::Parse { .. })));
        });
    }
}
