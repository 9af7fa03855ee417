use std::path::Path;
use std::time::Duration;

use figment::Jail;
use steamgate::{InitError, Settings};

// Loading reads the process environment, so every test that loads runs
// inside a jail: its own working directory and env, restored afterwards.

fn load(path: &Path) -> Result<Settings, figment::Error> {
    Settings::load_from(path).map_err(|e| e.to_string().into())
}

#[test]
fn load_from_reads_toml_over_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "custom.toml",
            r#"
            steam_api_key = "FILEKEY"
            rate_limit = 5000
            max_queue_depth = 32
            call_timeout_seconds = 30
            "#,
        )?;

        let settings = load(&jail.directory().join("custom.toml"))?;
        assert_eq!(settings.rate_limit, 5000);
        assert_eq!(settings.max_queue_depth, Some(32));
        assert_eq!(settings.call_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(settings.steam_api_key.as_deref(), Some("FILEKEY"));
        // Untouched keys keep their defaults.
        assert_eq!(settings.burst_limit, 200);
        assert_eq!(settings.steam_api_base_url, "https://api.steampowered.com");
        Ok(())
    });
}

#[test]
fn load_picks_up_settings_file_in_working_directory() {
    Jail::expect_with(|jail| {
        jail.create_file("steamgate.toml", "burst_limit = 7\n")?;
        let settings = Settings::load().map_err(|e| e.to_string())?;
        assert_eq!(settings.burst_limit, 7);
        Ok(())
    });
}

#[test]
fn load_without_a_file_uses_defaults() {
    Jail::expect_with(|_| {
        let settings = Settings::load().map_err(|e| e.to_string())?;
        assert_eq!(settings.rate_limit, 100_000);
        Ok(())
    });
}

#[test]
fn load_from_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(matches!(
        Settings::load_from(&missing),
        Err(InitError::Config(msg)) if msg.contains("not found")
    ));
}

#[test]
fn invalid_values_are_rejected_on_load() {
    Jail::expect_with(|jail| {
        jail.create_file("zero.toml", "burst_limit = 0\n")?;
        assert!(matches!(
            Settings::load_from(&jail.directory().join("zero.toml")),
            Err(InitError::Config(_))
        ));

        jail.create_file(
            "plain.toml",
            "steam_api_base_url = \"http://steam.example.com\"\n",
        )?;
        assert!(matches!(
            Settings::load_from(&jail.directory().join("plain.toml")),
            Err(InitError::Validation(_))
        ));
        Ok(())
    });
}

#[test]
fn wrong_types_are_reported_by_figment() {
    Jail::expect_with(|jail| {
        jail.create_file("typed.toml", "rate_limit = \"lots\"\n")?;
        assert!(matches!(
            Settings::load_from(&jail.directory().join("typed.toml")),
            Err(InitError::Settings(_))
        ));
        Ok(())
    });
}

#[test]
fn prefixed_environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("steamgate.toml", "burst_window_seconds = 120\n")?;
        jail.set_env("STEAMGATE_BURST_WINDOW_SECONDS", "45");

        let settings = load(&jail.directory().join("steamgate.toml"))?;
        assert_eq!(settings.burst_window_seconds, 45);
        Ok(())
    });
}

#[test]
fn bare_steam_api_key_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("steamgate.toml", "steam_api_key = \"FILEKEY\"\n")?;
        jail.set_env("STEAM_API_KEY", "ENVKEY");

        let settings = Settings::load().map_err(|e| e.to_string())?;
        assert_eq!(settings.steam_api_key.as_deref(), Some("ENVKEY"));
        Ok(())
    });
}

#[test]
fn prefixed_key_wins_over_bare_key() {
    Jail::expect_with(|jail| {
        jail.set_env("STEAM_API_KEY", "BAREKEY");
        jail.set_env("STEAMGATE_STEAM_API_KEY", "PREFIXEDKEY");

        let settings = Settings::load().map_err(|e| e.to_string())?;
        assert_eq!(settings.steam_api_key.as_deref(), Some("PREFIXEDKEY"));
        Ok(())
    });
}

#[test]
fn only_the_key_is_read_without_prefix() {
    Jail::expect_with(|jail| {
        jail.set_env("BURST_LIMIT", "3");
        let settings = Settings::load().map_err(|e| e.to_string())?;
        assert_eq!(settings.burst_limit, 200);
        Ok(())
    });
}

#[test]
fn debug_output_hides_the_key() {
    let settings = Settings {
        steam_api_key: Some("0123456789ABCDEF0123456789ABCDEF".to_string()),
        ..Settings::default()
    };
    let printed = format!("{settings:?}");
    assert!(!printed.contains("0123456789ABCDEF"));
    assert!(printed.contains("key_"));
}
