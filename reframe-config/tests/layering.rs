use std::fs;
use std::time::Duration;

use reframe_config::{
    ConfigGuardRailError, ConfigLoadError, ConfigLoader, ConfigLoaderOptions,
    ConfigSource,
};
use tempfile::TempDir;

fn options_in(dir: &TempDir) -> ConfigLoaderOptions {
    ConfigLoaderOptions {
        search_root: Some(dir.path().to_path_buf()),
        ..ConfigLoaderOptions::default()
    }
}

const NO_VARS: [(&str, &str); 0] = [];

#[test]
fn empty_root_yields_defaults_with_token_warning() {
    let dir = tempfile::tempdir().unwrap();
    let load = ConfigLoader::with_vars(options_in(&dir), NO_VARS).load().unwrap();

    assert_eq!(load.source, ConfigSource::Default);
    assert_eq!(load.config.server.base_url, "http://localhost:8000");
    assert_eq!(load.warnings.len(), 1);
}

#[test]
fn default_file_is_discovered_under_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("config")).unwrap();
    let path = dir.path().join("config/reframe.toml");
    fs::write(
        &path,
        r#"
        [server]
        base_url = "api.example.com/"
        access_token = "abc"

        [polling]
        interval_ms = 2000
        stall_after_ms = 60000
        "#,
    )
    .unwrap();

    let load = ConfigLoader::with_vars(options_in(&dir), NO_VARS).load().unwrap();
    assert_eq!(load.source, ConfigSource::File(path));
    assert_eq!(load.config.server.base_url, "http://api.example.com");
    assert!(load.warnings.is_empty(), "{:?}", load.warnings);

    let poller = load.config.poller_config();
    assert_eq!(poller.interval, Duration::from_secs(2));
    assert_eq!(poller.stall_after, Some(Duration::from_secs(60)));
}

#[test]
fn env_path_beats_inline_json_and_default_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("reframe.toml"), "[polling]\ninterval_ms = 9000\n").unwrap();
    let explicit = dir.path().join("custom.json");
    fs::write(&explicit, r#"{"polling": {"interval_ms": 1500}}"#).unwrap();

    let load = ConfigLoader::with_vars(
        options_in(&dir),
        [
            ("REFRAME_CONFIG_PATH", explicit.to_str().unwrap()),
            ("REFRAME_CONFIG_JSON", r#"{"polling": {"interval_ms": 4000}}"#),
        ],
    )
    .load()
    .unwrap();

    assert_eq!(load.source, ConfigSource::EnvPath(explicit));
    assert_eq!(load.config.polling.interval_ms, 1_500);
}

#[test]
fn inline_json_beats_default_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("reframe.toml"), "[polling]\ninterval_ms = 9000\n").unwrap();

    let load = ConfigLoader::with_vars(
        options_in(&dir),
        [("REFRAME_CONFIG_JSON", r#"{"polling": {"interval_ms": 4000}}"#)],
    )
    .load()
    .unwrap();

    assert_eq!(load.source, ConfigSource::EnvInline);
    assert_eq!(load.config.polling.interval_ms, 4_000);
}

#[test]
fn env_overrides_apply_on_top_of_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("reframe.toml"),
        "[server]\nbase_url = \"http://file.example.com\"\n",
    )
    .unwrap();

    let load = ConfigLoader::with_vars(
        options_in(&dir),
        [
            ("REFRAME_BASE_URL", "https://env.example.com/"),
            ("REFRAME_TOKEN", "from-env"),
            ("REFRAME_POLL_INTERVAL_MS", "45000"),
        ],
    )
    .load()
    .unwrap();

    let server = &load.config.server;
    assert_eq!(server.base_url, "https://env.example.com");
    assert_eq!(server.access_token.as_deref(), Some("from-env"));
    assert_eq!(load.config.polling.interval_ms, 45_000);
    // Raised alongside the interval so the guard rail holds.
    assert_eq!(load.config.polling.backoff_max_ms, 45_000);
}

#[test]
fn dotenv_fills_gaps_without_overriding_environment() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(".env"),
        "REFRAME_TOKEN=dotenv-token\nREFRAME_BASE_URL=http://dotenv.example.com\n",
    )
    .unwrap();

    let load = ConfigLoader::with_vars(
        options_in(&dir),
        [("REFRAME_BASE_URL", "http://real-env.example.com")],
    )
    .load()
    .unwrap();

    assert_eq!(load.config.server.access_token.as_deref(), Some("dotenv-token"));
    assert_eq!(load.config.server.base_url, "http://real-env.example.com");
}

#[test]
fn skip_dotenv_ignores_env_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(".env"), "REFRAME_TOKEN=dotenv-token\n").unwrap();

    let options = ConfigLoaderOptions {
        skip_dotenv: true,
        ..options_in(&dir)
    };
    let load = ConfigLoader::with_vars(options, NO_VARS).load().unwrap();
    assert_eq!(load.config.server.access_token, None);
}

#[test]
fn missing_explicit_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let options = ConfigLoaderOptions {
        config_path: Some(dir.path().join("absent.toml")),
        ..options_in(&dir)
    };
    let err = ConfigLoader::with_vars(options, NO_VARS).load().unwrap_err();
    assert!(matches!(err, ConfigLoadError::FileIo { .. }), "{err:?}");
}

#[test]
fn invalid_polling_fails_guard_rails() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("reframe.toml"),
        "[polling]\ninterval_ms = 1000\nstall_after_ms = 500\n",
    )
    .unwrap();

    let err = ConfigLoader::with_vars(options_in(&dir), NO_VARS).load().unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::StallWithinInterval {
            interval_ms: 1000,
            stall_after_ms: 500,
        })
    ));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("reframe.toml"), "[polling\n").unwrap();

    let err = ConfigLoader::with_vars(options_in(&dir), NO_VARS).load().unwrap_err();
    assert!(matches!(err, ConfigLoadError::Parse(_)), "{err:?}");
}
