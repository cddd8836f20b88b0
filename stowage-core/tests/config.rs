use serial_test::serial;
use stowage_core::config::{ConfigError, ConfigValue, FromConfig, StowageConfig};
use std::time::Duration;

#[test]
fn test_empty_config() {
    let config = StowageConfig::empty();
    assert!(matches!(
        config.get::<String>("nonexistent"),
        Err(ConfigError::NotFound(_))
    ));
}

#[test]
fn test_set_and_get() {
    let mut config = StowageConfig::empty();
    config.set("stowage.database.url", ConfigValue::String("sqlite::memory:".into()));
    assert_eq!(
        config.get::<String>("stowage.database.url").unwrap(),
        "sqlite::memory:"
    );
}

#[test]
fn test_get_or_default() {
    let config = StowageConfig::empty();
    assert_eq!(config.get_or("missing", 42i64).unwrap(), 42);
}

#[test]
fn test_get_or_keeps_type_errors() {
    let mut config = StowageConfig::empty();
    config.set("pool", ConfigValue::String("many".into()));
    assert!(config.get_or("pool", 4u32).is_err());
}

#[test]
fn test_flatten_yaml() {
    let yaml = r#"
stowage:
  database:
    driver: sqlite
    url: "sqlite::memory:"
    pool_max: 4
  cache:
    memory:
      default_ttl: 8s
"#;
    let config = StowageConfig::from_yaml_str(yaml, "test").unwrap();

    assert_eq!(config.get::<String>("stowage.database.driver").unwrap(), "sqlite");
    assert_eq!(config.get::<u32>("stowage.database.pool_max").unwrap(), 4);
    assert_eq!(
        config.get::<Duration>("stowage.cache.memory.default_ttl").unwrap(),
        Duration::from_secs(8)
    );
}

#[test]
fn test_list_config() {
    let yaml = r#"
stowage:
  cache:
    redis:
      endpoints:
        - "127.0.0.1:6379"
        - "127.0.0.1:6380"
"#;
    let config = StowageConfig::from_yaml_str(yaml, "test").unwrap();
    let endpoints: Vec<String> = config.get("stowage.cache.redis.endpoints").unwrap();
    assert_eq!(endpoints, vec!["127.0.0.1:6379", "127.0.0.1:6380"]);
}

#[test]
fn test_invalid_yaml_is_load_error() {
    let err = StowageConfig::from_yaml_str("stowage: [unclosed", "test").unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

struct Greeting {
    text: String,
    repeat: u32,
}

impl FromConfig for Greeting {
    fn prefix() -> &'static str {
        "greeting"
    }

    fn from_config(config: &StowageConfig) -> Result<Self, ConfigError> {
        Ok(Greeting {
            text: config.get("greeting.text")?,
            repeat: config.get_or("greeting.repeat", 1)?,
        })
    }
}

#[test]
fn test_typed_section() {
    let config = StowageConfig::from_yaml_str("greeting:\n  text: hi\n", "test").unwrap();
    let greeting: Greeting = config.section().unwrap();
    assert_eq!(greeting.text, "hi");
    assert_eq!(greeting.repeat, 1);
}

#[test]
#[serial]
fn test_profile_file_overrides_base() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("stowage.yaml"),
        "stowage:\n  database:\n    url: base\n    pool_max: 2\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("stowage-prod.yaml"),
        "stowage:\n  database:\n    url: prod\n",
    )
    .unwrap();

    let config = StowageConfig::load_from(dir.path(), "prod").unwrap();
    assert_eq!(config.profile(), "prod");
    assert_eq!(config.get::<String>("stowage.database.url").unwrap(), "prod");
    assert_eq!(config.get::<u32>("stowage.database.pool_max").unwrap(), 2);
}

#[test]
#[serial]
fn test_env_overrides_yaml() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("stowage.yaml"),
        "stowage:\n  database:\n    pool_max: 2\n",
    )
    .unwrap();

    std::env::set_var("STOWAGE_DATABASE_POOL_MAX", "9");
    let config = StowageConfig::load_from(dir.path(), "dev");
    std::env::remove_var("STOWAGE_DATABASE_POOL_MAX");

    assert_eq!(config.unwrap().get::<u32>("stowage.database.pool_max").unwrap(), 9);
}

#[test]
#[serial]
fn test_missing_files_are_fine() {
    let dir = tempfile::tempdir().unwrap();
    let config = StowageConfig::load_from(dir.path(), "dev").unwrap();
    assert!(!config.contains_key("stowage.database.url"));
}
