//! Configuration files, `.env` loading and overrides.

use std::collections::HashMap;
use std::fs;

use strata::config::{ConfigParser, ConfigValidator, EngineConfig, find_config_file};
use strata::error::{ConfigError, StrataError};
use strata::provider::ProviderContext;

const CONFIG: &str = r"
project:
  name: web-server
  environment: staging
provider:
  name: simulated
  region: eu-west-3
  settings:
    profile: deploy
executor:
  parallelism: 6
";

#[test]
fn loads_config_found_in_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("strata.yaml"), CONFIG).unwrap();
    let nested = dir.path().join("infra").join("envs");
    fs::create_dir_all(&nested).unwrap();

    let path = find_config_file(&nested).unwrap();
    let config = ConfigParser::new().load_file(&path).unwrap();

    assert_eq!(config.full_name(), "web-server-staging");
    assert_eq!(config.provider.region, "eu-west-3");
    assert_eq!(config.executor.parallelism, 6);
    assert!(ConfigValidator::new().validate(&config).is_ok());

    let context = ProviderContext::from_config(&config);
    assert_eq!(context.project, "web-server");
    assert_eq!(context.environment, "staging");
    assert_eq!(context.region, "eu-west-3");
    assert_eq!(context.settings["profile"], "deploy");
}

#[test]
fn yaml_prefers_first_matching_file_name() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("strata.yml"), "project:\n  name: from-yml\n").unwrap();
    fs::write(dir.path().join("strata.yaml"), "project:\n  name: from-yaml\n").unwrap();

    let path = find_config_file(dir.path()).unwrap();
    let config = ConfigParser::new().load_file(path).unwrap();
    assert_eq!(config.project.name, "from-yaml");
}

#[test]
fn overrides_apply_on_top_of_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strata.yaml");
    fs::write(&path, CONFIG).unwrap();
    let mut config = ConfigParser::new().load_file(&path).unwrap();

    let vars = HashMap::from([
        ("STRATA_PROJECT_NAME", "api"),
        ("STRATA_EXECUTOR_PARALLELISM", "2"),
    ]);
    ConfigParser::apply_env_overrides(&mut config, |name| vars.get(name).map(|v| (*v).to_string()))
        .unwrap();

    assert_eq!(config.project.name, "api");
    assert_eq!(config.project.environment, "staging");
    assert_eq!(config.provider.region, "eu-west-3");
    assert_eq!(config.executor.parallelism, 2);
}

#[test]
fn dotenv_file_is_loaded_from_base_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(".env"),
        "STRATA_CONFIG_TEST_MARKER=from-dotenv\n",
    )
    .unwrap();

    ConfigParser::new()
        .with_base_path(dir.path())
        .load_dotenv()
        .unwrap();

    assert_eq!(
        std::env::var("STRATA_CONFIG_TEST_MARKER").as_deref(),
        Ok("from-dotenv")
    );
}

#[test]
fn missing_dotenv_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(
        ConfigParser::new()
            .with_base_path(dir.path())
            .load_dotenv()
            .is_ok()
    );
}

#[test]
fn invalid_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strata.yaml");
    fs::write(
        &path,
        "project:\n  name: web\nexecutor:\n  parallelism: 0\n",
    )
    .unwrap();

    let config = ConfigParser::new().load_file(&path).unwrap();
    let err = ConfigValidator::new().validate(&config).unwrap_err();
    assert!(matches!(
        err,
        StrataError::Config(ConfigError::ValidationError { field: Some(ref f), .. })
            if f == "executor.parallelism"
    ));

    fs::write(&path, "project:\n  name: web\nexecutor:\n  parallelism: lots\n").unwrap();
    let err = ConfigParser::new().load_file(&path).unwrap_err();
    assert!(matches!(err, StrataError::Config(ConfigError::ParseError { .. })));
}

#[test]
fn defaults_validate() {
    let config = EngineConfig::new("web-server");
    let result = ConfigValidator::new().validate(&config).unwrap();
    assert!(result.is_valid());
}
