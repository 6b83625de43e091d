use crate::backup::exec::Environment;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::validate::{validate_file_mode, validate_no_empty_item};
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::result;
use std::time::Duration;
use validator::{Validate, ValidationError, ValidationErrors};

/// Static configuration, loaded once at startup and never mutated afterwards.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct AppConfig {
    database: DatabaseConfig,
    storage: StorageConfig,
    /// Environment label -> command prefix. An empty prefix runs on the host shell.
    #[serde(default)]
    #[builder(default)]
    environments: BTreeMap<String, Vec<String>>,
    #[serde(default, with = "humantime_serde")]
    command_timeout: Option<Duration>,
    #[serde(default)]
    #[builder(default)]
    profiles: BTreeMap<String, MaintenanceProfile>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    #[builder(into)]
    host: String,
    #[validate(length(min = 1))]
    #[builder(into)]
    user: String,
    #[builder(into)]
    password: RedactedString,
    /// Where the client, the dump tool and the compressor run
    #[builder(into)]
    environment: String,
    /// Server-internal schemas that are never backed up
    #[serde(default = "default_excluded_databases")]
    #[builder(default = default_excluded_databases())]
    excluded_databases: Vec<String>,
}

fn default_excluded_databases() -> Vec<String> {
    ["information_schema", "performance_schema", "mysql", "sys"]
        .map(String::from)
        .to_vec()
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct StorageConfig {
    /// Tier root as seen by this process; pruning walks it
    #[builder(into)]
    root: PathBuf,
    /// Tier root as seen inside the database environment, when it is mounted elsewhere
    #[builder(into)]
    environment_root: Option<PathBuf>,
    #[serde(default = "default_directory_mode")]
    #[validate(custom(function = validate_file_mode))]
    #[builder(default = default_directory_mode(), into)]
    directory_mode: String,
    #[serde(default = "default_artifact_mode")]
    #[validate(custom(function = validate_file_mode))]
    #[builder(default = default_artifact_mode(), into)]
    artifact_mode: String,
}

// The dump tool may run as another user inside the sandbox, so the database directory is
// opened to everyone. Use a narrower mode where a shared group is available.
fn default_directory_mode() -> String {
    "777".to_string()
}

fn default_artifact_mode() -> String {
    "666".to_string()
}

impl StorageConfig {
    pub fn effective_environment_root(&self) -> &Path {
        self.environment_root.as_deref().unwrap_or(&self.root)
    }
}

/// Hooks around the dump of a content-management database, plus the tables whose rows are
/// not worth keeping (caches, sessions, logs).
#[derive(Clone, Debug, Default, Serialize, Deserialize, Builder, Getters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct MaintenanceProfile {
    #[serde(default)]
    #[builder(default)]
    before: Vec<HookCommand>,
    #[serde(default)]
    #[builder(default)]
    after: Vec<HookCommand>,
    #[serde(default)]
    #[builder(default)]
    excluded_table_patterns: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Builder, Getters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct HookCommand {
    #[builder(into)]
    environment: String,
    #[builder(into)]
    command: String,
}

impl AppConfig {
    /// Reads and validates the YAML configuration at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        File::open(path)
            .map_err(Error::from)
            .and_then(|f| {
                serde_yml::from_reader::<_, AppConfig>(f)
                    .map_err(Error::from)
                    .with_msg(format!("Parse YAML config failed: {:?}", path))
            })
            .and_then(|config| {
                config
                    .validate()
                    .map_err(Error::from)
                    .map(|_| config)
                    .with_msg(format!("Config validation failed: {:?}", path))
            })
    }

    pub fn profile(&self, name: &str) -> Result<&MaintenanceProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| Error::UnknownProfile(name.to_string()))
    }

    pub fn environment(&self, name: &str) -> Result<Environment> {
        self.environments
            .get(name)
            .map(|prefix| Environment::new(name, prefix.clone()))
            .ok_or_else(|| Error::UnknownEnvironment(name.to_string()))
    }

    pub fn database_environment(&self) -> Result<Environment> {
        self.environment(self.database.environment())
    }

    /// Exclusion patterns of the profile, or none without a profile.
    pub fn excluded_table_patterns(&self, profile_name: Option<&str>) -> Result<&[String]> {
        match profile_name {
            None => Ok(&[]),
            Some(name) => Ok(self.profile(name)?.excluded_table_patterns()),
        }
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        self.database.validate()?;
        self.storage.validate()?;

        let mut errors = ValidationErrors::new();
        if let Err(e) = self.validate_environment_ref(self.database.environment()) {
            errors.add("database", e);
        }
        for (name, profile) in self.profiles.iter() {
            if let Err(e) = self.validate_profile(name, profile) {
                errors.add("profiles", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl AppConfig {
    fn validate_environment_ref(&self, name: &str) -> result::Result<(), ValidationError> {
        if self.environments.contains_key(name) {
            Ok(())
        } else {
            Err(ValidationError::new("UnknownEnvironment")
                .with_message(format!("Environment {name:?} is not defined").into()))
        }
    }

    fn validate_profile(
        &self,
        name: &str,
        profile: &MaintenanceProfile,
    ) -> result::Result<(), ValidationError> {
        validate_no_empty_item(&profile.excluded_table_patterns).map_err(|e| {
            e.with_message(format!("Profile {name:?} has an empty table pattern").into())
        })?;
        profile
            .before
            .iter()
            .chain(profile.after.iter())
            .try_for_each(|hook| self.validate_environment_ref(&hook.environment))
            .map_err(|e| {
                let message = format!("Profile {name:?}: {}", e);
                e.with_message(message.into())
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const SAMPLE: &str = r#"
database:
  host: mysql
  user: root
  password: mypassword
  environment: mysql
storage:
  root: backups/mysql
environments:
  host: []
  mysql: [docker, exec, ddb_mysql]
  php: [docker, exec, ddb_php]
command_timeout: 2h
profiles:
  drupal8:
    before:
      - environment: php
        command: drush sset system.maintenance_mode 1
      - environment: php
        command: drush cr
    after:
      - environment: php
        command: drush sset system.maintenance_mode 0
      - environment: php
        command: drush cr
    excluded_table_patterns: [cache_, accesslog, flood, search_, semaphore, sessions, watchdog]
  p1:
    excluded_table_patterns: [cache_]
"#;

    pub(crate) fn database_config() -> DatabaseConfig {
        DatabaseConfig::builder()
            .host("mysql")
            .user("root")
            .password(RedactedString::builder().inner("mypassword").build())
            .environment("mysql")
            .build()
    }

    pub(crate) fn sample_config() -> AppConfig {
        serde_yml::from_str(SAMPLE).unwrap()
    }

    /// Sample configuration with the tier root moved to `root` and every environment on the host.
    pub(crate) fn config_with_root(root: &Path) -> AppConfig {
        let mut config = sample_config();
        config.storage = StorageConfig::builder().root(root).build();
        config.environments = ["host", "mysql", "php"]
            .into_iter()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        config
    }

    pub(crate) fn with_environment(mut config: AppConfig, name: &str, prefix: Vec<String>) -> AppConfig {
        config.environments.insert(name.to_string(), prefix);
        config
    }

    #[test]
    fn test_sample_config_parses_and_validates() {
        let config = sample_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.command_timeout(), &Some(Duration::from_secs(2 * 60 * 60)));
        assert_eq!(config.storage().directory_mode(), "777");
        assert_eq!(config.storage().artifact_mode(), "666");
        assert_eq!(
            config.database().excluded_databases(),
            &vec!["information_schema", "performance_schema", "mysql", "sys"]
        );
        assert_eq!(config.profile("drupal8").unwrap().before().len(), 2);
    }

    #[test]
    fn test_unknown_profile() {
        let config = sample_config();
        match config.profile("wordpress") {
            Err(Error::UnknownProfile(name)) => assert_eq!(name, "wordpress"),
            other => panic!("Expected UnknownProfile, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_environment_lookup() {
        let config = sample_config();
        let env = config.database_environment().unwrap();
        assert_eq!(env.name().to_string(), "mysql");
        assert_eq!(env.prefix().to_vec(), vec!["docker", "exec", "ddb_mysql"]);
        assert!(matches!(
            config.environment("nope"),
            Err(Error::UnknownEnvironment(_))
        ));
    }

    #[test]
    fn test_excluded_table_patterns() {
        let config = sample_config();
        assert!(config.excluded_table_patterns(None).unwrap().is_empty());
        assert_eq!(config.excluded_table_patterns(Some("p1")).unwrap().to_vec(), vec!["cache_"]);
        assert!(config.excluded_table_patterns(Some("nope")).is_err());
    }

    #[test]
    fn test_effective_environment_root() {
        let storage = StorageConfig::builder().root("backups/mysql").build();
        assert_eq!(storage.effective_environment_root(), Path::new("backups/mysql"));

        let storage = StorageConfig::builder()
            .root("/srv/backups/mysql")
            .environment_root(PathBuf::from("/var/backups/mysql"))
            .build();
        assert_eq!(storage.effective_environment_root(), Path::new("/var/backups/mysql"));
    }

    #[test]
    fn test_validation_rejects_unknown_hook_environment() {
        let yaml = SAMPLE.replace("- environment: php\n        command: drush cr", "- environment: web\n        command: drush cr");
        let config: AppConfig = serde_yml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_database_environment() {
        let yaml = SAMPLE.replace("  environment: mysql\n", "  environment: db\n");
        let config: AppConfig = serde_yml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_mode() {
        let yaml = SAMPLE.replace("  root: backups/mysql\n", "  root: backups/mysql\n  artifact_mode: rw\n");
        let config: AppConfig = serde_yml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_pattern() {
        let yaml = SAMPLE.replace("[cache_]", "[cache_, \"\"]");
        let config: AppConfig = serde_yml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = SAMPLE.replace("command_timeout: 2h", "command_timeout: 2h\nretries: 3");
        assert!(serde_yml::from_str::<AppConfig>(&yaml).is_err());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = AppConfig::from_path(file.path()).unwrap();
        assert_eq!(config.database().host(), "mysql");
    }

    #[test]
    fn test_from_path_reports_validation_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.replace("  user: root\n", "  user: \"\"\n").as_bytes())
            .unwrap();
        let err = AppConfig::from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("Config validation failed"));
    }

    #[test]
    fn test_password_not_serialized() {
        let serialized = serde_yml::to_string(&sample_config()).unwrap();
        assert!(!serialized.contains("mypassword"));
    }
}
