// Configuration loading and parsing (auction.toml, credentials.toml).

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::engine::{TeamSeed, SKIP_SENTINEL};
use crate::gate::Credentials;

/// Admin account used when neither the environment nor credentials.toml
/// names one.
pub const DEFAULT_ADMIN_USER: &str = "admin";
pub const DEFAULT_ADMIN_PASS: &str = "auction123";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub auction: AuctionConfig,
    pub teams: Vec<TeamConfig>,
    pub credentials: CredentialsConfig,
    pub dashboard: DashboardConfig,
    pub ws_port: u16,
    pub db_path: String,
}

impl Config {
    /// Team definitions in the form the engine starts from.
    pub fn team_seeds(&self) -> Vec<TeamSeed> {
        self.teams
            .iter()
            .map(|t| TeamSeed {
                id: t.id.clone(),
                name: t.name.clone(),
                logo_url: t.logo_url.clone(),
            })
            .collect()
    }

    /// The admin account the access gate admits.
    pub fn admin_credentials(&self) -> Credentials {
        Credentials::new(
            self.credentials
                .admin_user
                .as_deref()
                .unwrap_or(DEFAULT_ADMIN_USER),
            self.credentials
                .admin_pass
                .as_deref()
                .unwrap_or(DEFAULT_ADMIN_PASS),
        )
    }
}

// ---------------------------------------------------------------------------
// auction.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire auction.toml file.
#[derive(Debug, Clone, Deserialize)]
struct AuctionFile {
    auction: AuctionConfig,
    teams: Vec<TeamConfig>,
    websocket: WebsocketSection,
    database: DatabaseSection,
    dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct WebsocketSection {
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuctionConfig {
    pub name: String,
    /// Draw order of the player categories.
    pub categories: Vec<String>,
    /// Starting purse of every team.
    pub purse: u32,
    pub players_path: String,
    #[serde(default = "default_low_purse_threshold")]
    pub low_purse_threshold: u32,
}

fn default_low_purse_threshold() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub logo_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    pub poll_interval_secs: u64,
}

impl DashboardConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub admin_user: Option<String>,
    pub admin_pass: Option<String>,
}

impl CredentialsConfig {
    /// Environment values win over the file.
    pub fn with_overrides(self, user: Option<String>, pass: Option<String>) -> Self {
        CredentialsConfig {
            admin_user: user.or(self.admin_user),
            admin_pass: pass.or(self.admin_pass),
        }
    }

    /// Whether the built-in fallback account would be used.
    pub fn uses_default(&self) -> bool {
        self.admin_user.is_none() || self.admin_pass.is_none()
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/auction.toml` and
/// (optionally) `config/credentials.toml`, both relative to `base_dir`.
///
/// Does not read the environment or copy defaults; see `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- auction.toml (required) ---
    let auction_path = config_dir.join("auction.toml");
    let auction_text = read_file(&auction_path)?;
    let auction_file: AuctionFile =
        toml::from_str(&auction_text).map_err(|e| ConfigError::ParseError {
            path: auction_path.clone(),
            source: e,
        })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        auction: auction_file.auction,
        teams: auction_file.teams,
        credentials,
        dashboard: auction_file.dashboard,
        ws_port: auction_file.websocket.port,
        db_path: auction_file.database.path,
    };

    validate(&config)?;

    Ok(config)
}

/// Config files seeded from `defaults/` on first run. Credentials are never
/// seeded; `defaults/credentials.toml.example` stays a template.
const SEEDED_FILES: &[&str] = &["auction.toml"];

/// Copy any seeded file missing from `config/` out of `defaults/`, leaving
/// files the operator already has untouched. Returns the files created.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    match (defaults_dir.is_dir(), config_dir.is_dir()) {
        (true, _) => {}
        (false, true) => return Ok(Vec::new()),
        (false, false) => {
            return Err(seed_error(format!(
                "no defaults/ or config/ directory under {}; start gavel from the project root",
                base_dir.display()
            )))
        }
    }

    std::fs::create_dir_all(&config_dir)
        .map_err(|e| seed_error(format!("cannot create {}: {e}", config_dir.display())))?;

    let mut seeded = Vec::new();
    for name in SEEDED_FILES {
        let source = defaults_dir.join(name);
        if !source.is_file() {
            continue;
        }
        let target = config_dir.join(name);
        if seed_file(&source, &target)? {
            seeded.push(target);
        }
    }
    Ok(seeded)
}

/// Copy `source` to `target` unless `target` already exists.
fn seed_file(source: &Path, target: &Path) -> Result<bool, ConfigError> {
    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(seed_error(format!("cannot create {}: {e}", target.display()))),
    };
    let mut src = std::fs::File::open(source)
        .map_err(|e| seed_error(format!("cannot open {}: {e}", source.display())))?;
    std::io::copy(&mut src, &mut dest)
        .map_err(|e| seed_error(format!("cannot copy into {}: {e}", target.display())))?;
    Ok(true)
}

fn seed_error(message: String) -> ConfigError {
    ConfigError::DefaultsCopyError { message }
}

/// Loads config relative to the current working directory, copying defaults
/// first and applying the `ADMIN_USER` / `ADMIN_PASS` environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    let mut config = load_config_from(&cwd)?;
    config.credentials = config.credentials.with_overrides(
        std::env::var("ADMIN_USER").ok(),
        std::env::var("ADMIN_PASS").ok(),
    );
    Ok(config)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let auction = &config.auction;

    if auction.categories.is_empty() {
        return Err(invalid("auction.categories", "must list at least one category"));
    }
    let mut seen = HashSet::new();
    for category in &auction.categories {
        if category.trim().is_empty() {
            return Err(invalid("auction.categories", "category names must not be empty"));
        }
        if !seen.insert(category.as_str()) {
            return Err(invalid(
                "auction.categories",
                format!("duplicate category `{category}`"),
            ));
        }
    }

    if auction.purse == 0 {
        return Err(invalid("auction.purse", "must be greater than 0"));
    }

    if auction.players_path.trim().is_empty() {
        return Err(invalid("auction.players_path", "must not be empty"));
    }

    if config.teams.is_empty() {
        return Err(invalid("teams", "must define at least one team"));
    }
    let mut team_ids = HashSet::new();
    for team in &config.teams {
        if team.id.trim().is_empty() {
            return Err(invalid("teams.id", "team ids must not be empty"));
        }
        if team.id == SKIP_SENTINEL {
            return Err(invalid(
                "teams.id",
                format!("`{SKIP_SENTINEL}` is reserved for skipping a player"),
            ));
        }
        if !team_ids.insert(team.id.as_str()) {
            return Err(invalid("teams.id", format!("duplicate team id `{}`", team.id)));
        }
    }

    if config.dashboard.poll_interval_secs == 0 {
        return Err(invalid("dashboard.poll_interval_secs", "must be greater than 0"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    /// Helper: the workspace directory holding `defaults/` (works whether
    /// `cargo test` runs from the crate directory or the workspace root).
    fn project_root() -> PathBuf {
        let cwd = std::env::current_dir().unwrap();
        cwd.ancestors()
            .find(|dir| dir.join("defaults/auction.toml").exists())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| panic!("Cannot locate defaults/ directory from CWD {:?}", cwd))
    }

    /// Helper: a scratch directory with `config/auction.toml` written from
    /// `auction_toml`.
    fn scratch_with(name: &str, auction_toml: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config/auction.toml"), auction_toml).unwrap();
        tmp
    }

    fn default_auction_toml() -> String {
        fs::read_to_string(project_root().join("defaults/auction.toml")).unwrap()
    }

    #[test]
    fn load_default_config() {
        let tmp = scratch_with("gavel_config_defaults", &default_auction_toml());
        let config = load_config_from(&tmp).expect("should load default config");

        assert_eq!(config.auction.name, "College Auction");
        assert_eq!(
            config.auction.categories,
            vec!["Platinum", "Gold", "Silver", "Bronze"]
        );
        assert_eq!(config.auction.purse, 60);
        assert_eq!(config.auction.low_purse_threshold, 10);
        assert_eq!(config.teams.len(), 4);
        assert_eq!(config.teams[0].id, "RED_HAWKS");
        assert_eq!(config.ws_port, 9001);
        assert_eq!(config.db_path, "gavel.db");
        assert_eq!(config.dashboard.poll_interval(), Duration::from_secs(5));
        assert!(config.credentials.uses_default());

        let seeds = config.team_seeds();
        assert_eq!(seeds[1].name, "Blue Beast");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_file_and_overrides() {
        let tmp = scratch_with("gavel_config_creds", &default_auction_toml());
        fs::write(
            tmp.join("config/credentials.toml"),
            "admin_user = \"ops\"\nadmin_pass = \"s3cret\"\n",
        )
        .unwrap();

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.admin_credentials(), Credentials::new("ops", "s3cret"));

        let overridden = config
            .credentials
            .clone()
            .with_overrides(None, Some("from-env".to_string()));
        assert_eq!(overridden.admin_user.as_deref(), Some("ops"));
        assert_eq!(overridden.admin_pass.as_deref(), Some("from-env"));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_credentials_fall_back_to_default_account() {
        let tmp = scratch_with("gavel_config_no_creds", &default_auction_toml());
        let config = load_config_from(&tmp).unwrap();
        assert_eq!(
            config.admin_credentials(),
            Credentials::new(DEFAULT_ADMIN_USER, DEFAULT_ADMIN_PASS)
        );
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_auction_toml_is_file_not_found() {
        let tmp = std::env::temp_dir().join("gavel_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        assert!(matches!(
            load_config_from(&tmp),
            Err(ConfigError::FileNotFound { .. })
        ));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let tmp = scratch_with("gavel_config_malformed", "[auction\nname = ");
        assert!(matches!(
            load_config_from(&tmp),
            Err(ConfigError::ParseError { .. })
        ));
        let _ = fs::remove_dir_all(&tmp);
    }

    fn expect_validation_error(name: &str, toml_text: &str, expected_field: &str) {
        let tmp = scratch_with(name, toml_text);
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, expected_field),
            other => panic!("expected ValidationError, got {other:?}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_reserved_skip_team_id() {
        let text = default_auction_toml().replacen("id = \"RED_HAWKS\"", "id = \"SKIP\"", 1);
        expect_validation_error("gavel_config_skip_id", &text, "teams.id");
    }

    #[test]
    fn rejects_duplicate_team_ids() {
        let text = default_auction_toml().replacen("id = \"BLUE_BEAST\"", "id = \"RED_HAWKS\"", 1);
        expect_validation_error("gavel_config_dup_team", &text, "teams.id");
    }

    #[test]
    fn rejects_zero_purse() {
        let text = default_auction_toml().replacen("purse = 60", "purse = 0", 1);
        expect_validation_error("gavel_config_zero_purse", &text, "auction.purse");
    }

    #[test]
    fn rejects_duplicate_categories() {
        let text = default_auction_toml().replacen("\"Bronze\"", "\"Gold\"", 1);
        expect_validation_error("gavel_config_dup_category", &text, "auction.categories");
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let text = default_auction_toml().replacen("poll_interval_secs = 5", "poll_interval_secs = 0", 1);
        expect_validation_error("gavel_config_zero_poll", &text, "dashboard.poll_interval_secs");
    }

    #[test]
    fn ensure_config_files_copies_missing_defaults_only() {
        let tmp = std::env::temp_dir().join("gavel_config_ensure");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults/auction.toml"), default_auction_toml()).unwrap();
        fs::write(tmp.join("defaults/credentials.toml.example"), "admin_user = \"x\"\n").unwrap();

        let copied = ensure_config_files(&tmp).unwrap();
        assert_eq!(copied, vec![tmp.join("config/auction.toml")]);
        assert!(!tmp.join("config/credentials.toml.example").exists());

        // Second run leaves the existing file alone.
        fs::write(tmp.join("config/auction.toml"), "edited").unwrap();
        assert!(ensure_config_files(&tmp).unwrap().is_empty());
        assert_eq!(fs::read_to_string(tmp.join("config/auction.toml")).unwrap(), "edited");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_with_only_config_dir_copies_nothing() {
        let tmp = std::env::temp_dir().join("gavel_config_only_config");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        assert!(ensure_config_files(&tmp).unwrap().is_empty());
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_ignores_unlisted_defaults() {
        let tmp = std::env::temp_dir().join("gavel_config_unlisted");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults/notes.toml"), "x = 1\n").unwrap();

        assert!(ensure_config_files(&tmp).unwrap().is_empty());
        assert!(tmp.join("config").is_dir());
        assert!(!tmp.join("config/notes.toml").exists());
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_errors_without_defaults_or_config() {
        let tmp = std::env::temp_dir().join("gavel_config_nothing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        assert!(matches!(
            ensure_config_files(&tmp),
            Err(ConfigError::DefaultsCopyError { .. })
        ));
        let _ = fs::remove_dir_all(&tmp);
    }
}
