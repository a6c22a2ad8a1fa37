use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::models::{DuplicatePolicy, MeterMode};
use crate::profiles::{ExtractionProfile, ProfileKind};
use crate::time_utils::YearMonth;

// ── MeterGuarantee ─────────────────────────────────────────────────────────────

/// A contracted minimum consumption for one meter, given as `"<meter>=<kWh>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterGuarantee {
    pub meter: String,
    pub threshold: f64,
}

/// clap value parser for `--guarantee`.
pub fn parse_guarantee(value: &str) -> std::result::Result<MeterGuarantee, String> {
    let (meter, threshold) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("expected <meter>=<kWh>, got '{}'", value))?;
    let meter = meter.trim();
    if meter.is_empty() {
        return Err(format!("missing meter name in '{}'", value));
    }
    let threshold: f64 = threshold
        .trim()
        .replace(',', "")
        .parse()
        .map_err(|_| format!("invalid guarantee '{}'", threshold.trim()))?;
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(format!("guarantee must be a non-negative number, got {}", threshold));
    }
    Ok(MeterGuarantee {
        meter: meter.to_string(),
        threshold,
    })
}

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Electricity billing report dashboard
#[derive(Parser, Debug, Clone)]
#[command(
    name = "billing-dashboard",
    about = "Aggregate monthly electricity billing workbooks into usage, cost and discount views",
    version
)]
pub struct Settings {
    /// Workbook files or directories to scan
    #[arg(default_value = ".")]
    pub inputs: Vec<PathBuf>,

    /// Sheet to read in every workbook (defaults to the first sheet of the first workbook)
    #[arg(long)]
    pub sheet: Option<String>,

    /// Report layout
    #[arg(long, default_value = "single-sheet", value_parser = ["single-sheet", "workbook"])]
    pub profile: String,

    /// JSON file with a custom extraction profile (overrides --profile)
    #[arg(long)]
    pub profile_file: Option<PathBuf>,

    /// First month of the range (YYYY-MM)
    #[arg(long)]
    pub start: Option<YearMonth>,

    /// Last month of the range, inclusive (YYYY-MM)
    #[arg(long)]
    pub end: Option<YearMonth>,

    /// View to render
    #[arg(long, default_value = "all", value_parser = ["summary", "distribution", "cost", "forecast", "meters", "all"])]
    pub view: String,

    /// Fields read from meter sheets
    #[arg(long, default_value = "energy", value_parser = ["energy", "full"])]
    pub meter_mode: String,

    /// Minimum guarantee for a meter, e.g. "Meter 1=120000" (repeatable)
    #[arg(long = "guarantee", value_parser = parse_guarantee)]
    pub guarantees: Vec<MeterGuarantee>,

    /// Handling of reports sharing a billing date
    #[arg(long, default_value = "warn", value_parser = ["warn", "keep-first"])]
    pub duplicates: String,

    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,

    /// Set when `--clear` removed the saved configuration.
    #[arg(skip)]
    pub config_cleared: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.billing-dashboard/last_used.json`.
///
/// Only presentation state is kept. Anything that changes what is extracted
/// or totalled comes from the current invocation.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
}

impl LastUsedParams {
    /// `~/.billing-dashboard/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// The config path rooted at `base_dir`.
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".billing-dashboard").join("last_used.json")
    }

    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to `path`, creating parent directories.
    pub fn save_to(&self, path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    pub fn clear_at(path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments, fill unset options from the last run and
    /// persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            match LastUsedParams::clear_at(config_path) {
                Ok(()) => settings.config_cleared = true,
                Err(e) => tracing::warn!("Could not clear {}: {}", config_path.display(), e),
            }
            return settings.apply_debug();
        }

        let last = LastUsedParams::load_from(config_path);

        // clap ids are field names, not flag spellings.
        if !is_arg_explicitly_set(&matches, "view") {
            if let Some(v) = last.view {
                settings.view = v;
            }
        }

        settings = settings.apply_debug();

        let params = LastUsedParams::from(&settings);
        if let Err(e) = params.save_to(config_path) {
            tracing::warn!("Could not save {}: {}", config_path.display(), e);
        }

        settings
    }

    fn apply_debug(mut self) -> Self {
        if self.debug {
            self.log_level = "DEBUG".to_string();
        }
        self
    }

    /// The active extraction profile; `--profile-file` wins over `--profile`.
    pub fn extraction_profile(&self) -> Result<ExtractionProfile> {
        match &self.profile_file {
            Some(path) => ExtractionProfile::from_file(path),
            None => Ok(self.profile.parse::<ProfileKind>()?.profile()),
        }
    }

    pub fn duplicate_policy(&self) -> Result<DuplicatePolicy> {
        self.duplicates.parse()
    }

    pub fn meter_mode(&self) -> Result<MeterMode> {
        self.meter_mode.parse()
    }

    /// Guarantee threshold configured for `meter`, if any. Later flags win.
    pub fn guarantee_for(&self, meter: &str) -> Option<f64> {
        self.guarantees
            .iter()
            .rev()
            .find(|g| g.meter == meter)
            .map(|g| g.threshold)
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            view: Some(s.view.clone()),
        }
    }
}

/// `true` when `name` came from the command line rather than a default.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BillingError;
    use tempfile::TempDir;

    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    fn run(tmp: &TempDir, args: &[&str]) -> Settings {
        let mut argv: Vec<std::ffi::OsString> = vec!["billing-dashboard".into()];
        argv.extend(args.iter().map(|a| a.into()));
        Settings::load_with_last_used_impl(argv, &tmp_config_path(tmp))
    }

    // ── LastUsedParams ────────────────────────────────────────────────────────

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        let params = LastUsedParams {
            view: Some("forecast".to_string()),
        };
        params.save_to(&path).expect("save");
        assert_eq!(LastUsedParams::load_from(&path), params);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_last_used_params_default_when_missing_or_corrupt() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());
    }

    #[test]
    fn test_last_used_params_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");
        assert!(path.exists());
        LastUsedParams::clear_at(&path).expect("clear");
        assert!(!path.exists());
        // Clearing twice is fine.
        LastUsedParams::clear_at(&path).expect("clear again");
    }

    // ── CLI parsing ───────────────────────────────────────────────────────────

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::parse_from(["billing-dashboard"]);
        assert_eq!(settings.inputs, vec![PathBuf::from(".")]);
        assert!(settings.sheet.is_none());
        assert_eq!(settings.profile, "single-sheet");
        assert_eq!(settings.view, "all");
        assert_eq!(settings.meter_mode, "energy");
        assert_eq!(settings.duplicates, "warn");
        assert!(settings.guarantees.is_empty());
        assert!(settings.start.is_none());
        assert!(!settings.json);
        assert_eq!(settings.log_level, "INFO");
        assert!(!settings.debug);
    }

    #[test]
    fn test_settings_cli_range_and_inputs() {
        let settings = Settings::parse_from([
            "billing-dashboard",
            "reports/2024",
            "extra.xlsx",
            "--start",
            "2024-01",
            "--end",
            "2024-06",
        ]);
        assert_eq!(settings.inputs.len(), 2);
        assert_eq!(settings.start, YearMonth::new(2024, 1));
        assert_eq!(settings.end, YearMonth::new(2024, 6));
    }

    #[test]
    fn test_settings_cli_rejects_bad_month() {
        let result = Settings::try_parse_from(["billing-dashboard", "--start", "2024-13"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_cli_guarantees() {
        let settings = Settings::parse_from([
            "billing-dashboard",
            "--guarantee",
            "Meter 1=120,000",
            "--guarantee",
            "Meter 2=5000",
            "--guarantee",
            "Meter 1=130000",
        ]);
        assert_eq!(settings.guarantees.len(), 3);
        assert_eq!(settings.guarantee_for("Meter 1"), Some(130_000.0));
        assert_eq!(settings.guarantee_for("Meter 2"), Some(5_000.0));
        assert_eq!(settings.guarantee_for("Meter 3"), None);
    }

    // ── parse_guarantee ───────────────────────────────────────────────────────

    #[test]
    fn test_parse_guarantee_errors() {
        assert!(parse_guarantee("Meter 1").is_err());
        assert!(parse_guarantee("=100").is_err());
        assert!(parse_guarantee("Meter 1=abc").is_err());
        assert!(parse_guarantee("Meter 1=-5").is_err());
        assert_eq!(parse_guarantee(" Meter 3 = 0 ").unwrap().threshold, 0.0);
    }

    // ── typed accessors ───────────────────────────────────────────────────────

    #[test]
    fn test_extraction_profile_from_flag() {
        let settings = Settings::parse_from(["billing-dashboard", "--profile", "workbook"]);
        assert_eq!(settings.extraction_profile().unwrap(), ExtractionProfile::workbook());
    }

    #[test]
    fn test_extraction_profile_file_wins() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("custom.json");
        let mut custom = ExtractionProfile::workbook();
        custom.name = "site-b".to_string();
        std::fs::write(&path, serde_json::to_string(&custom).unwrap()).unwrap();

        let settings = Settings::parse_from([
            "billing-dashboard",
            "--profile-file",
            path.to_str().unwrap(),
        ]);
        assert_eq!(settings.extraction_profile().unwrap().name, "site-b");
    }

    #[test]
    fn test_extraction_profile_file_missing() {
        let settings =
            Settings::parse_from(["billing-dashboard", "--profile-file", "/nonexistent/p.json"]);
        assert!(matches!(settings.extraction_profile(), Err(BillingError::Io(_))));
    }

    #[test]
    fn test_policy_accessors() {
        let settings = Settings::parse_from([
            "billing-dashboard",
            "--duplicates",
            "keep-first",
            "--meter-mode",
            "full",
        ]);
        assert_eq!(settings.duplicate_policy().unwrap(), DuplicatePolicy::KeepFirst);
        assert_eq!(settings.meter_mode().unwrap(), MeterMode::Full);
    }

    // ── load_with_last_used ───────────────────────────────────────────────────

    #[test]
    fn test_load_with_last_used_merges_persisted_view() {
        let tmp = TempDir::new().expect("tempdir");
        LastUsedParams {
            view: Some("meters".to_string()),
        }
        .save_to(&tmp_config_path(&tmp))
        .expect("save");

        let settings = run(&tmp, &[]);
        assert_eq!(settings.view, "meters");
    }

    #[test]
    fn test_load_with_last_used_ignores_extraction_inputs() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"view":"cost","profile":"workbook","sheet":"Report","meter_mode":"full"}"#,
        )
        .unwrap();

        let settings = run(&tmp, &[]);
        assert_eq!(settings.view, "cost");
        assert_eq!(settings.profile, "single-sheet");
        assert!(settings.sheet.is_none());
        assert_eq!(settings.meter_mode, "energy");

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(!saved.contains("profile"));
        assert!(!saved.contains("sheet"));
    }

    #[test]
    fn test_load_with_last_used_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        LastUsedParams {
            view: Some("meters".to_string()),
        }
        .save_to(&tmp_config_path(&tmp))
        .expect("save");

        let settings = run(&tmp, &["--view", "cost"]);
        assert_eq!(settings.view, "cost");
    }

    #[test]
    fn test_load_with_last_used_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");

        let settings = run(&tmp, &["--clear"]);
        assert!(!path.exists(), "file must be gone after --clear");
        assert!(settings.config_cleared);
    }

    #[test]
    fn test_load_with_last_used_clear_failure_not_reported_as_cleared() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        // A directory at the file path makes remove_file fail.
        std::fs::create_dir_all(&path).unwrap();

        let settings = run(&tmp, &["--clear"]);
        assert!(path.exists());
        assert!(!settings.config_cleared);
    }

    #[test]
    fn test_load_without_clear_leaves_flag_unset() {
        let tmp = TempDir::new().expect("tempdir");
        assert!(!run(&tmp, &[]).config_cleared);
    }

    #[test]
    fn test_load_with_last_used_persists_after_run() {
        let tmp = TempDir::new().expect("tempdir");
        run(&tmp, &["--view", "forecast"]);

        let loaded = LastUsedParams::load_from(&tmp_config_path(&tmp));
        assert_eq!(loaded.view.as_deref(), Some("forecast"));
    }

    #[test]
    fn test_load_with_last_used_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = run(&tmp, &["--debug", "--log-level", "ERROR"]);
        assert_eq!(settings.log_level, "DEBUG");
    }
}
