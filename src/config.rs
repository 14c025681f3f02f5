// ABOUTME: Loader configuration and the closed set of supported sync sources
// ABOUTME: All SQL identifiers the loader touches originate from enums defined here

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CHUNK_WIDTH: i64 = 5_000;
pub const DEFAULT_PAGE_SIZE: i64 = 2_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Role a named participant plays on an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Grantor,
    Grantee,
}

impl Role {
    /// Text stored in the `Party.role` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Grantor => "Grantor",
            Role::Grantee => "Grantee",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed enumeration of (staging table, name column, destination role)
/// combinations the party sync supports. Table and column identifiers are
/// only ever taken from here, never from user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum PartySource {
    PrimeGrantor,
    PrimeGrantee,
    MultiGrantor,
    MultiGrantee,
}

impl PartySource {
    /// All variants in the order `sync all` runs them.
    pub const ALL: [PartySource; 4] = [
        PartySource::MultiGrantor,
        PartySource::MultiGrantee,
        PartySource::PrimeGrantor,
        PartySource::PrimeGrantee,
    ];

    pub fn staging_table(&self) -> &'static str {
        match self {
            PartySource::PrimeGrantor | PartySource::PrimeGrantee => "Prime_Staging",
            PartySource::MultiGrantor | PartySource::MultiGrantee => "Multi_Staging",
        }
    }

    pub fn name_column(&self) -> &'static str {
        match self {
            PartySource::PrimeGrantor | PartySource::MultiGrantor => "Grantor",
            PartySource::PrimeGrantee | PartySource::MultiGrantee => "Grantee",
        }
    }

    pub fn role(&self) -> Role {
        match self {
            PartySource::PrimeGrantor | PartySource::MultiGrantor => Role::Grantor,
            PartySource::PrimeGrantee | PartySource::MultiGrantee => Role::Grantee,
        }
    }

    /// Stable label used for checkpoint keys and log lines.
    pub fn label(&self) -> String {
        format!(
            "party.{}.{}",
            self.staging_table().to_lowercase(),
            self.role().as_str().to_lowercase()
        )
    }
}

/// Configuration for one loader run. Built from CLI flags, optionally
/// merged over a TOML file; passed explicitly into every component.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// PostgreSQL connection string
    pub source_url: String,
    /// County scope isolating this run from other counties
    pub county_id: i32,
    /// Width of each documentID range chunk for party sync
    pub chunk_width: i64,
    /// Distinct-key page size for document sync
    pub page_size: i64,
    /// Retry attempts per chunk on transient failure
    pub max_retries: u32,
}

impl LoaderConfig {
    pub fn new(source_url: String, county_id: i32) -> Self {
        Self {
            source_url,
            county_id,
            chunk_width: DEFAULT_CHUNK_WIDTH,
            page_size: DEFAULT_PAGE_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Validate the numeric knobs before any SQL runs.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_width <= 0 {
            bail!("chunk width must be positive, got {}", self.chunk_width);
        }
        if self.page_size <= 0 {
            bail!("page size must be positive, got {}", self.page_size);
        }
        if self.county_id < 0 {
            bail!("county id must be non-negative, got {}", self.county_id);
        }
        Ok(())
    }
}

/// Optional TOML defaults file. CLI flags win over file values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub source: Option<String>,
    pub county: Option<i32>,
    pub chunk_width: Option<i64>,
    pub page_size: Option<i64>,
    pub max_retries: Option<u32>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let parsed: ConfigFile = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_source_identifiers() {
        assert_eq!(PartySource::PrimeGrantor.staging_table(), "Prime_Staging");
        assert_eq!(PartySource::PrimeGrantor.name_column(), "Grantor");
        assert_eq!(PartySource::PrimeGrantor.role(), Role::Grantor);

        assert_eq!(PartySource::MultiGrantee.staging_table(), "Multi_Staging");
        assert_eq!(PartySource::MultiGrantee.name_column(), "Grantee");
        assert_eq!(PartySource::MultiGrantee.role(), Role::Grantee);
    }

    #[test]
    fn test_party_source_labels_are_distinct() {
        let labels: std::collections::HashSet<String> =
            PartySource::ALL.iter().map(|s| s.label()).collect();
        assert_eq!(labels.len(), 4);
        assert!(labels.contains("party.prime_staging.grantor"));
        assert!(labels.contains("party.multi_staging.grantee"));
    }

    #[test]
    fn test_role_as_str_matches_stored_tags() {
        assert_eq!(Role::Grantor.as_str(), "Grantor");
        assert_eq!(Role::Grantee.as_str(), "Grantee");
    }

    #[test]
    fn test_config_validate_rejects_bad_widths() {
        let mut config = LoaderConfig::new("postgres://localhost/land".to_string(), 7);
        assert!(config.validate().is_ok());

        config.chunk_width = 0;
        assert!(config.validate().is_err());

        config.chunk_width = DEFAULT_CHUNK_WIDTH;
        config.page_size = -5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_parse() {
        let parsed: ConfigFile = toml::from_str(
            r#"
            source = "postgres://user@localhost/land"
            county = 7
            chunk_width = 1000
            "#,
        )
        .unwrap();
        assert_eq!(parsed.county, Some(7));
        assert_eq!(parsed.chunk_width, Some(1000));
        assert!(parsed.page_size.is_none());
    }
}
