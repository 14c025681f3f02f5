// ABOUTME: Party-level chunk processor - reconciles staging names into Party rows
// ABOUTME: One set-oriented anti-join insert per documentID range chunk

use anyhow::{Context, Result};
use tokio_postgres::Client;

use crate::config::PartySource;

/// Synchronizes one (staging table, name column, role) combination into
/// `Party`, one documentID range chunk at a time.
///
/// Each chunk is a single set-oriented statement: staging rows are joined
/// to in-scope documents over the external key, projected to
/// (documentID, name, role, countyID), filtered of NULL/blank names,
/// anti-joined against rows already present, and inserted. Running the
/// same chunk again inserts zero rows. The unique constraint on
/// (documentID, name, role, countyID) backstops any concurrent writer.
#[derive(Debug, Clone, Copy)]
pub struct PartySync {
    pub county_id: i32,
    pub source: PartySource,
}

impl PartySync {
    pub fn new(county_id: i32, source: PartySource) -> Self {
        Self { county_id, source }
    }

    /// Process one inclusive [start, end] documentID chunk.
    ///
    /// Returns the number of rows actually inserted (not the candidate
    /// count before exclusion).
    pub async fn process_range(&self, client: &Client, start: i64, end: i64) -> Result<u64> {
        let sql = build_party_chunk_sql(&self.source);
        let role = self.source.role().as_str();

        let inserted = client
            .execute(&sql, &[&self.county_id, &start, &end, &role])
            .await
            .with_context(|| {
                format!(
                    "Failed to sync {} chunk [{}, {}] for county {}",
                    self.source.label(),
                    start,
                    end,
                    self.county_id
                )
            })?;

        Ok(inserted)
    }
}

/// Build the chunk insert statement for a party source.
///
/// Table and column identifiers come from the closed `PartySource`
/// enumeration; scope, range, and role travel as bind parameters.
pub fn build_party_chunk_sql(source: &PartySource) -> String {
    let table = source.staging_table();
    let column = source.name_column();

    format!(
        "INSERT INTO \"Party\" (\"documentID\", \"name\", \"role\", \"countyID\") \
         SELECT DISTINCT d.\"documentID\", m.\"{column}\", $4, d.\"countyID\" \
         FROM \"Document\" d \
         JOIN \"{table}\" m ON m.\"externalKey\" = d.\"externalKey\" \
         WHERE d.\"countyID\" = $1 \
           AND d.\"documentID\" BETWEEN $2 AND $3 \
           AND m.\"{column}\" IS NOT NULL \
           AND btrim(m.\"{column}\") <> '' \
           AND NOT EXISTS ( \
             SELECT 1 FROM \"Party\" p \
             WHERE p.\"documentID\" = d.\"documentID\" \
               AND p.\"name\" = m.\"{column}\" \
               AND p.\"role\" = $4 \
               AND p.\"countyID\" = d.\"countyID\") \
         ON CONFLICT (\"documentID\", \"name\", \"role\", \"countyID\") DO NOTHING"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_chunk_sql_prime_grantor() {
        let sql = build_party_chunk_sql(&PartySource::PrimeGrantor);

        assert!(sql.contains("INSERT INTO \"Party\""));
        assert!(sql.contains("JOIN \"Prime_Staging\" m"));
        assert!(sql.contains("SELECT DISTINCT d.\"documentID\", m.\"Grantor\""));
        assert!(sql.contains("BETWEEN $2 AND $3"));
        assert!(sql.contains("btrim(m.\"Grantor\") <> ''"));
        assert!(sql.contains("NOT EXISTS"));
        assert!(sql.contains(
            "ON CONFLICT (\"documentID\", \"name\", \"role\", \"countyID\") DO NOTHING"
        ));
    }

    #[test]
    fn test_party_chunk_sql_multi_grantee() {
        let sql = build_party_chunk_sql(&PartySource::MultiGrantee);

        assert!(sql.contains("JOIN \"Multi_Staging\" m"));
        assert!(sql.contains("m.\"Grantee\" IS NOT NULL"));
        // Role is a bind parameter, never an interpolated literal
        assert!(!sql.contains("'Grantee'"));
    }

    #[test]
    fn test_party_chunk_sql_exclusion_matches_all_discriminants() {
        // The anti-join must compare every field of the destination tuple;
        // case-sensitive exact match, no normalization.
        let sql = build_party_chunk_sql(&PartySource::PrimeGrantor);
        assert!(sql.contains("p.\"documentID\" = d.\"documentID\""));
        assert!(sql.contains("p.\"name\" = m.\"Grantor\""));
        assert!(sql.contains("p.\"role\" = $4"));
        assert!(sql.contains("p.\"countyID\" = d.\"countyID\""));
        assert!(!sql.to_lowercase().contains("lower("));
    }
}
