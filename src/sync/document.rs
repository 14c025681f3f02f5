// ABOUTME: Document-level chunk processor - pages the distinct external-key domain
// ABOUTME: Projects one canonical Document per (externalKey, county) not yet present

use anyhow::{Context, Result};
use tokio_postgres::Client;

/// Result of processing one page of the distinct-key domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOutcome {
    /// Distinct keys fetched for this page; zero means the domain is exhausted
    pub fetched: usize,
    /// Document rows actually inserted
    pub inserted: u64,
}

/// Synchronizes canonical `Document` rows from the prime staging table.
///
/// Canonical documents do not exist yet at this stage, so there is no id
/// range to partition; the domain is the ordered set of distinct external
/// keys in staging, walked in fixed-size offset pages. A page that returns
/// zero keys ends the job cleanly.
#[derive(Debug, Clone, Copy)]
pub struct DocumentSync {
    pub county_id: i32,
}

impl DocumentSync {
    pub fn new(county_id: i32) -> Self {
        Self { county_id }
    }

    /// Process one page: fetch the next window of distinct keys, then
    /// insert a Document for each key that has none for this county.
    pub async fn process_page(
        &self,
        client: &Client,
        offset: i64,
        limit: i64,
    ) -> Result<PageOutcome> {
        let keys = self.fetch_key_page(client, offset, limit).await?;
        if keys.is_empty() {
            return Ok(PageOutcome {
                fetched: 0,
                inserted: 0,
            });
        }

        let inserted = client
            .execute(DOCUMENT_PAGE_INSERT_SQL, &[&keys, &self.county_id])
            .await
            .with_context(|| {
                format!(
                    "Failed to sync document page at offset {} for county {}",
                    offset, self.county_id
                )
            })?;

        Ok(PageOutcome {
            fetched: keys.len(),
            inserted,
        })
    }

    /// Next page of distinct external-key values, in stable order.
    async fn fetch_key_page(
        &self,
        client: &Client,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<String>> {
        let rows = client
            .query(
                "SELECT DISTINCT \"externalKey\" FROM \"Prime_Staging\" \
                 WHERE \"externalKey\" IS NOT NULL \
                 ORDER BY \"externalKey\" LIMIT $1 OFFSET $2",
                &[&limit, &offset],
            )
            .await
            .with_context(|| format!("Failed to fetch key page at offset {}", offset))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

/// One candidate Document per key in the page, excluding keys that already
/// have a Document for the county. DISTINCT ON collapses multi-row
/// instruments to a single canonical record; ON CONFLICT is the constraint
/// backstop against a concurrent writer.
const DOCUMENT_PAGE_INSERT_SQL: &str =
    "INSERT INTO \"Document\" (\"externalKey\", \"countyID\", \"volume\", \"page\", \
       \"filingDate\", \"fileStampDate\", \"remarks\", \"legalDescription\", \"subBlock\", \
       \"abstractID\", \"acres\", \"instrumentType\", \"clerkNumber\", \"lienAmount\", \
       \"referenceNumber\") \
     SELECT DISTINCT ON (s.\"externalKey\") s.\"externalKey\", $2, s.\"Volume\", s.\"Page\", \
       s.\"Filing_Date\", s.\"Instrument_Date\", s.\"Remarks\", s.\"Legal_Description\", \
       s.\"Sub_Block_Lot\", s.\"Abst_Svy\", s.\"Acres\", s.\"Book\", s.\"Clerk_Number\", \
       s.\"Lien_Amount\", s.\"GF_Number\" \
     FROM \"Prime_Staging\" s \
     WHERE s.\"externalKey\" = ANY($1) \
       AND NOT EXISTS ( \
         SELECT 1 FROM \"Document\" d \
         WHERE d.\"externalKey\" = s.\"externalKey\" AND d.\"countyID\" = $2) \
     ORDER BY s.\"externalKey\" \
     ON CONFLICT (\"externalKey\", \"countyID\") DO NOTHING";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_insert_sql_shape() {
        assert!(DOCUMENT_PAGE_INSERT_SQL.contains("INSERT INTO \"Document\""));
        assert!(DOCUMENT_PAGE_INSERT_SQL.contains("DISTINCT ON (s.\"externalKey\")"));
        assert!(DOCUMENT_PAGE_INSERT_SQL.contains("= ANY($1)"));
        assert!(DOCUMENT_PAGE_INSERT_SQL.contains("NOT EXISTS"));
        assert!(
            DOCUMENT_PAGE_INSERT_SQL.contains("ON CONFLICT (\"externalKey\", \"countyID\") DO NOTHING")
        );
    }

    #[test]
    fn test_document_insert_sql_column_projection() {
        // Staging descriptive fields map onto canonical Document columns
        for staging_col in [
            "\"Volume\"",
            "\"Filing_Date\"",
            "\"Instrument_Date\"",
            "\"Legal_Description\"",
            "\"Sub_Block_Lot\"",
            "\"Abst_Svy\"",
            "\"Clerk_Number\"",
            "\"Lien_Amount\"",
            "\"GF_Number\"",
        ] {
            assert!(
                DOCUMENT_PAGE_INSERT_SQL.contains(staging_col),
                "missing staging column {}",
                staging_col
            );
        }
        assert!(DOCUMENT_PAGE_INSERT_SQL.contains("\"referenceNumber\""));
    }

    #[test]
    fn test_empty_page_outcome_signals_exhaustion() {
        let outcome = PageOutcome {
            fetched: 0,
            inserted: 0,
        };
        assert_eq!(outcome.fetched, 0);
    }
}
