use super::escape_like;
use crate::{ClinicError, ClinicResult, Icd10Code};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Icd10Entry {
    pub code: String,
    pub description: String,
    pub category: Option<String>,
}

/// Read access to the ICD-10 catalogue, plus bulk import for operators.
#[derive(Clone, Debug)]
pub struct Icd10Service {
    pool: PgPool,
}

impl Icd10Service {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Prefix match on the code (ignoring dots) or substring match on the description,
    /// both case-insensitive. Code matches sort first.
    pub async fn search(&self, query: &str, limit: i64) -> ClinicResult<Vec<Icd10Entry>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ClinicError::MissingFields);
        }
        let code_prefix = format!("{}%", escape_like(&query.replace('.', "").to_uppercase()));
        let description = format!("%{}%", escape_like(query));

        Ok(sqlx::query_as::<_, Icd10Entry>(
            "SELECT code, description, category FROM icd10_codes
             WHERE replace(code, '.', '') LIKE $1 OR description ILIKE $2
             ORDER BY (replace(code, '.', '') LIKE $1) DESC, code
             LIMIT $3",
        )
        .bind(code_prefix)
        .bind(description)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get(&self, code: &Icd10Code) -> ClinicResult<Icd10Entry> {
        sqlx::query_as::<_, Icd10Entry>(
            "SELECT code, description, category FROM icd10_codes WHERE code = $1",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ClinicError::NotFound("icd10"))
    }

    /// Inserts or refreshes catalogue entries, returning how many rows were written.
    pub async fn import(&self, entries: &[(Icd10Code, String)]) -> ClinicResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for (code, description) in entries {
            written += sqlx::query(
                "INSERT INTO icd10_codes (code, description, category) VALUES ($1, $2, $3)
                 ON CONFLICT (code) DO UPDATE SET
                     description = EXCLUDED.description,
                     category = EXCLUDED.category",
            )
            .bind(code.as_str())
            .bind(description)
            .bind(code.category())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        tracing::info!(written, "icd10 catalogue imported");
        Ok(written)
    }
}

/// Parses one catalogue line: `CODE<TAB or ;>Description`.
pub fn parse_catalogue_line(line: &str) -> Option<ClinicResult<(Icd10Code, String)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (code, description) = match line.split_once('\t').or_else(|| line.split_once(';')) {
        Some(parts) => parts,
        None => return Some(Err(ClinicError::invalid("line", line))),
    };
    let parsed = Icd10Code::parse(code)
        .map_err(|e| ClinicError::invalid("code", e))
        .and_then(|code| {
            let description = description.trim();
            if description.is_empty() {
                Err(ClinicError::invalid("description", "empty"))
            } else {
                Ok((code, description.to_string()))
            }
        });
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalogue_line() {
        let (code, description) = parse_catalogue_line("K021\tCaries of dentine").unwrap().unwrap();
        assert_eq!(code.as_str(), "K02.1");
        assert_eq!(description, "Caries of dentine");

        let (code, _) = parse_catalogue_line("k08.1; Loss of teeth").unwrap().unwrap();
        assert_eq!(code.as_str(), "K08.1");
    }

    #[test]
    fn test_parse_catalogue_line_skips_comments_and_blank() {
        assert!(parse_catalogue_line("   ").is_none());
        assert!(parse_catalogue_line("# dental chapter").is_none());
    }

    #[test]
    fn test_parse_catalogue_line_rejects_bad_rows() {
        assert!(parse_catalogue_line("K02.1").unwrap().is_err());
        assert!(parse_catalogue_line("XYZ\tNope").unwrap().is_err());
        assert!(parse_catalogue_line("K02.1\t  ").unwrap().is_err());
    }
}
