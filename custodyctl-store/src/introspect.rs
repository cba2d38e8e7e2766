//! Native schema introspection through `information_schema` and `pg_catalog`
//!
//! Parameters are positional binds compared against qualified columns, so a
//! parameter can never be confused with the column it is compared to.

use serde::Serialize;
use sqlx::{FromRow, PgConnection};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
}

/// JSON-serializable description of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub exists: bool,
    pub columns: Vec<ColumnInfo>,
    pub row_level_security: bool,
    pub policies: Vec<String>,
    pub constraints: Vec<String>,
}

pub async fn table_exists(conn: &mut PgConnection, table: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM information_schema.tables t
            WHERE t.table_schema = current_schema()
              AND t.table_name = $1
        )
        "#,
    )
    .bind(table)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

pub async fn column_exists(conn: &mut PgConnection, table: &str, column: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM information_schema.columns c
            WHERE c.table_schema = current_schema()
              AND c.table_name = $1
              AND c.column_name = $2
        )
        "#,
    )
    .bind(table)
    .bind(column)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

/// Columns in ordinal order (empty when the table does not exist).
pub async fn columns(conn: &mut PgConnection, table: &str) -> Result<Vec<ColumnInfo>> {
    let columns = sqlx::query_as::<_, ColumnInfo>(
        r#"
        SELECT
            c.column_name::text AS name,
            c.data_type::text AS data_type,
            (c.is_nullable = 'YES') AS is_nullable,
            c.column_default::text AS "default"
        FROM information_schema.columns c
        WHERE c.table_schema = current_schema()
          AND c.table_name = $1
        ORDER BY c.ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;
    Ok(columns)
}

pub async fn describe_table(conn: &mut PgConnection, table: &str) -> Result<TableSummary> {
    if !table_exists(conn, table).await? {
        return Ok(TableSummary {
            table: table.to_owned(),
            exists: false,
            columns: Vec::new(),
            row_level_security: false,
            policies: Vec::new(),
            constraints: Vec::new(),
        });
    }

    let columns = columns(conn, table).await?;

    let (row_level_security,): (bool,) = sqlx::query_as(
        r#"
        SELECT cls.relrowsecurity
        FROM pg_class cls
        JOIN pg_namespace ns ON ns.oid = cls.relnamespace
        WHERE ns.nspname = current_schema()
          AND cls.relname = $1
        "#,
    )
    .bind(table)
    .fetch_one(&mut *conn)
    .await?;

    let policies: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT p.policyname::text
        FROM pg_policies p
        WHERE p.schemaname = current_schema()
          AND p.tablename = $1
        ORDER BY p.policyname
        "#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    let constraints: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT tc.constraint_name::text
        FROM information_schema.table_constraints tc
        WHERE tc.table_schema = current_schema()
          AND tc.table_name = $1
          AND tc.constraint_type <> 'CHECK'
        UNION
        SELECT con.conname::text
        FROM pg_constraint con
        JOIN pg_class rel ON rel.oid = con.conrelid
        JOIN pg_namespace ns ON ns.oid = rel.relnamespace
        WHERE ns.nspname = current_schema()
          AND rel.relname = $1
          AND con.contype = 'c'
        ORDER BY 1
        "#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    Ok(TableSummary {
        table: table.to_owned(),
        exists: true,
        columns,
        row_level_security,
        policies: policies.into_iter().map(|(name,)| name).collect(),
        constraints: constraints.into_iter().map(|(name,)| name).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn describes_custody_table() {
        let store = testing::store().await;
        let mut conn = store.pool().acquire().await.unwrap();

        let summary = describe_table(&mut conn, "cash_custody").await.unwrap();
        assert!(summary.exists);
        assert!(summary.row_level_security);
        assert!(summary.columns.iter().any(|c| c.name == "original_custody_id" && c.is_nullable));
        assert!(summary.policies.contains(&"cash_custody_select".to_string()));
        assert!(summary
            .constraints
            .contains(&"cash_custody_return_has_origin".to_string()));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["table"], "cash_custody");
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn missing_table_is_reported_not_failed() {
        let store = testing::store().await;
        let mut conn = store.pool().acquire().await.unwrap();

        assert!(!table_exists(&mut conn, "no_such_table").await.unwrap());
        assert!(!column_exists(&mut conn, "notifications", "no_such_column")
            .await
            .unwrap());
        let summary = describe_table(&mut conn, "no_such_table").await.unwrap();
        assert!(!summary.exists);
        assert!(summary.columns.is_empty());
    }
}
