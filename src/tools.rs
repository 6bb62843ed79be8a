//! Tools the agents can call.
//!
//! | Tool | Agent | Does |
//! |------|-------|------|
//! | `sql_db_list_tables` | SQL | Names the accreditation tables |
//! | `sql_db_schema` | SQL | `CREATE` statement and three sample rows per table |
//! | `sql_db_query` | SQL | Runs one read-only statement, at most 50 rows |
//! | `sql_db_query_checker` | SQL | Compiles a statement with `EXPLAIN` without running it |
//! | `retrieve_naac_information_from_vector_db` | RAG | Searches peer-team report chunks |
//!
//! Model-written SQL only ever reaches the read-only pool.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::sync::Arc;

use knaack_core::search::SearchMode;

use crate::config::Config;
use crate::llm::ToolSpec;
use crate::migrate::ACCREDITATION_TABLES;
use crate::search::search_reports;

/// Rows returned by `sql_db_query` before truncation.
pub const MAX_QUERY_ROWS: usize = 50;
const SAMPLE_ROWS: usize = 3;

/// Shared state handed to every tool call.
pub struct ToolContext {
    pub config: Arc<Config>,
    /// Read-write pool, used for retrieval.
    pub pool: SqlitePool,
    /// Read-only pool for model-written SQL.
    pub read_only: SqlitePool,
}

impl ToolContext {
    pub fn new(config: Arc<Config>, pool: SqlitePool, read_only: SqlitePool) -> Self {
        Self {
            config,
            pool,
            read_only,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the parameters object.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The four SQL tools, in the order the agent is told to use them.
pub fn sql_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListTablesTool),
        Arc::new(SchemaTool),
        Arc::new(QueryCheckerTool),
        Arc::new(QueryTool),
    ]
}

pub fn rag_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(RetrieveTool)]
}

fn string_param<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("missing required parameter: {}", key))
}

/// Accept exactly one `SELECT` or `WITH` statement. Returns it without the
/// trailing semicolon.
pub fn check_read_only(query: &str) -> Result<&str> {
    let q = query.trim().trim_end_matches(';').trim_end();
    if q.is_empty() {
        bail!("empty query");
    }
    if q.contains(';') {
        bail!("only one statement is allowed");
    }
    let first = q
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if first != "select" && first != "with" {
        bail!("only read-only SELECT or WITH statements are allowed");
    }
    Ok(q)
}

/// One SQLite cell as JSON, by its runtime storage class.
fn cell_to_json(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };
    match type_name.as_str() {
        "INTEGER" => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(|b| Value::from(format!("<{} bytes>", b.len())))
            .unwrap_or(Value::Null),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
    }
}

fn row_to_json(row: &SqliteRow) -> Value {
    let mut obj = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        obj.insert(col.name().to_string(), cell_to_json(row, i));
    }
    Value::Object(obj)
}

fn cell_to_text(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============ sql_db_list_tables ============

pub struct ListTablesTool;

#[async_trait]
impl Tool for ListTablesTool {
    fn name(&self) -> &str {
        "sql_db_list_tables"
    }

    fn description(&self) -> &str {
        "Input is an empty string, output is a comma-separated list of tables in the database."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<Value> {
        Ok(Value::from(ACCREDITATION_TABLES.join(", ")))
    }
}

// ============ sql_db_schema ============

pub struct SchemaTool;

#[async_trait]
impl Tool for SchemaTool {
    fn name(&self) -> &str {
        "sql_db_schema"
    }

    fn description(&self) -> &str {
        "Input to this tool is a comma-separated list of tables, output is the schema and sample rows for those tables. \
         Be sure that the tables actually exist by calling sql_db_list_tables first! \
         Example Input: table1, table2, table3"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table_names": {
                    "type": "string",
                    "description": "A comma-separated list of the table names for which to return the schema."
                }
            },
            "required": ["table_names"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let names = string_param(&params, "table_names")?;
        let tables: Vec<&str> = names
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        let unknown: Vec<&str> = tables
            .iter()
            .copied()
            .filter(|t| !ACCREDITATION_TABLES.contains(t))
            .collect();
        if !unknown.is_empty() {
            bail!(
                "table_names {{{}}} not found in database; available tables: {}",
                unknown.join(", "),
                ACCREDITATION_TABLES.join(", ")
            );
        }

        let mut sections = Vec::new();
        for table in tables {
            sections.push(describe_table(&ctx.read_only, table).await?);
        }
        Ok(Value::from(sections.join("\n\n")))
    }
}

/// `CREATE` statement followed by sample rows, tab-separated.
async fn describe_table(pool: &SqlitePool, table: &str) -> Result<String> {
    let create: Option<String> =
        sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(pool)
            .await?;
    let create = create.ok_or_else(|| anyhow!("table {} does not exist; run `knaack init`", table))?;

    let columns: Vec<String> = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?
        .iter()
        .map(|r| r.get::<String, _>("name"))
        .collect();

    // table names are checked against ACCREDITATION_TABLES before we get here
    let rows = sqlx::query(&format!("SELECT * FROM {} LIMIT {}", table, SAMPLE_ROWS))
        .fetch_all(pool)
        .await?;

    let mut out = format!("{}\n\n/*\n{} rows from {} table:\n", create.trim(), SAMPLE_ROWS, table);
    out.push_str(&columns.join("\t"));
    for row in &rows {
        let cells: Vec<String> = (0..row.len())
            .map(|i| cell_to_text(&cell_to_json(row, i)))
            .collect();
        out.push('\n');
        out.push_str(&cells.join("\t"));
    }
    out.push_str("\n*/");
    Ok(out)
}

// ============ sql_db_query ============

pub struct QueryTool;

#[async_trait]
impl Tool for QueryTool {
    fn name(&self) -> &str {
        "sql_db_query"
    }

    fn description(&self) -> &str {
        "Input to this tool is a detailed and correct SQL query, output is a result from the database. \
         If the query is not correct, an error message will be returned. \
         If an error is returned, rewrite the query, check the query, and try again."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "A detailed and correct SQL query." }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = check_read_only(string_param(&params, "query")?)?;
        run_read_only_query(&ctx.read_only, query).await
    }
}

/// Run a checked statement and return `{columns, rows, truncated}`.
pub async fn run_read_only_query(pool: &SqlitePool, query: &str) -> Result<Value> {
    let wrapped = format!("SELECT * FROM ({}) LIMIT {}", query, MAX_QUERY_ROWS + 1);
    let rows = sqlx::query(&wrapped).fetch_all(pool).await?;

    let truncated = rows.len() > MAX_QUERY_ROWS;
    let columns: Vec<String> = rows
        .first()
        .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let rows: Vec<Value> = rows.iter().take(MAX_QUERY_ROWS).map(row_to_json).collect();

    Ok(json!({
        "columns": columns,
        "rows": rows,
        "truncated": truncated,
    }))
}

// ============ sql_db_query_checker ============

pub struct QueryCheckerTool;

#[async_trait]
impl Tool for QueryCheckerTool {
    fn name(&self) -> &str {
        "sql_db_query_checker"
    }

    fn description(&self) -> &str {
        "Use this tool to double check if your query is correct before executing it. \
         Always use this tool before executing a query with sql_db_query!"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "A detailed and SQL query to be checked." }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = check_read_only(string_param(&params, "query")?)?;
        sqlx::query(&format!("EXPLAIN {}", query))
            .fetch_all(&ctx.read_only)
            .await
            .map_err(|e| anyhow!("query does not compile: {}", e))?;
        Ok(Value::from(format!("The query is valid:\n{}", query)))
    }
}

// ============ retrieve_naac_information_from_vector_db ============

pub struct RetrieveTool;

#[async_trait]
impl Tool for RetrieveTool {
    fn name(&self) -> &str {
        "retrieve_naac_information_from_vector_db"
    }

    fn description(&self) -> &str {
        "retrieve information from the NAAC vector database, which has information about the NAAC Peer Reports of various colleges."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to look for in the reports." },
                "college_name": {
                    "type": "string",
                    "description": "The name of the college or institution. Need not be an exact name match."
                },
                "limit": { "type": "integer", "description": "Maximum number of passages." }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = string_param(&params, "query")?;
        let college = params.get("college_name").and_then(|v| v.as_str());
        let limit = params.get("limit").and_then(|v| v.as_i64()).filter(|l| *l > 0);
        let mode = if ctx.config.embedding.is_enabled() {
            SearchMode::Hybrid
        } else {
            SearchMode::Keyword
        };

        let results = search_reports(&ctx.config, &ctx.pool, query, mode, college, limit).await?;
        let passages: Vec<Value> = results
            .iter()
            .map(|r| {
                json!({
                    "college_name": r.college_name,
                    "aishe_id": r.aishe_id,
                    "page": r.page + 1,
                    "text": r.text,
                })
            })
            .collect();
        Ok(Value::Array(passages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_check_accepts_select_and_with() {
        assert_eq!(check_read_only(" SELECT 1; ").unwrap(), "SELECT 1");
        assert!(check_read_only("with t as (select 1) select * from t").is_ok());
    }

    #[test]
    fn read_only_check_rejects_writes_and_batches() {
        assert!(check_read_only("DELETE FROM institution_details").is_err());
        assert!(check_read_only("SELECT 1; DROP TABLE reports").is_err());
        assert!(check_read_only("   ").is_err());
    }

    #[test]
    fn specs_carry_names_and_schemas() {
        let names: Vec<String> = sql_tools().iter().map(|t| t.spec().name).collect();
        assert_eq!(
            names,
            ["sql_db_list_tables", "sql_db_schema", "sql_db_query_checker", "sql_db_query"]
        );
        let retrieve = &rag_tools()[0];
        assert_eq!(retrieve.parameters_schema()["required"], json!(["query"]));
    }

    #[test]
    fn null_cells_render_as_none() {
        assert_eq!(cell_to_text(&Value::Null), "None");
        assert_eq!(cell_to_text(&json!("A++")), "A++");
        assert_eq!(cell_to_text(&json!(3.5)), "3.5");
    }
}
