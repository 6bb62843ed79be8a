//! Load, grade, index and query a SQLite database end to end, without PDFs.

use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

use knaack::config::{parse_config, Config};
use knaack::indexer::{index_pages, ReportInput};
use knaack::loader::{institution_name, load_records};
use knaack::sqlite_store::SqliteStore;
use knaack::tools::{sql_tools, QueryTool, RetrieveTool, SchemaTool, Tool, ToolContext};
use knaack::{db, grades, migrate, search};
use knaack_core::gradesheet::GradeSheet;
use knaack_core::models::{CriterionGrade, IndicatorGrade, ListingRecord};
use knaack_core::search::SearchMode;
use knaack_core::store::{college_matches, Store};

async fn setup() -> (TempDir, Arc<Config>, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let toml = format!(
        "[db]\npath = \"{}/db/knaack.sqlite\"\n\n[chunking]\nchunk_size = 120\nchunk_overlap = 20\n",
        tmp.path().display()
    );
    let config = Arc::new(parse_config(&toml).unwrap());
    let pool = db::connect(&config).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    (tmp, config, pool)
}

fn listing() -> Vec<ListingRecord> {
    let raw = json!([
        {
            "hei_assessment_id": 11, "hei_name": "FLAME UNIVERSITY", "aishe_id": "U-0999",
            "state_name": "Maharashtra", "grade": "A"
        },
        {
            "hei_assessment_id": "12", "hei_name": "Alpha College", "aishe_id": "C-1001",
            "state_name": "Kerala", "grade": "A++"
        },
        { "hei_name": "Missing Id College" }
    ]);
    serde_json::from_value(raw).unwrap()
}

fn sheet(aishe_id: &str, gpa: f64) -> GradeSheet {
    GradeSheet {
        criteria: vec![
            CriterionGrade {
                aishe_id: aishe_id.to_string(),
                criterion_no: 1.0,
                weightage: 100.0,
                weighted_grade_point: 320.0,
                gpa: 3.2,
            },
            CriterionGrade {
                aishe_id: aishe_id.to_string(),
                criterion_no: 2.0,
                weightage: 350.0,
                weighted_grade_point: 350.0 * gpa,
                gpa,
            },
        ],
        indicators: vec![IndicatorGrade {
            aishe_id: aishe_id.to_string(),
            criterion_no: 2.1,
            weightage: 40.0,
            weighted_gpa: 120.0,
        }],
    }
}

async fn index_report(config: &Config, pool: &SqlitePool, aishe_id: &str, college: &str, pages: &[&str]) {
    let pages: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
    let store = SqliteStore::new(pool.clone());
    let path = format!("/reports/Peer_Team_Report/{}_peerteam_report.pdf", aishe_id);
    index_pages(
        config,
        &store,
        None,
        ReportInput {
            aishe_id,
            college_name: Some(college.to_string()),
            source_path: &path,
            content_hash: "h1",
            pages: &pages,
        },
    )
    .await
    .unwrap();
}

async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

#[tokio::test]
async fn migrations_are_idempotent_and_seed_taxonomy() {
    let (_tmp, _config, pool) = setup().await;
    migrate::migrate_pool(&pool).await.unwrap();
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM criteria_key_indicators").await, 41);
}

#[tokio::test]
async fn loading_twice_keeps_one_row_per_assessment() {
    let (_tmp, _config, pool) = setup().await;
    let records = listing();

    let first = load_records(&pool, &records).await.unwrap();
    assert_eq!(first.upserted, 2);
    assert_eq!(first.skipped, 1);
    load_records(&pool, &records).await.unwrap();

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM institution_details").await, 2);
    assert_eq!(
        institution_name(&pool, "C-1001").await.unwrap().as_deref(),
        Some("Alpha College")
    );
    assert_eq!(institution_name(&pool, "X-1").await.unwrap(), None);
}

#[tokio::test]
async fn storing_a_grade_sheet_replaces_previous_rows() {
    let (_tmp, _config, pool) = setup().await;

    grades::store_grade_sheet(&pool, "C-1001", &sheet("C-1001", 3.5)).await.unwrap();
    grades::store_grade_sheet(&pool, "C-1001", &sheet("C-1001", 3.8)).await.unwrap();
    grades::store_grade_sheet(&pool, "U-0999", &sheet("U-0999", 3.1)).await.unwrap();

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM criteria_wise_grades").await, 4);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM key_indicators_grades").await, 2);

    let gpa: f64 = sqlx::query_scalar(
        "SELECT criterion_wise_gpa FROM criteria_wise_grades WHERE aishe_id = 'C-1001' AND criterion_no = 2",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!((gpa - 3.8).abs() < 1e-9);
}

#[tokio::test]
async fn keyword_search_narrows_by_college() {
    let (_tmp, config, pool) = setup().await;
    index_report(
        &config,
        &pool,
        "U-0999",
        "FLAME UNIVERSITY",
        &[
            "Peer team report. The campus follows green initiatives such as rainwater harvesting.",
            "The library holds a large collection of journals.",
        ],
    )
    .await;
    index_report(
        &config,
        &pool,
        "C-1001",
        "Alpha College",
        &["The library is open on weekends and runs green audits."],
    )
    .await;

    let all = search::search_reports(&config, &pool, "library", SearchMode::Keyword, None, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let flame = search::search_reports(
        &config,
        &pool,
        "library",
        SearchMode::Keyword,
        Some("flame"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(flame.len(), 1);
    assert_eq!(flame[0].aishe_id, "U-0999");
    assert_eq!(flame[0].college_name.as_deref(), Some("FLAME UNIVERSITY"));
    assert_eq!(flame[0].page, 1);

    let none = search::search_reports(&config, &pool, "   ", SearchMode::Keyword, None, None)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn reindexing_replaces_chunks() {
    let (_tmp, config, pool) = setup().await;
    index_report(&config, &pool, "U-0999", "FLAME UNIVERSITY", &["old text about hostels"]).await;
    index_report(&config, &pool, "U-0999", "FLAME UNIVERSITY", &["new text about laboratories"]).await;

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM reports").await, 1);
    let hostels = search::search_reports(&config, &pool, "hostels", SearchMode::Keyword, None, None)
        .await
        .unwrap();
    assert!(hostels.is_empty());
    let labs = search::search_reports(&config, &pool, "laboratories", SearchMode::Keyword, None, None)
        .await
        .unwrap();
    assert_eq!(labs.len(), 1);
}

#[tokio::test]
async fn semantic_search_without_embeddings_fails() {
    let (_tmp, config, pool) = setup().await;
    let err = search::search_reports(&config, &pool, "library", SearchMode::Semantic, None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("requires embeddings"));
}

async fn tool_context(config: Arc<Config>, pool: SqlitePool) -> ToolContext {
    let read_only = db::connect_read_only(&config).await.unwrap();
    ToolContext::new(config, pool, read_only)
}

#[tokio::test]
async fn sql_tools_answer_from_read_only_pool() {
    let (_tmp, config, pool) = setup().await;
    load_records(&pool, &listing()).await.unwrap();
    grades::store_grade_sheet(&pool, "C-1001", &sheet("C-1001", 3.8)).await.unwrap();
    grades::store_grade_sheet(&pool, "U-0999", &sheet("U-0999", 3.1)).await.unwrap();
    let ctx = tool_context(config, pool).await;

    let names: Vec<String> = sql_tools().iter().map(|t| t.name().to_string()).collect();
    assert_eq!(
        names,
        vec!["sql_db_list_tables", "sql_db_schema", "sql_db_query_checker", "sql_db_query"]
    );

    let tables = sql_tools()[0].execute(json!({}), &ctx).await.unwrap();
    assert!(tables.as_str().unwrap().contains("criteria_wise_grades"));

    let schema = SchemaTool
        .execute(json!({ "table_names": "institution_details" }), &ctx)
        .await
        .unwrap();
    let schema = schema.as_str().unwrap();
    assert!(schema.contains("CREATE TABLE"));
    assert!(schema.contains("3 rows from institution_details table"));
    assert!(schema.contains("FLAME UNIVERSITY"));

    let result = QueryTool
        .execute(
            json!({ "query": "SELECT i.hei_name, c.criterion_wise_gpa FROM criteria_wise_grades c \
                              JOIN institution_details i ON i.aishe_id = c.aishe_id \
                              WHERE c.criterion_no = 2 ORDER BY c.criterion_wise_gpa DESC LIMIT 1;" }),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(result["columns"], json!(["hei_name", "criterion_wise_gpa"]));
    assert_eq!(result["rows"][0]["hei_name"], "Alpha College");
    assert_eq!(result["truncated"], false);
}

#[tokio::test]
async fn model_written_sql_cannot_modify_data() {
    let (_tmp, config, pool) = setup().await;
    load_records(&pool, &listing()).await.unwrap();
    let ctx = tool_context(config, pool.clone()).await;

    assert!(QueryTool
        .execute(json!({ "query": "DELETE FROM institution_details" }), &ctx)
        .await
        .is_err());
    assert!(SchemaTool
        .execute(json!({ "table_names": "reports" }), &ctx)
        .await
        .is_err());

    let direct = sqlx::query("DELETE FROM institution_details")
        .execute(&ctx.read_only)
        .await;
    assert!(direct.is_err());
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM institution_details").await, 2);
}

#[tokio::test]
async fn retrieval_tool_returns_passages_with_college_names() {
    let (_tmp, config, pool) = setup().await;
    index_report(
        &config,
        &pool,
        "U-0999",
        "FLAME UNIVERSITY",
        &["The FLAME Centre for Entrepreneurship incubates student startups."],
    )
    .await;
    let ctx = tool_context(config, pool).await;

    let passages = RetrieveTool
        .execute(
            json!({ "query": "Centre for Entrepreneurship", "college_name": "Flame University" }),
            &ctx,
        )
        .await
        .unwrap();
    let passages = passages.as_array().unwrap();
    assert_eq!(passages.len(), 1);
    assert_eq!(passages[0]["college_name"], "FLAME UNIVERSITY");
    assert_eq!(passages[0]["page"], 1);

    let elsewhere = RetrieveTool
        .execute(
            json!({ "query": "Centre for Entrepreneurship", "college_name": "Alpha" }),
            &ctx,
        )
        .await
        .unwrap();
    assert!(elsewhere.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn keyword_college_filter_folds_non_ascii_case() {
    let (_tmp, config, pool) = setup().await;
    index_report(
        &config,
        &pool,
        "C-2001",
        "ÉCOLE NORMALE SUPÉRIEURE",
        &["The library subscribes to mathematics journals."],
    )
    .await;
    index_report(
        &config,
        &pool,
        "C-2002",
        "Alpha College",
        &["The library opens at dawn."],
    )
    .await;

    let store = SqliteStore::new(pool.clone());
    let hits = store.keyword_search("library", 10, Some("école")).await.unwrap();
    assert_eq!(hits.len(), 1);
    let report = store.get_report(&hits[0].report_id).await.unwrap().unwrap();
    assert_eq!(report.aishe_id, "C-2001");
    assert!(college_matches(report.college_name.as_deref(), Some("école")));

    let capped = store.keyword_search("library", 1, None).await.unwrap();
    assert_eq!(capped.len(), 1);

    let via_search = search::search_reports(
        &config,
        &pool,
        "library",
        SearchMode::Keyword,
        Some("supérieure"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(via_search.len(), 1);
    assert_eq!(via_search[0].aishe_id, "C-2001");
}
