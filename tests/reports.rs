//! Grade extraction and report indexing from PDF files on disk.

use serde_json::json;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use knaack::config::{parse_config, Config};
use knaack::grades::extract_grades;
use knaack::indexer::index_reports;
use knaack::loader::load_records;
use knaack::progress::NoProgress;
use knaack::{db, migrate, search};
use knaack_core::models::{ListingRecord, ReportKind};
use knaack_core::search::SearchMode;

/// A PDF with one Helvetica text line per entry, one page per inner slice.
/// Body first, then an xref with the real byte offsets so pdf-extract can
/// parse it.
fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut offsets = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            pages.len()
        )
        .as_bytes(),
    );
    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, lines) in pages.iter().enumerate() {
        let page_obj = 4 + 2 * i;
        let content_obj = page_obj + 1;

        let mut stream = String::from("BT /F1 10 Tf 50 750 Td");
        for (n, line) in lines.iter().enumerate() {
            if n > 0 {
                stream.push_str(" 0 -20 Td");
            }
            stream.push_str(&format!(" ({}) Tj", line));
        }
        stream.push_str(" ET");

        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_obj, content_obj
            )
            .as_bytes(),
        );
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                content_obj,
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", offsets.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            offsets.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn grade_sheet_pdf() -> Vec<u8> {
    pdf_with_pages(&[
        &["NAAC Grade Sheet", "Institutional CGPA 3.35 Grade A"],
        &[
            "Criteria Weightage CrWGP CrGPA",
            "1 Curricular Aspects 150 480.00 3.20",
            "2 Teaching-Learning and Evaluation 200 700.00 3.50",
            "Total 1000 3350 3.35",
        ],
        &[
            "Key Indicator Weightage KIWGPA",
            "1.1 Curricular Planning and Implementation 20 3.50",
            "1.2 Academic Flexibility 30 4.00",
        ],
    ])
}

fn peer_team_pdf(closing: &str) -> Vec<u8> {
    pdf_with_pages(&[
        &[
            "Peer Team Report on Institutional Accreditation",
            "The campus practises rainwater harvesting across all blocks.",
        ],
        &[
            "The central library holds a large collection of journals.",
            closing,
        ],
    ])
}

async fn setup() -> (TempDir, Arc<Config>, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let toml = format!(
        "[db]\npath = \"{root}/db/knaack.sqlite\"\n\n[reports]\nroot = \"{root}/reports\"\n\n[chunking]\nchunk_size = 200\nchunk_overlap = 20\n",
        root = tmp.path().display()
    );
    let config = Arc::new(parse_config(&toml).unwrap());
    let pool = db::connect(&config).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();

    let records: Vec<ListingRecord> = serde_json::from_value(json!([
        { "hei_assessment_id": 1, "hei_name": "Alpha College", "aishe_id": "C-1", "grade": "A" }
    ]))
    .unwrap();
    load_records(&pool, &records).await.unwrap();
    (tmp, config, pool)
}

fn write(path: &Path, bytes: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

#[tokio::test]
async fn grade_sheet_pdf_lands_in_grade_tables() {
    let (_tmp, config, pool) = setup().await;
    write(
        &config.reports.path_for(ReportKind::GradeSheet, "C-1"),
        &grade_sheet_pdf(),
    );
    write(
        &config.reports.path_for(ReportKind::GradeSheet, "C-2"),
        b"<html>not a pdf</html>",
    );

    let folder = config.reports.folder(ReportKind::GradeSheet);
    let stats = extract_grades(&pool, &folder, &NoProgress).await.unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.institutions, 1);
    assert_eq!(stats.criterion_rows, 2);
    assert_eq!(stats.indicator_rows, 2);
    assert_eq!(stats.failed, 1);

    let gpa: f64 = sqlx::query_scalar(
        "SELECT criterion_wise_gpa FROM criteria_wise_grades WHERE aishe_id = 'C-1' AND criterion_no = 2",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!((gpa - 3.5).abs() < 1e-9);

    // every stored number joins with the taxonomy
    let orphans: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM key_indicators_grades g \
         WHERE NOT EXISTS (SELECT 1 FROM criteria_key_indicators t WHERE t.criterion_no = g.criterion_no)",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn index_skips_unchanged_reports_until_full() {
    let (_tmp, config, pool) = setup().await;
    let path = config.reports.path_for(ReportKind::PeerTeam, "C-1");
    write(&path, &peer_team_pdf("Hostels are adequate."));
    let folder = config.reports.folder(ReportKind::PeerTeam);

    let first = index_reports(&config, &pool, &folder, None, false, &NoProgress)
        .await
        .unwrap();
    assert_eq!(first.files, 1);
    assert_eq!(first.indexed, 1);
    assert!(first.chunks > 0);

    let hits = search::search_reports(&config, &pool, "rainwater", SearchMode::Keyword, None, None)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].aishe_id, "C-1");
    assert_eq!(hits[0].college_name.as_deref(), Some("Alpha College"));

    let again = index_reports(&config, &pool, &folder, None, false, &NoProgress)
        .await
        .unwrap();
    assert_eq!(again.indexed, 0);
    assert_eq!(again.unchanged, 1);
    assert_eq!(again.chunks, 0);

    let full = index_reports(&config, &pool, &folder, None, true, &NoProgress)
        .await
        .unwrap();
    assert_eq!(full.indexed, 1);
    assert_eq!(full.unchanged, 0);

    // a changed file is picked up without --full
    write(&path, &peer_team_pdf("Laboratories were recently upgraded."));
    let changed = index_reports(&config, &pool, &folder, None, false, &NoProgress)
        .await
        .unwrap();
    assert_eq!(changed.indexed, 1);

    let reports: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(reports, 1);
    let hostels = search::search_reports(&config, &pool, "hostels", SearchMode::Keyword, None, None)
        .await
        .unwrap();
    assert!(hostels.is_empty());
    let labs = search::search_reports(&config, &pool, "laboratories", SearchMode::Keyword, None, None)
        .await
        .unwrap();
    assert_eq!(labs.len(), 1);
    assert_eq!(labs[0].page, 1);
}
