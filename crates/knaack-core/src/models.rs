//! Core data models used throughout KNAACK.
//!
//! These types describe the listing records scraped from the accreditation
//! dashboard, the report files downloaded per institution, the grades parsed
//! out of grade sheets, and the chunks indexed for retrieval.

use serde::{Deserialize, Deserializer, Serialize};

/// One row of the public accreditation listing, as returned by the
/// dashboard's DataTables endpoint.
///
/// Identifier fields arrive as JSON numbers on some pages and strings on
/// others, so they are normalized on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub hei_assessment_id: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub hei_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub aishe_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub other_address: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub state_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub iiqa_submitted_date: Option<String>,
    /// The dashboard spells this field `date_of_decleration`.
    #[serde(
        default,
        rename = "date_of_decleration",
        alias = "date_of_declaration",
        deserialize_with = "de_opt_string"
    )]
    pub date_of_declaration: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub grade: Option<String>,
}

/// The listing snapshot persisted between `scrape` and `load`/`download`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingSnapshot {
    #[serde(default, rename = "recordsTotal")]
    pub records_total: u64,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

impl ListingSnapshot {
    /// Decode the raw records, skipping any that are not objects.
    pub fn records(&self) -> Vec<ListingRecord> {
        self.data
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }
}

fn de_opt_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(d)?;
    Ok(match v {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    })
}

fn de_opt_i64<'de, D>(d: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(d)?;
    Ok(match v {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// The four report files published per institution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    GradeSheet,
    SelfStudy,
    PeerTeam,
    IntentToApply,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        ReportKind::PeerTeam,
        ReportKind::SelfStudy,
        ReportKind::IntentToApply,
        ReportKind::GradeSheet,
    ];

    /// Classify a report by the category segment of its download URL.
    pub fn from_category(category: &str) -> Option<Self> {
        match category {
            "peerteam_report" => Some(ReportKind::PeerTeam),
            "ssr_report" => Some(ReportKind::SelfStudy),
            "iiqa_report" => Some(ReportKind::IntentToApply),
            "grade_sheet_rpt" => Some(ReportKind::GradeSheet),
            _ => None,
        }
    }

    /// URL category segment, also used as the file-name suffix.
    pub fn category(&self) -> &'static str {
        match self {
            ReportKind::PeerTeam => "peerteam_report",
            ReportKind::SelfStudy => "ssr_report",
            ReportKind::IntentToApply => "iiqa_report",
            ReportKind::GradeSheet => "grade_sheet_rpt",
        }
    }

    /// Folder name under the reports root.
    pub fn folder(&self) -> &'static str {
        match self {
            ReportKind::PeerTeam => "Peer_Team_Report",
            ReportKind::SelfStudy => "SSR_Report",
            ReportKind::IntentToApply => "IIQA_Report",
            ReportKind::GradeSheet => "Grade_Sheet_Report",
        }
    }

    /// File name for an institution's copy of this report.
    pub fn file_name(&self, aishe_id: &str) -> String {
        format!("{}_{}.pdf", aishe_id, self.category())
    }
}

/// Extract the category segment (second-to-last path component) from a
/// report download URL.
pub fn category_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let mut segments = path.trim_end_matches('/').rsplit('/');
    segments.next()?;
    segments.next().filter(|s| !s.is_empty())
}

/// The AISHE ID is the file-name prefix before the first underscore.
pub fn aishe_id_from_file_name(file_name: &str) -> Option<&str> {
    file_name.split('_').next().filter(|s| !s.is_empty())
}

/// True when an AISHE ID can be used as a file-name prefix: ASCII letters,
/// digits and hyphens only. Listing data is remote input, so ids like
/// `../x` must never reach a path.
pub fn is_safe_aishe_id(aishe_id: &str) -> bool {
    !aishe_id.is_empty() && aishe_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// A criterion-level grade row (page two of a grade sheet).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionGrade {
    pub aishe_id: String,
    pub criterion_no: f64,
    pub weightage: f64,
    pub weighted_grade_point: f64,
    pub gpa: f64,
}

/// A key-indicator-level grade row (pages three onward).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorGrade {
    pub aishe_id: String,
    pub criterion_no: f64,
    pub weightage: f64,
    pub weighted_gpa: f64,
}

/// An indexed peer-team report.
#[derive(Debug, Clone)]
pub struct Report {
    pub id: String,
    pub aishe_id: String,
    pub college_name: Option<String>,
    pub source_path: String,
    pub page_count: i64,
    pub content_hash: String,
    pub updated_at: i64,
}

/// A chunk of one report page.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub report_id: String,
    pub chunk_index: i64,
    /// Zero-based page the chunk was cut from.
    pub page: i64,
    pub text: String,
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_record_accepts_numbers_and_strings() {
        let v = serde_json::json!({
            "hei_assessment_id": "1204",
            "hei_name": "FLAME UNIVERSITY",
            "aishe_id": 12345,
            "state_name": "Maharashtra",
            "date_of_decleration": "2023-04-01",
            "grade": "A",
            "edit_button": "<a>view</a>"
        });
        let rec: ListingRecord = serde_json::from_value(v).unwrap();
        assert_eq!(rec.hei_assessment_id, Some(1204));
        assert_eq!(rec.aishe_id.as_deref(), Some("12345"));
        assert_eq!(rec.date_of_declaration.as_deref(), Some("2023-04-01"));
        assert_eq!(rec.other_address, None);
    }

    #[test]
    fn blank_strings_become_none() {
        let v = serde_json::json!({"hei_assessment_id": 7, "grade": "  "});
        let rec: ListingRecord = serde_json::from_value(v).unwrap();
        assert_eq!(rec.grade, None);
    }

    #[test]
    fn report_kind_categories() {
        for kind in ReportKind::ALL {
            assert_eq!(ReportKind::from_category(kind.category()), Some(kind));
        }
        assert_eq!(ReportKind::from_category("brochure"), None);
        assert_eq!(
            ReportKind::GradeSheet.file_name("C-1234"),
            "C-1234_grade_sheet_rpt.pdf"
        );
    }

    #[test]
    fn category_segment_from_url() {
        assert_eq!(
            category_from_url("https://x.gov.in/public/uploads/peerteam_report/abc.pdf"),
            Some("peerteam_report")
        );
        assert_eq!(
            category_from_url("https://x.gov.in/a/ssr_report/f.pdf?v=2"),
            Some("ssr_report")
        );
        assert_eq!(category_from_url("f.pdf"), None);
    }

    #[test]
    fn aishe_prefix() {
        assert_eq!(
            aishe_id_from_file_name("C-41234_peerteam_report.pdf"),
            Some("C-41234")
        );
        assert_eq!(aishe_id_from_file_name("_x.pdf"), None);
    }

    #[test]
    fn only_plain_ids_are_safe_in_paths() {
        assert!(is_safe_aishe_id("C-41234"));
        assert!(is_safe_aishe_id("U-0999"));
        for bad in ["", "../../escaped/C-1", "C-1/..", "..", "C_1", "C 1", "C-1\\x", "Ç-1"] {
            assert!(!is_safe_aishe_id(bad), "{:?}", bad);
        }
    }
}
