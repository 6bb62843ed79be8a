//! Grade-sheet parsing.
//!
//! A grade sheet is a multi-page PDF. The second page holds the
//! criterion-wise table (number, title, weightage, weighted grade point,
//! GPA); the pages after it hold key-indicator tables (number, title,
//! weightage, weighted GPA). The first page is a summary and is ignored.
//!
//! Rows are classified the same way on every sheet: the row number and the
//! required numeric columns must parse, and the number must exist in the
//! [`taxonomy`](crate::taxonomy). Anything else (headers, totals, notes,
//! malformed rows) is skipped without error.
//!
//! # Example
//!
//! ```rust
//! use knaack_core::gradesheet::parse_grade_sheet;
//!
//! let pages = vec![
//!     "Institutional CGPA 3.21".to_string(),
//!     "1 Curricular Aspects 150 480 3.20".to_string(),
//!     "1.1 Curricular Planning and Implementation 20 3.50".to_string(),
//! ];
//! let sheet = parse_grade_sheet("C-1001", &pages);
//! assert_eq!(sheet.criteria.len(), 1);
//! assert_eq!(sheet.indicators.len(), 1);
//! ```

use crate::models::{CriterionGrade, IndicatorGrade};
use crate::table::{rows_from_text, TableRow};
use crate::taxonomy;

/// Page index of the criterion-wise table.
pub const CRITERIA_PAGE: usize = 1;

/// Grades parsed from one institution's sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeSheet {
    pub criteria: Vec<CriterionGrade>,
    pub indicators: Vec<IndicatorGrade>,
}

impl GradeSheet {
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty() && self.indicators.is_empty()
    }
}

/// The taxonomy number a row refers to. Numbers with more precision than
/// the taxonomy (`1.14`) are rejected rather than rounded onto an entry.
fn taxonomy_number(row: &TableRow) -> Option<f64> {
    let number = row.number()?;
    let entry = taxonomy::lookup(number)?;
    if (number - entry.number).abs() > 1e-9 {
        return None;
    }
    Some(entry.number)
}

/// Parse a criterion-level row (five columns).
pub fn criterion_row(aishe_id: &str, row: &TableRow) -> Option<CriterionGrade> {
    let number = taxonomy_number(row)?;
    let tail = row.numeric_tail(3)?;
    Some(CriterionGrade {
        aishe_id: aishe_id.to_string(),
        criterion_no: number,
        weightage: tail[0],
        weighted_grade_point: tail[1],
        gpa: tail[2],
    })
}

/// Parse a key-indicator-level row (four columns).
pub fn indicator_row(aishe_id: &str, row: &TableRow) -> Option<IndicatorGrade> {
    let number = taxonomy_number(row)?;
    let tail = row.numeric_tail(2)?;
    Some(IndicatorGrade {
        aishe_id: aishe_id.to_string(),
        criterion_no: number,
        weightage: tail[0],
        weighted_gpa: tail[1],
    })
}

/// Parse all grade rows out of a sheet's page texts.
///
/// A sheet with fewer than two pages yields an empty [`GradeSheet`].
/// Duplicate numbers keep their last occurrence, matching the
/// one-row-per-number constraint of the grade tables.
pub fn parse_grade_sheet(aishe_id: &str, pages: &[String]) -> GradeSheet {
    let mut sheet = GradeSheet::default();

    if let Some(page) = pages.get(CRITERIA_PAGE) {
        for row in rows_from_text(page) {
            if let Some(g) = criterion_row(aishe_id, &row) {
                sheet.criteria.retain(|c| c.criterion_no != g.criterion_no);
                sheet.criteria.push(g);
            }
        }
    }

    for page in pages.iter().skip(CRITERIA_PAGE + 1) {
        for row in rows_from_text(page) {
            if let Some(g) = indicator_row(aishe_id, &row) {
                sheet.indicators.retain(|c| c.criterion_no != g.criterion_no);
                sheet.indicators.push(g);
            }
        }
    }

    sheet
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pages() -> Vec<String> {
        vec![
            "NAAC Grade Sheet\nInstitution: Sample College\nCGPA 3.21 Grade A+".to_string(),
            "Criteria Weightage CrWGP CrGPA\n\
             1 Curricular Aspects 150 480.00 3.20\n\
             2 Teaching-Learning and\n\
             Evaluation 200 700.50 3.50\n\
             Total 1000 3210 3.21"
                .to_string(),
            "Key Indicator Weightage KIWGPA\n\
             1.1 Curricular Planning and Implementation 20 3.50\n\
             1.2 Academic Flexibility 30 4.00\n\
             9.9 Unknown indicator 10 1.00"
                .to_string(),
            "2.1 Student Enrolment and Profile 10 2.75\nPage 4 of 4".to_string(),
        ]
    }

    #[test]
    fn criterion_rows_come_from_second_page() {
        let sheet = parse_grade_sheet("C-1", &sample_pages());
        assert_eq!(sheet.criteria.len(), 2);
        assert_eq!(sheet.criteria[0].criterion_no, 1.0);
        assert_eq!(sheet.criteria[0].weightage, 150.0);
        assert_eq!(sheet.criteria[0].weighted_grade_point, 480.0);
        assert_eq!(sheet.criteria[0].gpa, 3.2);
        assert_eq!(sheet.criteria[1].criterion_no, 2.0);
        assert_eq!(sheet.criteria[1].gpa, 3.5);
    }

    #[test]
    fn indicator_rows_come_from_later_pages() {
        let sheet = parse_grade_sheet("C-1", &sample_pages());
        let numbers: Vec<f64> = sheet.indicators.iter().map(|g| g.criterion_no).collect();
        assert_eq!(numbers, vec![1.1, 1.2, 2.1]);
        assert_eq!(sheet.indicators[2].weighted_gpa, 2.75);
        assert!(sheet.indicators.iter().all(|g| g.aishe_id == "C-1"));
    }

    #[test]
    fn first_page_is_ignored() {
        let pages = vec!["1 Curricular Aspects 150 480 3.2".to_string()];
        assert!(parse_grade_sheet("C-1", &pages).is_empty());
    }

    #[test]
    fn short_rows_are_skipped() {
        let pages = vec![
            String::new(),
            "3 Research, Innovations and Extension 250 3.1".to_string(),
        ];
        let sheet = parse_grade_sheet("C-1", &pages);
        assert!(sheet.criteria.is_empty());
    }

    #[test]
    fn duplicate_numbers_keep_last() {
        let pages = vec![
            String::new(),
            String::new(),
            "1.1 Planning 20 3.0\n1.1 Planning 20 3.5".to_string(),
        ];
        let sheet = parse_grade_sheet("C-1", &pages);
        assert_eq!(sheet.indicators.len(), 1);
        assert_eq!(sheet.indicators[0].weighted_gpa, 3.5);
    }

    #[test]
    fn stored_numbers_are_taxonomy_numbers() {
        let pages = vec![
            String::new(),
            "1.0 Curricular Aspects 150 480 3.2\n1.05 Stray row 10 20 2.0".to_string(),
            "1.14 Something 20 3.5\n2.05 Other 10 2.0\n2.10 Student Enrolment 10 2.5".to_string(),
        ];
        let sheet = parse_grade_sheet("C-1", &pages);
        let known: Vec<f64> = taxonomy::entries().iter().map(|e| e.number).collect();

        let criteria: Vec<f64> = sheet.criteria.iter().map(|g| g.criterion_no).collect();
        assert_eq!(criteria, vec![1.0]);
        let indicators: Vec<f64> = sheet.indicators.iter().map(|g| g.criterion_no).collect();
        assert_eq!(indicators, vec![2.1]);
        assert!(criteria.iter().chain(&indicators).all(|n| known.contains(n)));
    }
}
