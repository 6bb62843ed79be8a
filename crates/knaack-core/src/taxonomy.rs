//! The fixed two-level accreditation taxonomy.
//!
//! Seven criteria, each broken into key indicators numbered `<criterion>.<n>`.
//! The relational loader seeds `criteria_key_indicators` from [`entries`],
//! and the grade-sheet parser uses [`lookup`] to reject rows whose number is
//! not part of the framework.

/// One row of the taxonomy table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxonomyEntry {
    /// Full criterion title, e.g. `"Criterion 1: Curricular Aspects"`.
    pub criterion: &'static str,
    /// `1.0` for a criterion, `1.1` for its first key indicator.
    pub number: f64,
    /// Display title of this entry.
    pub key_indicator: &'static str,
}

impl TaxonomyEntry {
    pub fn is_criterion(&self) -> bool {
        self.number.fract() == 0.0
    }
}

struct Criterion {
    title: &'static str,
    indicators: &'static [(&'static str, &'static str)],
}

const CRITERIA: [Criterion; 7] = [
    Criterion {
        title: "Criterion 1: Curricular Aspects",
        indicators: &[
            ("1.1", "1.1 Curricular Planning and Implementation"),
            ("1.2", "1.2 Academic Flexibility"),
            ("1.3", "1.3 Curriculum Enrichment"),
            ("1.4", "1.4 Feedback System"),
        ],
    },
    Criterion {
        title: "Criterion 2: Teaching-Learning and Evaluation",
        indicators: &[
            ("2.1", "2.1 Student Enrolment and Profile"),
            ("2.2", "2.2 Catering to Student Diversity"),
            ("2.3", "2.3 Teaching-Learning Process"),
            ("2.4", "2.4 Teacher Profile and Quality"),
            ("2.5", "2.5 Evaluation Process and Reforms"),
            ("2.6", "2.6 Student Performance and Learning Outcomes"),
            ("2.7", "2.7 Student Satisfaction Survey"),
        ],
    },
    Criterion {
        title: "Criterion 3: Research, Innovations and Extension",
        indicators: &[
            ("3.1", "3.1 Promotion of Research and Facilities"),
            ("3.2", "3.2 Resource Mobilization for Research"),
            ("3.3", "3.3 Innovation Ecosystem"),
            ("3.4", "3.4 Research Publications and Awards"),
            ("3.5", "3.5 Consultancy"),
            ("3.6", "3.6 Extension Activities"),
            ("3.7", "3.7 Collaboration"),
        ],
    },
    Criterion {
        title: "Criterion 4: Infrastructure and Learning Resources",
        indicators: &[
            ("4.1", "4.1 Physical Facilities"),
            ("4.2", "4.2 Library as a Learning Resource"),
            ("4.3", "4.3 IT Infrastructure"),
            ("4.4", "4.4 Maintenance of Campus Infrastructure"),
        ],
    },
    Criterion {
        title: "Criterion 5: Student Support and Progression",
        indicators: &[
            ("5.1", "5.1 Student Support"),
            ("5.2", "5.2 Student Progression"),
            ("5.3", "5.3 Student Participation and Activities"),
            ("5.4", "5.4 Alumni Engagement"),
        ],
    },
    Criterion {
        title: "Criterion 6: Governance, Leadership and Management",
        indicators: &[
            ("6.1", "6.1 Institutional Vision and Leadership"),
            ("6.2", "6.2 Strategy Development and Deployment"),
            ("6.3", "6.3 Faculty Empowerment Strategies"),
            ("6.4", "6.4 Financial Management and Resource Mobilization"),
            ("6.5", "6.5 Internal Quality Assurance System"),
        ],
    },
    Criterion {
        title: "Criterion 7: Institutional Values and Best Practices",
        indicators: &[
            ("7.1", "7.1 Institutional Values and Social Responsibilities"),
            ("7.2", "7.2 Best Practices"),
            ("7.3", "7.3 Institutional Distinctiveness"),
        ],
    },
];

/// All taxonomy rows in seeding order: each criterion followed by its
/// key indicators.
pub fn entries() -> Vec<TaxonomyEntry> {
    let mut out = Vec::new();
    for (i, c) in CRITERIA.iter().enumerate() {
        out.push(TaxonomyEntry {
            criterion: c.title,
            number: (i + 1) as f64,
            key_indicator: c.title,
        });
        for (num, title) in c.indicators {
            out.push(TaxonomyEntry {
                criterion: c.title,
                number: num.parse().unwrap_or_default(),
                key_indicator: title,
            });
        }
    }
    out
}

/// Find the taxonomy entry for a criterion or key-indicator number.
///
/// Numbers are compared after rounding to one decimal place, so `2.10`
/// parsed from a PDF matches `2.1`.
pub fn lookup(number: f64) -> Option<TaxonomyEntry> {
    let key = (number * 10.0).round() as i64;
    entries()
        .into_iter()
        .find(|e| (e.number * 10.0).round() as i64 == key)
}
