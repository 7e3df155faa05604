//! Issue records and voice counts
//!
//! Rows of the input table are read as raw strings and parsed one by one,
//! so a malformed row only costs that record.

use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CrowdError, Result};
use crate::speech::Stance;

// ============================================================================
// Population
// ============================================================================

/// Perspective a pair of crowds represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Population {
    Scientific,
    Public,
}

impl Population {
    pub const ALL: [Population; 2] = [Population::Scientific, Population::Public];

    /// Short key used in output file names
    pub fn key(&self) -> &'static str {
        match self {
            Population::Scientific => "sci",
            Population::Public => "pub",
        }
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Population::Scientific => f.write_str("scientific"),
            Population::Public => f.write_str("public"),
        }
    }
}

// ============================================================================
// Voice Counts
// ============================================================================

/// Agree/disagree split of one population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCounts {
    pub agree: u32,
    pub disagree: u32,
}

impl VoiceCounts {
    /// Split `total` voices by an agreement percentage
    ///
    /// `agree` is `total * pct / 100` rounded half-to-even and `disagree`
    /// takes the remainder, so the two always sum to `total`. Percentages
    /// outside [0, 100] are clamped.
    pub fn from_percentage(total: u32, pct: f64) -> Self {
        let pct = if pct.is_nan() { 0.0 } else { pct.clamp(0.0, 100.0) };
        let agree = (total as f64 * pct / 100.0).round_ties_even() as u32;
        let agree = agree.min(total);
        Self {
            agree,
            disagree: total - agree,
        }
    }

    pub fn total(&self) -> u32 {
        self.agree + self.disagree
    }

    pub fn for_stance(&self, stance: Stance) -> u32 {
        match stance {
            Stance::Agree => self.agree,
            Stance::Disagree => self.disagree,
        }
    }
}

/// Voice counts for both populations of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub scientific: VoiceCounts,
    pub public: VoiceCounts,
}

impl RecordCounts {
    pub fn get(&self, population: Population) -> VoiceCounts {
        match population {
            Population::Scientific => self.scientific,
            Population::Public => self.public,
        }
    }
}

// ============================================================================
// Issue Record
// ============================================================================

/// A row of the input table before numeric parsing
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    pub issue: String,
    pub statement: String,
    pub scientific_consensus: String,
    pub public_agreement: String,
}

/// A parsed input row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueRecord {
    pub issue_id: String,
    pub statement: String,
    pub scientific_agreement_pct: f64,
    pub public_agreement_pct: f64,
}

impl IssueRecord {
    /// Parse the numeric fields of a raw row
    pub fn parse(row: usize, raw: RawRecord) -> Result<Self> {
        let scientific_agreement_pct =
            parse_percent(row, "scientific_consensus", &raw.scientific_consensus)?;
        let public_agreement_pct = parse_percent(row, "public_agreement", &raw.public_agreement)?;

        if raw.statement.trim().is_empty() {
            return Err(CrowdError::InputParse {
                row,
                field: "statement".to_string(),
                value: raw.statement,
                reason: "statement is empty".to_string(),
            });
        }

        Ok(Self {
            issue_id: raw.issue,
            statement: raw.statement,
            scientific_agreement_pct,
            public_agreement_pct,
        })
    }

    /// Voice counts for both populations out of `population` voices each
    pub fn counts(&self, population: u32) -> RecordCounts {
        RecordCounts {
            scientific: VoiceCounts::from_percentage(population, self.scientific_agreement_pct),
            public: VoiceCounts::from_percentage(population, self.public_agreement_pct),
        }
    }
}

/// Parse a percentage field: a number in [0, 100], optionally followed by `%`
pub fn parse_percent(row: usize, field: &str, value: &str) -> Result<f64> {
    let invalid = |reason: &str| CrowdError::InputParse {
        row,
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = value.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    let pct: f64 = number.parse().map_err(|_| invalid("not a number"))?;

    if !pct.is_finite() {
        return Err(invalid("not a finite number"));
    }
    if !(0.0..=100.0).contains(&pct) {
        return Err(invalid("must be between 0 and 100"));
    }
    Ok(pct)
}

// ============================================================================
// Table Loading
// ============================================================================

/// Read every row of a CSV table, parsing each independently
///
/// The outer order matches the table; row `i` becomes record index `i`.
pub fn read_records<R: Read>(reader: R) -> Vec<Result<IssueRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    csv_reader
        .deserialize::<RawRecord>()
        .enumerate()
        .map(|(row, raw)| {
            let raw = raw.map_err(|e| CrowdError::InputParse {
                row,
                field: "row".to_string(),
                value: String::new(),
                reason: e.to_string(),
            })?;
            IssueRecord::parse(row, raw)
        })
        .collect()
}

/// Open and read a CSV table from disk
pub fn load_records(path: &Path) -> Result<Vec<Result<IssueRecord>>> {
    let file = std::fs::File::open(path).map_err(|e| CrowdError::MissingInput {
        reason: format!("{}: {}", path.display(), e),
        source: Some(Box::new(e)),
    })?;
    Ok(read_records(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(100, 97.0, 97, 3)]
    #[test_case(100, 50.0, 50, 50)]
    #[test_case(100, 0.0, 0, 100)]
    #[test_case(100, 100.0, 100, 0)]
    #[test_case(100, 12.5, 12, 88 ; "half rounds to even below")]
    #[test_case(100, 13.5, 14, 86 ; "half rounds to even above")]
    #[test_case(7, 33.3, 2, 5)]
    #[test_case(1, 50.0, 0, 1)]
    fn test_voice_counts(total: u32, pct: f64, agree: u32, disagree: u32) {
        assert_eq!(
            VoiceCounts::from_percentage(total, pct),
            VoiceCounts { agree, disagree }
        );
    }

    #[test]
    fn test_counts_always_sum_to_population() {
        for total in [1u32, 3, 7, 100, 1000] {
            for step in 0..=1000 {
                let pct = step as f64 / 10.0;
                assert_eq!(VoiceCounts::from_percentage(total, pct).total(), total);
            }
        }
    }

    #[test_case("97", 97.0)]
    #[test_case(" 42.5 ", 42.5)]
    #[test_case("88%", 88.0)]
    #[test_case("0", 0.0)]
    fn test_parse_percent_valid(value: &str, expected: f64) {
        assert_eq!(parse_percent(0, "public_agreement", value).unwrap(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("lots" ; "text")]
    #[test_case("101" ; "above range")]
    #[test_case("-3" ; "negative")]
    #[test_case("NaN" ; "nan")]
    #[test_case("inf" ; "infinite")]
    fn test_parse_percent_invalid(value: &str) {
        let err = parse_percent(4, "scientific_consensus", value).unwrap_err();
        assert_eq!(err.error_code(), "INPUT_PARSE");
        assert!(err.to_string().contains("Row 4"));
    }

    #[test]
    fn test_read_records_keeps_going_after_bad_rows() {
        let table = "\
issue,statement,scientific_consensus,public_agreement
Climate change,humans are warming the planet,97,50
Vaccines,vaccines are safe,ninety,80
Evolution,humans evolved,98,
GMO food,GMO food is safe to eat,88,37
";
        let records = read_records(table.as_bytes());
        assert_eq!(records.len(), 4);
        assert!(records[0].is_ok());
        assert!(records[1].is_err());
        assert!(records[2].is_err());

        let gmo = records[3].as_ref().unwrap();
        assert_eq!(gmo.issue_id, "GMO food");
        assert_eq!(gmo.scientific_agreement_pct, 88.0);
        assert_eq!(gmo.public_agreement_pct, 37.0);
    }

    #[test]
    fn test_record_counts() {
        let record = IssueRecord {
            issue_id: "Climate change / warming".to_string(),
            statement: "the planet is warming".to_string(),
            scientific_agreement_pct: 97.0,
            public_agreement_pct: 50.0,
        };
        let counts = record.counts(100);
        assert_eq!(counts.get(Population::Scientific), VoiceCounts { agree: 97, disagree: 3 });
        assert_eq!(counts.get(Population::Public), VoiceCounts { agree: 50, disagree: 50 });
    }

    #[test]
    fn test_empty_statement_rejected() {
        let raw = RawRecord {
            issue: "x".to_string(),
            statement: "  ".to_string(),
            scientific_consensus: "50".to_string(),
            public_agreement: "50".to_string(),
        };
        assert!(IssueRecord::parse(0, raw).is_err());
    }

    #[test]
    fn test_load_missing_table() {
        let err = load_records(Path::new("/nonexistent/consensus_data.csv")).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_INPUT");
    }
}
