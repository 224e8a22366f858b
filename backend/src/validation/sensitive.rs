//! Screening for direct identifiers.
//!
//! Each [`Detector`] looks at one column (its name and a sample of non-empty
//! values) and independently decides whether it probably holds identifying
//! data. The [`Screen`] runs every detector over every column that the schema
//! has not marked `identifier_exempt` and concatenates the hits.

use crate::validation::decode::Dataset;
use common::model::report::SensitiveHit;
use common::model::schema::{ColumnDescriptor, SchemaStructure};
use regex::Regex;

/// What a detector gets to see of a column.
pub struct ColumnSample<'a> {
    pub name: &'a str,
    /// Lower-cased name with spaces and hyphens folded to underscores.
    pub normalized_name: String,
    pub values: Vec<&'a str>,
    pub declared: Option<&'a ColumnDescriptor>,
}

impl<'a> ColumnSample<'a> {
    fn name_tokens(&self) -> impl Iterator<Item = &str> {
        self.normalized_name.split('_').filter(|t| !t.is_empty())
    }

    fn count_matching<F: Fn(&str) -> bool>(&self, pred: F) -> usize {
        self.values.iter().filter(|v| pred(**v)).count()
    }

    fn hit(&self, detector: &str, reason: String, matches: usize) -> SensitiveHit {
        SensitiveHit {
            column: self.name.to_string(),
            detector: detector.to_string(),
            reason,
            matches,
            sampled: self.values.len(),
        }
    }
}

pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;
    fn inspect(&self, column: &ColumnSample<'_>) -> Option<SensitiveHit>;
}

/// At least half of the sampled values match.
fn majority(matches: usize, sampled: usize) -> bool {
    sampled > 0 && matches * 2 >= sampled
}

/// Column names that on their own announce an identifier.
pub struct IdentityColumnDetector {
    substrings: Vec<&'static str>,
    tokens: Vec<&'static str>,
}

impl Default for IdentityColumnDetector {
    fn default() -> Self {
        Self {
            substrings: vec![
                "chart_no", "chartno", "birth_date", "birthdate", "date_of_birth", "patient_id",
                "id_number", "national_id", "patient_name", "medical_record", "姓名", "病歷號",
                "身分證", "身份證", "出生", "生日", "電話", "地址",
            ],
            tokens: vec![
                "dob", "ssn", "mrn", "passport", "phone", "mobile", "telephone", "email",
                "address",
            ],
        }
    }
}

impl Detector for IdentityColumnDetector {
    fn name(&self) -> &'static str {
        "identity_column"
    }

    fn inspect(&self, column: &ColumnSample<'_>) -> Option<SensitiveHit> {
        let keyword = self
            .substrings
            .iter()
            .find(|k| column.normalized_name.contains(*k))
            .copied()
            .or_else(|| {
                column
                    .name_tokens()
                    .find_map(|t| self.tokens.iter().find(|k| **k == t).copied())
            })?;
        Some(column.hit(
            self.name(),
            format!("column name contains identifier keyword '{}'", keyword),
            0,
        ))
    }
}

/// Free-text personal names in a column whose name suggests a person.
pub struct PersonNameDetector {
    latin: Regex,
    cjk: Regex,
}

impl PersonNameDetector {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            latin: Regex::new(r"^[A-Z][a-z'\-]+(?:\s+[A-Z][a-z'\-]*\.?){1,3}$")?,
            cjk: Regex::new(r"^\p{Han}{2,4}$")?,
        })
    }

    fn suggests_person(column: &ColumnSample<'_>) -> bool {
        if column.normalized_name.contains("姓名") {
            return true;
        }
        let tokens: Vec<&str> = column.name_tokens().collect();
        if !tokens.contains(&"name") && !tokens.contains(&"surname") {
            return false;
        }
        tokens.len() == 1
            || tokens.iter().any(|t| {
                matches!(
                    *t,
                    "patient" | "first" | "last" | "full" | "given" | "family" | "surname"
                        | "subject" | "person" | "contact" | "father" | "mother"
                )
            })
    }
}

impl Detector for PersonNameDetector {
    fn name(&self) -> &'static str {
        "person_name"
    }

    fn inspect(&self, column: &ColumnSample<'_>) -> Option<SensitiveHit> {
        if !Self::suggests_person(column) {
            return None;
        }
        let matches = column.count_matching(|v| self.latin.is_match(v) || self.cjk.is_match(v));
        majority(matches, column.values.len()).then(|| {
            column.hit(
                self.name(),
                "values look like personal names".to_string(),
                matches,
            )
        })
    }
}

/// Taiwan national ID / resident certificate numbers (checksum verified) and
/// US social security numbers.
pub struct NationalIdDetector {
    ssn: Regex,
}

impl NationalIdDetector {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            ssn: Regex::new(
                r"^(?:00[1-9]|0[1-9]\d|[1-578]\d{2}|6[0-57-9]\d|66[0-57-9])-\d{2}-\d{4}$",
            )?,
        })
    }
}

/// Two-digit area codes for the leading letter, A..=Z.
const TW_AREA_CODES: [u32; 26] = [
    10, 11, 12, 13, 14, 15, 16, 17, 34, 18, 19, 20, 21, 22, 35, 23, 24, 25, 26, 27, 28, 29, 32, 30,
    31, 33,
];

pub fn is_taiwan_national_id(value: &str) -> bool {
    let b = value.as_bytes();
    if b.len() != 10 || !b[0].is_ascii_uppercase() || !b[1..].iter().all(u8::is_ascii_digit) {
        return false;
    }
    if !matches!(b[1], b'1' | b'2' | b'8' | b'9') {
        return false;
    }
    let area = TW_AREA_CODES[(b[0] - b'A') as usize];
    let mut sum = area / 10 + (area % 10) * 9;
    for (i, weight) in (1..9).zip((1..=8).rev()) {
        sum += u32::from(b[i] - b'0') * weight;
    }
    sum += u32::from(b[9] - b'0');
    sum % 10 == 0
}

impl Detector for NationalIdDetector {
    fn name(&self) -> &'static str {
        "national_id"
    }

    fn inspect(&self, column: &ColumnSample<'_>) -> Option<SensitiveHit> {
        let matches =
            column.count_matching(|v| is_taiwan_national_id(v) || self.ssn.is_match(v));
        (matches > 0).then(|| {
            column.hit(
                self.name(),
                "values match a national identification number".to_string(),
                matches,
            )
        })
    }
}

pub struct PhoneNumberDetector {
    patterns: Vec<Regex>,
}

impl PhoneNumberDetector {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = [
            r"^09\d{2}-?\d{3}-?\d{3}$",
            r"^\(?0\d{1,2}\)?[-\s]?\d{3,4}[-\s]?\d{4}$",
            r"^\+\d{1,3}[-\s]?\(?\d{1,4}\)?(?:[-\s]?\d{2,4}){2,4}$",
            r"^\(?\d{3}\)?[-\s.]\d{3}[-\s.]\d{4}$",
        ];
        Ok(Self {
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<_, _>>()?,
        })
    }
}

impl Detector for PhoneNumberDetector {
    fn name(&self) -> &'static str {
        "phone_number"
    }

    fn inspect(&self, column: &ColumnSample<'_>) -> Option<SensitiveHit> {
        let matches = column.count_matching(|v| self.patterns.iter().any(|p| p.is_match(v)));
        majority(matches, column.values.len()).then(|| {
            column.hit(
                self.name(),
                "values look like phone numbers".to_string(),
                matches,
            )
        })
    }
}

/// Full calendar dates in a column the schema does not declare as a date.
pub struct DateOfBirthDetector {
    year_first: Regex,
    year_last: Regex,
}

impl DateOfBirthDetector {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            year_first: Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})$")?,
            year_last: Regex::new(r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})$")?,
        })
    }

    fn is_full_date(&self, value: &str) -> bool {
        let plausible = |month: u32, day: u32| (1..=12).contains(&month) && (1..=31).contains(&day);
        if let Some(c) = self.year_first.captures(value) {
            let (m, d) = (c[2].parse().unwrap_or(0), c[3].parse().unwrap_or(0));
            return plausible(m, d);
        }
        if let Some(c) = self.year_last.captures(value) {
            let (a, b): (u32, u32) = (c[1].parse().unwrap_or(0), c[2].parse().unwrap_or(0));
            return plausible(b, a) || plausible(a, b);
        }
        false
    }
}

impl Detector for DateOfBirthDetector {
    fn name(&self) -> &'static str {
        "date_of_birth"
    }

    fn inspect(&self, column: &ColumnSample<'_>) -> Option<SensitiveHit> {
        if column
            .declared
            .is_some_and(|d| d.column_type.is_date_like())
        {
            return None;
        }
        let matches = column.count_matching(|v| self.is_full_date(v));
        majority(matches, column.values.len()).then(|| {
            column.hit(
                self.name(),
                "full calendar dates in a column not declared as a date field".to_string(),
                matches,
            )
        })
    }
}

pub struct Screen {
    detectors: Vec<Box<dyn Detector>>,
}

impl Screen {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// The detector set used in production.
    pub fn standard() -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            Box::new(IdentityColumnDetector::default()),
            Box::new(PersonNameDetector::new()?),
            Box::new(NationalIdDetector::new()?),
            Box::new(PhoneNumberDetector::new()?),
            Box::new(DateOfBirthDetector::new()?),
        ]))
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Runs every detector over the first `sample_rows` rows of each column.
    pub fn scan(
        &self,
        dataset: &Dataset,
        structure: &SchemaStructure,
        sample_rows: usize,
    ) -> Vec<SensitiveHit> {
        let mut hits = Vec::new();
        for (index, name) in dataset.header.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            let declared = structure.column(name);
            if declared.is_some_and(|d| d.identifier_exempt) {
                continue;
            }
            let sample = ColumnSample {
                name,
                normalized_name: name.to_lowercase().replace([' ', '-'], "_"),
                values: dataset
                    .rows
                    .iter()
                    .take(sample_rows)
                    .map(|row| row[index].as_str())
                    .filter(|v| !v.is_empty())
                    .collect(),
                declared,
            };
            hits.extend(self.detectors.iter().filter_map(|d| d.inspect(&sample)));
        }
        hits
    }
}
