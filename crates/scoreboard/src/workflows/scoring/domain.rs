use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::rules::AppliedFormula;

/// Sentinel assigned to rows that arrive without an employee identifier.
pub const UNKNOWN_EMPLOYEE: &str = "UNKNOWN";

/// Case-insensitive employee identifier, stored uppercased and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct EmployeeId(String);

impl EmployeeId {
    pub fn new(raw: &str) -> Self {
        let cleaned = raw.replace(['\u{feff}', '\u{200b}'], "");
        let trimmed = cleaned.trim();
        if trimmed.is_empty() {
            Self(UNKNOWN_EMPLOYEE.to_string())
        } else {
            Self(trimmed.to_uppercase())
        }
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_EMPLOYEE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_EMPLOYEE
    }
}

impl From<String> for EmployeeId {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for EmployeeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<EmployeeId> for String {
    fn from(value: EmployeeId) -> Self {
        value.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role resolved for an employee during scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Analyst,
    TeamLead,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Analyst => "Analyst",
            Role::TeamLead => "Team Lead",
        }
    }

    pub const fn ordered() -> [Role; 2] {
        [Role::Analyst, Role::TeamLead]
    }
}

/// Raw activity counts for one employee, merged from both source exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub id: EmployeeId,
    pub counts: BTreeMap<String, f64>,
}

impl EmployeeRecord {
    pub fn new(id: EmployeeId) -> Self {
        Self {
            id,
            counts: BTreeMap::new(),
        }
    }

    pub fn with_count(mut self, field: &str, value: f64) -> Self {
        self.add_count(field, value);
        self
    }

    /// Adds to the named count; repeated rows for the same employee accumulate.
    pub fn add_count(&mut self, field: &str, value: f64) {
        *self.counts.entry(field.to_string()).or_insert(0.0) += value;
    }

    pub fn count(&self, field: &str) -> f64 {
        self.counts.get(field).copied().unwrap_or(0.0)
    }

    pub fn sum_of<'a, I>(&self, fields: I) -> f64
    where
        I: IntoIterator<Item = &'a String>,
    {
        fields.into_iter().map(|field| self.count(field)).sum()
    }
}

/// One record per employee id for a reporting period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRecordSet {
    records: BTreeMap<EmployeeId, EmployeeRecord>,
}

impl EmployeeRecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `id`, creating an empty one on first sight.
    pub fn entry(&mut self, id: EmployeeId) -> &mut EmployeeRecord {
        self.records
            .entry(id.clone())
            .or_insert_with(|| EmployeeRecord::new(id))
    }

    pub fn insert(&mut self, record: EmployeeRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &EmployeeId) -> Option<&EmployeeRecord> {
        self.records.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmployeeRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<EmployeeRecord> for EmployeeRecordSet {
    fn from_iter<T: IntoIterator<Item = EmployeeRecord>>(iter: T) -> Self {
        let mut set = Self::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

/// Effective human ratings keyed by employee.
pub type ApprovedRatings = BTreeMap<EmployeeId, u8>;

/// Derived scores for one employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: EmployeeId,
    pub role: Role,
    pub formula: AppliedFormula,
    pub volume: f64,
    pub target: f64,
    pub system_score: f64,
    pub final_score: f64,
}

/// Scored output of a reporting period, keyed by employee id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecordSet {
    records: BTreeMap<EmployeeId, ScoredRecord>,
}

impl ScoredRecordSet {
    pub fn get(&self, id: &EmployeeId) -> Option<&ScoredRecord> {
        self.records.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredRecord> {
        self.records.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ScoredRecord> {
        self.records.values_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn by_role(&self, role: Role) -> impl Iterator<Item = &ScoredRecord> {
        self.records.values().filter(move |record| record.role == role)
    }
}

impl FromIterator<ScoredRecord> for ScoredRecordSet {
    fn from_iter<T: IntoIterator<Item = ScoredRecord>>(iter: T) -> Self {
        Self {
            records: iter
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect(),
        }
    }
}

/// Calendar month a dataset was published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "PeriodParts")]
pub struct ReportingPeriod {
    year: i32,
    month: u32,
}

impl ReportingPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|date| Self {
            year: date.year(),
            month: date.month(),
        })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

#[derive(Deserialize)]
struct PeriodParts {
    year: i32,
    month: u32,
}

impl TryFrom<PeriodParts> for ReportingPeriod {
    type Error = String;

    fn try_from(parts: PeriodParts) -> Result<Self, Self::Error> {
        Self::new(parts.year, parts.month)
            .ok_or_else(|| format!("invalid reporting period {}-{}", parts.year, parts.month))
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
