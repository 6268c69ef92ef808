use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FieldViolation, Result, ReviewError};

pub const MIN_SCORE: i32 = 0;
pub const MAX_SCORE: i32 = 10;

/// The four scored areas, in their fixed declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Work,
    Training,
    Studies,
    Mind,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Work,
        Dimension::Training,
        Dimension::Studies,
        Dimension::Mind,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Work => "work",
            Dimension::Training => "training",
            Dimension::Studies => "studies",
            Dimension::Mind => "mind",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimension::Work => "Work",
            Dimension::Training => "Training",
            Dimension::Studies => "Studies",
            Dimension::Mind => "Mind",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Intake tuple, before validation and persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecord {
    pub work: i32,
    pub training: i32,
    pub studies: i32,
    pub mind: i32,
    pub positive_notes: String,
    pub negative_notes: String,
}

impl NewRecord {
    /// Checks every field and reports all violations at once.
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        for (field, value) in [
            ("work", self.work),
            ("training", self.training),
            ("studies", self.studies),
            ("mind", self.mind),
        ] {
            if !(MIN_SCORE..=MAX_SCORE).contains(&value) {
                violations.push(FieldViolation {
                    field,
                    message: format!(
                        "{field} must be between {MIN_SCORE} and {MAX_SCORE} (got {value})"
                    ),
                });
            }
        }

        for (field, value) in [
            ("positive_notes", &self.positive_notes),
            ("negative_notes", &self.negative_notes),
        ] {
            if value.trim().is_empty() {
                violations.push(FieldViolation {
                    field,
                    message: format!("{field} must not be empty"),
                });
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ReviewError::Validation(violations))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyRecord {
    pub id: i64,
    pub work: i32,
    pub training: i32,
    pub studies: i32,
    pub mind: i32,
    pub positive_notes: String,
    pub negative_notes: String,
    /// `None` only for rows read from a legacy table without the column.
    pub created_at: Option<DateTime<Utc>>,
}

impl DailyRecord {
    pub fn score(&self, dimension: Dimension) -> i32 {
        match dimension {
            Dimension::Work => self.work,
            Dimension::Training => self.training,
            Dimension::Studies => self.studies,
            Dimension::Mind => self.mind,
        }
    }

    pub fn scores(&self) -> [i32; 4] {
        [self.work, self.training, self.studies, self.mind]
    }

    pub fn average_score(&self) -> f64 {
        self.scores().iter().sum::<i32>() as f64 / 4.0
    }
}

/// Per-dimension means over a window. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyAggregate {
    pub avg_work: f64,
    pub avg_training: f64,
    pub avg_studies: f64,
    pub avg_mind: f64,
    pub total_reviews: i64,
    pub overall_average: f64,
}

impl WeeklyAggregate {
    /// Builds an aggregate from raw means, rounding to two decimals.
    ///
    /// `overall_average` is taken from the unrounded means so rounding is
    /// applied once.
    pub fn from_means(means: [f64; 4], total_reviews: i64) -> Result<Self> {
        if total_reviews <= 0 {
            return Err(ReviewError::NoData);
        }
        let overall = means.iter().sum::<f64>() / 4.0;
        Ok(Self {
            avg_work: round2(means[0]),
            avg_training: round2(means[1]),
            avg_studies: round2(means[2]),
            avg_mind: round2(means[3]),
            total_reviews,
            overall_average: round2(overall),
        })
    }

    #[cfg(test)]
    pub fn from_records(records: &[DailyRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(ReviewError::NoData);
        }
        let count = records.len() as f64;
        let mut sums = [0.0; 4];
        for record in records {
            for (sum, score) in sums.iter_mut().zip(record.scores()) {
                *sum += score as f64;
            }
        }
        Self::from_means(sums.map(|s| s / count), records.len() as i64)
    }

    pub fn average(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Work => self.avg_work,
            Dimension::Training => self.avg_training,
            Dimension::Studies => self.avg_studies,
            Dimension::Mind => self.avg_mind,
        }
    }
}

/// Ordered performance tiers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceLevel {
    NeedsImprovement,
    Average,
    Good,
    Excellent,
}

impl PerformanceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceLevel::Excellent => "excellent",
            PerformanceLevel::Good => "good",
            PerformanceLevel::Average => "average",
            PerformanceLevel::NeedsImprovement => "needs_improvement",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PerformanceLevel::Excellent => "Excellent",
            PerformanceLevel::Good => "Good",
            PerformanceLevel::Average => "Average",
            PerformanceLevel::NeedsImprovement => "Needs improvement",
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) fn sample_record(id: i64, scores: [i32; 4]) -> DailyRecord {
    DailyRecord {
        id,
        work: scores[0],
        training: scores[1],
        studies: scores[2],
        mind: scores[3],
        positive_notes: "shipped the release".to_string(),
        negative_notes: "slept late".to_string(),
        created_at: Some(Utc::now()),
    }
}
