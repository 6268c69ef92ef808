use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::error::{Result, ReviewError};
use crate::models::{DailyRecord, Dimension, PerformanceLevel, WeeklyAggregate, MAX_SCORE, MIN_SCORE};

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub performance_level: PerformanceLevel,
    pub strongest_area: Dimension,
    pub weakest_area: Dimension,
    pub consistency_score: f64,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub motivational_message: String,
    pub summary_text: String,
}

pub fn analyze(
    config: &AnalysisConfig,
    aggregate: &WeeklyAggregate,
    records: &[DailyRecord],
) -> Result<AnalysisResult> {
    analyze_with_rng(config, aggregate, records, &mut rand::thread_rng())
}

/// Same as [`analyze`] with a caller-supplied source for the message pick.
pub fn analyze_with_rng<R: Rng + ?Sized>(
    config: &AnalysisConfig,
    aggregate: &WeeklyAggregate,
    records: &[DailyRecord],
    rng: &mut R,
) -> Result<AnalysisResult> {
    check_aggregate(aggregate)?;
    check_records(records)?;

    let performance_level = classify(config, aggregate.overall_average);
    let means = dimension_means(records);
    let (strongest_area, weakest_area) = strongest_and_weakest(&means);
    let consistency_score = consistency_score(records);

    let insights = insights(
        config,
        aggregate.overall_average,
        strongest_area,
        weakest_area,
        consistency_score,
    );
    let recommendations = recommendations(
        config,
        aggregate.overall_average,
        weakest_area,
        consistency_score,
    );
    let motivational_message = motivational_message(config, performance_level, rng)?;
    let summary_text = summary_text(aggregate, strongest_area, weakest_area, consistency_score);

    Ok(AnalysisResult {
        performance_level,
        strongest_area,
        weakest_area,
        consistency_score,
        insights,
        recommendations,
        motivational_message,
        summary_text,
    })
}

/// First tier whose inclusive lower bound the average reaches.
pub fn classify(config: &AnalysisConfig, overall_average: f64) -> PerformanceLevel {
    config
        .tiers
        .iter()
        .find(|tier| overall_average >= tier.threshold)
        .or(config.tiers.last())
        .map(|tier| tier.level)
        .unwrap_or(PerformanceLevel::NeedsImprovement)
}

pub fn dimension_means(records: &[DailyRecord]) -> [(Dimension, f64); 4] {
    let count = records.len().max(1) as f64;
    Dimension::ALL.map(|dimension| {
        let total: i32 = records.iter().map(|r| r.score(dimension)).sum();
        (dimension, total as f64 / count)
    })
}

/// Arg-max and arg-min; ties keep the earlier dimension.
pub fn strongest_and_weakest(means: &[(Dimension, f64); 4]) -> (Dimension, Dimension) {
    let mut strongest = means[0];
    let mut weakest = means[0];
    for &(dimension, mean) in &means[1..] {
        if mean > strongest.1 {
            strongest = (dimension, mean);
        }
        if mean < weakest.1 {
            weakest = (dimension, mean);
        }
    }
    (strongest.0, weakest.0)
}

/// `10 - σ` over every individual score, clamped to [0, 10].
pub fn consistency_score(records: &[DailyRecord]) -> f64 {
    let scores: Vec<f64> = records
        .iter()
        .flat_map(|r| r.scores())
        .map(f64::from)
        .collect();
    if scores.is_empty() {
        return 0.0;
    }

    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    (10.0 - variance.sqrt()).clamp(0.0, 10.0)
}

fn insights(
    config: &AnalysisConfig,
    overall_average: f64,
    strongest: Dimension,
    weakest: Dimension,
    consistency: f64,
) -> Vec<String> {
    let mut insights = vec![
        config.strongest_insight.replace("{area}", strongest.label()),
        config.weakest_insight.replace("{area}", weakest.label()),
    ];

    if let Some(band) = config.consistency_insights.iter().find(|b| b.matches(consistency)) {
        insights.push(band.text.clone());
    }
    if let Some(band) = config.overall_insights.iter().find(|b| b.matches(overall_average)) {
        insights.push(band.text.clone());
    }

    insights
}

fn recommendations(
    config: &AnalysisConfig,
    overall_average: f64,
    weakest: Dimension,
    consistency: f64,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if let Some((_, text)) = config
        .weakest_recommendations
        .iter()
        .find(|(dimension, _)| *dimension == weakest)
    {
        recommendations.push(text.clone());
    }

    if consistency < config.irregular_below {
        recommendations.push(config.irregular_recommendation.clone());
    }

    if overall_average < config.low_overall_below {
        recommendations.push(config.low_overall_recommendation.clone());
    } else if overall_average >= config.high_overall_from {
        recommendations.push(config.high_overall_recommendation.clone());
    }

    recommendations
}

fn motivational_message<R: Rng + ?Sized>(
    config: &AnalysisConfig,
    level: PerformanceLevel,
    rng: &mut R,
) -> Result<String> {
    config
        .tiers
        .iter()
        .find(|tier| tier.level == level)
        .and_then(|tier| tier.messages.choose(rng))
        .cloned()
        .ok_or_else(|| {
            ReviewError::Analysis(format!("no motivational messages for tier {}", level.as_str()))
        })
}

pub fn summary_text(
    aggregate: &WeeklyAggregate,
    strongest: Dimension,
    weakest: Dimension,
    consistency: f64,
) -> String {
    format!(
        "WEEK IN SUMMARY\n\
         Overall average: {:.2}/10\n\
         Days reviewed: {}\n\
         Strongest area: {}\n\
         Area to improve: {}\n\
         Consistency: {:.1}/10",
        aggregate.overall_average, aggregate.total_reviews, strongest, weakest, consistency
    )
}

fn check_aggregate(aggregate: &WeeklyAggregate) -> Result<()> {
    if aggregate.total_reviews <= 0 {
        return Err(ReviewError::Analysis(format!(
            "total_reviews must be positive (got {})",
            aggregate.total_reviews
        )));
    }

    let range = f64::from(MIN_SCORE)..=f64::from(MAX_SCORE);
    let mut fields: Vec<(&str, f64)> = Dimension::ALL
        .iter()
        .map(|d| (d.as_str(), aggregate.average(*d)))
        .collect();
    fields.push(("overall_average", aggregate.overall_average));

    for (name, value) in fields {
        if !range.contains(&value) {
            return Err(ReviewError::Analysis(format!(
                "{name} average {value} is outside [{MIN_SCORE}, {MAX_SCORE}]"
            )));
        }
    }
    Ok(())
}

fn check_records(records: &[DailyRecord]) -> Result<()> {
    if records.is_empty() {
        return Err(ReviewError::Analysis("no records to analyze".to_string()));
    }
    if let Some(record) = records
        .iter()
        .find(|r| r.scores().iter().any(|s| !(MIN_SCORE..=MAX_SCORE).contains(s)))
    {
        return Err(ReviewError::Analysis(format!(
            "record {} has a score outside [{MIN_SCORE}, {MAX_SCORE}]",
            record.id
        )));
    }
    Ok(())
}
