//! Immutable configuration shared by the analyzer, the schedule and the CLI.
//!
//! Every rule table lives here as data. `Default` reproduces the values the
//! digest has always shipped with; nothing reads process-wide state.

use chrono::{NaiveTime, Weekday};
use serde::Serialize;

use crate::models::{Dimension, PerformanceLevel};

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub app_name: String,
    pub app_version: String,
    /// Trailing window, in days, covered by a weekly report.
    pub window_days: i64,
    pub analysis: AnalysisConfig,
    pub schedule: ScheduleConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "Daily Review Digest".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            window_days: 7,
            analysis: AnalysisConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn with_app_name(mut self, app_name: Option<String>) -> Self {
        if let Some(name) = app_name.filter(|n| !n.trim().is_empty()) {
            self.app_name = name;
        }
        self
    }
}

/// One tier of the classification table.
#[derive(Debug, Clone, Serialize)]
pub struct TierRule {
    pub level: PerformanceLevel,
    /// Inclusive lower bound on the overall average.
    pub threshold: f64,
    pub messages: Vec<String>,
}

/// A threshold band that yields one line of text.
#[derive(Debug, Clone, Serialize)]
pub struct Band {
    pub min: f64,
    /// Whether `min` itself belongs to the band.
    pub inclusive: bool,
    pub text: String,
}

impl Band {
    fn new(min: f64, inclusive: bool, text: &str) -> Self {
        Self {
            min,
            inclusive,
            text: text.to_string(),
        }
    }

    pub fn matches(&self, value: f64) -> bool {
        if self.inclusive {
            value >= self.min
        } else {
            value > self.min
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisConfig {
    /// Tiers ordered from highest threshold to lowest; the last one is the floor.
    pub tiers: Vec<TierRule>,
    /// `{area}` is replaced with the dimension label.
    pub strongest_insight: String,
    pub weakest_insight: String,
    /// Checked top-down; the first matching band wins.
    pub consistency_insights: Vec<Band>,
    pub overall_insights: Vec<Band>,
    pub weakest_recommendations: Vec<(Dimension, String)>,
    /// Consistency below this value adds `irregular_recommendation`.
    pub irregular_below: f64,
    pub irregular_recommendation: String,
    pub low_overall_below: f64,
    pub low_overall_recommendation: String,
    pub high_overall_from: f64,
    pub high_overall_recommendation: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                tier(
                    PerformanceLevel::Excellent,
                    8.5,
                    &[
                        "Congratulations! Your week was outstanding!",
                        "You are on the right track, keep it up!",
                        "Excellent performance across every area!",
                    ],
                ),
                tier(
                    PerformanceLevel::Good,
                    7.0,
                    &[
                        "Good week! You are making solid progress!",
                        "Keep up this positive rhythm!",
                        "You are improving steadily!",
                    ],
                ),
                tier(
                    PerformanceLevel::Average,
                    5.5,
                    &[
                        "A balanced week with room to improve.",
                        "Focus on the areas that need more attention.",
                        "Small adjustments can make a big difference!",
                    ],
                ),
                tier(
                    PerformanceLevel::NeedsImprovement,
                    0.0,
                    &[
                        "This week was challenging, but you can do better!",
                        "Every day is a new chance to grow.",
                        "Let's focus on small daily improvements!",
                    ],
                ),
            ],
            strongest_insight: "Your strongest area this week was: {area}".to_string(),
            weakest_insight: "Area to focus on: {area}".to_string(),
            consistency_insights: vec![
                Band::new(7.0, false, "You kept a very consistent routine!"),
                Band::new(
                    5.0,
                    false,
                    "Your routine had some variation, but you are on the right track.",
                ),
                Band::new(0.0, true, "How about aiming for a more regular routine?"),
            ],
            overall_insights: vec![
                Band::new(8.0, true, "Exceptional week! Keep going!"),
                Band::new(7.0, true, "Good week! You are making solid progress!"),
                Band::new(6.0, true, "Balanced week, there is room to improve."),
                Band::new(0.0, true, "Challenging week, but you can improve!"),
            ],
            weakest_recommendations: vec![
                (
                    Dimension::Work,
                    "Try organising your work tasks more deliberately.".to_string(),
                ),
                (
                    Dimension::Training,
                    "Aim for at least 30 minutes of physical activity a day.".to_string(),
                ),
                (
                    Dimension::Studies,
                    "Set aside a fixed time to study every day.".to_string(),
                ),
                (
                    Dimension::Mind,
                    "Practice meditation or other relaxing activities.".to_string(),
                ),
            ],
            irregular_below: 5.0,
            irregular_recommendation: "Try to keep more regular hours for your activities."
                .to_string(),
            low_overall_below: 6.0,
            low_overall_recommendation:
                "Focus on small daily improvements, they make a big difference!".to_string(),
            high_overall_from: 8.0,
            high_overall_recommendation: "Keep up this excellent standard!".to_string(),
        }
    }
}

fn tier(level: PerformanceLevel, threshold: f64, messages: &[&str]) -> TierRule {
    TierRule {
        level,
        threshold,
        messages: messages.iter().map(|m| m.to_string()).collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleConfig {
    /// Days on which a check-in request goes out. Never empty.
    pub send_days: Vec<Weekday>,
    pub send_time: NaiveTime,
    /// Day on which the scheduled cycle produces the weekly report.
    pub report_day: Weekday,
    pub form_url: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            send_days: vec![Weekday::Mon, Weekday::Wed, Weekday::Fri],
            send_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default(),
            report_day: Weekday::Sat,
            form_url: "http://localhost:5000/form".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_sorted_descending() {
        let config = AnalysisConfig::default();
        let thresholds: Vec<f64> = config.tiers.iter().map(|t| t.threshold).collect();
        assert_eq!(thresholds, vec![8.5, 7.0, 5.5, 0.0]);
        assert!(config.tiers.iter().all(|t| t.messages.len() == 3));
    }

    #[test]
    fn consistency_bands_are_exclusive_at_boundaries() {
        let config = AnalysisConfig::default();
        assert!(!config.consistency_insights[0].matches(7.0));
        assert!(config.consistency_insights[1].matches(7.0));
        assert!(!config.consistency_insights[1].matches(5.0));
        assert!(config.consistency_insights[2].matches(5.0));
    }

    #[test]
    fn default_schedule_sends_mon_wed_fri_at_eight() {
        let schedule = ScheduleConfig::default();
        assert_eq!(
            schedule.send_days,
            vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]
        );
        assert_eq!(schedule.send_time, NaiveTime::from_hms_opt(20, 0, 0).unwrap());
    }

    #[test]
    fn blank_app_name_keeps_default() {
        let config = AppConfig::default().with_app_name(Some("  ".to_string()));
        assert_eq!(config.app_name, "Daily Review Digest");
        let config = AppConfig::default().with_app_name(Some("My Diary".to_string()));
        assert_eq!(config.app_name, "My Diary");
    }
}
