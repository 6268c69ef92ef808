use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::{self, AnalysisResult};
use crate::config::AppConfig;
use crate::db::{window_start, RecordStore};
use crate::dispatch::Dispatcher;
use crate::error::{Result, ReviewError};
use crate::models::{DailyRecord, Dimension, WeeklyAggregate};
use crate::schedule::{Clock, Schedule};

const RULE_WIDTH: usize = 50;

/// Where a finished report should go.
pub struct DispatchTarget<'a> {
    pub recipient: &'a str,
    pub dispatcher: &'a dyn Dispatcher,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyReport {
    pub subject: String,
    pub body: String,
    /// Zero for the empty-week variant.
    pub reviews_count: i64,
    pub aggregate: Option<WeeklyAggregate>,
    pub analysis: Option<AnalysisResult>,
    pub dispatched: bool,
}

pub struct ReportAssembler<'a, S, C> {
    store: &'a S,
    config: &'a AppConfig,
    clock: &'a C,
}

impl<'a, S: RecordStore, C: Clock> ReportAssembler<'a, S, C> {
    pub fn new(store: &'a S, config: &'a AppConfig, clock: &'a C) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Builds the weekly report and, when a target is given, dispatches it once.
    pub async fn generate(&self, target: Option<DispatchTarget<'_>>) -> Result<WeeklyReport> {
        let now = self.clock.now();
        let days = self.config.window_days;
        info!(window_days = days, "generating weekly report");

        let aggregate = match self.store.aggregate_last_n_days(now, days).await {
            Ok(aggregate) => aggregate,
            Err(ReviewError::NoData) => {
                info!("no reviews in window, using empty-week report");
                return self.finish(self.empty_week(now), target);
            }
            Err(err) => return Err(err),
        };

        let start = window_start(now, days)?;
        let records = match self.store.query_window(start, now).await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "window query failed, falling back to all records");
                self.store.all_records().await?
            }
        };
        if records.is_empty() {
            info!("aggregate found reviews but the window is empty, using empty-week report");
            return self.finish(self.empty_week(now), target);
        }

        let analysis = analysis::analyze(&self.config.analysis, &aggregate, &records)?;
        let report = WeeklyReport {
            subject: format!(
                "{} - Weekly Report ({})",
                self.config.app_name,
                now.format("%d/%m/%Y")
            ),
            body: render_report(self.config, &aggregate, &analysis, now),
            reviews_count: aggregate.total_reviews,
            aggregate: Some(aggregate),
            analysis: Some(analysis),
            dispatched: false,
        };
        self.finish(report, target)
    }

    fn empty_week(&self, now: DateTime<Utc>) -> WeeklyReport {
        WeeklyReport {
            subject: format!(
                "{} - No Reviews This Week ({})",
                self.config.app_name,
                now.format("%d/%m/%Y")
            ),
            body: render_empty_week(self.config, now),
            reviews_count: 0,
            aggregate: None,
            analysis: None,
            dispatched: false,
        }
    }

    fn finish(
        &self,
        mut report: WeeklyReport,
        target: Option<DispatchTarget<'_>>,
    ) -> Result<WeeklyReport> {
        if let Some(target) = target {
            target
                .dispatcher
                .dispatch(target.recipient, &report.subject, &report.body)?;
            report.dispatched = true;
            info!(recipient = target.recipient, "weekly report dispatched");
        }
        Ok(report)
    }
}

/// Header, motivation, stats, summary, insights, recommendations, closing.
pub fn render_report(
    config: &AppConfig,
    aggregate: &WeeklyAggregate,
    analysis: &AnalysisResult,
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    write_header(&mut output, config);

    let _ = writeln!(output, "{}", analysis.motivational_message);
    let _ = writeln!(output);

    let _ = writeln!(output, "## This Week's Scores");
    for dimension in Dimension::ALL {
        let _ = writeln!(
            output,
            "- {}: {:.2}/10",
            dimension,
            aggregate.average(dimension)
        );
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "Overall average: {:.2}/10", aggregate.overall_average);
    let _ = writeln!(output, "Reviews recorded: {} days", aggregate.total_reviews);
    let _ = writeln!(
        output,
        "Performance level: {}",
        analysis.performance_level.as_str()
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "{}", analysis.summary_text);
    let _ = writeln!(output);

    let _ = writeln!(output, "## Insights");
    for insight in &analysis.insights {
        let _ = writeln!(output, "- {insight}");
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Recommendations for Next Week");
    if analysis.recommendations.is_empty() {
        let _ = writeln!(output, "No specific recommendations this week.");
    } else {
        for recommendation in &analysis.recommendations {
            let _ = writeln!(output, "- {recommendation}");
        }
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Remember");
    let _ = writeln!(output, "Every day is a new chance to grow.");
    let _ = writeln!(output, "Small daily improvements lead to big changes!");
    write_footer(&mut output, config, generated_at);

    output
}

pub fn render_empty_week(config: &AppConfig, generated_at: DateTime<Utc>) -> String {
    let schedule = Schedule::new(&config.schedule);
    let mut output = String::new();

    write_header(&mut output, config);
    let _ = writeln!(output, "Week of {}", generated_at.format("%d/%m/%Y"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## No Reviews Found");
    let _ = writeln!(output, "No daily reviews were recorded this week.");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Remember");
    let _ = writeln!(
        output,
        "- Check-in requests go out on {}",
        schedule.describe()
    );
    let _ = writeln!(output, "- Fill in the form to record your review");
    let _ = writeln!(
        output,
        "- The weekly report with your analysis arrives every {}",
        crate::schedule::weekday_name(config.schedule.report_day)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Next Steps");
    let _ = writeln!(
        output,
        "1. Wait for the next check-in request ({})",
        schedule.next_send_date(generated_at).format("%d/%m/%Y")
    );
    let _ = writeln!(output, "2. Fill in and submit the form");
    let _ = writeln!(output, "3. Keep recording your daily reviews");
    write_footer(&mut output, config, generated_at);

    output
}

/// Subject and body of the check-in request sent on send days.
pub fn render_checkin_request(config: &AppConfig, now: DateTime<Utc>) -> (String, String) {
    let schedule = Schedule::new(&config.schedule);
    let date = now.format("%d/%m/%Y").to_string();
    let subject = format!("{} - Daily check-in ({date})", config.app_name);

    let mut body = String::new();
    let _ = writeln!(body, "# Time for your daily review");
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "Rate today's work, training, studies and mind from 0 to 10 and note one"
    );
    let _ = writeln!(body, "positive and one negative point.");
    let _ = writeln!(body);
    let _ = writeln!(body, "Form: {}?date={date}", config.schedule.form_url);
    let _ = writeln!(
        body,
        "Next check-in: {}",
        schedule.next_send_date(now).format("%d/%m/%Y")
    );
    write_footer(&mut body, config, now);

    (subject, body)
}

/// Receipt for a stored review, rated against the same tier table as the
/// weekly report.
pub fn render_confirmation(
    config: &AppConfig,
    record: &DailyRecord,
    now: DateTime<Utc>,
) -> (String, String) {
    let average = record.average_score();
    let level = analysis::classify(&config.analysis, average);
    let subject = format!(
        "{} - Review received ({})",
        config.app_name,
        now.format("%d/%m/%Y")
    );

    let mut body = String::new();
    let _ = writeln!(body, "# {} - Review Confirmation", config.app_name);
    let _ = writeln!(body, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(body);
    let _ = writeln!(body, "Your review was received.");
    let _ = writeln!(body);
    write_record_scores(&mut body, record);
    let _ = writeln!(body, "Day average: {average:.1}/10");
    let _ = writeln!(body, "Performance: {}", level.label());
    let _ = writeln!(body);
    write_record_notes(&mut body, record);
    let _ = writeln!(body, "## Next Steps");
    let _ = writeln!(body, "- Your review is saved");
    let _ = writeln!(
        body,
        "- The weekly report arrives every {}",
        crate::schedule::weekday_name(config.schedule.report_day)
    );
    let _ = writeln!(body, "- Keep recording daily reviews for sharper insights");
    write_footer(&mut body, config, now);

    (subject, body)
}

/// Notice for the operator that `submitted_by` stored a review.
pub fn render_admin_notification(
    config: &AppConfig,
    record: &DailyRecord,
    submitted_by: &str,
    now: DateTime<Utc>,
) -> (String, String) {
    let subject = format!(
        "{} - New review from {submitted_by} ({})",
        config.app_name,
        now.format("%d/%m/%Y")
    );

    let mut body = String::new();
    let _ = writeln!(body, "# {} - New Review", config.app_name);
    let _ = writeln!(body, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(body);
    let _ = writeln!(body, "Review #{} from {submitted_by}", record.id);
    let _ = writeln!(body);
    write_record_scores(&mut body, record);
    let _ = writeln!(body, "Day average: {:.1}/10", record.average_score());
    let _ = writeln!(body);
    write_record_notes(&mut body, record);
    let _ = writeln!(body, "## Status");
    let _ = writeln!(body, "- Saved to the database");
    let _ = writeln!(body, "- Confirmation sent to the submitter");
    let _ = writeln!(body, "- Included in the next weekly report");
    write_footer(&mut body, config, now);

    (subject, body)
}

/// Sends the intake confirmation, then the operator notice when an admin
/// recipient is configured. Stops at the first dispatch failure.
pub fn send_intake_notices(
    config: &AppConfig,
    record: &DailyRecord,
    now: DateTime<Utc>,
    user: &DispatchTarget<'_>,
    admin: Option<&DispatchTarget<'_>>,
) -> Result<()> {
    let (subject, body) = render_confirmation(config, record, now);
    user.dispatcher.dispatch(user.recipient, &subject, &body)?;
    info!(id = record.id, recipient = user.recipient, "confirmation dispatched");

    if let Some(admin) = admin {
        let (subject, body) = render_admin_notification(config, record, user.recipient, now);
        admin.dispatcher.dispatch(admin.recipient, &subject, &body)?;
        info!(id = record.id, recipient = admin.recipient, "admin notice dispatched");
    }
    Ok(())
}

fn write_record_scores(output: &mut String, record: &DailyRecord) {
    let _ = writeln!(output, "## Scores");
    for dimension in Dimension::ALL {
        let _ = writeln!(output, "- {}: {}/10", dimension, record.score(dimension));
    }
    let _ = writeln!(output);
}

fn write_record_notes(output: &mut String, record: &DailyRecord) {
    let _ = writeln!(output, "## Positive");
    let _ = writeln!(output, "{}", record.positive_notes);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Negative");
    let _ = writeln!(output, "{}", record.negative_notes);
    let _ = writeln!(output);
}

fn write_header(output: &mut String, config: &AppConfig) {
    let _ = writeln!(output, "# {} - Weekly Report", config.app_name);
    let _ = writeln!(output, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(output);
}

fn write_footer(output: &mut String, config: &AppConfig, generated_at: DateTime<Utc>) {
    let _ = writeln!(output);
    let _ = writeln!(output, "---");
    let _ = writeln!(
        output,
        "Generated automatically by {} v{}",
        config.app_name, config.app_version
    );
    let _ = write!(output, "{}", generated_at.format("%d/%m/%Y at %H:%M"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::dispatch::testing::RecordingDispatcher;
    use crate::models::{sample_record, PerformanceLevel};
    use crate::schedule::FixedClock;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap()
    }

    fn scenario_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.push_at([8, 7, 9, 8], now() - Duration::days(1));
        store.push_at([7, 8, 7, 6], now() - Duration::days(2));
        store.push_at([9, 6, 8, 7], now() - Duration::days(3));
        store
    }

    #[tokio::test]
    async fn full_report_contains_sections_in_order() {
        let store = scenario_store();
        let config = AppConfig::default();
        let clock = FixedClock(now());
        let report = ReportAssembler::new(&store, &config, &clock)
            .generate(None)
            .await
            .unwrap();

        assert_eq!(report.reviews_count, 3);
        assert!(!report.dispatched);
        assert_eq!(report.subject, "Daily Review Digest - Weekly Report (17/10/2026)");

        let analysis = report.analysis.as_ref().unwrap();
        let sections = [
            "# Daily Review Digest - Weekly Report",
            analysis.motivational_message.as_str(),
            "## This Week's Scores",
            "WEEK IN SUMMARY",
            "## Insights",
            "## Recommendations for Next Week",
            "## Remember",
            "Generated automatically by Daily Review Digest",
        ];
        let positions: Vec<usize> = sections
            .iter()
            .map(|s| report.body.find(s).unwrap_or_else(|| panic!("missing {s}")))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);

        assert!(report.body.contains("- Work: 8.00/10"));
        assert!(report.body.contains("- Training: 7.00/10"));
        assert!(report.body.contains("Overall average: 7.50/10"));
        assert!(report.body.contains("Performance level: good"));
        assert!(report.body.ends_with("17/10/2026 at 10:00"));
    }

    #[tokio::test]
    async fn empty_week_is_a_successful_report() {
        let store = MemoryStore::new();
        store.push_at([9, 9, 9, 9], now() - Duration::days(20));
        let config = AppConfig::default();
        let clock = FixedClock(now());

        let report = ReportAssembler::new(&store, &config, &clock)
            .generate(None)
            .await
            .unwrap();

        assert_eq!(report.reviews_count, 0);
        assert!(report.aggregate.is_none());
        assert!(report.analysis.is_none());
        assert!(report.body.contains("No daily reviews were recorded this week."));
        assert!(report
            .body
            .contains("Check-in requests go out on Monday, Wednesday and Friday at 20:00"));
        assert!(report.body.contains("(19/10/2026)"));
        assert!(!report.body.contains("Overall average"));
    }

    #[tokio::test]
    async fn empty_week_is_dispatched_when_target_given() {
        let store = MemoryStore::new();
        let config = AppConfig::default();
        let clock = FixedClock(now());
        let dispatcher = RecordingDispatcher::default();

        let report = ReportAssembler::new(&store, &config, &clock)
            .generate(Some(DispatchTarget {
                recipient: "me@example.com",
                dispatcher: &dispatcher,
            }))
            .await
            .unwrap();

        assert!(report.dispatched);
        let sent = dispatcher.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Daily Review Digest - No Reviews This Week (17/10/2026)");
    }

    #[tokio::test]
    async fn failed_window_query_falls_back_to_all_records() {
        let mut store = scenario_store();
        store.fail_window = true;
        let config = AppConfig::default();
        let clock = FixedClock(now());

        let report = ReportAssembler::new(&store, &config, &clock)
            .generate(None)
            .await
            .unwrap();

        assert_eq!(report.reviews_count, 3);
        let analysis = report.analysis.unwrap();
        assert_eq!(analysis.strongest_area, Dimension::Work);
        assert_eq!(analysis.weakest_area, Dimension::Training);
    }

    #[tokio::test]
    async fn dispatches_exactly_once() {
        let store = scenario_store();
        let config = AppConfig::default();
        let clock = FixedClock(now());
        let dispatcher = RecordingDispatcher::default();

        let report = ReportAssembler::new(&store, &config, &clock)
            .generate(Some(DispatchTarget {
                recipient: "me@example.com",
                dispatcher: &dispatcher,
            }))
            .await
            .unwrap();

        assert!(report.dispatched);
        let sent = dispatcher.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "me@example.com");
        assert_eq!(sent[0].2, report.body);
    }

    #[tokio::test]
    async fn dispatch_failure_propagates() {
        let store = scenario_store();
        let config = AppConfig::default();
        let clock = FixedClock(now());
        let dispatcher = RecordingDispatcher {
            fail_with: Some("relay unavailable".to_string()),
            ..Default::default()
        };

        let err = ReportAssembler::new(&store, &config, &clock)
            .generate(Some(DispatchTarget {
                recipient: "me@example.com",
                dispatcher: &dispatcher,
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, ReviewError::Dispatch(ref reason) if reason == "relay unavailable"));
        assert_eq!(dispatcher.sent.borrow().len(), 1);
    }

    #[tokio::test]
    async fn analysis_errors_propagate_unchanged() {
        let store = MemoryStore::new();
        store.push_at([8, 8, 8, 8], now() - Duration::days(1));
        let mut config = AppConfig::default();
        config.analysis.tiers[1].messages.clear();
        config.analysis.tiers[0].threshold = 9.0;
        let clock = FixedClock(now());

        let err = ReportAssembler::new(&store, &config, &clock)
            .generate(None)
            .await
            .unwrap_err();

        assert!(matches!(err, ReviewError::Analysis(_)));
    }

    #[tokio::test]
    async fn stats_and_analysis_share_the_window() {
        let store = MemoryStore::new();
        store.push_at([8, 7, 9, 8], now() - Duration::days(1));
        store.push_at([0, 0, 0, 0], now() + Duration::days(2));
        let config = AppConfig::default();
        let clock = FixedClock(now());

        let report = ReportAssembler::new(&store, &config, &clock)
            .generate(None)
            .await
            .unwrap();

        assert_eq!(report.reviews_count, 1);
        assert_eq!(report.aggregate.unwrap().overall_average, 8.0);
        let analysis = report.analysis.unwrap();
        assert_eq!(analysis.performance_level, PerformanceLevel::Good);
        assert_eq!(analysis.strongest_area, Dimension::Studies);
    }

    #[test]
    fn confirmation_rates_the_single_review() {
        let config = AppConfig::default();
        let mut record = sample_record(42, [9, 8, 9, 10]);
        record.positive_notes = "Finished the draft".to_string();
        let (subject, body) = render_confirmation(&config, &record, now());

        assert_eq!(subject, "Daily Review Digest - Review received (17/10/2026)");
        assert!(body.contains("- Work: 9/10\n- Training: 8/10\n- Studies: 9/10\n- Mind: 10/10"));
        assert!(body.contains("Day average: 9.0/10"));
        assert!(body.contains("Performance: Excellent"));
        assert!(body.contains("Finished the draft"));
        assert!(body.contains("The weekly report arrives every Saturday"));
        assert!(body.ends_with("17/10/2026 at 10:00"));
    }

    #[test]
    fn confirmation_tier_follows_the_tier_table() {
        let config = AppConfig::default();
        let cases = [
            ([7, 7, 7, 7], "Performance: Good"),
            ([6, 5, 6, 5], "Performance: Average"),
            ([5, 5, 5, 6], "Performance: Needs improvement"),
        ];
        for (scores, expected) in cases {
            let (_, body) = render_confirmation(&config, &sample_record(1, scores), now());
            assert!(body.contains(expected), "{scores:?} should read {expected}");
        }
    }

    #[test]
    fn intake_notices_go_to_user_then_admin() {
        let config = AppConfig::default();
        let record = sample_record(7, [8, 7, 9, 8]);
        let user_outbox = RecordingDispatcher::default();
        let admin_outbox = RecordingDispatcher::default();

        send_intake_notices(
            &config,
            &record,
            now(),
            &DispatchTarget {
                recipient: "me@example.com",
                dispatcher: &user_outbox,
            },
            Some(&DispatchTarget {
                recipient: "admin@example.com",
                dispatcher: &admin_outbox,
            }),
        )
        .unwrap();

        let sent = user_outbox.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "me@example.com");
        assert!(sent[0].2.contains("Performance: Good"));

        let notices = admin_outbox.sent.borrow();
        assert_eq!(notices.len(), 1);
        assert_eq!(
            notices[0].1,
            "Daily Review Digest - New review from me@example.com (17/10/2026)"
        );
        assert!(notices[0].2.contains("Review #7 from me@example.com"));
    }

    #[test]
    fn failed_confirmation_skips_admin_notice() {
        let config = AppConfig::default();
        let record = sample_record(7, [8, 7, 9, 8]);
        let user_outbox = RecordingDispatcher {
            fail_with: Some("mailbox full".to_string()),
            ..Default::default()
        };
        let admin_outbox = RecordingDispatcher::default();

        let err = send_intake_notices(
            &config,
            &record,
            now(),
            &DispatchTarget {
                recipient: "me@example.com",
                dispatcher: &user_outbox,
            },
            Some(&DispatchTarget {
                recipient: "admin@example.com",
                dispatcher: &admin_outbox,
            }),
        )
        .unwrap_err();

        assert!(matches!(err, ReviewError::Dispatch(_)));
        assert!(admin_outbox.sent.borrow().is_empty());
    }

    #[test]
    fn checkin_request_mentions_form_and_next_day() {
        let config = AppConfig::default();
        let (subject, body) = render_checkin_request(&config, now());

        assert_eq!(subject, "Daily Review Digest - Daily check-in (17/10/2026)");
        assert!(body.contains("Form: http://localhost:5000/form?date=17/10/2026"));
        assert!(body.contains("Next check-in: 19/10/2026"));
    }
}
