use anyhow::Result;
use chrono::Utc;
use confidence_engine::CalibrationMetrics;
use prediction_store::TradingDb;
use std::fmt::Write;

use crate::models::{AccuracyRow, ActionDistribution, FullReport, PerformanceOverview, VolumeGradeRow};
use crate::{PerformanceTracker, SignalAnalyzer};

const DEFAULT_HOLD_WINDOW: i64 = 100;

pub struct ReportBuilder {
    db: TradingDb,
    hold_window: i64,
    tracker: PerformanceTracker,
    signals: SignalAnalyzer,
}

impl ReportBuilder {
    pub fn new(db: TradingDb) -> Self {
        Self {
            tracker: PerformanceTracker::new(db.clone()),
            signals: SignalAnalyzer::new(db.clone()),
            db,
            hold_window: DEFAULT_HOLD_WINDOW,
        }
    }

    /// Number of recent predictions the HOLD diagnosis looks at.
    pub fn hold_window(mut self, window: i64) -> Self {
        self.hold_window = window;
        self
    }

    pub async fn action_distribution(&self) -> Result<ActionDistribution> {
        self.signals.action_distribution(self.hold_window).await
    }

    pub async fn accuracy_by_symbol(&self) -> Result<Vec<AccuracyRow>> {
        self.tracker.accuracy_by_symbol().await
    }

    pub async fn accuracy_by_action(&self) -> Result<Vec<AccuracyRow>> {
        self.tracker.accuracy_by_action().await
    }

    pub async fn confidence_buckets(&self) -> Result<CalibrationMetrics> {
        self.signals.confidence_buckets().await
    }

    pub async fn performance_overview(&self) -> Result<PerformanceOverview> {
        self.tracker.performance_overview().await
    }

    pub async fn volume_grades(&self) -> Result<Vec<VolumeGradeRow>> {
        self.signals.volume_grade_distribution().await
    }

    pub async fn build(&self) -> Result<FullReport> {
        Ok(FullReport {
            generated_at: Utc::now(),
            overview: self.performance_overview().await?,
            actions: self.action_distribution().await?,
            by_symbol: self.accuracy_by_symbol().await?,
            by_action: self.accuracy_by_action().await?,
            calibration: self.confidence_buckets().await?,
            volume_grades: self.volume_grades().await?,
            integrity: prediction_store::audit(&self.db).await?,
        })
    }
}

fn accuracy_table(out: &mut String, title: &str, rows: &[AccuracyRow]) -> std::fmt::Result {
    writeln!(out, "\n{}", title)?;
    if rows.is_empty() {
        return writeln!(out, "  (no evaluated predictions)");
    }
    for row in rows {
        writeln!(
            out,
            "  {:<10} {:>4}/{:<4} {:>6.1}%  mean return {:+.2}%",
            row.key,
            row.correct,
            row.evaluated,
            row.accuracy * 100.0,
            row.mean_return
        )?;
    }
    Ok(())
}

fn write_report(out: &mut String, report: &FullReport) -> std::fmt::Result {
    let o = &report.overview;
    writeln!(out, "PREDICTION REPORT ({})", report.generated_at.format("%Y-%m-%d %H:%M UTC"))?;
    writeln!(out, "{}", "=".repeat(60))?;
    writeln!(out, "Predictions:  {}", o.total_predictions)?;
    writeln!(out, "Evaluated:    {}", o.total_evaluated)?;
    writeln!(out, "Win rate:     {:.1}%", o.win_rate * 100.0)?;
    writeln!(out, "Mean return:  {:+.2}%   median {:+.2}%", o.mean_return, o.median_return)?;
    if let Some(best) = &o.best_symbol {
        writeln!(out, "Best symbol:  {} ({:.1}%)", best.key, best.accuracy * 100.0)?;
    }
    if let Some(worst) = &o.worst_symbol {
        writeln!(out, "Worst symbol: {} ({:.1}%)", worst.key, worst.accuracy * 100.0)?;
    }

    let a = &report.actions;
    writeln!(out, "\nActions (last {} predictions)", a.window)?;
    writeln!(out, "  BUY {}  SELL {}  HOLD {}  (HOLD {:.0}%)", a.buy, a.sell, a.hold, a.hold_ratio * 100.0)?;
    if a.all_hold_warning {
        writeln!(out, "  WARNING: predictions are almost all HOLD")?;
    }

    accuracy_table(out, "Accuracy by symbol", &report.by_symbol)?;
    accuracy_table(out, "Accuracy by action", &report.by_action)?;

    let c = &report.calibration;
    writeln!(out, "\nCalibration ({} samples)", c.sample_size)?;
    writeln!(out, "  ECE {:.3}  MCE {:.3}  Brier {:.3}", c.ece, c.mce, c.brier_score)?;
    for b in &c.bucket_stats {
        writeln!(
            out,
            "  {:.1}-{:.1}: stated {:.2} actual {:.2} (n={})",
            b.bucket_start, b.bucket_end, b.mean_confidence, b.actual_accuracy, b.sample_count
        )?;
    }
    writeln!(out, "  {}", c.assessment())?;

    writeln!(out, "\nVolume grades")?;
    for g in &report.volume_grades {
        writeln!(out, "  {:<8} {:>5} predictions, {}/{} correct", g.grade, g.predictions, g.correct, g.evaluated)?;
    }

    let i = &report.integrity;
    writeln!(out, "\nData integrity")?;
    if i.is_clean() {
        writeln!(out, "  clean")?;
    } else {
        writeln!(
            out,
            "  {} violations ({} inconsistent returns, {} bad entry prices, {} sentinels); run `repair`",
            i.violations(),
            i.inconsistent_returns,
            i.bad_entry_prices,
            i.sentinel_values
        )?;
    }
    Ok(())
}

/// Human-readable rendering for the CLI.
pub fn render_text(report: &FullReport) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_report(&mut out, report);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{evaluated, memory_db, pending};
    use analysis_core::TradeAction;

    #[tokio::test]
    async fn test_build_and_render() {
        let db = memory_db().await;
        evaluated(&db, "CBA", 1, TradeAction::Buy, 121.0).await;
        for day in 2..=10 {
            pending(&db, "NAB", day, TradeAction::Hold).await;
        }

        let report = ReportBuilder::new(db).hold_window(10).build().await.unwrap();
        assert_eq!(report.overview.total_predictions, 10);
        assert!(report.actions.all_hold_warning);
        assert!(report.integrity.is_clean());

        let text = render_text(&report);
        assert!(text.contains("WARNING: predictions are almost all HOLD"));
        assert!(text.contains("CBA.AX"));
        assert!(text.contains("clean"));
    }
}
