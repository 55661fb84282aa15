use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::finance::{avg_rupees, rate_pct};
use crate::model::{
    rupees, Anomaly, AnomalyCode, LifecycleStatus, MasterRecord, OrderKey, ReconReport,
    RejectedRecord, RunDiff,
};

/// Build the report numbers from the finalized run data.
pub fn build_report(
    config: &EngineConfig,
    master: &BTreeMap<OrderKey, MasterRecord>,
    diff: &RunDiff,
    anomalies: &[Anomaly],
    rejects: &[RejectedRecord],
) -> ReconReport {
    let mut cancelled = 0;
    let mut returned = 0;
    let mut completed_settled = 0;
    let mut completed_pending = 0;
    let mut profit_paise = 0i64;
    let mut loss_paise = 0i64;
    let mut potential_paise = 0i64;

    for record in master.values() {
        match record.status {
            Some(LifecycleStatus::Cancelled) => cancelled += 1,
            Some(LifecycleStatus::Returned) => returned += 1,
            Some(LifecycleStatus::CompletedSettled) => completed_settled += 1,
            Some(LifecycleStatus::CompletedPendingSettlement) => completed_pending += 1,
            None => {}
        }
        profit_paise += record.financials.profit_paise;
        loss_paise += record.financials.loss_paise;
        potential_paise += record.financials.potential_paise;
    }

    let total_orders = master.len();
    let mut report = ReconReport {
        total_orders,
        cancelled,
        returned,
        completed_settled,
        completed_pending,
        profit_paise,
        loss_paise,
        net_paise: profit_paise - loss_paise,
        potential_paise,
        settlement_rate_pct: rate_pct(completed_settled, total_orders),
        return_rate_pct: rate_pct(returned, total_orders),
        avg_profit_per_settled: avg_rupees(profit_paise, completed_settled),
        avg_loss_per_returned: avg_rupees(loss_paise, returned),
        status_changes: diff.status_changes,
        newly_settled: diff.newly_settled,
        newly_pending: diff.newly_pending,
        accepted_records: 0,
        rejected_records: rejects.len(),
        anomaly_count: anomalies.len(),
        recommendations: Vec::new(),
    };
    report.recommendations = recommendations(config, &report, anomalies);
    report
}

/// Fixed recommendation texts, keyed off threshold rules.
fn recommendations(
    config: &EngineConfig,
    report: &ReconReport,
    anomalies: &[Anomaly],
) -> Vec<String> {
    let mut out = Vec::new();

    if report.total_orders > 0
        && report.settlement_rate_pct < config.thresholds.min_settlement_rate_pct
    {
        out.push(
            "Monitor orders with status 'Completed - Pending Settlement' to ensure they get settled."
                .to_string(),
        );
    }
    if report.return_rate_pct > config.thresholds.max_return_rate_pct {
        out.push("Investigate return patterns to reduce return rates.".to_string());
    }
    if anomalies.iter().any(|a| a.code == AnomalyCode::NegativeProfit) {
        out.push("Review orders with negative settlement amounts.".to_string());
    }
    if report.completed_pending > 0 {
        out.push(
            "Consider strategies to increase settlement rates for shipped orders.".to_string(),
        );
    }

    out
}

/// Render the classic text report.
pub fn render_text(report: &ReconReport) -> String {
    let mut lines = vec![
        "=== Order Reconciliation Report ===".to_string(),
        String::new(),
        "=== Order Counts ===".to_string(),
        format!("Total Orders: {}", report.total_orders),
        format!(
            "Cancelled Orders: {} ({:.2}%)",
            report.cancelled,
            rate(report.cancelled, report.total_orders)
        ),
        format!(
            "Returned Orders: {} ({:.2}%)",
            report.returned,
            rate(report.returned, report.total_orders)
        ),
        format!(
            "Completed and Settled Orders: {} ({:.2}%)",
            report.completed_settled, report.settlement_rate_pct
        ),
        format!(
            "Completed but Pending Settlement Orders: {} ({:.2}%)",
            report.completed_pending,
            rate(report.completed_pending, report.total_orders)
        ),
        String::new(),
        "=== Financial Analysis ===".to_string(),
        format!(
            "Total Profit from Settled Orders: ₹{:.2}",
            rupees(report.profit_paise)
        ),
        format!(
            "Total Loss from Returned Orders: ₹{:.2}",
            rupees(report.loss_paise)
        ),
        format!("Net Profit/Loss: ₹{:.2}", rupees(report.net_paise)),
        String::new(),
        "=== Settlement Information ===".to_string(),
        format!(
            "Potential Settlement Value (Pending): ₹{:.2}",
            rupees(report.potential_paise)
        ),
        format!("Status Changes in This Run: {}", report.status_changes),
        format!("Orders Newly Settled in This Run: {}", report.newly_settled),
        format!("Orders Newly Pending in This Run: {}", report.newly_pending),
        String::new(),
        "=== Key Metrics ===".to_string(),
        format!("Settlement Rate: {:.2}%", report.settlement_rate_pct),
        format!("Return Rate: {:.2}%", report.return_rate_pct),
        format!(
            "Average Profit per Settled Order: {:.2}",
            report.avg_profit_per_settled
        ),
        format!(
            "Average Loss per Returned Order: {:.2}",
            report.avg_loss_per_returned
        ),
    ];

    if !report.recommendations.is_empty() {
        lines.push(String::new());
        lines.push("=== Recommendations ===".to_string());
        for (i, rec) in report.recommendations.iter().enumerate() {
            lines.push(format!("{}. {rec}", i + 1));
        }
    }

    lines.join("\n")
}

fn rate(count: usize, total: usize) -> f64 {
    rate_pct(count, total)
}
