// Billing cycle boundaries and cycle-close summaries

use chrono::{Datelike, NaiveDate};

use crate::config::Comparison;
use crate::state::CycleState;
use crate::units::bytes_to_gb;

/// Last calendar day of the given month
pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// The date in `today`'s month on which the cycle rolls over.
///
/// `start_day` is clamped into the month, so 31 resets on the 30th in a
/// 30-day month and on the 28th/29th in February.
pub fn reset_date(today: NaiveDate, start_day: u32) -> NaiveDate {
    let day = start_day.clamp(1, last_day_of_month(today.year(), today.month()));
    today.with_day(day).unwrap_or(today)
}

/// Whether the cycle has to be closed before accounting `today`'s sample.
///
/// Fires once per crossing: the last reset must lie before this month's
/// reset date and `today` must have reached it. An unknown last reset
/// always fires.
pub fn should_reset(today: NaiveDate, last_reset: Option<NaiveDate>, start_day: u32) -> bool {
    let Some(last_reset) = last_reset else {
        return true;
    };

    let boundary = reset_date(today, start_day);
    last_reset < boundary && today >= boundary
}

/// Build the closing summary and the zeroed state for the next cycle.
///
/// Raw counter baselines carry over so the next sample only adds traffic
/// seen after the boundary.
pub fn close_cycle(
    state: CycleState,
    comparison: &Comparison,
    today: NaiveDate,
) -> (String, CycleState) {
    let summary = cycle_summary(&state, comparison);

    let next = CycleState {
        total_received: 0,
        total_transmitted: 0,
        cycle_start_date: Some(today),
        ..state
    };

    (summary, next)
}

/// Human-readable report of the cycle so far
pub fn cycle_summary(state: &CycleState, comparison: &Comparison) -> String {
    let received_gb = bytes_to_gb(state.total_received);
    let transmitted_gb = bytes_to_gb(state.total_transmitted);
    let total_gb = received_gb + transmitted_gb;

    let usage_line = match comparison.category() {
        Ok(category) => {
            let usage_gb = category.usage_gb(state);
            if comparison.limit > 0.0 {
                format!(
                    "{}: {:.2} GB ({:.1}%)",
                    category.usage_label(),
                    usage_gb,
                    usage_gb / comparison.limit * 100.0
                )
            } else {
                format!("{}: {:.2} GB", category.usage_label(), usage_gb)
            }
        }
        Err(_) => "Usage: unknown category".to_string(),
    };

    let since = state
        .cycle_start_date
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "Cycle summary ({} to date):\n\nDownload: {:.2} GB\nUpload: {:.2} GB\nTotal: {:.2} GB\n\nBilling category: {}\nLimit: {:.2} GB\n{}",
        since,
        received_gb,
        transmitted_gb,
        total_gb,
        comparison.category,
        comparison.limit,
        usage_line
    )
}
