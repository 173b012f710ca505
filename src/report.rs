//! Plain-text rendering of the dashboard.

use std::fmt::Write;

use crate::dashboard::DashboardState;
use crate::error::DashboardError;
use crate::records::Dataset;
use crate::summary;

const RECENT_LIMIT: usize = 10;
const BAR_WIDTH: f64 = 30.0;
const DATE_FORMAT: &str = "%d/%m/%Y";

pub fn render(state: &DashboardState) -> String {
    match state {
        DashboardState::Ready(dataset) => render_dataset(dataset),
        DashboardState::Empty => {
            "No valid production records yet. Add rows to the spreadsheet and refresh.\n"
                .to_string()
        }
        DashboardState::NoCredentials(message) => format!(
            "Google credentials not configured.\n{}\nProvide the service-account secret or the local key file.\n",
            message
        ),
        DashboardState::FetchFailed(err) => {
            let view = DashboardError::from(err);
            let mut out = format!("Could not load data from Google Sheets.\n{}\n", view.message);
            let _ = writeln!(out, "Hint: {}", view.recovery_suggestion);
            if view.can_retry {
                out.push_str("Will retry on the next refresh.\n");
            }
            out
        }
    }
}

fn render_dataset(dataset: &Dataset) -> String {
    let Some(kpis) = summary::kpis(dataset) else {
        return render(&DashboardState::Empty);
    };
    let mut out = String::new();

    out.push_str("Milk production\n===============\n");
    let _ = writeln!(out, "Total liters:       {:.1}", kpis.total_liters);
    let _ = writeln!(out, "Average per record: {:.2}", kpis.mean_liters);
    let _ = writeln!(out, "Cows:               {}", kpis.distinct_cows);
    let _ = writeln!(out, "Records:            {}", kpis.entry_count);
    let _ = writeln!(out, "Last record:        {}", kpis.latest_date.format(DATE_FORMAT));
    if dataset.stats.dropped() > 0 {
        let _ = writeln!(
            out,
            "Skipped rows:       {} ({} blank, {} bad date, {} bad liters)",
            dataset.stats.dropped(),
            dataset.stats.blank_rows,
            dataset.stats.invalid_date,
            dataset.stats.invalid_liters
        );
    }

    let daily = summary::daily_totals(dataset);
    let peak = daily.iter().map(|d| d.liters).fold(0.0, f64::max);
    out.push_str("\nDaily total\n");
    for day in &daily {
        let _ = writeln!(
            out,
            "  {}  {:>8.1}  {}",
            day.date.format(DATE_FORMAT),
            day.liters,
            bar(day.liters, peak)
        );
    }

    out.push_str("\nLiters per cow\n");
    for cow in summary::cow_totals(dataset) {
        let share = if kpis.total_liters > 0.0 {
            cow.liters / kpis.total_liters * 100.0
        } else {
            0.0
        };
        let _ = writeln!(out, "  {:<16} {:>8.1}  {:>5.1}%", cow.cow_name, cow.liters, share);
    }

    out.push_str("\nDistribution per cow\n");
    let _ = writeln!(
        out,
        "  {:<16} {:>5} {:>7} {:>7} {:>7} {:>7} {:>7}",
        "Cow", "n", "min", "q1", "median", "q3", "max"
    );
    for d in summary::cow_distributions(dataset) {
        let _ = writeln!(
            out,
            "  {:<16} {:>5} {:>7.1} {:>7.1} {:>7.1} {:>7.1} {:>7.1}",
            d.cow_name, d.count, d.min, d.q1, d.median, d.q3, d.max
        );
    }

    out.push_str("\nRecent records\n");
    for entry in summary::recent_entries(dataset, RECENT_LIMIT) {
        let _ = writeln!(
            out,
            "  {}  {:<16} {:>8.1}",
            entry.date.format(DATE_FORMAT),
            entry.cow_name,
            entry.liters
        );
    }

    out
}

fn bar(value: f64, peak: f64) -> String {
    if peak <= 0.0 {
        return String::new();
    }
    "#".repeat((value / peak * BAR_WIDTH).round() as usize)
}
