//! Aggregations over a cleaned dataset.
//!
//! Pure functions; nothing here touches the network or the cache.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::records::{Dataset, ProductionEntry};

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Kpis {
    pub total_liters: f64,
    pub mean_liters: f64,
    pub distinct_cows: usize,
    pub entry_count: usize,
    pub latest_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub liters: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CowTotal {
    pub cow_name: String,
    pub liters: f64,
}

/// Five-number summary of one cow's records.
#[derive(Debug, Clone, PartialEq)]
pub struct CowDistribution {
    pub cow_name: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// `None` when there is nothing to summarize.
pub fn kpis(dataset: &Dataset) -> Option<Kpis> {
    let latest_date = dataset.entries.iter().map(|e| e.date).max()?;
    let total_liters: f64 = dataset.entries.iter().map(|e| e.liters).sum();
    let entry_count = dataset.entries.len();
    let distinct_cows = by_cow(&dataset.entries).len();

    Some(Kpis {
        total_liters,
        mean_liters: total_liters / entry_count as f64,
        distinct_cows,
        entry_count,
        latest_date,
    })
}

/// Liters per calendar date, oldest first.
pub fn daily_totals(dataset: &Dataset) -> Vec<DailyTotal> {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for entry in &dataset.entries {
        *totals.entry(entry.date).or_default() += entry.liters;
    }
    totals
        .into_iter()
        .map(|(date, liters)| DailyTotal { date, liters })
        .collect()
}

/// Liters per cow, biggest producer first; ties ordered by name.
pub fn cow_totals(dataset: &Dataset) -> Vec<CowTotal> {
    let mut totals: Vec<CowTotal> = by_cow(&dataset.entries)
        .into_iter()
        .map(|(cow_name, liters)| CowTotal {
            cow_name: cow_name.to_string(),
            liters: liters.iter().sum(),
        })
        .collect();
    totals.sort_by(|a, b| {
        b.liters
            .total_cmp(&a.liters)
            .then_with(|| a.cow_name.cmp(&b.cow_name))
    });
    totals
}

/// Per-cow spread of liters, in name order.
pub fn cow_distributions(dataset: &Dataset) -> Vec<CowDistribution> {
    by_cow(&dataset.entries)
        .into_iter()
        .filter_map(|(cow_name, mut liters)| {
            liters.sort_by(f64::total_cmp);
            Some(CowDistribution {
                cow_name: cow_name.to_string(),
                count: liters.len(),
                min: *liters.first()?,
                q1: quantile(&liters, 0.25)?,
                median: quantile(&liters, 0.5)?,
                q3: quantile(&liters, 0.75)?,
                max: *liters.last()?,
            })
        })
        .collect()
}

/// Newest first. Entries sharing a date keep their sheet order.
pub fn recent_entries(dataset: &Dataset, limit: usize) -> Vec<&ProductionEntry> {
    let mut entries: Vec<&ProductionEntry> = dataset.entries.iter().collect();
    entries.sort_by(|a, b| b.date.cmp(&a.date));
    entries.truncate(limit);
    entries
}

fn by_cow(entries: &[ProductionEntry]) -> BTreeMap<&str, Vec<f64>> {
    let mut grouped: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for entry in entries {
        grouped
            .entry(entry.cow_name.as_str())
            .or_default()
            .push(entry.liters);
    }
    grouped
}

/// Linear-interpolation quantile over sorted values, `q` in [0, 1].
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::CleaningStats;
    use chrono::Utc;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(cow: &str, date: NaiveDate, liters: f64) -> ProductionEntry {
        ProductionEntry {
            cow_name: cow.to_string(),
            date,
            liters,
        }
    }

    fn herd() -> Dataset {
        let entries = vec![
            entry("Bessie", ymd(2024, 1, 5), 12.0),
            entry("Luna", ymd(2024, 1, 5), 8.0),
            entry("Bessie", ymd(2024, 1, 6), 10.0),
            entry("Luna", ymd(2024, 1, 7), 9.0),
            entry("Bessie", ymd(2024, 1, 7), 14.0),
            entry("Rosa", ymd(2024, 1, 6), 2.0),
        ];
        Dataset {
            stats: CleaningStats {
                fetched: entries.len(),
                kept: entries.len(),
                ..CleaningStats::default()
            },
            entries,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_kpis() {
        let k = kpis(&herd()).unwrap();
        assert_eq!(k.total_liters, 55.0);
        assert_eq!(k.entry_count, 6);
        assert_eq!(k.distinct_cows, 3);
        assert!((k.mean_liters - 55.0 / 6.0).abs() < 1e-9);
        assert_eq!(k.latest_date, ymd(2024, 1, 7));
    }

    #[test]
    fn test_kpis_empty_dataset() {
        assert!(kpis(&Dataset::empty()).is_none());
    }

    #[test]
    fn test_daily_totals_ascending() {
        let totals = daily_totals(&herd());
        assert_eq!(
            totals,
            vec![
                DailyTotal { date: ymd(2024, 1, 5), liters: 20.0 },
                DailyTotal { date: ymd(2024, 1, 6), liters: 12.0 },
                DailyTotal { date: ymd(2024, 1, 7), liters: 23.0 },
            ]
        );
    }

    #[test]
    fn test_cow_totals_ranked() {
        let mut dataset = herd();
        dataset.entries.push(entry("Alma", ymd(2024, 1, 8), 17.0));

        let names: Vec<(String, f64)> = cow_totals(&dataset)
            .into_iter()
            .map(|t| (t.cow_name, t.liters))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Bessie".to_string(), 36.0),
                ("Alma".to_string(), 17.0),
                ("Luna".to_string(), 17.0),
                ("Rosa".to_string(), 2.0),
            ]
        );
    }

    #[test]
    fn test_cow_distributions() {
        let dists = cow_distributions(&herd());
        assert_eq!(dists.len(), 3);

        let bessie = &dists[0];
        assert_eq!(bessie.cow_name, "Bessie");
        assert_eq!(bessie.count, 3);
        assert_eq!(bessie.min, 10.0);
        assert_eq!(bessie.q1, 11.0);
        assert_eq!(bessie.median, 12.0);
        assert_eq!(bessie.q3, 13.0);
        assert_eq!(bessie.max, 14.0);

        let rosa = &dists[2];
        assert_eq!((rosa.min, rosa.median, rosa.max), (2.0, 2.0, 2.0));
    }

    #[test]
    fn test_quantile_interpolates() {
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.5), Some(2.5));
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.25), Some(1.75));
        assert_eq!(quantile(&[5.0], 0.75), Some(5.0));
    }

    #[test]
    fn test_recent_entries_newest_first_and_stable() {
        let dataset = herd();
        let recent = recent_entries(&dataset, 3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].date, ymd(2024, 1, 7));
        assert_eq!(recent[0].cow_name, "Luna");
        assert_eq!(recent[1].cow_name, "Bessie");
        assert_eq!(recent[2].date, ymd(2024, 1, 6));
        assert_eq!(recent[2].cow_name, "Bessie");
    }
}
