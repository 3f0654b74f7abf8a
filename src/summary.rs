use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

use crate::dates::{DateRange, Period, parse_api_timestamp};
use crate::models::{Customer, CustomerId, Project, ProjectId, TimeEntry};

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub project_id: Option<ProjectId>,
    pub name: String,
    pub total_seconds: i64,
    pub total_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerSummary {
    pub customer_id: CustomerId,
    pub name: String,
    pub total_seconds: i64,
    pub total_hours: f64,
    pub projects: Vec<ProjectSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkSummary {
    pub period: Period,
    pub since: String,
    pub until: String,
    pub total_seconds: i64,
    pub total_hours: f64,
    pub entry_count: usize,
    pub customers: Vec<CustomerSummary>,
}

/// Seconds an entry covers. Running entries count up to `now`.
pub fn entry_seconds(entry: &TimeEntry, now: DateTime<Utc>) -> Option<i64> {
    let start = parse_api_timestamp(&entry.time_since)?;
    let end = match &entry.time_until {
        Some(value) => parse_api_timestamp(value)?,
        None => now,
    };
    Some((end - start).num_seconds().max(0))
}

/// Sums the entries that start inside `range`, grouped by customer and
/// project. Names come from the entry itself when Clockodo includes them,
/// otherwise from the listings.
pub fn summarize(
    period: Period,
    range: &DateRange,
    entries: &[TimeEntry],
    customers: &[Customer],
    projects: &[Project],
    now: DateTime<Utc>,
) -> WorkSummary {
    let customer_names: HashMap<CustomerId, &str> = customers
        .iter()
        .map(|customer| (customer.id, customer.name.as_str()))
        .collect();
    let project_names: HashMap<ProjectId, &str> = projects
        .iter()
        .map(|project| (project.id, project.name.as_str()))
        .collect();

    let mut grouped: HashMap<CustomerId, (String, HashMap<Option<ProjectId>, (String, i64)>)> =
        HashMap::new();
    let mut total_seconds = 0;
    let mut entry_count = 0;

    for entry in entries {
        let Some(start) = parse_api_timestamp(&entry.time_since) else {
            warn!(entry_id = entry.id, time_since = %entry.time_since, "Skipping entry with unreadable start");
            continue;
        };
        if !range.contains(start) {
            continue;
        }
        let Some(seconds) = entry_seconds(entry, now) else {
            warn!(entry_id = entry.id, "Skipping entry with unreadable end");
            continue;
        };

        let customer_name = entry
            .customer_name
            .clone()
            .or_else(|| customer_names.get(&entry.customer_id).map(|name| name.to_string()))
            .unwrap_or_else(|| "Unknown".to_string());
        let project_name = match entry.project_id {
            Some(id) => entry
                .project_name
                .clone()
                .or_else(|| project_names.get(&id).map(|name| name.to_string()))
                .unwrap_or_else(|| "Unknown Project".to_string()),
            None => "General".to_string(),
        };

        let (_, customer_projects) = grouped
            .entry(entry.customer_id)
            .or_insert_with(|| (customer_name, HashMap::new()));
        customer_projects
            .entry(entry.project_id)
            .or_insert_with(|| (project_name, 0))
            .1 += seconds;

        total_seconds += seconds;
        entry_count += 1;
    }

    let mut customers: Vec<CustomerSummary> = grouped
        .into_iter()
        .map(|(customer_id, (name, projects))| {
            let mut projects: Vec<ProjectSummary> = projects
                .into_iter()
                .map(|(project_id, (name, seconds))| ProjectSummary {
                    project_id,
                    name,
                    total_seconds: seconds,
                    total_hours: hours(seconds),
                })
                .collect();
            projects.sort_by(|a, b| b.total_seconds.cmp(&a.total_seconds).then_with(|| a.name.cmp(&b.name)));
            let seconds = projects.iter().map(|project| project.total_seconds).sum();
            CustomerSummary {
                customer_id,
                name,
                total_seconds: seconds,
                total_hours: hours(seconds),
                projects,
            }
        })
        .collect();
    customers.sort_by(|a, b| b.total_seconds.cmp(&a.total_seconds).then_with(|| a.name.cmp(&b.name)));

    let (since, until) = range.as_api();
    WorkSummary {
        period,
        since,
        until,
        total_seconds,
        total_hours: hours(total_seconds),
        entry_count,
        customers,
    }
}

pub fn hours(seconds: i64) -> f64 {
    (seconds as f64 / 3600.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn entry(id: u64, customer_id: u64, project_id: Option<u64>, start: &str, end: Option<&str>) -> TimeEntry {
        TimeEntry {
            id,
            customer_id,
            project_id,
            service_id: None,
            user_id: Some(1),
            time_since: start.to_string(),
            time_until: end.map(str::to_string),
            description: None,
            billable: true,
            duration: None,
            customer_name: None,
            project_name: None,
            service_name: None,
        }
    }

    fn customers() -> Vec<Customer> {
        vec![
            Customer {
                id: 1,
                name: "Acme".to_string(),
                active: true,
            },
            Customer {
                id: 2,
                name: "Globex".to_string(),
                active: true,
            },
        ]
    }

    fn projects() -> Vec<Project> {
        vec![Project {
            id: 10,
            customer_id: 1,
            name: "Website".to_string(),
            active: true,
        }]
    }

    #[test]
    fn week_total_only_counts_entries_starting_in_window() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 5).unwrap();
        let range = Period::Week.range(today);
        let (since, until) = range.as_api();
        let since = parse_api_timestamp(&since).unwrap();
        let until = parse_api_timestamp(&until).unwrap();
        let fmt = |dt: DateTime<Utc>| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let entries = vec![
            entry(1, 1, Some(10), &fmt(since + Duration::hours(9)), Some(&fmt(since + Duration::hours(11)))),
            entry(2, 2, None, &fmt(since + Duration::days(2)), Some(&fmt(since + Duration::days(2) + Duration::minutes(30)))),
            entry(3, 1, None, &fmt(since - Duration::hours(2)), Some(&fmt(since - Duration::hours(1)))),
            entry(4, 1, None, &fmt(until + Duration::seconds(1)), Some(&fmt(until + Duration::hours(1)))),
        ];

        let summary = summarize(Period::Week, &range, &entries, &customers(), &projects(), Utc::now());
        assert_eq!(summary.total_seconds, 2 * 3600 + 30 * 60);
        assert_eq!(summary.entry_count, 2);
        assert_eq!(summary.customers.len(), 2);
        assert_eq!(summary.customers[0].name, "Acme");
        assert_eq!(summary.customers[0].projects[0].name, "Website");
        assert_eq!(summary.customers[1].projects[0].name, "General");
    }

    #[test]
    fn running_entries_count_until_now() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 5).unwrap();
        let range = Period::Today.range(today);
        let (since, _) = range.as_api();
        let start = parse_api_timestamp(&since).unwrap() + Duration::hours(8);
        let now = start + Duration::minutes(45);
        let entries = vec![entry(1, 1, None, &start.format("%Y-%m-%dT%H:%M:%SZ").to_string(), None)];

        let summary = summarize(Period::Today, &range, &entries, &customers(), &[], now);
        assert_eq!(summary.total_seconds, 45 * 60);
    }

    #[test]
    fn project_hours_are_grouped_per_customer() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 5).unwrap();
        let range = Period::Month.range(today);
        let (since, _) = range.as_api();
        let base = parse_api_timestamp(&since).unwrap() + Duration::days(1);
        let fmt = |dt: DateTime<Utc>| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let entries = vec![
            entry(1, 1, Some(10), &fmt(base), Some(&fmt(base + Duration::hours(1)))),
            entry(2, 1, Some(10), &fmt(base + Duration::hours(2)), Some(&fmt(base + Duration::hours(3)))),
            entry(3, 1, None, &fmt(base + Duration::hours(4)), Some(&fmt(base + Duration::hours(5)))),
        ];

        let summary = summarize(Period::Month, &range, &entries, &customers(), &projects(), Utc::now());
        let acme = &summary.customers[0];
        assert_eq!(acme.total_seconds, 3 * 3600);
        assert_eq!(acme.projects.len(), 2);
        assert_eq!(acme.projects[0].name, "Website");
        assert!((acme.projects[0].total_hours - 2.0).abs() < 0.01);
    }

    #[test]
    fn hours_round_to_two_decimals() {
        assert_eq!(hours(5400), 1.5);
        assert_eq!(hours(1000), 0.28);
    }
}
