use chrono::{Local, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::TimeTrackingApi;
use crate::dates::{Period, local_to_api, parse_clock_time, parse_date};
use crate::error::{ClockodoError, EntityKind};
use crate::matching::Resolved;
use crate::models::{Customer, NewEntry, Project, Service, StartClock, TimeEntry, User, UserId};
use crate::resolver::Resolver;
use crate::summary::{WorkSummary, entry_seconds, hours, summarize};

#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub customer_name: String,
    pub project_name: Option<String>,
    pub service_name: Option<String>,
    pub description: Option<String>,
    pub billable: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub customer_name: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub project_name: Option<String>,
    pub service_name: Option<String>,
    pub description: Option<String>,
    pub billable: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Started {
    pub message: String,
    pub entry: TimeEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stopped {
    pub message: String,
    pub entry: TimeEntry,
    pub duration_seconds: i64,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Running {
    pub entry: TimeEntry,
    pub elapsed_seconds: i64,
    pub elapsed_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Created {
    pub message: String,
    pub entry: TimeEntry,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, Copy)]
struct Names<'a> {
    customer: &'a str,
    project: Option<&'a str>,
    service: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Targets {
    customer: Resolved,
    project: Option<Resolved>,
    service: Option<Resolved>,
}

impl Targets {
    fn describe(&self) -> String {
        let mut text = self.customer.name.clone();
        if let Some(project) = &self.project {
            text.push_str(&format!(" - {}", project.name));
        }
        if let Some(service) = &self.service {
            text.push_str(&format!(" ({})", service.name));
        }
        text
    }
}

/// Runs the multi-call workflows behind each tool and resource.
///
/// The running entry is always read from Clockodo; nothing about the clock
/// is remembered between calls.
pub struct Tracker {
    api: Arc<dyn TimeTrackingApi>,
    resolver: Resolver,
}

impl Tracker {
    pub fn new(api: Arc<dyn TimeTrackingApi>, resolver: Resolver) -> Self {
        Self { api, resolver }
    }

    pub async fn start_time_tracking(&self, request: StartRequest) -> Result<Started, ClockodoError> {
        let names = Names {
            customer: &request.customer_name,
            project: request.project_name.as_deref(),
            service: request.service_name.as_deref(),
        };
        let targets = self.resolve_targets(names).await?;

        if let Some(running) = self.api.running_entry().await? {
            return Err(ClockodoError::AlreadyRunning(format!(
                "Time tracking is already running since {} (entry {}). Stop it first.",
                running.time_since, running.id
            )));
        }

        let billable = request.billable.unwrap_or(true);
        let text = request.description.clone();
        let api = Arc::clone(&self.api);
        let (entry, targets) = self
            .write_with_fresh_ids(names, targets, move |targets| {
                let api = Arc::clone(&api);
                let body = StartClock {
                    customers_id: targets.customer.id,
                    projects_id: targets.project.as_ref().map(|project| project.id),
                    services_id: targets.service.as_ref().map(|service| service.id),
                    billable: u8::from(billable),
                    text: text.clone(),
                };
                async move { api.start_clock(&body).await }
            })
            .await?;

        info!(entry_id = entry.id, customer_id = entry.customer_id, "Time tracking started");
        Ok(Started {
            message: format!("Time tracking started for {}", targets.describe()),
            entry,
        })
    }

    pub async fn stop_time_tracking(&self) -> Result<Stopped, ClockodoError> {
        let Some(running) = self.api.running_entry().await? else {
            return Err(ClockodoError::NoRunningEntry);
        };

        let entry = match self.api.stop_clock(running.id).await {
            Ok(entry) => entry,
            Err(ClockodoError::NotFound(_)) => return Err(ClockodoError::NoRunningEntry),
            Err(err) => return Err(err),
        };

        let seconds = entry_seconds(&entry, Utc::now()).unwrap_or(0);
        info!(entry_id = entry.id, duration_seconds = seconds, "Time tracking stopped");
        Ok(Stopped {
            message: format!("Time tracking stopped. Duration: {:.2} hours", hours(seconds)),
            entry,
            duration_seconds: seconds,
            duration_hours: hours(seconds),
        })
    }

    pub async fn get_running_entry(&self) -> Result<Option<Running>, ClockodoError> {
        let running = self.api.running_entry().await?;
        Ok(running.map(|entry| {
            let seconds = entry_seconds(&entry, Utc::now()).unwrap_or(0);
            Running {
                entry,
                elapsed_seconds: seconds,
                elapsed_hours: hours(seconds),
            }
        }))
    }

    pub async fn create_time_entry(&self, request: CreateRequest) -> Result<Created, ClockodoError> {
        let date = parse_date(&request.date)?;
        let start = parse_clock_time(&request.start_time)?;
        let end = parse_clock_time(&request.end_time)?;
        if start >= end {
            return Err(ClockodoError::Validation {
                message: format!(
                    "Start time {} must be before end time {}",
                    request.start_time.trim(),
                    request.end_time.trim()
                ),
                fields: vec!["start_time".to_string(), "end_time".to_string()],
            });
        }
        let seconds = (end - start).num_seconds();
        let time_since = local_to_api(date, start)?;
        let time_until = local_to_api(date, end)?;

        let names = Names {
            customer: &request.customer_name,
            project: request.project_name.as_deref(),
            service: request.service_name.as_deref(),
        };
        let targets = self.resolve_targets(names).await?;

        let billable = request.billable.unwrap_or(true);
        let text = request.description.clone();
        let api = Arc::clone(&self.api);
        let (entry, targets) = self
            .write_with_fresh_ids(names, targets, move |targets| {
                let api = Arc::clone(&api);
                let body = NewEntry {
                    customers_id: targets.customer.id,
                    projects_id: targets.project.as_ref().map(|project| project.id),
                    services_id: targets.service.as_ref().map(|service| service.id),
                    billable: u8::from(billable),
                    time_since: time_since.clone(),
                    time_until: time_until.clone(),
                    text: text.clone(),
                };
                async move { api.create_entry(&body).await }
            })
            .await?;

        info!(entry_id = entry.id, duration_seconds = seconds, "Time entry created");
        Ok(Created {
            message: format!(
                "Time entry created: {} ({:.2}h on {})",
                targets.describe(),
                hours(seconds),
                date.format("%Y-%m-%d")
            ),
            entry,
            duration_hours: hours(seconds),
        })
    }

    pub async fn get_work_summary(&self, period: Option<&str>) -> Result<WorkSummary, ClockodoError> {
        let period = Period::parse(period.unwrap_or("today"))?;
        let range = period.range(Local::now().date_naive());
        let (since, until) = range.as_api();

        let (entries, user_id, customers, projects) = tokio::try_join!(
            self.api.list_entries(&since, &until),
            self.resolver.current_user(),
            self.api.list_customers(),
            self.api.list_projects(None),
        )?;
        let entries = own_entries(entries, user_id);

        Ok(summarize(period, &range, &entries, &customers, &projects, Utc::now()))
    }

    /// The authenticated user's entries for `period`.
    pub async fn entries(&self, period: &str) -> Result<Vec<TimeEntry>, ClockodoError> {
        let period = Period::parse(period)?;
        let (since, until) = period.range(Local::now().date_naive()).as_api();
        let (entries, user_id) = tokio::try_join!(
            self.api.list_entries(&since, &until),
            self.resolver.current_user(),
        )?;
        Ok(own_entries(entries, user_id))
    }

    pub async fn customers(&self) -> Result<Vec<Customer>, ClockodoError> {
        self.api.list_customers().await
    }

    pub async fn projects(&self, customer_name: &str) -> Result<Vec<Project>, ClockodoError> {
        let customer = self.resolver.resolve_customer(customer_name).await?;
        self.api.list_projects(Some(customer.id)).await
    }

    pub async fn services(&self) -> Result<Vec<Service>, ClockodoError> {
        self.api.list_services().await
    }

    pub async fn users(&self) -> Result<Vec<User>, ClockodoError> {
        self.api.list_users().await
    }

    // Fails on the first name that does not resolve.
    async fn resolve_targets(&self, names: Names<'_>) -> Result<Targets, ClockodoError> {
        let customer = self.resolver.resolve_customer(names.customer).await?;
        let project = match names.project {
            Some(name) => Some(self.resolver.resolve_project(customer.id, name).await?),
            None => None,
        };
        let service = match names.service {
            Some(name) => Some(self.resolver.resolve_service(name).await?),
            None => None,
        };
        Ok(Targets {
            customer,
            project,
            service,
        })
    }

    fn forget(&self, names: Names<'_>, targets: &Targets) {
        self.resolver.invalidate(EntityKind::Customer, None, names.customer);
        if let Some(name) = names.project {
            self.resolver
                .invalidate(EntityKind::Project, Some(targets.customer.id), name);
        }
        if let Some(name) = names.service {
            self.resolver.invalidate(EntityKind::Service, None, name);
        }
    }

    /// Runs a write. When Clockodo answers `NotFound`, the IDs may have come
    /// from a stale cache: evict them, resolve again and retry once if any
    /// ID changed.
    async fn write_with_fresh_ids<F, Fut>(
        &self,
        names: Names<'_>,
        targets: Targets,
        write: F,
    ) -> Result<(TimeEntry, Targets), ClockodoError>
    where
        F: Fn(&Targets) -> Fut,
        Fut: Future<Output = Result<TimeEntry, ClockodoError>>,
    {
        match write(&targets).await {
            Ok(entry) => Ok((entry, targets)),
            Err(ClockodoError::NotFound(message)) => {
                self.forget(names, &targets);
                let fresh = self.resolve_targets(names).await?;
                if fresh == targets {
                    return Err(ClockodoError::NotFound(message));
                }
                warn!(customer_id = fresh.customer.id, "Retrying write with refreshed IDs");
                let entry = write(&fresh).await?;
                Ok((entry, fresh))
            }
            Err(err) => Err(err),
        }
    }
}

fn own_entries(entries: Vec<TimeEntry>, user_id: UserId) -> Vec<TimeEntry> {
    entries
        .into_iter()
        .filter(|entry| entry.user_id == Some(user_id))
        .collect()
}
