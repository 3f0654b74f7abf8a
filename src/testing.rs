//! In-memory stand-in for the Clockodo API used by unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::api::TimeTrackingApi;
use crate::error::ClockodoError;
use crate::models::{
    Customer, CustomerId, EntryId, NewEntry, Project, Service, StartClock, TimeEntry, User,
};

#[derive(Default)]
struct State {
    customers: Vec<Customer>,
    projects: Vec<Project>,
    services: Vec<Service>,
    users: Vec<User>,
    running: Option<TimeEntry>,
    entries: Vec<TimeEntry>,
    next_id: EntryId,
    calls: HashMap<&'static str, usize>,
    fail_next: HashMap<&'static str, ClockodoError>,
    stalls: HashMap<&'static str, Duration>,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<State>,
}

impl FakeApi {
    pub fn with_customers(customers: &[(CustomerId, &str)]) -> Self {
        let api = FakeApi::default();
        {
            let mut state = api.state.lock().unwrap();
            state.next_id = 1000;
            state.customers = customers
                .iter()
                .map(|(id, name)| Customer {
                    id: *id,
                    name: name.to_string(),
                    active: true,
                })
                .collect();
        }
        api
    }

    pub fn add_customer(&self, id: u64, name: &str) {
        self.state.lock().unwrap().customers.push(Customer {
            id,
            name: name.to_string(),
            active: true,
        });
    }

    pub fn remove_customer(&self, id: u64) {
        self.state.lock().unwrap().customers.retain(|customer| customer.id != id);
    }

    pub fn add_project(&self, id: u64, customer_id: u64, name: &str) {
        self.state.lock().unwrap().projects.push(Project {
            id,
            customer_id,
            name: name.to_string(),
            active: true,
        });
    }

    pub fn add_service(&self, id: u64, name: &str) {
        self.state.lock().unwrap().services.push(Service {
            id,
            name: name.to_string(),
            active: true,
        });
    }

    pub fn add_user(&self, id: u64, name: &str, email: &str) {
        self.state.lock().unwrap().users.push(User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            active: true,
            role: None,
        });
    }

    pub fn add_entry(&self, entry: TimeEntry) {
        let mut state = self.state.lock().unwrap();
        if entry.is_running() {
            state.running = Some(entry);
        } else {
            state.entries.push(entry);
        }
    }

    pub fn running(&self) -> Option<TimeEntry> {
        self.state.lock().unwrap().running.clone()
    }

    pub fn entries(&self) -> Vec<TimeEntry> {
        self.state.lock().unwrap().entries.clone()
    }

    /// Makes the next call to `method` fail with `error`.
    pub fn fail_next(&self, method: &'static str, error: ClockodoError) {
        self.state.lock().unwrap().fail_next.insert(method, error);
    }

    /// Makes every call to `method` wait `delay` before answering.
    pub fn stall(&self, method: &'static str, delay: Duration) {
        self.state.lock().unwrap().stalls.insert(method, delay);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().unwrap().calls.get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    async fn pause(&self, method: &'static str) {
        let delay = self.state.lock().unwrap().stalls.get(method).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn begin(&self, method: &'static str) -> Result<std::sync::MutexGuard<'_, State>, ClockodoError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(method).or_insert(0) += 1;
        match state.fail_next.remove(method) {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

pub fn entry(id: EntryId, customer_id: CustomerId, start: &str, end: Option<&str>) -> TimeEntry {
    TimeEntry {
        id,
        customer_id,
        project_id: None,
        service_id: None,
        user_id: Some(7),
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

#[async_trait]
impl TimeTrackingApi for FakeApi {
    async fn list_customers(&self) -> Result<Vec<Customer>, ClockodoError> {
        Ok(self.begin("list_customers")?.customers.clone())
    }

    async fn list_projects(&self, customer_id: Option<CustomerId>) -> Result<Vec<Project>, ClockodoError> {
        let state = self.begin("list_projects")?;
        Ok(state
            .projects
            .iter()
            .filter(|project| customer_id.is_none_or(|id| project.customer_id == id))
            .cloned()
            .collect())
    }

    async fn list_services(&self) -> Result<Vec<Service>, ClockodoError> {
        Ok(self.begin("list_services")?.services.clone())
    }

    async fn list_users(&self) -> Result<Vec<User>, ClockodoError> {
        Ok(self.begin("list_users")?.users.clone())
    }

    async fn running_entry(&self) -> Result<Option<TimeEntry>, ClockodoError> {
        self.pause("running_entry").await;
        Ok(self.begin("running_entry")?.running.clone())
    }

    async fn start_clock(&self, request: &StartClock) -> Result<TimeEntry, ClockodoError> {
        let mut state = self.begin("start_clock")?;
        if state.running.is_some() {
            return Err(ClockodoError::AlreadyRunning("A clock is already running".to_string()));
        }
        if !state.customers.iter().any(|customer| customer.id == request.customers_id) {
            return Err(ClockodoError::NotFound("Customer not found".to_string()));
        }
        state.next_id += 1;
        let mut started = entry(
            state.next_id,
            request.customers_id,
            &Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            None,
        );
        started.project_id = request.projects_id;
        started.service_id = request.services_id;
        started.description = request.text.clone();
        started.billable = request.billable != 0;
        state.running = Some(started.clone());
        Ok(started)
    }

    async fn stop_clock(&self, entry_id: EntryId) -> Result<TimeEntry, ClockodoError> {
        let mut state = self.begin("stop_clock")?;
        match state.running.take() {
            Some(mut running) if running.id == entry_id => {
                running.time_until = Some(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string());
                state.entries.push(running.clone());
                Ok(running)
            }
            other => {
                state.running = other;
                Err(ClockodoError::NotFound("Entry not found".to_string()))
            }
        }
    }

    async fn list_entries(&self, _since: &str, _until: &str) -> Result<Vec<TimeEntry>, ClockodoError> {
        let state = self.begin("list_entries")?;
        let mut entries = state.entries.clone();
        entries.extend(state.running.clone());
        Ok(entries)
    }

    async fn create_entry(&self, request: &NewEntry) -> Result<TimeEntry, ClockodoError> {
        let mut state = self.begin("create_entry")?;
        if !state.customers.iter().any(|customer| customer.id == request.customers_id) {
            return Err(ClockodoError::NotFound("Customer not found".to_string()));
        }
        state.next_id += 1;
        let mut created = entry(
            state.next_id,
            request.customers_id,
            &request.time_since,
            Some(&request.time_until),
        );
        created.project_id = request.projects_id;
        created.service_id = request.services_id;
        created.description = request.text.clone();
        state.entries.push(created.clone());
        Ok(created)
    }
}
