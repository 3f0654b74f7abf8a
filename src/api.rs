use async_trait::async_trait;

use crate::error::ClockodoError;
use crate::models::{
    Customer, CustomerId, EntryId, NewEntry, Project, Service, StartClock, TimeEntry, User,
};

/// The Clockodo calls the orchestration layer depends on.
#[async_trait]
pub trait TimeTrackingApi: Send + Sync {
    async fn list_customers(&self) -> Result<Vec<Customer>, ClockodoError>;

    /// All projects, or only those of `customer_id`.
    async fn list_projects(&self, customer_id: Option<CustomerId>) -> Result<Vec<Project>, ClockodoError>;

    async fn list_services(&self) -> Result<Vec<Service>, ClockodoError>;

    async fn list_users(&self) -> Result<Vec<User>, ClockodoError>;

    /// Snapshot of the authenticated user's running entry.
    async fn running_entry(&self) -> Result<Option<TimeEntry>, ClockodoError>;

    async fn start_clock(&self, request: &StartClock) -> Result<TimeEntry, ClockodoError>;

    async fn stop_clock(&self, entry_id: EntryId) -> Result<TimeEntry, ClockodoError>;

    /// Entries in `[since, until]`, timestamps in Clockodo's UTC format.
    async fn list_entries(&self, since: &str, until: &str) -> Result<Vec<TimeEntry>, ClockodoError>;

    async fn create_entry(&self, request: &NewEntry) -> Result<TimeEntry, ClockodoError>;
}
