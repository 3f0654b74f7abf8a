use serde::{Deserialize, Deserializer, Serialize};

pub type CustomerId = u64;
pub type ProjectId = u64;
pub type ServiceId = u64;
pub type UserId = u64;
pub type EntryId = u64;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Project {
    pub id: ProjectId,
    #[serde(rename = "customers_id")]
    pub customer_id: CustomerId,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub role: Option<String>,
}

/// A time entry as Clockodo reports it. `time_until` is unset while the
/// entry is running.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeEntry {
    pub id: EntryId,
    #[serde(rename = "customers_id")]
    pub customer_id: CustomerId,
    #[serde(rename = "projects_id", default)]
    pub project_id: Option<ProjectId>,
    #[serde(rename = "services_id", default)]
    pub service_id: Option<ServiceId>,
    #[serde(rename = "users_id", default)]
    pub user_id: Option<UserId>,
    pub time_since: String,
    #[serde(default)]
    pub time_until: Option<String>,
    #[serde(rename = "text", default)]
    pub description: Option<String>,
    #[serde(default = "default_active", deserialize_with = "flag")]
    pub billable: bool,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(rename = "customers_name", default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(rename = "projects_name", default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(rename = "services_name", default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl TimeEntry {
    pub fn is_running(&self) -> bool {
        self.time_until.is_none()
    }
}

/// Body for `POST /clock`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StartClock {
    pub customers_id: CustomerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects_id: Option<ProjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services_id: Option<ServiceId>,
    pub billable: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Body for `POST /entries`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewEntry {
    pub customers_id: CustomerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects_id: Option<ProjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services_id: Option<ServiceId>,
    pub billable: u8,
    pub time_since: String,
    pub time_until: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomersResponse {
    #[serde(default)]
    pub customers: Vec<Customer>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectsResponse {
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Deserialize)]
pub struct ServicesResponse {
    #[serde(default)]
    pub services: Vec<Service>,
}

#[derive(Debug, Deserialize)]
pub struct UsersResponse {
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub struct ClockResponse {
    #[serde(default, alias = "running_entry")]
    pub running: Option<TimeEntry>,
}

#[derive(Debug, Deserialize)]
pub struct StopClockResponse {
    pub stopped: TimeEntry,
}

#[derive(Debug, Deserialize)]
pub struct EntryResponse {
    pub entry: TimeEntry,
}

#[derive(Debug, Deserialize)]
pub struct EntriesResponse {
    #[serde(default)]
    pub entries: Vec<TimeEntry>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Paging {
    pub current_page: u32,
    pub count_pages: u32,
}

const fn default_active() -> bool {
    true
}

// Clockodo sends billable as 0/1/2 (2 = already billed); older payloads use booleans.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Int(value) => value != 0,
    })
}
