//! Resource payloads exchanged with callers and with the upstream API.

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Numeric identifier shared by every resource.
pub type EntityId = i64;

/// Anything the gateway can key in a cache.
pub trait Identified {
    fn id(&self) -> EntityId;
}

/// The two resource families proxied by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Task,
    User,
}

impl ResourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Task => "task",
            ResourceKind::User => "user",
        }
    }

    /// Circuit used for reads of this resource unless configured otherwise
    pub fn default_circuit(&self) -> &'static str {
        match self {
            ResourceKind::Task => "taskManagerService",
            ResourceKind::User => "userManagerService",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binds an entity type and its write payload to a resource family.
pub trait Resource: Send + Sync + 'static {
    type Entity: Identified + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Request: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    const KIND: ResourceKind;
}

/// Task as returned by the upstream API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: EntityId,
    pub task_title: String,
    #[serde(default)]
    pub task_description: Option<String>,
    #[serde(default)]
    pub task_due_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub user_id: Option<EntityId>,
}

impl Identified for Task {
    fn id(&self) -> EntityId {
        self.task_id
    }
}

/// Task create/update payload; `task_id` is required only for updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<EntityId>,
    pub task_title: String,
    #[serde(default)]
    pub task_description: Option<String>,
    #[serde(default)]
    pub task_due_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub user_id: Option<EntityId>,
}

/// User as returned by the upstream API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: EntityId,
    pub full_name: String,
    pub user_email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub task_ids: BTreeSet<EntityId>,
}

impl Identified for User {
    fn id(&self) -> EntityId {
        self.user_id
    }
}

/// User create/update payload
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<EntityId>,
    pub full_name: String,
    pub user_email: String,
    #[serde(default)]
    pub user_password: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub task_ids: BTreeSet<EntityId>,
}

// Keeps the password out of logs and `#[instrument]` fields.
impl fmt::Debug for UserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRequest")
            .field("user_id", &self.user_id)
            .field("full_name", &self.full_name)
            .field("user_email", &self.user_email)
            .field("user_password", &self.user_password.as_ref().map(|_| "<redacted>"))
            .field("role", &self.role)
            .field("task_ids", &self.task_ids)
            .finish()
    }
}

/// Marker for the task resource family
#[derive(Debug, Clone, Copy)]
pub struct Tasks;

impl Resource for Tasks {
    type Entity = Task;
    type Request = TaskRequest;

    const KIND: ResourceKind = ResourceKind::Task;
}

/// Marker for the user resource family
#[derive(Debug, Clone, Copy)]
pub struct Users;

impl Resource for Users {
    type Entity = User;
    type Request = UserRequest;

    const KIND: ResourceKind = ResourceKind::User;
}
