use std::collections::{HashMap, HashSet};

use serde::Serialize;

/// Group properties: group type → group name → property map.
pub type GroupProperties = HashMap<String, HashMap<String, HashMap<String, serde_json::Value>>>;

/// The user context variants are evaluated against.
///
/// Sent to the server on [`fetch`](crate::Client::fetch); never persisted by
/// the SDK.
///
/// # Examples
/// ```
/// # use experiment::UserContext;
/// let user = UserContext::new()
///     .user_id("user-1")
///     .user_property("plan", "premium")
///     .group("org", "acme");
/// ```
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    /// Primary user identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Device identifier, used when no user id is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Free-form user properties used for targeting.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub user_properties: HashMap<String, serde_json::Value>,
    /// Group memberships, keyed by group type.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub groups: HashMap<String, HashSet<String>>,
    /// Properties of the groups the user belongs to.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub group_properties: GroupProperties,
}

impl UserContext {
    /// Create an empty user context.
    pub fn new() -> UserContext {
        UserContext::default()
    }

    /// Set the user id.
    pub fn user_id(mut self, user_id: impl Into<String>) -> UserContext {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the device id.
    pub fn device_id(mut self, device_id: impl Into<String>) -> UserContext {
        self.device_id = Some(device_id.into());
        self
    }

    /// Add a user property.
    pub fn user_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> UserContext {
        self.user_properties.insert(key.into(), value.into());
        self
    }

    /// Add the user to a group of the given type.
    pub fn group(
        mut self,
        group_type: impl Into<String>,
        group_name: impl Into<String>,
    ) -> UserContext {
        self.groups
            .entry(group_type.into())
            .or_default()
            .insert(group_name.into());
        self
    }

    /// Add a property for a group the user belongs to.
    pub fn group_property(
        mut self,
        group_type: impl Into<String>,
        group_name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> UserContext {
        self.group_properties
            .entry(group_type.into())
            .or_default()
            .entry(group_name.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }
}
