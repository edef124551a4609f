//! Request bodies for the lifecycle resources written by the reconciler.

use serde::{Deserialize, Serialize};

pub const DRIFT_CRON_HOURLY: &str = "0 * * * *";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTag {
    pub name: String,
    pub value: String,
}

/// TTL schedule; `timestamp` is already in `YYYY-MM-DDTHH:MM:00Z` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtlSchedule {
    pub timestamp: String,
    pub delete_after_destroy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftSchedule {
    pub schedule_cron: String,
    pub auto_remediate: bool,
}

impl DriftSchedule {
    pub fn hourly(auto_remediate: bool) -> Self {
        Self {
            schedule_cron: DRIFT_CRON_HOURLY.to_string(),
            auto_remediate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    Read,
    Write,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStackPermission {
    /// Addressed in the URL, not sent in the body.
    #[serde(skip)]
    pub team: String,
    pub permission: PermissionScope,
}

impl TeamStackPermission {
    pub fn admin(team: impl Into<String>) -> Self {
        Self {
            team: team.into(),
            permission: PermissionScope::Admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        let ttl = TtlSchedule {
            timestamp: "2024-01-01T08:00:00Z".into(),
            delete_after_destroy: false,
        };
        assert_eq!(
            serde_json::to_value(&ttl).unwrap(),
            serde_json::json!({"timestamp": "2024-01-01T08:00:00Z", "deleteAfterDestroy": false})
        );
        assert_eq!(
            serde_json::to_value(DriftSchedule::hourly(true)).unwrap(),
            serde_json::json!({"scheduleCron": "0 * * * *", "autoRemediate": true})
        );
        assert_eq!(
            serde_json::to_value(TeamStackPermission::admin("DevTeam")).unwrap(),
            serde_json::json!({"permission": "admin"})
        );
    }
}
