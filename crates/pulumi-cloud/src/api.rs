use std::future::Future;

use stackpolicy_core::{DeploymentSettings, StackIdentity};

use crate::types::{DriftSchedule, StackTag, TeamStackPermission, TtlSchedule};
use crate::Result;

/// Operations the reconciler needs from the stack management API.
///
/// Every setter is an idempotent full-document upsert keyed by resource
/// type and stack, so callers may retry or reorder them freely.
pub trait ManagementApi: Send + Sync {
    /// Current deployment settings; `Ok(None)` when the stack has none.
    fn get_deployment_settings(
        &self,
        id: &StackIdentity,
    ) -> impl Future<Output = Result<Option<DeploymentSettings>>> + Send;

    fn put_deployment_settings(
        &self,
        id: &StackIdentity,
        settings: &DeploymentSettings,
    ) -> impl Future<Output = Result<()>> + Send;

    fn set_stack_tag(
        &self,
        id: &StackIdentity,
        tag: &StackTag,
    ) -> impl Future<Output = Result<()>> + Send;

    fn put_ttl_schedule(
        &self,
        id: &StackIdentity,
        schedule: &TtlSchedule,
    ) -> impl Future<Output = Result<()>> + Send;

    fn put_drift_schedule(
        &self,
        id: &StackIdentity,
        schedule: &DriftSchedule,
    ) -> impl Future<Output = Result<()>> + Send;

    fn grant_team_permission(
        &self,
        id: &StackIdentity,
        grant: &TeamStackPermission,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl<A: ManagementApi> ManagementApi for std::sync::Arc<A> {
    fn get_deployment_settings(
        &self,
        id: &StackIdentity,
    ) -> impl Future<Output = Result<Option<DeploymentSettings>>> + Send {
        (**self).get_deployment_settings(id)
    }

    fn put_deployment_settings(
        &self,
        id: &StackIdentity,
        settings: &DeploymentSettings,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).put_deployment_settings(id, settings)
    }

    fn set_stack_tag(
        &self,
        id: &StackIdentity,
        tag: &StackTag,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).set_stack_tag(id, tag)
    }

    fn put_ttl_schedule(
        &self,
        id: &StackIdentity,
        schedule: &TtlSchedule,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).put_ttl_schedule(id, schedule)
    }

    fn put_drift_schedule(
        &self,
        id: &StackIdentity,
        schedule: &DriftSchedule,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).put_drift_schedule(id, schedule)
    }

    fn grant_team_permission(
        &self,
        id: &StackIdentity,
        grant: &TeamStackPermission,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).grant_team_permission(id, grant)
    }
}
