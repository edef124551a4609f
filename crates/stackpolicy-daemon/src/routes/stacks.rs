use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use stackpolicy_core::store::ReconcileLedger;
use stackpolicy_core::{LifecyclePolicy, StackIdentity};

use crate::error::AppError;
use crate::reconciler::ReconcileReport;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StackView {
    pub identity: StackIdentity,
    pub policy: LifecyclePolicy,
    pub ledger: ReconcileLedger,
}

fn stack_view(app: &AppState, id: StackIdentity) -> Result<Option<StackView>, AppError> {
    let store = app.store();
    let Some(policy) = store.get(&id)? else {
        return Ok(None);
    };
    let ledger = store.ledger(&id)?;
    Ok(Some(StackView {
        identity: id,
        policy,
        ledger,
    }))
}

/// GET /api/stacks: every known stack with its policy and ledger.
pub async fn list_stacks(State(app): State<AppState>) -> Result<Json<Vec<StackView>>, AppError> {
    let mut views = Vec::new();
    for id in app.store().list()? {
        if let Some(view) = stack_view(&app, id)? {
            views.push(view);
        }
    }
    Ok(Json(views))
}

/// GET /api/stacks/{org}/{project}/{stack}
pub async fn get_stack(
    State(app): State<AppState>,
    Path((org, project, stack)): Path<(String, String, String)>,
) -> Result<Json<StackView>, AppError> {
    let id = StackIdentity::new(org, project, stack)?;
    let label = id.to_string();
    stack_view(&app, id)?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no policy for stack {label}")))
}

/// POST /api/stacks/{org}/{project}/{stack}/reconcile: run a creation pass
/// now and return its report.
pub async fn reconcile_stack(
    State(app): State<AppState>,
    Path((org, project, stack)): Path<(String, String, String)>,
) -> Result<Json<ReconcileReport>, AppError> {
    let id = StackIdentity::new(org, project, stack)?;
    let report = app.scheduler.on_stack_created(&id).await?;
    Ok(Json(report))
}
