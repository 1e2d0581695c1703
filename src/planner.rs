//! C7: task kind → ordered step template (spec §4.4). Step targets are
//! resolved through the external `PoiResolver` collaborator; the fixed
//! "washing" and "charging dock" stops are resolved the same way, under
//! a reserved `target_kind` of `"AREA"`.

use crate::robots::PoiResolver;
use crate::store::models::{NewWorkflowStep, StepKind};
use crate::store::{Task, TaskKind};
use serde_json::json;

pub const AREA_TARGET_KIND: &str = "AREA";
pub const WASHING_AREA_REF: &str = "WASHING";
pub const CHARGING_DOCK_AREA_REF: &str = "CHARGING_DOCK";

/// Default approach tolerance for a NAVIGATE step, meters.
const DEFAULT_STOP_RADIUS: f64 = 0.3;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanError {
    #[error("could not resolve POI for {target_kind}/{target_ref}")]
    PoiNotFound { target_kind: String, target_ref: String },
}

async fn nav_step(
    poi: &dyn PoiResolver,
    target_kind: &str,
    target_ref: &str,
    code: &str,
) -> Result<NewWorkflowStep, PlanError> {
    let position = poi
        .resolve(target_kind, target_ref)
        .await
        .ok_or_else(|| PlanError::PoiNotFound {
            target_kind: target_kind.to_string(),
            target_ref: target_ref.to_string(),
        })?;
    Ok(NewWorkflowStep::builder()
        .kind(StepKind::Navigate)
        .code(code.to_string())
        .payload(json!({
            "area_id": position.area_id,
            "x": position.x,
            "y": position.y,
            "yaw": position.yaw,
            "stop_radius": DEFAULT_STOP_RADIUS,
        }))
        .build())
}

fn confirm_step(code: &str) -> NewWorkflowStep {
    NewWorkflowStep::builder()
        .kind(StepKind::ManualConfirm)
        .code(code.to_string())
        .build()
}

fn wait_step(code: &str, wait_seconds: Option<f64>) -> NewWorkflowStep {
    NewWorkflowStep::builder()
        .kind(StepKind::Wait)
        .code(code.to_string())
        .payload(json!({ "wait_seconds": wait_seconds }))
        .build()
}

pub async fn plan(task: &Task, poi: &dyn PoiResolver) -> Result<Vec<NewWorkflowStep>, PlanError> {
    let target = &task.target_kind;
    let target_ref = &task.target_ref;

    match task.kind {
        TaskKind::Navigate => Ok(vec![nav_step(poi, target, target_ref, "NAVIGATE").await?]),
        TaskKind::Delivery => Ok(vec![
            confirm_step("DELIVERY_LOADED"),
            nav_step(poi, target, target_ref, "DELIVERY_NAV").await?,
            confirm_step("DELIVERY_ARRIVED"),
            confirm_step("DELIVERY_HANDED_OFF"),
        ]),
        TaskKind::Cleanup => Ok(vec![
            nav_step(poi, target, target_ref, "CLEANUP_NAV").await?,
            confirm_step("CLEANUP_HAS_DISHES"),
            nav_step(poi, AREA_TARGET_KIND, WASHING_AREA_REF, "CLEANUP_NAV_WASHING").await?,
            confirm_step("CLEANUP_MORE_DISHES"),
        ]),
        TaskKind::Ordering => Ok(vec![
            nav_step(poi, target, target_ref, "ORDERING_NAV").await?,
            confirm_step("ORDER_DECISION"),
        ]),
        TaskKind::Billing => Ok(vec![
            nav_step(poi, target, target_ref, "BILLING_NAV").await?,
            confirm_step("BILLING_PAID"),
        ]),
        TaskKind::Charging => Ok(vec![
            nav_step(poi, AREA_TARGET_KIND, CHARGING_DOCK_AREA_REF, "CHARGING_NAV").await?,
            wait_step("CHARGING_WAIT", None),
        ]),
    }
}
