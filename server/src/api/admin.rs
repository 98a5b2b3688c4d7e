//! Consistency audit endpoints (admin only).

use crate::server::state::AppState;
use axum::{Json, extract::State};
use campus_events_runtime::{DriftReport, RepairSummary};
use campus_events_web::{Admin, ApiResponse, AppError};
use serde::Serialize;

/// Scan followed by repair.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairResponse {
    /// What the scan found
    pub report: DriftReport,
    /// What the repair changed
    pub summary: RepairSummary,
}

/// `GET /api/admin/consistency`: report drift without changing anything.
pub async fn scan(
    State(state): State<AppState>,
    _admin: Admin,
) -> Result<Json<ApiResponse<DriftReport>>, AppError> {
    let report = state.auditor.scan().await?;
    let message = if report.is_clean() {
        "No drift found".to_string()
    } else {
        format!("{} findings", report.drift_count())
    };
    Ok(Json(ApiResponse::with_message(report, message)))
}

/// `POST /api/admin/consistency/repair`: scan, then converge.
pub async fn repair(
    State(state): State<AppState>,
    admin: Admin,
) -> Result<Json<ApiResponse<RepairResponse>>, AppError> {
    let (report, summary) = state.auditor.scan_and_repair().await?;
    tracing::info!(
        requested_by = %admin.user_id(),
        findings = report.drift_count(),
        failures = summary.failures,
        "Consistency repair finished"
    );

    let message = if summary.failures == 0 {
        "Repair complete"
    } else {
        "Repair incomplete, run it again"
    };
    Ok(Json(ApiResponse::with_message(
        RepairResponse { report, summary },
        message,
    )))
}
