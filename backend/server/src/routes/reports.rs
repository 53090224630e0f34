use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    error::MessageError,
    models::{CreateReportRequest, Report},
    state,
};

#[derive(Serialize)]
pub struct ReportReceipt {
    pub message: &'static str,
    pub report: Report,
}

#[instrument(skip_all)]
pub async fn create_report_handler(
    State(state): State<Arc<state::State>>,
    payload: Result<Json<CreateReportRequest>, JsonRejection>,
) -> Result<Json<ReportReceipt>, MessageError> {
    let Json(payload) = payload?;
    let report = payload.validate(Utc::now())?;
    let report = state.store.insert_report(report).await?;
    info!(
        "Report {} filed against post {} ({})",
        report.id, report.post_id, report.category
    );

    Ok(Json(ReportReceipt {
        message: "Report submitted successfully",
        report,
    }))
}
