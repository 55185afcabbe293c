//! Prediction endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use data_validator::ValidationError;
use inference_service::PredictionResponse;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

/// Media type assumed when a file part declares none
const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// Uploaded file extracted from the multipart body
#[derive(Debug)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub file_name: Option<String>,
}

/// POST /predict - classify one uploaded leaf image
pub async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<([(&'static str, String); 1], Json<PredictionResponse>), ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("predict", %request_id);

    async move {
        let upload = read_upload(multipart).await?;
        debug!(
            "Received {:?} ({} bytes, {})",
            upload.file_name,
            upload.bytes.len(),
            upload.media_type
        );

        let start = Instant::now();
        let result = state.service.predict(upload.bytes, &upload.media_type).await;
        metrics::histogram!("leafscan_predict_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(verdict) => {
                metrics::counter!("leafscan_predictions_total", "outcome" => verdict.outcome())
                    .increment(1);
                let body = state.service.to_response(&verdict);
                Ok(([("x-request-id", request_id.to_string())], Json(body)))
            }
            Err(err) => {
                metrics::counter!("leafscan_prediction_errors_total", "kind" => err.kind())
                    .increment(1);
                Err(err.into())
            }
        }
    }
    .instrument(span)
    .await
}

/// First part named `file`, or failing that the first part with a filename
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        let is_file = field.name() == Some("file") || field.file_name().is_some();
        if !is_file {
            continue;
        }

        let media_type = field
            .content_type()
            .unwrap_or(UNKNOWN_MEDIA_TYPE)
            .to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;

        return Ok(Upload {
            bytes: bytes.to_vec(),
            media_type,
            file_name,
        });
    }

    metrics::counter!("leafscan_prediction_errors_total", "kind" => "validation_error").increment(1);
    Err(ValidationError::MissingFile("request has no `file` part".to_string()).into())
}
