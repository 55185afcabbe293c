//! Inference Service Implementation

use crate::{HealthReport, PredictionResponse, ServiceError, ServiceOptions};
use artifact_bundle::ArtifactBundle;
use data_validator::UploadValidator;
use decision_engine::{DecisionEngine, PredictionVerdict};
use inference_engine::PredictorPool;
use preprocessor::{Preprocessor, RawImage};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Loaded bundle plus everything needed to answer prediction requests
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct InferenceService {
    bundle: Arc<ArtifactBundle>,
    validator: UploadValidator,
    preprocessor: Arc<Preprocessor>,
    pool: Arc<PredictorPool>,
    engine: DecisionEngine,
    options: ServiceOptions,
}

impl InferenceService {
    /// Build the service and its predictor pool from a loaded bundle
    pub fn new(bundle: Arc<ArtifactBundle>, options: ServiceOptions) -> Result<Self, ServiceError> {
        options.validate().map_err(ServiceError::InvalidOptions)?;

        let engine = DecisionEngine::new(options.threshold)?;
        let pool = Arc::new(PredictorPool::new(&bundle, options.pool_size)?);
        let preprocessor = Arc::new(Preprocessor::from_bundle(&bundle));
        let validator = UploadValidator::new(options.upload_limits());

        info!(
            "Inference service ready: {} classes, threshold {:.2}, {} predictors",
            bundle.labels().len(),
            engine.threshold(),
            pool.size()
        );

        Ok(Self {
            bundle,
            validator,
            preprocessor,
            pool,
            engine,
            options,
        })
    }

    /// Bundle the service was built from
    pub fn bundle(&self) -> &ArtifactBundle {
        &self.bundle
    }

    /// Options in effect
    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Confidence threshold applied to every verdict
    pub fn threshold(&self) -> f32 {
        self.engine.threshold()
    }

    /// Classify one upload
    ///
    /// Dropping the returned future cancels the remaining stages.
    pub async fn predict(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
    ) -> Result<PredictionVerdict, ServiceError> {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        self.predict_with_cancel(bytes, media_type, cancel).await
    }

    /// Classify one upload, stopping early once `cancel` fires
    pub async fn predict_with_cancel(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
        cancel: CancellationToken,
    ) -> Result<PredictionVerdict, ServiceError> {
        let start = Instant::now();

        // Nothing is decoded or queued for an upload the validator rejects
        self.validator.validate(bytes.len(), media_type)?;
        let raw = RawImage::new(bytes, media_type);

        let token = cancel.child_token();
        let deadline = self.options.request_timeout();

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ServiceError::Cancelled),
            result = tokio::time::timeout(deadline, self.run_pipeline(raw, token.clone())) => {
                match result {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        token.cancel();
                        Err(ServiceError::Timeout(self.options.request_timeout_ms))
                    }
                }
            }
        };

        match &outcome {
            Ok(verdict) => info!(
                "Prediction {} ({:.3}) in {}ms",
                verdict.label().unwrap_or(crate::UNCERTAIN_CLASS),
                verdict.confidence(),
                start.elapsed().as_millis()
            ),
            Err(e) if e.is_client_error() => debug!("Rejected upload: {}", e),
            Err(e) => warn!("Prediction failed ({}): {}", e.kind(), e),
        }
        outcome
    }

    /// Classify one upload and shape the result for callers
    pub async fn respond(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
    ) -> Result<PredictionResponse, ServiceError> {
        let verdict = self.predict(bytes, media_type).await?;
        Ok(self.to_response(&verdict))
    }

    /// Shape a verdict with the configured uncertain message
    pub fn to_response(&self, verdict: &PredictionVerdict) -> PredictionResponse {
        PredictionResponse::from_verdict(verdict, &self.options.uncertain_message)
    }

    /// Report readiness and the loaded contract
    pub fn health(&self) -> HealthReport {
        let spec = self.bundle.preprocess_spec();
        HealthReport {
            status: "ok".to_string(),
            labels: self.bundle.labels().as_slice().to_vec(),
            img_size: spec.image_size(),
            arch: spec.arch().to_string(),
            bundle_version: spec.version().map(str::to_string),
            loaded_at: self.bundle.loaded_at(),
            threshold: self.engine.threshold(),
            pool_size: self.pool.size(),
            pool_available: self.pool.available(),
        }
    }

    /// Stop accepting work; queued requests fail with an inference error
    pub fn shutdown(&self) {
        info!("Closing predictor pool");
        self.pool.close();
    }

    async fn run_pipeline(
        &self,
        raw: RawImage,
        cancel: CancellationToken,
    ) -> Result<PredictionVerdict, ServiceError> {
        let queued = Instant::now();
        let mut predictor = self.pool.checkout().await?;
        debug!("Waited {}us for a predictor", queued.elapsed().as_micros());
        ensure_live(&cancel)?;

        let preprocessor = Arc::clone(&self.preprocessor);
        let bundle = Arc::clone(&self.bundle);
        let engine = self.engine;

        let task = tokio::task::spawn_blocking(move || -> Result<PredictionVerdict, ServiceError> {
            let tensor = preprocessor.process(&raw)?;
            ensure_live(&cancel)?;

            let probabilities = predictor.infer(&tensor)?;
            drop(predictor);
            ensure_live(&cancel)?;

            Ok(engine.decide(probabilities.as_slice(), bundle.labels().as_slice())?)
        });

        task.await
            .map_err(|e| ServiceError::Worker(e.to_string()))?
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), ServiceError> {
    if cancel.is_cancelled() {
        Err(ServiceError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_bundle::testing::{synthetic_bundle, ChannelMeanModel, FixedOutputModel};
    use artifact_bundle::{GraphError, ModelFactory, ModelGraph, OutputKind};
    use data_validator::ValidationError;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::time::Duration;

    fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn service_with(model: Arc<dyn ModelFactory>, options: ServiceOptions) -> InferenceService {
        let bundle = synthetic_bundle(model, 8, OutputKind::Probabilities);
        InferenceService::new(Arc::new(bundle), options).unwrap()
    }

    fn fixed(output: Vec<f32>) -> (InferenceService, Arc<FixedOutputModel>) {
        let model = Arc::new(FixedOutputModel::new(output));
        (service_with(model.clone(), ServiceOptions::default()), model)
    }

    #[derive(Debug)]
    struct SlowModel(Duration);

    impl ModelFactory for SlowModel {
        fn output_dim(&self) -> usize {
            3
        }

        fn instantiate(&self) -> Result<Box<dyn ModelGraph>, GraphError> {
            Ok(Box::new(SlowGraph(self.0)))
        }
    }

    struct SlowGraph(Duration);

    impl ModelGraph for SlowGraph {
        fn forward(&mut self, _input: &[f32]) -> Result<Vec<f32>, GraphError> {
            std::thread::sleep(self.0);
            Ok(vec![0.1, 0.8, 0.1])
        }
    }

    #[tokio::test]
    async fn test_confident_late_blight() {
        let (service, model) = fixed(vec![0.04, 0.93, 0.03]);

        let verdict = service.predict(png(32, 32, [40, 120, 30]), "image/png").await.unwrap();
        assert!(verdict.is_confident());
        assert_eq!(verdict.label(), Some("Potato___Late_blight"));
        assert_eq!(verdict.confidence(), 0.93);
        assert_eq!(verdict.top3()[0].label, "Potato___Late_blight");
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_is_uncertain_with_message() {
        let (service, _) = fixed(vec![0.42, 0.30, 0.28]);

        let body = service.respond(png(16, 16, [90, 90, 90]), "image/png").await.unwrap();
        assert_eq!(body.class, "uncertain");
        assert_eq!(body.confidence, 0.42);
        assert_eq!(body.top3.len(), 3);
        assert_eq!(body.top3[0].class, "Potato___Early_blight");
        assert_eq!(body.message.as_deref(), Some(service.options().uncertain_message.as_str()));
    }

    #[tokio::test]
    async fn test_text_declared_as_jpeg_is_a_decode_error() {
        let (service, model) = fixed(vec![0.04, 0.93, 0.03]);

        let err = service
            .predict(b"definitely not an image".to_vec(), "image/jpeg")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "decode_error");
        assert!(err.is_client_error());
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected_before_decoding() {
        let model = Arc::new(FixedOutputModel::new(vec![0.04, 0.93, 0.03]));
        let options = ServiceOptions {
            max_upload_bytes: 64,
            ..Default::default()
        };
        let service = service_with(model.clone(), options);

        let err = service.predict(vec![0u8; 65], "image/png").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::PayloadTooLarge { limit: 64, .. })
        ));
        assert_eq!(model.call_count(), 0);
        assert_eq!(service.health().pool_available, service.health().pool_size);
    }

    #[tokio::test]
    async fn test_unaccepted_media_type() {
        let (service, model) = fixed(vec![0.04, 0.93, 0.03]);

        let err = service.predict(b"hello".to_vec(), "text/plain").await.unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_same_image_same_verdict() {
        let bundle = synthetic_bundle(Arc::new(ChannelMeanModel), 8, OutputKind::Logits);
        let service = InferenceService::new(Arc::new(bundle), ServiceOptions::default()).unwrap();
        let image = png(20, 12, [200, 30, 60]);

        let first = service.predict(image.clone(), "image/png").await.unwrap();
        let _other = service.predict(png(20, 12, [10, 240, 10]), "image/png").await.unwrap();
        let again = service.predict(image, "image/png").await.unwrap();

        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn test_health_reports_contract() {
        let (service, _) = fixed(vec![0.04, 0.93, 0.03]);
        let health = service.health();

        assert_eq!(health.status, "ok");
        assert_eq!(
            health.labels,
            vec!["Potato___Early_blight", "Potato___Late_blight", "Potato___healthy"]
        );
        assert_eq!(health.img_size, 8);
        assert_eq!(health.arch, "synthetic");
        assert_eq!(health.bundle_version.as_deref(), Some("test"));
        assert_eq!(health.threshold, 0.5);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_runs_the_model() {
        let (service, model) = fixed(vec![0.04, 0.93, 0.03]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service
            .predict_with_cancel(png(8, 8, [0, 0, 0]), "image/png", cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Cancelled));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_inference_returns_promptly() {
        let service = Arc::new(service_with(
            Arc::new(SlowModel(Duration::from_millis(300))),
            ServiceOptions::default(),
        ));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = service
            .predict_with_cancel(png(8, 8, [0, 0, 0]), "image/png", cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Cancelled));
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let options = ServiceOptions {
            request_timeout_ms: 40,
            ..Default::default()
        };
        let service = service_with(Arc::new(SlowModel(Duration::from_millis(300))), options);

        let err = service.predict(png(8, 8, [0, 0, 0]), "image/png").await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(40)));
        assert_eq!(err.kind(), "timeout");
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_concurrent_predictions() {
        let model = Arc::new(FixedOutputModel::new(vec![0.04, 0.93, 0.03]));
        let options = ServiceOptions {
            pool_size: 2,
            ..Default::default()
        };
        let service = Arc::new(service_with(model.clone(), options));

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.predict(png(10, 10, [i, i, i]), "image/png").await
            }));
        }
        for handle in handles {
            let verdict = handle.await.unwrap().unwrap();
            assert_eq!(verdict.label(), Some("Potato___Late_blight"));
        }
        assert_eq!(model.call_count(), 8);
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let bundle = synthetic_bundle(
            Arc::new(FixedOutputModel::new(vec![0.2, 0.5, 0.3])),
            8,
            OutputKind::Probabilities,
        );
        let options = ServiceOptions {
            threshold: -0.1,
            ..Default::default()
        };
        let err = InferenceService::new(Arc::new(bundle), options).err().unwrap();
        assert_eq!(err.kind(), "configuration_error");
    }
}
