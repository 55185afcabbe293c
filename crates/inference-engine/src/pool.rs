//! Predictor Pool
//!
//! A fixed set of predictor instances, each with its own model graph.
//! Requests check one out exclusively; the semaphore bounds concurrency to
//! the pool size and queues the rest.

use crate::{InferenceError, Predictor, ProbabilityVector};
use artifact_bundle::ArtifactBundle;
use preprocessor::NormalizedTensor;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

/// Bounded pool of predictors
pub struct PredictorPool {
    idle: Mutex<Vec<Predictor>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl PredictorPool {
    /// Instantiate `size` predictors from the bundle
    pub fn new(bundle: &ArtifactBundle, size: usize) -> Result<Self, InferenceError> {
        if size == 0 {
            return Err(InferenceError::InvalidPoolSize);
        }
        let predictors = (0..size)
            .map(|_| Predictor::new(bundle))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_predictors(predictors)
    }

    /// Pool over already-built predictors
    pub fn from_predictors(predictors: Vec<Predictor>) -> Result<Self, InferenceError> {
        if predictors.is_empty() {
            return Err(InferenceError::InvalidPoolSize);
        }
        let size = predictors.len();
        info!("Creating predictor pool with {} instances", size);
        Ok(Self {
            idle: Mutex::new(predictors),
            permits: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    /// Number of predictors owned by the pool
    pub fn size(&self) -> usize {
        self.size
    }

    /// Predictors not currently checked out
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free predictor
    pub async fn checkout(self: &Arc<Self>) -> Result<PooledPredictor, InferenceError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| InferenceError::PoolClosed)?;

        // A permit guarantees an idle instance; the Vec stays consistent even if a holder panicked
        let predictor = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or(InferenceError::PoolClosed)?;

        debug!("Predictor checked out ({} left)", self.available());
        Ok(PooledPredictor {
            predictor: Some(predictor),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Stop handing out predictors; waiting checkouts fail with `PoolClosed`
    pub fn close(&self) {
        self.permits.close();
    }
}

/// Predictor on loan from a pool, returned on drop
pub struct PooledPredictor {
    predictor: Option<Predictor>,
    pool: Arc<PredictorPool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledPredictor {
    pub fn infer(&mut self, tensor: &NormalizedTensor) -> Result<ProbabilityVector, InferenceError> {
        self.predictor
            .as_mut()
            .ok_or(InferenceError::PoolClosed)?
            .infer(tensor)
    }
}

impl Drop for PooledPredictor {
    fn drop(&mut self) {
        // Runs before the permit field is dropped, so the instance is back before the slot opens
        if let Some(predictor) = self.predictor.take() {
            self.pool
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(predictor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_bundle::testing::{synthetic_bundle, FixedOutputModel};
    use artifact_bundle::OutputKind;
    use std::time::Duration;

    fn make_pool(size: usize) -> (Arc<PredictorPool>, Arc<FixedOutputModel>) {
        let model = Arc::new(FixedOutputModel::new(vec![0.2, 0.5, 0.3]));
        let bundle = synthetic_bundle(model.clone(), 2, OutputKind::Probabilities);
        (Arc::new(PredictorPool::new(&bundle, size).unwrap()), model)
    }

    fn zeros() -> NormalizedTensor {
        NormalizedTensor::from_shape_vec([3, 2, 2], vec![0.0; 12]).unwrap()
    }

    #[tokio::test]
    async fn test_checkout_returns_on_drop() {
        let (pool, _) = make_pool(2);
        assert_eq!(pool.available(), 2);

        let mut held = pool.checkout().await.unwrap();
        assert_eq!(pool.available(), 1);
        held.infer(&zeros()).unwrap();

        drop(held);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_checkout_waits_when_exhausted() {
        let (pool, _) = make_pool(1);
        let held = pool.checkout().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(20), pool.checkout()).await;
        assert!(blocked.is_err());

        drop(held);
        let again = tokio::time::timeout(Duration::from_millis(200), pool.checkout()).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_the_pool() {
        let (pool, model) = make_pool(3);

        let mut handles = Vec::new();
        for _ in 0..12 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                let mut predictor = pool.checkout().await.unwrap();
                tokio::task::spawn_blocking(move || predictor.infer(&zeros()))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            let probs = handle.await.unwrap().unwrap();
            assert_eq!(probs.as_slice(), &[0.2, 0.5, 0.3]);
        }

        assert_eq!(model.call_count(), 12);
        assert_eq!(pool.available(), 3);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_checkout() {
        let (pool, _) = make_pool(1);
        pool.close();
        assert!(matches!(pool.checkout().await, Err(InferenceError::PoolClosed)));
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let bundle = synthetic_bundle(
            Arc::new(FixedOutputModel::new(vec![0.2, 0.5, 0.3])),
            2,
            OutputKind::Probabilities,
        );
        assert!(matches!(
            PredictorPool::new(&bundle, 0),
            Err(InferenceError::InvalidPoolSize)
        ));
    }
}
