//! The platform capability seam consumed by the workflow core.

use anyhow::Result;
use async_trait::async_trait;

use crate::resources::{DatasetHandle, DeploySpec, Deployment, EndpointHandle, ModelHandle, TrainingSpec};

/// The four managed-ML-platform capabilities the workflow depends on.
///
/// Every method is blocking in the workflow sense: it resolves only once the
/// remote operation has reached a terminal state. Implementations own any
/// long-running-operation polling; none of it leaks through this interface.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Creates a managed tabular dataset from a BigQuery source URI and
    /// waits until it is fully materialized.
    async fn create_tabular_dataset(
        &self,
        display_name: &str,
        bq_source: &str,
    ) -> Result<DatasetHandle>;

    /// Runs an AutoML classification training job and waits until a trained
    /// model exists or the job fails.
    async fn run_automl_training(&self, spec: &TrainingSpec) -> Result<ModelHandle>;

    /// Lists endpoints whose display name exactly equals `display_name`,
    /// in service-defined order.
    async fn list_endpoints(&self, display_name: &str) -> Result<Vec<EndpointHandle>>;

    /// Creates a serving endpoint and waits until it exists.
    async fn create_endpoint(&self, display_name: &str) -> Result<EndpointHandle>;

    /// Deploys a model to an endpoint and waits until it is live and
    /// serving.
    async fn deploy_model(&self, spec: &DeploySpec) -> Result<Deployment>;
}
