//! The train-and-deploy workflow core.
//!
//! A linear five-stage procedure, each stage gated on the full completion of
//! its predecessor:
//! 1. Provision a managed tabular dataset from a BigQuery source
//! 2. Train a classification model via AutoML
//! 3. Resolve the serving endpoint by display name, creating it if absent
//! 4. Deploy the trained model with full traffic
//! 5. Assemble the run report
//!
//! Endpoint resolution is the only idempotent step; datasets, training jobs,
//! models and deployments are created fresh on every run. Any remote failure
//! aborts the run immediately with no rollback of already-created resources.

use std::time::Instant;

use aiplatform::{DeploySpec, Platform, TrainingSpec};
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

/// Machine type every deployment runs on.
const MACHINE_TYPE: &str = "n1-standard-2";

/// Replica bounds for every deployment.
const MIN_REPLICA_COUNT: u32 = 1;
const MAX_REPLICA_COUNT: u32 = 2;

/// Share of endpoint traffic routed to the new deployment. At 100 the
/// platform demotes prior deployments on the endpoint to 0%.
const TRAFFIC_PERCENTAGE: u8 = 100;

/// Parameters for a single workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowParams {
    /// BigQuery URI of the training data, e.g. `bq://project.dataset.table`.
    pub bq_uri: String,
    /// Column of the source table holding the label.
    pub target_column: String,
    /// Display name for the trained model.
    pub model_display_name: String,
    /// Display name of the serving endpoint to resolve or create.
    pub endpoint_display_name: String,
    /// Training budget in node-hours. Converted to milli-node-hours by
    /// truncation, so sub-millihour precision is lost.
    pub training_budget_hours: f64,
}

impl Default for WorkflowParams {
    fn default() -> Self {
        Self {
            bq_uri: String::from("bq://my-project.my_dataset.my_table"),
            target_column: String::from("label"),
            model_display_name: String::from("automl-model-demo"),
            endpoint_display_name: String::from("demo-endpoint"),
            training_budget_hours: 1.0,
        }
    }
}

/// The workflow's sole externally observable return value.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunReport {
    /// Resource name of the provisioned dataset.
    pub dataset: String,
    /// Resource name of the trained model.
    pub model: String,
    /// Resource name of the serving endpoint.
    pub endpoint: String,
    /// Identifier of the deployed model, when the platform surfaced one.
    pub deployed_model_id: Option<String>,
}

impl RunReport {
    /// Serializes the report to its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize run report")
    }
}

/// Runs the full train-and-deploy workflow.
///
/// Every remote call blocks until the underlying operation reaches a
/// terminal state; stages never overlap.
///
/// # Errors
///
/// Returns an error on the first failed remote call. Resources created by
/// earlier stages are left in place.
pub async fn run(platform: &dyn Platform, params: &WorkflowParams) -> Result<RunReport> {
    let workflow_start = Instant::now();
    info!(
        bq_uri = %params.bq_uri,
        target_column = %params.target_column,
        model_display_name = %params.model_display_name,
        endpoint_display_name = %params.endpoint_display_name,
        training_budget_hours = params.training_budget_hours,
        "Starting train-and-deploy workflow"
    );

    // Step 1: Provision the dataset (fresh every run, never reused)
    let step1_start = Instant::now();
    info!("Step 1: Provisioning tabular dataset...");
    let dataset_name = unique_display_name("ds-from-bq");
    let dataset = platform
        .create_tabular_dataset(&dataset_name, &params.bq_uri)
        .await
        .context("Dataset provisioning failed")?;
    info!(
        dataset = %dataset.resource_name,
        duration_ms = step1_start.elapsed().as_millis(),
        "Step 1 complete"
    );

    // Step 2: Train the model
    let step2_start = Instant::now();
    info!("Step 2: Training classification model...");
    let budget = budget_milli_node_hours(params.training_budget_hours);
    if budget == 0 {
        warn!(
            training_budget_hours = params.training_budget_hours,
            "Training budget truncates to zero milli-node-hours"
        );
    }
    let training_spec = TrainingSpec {
        display_name: unique_display_name("automl-train"),
        dataset: dataset.resource_name.clone(),
        target_column: params.target_column.clone(),
        model_display_name: params.model_display_name.clone(),
        budget_milli_node_hours: budget,
        disable_early_stopping: true,
    };
    let model = platform
        .run_automl_training(&training_spec)
        .await
        .context("Model training failed")?;
    info!(
        model = %model.resource_name,
        duration_ms = step2_start.elapsed().as_millis(),
        "Step 2 complete"
    );

    // Step 3: Resolve the endpoint (the one idempotent step)
    let step3_start = Instant::now();
    info!("Step 3: Resolving serving endpoint...");
    let endpoint = resolve_endpoint(platform, &params.endpoint_display_name)
        .await
        .context("Endpoint resolution failed")?;
    info!(
        endpoint = %endpoint.resource_name,
        duration_ms = step3_start.elapsed().as_millis(),
        "Step 3 complete"
    );

    // Step 4: Deploy the model
    let step4_start = Instant::now();
    info!("Step 4: Deploying model to endpoint...");
    let deploy_spec = DeploySpec {
        model: model.resource_name.clone(),
        endpoint: endpoint.resource_name.clone(),
        deployed_model_display_name: format!("{}-deployed", params.model_display_name),
        traffic_percentage: TRAFFIC_PERCENTAGE,
        machine_type: MACHINE_TYPE.to_string(),
        min_replica_count: MIN_REPLICA_COUNT,
        max_replica_count: MAX_REPLICA_COUNT,
    };
    let deployment = platform
        .deploy_model(&deploy_spec)
        .await
        .context("Model deployment failed")?;
    info!(
        deployed_model_id = deployment.deployed_model_id.as_deref(),
        duration_ms = step4_start.elapsed().as_millis(),
        "Step 4 complete"
    );

    // Step 5: Assemble the report
    let report = RunReport {
        dataset: dataset.resource_name,
        model: model.resource_name,
        endpoint: endpoint.resource_name,
        deployed_model_id: deployment.deployed_model_id,
    };

    info!(
        total_duration_ms = workflow_start.elapsed().as_millis(),
        "=== Train-and-deploy workflow completed successfully ==="
    );

    Ok(report)
}

/// Resolves an endpoint by display name, creating one only if none exists.
///
/// On multiple matches the first in service list order wins; the service
/// applies no secondary sort, so selection among duplicates is
/// non-deterministic.
async fn resolve_endpoint(
    platform: &dyn Platform,
    display_name: &str,
) -> Result<aiplatform::EndpointHandle> {
    let endpoints = platform.list_endpoints(display_name).await?;

    if let Some(existing) = endpoints.first() {
        if endpoints.len() > 1 {
            warn!(
                display_name,
                matches = endpoints.len(),
                "Multiple endpoints share this display name, using the first"
            );
        }
        info!(endpoint = %existing.resource_name, "Reusing existing endpoint");
        return Ok(existing.clone());
    }

    info!(display_name, "No existing endpoint, creating one");
    platform.create_endpoint(display_name).await
}

/// Converts a budget in node-hours to the platform's native
/// milli-node-hours, truncating toward zero. `1.0` becomes `1000`,
/// `0.0015` becomes `1`.
#[must_use]
pub fn budget_milli_node_hours(hours: f64) -> i64 {
    (hours * 1000.0) as i64
}

/// Generates a display name unlikely to collide across runs: a fixed
/// prefix, the unix timestamp, and a random token. The token closes the
/// race window a bare second-granularity timestamp would leave between
/// concurrent runs.
#[must_use]
pub fn unique_display_name(prefix: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{timestamp}-{}", &token[..8])
}
