//! REST client for the Vertex AI v1 API.

use core::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::context::SessionContext;
use crate::platform::Platform;
use crate::resources::{DatasetHandle, DeploySpec, Deployment, EndpointHandle, ModelHandle, TrainingSpec};

/// Schema URI identifying a managed tabular dataset.
const TABULAR_METADATA_SCHEMA_URI: &str =
    "gs://google-cloud-aiplatform/schema/dataset/metadata/tabular_1.0.0.yaml";

/// Training task definition for AutoML on tabular data.
const AUTOML_TABULAR_TASK_DEFINITION: &str =
    "gs://google-cloud-aiplatform/schema/trainingjob/definition/automl_tabular_1.0.0.yaml";

/// How long to wait between polls of a long-running operation.
const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Client for the managed ML platform, bound to one session context.
pub struct VertexClient {
    client: Client,
    ctx: SessionContext,
    access_token: String,
    api_base: String,
}

impl VertexClient {
    /// Creates a client for the given session.
    ///
    /// `api_endpoint` overrides the default regional endpoint when set.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        ctx: SessionContext,
        access_token: &str,
        api_endpoint: Option<&str>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = api_endpoint
            .map_or_else(|| ctx.default_api_endpoint(), ToString::to_string);
        let api_base = format!("{}/v1", endpoint.trim_end_matches('/'));

        Ok(Self {
            client,
            ctx,
            access_token: access_token.to_string(),
            api_base,
        })
    }

    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Issues a POST and decodes the JSON response, surfacing non-2xx
    /// statuses as errors with the response body attached.
    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API request failed with status {status}: {body}");
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {url}"))
    }

    /// Issues a GET and decodes the JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API request failed with status {status}: {body}");
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {url}"))
    }

    /// Polls a long-running operation until it reaches a terminal state and
    /// returns its response payload.
    async fn await_operation(&self, operation: Operation) -> Result<Value> {
        let name = operation.name.clone();
        let mut current = operation;

        loop {
            if current.done {
                if let Some(error) = current.error {
                    anyhow::bail!(
                        "Operation {name} failed with code {}: {}",
                        error.code,
                        error.message
                    );
                }

                return current
                    .response
                    .with_context(|| format!("Operation {name} finished without a response"));
            }

            info!(operation = %name, "Waiting for operation to complete");
            tokio::time::sleep(POLL_INTERVAL).await;

            let url = format!("{}/{name}", self.api_base);
            current = self.get_json(&url).await?;
        }
    }

    /// Polls a training pipeline until it reaches a terminal state and
    /// returns the uploaded model's resource name.
    async fn await_training_pipeline(&self, pipeline_name: &str) -> Result<ModelHandle> {
        let url = format!("{}/{pipeline_name}", self.api_base);

        loop {
            let pipeline: TrainingPipelineResponse = self.get_json(&url).await?;

            match pipeline.state.as_str() {
                "PIPELINE_STATE_SUCCEEDED" => {
                    let model = pipeline
                        .model_to_upload
                        .with_context(|| {
                            format!("Training pipeline {pipeline_name} succeeded without a model")
                        })?;

                    return Ok(ModelHandle {
                        resource_name: model.name.context("Trained model has no resource name")?,
                        display_name: model.display_name.unwrap_or_default(),
                    });
                }
                "PIPELINE_STATE_FAILED" | "PIPELINE_STATE_CANCELLED" => {
                    let detail = pipeline
                        .error
                        .map_or_else(String::new, |e| format!(": {}", e.message));
                    anyhow::bail!(
                        "Training pipeline {pipeline_name} ended in state {}{detail}",
                        pipeline.state
                    );
                }
                state => {
                    info!(pipeline = %pipeline_name, state, "Training in progress");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }
}

#[async_trait]
impl Platform for VertexClient {
    async fn create_tabular_dataset(
        &self,
        display_name: &str,
        bq_source: &str,
    ) -> Result<DatasetHandle> {
        info!(
            display_name,
            bq_source,
            parent = %self.ctx.parent(),
            "Creating tabular dataset"
        );

        let url = format!("{}/{}/datasets", self.api_base, self.ctx.parent());
        let body = CreateDatasetRequest {
            display_name,
            metadata_schema_uri: TABULAR_METADATA_SCHEMA_URI,
            metadata: DatasetMetadata {
                input_config: InputConfig {
                    bigquery_source: BigQuerySource { uri: bq_source },
                },
            },
        };

        let operation: Operation = self.post_json(&url, &body).await?;
        let response = self.await_operation(operation).await?;

        let resource_name = response
            .get("name")
            .and_then(Value::as_str)
            .context("Dataset create response has no resource name")?
            .to_string();

        info!(dataset = %resource_name, "Dataset ready");

        Ok(DatasetHandle {
            resource_name,
            display_name: display_name.to_string(),
        })
    }

    async fn run_automl_training(&self, spec: &TrainingSpec) -> Result<ModelHandle> {
        info!(
            display_name = %spec.display_name,
            dataset = %spec.dataset,
            target_column = %spec.target_column,
            budget_milli_node_hours = spec.budget_milli_node_hours,
            "Launching AutoML training pipeline"
        );

        let dataset_id = spec
            .dataset
            .rsplit('/')
            .next()
            .context("Dataset resource name is empty")?;

        let url = format!("{}/{}/trainingPipelines", self.api_base, self.ctx.parent());
        let body = CreateTrainingPipelineRequest {
            display_name: &spec.display_name,
            training_task_definition: AUTOML_TABULAR_TASK_DEFINITION,
            training_task_inputs: TrainingTaskInputs {
                target_column: &spec.target_column,
                prediction_type: "classification",
                optimization_objective: "maximize-au-roc",
                train_budget_milli_node_hours: spec.budget_milli_node_hours,
                disable_early_stopping: spec.disable_early_stopping,
            },
            input_data_config: InputDataConfig { dataset_id },
            model_to_upload: ModelToUpload {
                display_name: &spec.model_display_name,
            },
        };

        let pipeline: TrainingPipelineResponse = self.post_json(&url, &body).await?;
        let pipeline_name = pipeline
            .name
            .context("Training pipeline create response has no name")?;

        let model = self.await_training_pipeline(&pipeline_name).await?;
        info!(model = %model.resource_name, "Training completed");

        Ok(model)
    }

    async fn list_endpoints(&self, display_name: &str) -> Result<Vec<EndpointHandle>> {
        let url = format!(
            "{}/{}/endpoints?filter=display_name%3D%22{display_name}%22",
            self.api_base,
            self.ctx.parent()
        );

        let response: ListEndpointsResponse = self.get_json(&url).await?;
        let endpoints: Vec<EndpointHandle> = response
            .endpoints
            .into_iter()
            .map(|e| EndpointHandle {
                resource_name: e.name,
                display_name: e.display_name,
            })
            .collect();

        info!(
            display_name,
            matches = endpoints.len(),
            "Listed endpoints"
        );

        Ok(endpoints)
    }

    async fn create_endpoint(&self, display_name: &str) -> Result<EndpointHandle> {
        info!(display_name, "Creating endpoint");

        let url = format!("{}/{}/endpoints", self.api_base, self.ctx.parent());
        let body = CreateEndpointRequest { display_name };

        let operation: Operation = self.post_json(&url, &body).await?;
        let response = self.await_operation(operation).await?;

        let resource_name = response
            .get("name")
            .and_then(Value::as_str)
            .context("Endpoint create response has no resource name")?
            .to_string();

        info!(endpoint = %resource_name, "Endpoint ready");

        Ok(EndpointHandle {
            resource_name,
            display_name: display_name.to_string(),
        })
    }

    async fn deploy_model(&self, spec: &DeploySpec) -> Result<Deployment> {
        info!(
            model = %spec.model,
            endpoint = %spec.endpoint,
            machine_type = %spec.machine_type,
            traffic_percentage = spec.traffic_percentage,
            "Deploying model to endpoint"
        );

        let url = format!("{}/{}:deployModel", self.api_base, spec.endpoint);
        let body = DeployModelRequest {
            deployed_model: DeployedModel {
                model: &spec.model,
                display_name: &spec.deployed_model_display_name,
                dedicated_resources: DedicatedResources {
                    machine_spec: MachineSpec {
                        machine_type: &spec.machine_type,
                    },
                    min_replica_count: spec.min_replica_count,
                    max_replica_count: spec.max_replica_count,
                },
            },
            // "0" routes the given share to the model deployed by this call.
            traffic_split: TrafficSplit {
                new_model: u32::from(spec.traffic_percentage),
            },
        };

        let operation: Operation = self.post_json(&url, &body).await?;
        let response = self.await_operation(operation).await?;

        // The id is not always present in the operation response; tolerate
        // its absence rather than failing a deployment that is already live.
        let deployed_model_id = response
            .get("deployedModel")
            .and_then(|m| m.get("id"))
            .and_then(Value::as_str)
            .map(ToString::to_string);

        if deployed_model_id.is_none() {
            warn!(endpoint = %spec.endpoint, "Deploy response carried no deployed-model id");
        }

        info!(endpoint = %spec.endpoint, "Model deployed and serving");

        Ok(Deployment { deployed_model_id })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDatasetRequest<'a> {
    display_name: &'a str,
    metadata_schema_uri: &'a str,
    metadata: DatasetMetadata<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetMetadata<'a> {
    input_config: InputConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputConfig<'a> {
    bigquery_source: BigQuerySource<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BigQuerySource<'a> {
    uri: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTrainingPipelineRequest<'a> {
    display_name: &'a str,
    training_task_definition: &'a str,
    training_task_inputs: TrainingTaskInputs<'a>,
    input_data_config: InputDataConfig<'a>,
    model_to_upload: ModelToUpload<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrainingTaskInputs<'a> {
    target_column: &'a str,
    prediction_type: &'a str,
    optimization_objective: &'a str,
    train_budget_milli_node_hours: i64,
    disable_early_stopping: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputDataConfig<'a> {
    dataset_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelToUpload<'a> {
    display_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateEndpointRequest<'a> {
    display_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeployModelRequest<'a> {
    deployed_model: DeployedModel<'a>,
    traffic_split: TrafficSplit,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeployedModel<'a> {
    model: &'a str,
    display_name: &'a str,
    dedicated_resources: DedicatedResources<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DedicatedResources<'a> {
    machine_spec: MachineSpec<'a>,
    min_replica_count: u32,
    max_replica_count: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MachineSpec<'a> {
    machine_type: &'a str,
}

#[derive(Serialize)]
struct TrafficSplit {
    #[serde(rename = "0")]
    new_model: u32,
}

#[derive(Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<Value>,
}

#[derive(Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrainingPipelineResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    model_to_upload: Option<UploadedModel>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedModel {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEndpointsResponse {
    #[serde(default)]
    endpoints: Vec<EndpointResource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointResource {
    name: String,
    #[serde(default)]
    display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_request_serializes_to_camel_case() {
        let body = CreateTrainingPipelineRequest {
            display_name: "automl-train-1",
            training_task_definition: AUTOML_TABULAR_TASK_DEFINITION,
            training_task_inputs: TrainingTaskInputs {
                target_column: "label",
                prediction_type: "classification",
                optimization_objective: "maximize-au-roc",
                train_budget_milli_node_hours: 1000,
                disable_early_stopping: true,
            },
            input_data_config: InputDataConfig { dataset_id: "42" },
            model_to_upload: ModelToUpload {
                display_name: "automl-model-demo",
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json["trainingTaskInputs"]["trainBudgetMilliNodeHours"],
            1000
        );
        assert_eq!(json["trainingTaskInputs"]["targetColumn"], "label");
        assert_eq!(json["inputDataConfig"]["datasetId"], "42");
        assert_eq!(json["modelToUpload"]["displayName"], "automl-model-demo");
    }

    #[test]
    fn test_traffic_split_routes_full_traffic_to_new_model() {
        let body = DeployModelRequest {
            deployed_model: DeployedModel {
                model: "projects/p/locations/r/models/1",
                display_name: "m-deployed",
                dedicated_resources: DedicatedResources {
                    machine_spec: MachineSpec {
                        machine_type: "n1-standard-2",
                    },
                    min_replica_count: 1,
                    max_replica_count: 2,
                },
            },
            traffic_split: TrafficSplit { new_model: 100 },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["trafficSplit"]["0"], 100);
        assert_eq!(
            json["deployedModel"]["dedicatedResources"]["minReplicaCount"],
            1
        );
        assert_eq!(
            json["deployedModel"]["dedicatedResources"]["maxReplicaCount"],
            2
        );
    }

    #[test]
    fn test_operation_deserializes_with_defaults() {
        let op: Operation = serde_json::from_str(r#"{"name": "projects/p/operations/1"}"#).unwrap();
        assert_eq!(op.name, "projects/p/operations/1");
        assert!(!op.done);
        assert!(op.error.is_none());
        assert!(op.response.is_none());
    }
}
