//! AutoML train-and-deploy CLI.
//!
//! Provisions a tabular dataset from BigQuery, trains a classification
//! model via AutoML, and deploys it to a serving endpoint.

use aiplatform::{SessionContext, VertexClient};
use anyhow::Result;
use clap::Parser;
use config::Config;
use tracing_subscriber::EnvFilter;
use train_deploy::workflow::{self, WorkflowParams};

/// AutoML train-and-deploy workflow
#[derive(Parser)]
#[command(name = "train-deploy")]
#[command(about = "Train an AutoML classification model and deploy it to an endpoint")]
#[command(version)]
struct Cli {
    /// Cloud project id
    #[arg(long)]
    project: String,

    /// Region hosting the dataset, training job and endpoint
    #[arg(long, default_value = "us-central1")]
    region: String,

    /// Staging bucket for training artifacts (gs:// URI)
    #[arg(long)]
    staging_bucket: String,

    /// BigQuery source table (bq:// URI)
    #[arg(long)]
    bq_uri: String,

    /// Label column of the source table
    #[arg(long, default_value = "label")]
    target_column: String,

    /// Display name for the trained model
    #[arg(long, default_value = "automl-model-demo")]
    model_name: String,

    /// Display name of the serving endpoint to resolve or create
    #[arg(long, default_value = "demo-endpoint")]
    endpoint_name: String,

    /// Training budget in node-hours
    #[arg(long, default_value = "1.0")]
    budget_hours: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    let ctx = SessionContext::new(&cli.project, &cli.region, &cli.staging_bucket)?;
    let client = VertexClient::new(ctx, &config.access_token, config.api_endpoint.as_deref())?;

    let params = WorkflowParams {
        bq_uri: cli.bq_uri,
        target_column: cli.target_column,
        model_display_name: cli.model_name,
        endpoint_display_name: cli.endpoint_name,
        training_budget_hours: cli.budget_hours,
    };

    let report = workflow::run(&client, &params).await?;
    println!("{}", report.to_json()?);

    Ok(())
}
