use anyhow::Context;

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// OAuth2 bearer token forwarded to the AI platform API.
    pub access_token: String,

    /// Override for the regional API endpoint, mainly for local testing
    /// against an emulator.
    pub api_endpoint: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `GCP_ACCESS_TOKEN`: bearer token for the AI platform API
    ///
    /// Optional environment variables:
    /// - `AIPLATFORM_API_ENDPOINT`: base URL override for the regional API
    ///   endpoint (default: `https://{region}-aiplatform.googleapis.com`)
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        let access_token = std::env::var("GCP_ACCESS_TOKEN")
            .context("GCP_ACCESS_TOKEN environment variable not set")?;

        let api_endpoint = std::env::var("AIPLATFORM_API_ENDPOINT").ok();

        Ok(Self {
            access_token,
            api_endpoint,
        })
    }
}
