//! LocalAI readiness: the OpenAI-compatible model listing.

use serde::Deserialize;

/// Lists the models LocalAI has loaded from its config file.
pub const MODELS_PATH: &str = "/v1/models";

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    #[serde(default)]
    id: String,
}

/// Model ids from a `/v1/models` response body.
///
/// # Errors
///
/// Returns an error if the body is not JSON.
pub fn listed_models(body: &str) -> Result<Vec<String>, serde_json::Error> {
    let list: ModelList = serde_json::from_str(body)?;
    Ok(list
        .data
        .into_iter()
        .map(|m| m.id)
        .filter(|id| !id.is_empty())
        .collect())
}
