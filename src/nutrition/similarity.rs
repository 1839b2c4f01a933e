use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::domain::nutrition::Macros;
use crate::nutrition::IngredientNutrition;

/// Semantic/approximate nutrition lookup: free-text name plus portion in,
/// scaled nutrition out. `None` means no sufficiently close match.
#[async_trait]
pub trait SimilarityLookup: Send + Sync {
    async fn lookup(
        &self,
        name: &str,
        quantity: f64,
        unit: &str,
    ) -> anyhow::Result<Option<IngredientNutrition>>;
}

#[derive(Debug, Deserialize)]
struct SimilarityHit {
    calories: f64,
    #[serde(default)]
    protein_g: f64,
    #[serde(default)]
    carbs_g: f64,
    #[serde(default)]
    fat_g: f64,
    #[serde(default)]
    fiber_g: Option<f64>,
    #[serde(default)]
    score: f64,
}

/// Client for the vector-search nutrition service.
#[derive(Clone)]
pub struct SimilaritySearchClient {
    client: reqwest::Client,
    base_url: String,
    min_score: f64,
}

impl SimilaritySearchClient {
    pub fn new(base_url: String, min_score: f64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            min_score,
        }
    }
}

#[async_trait]
impl SimilarityLookup for SimilaritySearchClient {
    async fn lookup(
        &self,
        name: &str,
        quantity: f64,
        unit: &str,
    ) -> anyhow::Result<Option<IngredientNutrition>> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&json!({"name": name, "quantity": quantity, "unit": unit}))
            .send()
            .await
            .context("similarity search request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("similarity service returned {}", response.status());
        }

        let hit: Option<SimilarityHit> = response
            .json()
            .await
            .context("similarity response not JSON")?;

        Ok(hit.filter(|h| h.score >= self.min_score).map(|h| {
            IngredientNutrition {
                calories: h.calories,
                macros: Macros {
                    protein_g: h.protein_g,
                    carbs_g: h.carbs_g,
                    fat_g: h.fat_g,
                    fiber_g: h.fiber_g,
                },
                micros: None,
            }
        }))
    }
}
