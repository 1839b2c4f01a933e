use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;

use crate::domain::nutrition::{Macros, Micros};
use crate::nutrition::IngredientNutrition;

/// A catalog hit: stable id plus nutrition per 100 g.
#[derive(Debug, Clone)]
pub struct CatalogFood {
    pub fdc_id: String,
    pub description: String,
    pub per_100g: IngredientNutrition,
}

/// External nutrition catalog keyed by a stable food id (USDA FDC style).
#[async_trait]
pub trait FoodCatalog: Send + Sync {
    /// Per-100g nutrition for a known catalog id.
    async fn fetch_by_id(&self, fdc_id: &str) -> anyhow::Result<Option<IngredientNutrition>>;

    /// Best-match search by free-text name.
    async fn search(&self, name: &str) -> anyhow::Result<Option<CatalogFood>>;
}

/// USDA FoodData Central client.
#[derive(Clone)]
pub struct UsdaClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl UsdaClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.nal.usda.gov/fdc/v1".to_string()),
        }
    }
}

// Nutrient numbers used by FDC: 208 energy kcal, 203 protein, 205 carbs,
// 204 fat, 291 fiber, 307 sodium, 269 sugars.
fn per_100g_from_nutrients(nutrients: &[Value]) -> IngredientNutrition {
    let mut out = IngredientNutrition::default();
    let mut micros = Micros::default();
    for n in nutrients {
        let number = n
            .get("nutrientNumber")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| {
                n.get("nutrient")
                    .and_then(|inner| inner.get("number"))
                    .and_then(Value::as_str)
                    .map(String::from)
            });
        let value = n
            .get("value")
            .and_then(Value::as_f64)
            .or_else(|| n.get("amount").and_then(Value::as_f64));
        let (Some(number), Some(value)) = (number, value) else { continue };
        match number.as_str() {
            "208" => out.calories = value,
            "203" => out.macros.protein_g = value,
            "205" => out.macros.carbs_g = value,
            "204" => out.macros.fat_g = value,
            "291" => out.macros.fiber_g = Some(value),
            "307" => micros.sodium_mg = Some(value),
            "269" => micros.sugar_g = Some(value),
            _ => {}
        }
    }
    if !micros.is_empty() {
        out.micros = Some(micros);
    }
    out
}

fn word_overlap(a: &str, b: &str) -> f64 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let a_words: Vec<&str> = a_lower.split_whitespace().collect();
    let b_words: Vec<&str> = b_lower.split_whitespace().collect();
    if a_words.is_empty() || b_words.is_empty() {
        return 0.0;
    }
    let matches = a_words.iter().filter(|w| b_words.contains(w)).count();
    matches as f64 / a_words.len().max(b_words.len()) as f64
}

#[async_trait]
impl FoodCatalog for UsdaClient {
    async fn fetch_by_id(&self, fdc_id: &str) -> anyhow::Result<Option<IngredientNutrition>> {
        let response = self
            .client
            .get(format!("{}/food/{}", self.base_url, fdc_id))
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .context("usda food request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("usda returned {}", response.status());
        }

        let data: Value = response.json().await.context("usda food response not JSON")?;
        let Some(nutrients) = data.get("foodNutrients").and_then(Value::as_array) else {
            return Ok(None);
        };
        Ok(Some(per_100g_from_nutrients(nutrients)))
    }

    async fn search(&self, name: &str) -> anyhow::Result<Option<CatalogFood>> {
        let response = self
            .client
            .get(format!("{}/foods/search", self.base_url))
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("query", name),
                ("dataType", "Foundation,SR Legacy,Survey (FNDDS)"),
                ("pageSize", "10"),
            ])
            .send()
            .await
            .context("usda search request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("usda search returned {}", response.status());
        }

        let data: Value = response.json().await.context("usda search response not JSON")?;
        let Some(foods) = data.get("foods").and_then(Value::as_array) else {
            return Ok(None);
        };

        let mut best: Option<(f64, &Value)> = None;
        for food in foods {
            let Some(description) = food.get("description").and_then(Value::as_str) else {
                continue;
            };
            let score = word_overlap(description, name);
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, food));
            }
        }

        Ok(best.map(|(_, food)| {
            let nutrients = food
                .get("foodNutrients")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            CatalogFood {
                fdc_id: food
                    .get("fdcId")
                    .map(|v| v.to_string().trim_matches('"').to_string())
                    .unwrap_or_default(),
                description: food
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                per_100g: per_100g_from_nutrients(nutrients),
            }
        }))
    }
}
