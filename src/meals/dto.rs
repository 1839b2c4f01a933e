use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::analysis::strategy::KnownIngredient;
use crate::domain::meal::{Meal, MealStatus};
use crate::domain::nutrition::Nutrition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Add,
    Update,
    Remove,
}

/// Custom nutrition data supplied by the user, normalized per 100 g.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CustomNutrition {
    pub calories_per_100g: f64,
    #[serde(default)]
    pub protein_per_100g: f64,
    #[serde(default)]
    pub carbs_per_100g: f64,
    #[serde(default)]
    pub fat_per_100g: f64,
    #[serde(default)]
    pub fiber_per_100g: Option<f64>,
}

/// One requested change to a meal's ingredient list. Transient: consumed once
/// by the edit engine, never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct FoodItemChange {
    pub action: ChangeAction,
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub fdc_id: Option<String>,
    #[serde(default)]
    pub custom_nutrition: Option<CustomNutrition>,
}

#[derive(Debug, Deserialize)]
pub struct EditMealRequest {
    pub changes: Vec<FoodItemChange>,
}

/// Extra context for an explicit re-analysis; exactly one variant per request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReanalyzeRequest {
    Portion { size: f64, unit: String },
    Ingredients { ingredients: Vec<KnownIngredient> },
    Weight { grams: f64 },
    Description { text: String },
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct DailySummaryQuery {
    pub date: Date,
}

#[derive(Debug, Serialize)]
pub struct MealResponse {
    pub id: Uuid,
    pub status: MealStatus,
    pub dish_name: Option<String>,
    pub nutrition: Option<Nutrition>,
    pub error_message: Option<String>,
    pub edit_count: i32,
    pub is_manually_edited: bool,
    pub image_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub ready_at: Option<OffsetDateTime>,
}

impl From<Meal> for MealResponse {
    fn from(m: Meal) -> Self {
        Self {
            id: m.meal_id,
            status: m.status,
            dish_name: m.dish_name,
            nutrition: m.nutrition,
            error_message: m.error_message,
            edit_count: m.edit_count,
            is_manually_edited: m.is_manually_edited,
            image_url: m.image.url,
            created_at: m.created_at,
            ready_at: m.ready_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NutritionDelta {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

#[derive(Debug, Serialize)]
pub struct EditMealResponse {
    pub meal: MealResponse,
    pub delta: NutritionDelta,
    pub change_summary: Vec<String>,
    pub edit_count: i32,
}

#[derive(Debug, Serialize)]
pub struct DailySummaryResponse {
    pub date: Date,
    pub meal_count: usize,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}
