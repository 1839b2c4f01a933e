use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// JSON shape every meal-analysis prompt demands from the model. The parser in
/// this module tree depends on exactly these keys; keep them in sync.
const RESPONSE_CONTRACT: &str = r#"Respond with ONLY a JSON object, no prose, in exactly this shape:
{
  "dish_name": "string",
  "foods": [
    {
      "name": "string",
      "quantity": number,
      "unit": "string",
      "calories": number,
      "macros": {"protein": number, "carbs": number, "fat": number, "fiber": number}
    }
  ],
  "total_calories": number,
  "confidence": number between 0 and 1
}"#;

const IDENTIFICATION_CONTRACT: &str = r#"Respond with ONLY a JSON object, no prose, in exactly this shape:
{
  "name": "string",
  "category": "string",
  "confidence": number between 0 and 1
}"#;

/// Partial knowledge about an ingredient supplied by the caller for the
/// ingredient-aware strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownIngredient {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
}

/// Prompt-construction policy for a vision call. A closed set: dispatch is a
/// plain match, so every prompt the system can emit is auditable here.
#[derive(Debug, Clone)]
pub enum AnalysisStrategy {
    Basic,
    PortionAware { size: f64, unit: String },
    IngredientAware { ingredients: Vec<KnownIngredient> },
    WeightAware { grams: f64 },
    UserContextAware { description: String },
    IngredientIdentification,
}

impl AnalysisStrategy {
    pub fn portion_aware(size: f64, unit: impl Into<String>) -> CoreResult<Self> {
        if size <= 0.0 {
            return Err(CoreError::validation("portion size must be > 0"));
        }
        Ok(Self::PortionAware { size, unit: unit.into() })
    }

    pub fn ingredient_aware(ingredients: Vec<KnownIngredient>) -> CoreResult<Self> {
        if ingredients.is_empty() {
            return Err(CoreError::validation("ingredient list must be non-empty"));
        }
        Ok(Self::IngredientAware { ingredients })
    }

    pub fn weight_aware(grams: f64) -> CoreResult<Self> {
        if grams <= 0.0 {
            return Err(CoreError::validation("total weight must be > 0 grams"));
        }
        Ok(Self::WeightAware { grams })
    }

    pub fn user_context_aware(description: impl Into<String>) -> CoreResult<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(CoreError::validation("user context must be non-empty"));
        }
        Ok(Self::UserContextAware { description })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::PortionAware { .. } => "portion_aware",
            Self::IngredientAware { .. } => "ingredient_aware",
            Self::WeightAware { .. } => "weight_aware",
            Self::UserContextAware { .. } => "user_context_aware",
            Self::IngredientIdentification => "ingredient_identification",
        }
    }

    /// System instructions for the vision model.
    pub fn analysis_prompt(&self) -> String {
        match self {
            Self::IngredientIdentification => format!(
                "You are a food recognition assistant. Identify the single ingredient \
                 shown in the photo: its common name, its category (vegetable, fruit, \
                 meat, dairy, grain, spice, other) and how confident you are.\n\n{IDENTIFICATION_CONTRACT}"
            ),
            _ => format!(
                "You are a nutrition analysis assistant. Examine the food photo, \
                 identify the dish and every visible ingredient, and estimate quantity, \
                 calories and macronutrients per ingredient as realistically as \
                 possible.\n\n{RESPONSE_CONTRACT}"
            ),
        }
    }

    /// Task framing plus any numeric context, sent as the user turn.
    pub fn user_message(&self) -> String {
        match self {
            Self::Basic => "Analyze this meal photo and estimate its nutrition.".to_string(),
            Self::PortionAware { size, unit } => format!(
                "Analyze this meal photo. The actual portion is {size} {unit}; scale all \
                 quantity, calorie and macro estimates to that portion."
            ),
            Self::IngredientAware { ingredients } => {
                let mut msg = String::from(
                    "Analyze this meal photo. The following ingredients are known to be \
                     present; use them to improve confidence and keep estimates consistent \
                     with the data given:\n",
                );
                for ing in ingredients {
                    msg.push_str(&format!("- {}", ing.name));
                    if let (Some(q), Some(u)) = (ing.quantity, ing.unit.as_deref()) {
                        msg.push_str(&format!(", {q} {u}"));
                    }
                    if let Some(c) = ing.calories {
                        msg.push_str(&format!(", {c} kcal"));
                    }
                    msg.push('\n');
                }
                msg
            }
            Self::WeightAware { grams } => format!(
                "Analyze this meal photo. The total weight of the food is exactly \
                 {grams} grams; the quantities of all ingredients combined must add up \
                 to that weight, and calories/macros must match it."
            ),
            Self::UserContextAware { description } => format!(
                "Analyze this meal photo. The user says: \"{description}\".\n\
                 If the user's notes conflict with what is visible, trust the photo for \
                 what the dish IS, and trust the user for modifications, hidden \
                 ingredients and preparation method."
            ),
            Self::IngredientIdentification => {
                "Identify the ingredient in this photo.".to_string()
            }
        }
    }
}
