pub mod catalog;
pub mod service;
pub mod similarity;

use serde::{Deserialize, Serialize};

use crate::domain::nutrition::{Macros, Micros};

/// Nutrition values for one ingredient at a concrete quantity (or per 100 g,
/// where a source documents it as such).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IngredientNutrition {
    pub calories: f64,
    pub macros: Macros,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub micros: Option<Micros>,
}

impl IngredientNutrition {
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            calories: self.calories * factor,
            macros: self.macros.scale(factor),
            micros: self.micros.as_ref().map(|m| Micros {
                sodium_mg: m.sodium_mg.map(|v| v * factor),
                sugar_g: m.sugar_g.map(|v| v * factor),
                calcium_mg: m.calcium_mg.map(|v| v * factor),
                iron_mg: m.iron_mg.map(|v| v * factor),
                potassium_mg: m.potassium_mg.map(|v| v * factor),
                vitamin_c_mg: m.vitamin_c_mg.map(|v| v * factor),
            }),
        }
    }
}
