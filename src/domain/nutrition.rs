use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Sanity ceiling for a single macro field, in grams.
const MAX_MACRO_G: f64 = 5000.0;
pub const MAX_ITEM_CALORIES: f64 = 10_000.0;
pub const MAX_MEAL_CALORIES: f64 = 20_000.0;
pub const MAX_FOOD_ITEMS: usize = 50;
pub const MAX_QUANTITY: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Macros {
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiber_g: Option<f64>,
}

impl Macros {
    pub fn new(protein_g: f64, carbs_g: f64, fat_g: f64, fiber_g: Option<f64>) -> CoreResult<Self> {
        for (field, value) in [("protein_g", protein_g), ("carbs_g", carbs_g), ("fat_g", fat_g)] {
            if !(0.0..=MAX_MACRO_G).contains(&value) {
                return Err(CoreError::validation(format!(
                    "{field} must be within 0..={MAX_MACRO_G}, got {value}"
                )));
            }
        }
        if let Some(f) = fiber_g {
            if !(0.0..=MAX_MACRO_G).contains(&f) {
                return Err(CoreError::validation(format!(
                    "fiber_g must be within 0..={MAX_MACRO_G}, got {f}"
                )));
            }
        }
        Ok(Self { protein_g, carbs_g, fat_g, fiber_g })
    }

    pub fn total_calories(&self) -> f64 {
        self.protein_g * 4.0 + self.carbs_g * 4.0 + self.fat_g * 9.0
    }

    pub fn add(&self, other: &Macros) -> Macros {
        Macros {
            protein_g: self.protein_g + other.protein_g,
            carbs_g: self.carbs_g + other.carbs_g,
            fat_g: self.fat_g + other.fat_g,
            fiber_g: match (self.fiber_g, other.fiber_g) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
            },
        }
    }

    pub fn scale(&self, factor: f64) -> Macros {
        Macros {
            protein_g: self.protein_g * factor,
            carbs_g: self.carbs_g * factor,
            fat_g: self.fat_g * factor,
            fiber_g: self.fiber_g.map(|f| f * factor),
        }
    }
}

/// Optional named micronutrients; field set mirrors what the vision model and the
/// catalog actually report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Micros {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sodium_mg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sugar_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calcium_mg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iron_mg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potassium_mg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitamin_c_mg: Option<f64>,
}

impl Micros {
    pub fn validate(&self) -> CoreResult<()> {
        let fields = [
            ("sodium_mg", self.sodium_mg),
            ("sugar_g", self.sugar_g),
            ("calcium_mg", self.calcium_mg),
            ("iron_mg", self.iron_mg),
            ("potassium_mg", self.potassium_mg),
            ("vitamin_c_mg", self.vitamin_c_mg),
        ];
        for (field, value) in fields {
            if let Some(v) = value {
                if v < 0.0 {
                    return Err(CoreError::validation(format!("{field} must be >= 0, got {v}")));
                }
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self == &Micros::default()
    }
}

/// One ingredient of a meal. Value semantics: mutation produces a new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub id: Uuid,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub calories: f64,
    pub macros: Macros,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub micros: Option<Micros>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fdc_id: Option<String>,
    #[serde(default)]
    pub is_custom: bool,
}

impl FoodItem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        quantity: f64,
        unit: impl Into<String>,
        calories: f64,
        macros: Macros,
        micros: Option<Micros>,
        confidence: f64,
        fdc_id: Option<String>,
        is_custom: bool,
    ) -> CoreResult<Self> {
        let name = name.into();
        let unit = unit.into();
        if name.trim().is_empty() || name.len() > 200 {
            return Err(CoreError::validation("food item name must be 1..=200 chars"));
        }
        if !(quantity > 0.0 && quantity <= MAX_QUANTITY) {
            return Err(CoreError::validation(format!(
                "quantity must be within (0, {MAX_QUANTITY}], got {quantity}"
            )));
        }
        if unit.is_empty() || unit.len() > 50 {
            return Err(CoreError::validation("unit must be 1..=50 chars"));
        }
        if !(0.0..=MAX_ITEM_CALORIES).contains(&calories) {
            return Err(CoreError::validation(format!(
                "calories must be within 0..={MAX_ITEM_CALORIES}, got {calories}"
            )));
        }
        if let Some(m) = &micros {
            m.validate()?;
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            quantity,
            unit,
            calories,
            macros,
            micros,
            confidence: confidence.clamp(0.0, 1.0),
            fdc_id,
            is_custom,
        })
    }

    /// Same item identity with new portion and nutrition values.
    pub fn with_portion(
        &self,
        quantity: f64,
        unit: impl Into<String>,
        calories: f64,
        macros: Macros,
    ) -> CoreResult<Self> {
        let mut next = Self::new(
            self.name.clone(),
            quantity,
            unit,
            calories,
            macros,
            self.micros.clone(),
            self.confidence,
            self.fdc_id.clone(),
            self.is_custom,
        )?;
        next.id = self.id;
        Ok(next)
    }

    pub fn renamed(&self, name: impl Into<String>) -> CoreResult<Self> {
        let mut next = self.clone();
        let name = name.into();
        if name.trim().is_empty() || name.len() > 200 {
            return Err(CoreError::validation("food item name must be 1..=200 chars"));
        }
        next.name = name;
        Ok(next)
    }
}

/// Aggregate nutrition for one meal. Always rebuilt wholesale from the item list so
/// calories/macros stay equal to the sum of current items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    pub calories: f64,
    pub macros: Macros,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub micros: Option<Micros>,
    #[serde(default)]
    pub food_items: Vec<FoodItem>,
    pub confidence_score: f64,
}

impl Nutrition {
    pub fn new(
        calories: f64,
        macros: Macros,
        micros: Option<Micros>,
        food_items: Vec<FoodItem>,
        confidence_score: f64,
    ) -> CoreResult<Self> {
        if !(0.0..=MAX_MEAL_CALORIES).contains(&calories) {
            return Err(CoreError::validation(format!(
                "meal calories must be within 0..={MAX_MEAL_CALORIES}, got {calories}"
            )));
        }
        if food_items.len() > MAX_FOOD_ITEMS {
            return Err(CoreError::validation(format!(
                "a meal holds at most {MAX_FOOD_ITEMS} food items, got {}",
                food_items.len()
            )));
        }
        if let Some(m) = &micros {
            m.validate()?;
        }
        Ok(Self {
            calories,
            macros,
            micros,
            food_items,
            confidence_score: confidence_score.clamp(0.0, 1.0),
        })
    }

    /// Rebuild totals from an item list. Empty list yields zero values with
    /// confidence 1.0 by convention.
    pub fn from_items(food_items: Vec<FoodItem>) -> CoreResult<Self> {
        if food_items.is_empty() {
            return Nutrition::new(0.0, Macros::default(), None, vec![], 1.0);
        }
        let calories: f64 = food_items.iter().map(|i| i.calories).sum();
        let macros = food_items
            .iter()
            .fold(Macros::default(), |acc, i| acc.add(&i.macros));
        let confidence =
            food_items.iter().map(|i| i.confidence).sum::<f64>() / food_items.len() as f64;
        Nutrition::new(calories, macros, None, food_items, confidence)
    }

}
