use tracing::warn;

use crate::domain::meal::{Meal, MealStatus};
use crate::domain::nutrition::{FoodItem, Macros};
use crate::error::{CoreError, CoreResult};
use crate::meals::dto::{ChangeAction, CustomNutrition, FoodItemChange, NutritionDelta};
use crate::nutrition::service::NutritionCalculator;
use crate::nutrition::IngredientNutrition;

/// Result of applying one edit batch: the transitioned meal plus reporting data.
#[derive(Debug)]
pub struct EditOutcome {
    pub meal: Meal,
    pub delta: NutritionDelta,
    pub change_summary: Vec<String>,
}

/// Applies add/update/remove batches to a meal's ingredient list and rebuilds
/// the totals from scratch afterwards.
#[derive(Clone)]
pub struct EditEngine {
    calc: NutritionCalculator,
}

fn custom_scaled(custom: &CustomNutrition, quantity: f64) -> CoreResult<IngredientNutrition> {
    let per_100g = IngredientNutrition {
        calories: custom.calories_per_100g,
        macros: Macros::new(
            custom.protein_per_100g,
            custom.carbs_per_100g,
            custom.fat_per_100g,
            custom.fiber_per_100g,
        )?,
        micros: None,
    };
    Ok(per_100g.scaled(quantity / 100.0))
}

impl EditEngine {
    pub fn new(calc: NutritionCalculator) -> Self {
        Self { calc }
    }

    pub async fn apply(&self, meal: &Meal, changes: &[FoodItemChange]) -> CoreResult<EditOutcome> {
        if meal.status != MealStatus::Ready {
            return Err(CoreError::validation("must be in READY status to edit"));
        }
        let before = meal.nutrition.clone().ok_or_else(|| {
            CoreError::validation("meal has no nutrition to edit")
        })?;

        let mut items = before.food_items.clone();
        let mut summary = Vec::with_capacity(changes.len());

        for change in changes {
            match change.action {
                ChangeAction::Remove => self.remove(&mut items, change, &mut summary)?,
                ChangeAction::Update => self.update(&mut items, change, &mut summary).await?,
                ChangeAction::Add => self.add(&mut items, change, &mut summary).await?,
            }
        }

        // Wholesale recompute so totals always equal the item sums, no matter
        // how heterogeneous the batch was.
        let total = self.calc.meal_total(&items)?;
        let delta = NutritionDelta {
            calories: total.calories - before.calories,
            protein_g: total.macros.protein_g - before.macros.protein_g,
            carbs_g: total.macros.carbs_g - before.macros.carbs_g,
            fat_g: total.macros.fat_g - before.macros.fat_g,
        };
        let meal = meal.apply_edit(total)?;

        Ok(EditOutcome { meal, delta, change_summary: summary })
    }

    /// Idempotent: removing an absent id warns and leaves the list unchanged.
    fn remove(
        &self,
        items: &mut Vec<FoodItem>,
        change: &FoodItemChange,
        summary: &mut Vec<String>,
    ) -> CoreResult<()> {
        let id = change
            .id
            .ok_or_else(|| CoreError::validation("remove requires a food item id"))?;
        match items.iter().position(|i| i.id == id) {
            Some(pos) => {
                let removed = items.remove(pos);
                summary.push(format!("Removed {}", removed.name));
            }
            None => {
                warn!(%id, "remove requested for an absent food item, skipping");
            }
        }
        Ok(())
    }

    async fn update(
        &self,
        items: &mut [FoodItem],
        change: &FoodItemChange,
        summary: &mut Vec<String>,
    ) -> CoreResult<()> {
        let id = change
            .id
            .ok_or_else(|| CoreError::validation("update requires a food item id"))?;
        let pos = items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| CoreError::not_found(format!("food item {id} not in meal")))?;
        let current = &items[pos];

        let mut next = match &change.name {
            Some(name) => current.renamed(name.clone())?,
            None => current.clone(),
        };

        let new_qty = change.quantity.unwrap_or(current.quantity);
        let new_unit = change.unit.clone().unwrap_or_else(|| current.unit.clone());

        if new_unit != current.unit {
            // Cross-unit scaling is not reliably linear; fetch fresh data for
            // the new portion and only scale proportionally as a last resort.
            let fdc_id = change.fdc_id.as_deref().or(current.fdc_id.as_deref());
            match self
                .calc
                .nutrition_for_ingredient(&next.name, new_qty, &new_unit, fdc_id)
                .await
            {
                Some(fresh) => {
                    next = next.with_portion(new_qty, new_unit, fresh.calories, fresh.macros)?;
                }
                None => {
                    warn!(
                        name = %next.name,
                        from = %current.unit,
                        to = %new_unit,
                        "no source for new unit, falling back to proportional scaling"
                    );
                    let scaled = NutritionCalculator::scale_nutrition(
                        &IngredientNutrition {
                            calories: current.calories,
                            macros: current.macros.clone(),
                            micros: current.micros.clone(),
                        },
                        current.quantity,
                        new_qty,
                    )?;
                    next = next.with_portion(new_qty, new_unit, scaled.calories, scaled.macros)?;
                }
            }
            summary.push(format!("Updated {} portion", next.name));
        } else if (new_qty - current.quantity).abs() > f64::EPSILON {
            let scaled = NutritionCalculator::scale_nutrition(
                &IngredientNutrition {
                    calories: current.calories,
                    macros: current.macros.clone(),
                    micros: current.micros.clone(),
                },
                current.quantity,
                new_qty,
            )?;
            next = next.with_portion(new_qty, new_unit, scaled.calories, scaled.macros)?;
            summary.push(format!("Updated {} portion", next.name));
        } else if change.name.is_some() {
            summary.push(format!("Renamed to {}", next.name));
        }

        items[pos] = next;
        Ok(())
    }

    /// Nutrition sourcing priority: custom per-100g payload, then the
    /// calculator's lookup chain. An exhausted chain drops the ingredient.
    async fn add(
        &self,
        items: &mut Vec<FoodItem>,
        change: &FoodItemChange,
        summary: &mut Vec<String>,
    ) -> CoreResult<()> {
        let name = change
            .name
            .as_deref()
            .ok_or_else(|| CoreError::validation("add requires a name"))?;
        let quantity = change
            .quantity
            .ok_or_else(|| CoreError::validation("add requires a quantity"))?;
        let unit = change.unit.as_deref().unwrap_or("g");

        let (nutrition, is_custom, confidence) = match &change.custom_nutrition {
            Some(custom) => (Some(custom_scaled(custom, quantity)?), true, 1.0),
            None => (
                self.calc
                    .nutrition_for_ingredient(name, quantity, unit, change.fdc_id.as_deref())
                    .await,
                false,
                0.8,
            ),
        };

        match nutrition {
            Some(n) => {
                items.push(FoodItem::new(
                    name,
                    quantity,
                    unit,
                    n.calories,
                    n.macros,
                    n.micros,
                    confidence,
                    change.fdc_id.clone(),
                    is_custom,
                )?);
                summary.push(format!("Added {name}"));
            }
            None => {
                warn!(name, "no nutrition source for new ingredient, dropping it");
                summary.push(format!("Skipped {name}: no nutrition data found"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::meal::{ImageFormat, MealImage};
    use crate::domain::nutrition::Nutrition;
    use crate::nutrition::similarity::SimilarityLookup;
    use async_trait::async_trait;
    use std::sync::Arc;
    use uuid::Uuid;

    struct FixedSimilarity(Option<IngredientNutrition>);

    #[async_trait]
    impl SimilarityLookup for FixedSimilarity {
        async fn lookup(
            &self,
            _name: &str,
            _q: f64,
            _u: &str,
        ) -> anyhow::Result<Option<IngredientNutrition>> {
            Ok(self.0.clone())
        }
    }

    fn engine_with(similarity: Option<IngredientNutrition>) -> EditEngine {
        EditEngine::new(NutritionCalculator::new(
            None,
            Some(Arc::new(FixedSimilarity(similarity))),
        ))
    }

    fn ready_meal(items: Vec<FoodItem>) -> Meal {
        let image = MealImage::new("meals/u/1.jpg", ImageFormat::Jpeg, 100).unwrap();
        Meal::new(Uuid::new_v4(), image)
            .start_analysis()
            .unwrap()
            .mark_ready(Some("Test dish".into()), Nutrition::from_items(items).unwrap(), None)
            .unwrap()
    }

    fn item(name: &str, qty: f64, calories: f64) -> FoodItem {
        FoodItem::new(
            name,
            qty,
            "g",
            calories,
            Macros::new(calories / 20.0, 0.0, 0.0, None).unwrap(),
            None,
            0.9,
            None,
            false,
        )
        .unwrap()
    }

    fn change(action: ChangeAction) -> FoodItemChange {
        FoodItemChange {
            action,
            id: None,
            name: None,
            quantity: None,
            unit: None,
            fdc_id: None,
            custom_nutrition: None,
        }
    }

    #[tokio::test]
    async fn quantity_update_scales_proportionally() {
        let food = item("Rice", 100.0, 100.0);
        let id = food.id;
        let meal = ready_meal(vec![food]);
        let engine = engine_with(None);

        let mut c = change(ChangeAction::Update);
        c.id = Some(id);
        c.quantity = Some(200.0);
        let outcome = engine.apply(&meal, &[c]).await.unwrap();

        let n = outcome.meal.nutrition.unwrap();
        assert_eq!(n.food_items[0].calories, 200.0);
        assert_eq!(n.calories, 200.0);
        assert!((outcome.delta.calories - 100.0).abs() < 1e-9);
        assert_eq!(outcome.meal.edit_count, 1);
    }

    #[tokio::test]
    async fn unit_change_fetches_fresh_nutrition() {
        let food = item("Rice", 100.0, 100.0);
        let id = food.id;
        let meal = ready_meal(vec![food]);
        let engine = engine_with(Some(IngredientNutrition {
            calories: 350.0,
            macros: Macros::new(7.0, 70.0, 1.0, None).unwrap(),
            micros: None,
        }));

        let mut c = change(ChangeAction::Update);
        c.id = Some(id);
        c.quantity = Some(1.0);
        c.unit = Some("cup".into());
        let outcome = engine.apply(&meal, &[c]).await.unwrap();

        let n = outcome.meal.nutrition.unwrap();
        assert_eq!(n.food_items[0].calories, 350.0);
        assert_eq!(n.food_items[0].unit, "cup");
    }

    #[tokio::test]
    async fn unit_change_without_source_falls_back_to_scaling() {
        let food = item("Rice", 100.0, 100.0);
        let id = food.id;
        let meal = ready_meal(vec![food]);
        let engine = engine_with(None);

        let mut c = change(ChangeAction::Update);
        c.id = Some(id);
        c.quantity = Some(200.0);
        c.unit = Some("ml".into());
        let outcome = engine.apply(&meal, &[c]).await.unwrap();

        let n = outcome.meal.nutrition.unwrap();
        assert_eq!(n.food_items[0].calories, 200.0);
        assert_eq!(n.food_items[0].unit, "ml");
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_not_found() {
        let meal = ready_meal(vec![item("Rice", 100.0, 100.0)]);
        let engine = engine_with(None);

        let mut c = change(ChangeAction::Update);
        c.id = Some(Uuid::new_v4());
        c.quantity = Some(50.0);
        let err = engine.apply(&meal, &[c]).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn custom_nutrition_add_scales_per_100g() {
        let meal = ready_meal(vec![]);
        let engine = engine_with(None);

        let mut c = change(ChangeAction::Add);
        c.name = Some("Sauce".into());
        c.quantity = Some(50.0);
        c.unit = Some("g".into());
        c.custom_nutrition = Some(CustomNutrition {
            calories_per_100g: 120.0,
            protein_per_100g: 2.0,
            carbs_per_100g: 10.0,
            fat_per_100g: 8.0,
            fiber_per_100g: None,
        });
        let outcome = engine.apply(&meal, &[c]).await.unwrap();

        let n = outcome.meal.nutrition.unwrap();
        assert_eq!(n.food_items.len(), 1);
        assert_eq!(n.food_items[0].calories, 60.0);
        assert_eq!(n.food_items[0].macros.fat_g, 4.0);
        assert!(n.food_items[0].is_custom);
        assert_eq!(outcome.change_summary, vec!["Added Sauce".to_string()]);
    }

    #[tokio::test]
    async fn add_with_no_source_drops_ingredient_without_failing() {
        let existing = item("Rice", 100.0, 100.0);
        let meal = ready_meal(vec![existing]);
        let engine = engine_with(None);

        let mut c = change(ChangeAction::Add);
        c.name = Some("Mystery".into());
        c.quantity = Some(30.0);
        let outcome = engine.apply(&meal, &[c]).await.unwrap();

        let n = outcome.meal.nutrition.unwrap();
        assert_eq!(n.food_items.len(), 1);
        assert_eq!(n.calories, 100.0);
        assert!(outcome.change_summary[0].starts_with("Skipped Mystery"));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let food = item("Rice", 100.0, 100.0);
        let meal = ready_meal(vec![food]);
        let engine = engine_with(None);

        let mut c = change(ChangeAction::Remove);
        c.id = Some(Uuid::new_v4());
        let outcome = engine.apply(&meal, &[c]).await.unwrap();

        let n = outcome.meal.nutrition.unwrap();
        assert_eq!(n.food_items.len(), 1);
        assert!(outcome.change_summary.is_empty());
    }

    #[tokio::test]
    async fn remove_then_add_recomputes_totals_from_scratch() {
        let rice = item("Rice", 100.0, 130.0);
        let rice_id = rice.id;
        let meal = ready_meal(vec![rice, item("Chicken", 100.0, 165.0)]);
        let engine = engine_with(None);

        let mut remove = change(ChangeAction::Remove);
        remove.id = Some(rice_id);
        let mut add = change(ChangeAction::Add);
        add.name = Some("Bread".into());
        add.quantity = Some(50.0);
        add.custom_nutrition = Some(CustomNutrition {
            calories_per_100g: 250.0,
            protein_per_100g: 9.0,
            carbs_per_100g: 49.0,
            fat_per_100g: 3.2,
            fiber_per_100g: Some(2.7),
        });

        let outcome = engine.apply(&meal, &[remove, add]).await.unwrap();
        let n = outcome.meal.nutrition.unwrap();
        assert_eq!(n.food_items.len(), 2);
        let item_sum: f64 = n.food_items.iter().map(|i| i.calories).sum();
        assert!((n.calories - item_sum).abs() < 1.0);
        assert_eq!(
            outcome.change_summary,
            vec!["Removed Rice".to_string(), "Added Bread".to_string()]
        );
    }

    #[tokio::test]
    async fn editing_a_processing_meal_is_rejected() {
        let image = MealImage::new("meals/u/1.jpg", ImageFormat::Jpeg, 100).unwrap();
        let meal = Meal::new(Uuid::new_v4(), image);
        let engine = engine_with(None);

        let err = engine.apply(&meal, &[change(ChangeAction::Remove)]).await.unwrap_err();
        assert_eq!(err.to_string(), "validation error: must be in READY status to edit");
        assert_eq!(meal.edit_count, 0);
        assert!(meal.nutrition.is_none());
    }
}
