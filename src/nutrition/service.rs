use std::sync::Arc;

use crate::domain::nutrition::{FoodItem, Nutrition};
use crate::error::{CoreError, CoreResult};
use crate::nutrition::catalog::FoodCatalog;
use crate::nutrition::similarity::SimilarityLookup;
use crate::nutrition::IngredientNutrition;

fn is_per_100g_unit(unit: &str) -> bool {
    matches!(
        unit.to_lowercase().as_str(),
        "g" | "gram" | "grams" | "ml" | "milliliter" | "milliliters"
    )
}

/// Computes ingredient nutrition from backing sources and aggregates item lists.
/// Sources are optional; a missing or failing source falls through to the next.
#[derive(Clone, Default)]
pub struct NutritionCalculator {
    catalog: Option<Arc<dyn FoodCatalog>>,
    similarity: Option<Arc<dyn SimilarityLookup>>,
}

impl NutritionCalculator {
    pub fn new(
        catalog: Option<Arc<dyn FoodCatalog>>,
        similarity: Option<Arc<dyn SimilarityLookup>>,
    ) -> Self {
        Self { catalog, similarity }
    }

    pub fn catalog(&self) -> Option<&Arc<dyn FoodCatalog>> {
        self.catalog.as_ref()
    }

    /// Nutrition for one ingredient at the given portion, trying sources in
    /// strict priority order: catalog by id, then similarity by name. A source
    /// error or miss falls through; `None` means every source was exhausted.
    pub async fn nutrition_for_ingredient(
        &self,
        name: &str,
        quantity: f64,
        unit: &str,
        fdc_id: Option<&str>,
    ) -> Option<IngredientNutrition> {
        if let (Some(catalog), Some(id)) = (&self.catalog, fdc_id) {
            if is_per_100g_unit(unit) {
                match catalog.fetch_by_id(id).await {
                    Ok(Some(per_100g)) => return Some(per_100g.scaled(quantity / 100.0)),
                    Ok(None) => {
                        tracing::debug!(fdc_id = id, "catalog miss, trying next source")
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, fdc_id = id, "catalog lookup failed, trying next source")
                    }
                }
            }
        }

        if let Some(similarity) = &self.similarity {
            match similarity.lookup(name, quantity, unit).await {
                Ok(Some(n)) => return Some(n),
                Ok(None) => tracing::debug!(name, "similarity miss"),
                Err(e) => tracing::warn!(error = %e, name, "similarity lookup failed"),
            }
        }

        None
    }

    /// Aggregate totals across items: sums with arithmetic-mean confidence;
    /// empty list yields a zero-valued Nutrition with confidence 1.0.
    pub fn meal_total(&self, food_items: &[FoodItem]) -> CoreResult<Nutrition> {
        Nutrition::from_items(food_items.to_vec())
    }

    /// Pure proportional scaling from one quantity to another.
    pub fn scale_nutrition(
        original: &IngredientNutrition,
        old_qty: f64,
        new_qty: f64,
    ) -> CoreResult<IngredientNutrition> {
        if old_qty <= 0.0 {
            return Err(CoreError::validation(format!(
                "cannot scale from a non-positive quantity: {old_qty}"
            )));
        }
        Ok(original.scaled(new_qty / old_qty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::nutrition::Macros;
    use crate::nutrition::catalog::CatalogFood;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct FixedCatalog(Option<IngredientNutrition>);

    #[async_trait]
    impl FoodCatalog for FixedCatalog {
        async fn fetch_by_id(&self, _id: &str) -> anyhow::Result<Option<IngredientNutrition>> {
            Ok(self.0.clone())
        }
        async fn search(&self, _name: &str) -> anyhow::Result<Option<CatalogFood>> {
            Ok(None)
        }
    }

    struct FailingCatalog;

    #[async_trait]
    impl FoodCatalog for FailingCatalog {
        async fn fetch_by_id(&self, _id: &str) -> anyhow::Result<Option<IngredientNutrition>> {
            Err(anyhow!("catalog down"))
        }
        async fn search(&self, _name: &str) -> anyhow::Result<Option<CatalogFood>> {
            Err(anyhow!("catalog down"))
        }
    }

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

    fn sample(calories: f64) -> IngredientNutrition {
        IngredientNutrition {
            calories,
            macros: Macros { protein_g: calories / 10.0, carbs_g: 0.0, fat_g: 0.0, fiber_g: None },
            micros: None,
        }
    }

    #[tokio::test]
    async fn catalog_id_wins_over_similarity() {
        let calc = NutritionCalculator::new(
            Some(Arc::new(FixedCatalog(Some(sample(100.0))))),
            Some(Arc::new(FixedSimilarity(Some(sample(999.0))))),
        );
        let n = calc
            .nutrition_for_ingredient("rice", 50.0, "g", Some("12345"))
            .await
            .unwrap();
        // per-100g value scaled to 50 g
        assert_eq!(n.calories, 50.0);
    }

    #[tokio::test]
    async fn catalog_failure_falls_through_to_similarity() {
        let calc = NutritionCalculator::new(
            Some(Arc::new(FailingCatalog)),
            Some(Arc::new(FixedSimilarity(Some(sample(70.0))))),
        );
        let n = calc
            .nutrition_for_ingredient("rice", 50.0, "g", Some("12345"))
            .await
            .unwrap();
        assert_eq!(n.calories, 70.0);
    }

    #[tokio::test]
    async fn exhausted_sources_return_none() {
        let calc = NutritionCalculator::new(
            Some(Arc::new(FixedCatalog(None))),
            Some(Arc::new(FixedSimilarity(None))),
        );
        assert!(calc
            .nutrition_for_ingredient("mystery stew", 1.0, "bowl", None)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn non_gram_unit_skips_per_100g_catalog_math() {
        let calc = NutritionCalculator::new(
            Some(Arc::new(FixedCatalog(Some(sample(100.0))))),
            Some(Arc::new(FixedSimilarity(Some(sample(250.0))))),
        );
        let n = calc
            .nutrition_for_ingredient("pizza", 2.0, "slice", Some("9"))
            .await
            .unwrap();
        assert_eq!(n.calories, 250.0);
    }

    #[test]
    fn scaling_is_linear_and_identity_safe() {
        let n = sample(120.0);
        let same = NutritionCalculator::scale_nutrition(&n, 100.0, 100.0).unwrap();
        assert_eq!(same, n);
        let doubled = NutritionCalculator::scale_nutrition(&n, 100.0, 200.0).unwrap();
        assert_eq!(doubled.calories, 240.0);
        assert_eq!(doubled.macros.protein_g, 24.0);
    }

    #[test]
    fn scaling_from_zero_is_a_validation_error() {
        let err = NutritionCalculator::scale_nutrition(&sample(1.0), 0.0, 10.0).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
