use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use time::Date;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analysis::parser;
use crate::analysis::strategy::AnalysisStrategy;
use crate::analysis::vision::VisionAiService;
use crate::domain::meal::{ImageFormat, Meal, MealImage, MealStatus};
use crate::domain::nutrition::Nutrition;
use crate::error::{CoreError, CoreResult};
use crate::meals::dto::{DailySummaryResponse, FoodItemChange};
use crate::meals::edit::{EditEngine, EditOutcome};
use crate::meals::repo::MealRepository;
use crate::nutrition::service::NutritionCalculator;
use crate::storage::ImageStore;
use crate::translation::{translate_or_keep, Translator};

pub const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Result of the single-ingredient "what is this?" flow.
#[derive(Debug, serde::Serialize)]
pub struct IdentifiedIngredient {
    pub name: String,
    pub category: String,
    pub confidence: f64,
}

/// The one canonical upload/analyze/edit orchestration path.
#[derive(Clone)]
pub struct MealService {
    repo: Arc<dyn MealRepository>,
    images: Arc<dyn ImageStore>,
    vision: Arc<dyn VisionAiService>,
    calc: NutritionCalculator,
    edits: EditEngine,
    translator: Option<Arc<dyn Translator>>,
    target_lang: Option<String>,
}

impl MealService {
    pub fn new(
        repo: Arc<dyn MealRepository>,
        images: Arc<dyn ImageStore>,
        vision: Arc<dyn VisionAiService>,
        calc: NutritionCalculator,
        translator: Option<Arc<dyn Translator>>,
        target_lang: Option<String>,
    ) -> Self {
        let edits = EditEngine::new(calc.clone());
        Self { repo, images, vision, calc, edits, translator, target_lang }
    }

    async fn persist(&self, meal: &Meal) -> CoreResult<Meal> {
        Ok(self.repo.save(meal).await?)
    }

    async fn create_processing_meal(
        &self,
        user_id: Uuid,
        image: Bytes,
        content_type: &str,
    ) -> CoreResult<Meal> {
        let format = ImageFormat::from_content_type(content_type).ok_or_else(|| {
            CoreError::validation(format!("unsupported image content type: {content_type}"))
        })?;
        if image.is_empty() {
            return Err(CoreError::validation("image body is empty"));
        }
        if image.len() > MAX_UPLOAD_BYTES {
            return Err(CoreError::validation(format!(
                "image exceeds {MAX_UPLOAD_BYTES} bytes"
            )));
        }
        let image_id = self.images.save(image.clone(), content_type).await?;
        let meal_image = MealImage::new(image_id, format, image.len() as u64)?;
        self.persist(&Meal::new(user_id, meal_image)).await
    }

    /// Immediate mode: the caller waits for the full pipeline and gets the
    /// terminal meal (READY or FAILED) back.
    pub async fn upload_and_analyze(
        &self,
        user_id: Uuid,
        image: Bytes,
        content_type: &str,
        strategy: AnalysisStrategy,
    ) -> CoreResult<Meal> {
        let meal = self.create_processing_meal(user_id, image.clone(), content_type).await?;
        let meal = self.persist(&meal.start_analysis()?).await?;
        self.analyze_and_transition(meal, image, &strategy).await
    }

    /// Background mode: returns the PROCESSING meal at once; the analysis runs
    /// in a deferred task with no cancellation handle or timeout.
    pub async fn upload_for_background(
        &self,
        user_id: Uuid,
        image: Bytes,
        content_type: &str,
        strategy: AnalysisStrategy,
    ) -> CoreResult<Meal> {
        let meal = self.create_processing_meal(user_id, image.clone(), content_type).await?;
        let service = self.clone();
        let meal_id = meal.meal_id;
        tokio::spawn(async move {
            service.background_analysis(meal_id, image, strategy).await;
        });
        Ok(meal)
    }

    pub(crate) async fn background_analysis(
        &self,
        meal_id: Uuid,
        image: Bytes,
        strategy: AnalysisStrategy,
    ) {
        let meal = match self.repo.find_by_id(meal_id).await {
            Ok(Some(meal)) => meal,
            Ok(None) => {
                warn!(%meal_id, "meal vanished before background analysis");
                return;
            }
            Err(e) => {
                error!(%meal_id, error = %e, "could not load meal for background analysis");
                return;
            }
        };
        // Double-processing guard: someone else already picked this meal up.
        if meal.status != MealStatus::Processing {
            info!(%meal_id, status = meal.status.as_str(), "meal no longer PROCESSING, skipping");
            return;
        }
        let analyzing = match meal.start_analysis() {
            Ok(m) => m,
            Err(e) => {
                error!(%meal_id, error = %e, "background transition failed");
                return;
            }
        };
        let analyzing = match self.persist(&analyzing).await {
            Ok(m) => m,
            Err(e) => {
                error!(%meal_id, error = %e, "could not persist ANALYZING transition");
                return;
            }
        };
        if let Err(e) = self.analyze_and_transition(analyzing, image, &strategy).await {
            error!(%meal_id, error = %e, "background analysis failed to reach a terminal state");
        }
    }

    /// Re-analysis with extra context over the stored image. Valid for READY
    /// and FAILED meals.
    pub async fn reanalyze(&self, meal_id: Uuid, strategy: AnalysisStrategy) -> CoreResult<Meal> {
        let meal = self.load(meal_id).await?;
        let image = self
            .images
            .load(&meal.image.image_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("image for meal {meal_id} is gone")))?;
        let analyzing = self.persist(&meal.restart_analysis()?).await?;
        self.analyze_and_transition(analyzing, image, &strategy).await
    }

    /// Vision call, parse, optional enrichment/translation, then the terminal
    /// transition. A vision or parser failure marks the meal FAILED; it never
    /// stays in ANALYZING.
    async fn analyze_and_transition(
        &self,
        meal: Meal,
        image: Bytes,
        strategy: &AnalysisStrategy,
    ) -> CoreResult<Meal> {
        let raw = match self.vision.analyze_with_strategy(image, strategy).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(meal_id = %meal.meal_id, error = %e, "vision call failed");
                return self.persist(&meal.mark_failed(e.to_string())?).await;
            }
        };

        let nutrition = match parser::parse_to_nutrition(&raw) {
            Ok(n) => n,
            Err(e) => {
                warn!(meal_id = %meal.meal_id, error = %e, "vision response unparseable");
                return self.persist(&meal.mark_failed(e.to_string())?).await;
            }
        };
        let dish_name = parser::parse_dish_name(&raw);
        let raw_json = parser::extract_raw_json(&raw);

        let (meal, nutrition) = if self.calc.catalog().is_some() {
            let enriching = self.persist(&meal.start_enrichment()?).await?;
            let enriched = self.enrich(nutrition).await;
            (enriching, enriched)
        } else {
            (meal, nutrition)
        };

        let (dish_name, nutrition) = self.translate(dish_name, nutrition).await;

        self.persist(&meal.mark_ready(dish_name, nutrition, raw_json)?).await
    }

    /// Best-effort cross-check of parsed items against the catalog; any miss
    /// or failure keeps the AI estimate.
    async fn enrich(&self, nutrition: Nutrition) -> Nutrition {
        let Some(catalog) = self.calc.catalog() else {
            return nutrition;
        };
        let original = nutrition.clone();
        let mut items = Vec::with_capacity(nutrition.food_items.len());
        let mut changed = false;
        for item in nutrition.food_items {
            if item.is_custom || !matches!(item.unit.as_str(), "g" | "ml") {
                items.push(item);
                continue;
            }
            match catalog.search(&item.name).await {
                Ok(Some(hit)) => {
                    let scaled = hit.per_100g.scaled(item.quantity / 100.0);
                    match item.with_portion(item.quantity, item.unit.clone(), scaled.calories, scaled.macros) {
                        Ok(mut refined) => {
                            refined.fdc_id = Some(hit.fdc_id);
                            changed = true;
                            items.push(refined);
                        }
                        Err(e) => {
                            warn!(name = %item.name, error = %e, "enriched values rejected, keeping estimate");
                            items.push(item);
                        }
                    }
                }
                Ok(None) => items.push(item),
                Err(e) => {
                    warn!(name = %item.name, error = %e, "catalog enrichment failed, keeping estimate");
                    items.push(item);
                }
            }
        }
        if !changed {
            return original;
        }
        Nutrition::from_items(items).unwrap_or(original)
    }

    async fn translate(
        &self,
        dish_name: Option<String>,
        nutrition: Nutrition,
    ) -> (Option<String>, Nutrition) {
        let (Some(translator), Some(lang)) = (&self.translator, &self.target_lang) else {
            return (dish_name, nutrition);
        };
        let dish_name = match dish_name {
            Some(name) => Some(translate_or_keep(translator.as_ref(), &name, lang).await),
            None => None,
        };
        let mut nutrition = nutrition;
        for i in 0..nutrition.food_items.len() {
            let translated =
                translate_or_keep(translator.as_ref(), &nutrition.food_items[i].name, lang).await;
            if let Ok(renamed) = nutrition.food_items[i].renamed(translated) {
                nutrition.food_items[i] = renamed;
            }
        }
        (dish_name, nutrition)
    }

    /// Single-ingredient recognition; no meal is created.
    pub async fn identify_ingredient(&self, image: Bytes) -> CoreResult<IdentifiedIngredient> {
        if image.is_empty() {
            return Err(CoreError::validation("image body is empty"));
        }
        let raw = self
            .vision
            .analyze_with_strategy(image, &AnalysisStrategy::IngredientIdentification)
            .await?;
        let payload = raw
            .structured
            .clone()
            .ok_or_else(|| CoreError::parsing("identification response has no payload"))?;
        let name = payload
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CoreError::parsing("identification response is missing 'name'"))?;
        Ok(IdentifiedIngredient {
            name: name.to_string(),
            category: payload
                .get("category")
                .and_then(Value::as_str)
                .unwrap_or("other")
                .to_string(),
            confidence: payload
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.5)
                .clamp(0.0, 1.0),
        })
    }

    pub async fn edit_meal(
        &self,
        meal_id: Uuid,
        user_id: Uuid,
        changes: &[FoodItemChange],
    ) -> CoreResult<EditOutcome> {
        let meal = self.load_owned(meal_id, user_id).await?;
        let outcome = self.edits.apply(&meal, changes).await?;
        let meal = self.persist(&outcome.meal).await?;
        Ok(EditOutcome { meal, ..outcome })
    }

    pub async fn get_meal(&self, meal_id: Uuid, user_id: Uuid) -> CoreResult<Meal> {
        let mut meal = self.load_owned(meal_id, user_id).await?;
        // Presigning is cosmetic; a storage hiccup must not hide the meal.
        match self.images.get_url(&meal.image.image_id).await {
            Ok(url) => meal.image.url = url,
            Err(e) => warn!(meal_id = %meal.meal_id, error = %e, "presign failed"),
        }
        Ok(meal)
    }

    pub async fn list_meals(&self, offset: i64, limit: i64) -> CoreResult<Vec<Meal>> {
        let meals = self.repo.find_all_paginated(offset, limit).await?;
        Ok(meals
            .into_iter()
            .filter(|m| m.status != MealStatus::Inactive)
            .collect())
    }

    /// Soft delete; the stored photo is removed best-effort.
    pub async fn delete_meal(&self, meal_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        let meal = self.load_owned(meal_id, user_id).await?;
        self.persist(&meal.mark_inactive()).await?;
        if let Err(e) = self.images.delete(&meal.image.image_id).await {
            warn!(%meal_id, error = %e, "could not delete stored image");
        }
        Ok(())
    }

    /// Macro totals across the user's READY meals for one day.
    pub async fn daily_summary(&self, user_id: Uuid, date: Date) -> CoreResult<DailySummaryResponse> {
        let meals = self.repo.find_by_date(date, Some(user_id), 200).await?;
        let mut summary = DailySummaryResponse {
            date,
            meal_count: 0,
            calories: 0.0,
            protein_g: 0.0,
            carbs_g: 0.0,
            fat_g: 0.0,
        };
        for meal in meals {
            let Some(n) = (meal.status == MealStatus::Ready)
                .then_some(meal.nutrition.as_ref())
                .flatten()
            else {
                continue;
            };
            summary.meal_count += 1;
            summary.calories += n.calories;
            summary.protein_g += n.macros.protein_g;
            summary.carbs_g += n.macros.carbs_g;
            summary.fat_g += n.macros.fat_g;
        }
        Ok(summary)
    }

    async fn load(&self, meal_id: Uuid) -> CoreResult<Meal> {
        self.repo
            .find_by_id(meal_id)
            .await?
            .filter(|m| m.status != MealStatus::Inactive)
            .ok_or_else(|| CoreError::not_found(format!("meal {meal_id}")))
    }

    async fn load_owned(&self, meal_id: Uuid, user_id: Uuid) -> CoreResult<Meal> {
        let meal = self.load(meal_id).await?;
        if meal.user_id != user_id {
            return Err(CoreError::not_found(format!("meal {meal_id}")));
        }
        Ok(meal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::vision::RawVisionResponse;
    use crate::domain::nutrition::Macros;
    use crate::meals::repo::testutil::InMemoryMealRepository;
    use crate::nutrition::catalog::{CatalogFood, FoodCatalog};
    use crate::nutrition::IngredientNutrition;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeImageStore {
        objects: Mutex<HashMap<String, Bytes>>,
    }

    impl FakeImageStore {
        fn new() -> Self {
            Self { objects: Mutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl ImageStore for FakeImageStore {
        async fn save(&self, body: Bytes, _ct: &str) -> anyhow::Result<String> {
            let key = format!("meals/{}.jpg", Uuid::new_v4());
            self.objects.lock().unwrap().insert(key.clone(), body);
            Ok(key)
        }
        async fn load(&self, image_id: &str) -> anyhow::Result<Option<Bytes>> {
            Ok(self.objects.lock().unwrap().get(image_id).cloned())
        }
        async fn get_url(&self, image_id: &str) -> anyhow::Result<Option<String>> {
            Ok(Some(format!("https://fake.local/{image_id}")))
        }
        async fn delete(&self, image_id: &str) -> anyhow::Result<bool> {
            Ok(self.objects.lock().unwrap().remove(image_id).is_some())
        }
    }

    enum FakeVision {
        Json(serde_json::Value),
        Text(&'static str),
        Failing(&'static str),
    }

    #[async_trait]
    impl VisionAiService for FakeVision {
        async fn analyze_with_strategy(
            &self,
            _image: Bytes,
            _strategy: &AnalysisStrategy,
        ) -> anyhow::Result<RawVisionResponse> {
            match self {
                FakeVision::Json(v) => Ok(RawVisionResponse::from_text(v.to_string())),
                FakeVision::Text(t) => Ok(RawVisionResponse::from_text(*t)),
                FakeVision::Failing(msg) => Err(anyhow!("{msg}")),
            }
        }
    }

    struct UpperTranslator;

    #[async_trait]
    impl Translator for UpperTranslator {
        async fn translate(&self, text: &str, _lang: &str) -> anyhow::Result<String> {
            Ok(text.to_uppercase())
        }
    }

    struct FixedCatalog(IngredientNutrition);

    #[async_trait]
    impl FoodCatalog for FixedCatalog {
        async fn fetch_by_id(&self, _id: &str) -> anyhow::Result<Option<IngredientNutrition>> {
            Ok(Some(self.0.clone()))
        }
        async fn search(&self, _name: &str) -> anyhow::Result<Option<CatalogFood>> {
            Ok(Some(CatalogFood {
                fdc_id: "1001".into(),
                description: "test food".into(),
                per_100g: self.0.clone(),
            }))
        }
    }

    fn good_response() -> serde_json::Value {
        json!({
            "dish_name": "Fried rice",
            "foods": [{
                "name": "Rice",
                "quantity": 150,
                "unit": "g",
                "calories": 195,
                "macros": {"protein": 4, "carbs": 42, "fat": 0.5}
            }],
            "confidence": 0.9
        })
    }

    struct Harness {
        repo: Arc<InMemoryMealRepository>,
        images: Arc<FakeImageStore>,
        service: MealService,
    }

    fn harness(vision: FakeVision) -> Harness {
        harness_with(vision, NutritionCalculator::default(), None, None)
    }

    fn harness_with(
        vision: FakeVision,
        calc: NutritionCalculator,
        translator: Option<Arc<dyn Translator>>,
        target_lang: Option<String>,
    ) -> Harness {
        let repo = Arc::new(InMemoryMealRepository::default());
        let images = Arc::new(FakeImageStore::new());
        let service = MealService::new(
            repo.clone(),
            images.clone(),
            Arc::new(vision),
            calc,
            translator,
            target_lang,
        );
        Harness { repo, images, service }
    }

    fn jpeg() -> Bytes {
        Bytes::from_static(b"\xff\xd8\xff\xe0 not really a jpeg")
    }

    #[tokio::test]
    async fn immediate_analysis_reaches_ready() {
        let h = harness(FakeVision::Json(good_response()));
        let meal = h
            .service
            .upload_and_analyze(Uuid::new_v4(), jpeg(), "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap();
        assert_eq!(meal.status, MealStatus::Ready);
        assert_eq!(meal.dish_name.as_deref(), Some("Fried rice"));
        let n = meal.nutrition.as_ref().unwrap();
        assert_eq!(n.calories, 195.0);
        assert!(meal.raw_ai_response.is_some());
        // persisted state matches
        let stored = h.repo.get(meal.meal_id).unwrap();
        assert_eq!(stored.status, MealStatus::Ready);
    }

    #[tokio::test]
    async fn vision_failure_marks_meal_failed() {
        let h = harness(FakeVision::Failing("vision exploded"));
        let meal = h
            .service
            .upload_and_analyze(Uuid::new_v4(), jpeg(), "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap();
        assert_eq!(meal.status, MealStatus::Failed);
        assert!(meal.error_message.as_deref().unwrap().contains("vision exploded"));
        assert!(meal.nutrition.is_none());
    }

    #[tokio::test]
    async fn unparseable_response_marks_meal_failed() {
        let h = harness(FakeVision::Text("I cannot identify this food, sorry."));
        let meal = h
            .service
            .upload_and_analyze(Uuid::new_v4(), jpeg(), "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap();
        assert_eq!(meal.status, MealStatus::Failed);
        assert!(meal.error_message.is_some());
    }

    #[tokio::test]
    async fn bad_content_type_is_rejected_before_saving() {
        let h = harness(FakeVision::Json(good_response()));
        let err = h
            .service
            .upload_and_analyze(Uuid::new_v4(), jpeg(), "image/gif", AnalysisStrategy::Basic)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(h.images.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let h = harness(FakeVision::Json(good_response()));
        let big = Bytes::from(vec![0u8; MAX_UPLOAD_BYTES + 1]);
        let err = h
            .service
            .upload_and_analyze(Uuid::new_v4(), big, "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn background_upload_returns_processing_immediately() {
        let h = harness(FakeVision::Json(good_response()));
        let meal = h
            .service
            .upload_for_background(Uuid::new_v4(), jpeg(), "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap();
        assert_eq!(meal.status, MealStatus::Processing);
    }

    #[tokio::test]
    async fn background_task_completes_the_pipeline() {
        let h = harness(FakeVision::Json(good_response()));
        let meal = h
            .service
            .create_processing_meal(Uuid::new_v4(), jpeg(), "image/jpeg")
            .await
            .unwrap();
        h.service
            .background_analysis(meal.meal_id, jpeg(), AnalysisStrategy::Basic)
            .await;
        let stored = h.repo.get(meal.meal_id).unwrap();
        assert_eq!(stored.status, MealStatus::Ready);
    }

    #[tokio::test]
    async fn background_task_skips_meals_no_longer_processing() {
        let h = harness(FakeVision::Json(good_response()));
        let meal = h
            .service
            .upload_and_analyze(Uuid::new_v4(), jpeg(), "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap();
        let edits_before = h.repo.get(meal.meal_id).unwrap().updated_at;
        h.service
            .background_analysis(meal.meal_id, jpeg(), AnalysisStrategy::Basic)
            .await;
        let stored = h.repo.get(meal.meal_id).unwrap();
        assert_eq!(stored.status, MealStatus::Ready);
        assert_eq!(stored.updated_at, edits_before);
    }

    #[tokio::test]
    async fn reanalyze_runs_strategy_over_stored_image() {
        let h = harness(FakeVision::Json(good_response()));
        let user = Uuid::new_v4();
        let meal = h
            .service
            .upload_and_analyze(user, jpeg(), "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap();
        let again = h
            .service
            .reanalyze(meal.meal_id, AnalysisStrategy::weight_aware(350.0).unwrap())
            .await
            .unwrap();
        assert_eq!(again.status, MealStatus::Ready);
        assert_eq!(again.meal_id, meal.meal_id);
    }

    #[tokio::test]
    async fn reanalyze_unknown_meal_is_not_found() {
        let h = harness(FakeVision::Json(good_response()));
        let err = h
            .service
            .reanalyze(Uuid::new_v4(), AnalysisStrategy::Basic)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn enrichment_refines_items_from_the_catalog() {
        let catalog = FixedCatalog(IngredientNutrition {
            calories: 130.0,
            macros: Macros::new(2.7, 28.0, 0.3, None).unwrap(),
            micros: None,
        });
        let calc = NutritionCalculator::new(Some(Arc::new(catalog)), None);
        let h = harness_with(FakeVision::Json(good_response()), calc, None, None);
        let meal = h
            .service
            .upload_and_analyze(Uuid::new_v4(), jpeg(), "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap();
        assert_eq!(meal.status, MealStatus::Ready);
        let n = meal.nutrition.as_ref().unwrap();
        // 150 g of the catalog's per-100g values
        assert_eq!(n.food_items[0].calories, 195.0);
        assert_eq!(n.food_items[0].macros.carbs_g, 42.0);
        assert_eq!(n.food_items[0].fdc_id.as_deref(), Some("1001"));
        let item_sum: f64 = n.food_items.iter().map(|i| i.calories).sum();
        assert!((n.calories - item_sum).abs() < 1.0);
    }

    #[tokio::test]
    async fn translation_is_applied_to_names() {
        let h = harness_with(
            FakeVision::Json(good_response()),
            NutritionCalculator::default(),
            Some(Arc::new(UpperTranslator)),
            Some("en".into()),
        );
        let meal = h
            .service
            .upload_and_analyze(Uuid::new_v4(), jpeg(), "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap();
        assert_eq!(meal.dish_name.as_deref(), Some("FRIED RICE"));
        assert_eq!(meal.nutrition.unwrap().food_items[0].name, "RICE");
    }

    #[tokio::test]
    async fn identify_ingredient_parses_the_payload() {
        let h = harness(FakeVision::Json(
            json!({"name": "Broccoli", "category": "vegetable", "confidence": 0.95}),
        ));
        let hit = h.service.identify_ingredient(jpeg()).await.unwrap();
        assert_eq!(hit.name, "Broccoli");
        assert_eq!(hit.category, "vegetable");
        assert_eq!(hit.confidence, 0.95);
    }

    #[tokio::test]
    async fn edit_meal_persists_the_outcome() {
        let h = harness(FakeVision::Json(good_response()));
        let user = Uuid::new_v4();
        let meal = h
            .service
            .upload_and_analyze(user, jpeg(), "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap();
        let item_id = meal.nutrition.as_ref().unwrap().food_items[0].id;
        let change = FoodItemChange {
            action: crate::meals::dto::ChangeAction::Update,
            id: Some(item_id),
            name: None,
            quantity: Some(300.0),
            unit: None,
            fdc_id: None,
            custom_nutrition: None,
        };
        let outcome = h.service.edit_meal(meal.meal_id, user, &[change]).await.unwrap();
        assert_eq!(outcome.meal.edit_count, 1);
        let stored = h.repo.get(meal.meal_id).unwrap();
        assert_eq!(stored.nutrition.unwrap().food_items[0].calories, 390.0);
    }

    #[tokio::test]
    async fn delete_soft_deletes_and_removes_image() {
        let h = harness(FakeVision::Json(good_response()));
        let user = Uuid::new_v4();
        let meal = h
            .service
            .upload_and_analyze(user, jpeg(), "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap();
        h.service.delete_meal(meal.meal_id, user).await.unwrap();
        let stored = h.repo.get(meal.meal_id).unwrap();
        assert_eq!(stored.status, MealStatus::Inactive);
        assert!(h.images.objects.lock().unwrap().is_empty());
        // soft-deleted meals are gone from reads
        let err = h.service.get_meal(meal.meal_id, user).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn other_users_meals_are_invisible() {
        let h = harness(FakeVision::Json(good_response()));
        let meal = h
            .service
            .upload_and_analyze(Uuid::new_v4(), jpeg(), "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap();
        let err = h.service.get_meal(meal.meal_id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn daily_summary_sums_only_ready_meals() {
        let h = harness(FakeVision::Json(good_response()));
        let user = Uuid::new_v4();
        let ready = h
            .service
            .upload_and_analyze(user, jpeg(), "image/jpeg", AnalysisStrategy::Basic)
            .await
            .unwrap();
        // a second meal left in PROCESSING must not count
        h.service
            .create_processing_meal(user, jpeg(), "image/jpeg")
            .await
            .unwrap();
        let summary = h
            .service
            .daily_summary(user, ready.created_at.date())
            .await
            .unwrap();
        assert_eq!(summary.meal_count, 1);
        assert_eq!(summary.calories, 195.0);
        assert!((summary.protein_g - 4.0).abs() < 0.1);
    }
}
