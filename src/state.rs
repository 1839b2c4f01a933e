use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::analysis::vision::OpenAiVisionClient;
use crate::config::AppConfig;
use crate::meals::repo::PgMealRepository;
use crate::meals::services::MealService;
use crate::nutrition::catalog::{FoodCatalog, UsdaClient};
use crate::nutrition::service::NutritionCalculator;
use crate::nutrition::similarity::{SimilarityLookup, SimilaritySearchClient};
use crate::storage::{ImageStore, S3ImageStore};
use crate::translation::{ChatTranslator, Translator};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub meals: Arc<MealService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let images: Arc<dyn ImageStore> = Arc::new(
            S3ImageStore::new(
                &config.storage.endpoint,
                &config.storage.bucket,
                &config.storage.access_key,
                &config.storage.secret_key,
                &config.storage.region,
            )
            .await?,
        );

        let vision = Arc::new(OpenAiVisionClient::new(
            config.vision.api_key.clone(),
            config.vision.base_url.clone(),
            config.vision.model.clone(),
        ));

        let catalog: Option<Arc<dyn FoodCatalog>> = config
            .usda_api_key
            .clone()
            .map(|key| Arc::new(UsdaClient::new(key, None)) as Arc<dyn FoodCatalog>);
        let similarity: Option<Arc<dyn SimilarityLookup>> =
            config.similarity_url.clone().map(|url| {
                Arc::new(SimilaritySearchClient::new(url, config.similarity_min_score))
                    as Arc<dyn SimilarityLookup>
            });
        let calc = NutritionCalculator::new(catalog, similarity);

        let translator: Option<Arc<dyn Translator>> =
            config.translation_lang.as_ref().map(|_| {
                Arc::new(ChatTranslator::new(
                    config.vision.api_key.clone(),
                    config.vision.base_url.clone(),
                    config.vision.model.clone(),
                )) as Arc<dyn Translator>
            });

        let meals = Arc::new(MealService::new(
            Arc::new(PgMealRepository::new(db.clone())),
            images,
            vision,
            calc,
            translator,
            config.translation_lang.clone(),
        ));

        Ok(Self { db, config, meals })
    }
}
