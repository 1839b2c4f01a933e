use anyhow::Context;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::domain::meal::{Meal, MealImage, MealStatus};
use crate::domain::nutrition::Nutrition;

/// Persistence seam for meal aggregates. The core depends only on this trait.
#[async_trait]
pub trait MealRepository: Send + Sync {
    /// Upsert by meal_id.
    async fn save(&self, meal: &Meal) -> anyhow::Result<Meal>;
    async fn find_by_id(&self, meal_id: Uuid) -> anyhow::Result<Option<Meal>>;
    async fn find_by_status(&self, status: MealStatus, limit: i64) -> anyhow::Result<Vec<Meal>>;
    async fn find_by_date(
        &self,
        date: Date,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> anyhow::Result<Vec<Meal>>;
    async fn find_all_paginated(&self, offset: i64, limit: i64) -> anyhow::Result<Vec<Meal>>;
    async fn count(&self) -> anyhow::Result<i64>;
}

#[derive(Debug, FromRow)]
struct MealRow {
    meal_id: Uuid,
    user_id: Uuid,
    status: String,
    dish_name: Option<String>,
    image: serde_json::Value,
    nutrition: Option<serde_json::Value>,
    raw_ai_response: Option<String>,
    error_message: Option<String>,
    edit_count: i32,
    is_manually_edited: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    ready_at: Option<OffsetDateTime>,
    last_edited_at: Option<OffsetDateTime>,
}

impl MealRow {
    fn into_meal(self) -> anyhow::Result<Meal> {
        let image: MealImage =
            serde_json::from_value(self.image).context("meal row has malformed image JSON")?;
        let nutrition: Option<Nutrition> = self
            .nutrition
            .map(serde_json::from_value)
            .transpose()
            .context("meal row has malformed nutrition JSON")?;
        Ok(Meal {
            meal_id: self.meal_id,
            user_id: self.user_id,
            status: MealStatus::parse(&self.status).map_err(|e| anyhow::anyhow!("{e}"))?,
            dish_name: self.dish_name,
            image,
            nutrition,
            raw_ai_response: self.raw_ai_response,
            error_message: self.error_message,
            edit_count: self.edit_count,
            is_manually_edited: self.is_manually_edited,
            created_at: self.created_at,
            updated_at: self.updated_at,
            ready_at: self.ready_at,
            last_edited_at: self.last_edited_at,
        })
    }
}

const MEAL_COLUMNS: &str = "meal_id, user_id, status, dish_name, image, nutrition, \
     raw_ai_response, error_message, edit_count, is_manually_edited, \
     created_at, updated_at, ready_at, last_edited_at";

#[derive(Clone)]
pub struct PgMealRepository {
    db: PgPool,
}

impl PgMealRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MealRepository for PgMealRepository {
    async fn save(&self, meal: &Meal) -> anyhow::Result<Meal> {
        let image = serde_json::to_value(&meal.image).context("serialize image")?;
        let nutrition = meal
            .nutrition
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .context("serialize nutrition")?;
        sqlx::query(
            r#"
            INSERT INTO meals (meal_id, user_id, status, dish_name, image, nutrition,
                               raw_ai_response, error_message, edit_count, is_manually_edited,
                               created_at, updated_at, ready_at, last_edited_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (meal_id) DO UPDATE SET
                status = EXCLUDED.status,
                dish_name = EXCLUDED.dish_name,
                nutrition = EXCLUDED.nutrition,
                raw_ai_response = EXCLUDED.raw_ai_response,
                error_message = EXCLUDED.error_message,
                edit_count = EXCLUDED.edit_count,
                is_manually_edited = EXCLUDED.is_manually_edited,
                updated_at = EXCLUDED.updated_at,
                ready_at = EXCLUDED.ready_at,
                last_edited_at = EXCLUDED.last_edited_at
            "#,
        )
        .bind(meal.meal_id)
        .bind(meal.user_id)
        .bind(meal.status.as_str())
        .bind(&meal.dish_name)
        .bind(image)
        .bind(nutrition)
        .bind(&meal.raw_ai_response)
        .bind(&meal.error_message)
        .bind(meal.edit_count)
        .bind(meal.is_manually_edited)
        .bind(meal.created_at)
        .bind(meal.updated_at)
        .bind(meal.ready_at)
        .bind(meal.last_edited_at)
        .execute(&self.db)
        .await
        .context("upsert meal")?;
        Ok(meal.clone())
    }

    async fn find_by_id(&self, meal_id: Uuid) -> anyhow::Result<Option<Meal>> {
        let row = sqlx::query_as::<_, MealRow>(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE meal_id = $1"
        ))
        .bind(meal_id)
        .fetch_optional(&self.db)
        .await
        .context("select meal by id")?;
        row.map(MealRow::into_meal).transpose()
    }

    async fn find_by_status(&self, status: MealStatus, limit: i64) -> anyhow::Result<Vec<Meal>> {
        let rows = sqlx::query_as::<_, MealRow>(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE status = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("select meals by status")?;
        rows.into_iter().map(MealRow::into_meal).collect()
    }

    async fn find_by_date(
        &self,
        date: Date,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> anyhow::Result<Vec<Meal>> {
        let rows = sqlx::query_as::<_, MealRow>(&format!(
            r#"
            SELECT {MEAL_COLUMNS} FROM meals
            WHERE created_at::date = $1
              AND ($2::uuid IS NULL OR user_id = $2)
            ORDER BY created_at ASC
            LIMIT $3
            "#
        ))
        .bind(date)
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("select meals by date")?;
        rows.into_iter().map(MealRow::into_meal).collect()
    }

    async fn find_all_paginated(&self, offset: i64, limit: i64) -> anyhow::Result<Vec<Meal>> {
        let rows = sqlx::query_as::<_, MealRow>(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("select meals paginated")?;
        rows.into_iter().map(MealRow::into_meal).collect()
    }

    async fn count(&self) -> anyhow::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM meals")
            .fetch_one(&self.db)
            .await
            .context("count meals")?;
        Ok(count)
    }
}
