use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::nutrition::Nutrition;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealStatus {
    Processing,
    Analyzing,
    Enriching,
    Ready,
    Failed,
    Inactive,
}

impl MealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealStatus::Processing => "processing",
            MealStatus::Analyzing => "analyzing",
            MealStatus::Enriching => "enriching",
            MealStatus::Ready => "ready",
            MealStatus::Failed => "failed",
            MealStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "processing" => Ok(MealStatus::Processing),
            "analyzing" => Ok(MealStatus::Analyzing),
            "enriching" => Ok(MealStatus::Enriching),
            "ready" => Ok(MealStatus::Ready),
            "failed" => Ok(MealStatus::Failed),
            "inactive" => Ok(MealStatus::Inactive),
            other => Err(CoreError::validation(format!("unknown meal status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn from_content_type(ct: &str) -> Option<Self> {
        match ct {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

}

/// Reference to the stored photo; immutable once created, owned 1:1 by a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealImage {
    pub image_id: String,
    pub format: ImageFormat,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl MealImage {
    pub fn new(image_id: impl Into<String>, format: ImageFormat, size_bytes: u64) -> CoreResult<Self> {
        if size_bytes == 0 {
            return Err(CoreError::validation("image size_bytes must be > 0"));
        }
        Ok(Self {
            image_id: image_id.into(),
            format,
            size_bytes,
            width: None,
            height: None,
            url: None,
        })
    }
}

/// The meal aggregate. Every transition is a named method returning a fresh
/// instance, so in-flight references never observe partial updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meal {
    pub meal_id: Uuid,
    pub user_id: Uuid,
    pub status: MealStatus,
    pub dish_name: Option<String>,
    pub image: MealImage,
    pub nutrition: Option<Nutrition>,
    pub raw_ai_response: Option<String>,
    pub error_message: Option<String>,
    pub edit_count: i32,
    pub is_manually_edited: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub ready_at: Option<OffsetDateTime>,
    pub last_edited_at: Option<OffsetDateTime>,
}

impl Meal {
    pub fn new(user_id: Uuid, image: MealImage) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            meal_id: Uuid::new_v4(),
            user_id,
            status: MealStatus::Processing,
            dish_name: None,
            image,
            nutrition: None,
            raw_ai_response: None,
            error_message: None,
            edit_count: 0,
            is_manually_edited: false,
            created_at: now,
            updated_at: now,
            ready_at: None,
            last_edited_at: None,
        }
    }

    fn touched(&self) -> Self {
        let mut next = self.clone();
        next.updated_at = OffsetDateTime::now_utc();
        next
    }

    /// PROCESSING -> ANALYZING, entered when the vision call is about to go out.
    pub fn start_analysis(&self) -> CoreResult<Self> {
        if self.status != MealStatus::Processing {
            return Err(CoreError::validation(format!(
                "meal must be in PROCESSING status to start analysis, was {}",
                self.status.as_str()
            )));
        }
        let mut next = self.touched();
        next.status = MealStatus::Analyzing;
        Ok(next)
    }

    /// READY/FAILED -> ANALYZING, used by explicit re-analysis with extra context.
    pub fn restart_analysis(&self) -> CoreResult<Self> {
        if !matches!(self.status, MealStatus::Ready | MealStatus::Failed) {
            return Err(CoreError::validation(format!(
                "meal must be in READY or FAILED status to re-analyze, was {}",
                self.status.as_str()
            )));
        }
        let mut next = self.touched();
        next.status = MealStatus::Analyzing;
        next.error_message = None;
        Ok(next)
    }

    /// ANALYZING -> ENRICHING, while parsed items are cross-checked against
    /// trusted nutrition sources.
    pub fn start_enrichment(&self) -> CoreResult<Self> {
        if self.status != MealStatus::Analyzing {
            return Err(CoreError::validation(format!(
                "meal must be in ANALYZING status to start enrichment, was {}",
                self.status.as_str()
            )));
        }
        let mut next = self.touched();
        next.status = MealStatus::Enriching;
        Ok(next)
    }

    /// ANALYZING|ENRICHING -> READY. Requires the analyzed nutrition.
    pub fn mark_ready(
        &self,
        dish_name: Option<String>,
        nutrition: Nutrition,
        raw_ai_response: Option<String>,
    ) -> CoreResult<Self> {
        if !matches!(self.status, MealStatus::Analyzing | MealStatus::Enriching) {
            return Err(CoreError::validation(format!(
                "meal must be in ANALYZING or ENRICHING status to be marked ready, was {}",
                self.status.as_str()
            )));
        }
        let mut next = self.touched();
        next.status = MealStatus::Ready;
        next.dish_name = dish_name;
        next.nutrition = Some(nutrition);
        if raw_ai_response.is_some() {
            next.raw_ai_response = raw_ai_response;
        }
        next.error_message = None;
        next.ready_at = Some(next.updated_at);
        Ok(next)
    }

    /// ANALYZING|ENRICHING -> FAILED. Terminal, keeps the diagnostic message.
    pub fn mark_failed(&self, error_message: impl Into<String>) -> CoreResult<Self> {
        let error_message = error_message.into();
        if error_message.trim().is_empty() {
            return Err(CoreError::validation("error_message must be non-empty"));
        }
        if !matches!(self.status, MealStatus::Analyzing | MealStatus::Enriching) {
            return Err(CoreError::validation(format!(
                "meal must be in ANALYZING or ENRICHING status to be marked failed, was {}",
                self.status.as_str()
            )));
        }
        let mut next = self.touched();
        next.status = MealStatus::Failed;
        next.error_message = Some(error_message);
        Ok(next)
    }

    /// READY -> READY with the edited item list and rebuilt totals.
    pub fn apply_edit(&self, nutrition: Nutrition) -> CoreResult<Self> {
        if self.status != MealStatus::Ready {
            return Err(CoreError::validation("must be in READY status to edit"));
        }
        let mut next = self.touched();
        next.nutrition = Some(nutrition);
        next.edit_count += 1;
        next.is_manually_edited = true;
        next.last_edited_at = Some(next.updated_at);
        Ok(next)
    }

    /// Soft delete; valid from any state, terminal.
    pub fn mark_inactive(&self) -> Self {
        let mut next = self.touched();
        next.status = MealStatus::Inactive;
        next
    }
}
