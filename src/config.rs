use serde::Deserialize;

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub storage: StorageConfig,
    pub vision: VisionConfig,
    pub usda_api_key: Option<String>,
    pub similarity_url: Option<String>,
    pub similarity_min_score: f64,
    pub translation_lang: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT")?,
            bucket: std::env::var("S3_BUCKET")?,
            access_key: std::env::var("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY")?,
            region: env_opt("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
        };
        let vision = VisionConfig {
            api_key: std::env::var("VISION_API_KEY")?,
            base_url: env_opt("VISION_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".into()),
            model: env_opt("VISION_MODEL").unwrap_or_else(|| "gpt-4o".into()),
        };
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")?,
            storage,
            vision,
            usda_api_key: env_opt("USDA_API_KEY"),
            similarity_url: env_opt("SIMILARITY_URL"),
            similarity_min_score: env_opt("SIMILARITY_MIN_SCORE")
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(0.6),
            translation_lang: env_opt("TRANSLATION_LANG"),
        })
    }
}
