/// Ranks dining halls for a query (or overall, with no query) using generative models.
///
/// Backends form an ordered chain: every configured Gemini model, then the OpenAI-compatible
/// backup. Each attempt covers the call, the parse and the merge; any failure moves on to
/// the next backend. When the chain runs out the request fails rather than returning
/// unranked data.
use std::sync::Arc;

use async_trait::async_trait;
use dining_common::error::LlmClientError;
use dining_common::gemini::{GeminiClient, GeminiClientConfig};
use dining_common::openai::{ChatCompletionRequest, Message, OpenAiClient, OpenAiClientConfig};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::MenuCache;
use crate::error::AppError;
use crate::images::{hall_image, ImageLookup};
use crate::menu::{normalize_date, MenuService};
use crate::merge::{merge_rankings, RankingMode};
use crate::model::{DiningHall, RankedHall};
use crate::parser::parse_ranking;

const JSON_ONLY_SYSTEM_PROMPT: &str = "You are a helpful assistant that returns valid JSON only. \
Never wrap the JSON in markdown code blocks and never add explanations.";
const BACKUP_TEMPERATURE: f32 = 0.7;
const BACKUP_MAX_TOKENS: u32 = 2000;

#[async_trait]
pub trait RankingBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, LlmClientError>;
}

pub struct GeminiBackend {
    client: Arc<GeminiClient>,
    model: String,
    label: String,
}

impl GeminiBackend {
    pub fn new(client: Arc<GeminiClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
            label: format!("gemini:{model}"),
        }
    }
}

#[async_trait]
impl RankingBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmClientError> {
        self.client.generate_text(&self.model, prompt).await
    }
}

pub struct OpenAiBackend {
    client: OpenAiClient,
    label: String,
}

impl OpenAiBackend {
    pub fn new(client: OpenAiClient) -> Self {
        let label = format!("openai:{}", client.config().model);
        Self { client, label }
    }
}

#[async_trait]
impl RankingBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmClientError> {
        let request = ChatCompletionRequest {
            model: self.client.config().model.clone(),
            messages: vec![Message::system(JSON_ONLY_SYSTEM_PROMPT), Message::user(prompt)],
            temperature: Some(BACKUP_TEMPERATURE),
            max_tokens: Some(BACKUP_MAX_TOKENS),
        };
        let response = self.client.chat_completions(&request).await?;
        response
            .text()
            .map(str::to_string)
            .ok_or(LlmClientError::EmptyCompletion)
    }
}

/// The backend chain for the configured credentials. Backends without a key are left out.
pub fn build_backends(
    gemini: GeminiClientConfig,
    openai: OpenAiClientConfig,
) -> Result<Vec<Box<dyn RankingBackend>>, AppError> {
    let mut backends: Vec<Box<dyn RankingBackend>> = Vec::new();

    if gemini.api_key.is_some() {
        let models = gemini.models.clone();
        let client = Arc::new(GeminiClient::new(gemini)?);
        for model in &models {
            backends.push(Box::new(GeminiBackend::new(Arc::clone(&client), model)));
        }
    } else {
        info!("GEMINI_API_KEY not set, gemini ranking disabled");
    }

    if openai.api_key.is_some() {
        backends.push(Box::new(OpenAiBackend::new(OpenAiClient::new(openai)?)));
    } else {
        info!("OPENAI_API_KEY not set, openai ranking backup disabled");
    }

    Ok(backends)
}

fn menu_json(halls: &[DiningHall]) -> Result<String, AppError> {
    serde_json::to_string_pretty(halls).map_err(|e| AppError::Llm(e.into()))
}

pub fn targeted_prompt(query: &str, halls: &[DiningHall]) -> Result<String, AppError> {
    let menu = menu_json(halls)?;
    Ok(format!(
        r#"You are a helpful assistant that ranks Stanford dining halls based on user preferences.

User query: "{query}"

Available dining halls and their current menu items:
{menu}

Analyze the user's query and rank the dining halls from best to worst match. For each dining hall, provide:
1. A relevance score from 1-10
2. A brief reason explaining why it matches (or doesn't match) the query
3. Only the food items that are relevant to the query, each with a relevanceScore from 1-10

Return your response as a JSON array in exactly this format:
[
  {{
    "name": "Dining Hall Name",
    "foodItems": [
      {{"name": "Food Item Name", "allergens": ["allergen1", "allergen2"], "relevanceScore": 8}}
    ],
    "score": 9,
    "reason": "Brief explanation of why this dining hall matches the query",
    "bestFoodItem": "Name of the most relevant food item"
  }}
]

Important:
- Only include dining halls that have at least one relevant food item
- Order them from highest score to lowest
- Use the dining hall and food item names exactly as given
- Return ONLY valid JSON, no markdown code blocks, no text before or after"#
    ))
}

pub fn general_prompt(meal: &str, halls: &[DiningHall]) -> Result<String, AppError> {
    let menu = menu_json(halls)?;
    Ok(format!(
        r#"You are a helpful assistant that ranks Stanford dining halls by overall quality, variety, and appeal.

Meal: {meal}

Available dining halls and their current menu items:
{menu}

Rank all dining halls from best to worst based on:
1. Variety and quality of food options
2. Appeal and popularity of menu items
3. Any standout or unique items

For each dining hall, provide:
1. A quality score from 1-10
2. A brief reason explaining its position
3. All of its food items (do not filter)

Return your response as a JSON array in exactly this format:
[
  {{
    "name": "Dining Hall Name",
    "foodItems": [
      {{"name": "Food Item Name", "allergens": ["allergen1", "allergen2"]}}
    ],
    "score": 9,
    "reason": "Brief explanation of why this dining hall ranks well",
    "bestFoodItem": "Name of the most appealing food item"
  }}
]

Important:
- Include ALL dining halls that have menu items
- Order them from highest score to lowest
- Use the dining hall and food item names exactly as given
- Return ONLY valid JSON, no markdown code blocks, no text before or after"#
    ))
}

pub struct RankingService {
    menu: MenuService,
    cache: Arc<MenuCache>,
    backends: Vec<Box<dyn RankingBackend>>,
    images: Arc<dyn ImageLookup>,
}

impl RankingService {
    pub fn new(
        menu: MenuService,
        cache: Arc<MenuCache>,
        backends: Vec<Box<dyn RankingBackend>>,
        images: Arc<dyn ImageLookup>,
    ) -> Self {
        Self {
            menu,
            cache,
            backends,
            images,
        }
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Rank the halls serving `meal` on `date`. A blank query ranks by overall quality.
    pub async fn rank_halls(
        &self,
        query: Option<&str>,
        meal: &str,
        date: &str,
    ) -> Result<Vec<RankedHall>, AppError> {
        let halls = self.cached_menu(meal, date).await?;
        if halls.is_empty() {
            debug!(meal, date, "nothing served, skipping ranking");
            return Ok(Vec::new());
        }

        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let (mode, prompt) = match query {
            Some(q) => (RankingMode::Targeted, targeted_prompt(q, &halls)?),
            None => (RankingMode::General, general_prompt(meal, &halls)?),
        };

        let mut failures = Vec::new();
        for backend in &self.backends {
            match attempt(backend.as_ref(), &prompt, &halls, mode).await {
                Ok(ranked) => {
                    info!(backend = backend.name(), halls = ranked.len(), ?mode, "ranking complete");
                    return Ok(self.attach_images(ranked).await);
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "ranking backend failed, trying next");
                    failures.push(format!("{}: {e}", backend.name()));
                }
            }
        }

        if failures.is_empty() {
            return Err(AppError::RankingUnavailable(
                "no ranking backends configured".to_string(),
            ));
        }
        Err(AppError::RankingUnavailable(failures.join("; ")))
    }

    async fn cached_menu(&self, meal: &str, date: &str) -> Result<Vec<DiningHall>, AppError> {
        let date = normalize_date(date)?;
        if let Some(halls) = self.cache.get(meal, &date).await {
            return Ok(halls);
        }
        let halls = self.menu.get_menu(&date, meal).await?;
        self.cache.put(meal, &date, &halls).await;
        Ok(halls)
    }

    async fn attach_images(&self, mut ranked: Vec<RankedHall>) -> Vec<RankedHall> {
        let lookups = ranked.iter().map(|hall| {
            hall_image(
                self.images.as_ref(),
                hall.best_food_item_name.as_deref(),
                &hall.name,
            )
        });
        let images = join_all(lookups).await;
        for (hall, image) in ranked.iter_mut().zip(images) {
            hall.image = image;
        }
        ranked
    }
}

async fn attempt(
    backend: &dyn RankingBackend,
    prompt: &str,
    halls: &[DiningHall],
    mode: RankingMode,
) -> Result<Vec<RankedHall>, AppError> {
    let text = backend.complete(prompt).await?;
    let parsed = parse_ranking(&text)?;
    merge_rankings(parsed, halls, mode)
}
