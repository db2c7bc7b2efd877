/// Representative images for ranked halls. Best effort: a miss is `None`, never an error.
use async_trait::async_trait;

#[async_trait]
pub trait ImageLookup: Send + Sync {
    async fn image_for(&self, name: &str) -> Option<String>;
}

const UNSPLASH_FEATURED: &str = "https://source.unsplash.com/featured/400x300/";

/// Featured-image URLs built from the first few words of a dish or hall name.
#[derive(Debug, Default, Clone)]
pub struct UnsplashImages;

#[async_trait]
impl ImageLookup for UnsplashImages {
    async fn image_for(&self, name: &str) -> Option<String> {
        let terms = search_terms(name)?;
        Some(format!("{UNSPLASH_FEATURED}?{terms},food,meal"))
    }
}

/// Lowercase alphanumeric words, at most three, joined with `%20`.
fn search_terms(name: &str) -> Option<String> {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().take(3).collect();
    if words.is_empty() {
        return None;
    }
    Some(words.join("%20"))
}

/// Try the best item first, then the hall itself.
pub async fn hall_image(images: &dyn ImageLookup, best_item: Option<&str>, hall: &str) -> Option<String> {
    if let Some(item) = best_item.filter(|s| !s.trim().is_empty()) {
        if let Some(url) = images.image_for(item).await {
            return Some(url);
        }
    }
    images.image_for(hall).await
}
