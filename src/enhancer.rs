//! Optional AI rewrite of a scraped article.
//!
//! The enhancer asks the model for an SEO title, a full rewrite of the body,
//! a handful of keywords and a meta description, all in one JSON reply. Any
//! failure along the way leaves the article exactly as it was.

use crate::api::AskAsync;
use crate::models::{ArticleRecord, Enhancement};
use crate::utils::truncate_for_log;
use serde::Deserialize;
use tracing::{info, instrument, warn};

/// Reply shape requested from the model. Every field is optional so a
/// partial reply still applies what it has.
#[derive(Debug, Default, Deserialize)]
struct EnhancedFields {
    #[serde(default)]
    seo_title: Option<String>,
    #[serde(default)]
    enhanced_text: Option<String>,
    #[serde(default)]
    seo_keywords: Vec<String>,
    #[serde(default)]
    meta_description: Option<String>,
}

pub struct Enhancer<A> {
    model: Option<A>,
}

impl<A> Enhancer<A>
where
    A: AskAsync<Response = String>,
{
    /// `None` disables enhancement; [`Enhancer::enhance`] then returns its input.
    pub fn new(model: Option<A>) -> Self {
        Self { model }
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    #[instrument(level = "info", skip_all, fields(url = %article.url()))]
    pub async fn enhance(&self, article: ArticleRecord) -> ArticleRecord {
        let Some(model) = &self.model else {
            return article;
        };

        let prompt = build_prompt(&article.title, article.body_text());
        let reply = match model.ask(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Enhancement call failed; keeping original article");
                return article;
            }
        };

        let fields: EnhancedFields = match serde_json::from_str(strip_code_fences(&reply)) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(
                    error = %e,
                    response_preview = %truncate_for_log(&reply, 300),
                    "Model returned non-conforming JSON; keeping original article"
                );
                return article;
            }
        };

        let enhancement = Enhancement {
            title: non_blank(fields.seo_title).unwrap_or_else(|| article.title.clone()),
            body_text: non_blank(fields.enhanced_text)
                .unwrap_or_else(|| article.body_text().to_string()),
            keywords: fields
                .seo_keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            meta_description: fields
                .meta_description
                .map(|m| m.trim().to_string())
                .unwrap_or_default(),
        };

        let mut article = article;
        let before = article.word_count();
        article.apply_enhancement(enhancement);
        info!(
            title = %truncate_for_log(&article.title, 60),
            words_before = before,
            words_after = article.word_count(),
            "Article enhanced"
        );
        article
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Remove a surrounding Markdown code fence (```` ```json ```` or ```` ``` ````).
pub fn strip_code_fences(reply: &str) -> &str {
    let mut s = reply.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Editor instruction sent with the original title and body.
pub fn build_prompt(title: &str, body: &str) -> String {
    format!(
        r#"You are an expert tech news editor and SEO specialist, writing for an audience passionate about AI, technology, and gadgets.
Given the following news article title and text:

Original Title: "{title}"
Original Text:
"{body}"

Perform the following tasks and reply ONLY with a valid JSON object:
1. Rewrite the title to be engaging and SEO-friendly for tech enthusiasts (max 12 words, ideally 7-10). It must accurately reflect the content. Key: "seo_title".
2. Rewrite the entire article text for a tech-savvy audience.
   - Improve clarity, flow and readability and correct grammatical errors.
   - Preserve ALL key factual information and main points.
   - Do NOT mention the original news source, its website, or any of its branding.
   - Keep a professional, informative tone and avoid repetition.
   Key: "enhanced_text".
3. Generate 5 to 7 relevant SEO keywords (a list of strings) for AI, technology and gadget searches. Key: "seo_keywords".
4. Write a meta description of around 150-160 characters summarising the key points. Key: "meta_description".

JSON output structure:
{{"seo_title": "...", "enhanced_text": "...", "seo_keywords": ["...", "..."], "meta_description": "..."}}"#
    )
}
