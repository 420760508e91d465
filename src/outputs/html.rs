//! HTML rendering of a combined post.
//!
//! The layout is fixed and inline-styled so it renders the same in any
//! Blogger theme:
//!
//! ```text
//! h1 title
//! top image
//! up to two extra images (shuffled)
//! overview box ("Tech Highlight" or "Introduction")
//! related video embed
//! per article: "In-Depth Report" heading, paragraphs, attribution
//! disclaimer with the total word count
//! ```
//!
//! Rendering is pure. The only nondeterminism is the order of the extra
//! images, which comes from the caller-supplied RNG.

use crate::models::{AggregationBatch, ArticleRecord, RelatedVideo};
use crate::utils::escape_html;
use rand::Rng;
use rand::seq::SliceRandom;

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];
const IMAGE_NOISE: [&str; 4] = ["icon", "logo", "avatar", "spinner"];
const MAX_EXTRA_IMAGES: usize = 2;

/// Lines shorter than this (after trimming) are not rendered as paragraphs.
const MIN_PARAGRAPH_CHARS: usize = 15;
const DROP_CAP_MIN_CHARS: usize = 70;
const META_DESCRIPTION_MIN_CHARS: usize = 70;
const SUMMARY_MIN_CHARS: usize = 100;

const PARAGRAPH_STYLE: &str = "line-height:1.75; font-size:1.1em; margin-bottom:1.2em; color:#34495e;";

const PLACEHOLDER: &str =
    "<p><em>Detailed textual content for this section was not available or was minimal.</em></p>\n";

/// Render `batch` with the thread-local RNG.
pub fn compose_post(batch: &AggregationBatch, video: Option<&RelatedVideo>) -> String {
    compose(batch, video, &mut rand::rng())
}

/// Render `batch` as a post body.
pub fn compose<R: Rng + ?Sized>(
    batch: &AggregationBatch,
    video: Option<&RelatedVideo>,
    rng: &mut R,
) -> String {
    let primary = batch.primary();
    let title = escape_html(&primary.title);
    let mut html = format!(
        "<h1 style='text-align:center; margin-bottom:25px; font-size:2.2em; color:#2c3e50;'>{title}</h1>\n"
    );

    if let Some(top) = &primary.top_image_url {
        html.push_str(&format!(
            "<div style=\"text-align:center; margin-bottom:20px;\"><img src=\"{}\" alt=\"{title}\" style=\"max-width:90%;height:auto;border-radius:8px;box-shadow: 0 4px 8px rgba(0,0,0,0.1);\"></div>\n",
            escape_html(top)
        ));
    }

    let extras: String = extra_images(primary, rng)
        .into_iter()
        .map(|src| {
            format!(
                "<div style=\"text-align:center; margin: 15px auto;\"><img src=\"{}\" alt=\"Related image for {title}\" style=\"max-width:75%;height:auto;border-radius:6px;box-shadow: 0 2px 4px rgba(0,0,0,0.08);\"></div>\n",
                escape_html(src)
            )
        })
        .collect();
    if !extras.is_empty() {
        html.push_str(&format!(
            "<div class='additional-images-section' style='margin-bottom:25px;'>{extras}</div>"
        ));
    }

    if let Some((label, text)) = overview(primary) {
        let paragraphs: String = text
            .split('\n')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                format!(
                    "<p style='font-size:1.15em; line-height:1.65; color:#34495e;'>{}</p>",
                    escape_html(p)
                )
            })
            .collect();
        if !paragraphs.is_empty() {
            html.push_str(&format!(
                "<div style='padding:20px; background-color:#f0f4f8; border-left: 5px solid #007bff; margin-bottom:30px; border-radius:5px;'>\n<h3 style='margin-top:0; color:#0056b3; font-size:1.4em;'>{label}</h3>\n{paragraphs}\n</div>"
            ));
        }
    }

    if let Some(video) = video {
        html.push_str(&video_block(video));
    }

    let multi = batch.len() > 1;
    for (i, article) in batch.articles().iter().enumerate() {
        html.push_str(&section(i, article, &primary.title, multi));
    }

    html.push_str("<hr style='margin-top:40px; margin-bottom:20px; border:0; border-top:1px solid #bdc3c7;'>");
    html.push_str(&format!(
        "<p style='font-size:0.9em; color:#95a5a6; text-align:center;'><em>Disclaimer: This content is automatically curated and significantly enhanced by AI for thematic focus and readability. It is compiled from various online news reports for comprehensiveness. While efforts are made for accuracy, information can change rapidly. This post contains approximately {} words.</em></p>",
        batch.total_words()
    ));

    html
}

/// Up to [`MAX_EXTRA_IMAGES`] image URLs other than the top image, in random order.
fn extra_images<'a, R: Rng + ?Sized>(article: &'a ArticleRecord, rng: &mut R) -> Vec<&'a str> {
    let mut candidates: Vec<&str> = article
        .all_image_urls
        .iter()
        .map(String::as_str)
        .filter(|url| article.top_image_url.as_deref() != Some(*url))
        .filter(|url| {
            let lower = url.to_lowercase();
            IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        })
        .collect();
    candidates.shuffle(rng);
    candidates
        .into_iter()
        .filter(|url| {
            let lower = url.to_lowercase();
            !IMAGE_NOISE.iter().any(|noise| lower.contains(noise))
        })
        .take(MAX_EXTRA_IMAGES)
        .collect()
}

/// Overview label and text: the meta description, then the summary, then the
/// first body paragraph.
fn overview(article: &ArticleRecord) -> Option<(&'static str, &str)> {
    if article.ai_meta_description.chars().count() > META_DESCRIPTION_MIN_CHARS {
        return Some(("Tech Highlight", &article.ai_meta_description));
    }
    if article.summary.chars().count() > SUMMARY_MIN_CHARS {
        return Some(("Tech Highlight", &article.summary));
    }
    let first = article.body_text().split('\n').next().unwrap_or_default().trim();
    (first.chars().count() > SUMMARY_MIN_CHARS).then_some(("Introduction", first))
}

fn video_block(video: &RelatedVideo) -> String {
    format!(
        r#"
        <h3 style="margin-top: 30px; margin-bottom:10px; color:#2c3e50; font-size:1.4em;">Related Video: {title}</h3>
        <div class="video-container" style="position: relative; padding-bottom: 56.25%; height: 0; overflow: hidden; max-width: 100%; background: #000; margin-bottom:30px; border-radius:8px; box-shadow: 0 4px 8px rgba(0,0,0,0.1);">
            <iframe style="position: absolute; top: 0; left: 0; width: 100%; height: 100%;"
                    src="https://www.youtube.com/embed/{id}"
                    frameborder="0" allow="accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture" allowfullscreen>
            </iframe>
        </div>
"#,
        title = escape_html(&video.title),
        id = urlencoding::encode(&video.video_id),
    )
}

fn section(index: usize, article: &ArticleRecord, main_title: &str, multi: bool) -> String {
    let mut heading = String::from("In-Depth Report");
    if multi {
        heading.push_str(&format!(": Part {}", index + 1));
        heading.push_str(if index == 0 {
            " (Primary Analysis)"
        } else {
            " (Supporting Details)"
        });
    }
    let mut html = format!(
        "<h2 style='margin-top: 35px; border-bottom: 3px solid #3498db; padding-bottom: 10px; color:#2980b9; font-size:1.8em;'>{heading}</h2>\n"
    );

    if index > 0 && article.title.to_lowercase() != main_title.to_lowercase() {
        html.push_str(&format!(
            "<h4 style='color:#555; margin-bottom:15px; font-style:italic; font-size:1.2em;'>Focus: {}</h4>\n",
            escape_html(&article.title)
        ));
    }

    let paragraphs: Vec<&str> = article
        .body_text()
        .split('\n')
        .map(str::trim)
        .filter(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
        .collect();

    if paragraphs.is_empty() {
        html.push_str(PLACEHOLDER);
    }
    for (para_idx, para) in paragraphs.iter().enumerate() {
        let mut chars = para.chars();
        match chars.next() {
            Some(first) if index == 0 && para_idx == 0 && para.chars().count() > DROP_CAP_MIN_CHARS => {
                html.push_str(&format!(
                    "<p style=\"{PARAGRAPH_STYLE}\"><span style=\"float:left; font-size:3.5em; line-height:0.8em; margin-right:0.07em; margin-top:0.1em; font-weight:bold; color:#3498db;\">{}</span>{}</p>\n",
                    escape_html(&first.to_string()),
                    escape_html(chars.as_str())
                ));
            }
            _ => html.push_str(&format!("<p style='{PARAGRAPH_STYLE}'>{}</p>\n", escape_html(para))),
        }
    }

    let mut meta = String::new();
    if !article.authors.is_empty() {
        meta.push_str(&format!(
            "<strong>Author(s) (Original Source):</strong> {}<br>",
            escape_html(&article.authors.join(", "))
        ));
    }
    if let Some(date) = article.publish_date {
        meta.push_str(&format!("<strong>Original Publish Date:</strong> {date}<br>"));
    }
    if !meta.is_empty() {
        html.push_str(&format!(
            "<div style='font-size:0.9em; color:#7f8c8d; margin-top:20px; padding:12px; border:1px solid #ecf0f1; background-color:#fdfefe; border-radius:4px;'>{meta}</div>\n"
        ));
    }

    html
}
