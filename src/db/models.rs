//! Database models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Blog post row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub summary: String,
    pub published: bool,
    pub views: i64,
    pub category_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Category row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Tag row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Comment row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub author: String,
    pub body: String,
    pub post_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Admin account row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

lazy_static! {
    static ref MARKUP_TAG: Regex = Regex::new(r"<[^>]+>").unwrap();

    /// Character budget for auto-derived summaries
    pub static ref SUMMARY_LENGTH: usize = std::env::var("POST_SUMMARY_LENGTH")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|n| *n > 3)
        .unwrap_or(200);
}

/// Derive a plain-text summary from an HTML-capable body.
///
/// Markup is stripped and the result is capped at the configured budget,
/// counting the `...` truncation marker toward the cap.
pub fn generate_summary(body: &str) -> String {
    let text = MARKUP_TAG.replace_all(body, "");
    let text = text.trim();

    let budget = *SUMMARY_LENGTH;
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= budget {
        return text.to_string();
    }

    let mut summary: String = chars[..budget - 3].iter().collect();
    summary.push_str("...");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_strips_markup() {
        assert_eq!(generate_summary("<p>Hi there</p>"), "Hi there");
        assert_eq!(
            generate_summary("<h1 class=\"x\">Title</h1> and <em>emphasis</em>"),
            "Title and emphasis"
        );
    }

    #[test]
    fn test_summary_short_body_passes_through() {
        assert_eq!(generate_summary("plain text"), "plain text");
    }

    #[test]
    fn test_summary_never_exceeds_budget() {
        let long = "word ".repeat(200);
        let summary = generate_summary(&long);
        assert!(summary.chars().count() <= *SUMMARY_LENGTH);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_summary_contains_no_markup() {
        let body = "<div><p>one</p><p>two</p></div>".repeat(50);
        let summary = generate_summary(&body);
        assert!(!summary.contains('<'));
        assert!(!summary.contains('>'));
    }

    #[test]
    fn test_summary_counts_characters_not_bytes() {
        let long = "日本語テキスト".repeat(100);
        let summary = generate_summary(&long);
        assert!(summary.chars().count() <= *SUMMARY_LENGTH);
    }

    #[test]
    fn test_summary_nonempty_for_text_body() {
        assert!(!generate_summary("<p>x</p>").is_empty());
    }
}
