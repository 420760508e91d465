//! Command-line interface definitions for the autoposter.
//!
//! Every option can also come from the environment. Values given here
//! override the matching keys of the YAML config file.

use crate::config::{BotConfig, LlmConfig};
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the tech news autoposter.
///
/// # Examples
///
/// ```sh
/// # Run the posting loop with a config file
/// tech_news_autoposter --config bot.yaml
///
/// # Post once and exit, overriding the blog
/// tech_news_autoposter --config bot.yaml --blog-id 1442443742033959520 --once
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to the bot's YAML config file
    #[arg(short, long, env = "AUTOPOSTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// File holding one already-published URL per line
    #[arg(short, long, env = "AUTOPOSTER_LEDGER", default_value = "posted_urls.txt")]
    pub ledger: PathBuf,

    /// Stored Blogger OAuth token
    #[arg(short, long, env = "AUTOPOSTER_TOKEN_FILE", default_value = "token.json")]
    pub token_file: PathBuf,

    /// Target Blogger blog ID
    #[arg(short, long, env = "BLOGGER_BLOG_ID")]
    pub blog_id: Option<String>,

    /// YouTube Data API key for related videos
    #[arg(long, env = "YOUTUBE_API_KEY")]
    pub youtube_api_key: Option<String>,

    /// API key for the OpenAI-compatible rewriting endpoint
    #[arg(long, env = "LLM_API_KEY")]
    pub llm_api_key: Option<String>,

    /// OAuth client ID used when refreshing the Blogger token
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    /// OAuth client secret used when refreshing the Blogger token
    #[arg(long, env = "GOOGLE_CLIENT_SECRET")]
    pub google_client_secret: Option<String>,

    /// Run a single iteration and exit
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    /// Apply command-line and environment values on top of `config`.
    pub fn overlay(&self, mut config: BotConfig) -> BotConfig {
        if let Some(blog_id) = non_blank(&self.blog_id) {
            config.blog_id = blog_id;
        }
        if let Some(key) = non_blank(&self.youtube_api_key) {
            config.youtube_api_key = Some(key);
        }
        if let Some(key) = non_blank(&self.llm_api_key) {
            match config.llm.as_mut() {
                Some(llm) => llm.api_key = key,
                None => config.llm = Some(LlmConfig::new(key)),
            }
        }
        config
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["tech_news_autoposter"]);
        assert_eq!(cli.ledger, PathBuf::from("posted_urls.txt"));
        assert_eq!(cli.token_file, PathBuf::from("token.json"));
        assert!(!cli.once);
    }

    #[test]
    fn test_cli_all_options() {
        let cli = Cli::parse_from([
            "tech_news_autoposter",
            "--config",
            "bot.yaml",
            "--ledger",
            "/var/lib/bot/posted.txt",
            "--token-file",
            "/var/lib/bot/token.json",
            "--blog-id",
            "42",
            "--youtube-api-key",
            "yt",
            "--llm-api-key",
            "sk",
            "--google-client-id",
            "cid",
            "--google-client-secret",
            "secret",
            "--once",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("bot.yaml")));
        assert_eq!(cli.ledger, PathBuf::from("/var/lib/bot/posted.txt"));
        assert_eq!(cli.token_file, PathBuf::from("/var/lib/bot/token.json"));
        assert_eq!(cli.blog_id.as_deref(), Some("42"));
        assert_eq!(cli.google_client_id.as_deref(), Some("cid"));
        assert_eq!(cli.google_client_secret.as_deref(), Some("secret"));
        assert!(cli.once);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["tech_news_autoposter", "-c", "c.yaml", "-l", "l.txt", "-t", "t.json", "-b", "7"]);
        assert_eq!(cli.config, Some(PathBuf::from("c.yaml")));
        assert_eq!(cli.ledger, PathBuf::from("l.txt"));
        assert_eq!(cli.token_file, PathBuf::from("t.json"));
        assert_eq!(cli.blog_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_overlay_replaces_config_values() {
        let cli = Cli::parse_from([
            "tech_news_autoposter",
            "--blog-id",
            "42",
            "--youtube-api-key",
            "yt",
            "--llm-api-key",
            "sk-cli",
        ]);
        let config = cli.overlay(BotConfig::default());
        assert_eq!(config.blog_id, "42");
        assert_eq!(config.youtube_api_key.as_deref(), Some("yt"));
        assert_eq!(config.llm, Some(LlmConfig::new("sk-cli")));
    }

    #[test]
    fn test_overlay_keeps_llm_endpoint_and_ignores_blanks() {
        let base = BotConfig {
            blog_id: "from-file".into(),
            llm: Some(LlmConfig {
                api_base: "http://localhost:8080/v1".into(),
                api_key: "sk-file".into(),
                model: "local".into(),
            }),
            ..Default::default()
        };
        let cli = Cli::parse_from(["tech_news_autoposter", "--blog-id", "  ", "--llm-api-key", "sk-cli"]);
        let config = cli.overlay(base);
        assert_eq!(config.blog_id, "from-file");
        let llm = config.llm.unwrap();
        assert_eq!(llm.api_base, "http://localhost:8080/v1");
        assert_eq!(llm.model, "local");
        assert_eq!(llm.api_key, "sk-cli");
    }
}
