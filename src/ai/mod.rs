use crate::analyzer::categorizer::CategoryBreakdown;
use crate::analyzer::report::{format_hours_minutes, render_fallback_summary};
use crate::config::{Config, SummaryProvider};
use crate::db::IntervalRecord;
use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

const PROMPT_TOP_ACTIVITIES: usize = 10;

/// Everything a renderer gets to see about one day.
#[derive(Debug, Clone)]
pub struct SummaryInput {
    pub date: NaiveDate,
    pub activities: Vec<IntervalRecord>,
    pub breakdown: CategoryBreakdown,
}

pub trait Summarizer: Send + Sync {
    fn name(&self) -> &'static str;
    fn summarize(&self, input: &SummaryInput) -> Result<String>;
}

pub struct TemplateSummarizer;

impl Summarizer for TemplateSummarizer {
    fn name(&self) -> &'static str {
        "template"
    }

    fn summarize(&self, input: &SummaryInput) -> Result<String> {
        Ok(render_fallback_summary(input.date, &input.breakdown))
    }
}

pub struct OllamaSummarizer {
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaSummarizer {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.ollama_base_url.clone(),
            model: config.ollama_model.clone(),
            timeout: Duration::from_secs(config.ai_timeout_seconds.max(5)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: Option<String>,
}

impl Summarizer for OllamaSummarizer {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn summarize(&self, input: &SummaryInput) -> Result<String> {
        let endpoint = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let timeout = self.timeout;
        let request_body = json!({
            "model": self.model,
            "prompt": format!(
                "You analyse a user's daily computer activity.\n\n{}\n{}",
                build_context(input),
                SUMMARY_INSTRUCTIONS
            ),
            "stream": false,
        });

        on_worker_thread(move || {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to create Ollama HTTP client")?;

            let response = client
                .post(endpoint)
                .json(&request_body)
                .send()
                .context("Ollama request failed")?;

            let status = response.status();
            let body = response.text().context("Failed to read Ollama response body")?;
            if !status.is_success() {
                bail!("Ollama error {}: {}", status, body);
            }

            let parsed: OllamaResponse = serde_json::from_str(&body)
                .with_context(|| format!("Failed to parse Ollama response: {body}"))?;

            non_blank(parsed.response).ok_or_else(|| anyhow!("Ollama response did not include text"))
        })
    }
}

pub struct OpenAiSummarizer {
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiSummarizer {
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.resolve_api_key().context(
            "AI API key is missing. Set `activity-tracker config set ai.api_key <KEY>` or `OPENAI_API_KEY`.",
        )?;

        Ok(Self {
            base_url: config.ai_api_base_url.clone(),
            model: config.ai_model.clone(),
            api_key,
            timeout: Duration::from_secs(config.ai_timeout_seconds.max(5)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl Summarizer for OpenAiSummarizer {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn summarize(&self, input: &SummaryInput) -> Result<String> {
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let timeout = self.timeout;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .context("Failed to build Authorization header")?,
        );

        let request_body = json!({
            "model": self.model,
            "temperature": 0.7,
            "max_tokens": 500,
            "messages": [
                {"role": "system", "content": "You analyse daily computer activity and give useful, constructive insights."},
                {"role": "user", "content": format!("{}\n{}", build_context(input), SUMMARY_INSTRUCTIONS)}
            ]
        });

        on_worker_thread(move || {
            let client = Client::builder()
                .timeout(timeout)
                .default_headers(headers)
                .build()
                .context("Failed to create AI HTTP client")?;

            let response = client
                .post(endpoint)
                .json(&request_body)
                .send()
                .context("AI API request failed")?;

            let status = response.status();
            let body = response.text().context("Failed to read AI response body")?;
            if !status.is_success() {
                bail!("AI API error {}: {}", status, body);
            }

            let parsed: ChatCompletionResponse = serde_json::from_str(&body)
                .with_context(|| format!("Failed to parse AI response: {body}"))?;

            non_blank(
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content),
            )
            .ok_or_else(|| anyhow!("AI response did not include message.content"))
        })
    }
}

const SUMMARY_INSTRUCTIONS: &str = "Write a structured Markdown summary of the day with:\n\
1. **Overview**: two or three sentences about the day\n\
2. **Productivity**: a 0-10 rating with a short justification\n\
3. **Main activities**: highlights of what the user did\n\
4. **Suggestions**: two or three practical improvements\n\
5. **Insights**: interesting usage patterns\n\n\
Be objective, friendly and constructive.";

pub fn provider_for(config: &Config, provider: SummaryProvider) -> Result<Box<dyn Summarizer>> {
    Ok(match provider {
        SummaryProvider::Ollama => Box::new(OllamaSummarizer::from_config(config)),
        SummaryProvider::OpenAi => Box::new(OpenAiSummarizer::from_config(config)?),
        SummaryProvider::Template => Box::new(TemplateSummarizer),
    })
}

/// Runs `primary`, falling back to the template on error or blank output.
/// Returns the text and the name of the renderer that produced it.
pub fn summarize_with_fallback(
    primary: Option<&dyn Summarizer>,
    input: &SummaryInput,
) -> (String, &'static str) {
    if let Some(summarizer) = primary {
        match summarizer.summarize(input) {
            Ok(text) if !text.trim().is_empty() => return (text, summarizer.name()),
            Ok(_) => warn!(provider = summarizer.name(), "empty summary. fallback to template"),
            Err(error) => {
                warn!(provider = summarizer.name(), error = %error, "summary generation failed. fallback to template");
            }
        }
    }

    (
        render_fallback_summary(input.date, &input.breakdown),
        TemplateSummarizer.name(),
    )
}

pub fn test_connection(config: &Config, provider: SummaryProvider) -> Result<String> {
    let summarizer = provider_for(config, provider)?;
    let input = SummaryInput {
        date: chrono::Local::now().date_naive(),
        activities: Vec::new(),
        breakdown: crate::analyzer::categorizer::categorize(&[]),
    };

    summarizer.summarize(&input)
}

fn build_context(input: &SummaryInput) -> String {
    let breakdown = &input.breakdown;

    let categories = breakdown
        .categories
        .iter()
        .filter(|summary| summary.seconds > 0)
        .map(|summary| format!("- {}: {}", summary.name, format_hours_minutes(summary.seconds)))
        .collect::<Vec<_>>()
        .join("\n");

    let activities = breakdown
        .top_activities
        .iter()
        .take(PROMPT_TOP_ACTIVITIES)
        .map(|activity| format!("- {}: {}", activity.title, format_hours_minutes(activity.seconds)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "DAY: {}\nTotal tracked time: {} across {} intervals\n\nTIME BY CATEGORY:\n{}\n\nTOP {} ACTIVITIES:\n{}\n",
        input.date.format("%Y-%m-%d"),
        format_hours_minutes(breakdown.total_seconds),
        input.activities.len(),
        categories,
        PROMPT_TOP_ACTIVITIES,
        activities
    )
}

// The blocking client must not run on a tokio worker.
fn on_worker_thread<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    std::thread::spawn(job)
        .join()
        .map_err(|_| anyhow!("AI worker thread panicked"))?
}

fn non_blank(content: Option<String>) -> Option<String> {
    content
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}
