//! LLM research: prompt assembly and strict JSON parsing.
//!
//! Every function returns the parsed result plus token usage so the caller
//! can feed the cost ledger. A reply that fails to parse is an error, and
//! callers treat it as "no recommendation" — never as a default verdict.

use crate::config::LlmConfig;
use crate::domain::{
    ConfirmationVerdict, PlannedAction, PremarketPlan, ResearchResult, Signal, Verdict,
};
use crate::error::{GambitError, Result};
use crate::llm::{extract_json_object, ChatMessage, CompletionRequest, LlmClient};
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct AnalystRecommendation {
    pub symbol: String,
    pub verdict: Verdict,
    pub confidence: f64,
    pub reasoning: String,
}

const RESEARCH_SYSTEM: &str = "You are a quantitative research assistant for a \
social-signal trading agent. Judge whether the social momentum behind a symbol \
is tradeable. Reply with a single JSON object: {\"verdict\": \"BUY\"|\"SELL\"|\"HOLD\", \
\"confidence\": 0.0-1.0, \"reasoning\": \"...\", \"entry_quality\": \
\"excellent\"|\"good\"|\"fair\"|\"poor\"}.";

const ANALYST_SYSTEM: &str = "You are the senior analyst of a trading desk. You \
receive candidate signals and current positions. Recommend BUY/SELL/HOLD per \
symbol. Positions should generally be held for at least 30 minutes before \
selling. Reply with a single JSON object: {\"recommendations\": [{\"symbol\": \
\"...\", \"verdict\": \"BUY\"|\"SELL\"|\"HOLD\", \"confidence\": 0.0-1.0, \
\"reasoning\": \"...\"}]}.";

const PREMARKET_SYSTEM: &str = "You prepare a pre-market trading plan from \
overnight social signals. Pick at most 3 actionable symbols. Reply with a \
single JSON object: {\"summary\": \"...\", \"actions\": [{\"symbol\": \"...\", \
\"verdict\": \"BUY\"|\"SELL\"|\"HOLD\", \"confidence\": 0.0-1.0, \"reasoning\": \"...\"}]}.";

#[derive(Debug, Deserialize)]
struct ResearchReply {
    verdict: Verdict,
    confidence: f64,
    reasoning: String,
    #[serde(default)]
    entry_quality: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalystReply {
    recommendations: Vec<AnalystReplyItem>,
}

#[derive(Debug, Deserialize)]
struct AnalystReplyItem {
    symbol: String,
    verdict: Verdict,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct PremarketReply {
    #[serde(default)]
    summary: String,
    actions: Vec<AnalystReplyItem>,
}

#[derive(Debug, Deserialize)]
struct ConfirmationReply {
    verdict: String,
    #[serde(default)]
    summary: String,
}

fn parse_object<T: serde::de::DeserializeOwned>(content: &str) -> Result<T> {
    let json = extract_json_object(content)
        .ok_or_else(|| GambitError::LlmParse("no JSON object in reply".to_string()))?;
    serde_json::from_str(json).map_err(|e| GambitError::LlmParse(e.to_string()))
}

fn describe_signal(signal: &Signal) -> String {
    format!(
        "{}: sentiment {:.2} (raw {:.2}), volume {}, source {}/{}, age {} min{}",
        signal.symbol,
        signal.sentiment,
        signal.raw_sentiment,
        signal.volume,
        signal.source.as_str(),
        signal.source_detail,
        (Utc::now() - signal.timestamp).num_minutes(),
        signal
            .flair
            .as_deref()
            .map(|f| format!(", flair {f}"))
            .unwrap_or_default(),
    )
}

/// Research a single candidate signal.
pub async fn research_signal(
    llm: &dyn LlmClient,
    cfg: &LlmConfig,
    signal: &Signal,
    related: &[Signal],
) -> Result<(ResearchResult, TokenUsage)> {
    let mut prompt = format!("Candidate signal:\n{}\n", describe_signal(signal));
    if !related.is_empty() {
        prompt.push_str("\nOther recent signals for the same symbol:\n");
        for s in related.iter().take(5) {
            prompt.push_str(&format!("- {}\n", describe_signal(s)));
        }
    }

    let response = llm
        .complete(CompletionRequest {
            model: cfg.research_model.clone(),
            messages: vec![ChatMessage::system(RESEARCH_SYSTEM), ChatMessage::user(prompt)],
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            json_mode: true,
        })
        .await?;

    let reply: ResearchReply = parse_object(&response.content)?;
    let result = ResearchResult {
        symbol: signal.symbol.clone(),
        verdict: reply.verdict,
        confidence: reply.confidence.clamp(0.0, 1.0),
        reasoning: reply.reasoning,
        entry_quality: reply.entry_quality,
        timestamp: Utc::now(),
    };
    let usage = TokenUsage {
        model: cfg.research_model.clone(),
        prompt_tokens: response.prompt_tokens,
        completion_tokens: response.completion_tokens,
    };
    Ok((result, usage))
}

/// Aggregate analyst pass over candidates and open positions.
pub async fn run_analyst(
    llm: &dyn LlmClient,
    cfg: &LlmConfig,
    candidates: &[Signal],
    positions: &[String],
) -> Result<(Vec<AnalystRecommendation>, TokenUsage)> {
    let mut prompt = String::from("Candidate signals (strongest first):\n");
    for s in candidates.iter().take(10) {
        prompt.push_str(&format!("- {}\n", describe_signal(s)));
    }
    prompt.push_str("\nCurrent positions:\n");
    if positions.is_empty() {
        prompt.push_str("(none)\n");
    }
    for p in positions {
        prompt.push_str(&format!("- {p}\n"));
    }

    let response = llm
        .complete(CompletionRequest {
            model: cfg.analyst_model.clone(),
            messages: vec![ChatMessage::system(ANALYST_SYSTEM), ChatMessage::user(prompt)],
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            json_mode: true,
        })
        .await?;

    let reply: AnalystReply = parse_object(&response.content)?;
    let recommendations = reply
        .recommendations
        .into_iter()
        .map(|r| AnalystRecommendation {
            symbol: r.symbol.to_uppercase(),
            verdict: r.verdict,
            confidence: r.confidence.clamp(0.0, 1.0),
            reasoning: r.reasoning,
        })
        .collect();
    let usage = TokenUsage {
        model: cfg.analyst_model.clone(),
        prompt_tokens: response.prompt_tokens,
        completion_tokens: response.completion_tokens,
    };
    Ok((recommendations, usage))
}

/// Build the pre-market plan from the strongest overnight signals.
pub async fn build_premarket_plan(
    llm: &dyn LlmClient,
    cfg: &LlmConfig,
    signals: &[Signal],
) -> Result<(PremarketPlan, TokenUsage)> {
    let mut prompt = String::from("Overnight signals (strongest first):\n");
    for s in signals.iter().take(10) {
        prompt.push_str(&format!("- {}\n", describe_signal(s)));
    }

    let response = llm
        .complete(CompletionRequest {
            model: cfg.analyst_model.clone(),
            messages: vec![
                ChatMessage::system(PREMARKET_SYSTEM),
                ChatMessage::user(prompt),
            ],
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            json_mode: true,
        })
        .await?;

    let reply: PremarketReply = parse_object(&response.content)?;
    let plan = PremarketPlan {
        created_at: Utc::now(),
        summary: reply.summary,
        actions: reply
            .actions
            .into_iter()
            .map(|a| PlannedAction {
                symbol: a.symbol.to_uppercase(),
                verdict: a.verdict,
                confidence: a.confidence.clamp(0.0, 1.0),
                reasoning: a.reasoning,
            })
            .collect(),
    };
    let usage = TokenUsage {
        model: cfg.analyst_model.clone(),
        prompt_tokens: response.prompt_tokens,
        completion_tokens: response.completion_tokens,
    };
    Ok((plan, usage))
}

/// Judge whether a batch of tweets confirms or contradicts a research thesis.
pub async fn judge_twitter_confirmation(
    llm: &dyn LlmClient,
    cfg: &LlmConfig,
    symbol: &str,
    thesis: &str,
    tweets: &[String],
) -> Result<(ConfirmationVerdict, String, TokenUsage)> {
    let mut prompt = format!("Thesis for {symbol}: {thesis}\n\nRecent tweets:\n");
    for t in tweets.iter().take(20) {
        prompt.push_str(&format!("- {t}\n"));
    }
    prompt.push_str(
        "\nDoes the Twitter activity confirm or contradict the thesis? Reply with a \
         single JSON object: {\"verdict\": \"confirm\"|\"contradict\"|\"neutral\", \
         \"summary\": \"...\"}",
    );

    let response = llm
        .complete(CompletionRequest {
            model: cfg.research_model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            json_mode: true,
        })
        .await?;

    let reply: ConfirmationReply = parse_object(&response.content)?;
    let verdict = match reply.verdict.as_str() {
        "confirm" => ConfirmationVerdict::Confirm,
        "contradict" => ConfirmationVerdict::Contradict,
        _ => ConfirmationVerdict::Neutral,
    };
    let usage = TokenUsage {
        model: cfg.research_model.clone(),
        prompt_tokens: response.prompt_tokens,
        completion_tokens: response.completion_tokens,
    };
    Ok((verdict, reply.summary, usage))
}
