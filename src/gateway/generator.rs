//! Slide content generation
//!
//! Builds prompts from project facts and asks the content generator for
//! slide markdown and a narration script.

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::client::{GatewayClient, ServiceKind, CHAT_COMPLETION};
use super::error::{GatewayError, GatewayResult};
use super::project::ProjectFacts;
use crate::core::types::{Language, Theme};

/// Prompt data is cut to this many bytes
pub const MAX_PROMPT_DATA_BYTES: usize = 8000;

/// Generated content for one theme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideDraft {
    pub title: String,
    pub markdown: String,
    pub narration: String,
}

#[derive(Clone)]
pub struct ContentGenerator {
    gateway: GatewayClient,
}

impl ContentGenerator {
    pub fn new(gateway: GatewayClient) -> Self {
        Self { gateway }
    }

    /// Generate markdown then narration for a theme
    pub async fn generate_slide(
        &self,
        theme: Theme,
        language: Language,
        facts: &ProjectFacts,
        cancel: &CancellationToken,
    ) -> GatewayResult<SlideDraft> {
        let prompt = slide_prompt(theme, language, &facts.for_theme(theme));
        let markdown = self.complete(language, &prompt, cancel).await?;
        let title = extract_title(&markdown).unwrap_or_else(|| theme.default_title(language).to_string());

        let narration = self
            .complete(language, &narration_prompt(language, &markdown), cancel)
            .await?;

        Ok(SlideDraft {
            title,
            markdown,
            narration: narration.trim().to_string(),
        })
    }

    async fn complete(&self, language: Language, prompt: &str, cancel: &CancellationToken) -> GatewayResult<String> {
        let params = json!({
            "messages": [
                { "role": "system", "content": system_prompt(language) },
                { "role": "user", "content": prompt },
            ]
        });
        let response = self
            .gateway
            .call(ServiceKind::ContentGenerator, CHAT_COMPLETION, params, cancel)
            .await?;

        let content = response
            .get("content")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if content.is_empty() {
            return Err(GatewayError::Empty {
                service: ServiceKind::ContentGenerator,
            });
        }
        Ok(content.to_string())
    }
}

fn system_prompt(language: Language) -> &'static str {
    match language {
        Language::Ja => "あなたはプロジェクト報告用のプレゼンテーションを作成するアシスタントです。日本語で回答してください。",
        Language::En => "You are an assistant that writes concise project status presentations. Answer in English.",
    }
}

fn slide_prompt(theme: Theme, language: Language, data: &Value) -> String {
    let data = truncate_utf8(&data.to_string(), MAX_PROMPT_DATA_BYTES);
    match language {
        Language::Ja => format!(
            "{}\n\nデータ:\n{}\n\n要件:\n\
             - 1行目は # で始まるタイトルにする\n\
             - スライドは1枚、要点は3〜5個の箇条書き\n\
             - 数値と結果を強調する\n\
             - 図を入れる場合は ```mermaid ブロックを使う\n",
            theme.instruction(language),
            data
        ),
        Language::En => format!(
            "{}\n\nData:\n{}\n\nRequirements:\n\
             - The first line is a title starting with #\n\
             - One slide, 3 to 5 bullet points\n\
             - Emphasize numbers and outcomes\n\
             - Use a ```mermaid block for any diagram\n",
            theme.instruction(language),
            data
        ),
    }
}

fn narration_prompt(language: Language, markdown: &str) -> String {
    match language {
        Language::Ja => format!(
            "次のスライドを説明する、口頭発表用の自然なナレーション原稿を書いてください。\
             プロフェッショナルな口調で、1〜2分で読める長さにしてください。\n\nスライド:\n{}",
            markdown
        ),
        Language::En => format!(
            "Write natural spoken narration that presents the following slide. \
             Keep a professional tone and a reading time of one to two minutes.\n\nSlide:\n{}",
            markdown
        ),
    }
}

/// Title from a leading `# ` line
pub fn extract_title(markdown: &str) -> Option<String> {
    let first = markdown.lines().find(|l| !l.trim().is_empty())?.trim();
    if !first.starts_with('#') {
        return None;
    }
    let title = first.trim_start_matches('#').trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Cut at a char boundary no later than `max` bytes
fn truncate_utf8(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ProjectId;
    use crate::gateway::client::Gateway;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct ScriptedGenerator {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Gateway for ScriptedGenerator {
        async fn call(&self, _service: ServiceKind, _method: &str, _params: Value) -> GatewayResult<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let content = if n == 0 {
                "# Sprint 12 Status\n- 80% done"
            } else {
                "  We are eighty percent done.  "
            };
            Ok(json!({ "content": content, "finishReason": "stop" }))
        }
    }

    #[tokio::test]
    async fn test_generate_slide_uses_heading_as_title() {
        let gateway = Arc::new(ScriptedGenerator { calls: AtomicU32::new(0) });
        let generator = ContentGenerator::new(GatewayClient::new(gateway.clone(), Duration::from_secs(1)));
        let facts = ProjectFacts::new(ProjectId::new("1"), json!({ "name": "Apollo" }));

        let draft = generator
            .generate_slide(Theme::ProjectProgress, Language::En, &facts, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(draft.title, "Sprint 12 Status");
        assert_eq!(draft.narration, "We are eighty percent done.");
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(extract_title("# Overview\nbody"), Some("Overview".to_string()));
        assert_eq!(extract_title("\n## Risks  \n"), Some("Risks".to_string()));
        assert_eq!(extract_title("no heading"), None);
        assert_eq!(extract_title("#\nbody"), None);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "課".repeat(5000);
        let cut = truncate_utf8(&s, MAX_PROMPT_DATA_BYTES);
        assert!(cut.len() <= MAX_PROMPT_DATA_BYTES + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_utf8("short", 10), "short");
    }
}
