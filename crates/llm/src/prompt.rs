//! Prompt building and model output parsing
//!
//! Every prompt comes in a Korean and an English wording. The wording is
//! picked with the shared Hangul predicate from `ragchat_core::language`.

use std::fmt;

use ragchat_core::{Language, Turn, TurnRole};
use serde::{Deserialize, Serialize};

use crate::LlmError;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl From<TurnRole> for Role {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.into(),
            content: turn.content.clone(),
        }
    }
}

/// Instruction wording, one pair per prompt kind
pub struct PromptTemplates;

impl PromptTemplates {
    /// Persona for conversational answers
    pub fn conversation_system(language: Language) -> &'static str {
        match language {
            Language::Korean => {
                "다음의 Human과 Assistant의 친근한 이전 대화입니다. \
                 Assistant은 상황에 맞는 구체적인 세부 정보를 충분히 제공합니다. \
                 Assistant의 이름은 서연이고, 모르는 질문을 받으면 솔직히 모른다고 말합니다."
            }
            Language::English => {
                "Using the following conversation, answer friendly for the newest question. \
                 If you don't know the answer, just say that you don't know, don't try to make up an answer. \
                 You will be acting as a thoughtful advisor."
            }
        }
    }

    /// Request to restate `question` as a standalone question inside `<result>` tags
    pub fn revision_request(language: Language, question: &str) -> String {
        match language {
            Language::Korean => format!(
                "이전 대화를 참조하여, 다음의 <question>의 뜻을 명확히 하는 새로운 질문을 한국어로 생성하세요. \
                 새로운 질문은 원래 질문의 중요한 단어를 반드시 포함합니다. 결과는 <result> tag를 붙여주세요.\n\n\
                 <question>\n{}\n</question>",
                question
            ),
            Language::English => format!(
                "Rephrase the follow up <question> to be a standalone question. Put it in <result> tags.\n\
                 <question>\n{}\n</question>",
                question
            ),
        }
    }

    /// Grounded instruction embedding the retrieved excerpts
    pub fn grounded_system(language: Language, context: &str) -> String {
        match language {
            Language::Korean => format!(
                "다음의 <context> tag안의 참고자료를 이용하여 상황에 맞는 구체적인 세부 정보를 충분히 제공합니다. \
                 Assistant의 이름은 서연이고, 모르는 질문을 받으면 솔직히 모른다고 말합니다.\n\n\
                 <context>\n{}\n</context>",
                context
            ),
            Language::English => format!(
                "Here is pieces of context, contained in <context> tags. \
                 Provide a concise answer to the question at the end. \
                 If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
                 <context>\n{}\n</context>",
                context
            ),
        }
    }

    /// Summary instruction for uploaded documents
    pub fn summary_system(language: Language) -> &'static str {
        match language {
            Language::Korean => "다음의 <article> tag안의 문장을 요약해서 500자 이내로 설명하세오.",
            Language::English => {
                "Here is pieces of article, contained in <article> tags. \
                 Write a concise summary within 500 characters."
            }
        }
    }

    pub fn summary_user(text: &str) -> String {
        format!("<article>{}</article>", text)
    }
}

/// Prompt builder
///
/// Messages come out in insertion order. An empty system prompt is skipped.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    messages: Vec<Message>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a system instruction
    pub fn system(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.is_empty() {
            self.messages.push(Message::system(content));
        }
        self
    }

    /// Add conversation history, oldest first
    pub fn with_history<'a>(mut self, turns: impl IntoIterator<Item = &'a Turn>) -> Self {
        self.messages.extend(turns.into_iter().map(Message::from));
        self
    }

    /// Add the current user message
    pub fn user_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(Message::user(message));
        self
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn build(self) -> Vec<Message> {
        self.messages
    }
}

/// Extract the text between `<tag>` and `</tag>`
///
/// The first opening marker is paired with the last closing marker after it,
/// so nested or repeated tags inside the result are kept verbatim. Missing
/// markers yield [`LlmError::MalformedOutput`].
pub fn extract_tagged(response: &str, tag: &str) -> Result<String, LlmError> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let start = response
        .find(&open)
        .ok_or_else(|| LlmError::MalformedOutput(format!("missing {} in model output", open)))?
        + open.len();

    let end = response[start..]
        .rfind(&close)
        .ok_or_else(|| LlmError::MalformedOutput(format!("missing {} in model output", close)))?;

    let inner = response[start..start + end].trim();
    if inner.is_empty() {
        return Err(LlmError::MalformedOutput(format!("empty {} block", open)));
    }
    Ok(inner.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_prompt_builder_order() {
        let history = vec![Turn::user("hi"), Turn::assistant("hello")];
        let messages = PromptBuilder::new()
            .system("be nice")
            .with_history(&history)
            .user_message("how are you?")
            .build();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1], Message::user("hi"));
        assert_eq!(messages[2], Message::assistant("hello"));
        assert_eq!(messages[3].content, "how are you?");
    }

    #[test]
    fn test_empty_system_skipped() {
        let builder = PromptBuilder::new().system("").user_message("q");
        assert_eq!(builder.message_count(), 1);
    }

    #[test]
    fn test_templates_follow_language() {
        assert!(PromptTemplates::conversation_system(Language::Korean).contains("서연"));
        assert!(PromptTemplates::conversation_system(Language::English).contains("thoughtful advisor"));

        let revise = PromptTemplates::revision_request(Language::English, "and the price?");
        assert!(revise.contains("<result>"));
        assert!(revise.contains("<question>\nand the price?\n</question>"));

        let grounded = PromptTemplates::grounded_system(Language::English, "excerpt one\n\n");
        assert!(grounded.contains("<context>\nexcerpt one\n\n\n</context>"));

        assert_eq!(PromptTemplates::summary_user("body"), "<article>body</article>");
    }

    #[test]
    fn test_extract_tagged() {
        let out = "Sure.\n<result>What is the refund policy of the store?</result>";
        assert_eq!(
            extract_tagged(out, "result").unwrap(),
            "What is the refund policy of the store?"
        );
    }

    #[test]
    fn test_extract_tagged_trims_whitespace() {
        assert_eq!(extract_tagged("<result>\n  q  \n</result>\n", "result").unwrap(), "q");
    }

    #[test]
    fn test_extract_tagged_missing_markers() {
        assert!(matches!(
            extract_tagged("no tags at all", "result"),
            Err(LlmError::MalformedOutput(_))
        ));
        assert!(matches!(
            extract_tagged("<result>unterminated", "result"),
            Err(LlmError::MalformedOutput(_))
        ));
        assert!(matches!(
            extract_tagged("</result>backwards<result>", "result"),
            Err(LlmError::MalformedOutput(_))
        ));
        assert!(matches!(
            extract_tagged("<result>  </result>", "result"),
            Err(LlmError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_extract_tagged_multibyte() {
        let out = "<result>환불 정책은 무엇인가요?</result>";
        assert_eq!(extract_tagged(out, "result").unwrap(), "환불 정책은 무엇인가요?");
    }
}
