//! 硅基流动 adapter: OpenAI-compatible chat-completions upstream prompted
//! to answer exam questions as a strict JSON object.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::adapter::{Adapter, AdapterDescriptor};
use crate::matcher::build_choice_answer_from_texts;
use crate::providers::text::parse_judgement;
use crate::providers::{parse_config, LLM_TIMEOUT};
use crate::schema::{ConfigField, ConfigSchema, FieldKind};
use crate::types::{AnswerOutcome, ErrorKind, ProviderChoice, Query, QuestionType};

const DEFAULT_BASE: &str = "https://api.siliconflow.cn/v1";

const SYSTEM_PROMPT: &str = "你是一个答题助手，请严格按JSON格式输出答案，不要包含任何额外信息，\
即使选项有ABCD还是输出选项文本。示例格式：{\"Answer\": [\"答案内容\"]}";

#[derive(Debug, Deserialize)]
struct SiliconFlowConfig {
    key: String,
    model: String,
    #[serde(default)]
    base_url: Option<String>,
}

pub struct SiliconFlow {
    descriptor: AdapterDescriptor,
    client: Client,
    base: String,
}

impl SiliconFlow {
    pub fn new(client: Client) -> Self {
        Self {
            descriptor: AdapterDescriptor::new("硅基流动", "https://siliconflow.cn/")
                .free(false)
                .pay(true)
                .schema(ConfigSchema::new(vec![
                    ConfigField::required("key", FieldKind::String, "API密钥"),
                    ConfigField::required("model", FieldKind::String, "模型名称"),
                    ConfigField::optional("base_url", FieldKind::String, "API地址")
                        .default_value(json!(DEFAULT_BASE)),
                ])),
            client,
            base: DEFAULT_BASE.to_string(),
        }
    }

    pub fn with_url(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    fn user_prompt(query: &Query) -> String {
        let options = query
            .options()
            .map(|o| serde_json::to_string(o).unwrap_or_default())
            .unwrap_or_default();
        match query.qtype {
            QuestionType::Single => {
                format!("题目：{}\n选项：{}\n这是单选题，请选择唯一正确答案", query.content, options)
            }
            QuestionType::Multiple => {
                format!("题目：{}\n选项：{}\n这是多选题，请选择所有正确选项", query.content, options)
            }
            QuestionType::FillBlank => {
                format!("题目：{}\n这是填空题，请直接给出填空内容", query.content)
            }
            QuestionType::Judgement => {
                format!("题目：{}\n这是判断题，请回答'正确'或'错误'", query.content)
            }
            QuestionType::Essay => {
                format!("题目：{}\n这是简答题，请直接给出答案内容", query.content)
            }
        }
    }

    /// Pull the `{"Answer": [...]}` object out of the model's reply.
    fn parse_completion(&self, data: &Value, query: &Query) -> AnswerOutcome {
        let name = self.name();
        let Some(content) = data
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
        else {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "模型未返回内容");
        };

        let parsed: Value = match serde_json::from_str(content) {
            Ok(parsed) => parsed,
            Err(error) => {
                return AnswerOutcome::failure(
                    name,
                    query.qtype,
                    ErrorKind::ParseError,
                    format!("模型输出不是合法JSON: {error}"),
                )
            }
        };
        let answers: Vec<String> = match parsed.get("Answer") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        };
        if answers.is_empty() {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ParseError, "模型输出缺少Answer字段");
        }

        match query.qtype {
            QuestionType::Single | QuestionType::Multiple => {
                build_choice_answer_from_texts(name, &answers, query.options(), query.qtype)
            }
            QuestionType::FillBlank | QuestionType::Essay => {
                AnswerOutcome::text(name, query.qtype, answers)
            }
            QuestionType::Judgement => {
                AnswerOutcome::judgement(name, parse_judgement(&answers[0]))
            }
        }
    }
}

#[async_trait]
impl Adapter for SiliconFlow {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn search(&self, query: &Query, provider: &ProviderChoice) -> AnswerOutcome {
        let name = self.name();
        let config: SiliconFlowConfig = match parse_config(&self.descriptor, query, provider) {
            Ok(config) => config,
            Err(outcome) => return *outcome,
        };
        let base = config.base_url.as_deref().unwrap_or(&self.base);

        let body = json!({
            "model": config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": Self::user_prompt(query)},
            ],
            "response_format": {"type": "json_object"},
            "max_tokens": 4096,
            "temperature": 0.7,
            "top_p": 0.7,
        });

        let response = match self
            .client
            .post(format!("{base}/chat/completions"))
            .bearer_auth(&config.key)
            .json(&body)
            .timeout(LLM_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                return AnswerOutcome::failure(
                    name,
                    query.qtype,
                    ErrorKind::NetworkError,
                    format!("网络请求失败: {error}"),
                )
            }
        };

        if !response.status().is_success() {
            return AnswerOutcome::failure(
                name,
                query.qtype,
                ErrorKind::ApiError,
                format!("HTTP {}", response.status()),
            );
        }

        match response.json::<Value>().await {
            Ok(data) => self.parse_completion(&data, query),
            Err(error) => AnswerOutcome::failure(
                name,
                query.qtype,
                ErrorKind::ParseError,
                format!("响应解析失败: {error}"),
            ),
        }
    }
}
