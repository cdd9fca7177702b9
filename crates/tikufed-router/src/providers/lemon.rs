//! 柠檬题库 adapter: one upstream, two endpoints — a free tier and a paid
//! tier selected by configuration. The paid tier requires a token.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::adapter::{Adapter, AdapterDescriptor};
use crate::matcher::build_choice_answer_from_texts;
use crate::providers::text::parse_judgement;
use crate::providers::{parse_config, BANK_TIMEOUT};
use crate::schema::{ConfigField, ConfigSchema, FieldKind};
use crate::types::{AnswerOutcome, ErrorKind, ProviderChoice, Query, QuestionType};

const DEFAULT_BASE: &str = "https://api.vanse.top";

/// query_type 1 is the free endpoint, 2 the paid one.
#[derive(Debug, Deserialize)]
struct LemonConfig {
    #[serde(default)]
    token: Option<String>,
    #[serde(default = "default_query_type")]
    query_type: i64,
}

fn default_query_type() -> i64 {
    1
}

pub struct Lemon {
    descriptor: AdapterDescriptor,
    client: Client,
    base: String,
}

impl Lemon {
    pub fn new(client: Client) -> Self {
        Self {
            descriptor: AdapterDescriptor::new("柠檬题库", "https://api.vanse.top/")
                .free(true)
                .pay(true)
                .schema(ConfigSchema::new(vec![
                    ConfigField::optional("token", FieldKind::String, "授权token")
                        .describe("付费接口必填，免费接口可选"),
                    ConfigField::optional("query_type", FieldKind::Integer, "接口类型")
                        .describe("1=免费接口，2=付费接口")
                        .default_value(json!(1)),
                ])),
            client,
            base: DEFAULT_BASE.to_string(),
        }
    }

    pub fn with_url(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    fn parse_response(&self, data: &Value, query: &Query) -> AnswerOutcome {
        let name = self.name();
        if data.get("code").and_then(Value::as_i64) != Some(1000) {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("API返回错误");
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, message);
        }

        let answer = data
            .pointer("/data/answer")
            .and_then(Value::as_str)
            .unwrap_or("");
        if answer.is_empty() {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "未找到答案");
        }

        let fragments: Vec<String> = answer
            .split('#')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        match query.qtype {
            QuestionType::Single | QuestionType::Multiple => {
                build_choice_answer_from_texts(name, &fragments, query.options(), query.qtype)
            }
            QuestionType::FillBlank | QuestionType::Essay => {
                AnswerOutcome::text(name, query.qtype, fragments)
            }
            QuestionType::Judgement => AnswerOutcome::judgement(name, parse_judgement(answer)),
        }
    }
}

#[async_trait]
impl Adapter for Lemon {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn search(&self, query: &Query, provider: &ProviderChoice) -> AnswerOutcome {
        let name = self.name();
        let config: LemonConfig = match parse_config(&self.descriptor, query, provider) {
            Ok(config) => config,
            Err(outcome) => return *outcome,
        };

        let url = if config.query_type == 2 {
            if config.token.is_none() {
                return AnswerOutcome::failure(
                    name,
                    query.qtype,
                    ErrorKind::ConfigError,
                    "付费接口需要token",
                );
            }
            format!("{}/api/v1/mcx", self.base)
        } else {
            format!("{}/api/v1/cx", self.base)
        };

        let body = json!({
            "v": "1.0",
            "question": query.content,
            "options": query.options,
            "type": query.qtype,
        });

        let mut request = self.client.post(&url).json(&body).timeout(BANK_TIMEOUT);
        if let Some(token) = &config.token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
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

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "请求频率超限");
        }
        if !status.is_success() {
            return AnswerOutcome::failure(
                name,
                query.qtype,
                ErrorKind::ApiError,
                format!("HTTP {status}"),
            );
        }

        match response.json::<Value>().await {
            Ok(data) => self.parse_response(&data, query),
            Err(error) => AnswerOutcome::failure(
                name,
                query.qtype,
                ErrorKind::ParseError,
                format!("响应解析失败: {error}"),
            ),
        }
    }
}
