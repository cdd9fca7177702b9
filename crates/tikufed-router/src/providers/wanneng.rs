//! 万能题库 adapter: POST endpoint with the token in the URL path. On a
//! bank hit the answers arrive as 0-based option indices; otherwise they
//! are free text that goes through the matcher.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::adapter::{Adapter, AdapterDescriptor};
use crate::matcher::build_choice_answer;
use crate::providers::text::parse_judgement;
use crate::providers::{parse_config, BANK_TIMEOUT};
use crate::schema::{ConfigField, ConfigSchema, FieldKind};
use crate::types::{option_key, AnswerOutcome, ErrorKind, ProviderChoice, Query, QuestionType};

const DEFAULT_URL: &str = "http://lyck6.cn/scriptService/api/autoAnswer";

#[derive(Debug, Deserialize)]
struct WannengConfig {
    token: String,
    #[serde(default)]
    location: Option<String>,
}

pub struct Wanneng {
    descriptor: AdapterDescriptor,
    client: Client,
    url: String,
}

impl Wanneng {
    pub fn new(client: Client) -> Self {
        Self {
            descriptor: AdapterDescriptor::new("万能题库", "https://lyck6.cn/pay")
                .free(true)
                .pay(true)
                .schema(ConfigSchema::new(vec![
                    ConfigField::required("token", FieldKind::String, "token密钥"),
                    ConfigField::optional("location", FieldKind::String, "题目来源"),
                ])),
            client,
            url: DEFAULT_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn parse_response(&self, data: &Value, query: &Query) -> AnswerOutcome {
        let name = self.name();
        let code = data.get("code").and_then(Value::as_i64);
        if code == Some(404) {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "积分不足");
        }
        if code != Some(0) {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("API返回错误");
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, message);
        }

        let Some(result) = data.get("result").filter(|r| !r.is_null()) else {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "API返回数据为空");
        };
        let Some(answers) = result.get("answers").filter(|a| !a.is_null()) else {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "未找到答案");
        };
        let hit = result
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        // On a miss the bank nests its guess one level deeper.
        let answers = if !hit {
            match answers.as_array().and_then(|a| a.first()) {
                Some(first) if first.is_array() => first.clone(),
                _ => answers.clone(),
            }
        } else {
            answers.clone()
        };

        self.parse_answer(&answers, hit, query)
    }

    fn parse_answer(&self, answers: &Value, hit: bool, query: &Query) -> AnswerOutcome {
        let name = self.name();
        match query.qtype {
            QuestionType::Single | QuestionType::Multiple => {
                if hit {
                    let indices: Vec<usize> = match answers {
                        Value::Array(items) => items
                            .iter()
                            .filter_map(Value::as_u64)
                            .map(|i| i as usize)
                            .collect(),
                        Value::Number(n) => n.as_u64().map(|i| i as usize).into_iter().collect(),
                        _ => Vec::new(),
                    };
                    let keys: Vec<String> =
                        indices.into_iter().filter_map(option_key).collect();
                    if keys.is_empty() {
                        return AnswerOutcome::failure(
                            name,
                            query.qtype,
                            ErrorKind::ParseError,
                            "选项下标无法解析",
                        );
                    }
                    let actual = if keys.len() > 1 {
                        QuestionType::Multiple
                    } else {
                        QuestionType::Single
                    };
                    AnswerOutcome::choice(name, actual, keys)
                } else {
                    let answer_text = first_text(answers);
                    build_choice_answer(name, &answer_text, query.options(), query.qtype)
                }
            }
            QuestionType::FillBlank | QuestionType::Essay => {
                AnswerOutcome::text(name, query.qtype, all_texts(answers))
            }
            QuestionType::Judgement => {
                let value = match answers {
                    Value::Bool(b) => *b,
                    Value::Number(n) => n.as_i64().map(|i| i != 0).unwrap_or(true),
                    Value::Array(items) => match items.first() {
                        Some(Value::Bool(b)) => *b,
                        Some(Value::Number(n)) => n.as_i64().map(|i| i != 0).unwrap_or(true),
                        Some(other) => parse_judgement(&text_of(other)),
                        None => true,
                    },
                    other => parse_judgement(&text_of(other)),
                };
                AnswerOutcome::judgement(name, value)
            }
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn first_text(answers: &Value) -> String {
    match answers {
        Value::Array(items) => items.first().map(text_of).unwrap_or_default(),
        other => text_of(other),
    }
}

fn all_texts(answers: &Value) -> Vec<String> {
    match answers {
        Value::Array(items) => items.iter().map(text_of).collect(),
        other => vec![text_of(other)],
    }
}

#[async_trait]
impl Adapter for Wanneng {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn search(&self, query: &Query, provider: &ProviderChoice) -> AnswerOutcome {
        let name = self.name();
        let config: WannengConfig = match parse_config(&self.descriptor, query, provider) {
            Ok(config) => config,
            Err(outcome) => return *outcome,
        };

        let body = json!({
            "question": query.content,
            "options": query.options,
            "type": query.qtype,
            "location": config.location,
        });
        let url = format!("{}/{}", self.url, config.token);

        let response = match self
            .client
            .post(&url)
            .json(&body)
            .timeout(BANK_TIMEOUT)
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
