//! 爱题库 (icodef) adapter: GET endpoint with the question in the URL
//! path. The upstream numbers question types 1..5, one above the wire
//! encoding used here.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::adapter::{Adapter, AdapterDescriptor};
use crate::matcher::build_choice_answer_from_texts;
use crate::providers::text::parse_judgement;
use crate::providers::{parse_config, BANK_TIMEOUT};
use crate::schema::{ConfigField, ConfigSchema, FieldKind};
use crate::types::{AnswerOutcome, ErrorKind, ProviderChoice, Query, QuestionType};

const DEFAULT_URL: &str = "https://q.icodef.com/api/v1/q";

#[derive(Debug, Deserialize)]
struct IcodefConfig {
    token: String,
}

pub struct Icodef {
    descriptor: AdapterDescriptor,
    client: Client,
    url: String,
}

impl Icodef {
    pub fn new(client: Client) -> Self {
        Self {
            descriptor: AdapterDescriptor::new("爱题库", "https://q.icodef.com/")
                .free(true)
                .pay(true)
                .schema(ConfigSchema::new(vec![ConfigField::required(
                    "token",
                    FieldKind::String,
                    "授权token",
                )])),
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
        if data.get("code").and_then(Value::as_i64) != Some(0) {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "未找到答案");
        }

        let contents: Vec<String> = data
            .pointer("/data/correct")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("content").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if contents.is_empty() {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "未找到答案");
        }

        // Upstream types are 1-based; shift down to the wire encoding.
        let answer_type = data
            .pointer("/data/type")
            .and_then(Value::as_u64)
            .and_then(|t| t.checked_sub(1))
            .and_then(|t| QuestionType::try_from(t as u8).ok())
            .unwrap_or(query.qtype);

        match answer_type {
            QuestionType::Single | QuestionType::Multiple => {
                build_choice_answer_from_texts(name, &contents, query.options(), answer_type)
            }
            QuestionType::FillBlank | QuestionType::Essay => {
                AnswerOutcome::text(name, answer_type, contents)
            }
            QuestionType::Judgement => {
                AnswerOutcome::judgement(name, parse_judgement(&contents[0]))
            }
        }
    }
}

#[async_trait]
impl Adapter for Icodef {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn search(&self, query: &Query, provider: &ProviderChoice) -> AnswerOutcome {
        let name = self.name();
        let config: IcodefConfig = match parse_config(&self.descriptor, query, provider) {
            Ok(config) => config,
            Err(outcome) => return *outcome,
        };

        let url = format!("{}/{}", self.url, urlencoding::encode(&query.content));
        let response = match self
            .client
            .get(&url)
            .query(&[("simple", "0")])
            .header("Authorization", &config.token)
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
