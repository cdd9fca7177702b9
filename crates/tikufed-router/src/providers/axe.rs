//! 万卷题库 adapter: POST endpoint taking the question as `tm`. Essay
//! questions are remapped to the upstream's completion type, which also
//! switches the answer separator.

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

const DEFAULT_URL: &str = "http://tk.wanjuantiku.com/api/query";

#[derive(Debug, Deserialize)]
struct AxeConfig {
    token: String,
    #[serde(default)]
    wid: Option<String>,
    #[serde(default)]
    cid: Option<String>,
}

pub struct Axe {
    descriptor: AdapterDescriptor,
    client: Client,
    url: String,
}

impl Axe {
    pub fn new(client: Client) -> Self {
        Self {
            descriptor: AdapterDescriptor::new("万卷题库", "http://tk.wanjuantiku.com/")
                .free(false)
                .pay(true)
                .schema(ConfigSchema::new(vec![
                    ConfigField::required("token", FieldKind::String, "token密钥"),
                    ConfigField::optional("wid", FieldKind::String, "站点ID"),
                    ConfigField::optional("cid", FieldKind::String, "课程ID"),
                ])),
            client,
            url: DEFAULT_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// The wire type sent upstream; essays ride the completion type.
    fn upstream_type(qtype: QuestionType) -> u8 {
        match qtype {
            QuestionType::Essay => QuestionType::FillBlank.as_u8(),
            other => other.as_u8(),
        }
    }

    fn parse_response(&self, data: &Value, query: &Query) -> AnswerOutcome {
        let name = self.name();
        if data.get("code").and_then(Value::as_i64) != Some(1) {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "未找到答案");
        }

        let answer = data.get("data").and_then(Value::as_str).unwrap_or("");
        if answer.is_empty() {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "未找到答案");
        }

        let separator = if Self::upstream_type(query.qtype) == QuestionType::FillBlank.as_u8() {
            "#!#"
        } else {
            "#"
        };
        let fragments: Vec<String> = answer
            .split(separator)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if fragments.is_empty() {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "未找到答案");
        }

        match query.qtype {
            QuestionType::Single | QuestionType::Multiple => {
                build_choice_answer_from_texts(name, &fragments, query.options(), query.qtype)
            }
            QuestionType::FillBlank | QuestionType::Essay => {
                AnswerOutcome::text(name, query.qtype, fragments)
            }
            QuestionType::Judgement => {
                AnswerOutcome::judgement(name, parse_judgement(&fragments[0]))
            }
        }
    }
}

#[async_trait]
impl Adapter for Axe {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn search(&self, query: &Query, provider: &ProviderChoice) -> AnswerOutcome {
        let name = self.name();
        let config: AxeConfig = match parse_config(&self.descriptor, query, provider) {
            Ok(config) => config,
            Err(outcome) => return *outcome,
        };

        let body = json!({
            "tm": query.content,
            "options": query.options,
            "type": Self::upstream_type(query.qtype),
            "token": config.token,
            "wid": config.wid,
            "cid": config.cid,
        });

        let response = match self
            .client
            .post(&self.url)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> Axe {
        Axe::new(Client::new())
    }

    #[test]
    fn essay_answers_split_on_the_long_separator() {
        let query = Query::new("测试题目", QuestionType::Essay);
        let data = json!({"code": 1, "data": "第一段#!#第二段"});
        let outcome = adapter().parse_response(&data, &query);
        assert_eq!(
            outcome.text.as_deref(),
            Some(&["第一段".to_string(), "第二段".to_string()][..])
        );
    }

    #[test]
    fn choice_answers_split_on_hash() {
        let query = Query::new("测试题目", QuestionType::Multiple)
            .with_options(vec!["甲".into(), "乙".into(), "丙".into()]);
        let data = json!({"code": 1, "data": "甲#丙"});
        let outcome = adapter().parse_response(&data, &query);
        assert!(outcome.success);
        assert_eq!(outcome.choice.as_deref(), Some(&["A".to_string(), "C".to_string()][..]));
    }

    #[test]
    fn upstream_miss_is_an_api_error() {
        let query = Query::new("测试题目", QuestionType::Single);
        let data = json!({"code": 0});
        let outcome = adapter().parse_response(&data, &query);
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::ApiError));
    }
}
