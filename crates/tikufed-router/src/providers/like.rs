//! Like知识库 adapter: LLM-backed upstream. The question is sent with a
//! type prefix and the option list inlined; the response classifies the
//! question itself, so the answer type follows the upstream's verdict.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::adapter::{Adapter, AdapterDescriptor};
use crate::matcher::build_choice_answer_from_keys;
use crate::providers::{parse_config, LLM_TIMEOUT};
use crate::schema::{ConfigField, ConfigSchema, FieldKind};
use crate::types::{AnswerOutcome, ErrorKind, ProviderChoice, Query, QuestionType};

const DEFAULT_URL: &str = "https://app.datam.site/api/v1/query";

#[derive(Debug, Deserialize)]
struct LikeConfig {
    key: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    search: Option<bool>,
    #[serde(default)]
    vision: Option<bool>,
}

pub struct Like {
    descriptor: AdapterDescriptor,
    client: Client,
    url: String,
}

impl Like {
    pub fn new(client: Client) -> Self {
        Self {
            descriptor: AdapterDescriptor::new("Like知识库", "https://www.datam.site/")
                .free(false)
                .pay(true)
                .schema(ConfigSchema::new(vec![
                    ConfigField::required("key", FieldKind::String, "API密钥"),
                    ConfigField::optional("model", FieldKind::String, "大语言模型"),
                    ConfigField::optional("search", FieldKind::Boolean, "联网搜索"),
                    ConfigField::optional("vision", FieldKind::Boolean, "视觉理解"),
                ])),
            client,
            url: DEFAULT_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn type_prefix(qtype: QuestionType) -> &'static str {
        match qtype {
            QuestionType::Single => "【单选题】：",
            QuestionType::Multiple => "【多选题】：",
            QuestionType::FillBlank => "【填空题】：",
            QuestionType::Judgement => "【判断题】：",
            QuestionType::Essay => "【问答题】：",
        }
    }

    fn parse_response(&self, data: &Value, query: &Query) -> AnswerOutcome {
        let name = self.name();
        if data.get("message").and_then(Value::as_str) != Some("查询成功") {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("API返回错误");
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, message);
        }

        let Some(output) = data.pointer("/results/output").filter(|o| !o.is_null()) else {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "API返回数据为空");
        };

        // Upstream's own classification of the question.
        let answer_type = match output.get("questionType").and_then(Value::as_str) {
            Some("CHOICE") => QuestionType::Single,
            Some("FILL_IN_BLANK") => QuestionType::FillBlank,
            Some("JUDGMENT") => QuestionType::Judgement,
            Some(other) => {
                return AnswerOutcome::failure(
                    name,
                    query.qtype,
                    ErrorKind::ApiError,
                    format!("不支持的题目类型: {other}"),
                )
            }
            None => {
                return AnswerOutcome::failure(
                    name,
                    query.qtype,
                    ErrorKind::ApiError,
                    "无法识别题目类型",
                )
            }
        };

        let Some(answer) = output.get("answer").filter(|a| !a.is_null()) else {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "答案数据为空");
        };

        match answer_type {
            QuestionType::Single => {
                let keys: Vec<String> = answer
                    .get("selectedOptions")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                if keys.is_empty() {
                    return AnswerOutcome::failure(
                        name,
                        query.qtype,
                        ErrorKind::ApiError,
                        "未找到选项答案",
                    );
                }
                build_choice_answer_from_keys(
                    name,
                    &keys,
                    answer.get("otherText").and_then(Value::as_str),
                    query.options(),
                    query.qtype,
                )
            }
            QuestionType::FillBlank => {
                let blanks: Vec<String> = answer
                    .get("blanks")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                if blanks.is_empty() {
                    return AnswerOutcome::failure(
                        name,
                        query.qtype,
                        ErrorKind::ApiError,
                        "未找到填空答案",
                    );
                }
                AnswerOutcome::text(name, query.qtype, blanks)
            }
            QuestionType::Judgement => match answer.get("isCorrect").and_then(Value::as_bool) {
                Some(value) => AnswerOutcome::judgement(name, value),
                None => AnswerOutcome::failure(
                    name,
                    query.qtype,
                    ErrorKind::ApiError,
                    "未找到判断答案",
                ),
            },
            _ => AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "未处理的题目类型"),
        }
    }
}

#[async_trait]
impl Adapter for Like {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn search(&self, query: &Query, provider: &ProviderChoice) -> AnswerOutcome {
        let name = self.name();
        let config: LikeConfig = match parse_config(&self.descriptor, query, provider) {
            Ok(config) => config,
            Err(outcome) => return *outcome,
        };

        let options_inline = query
            .options()
            .map(|o| serde_json::to_string(o).unwrap_or_default())
            .unwrap_or_else(|| "[]".to_string());
        let body = json!({
            "query": format!("{}{}{}", Self::type_prefix(query.qtype), query.content, options_inline),
            "model": config.model,
            "search": config.search,
            "vision": config.vision,
        });

        let response = match self
            .client
            .post(&self.url)
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
