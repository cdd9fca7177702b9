//! Provider adapters: one module per upstream question bank or LLM API.
//!
//! Every adapter normalizes its upstream's wire format into an
//! [`AnswerOutcome`](crate::types::AnswerOutcome) and never lets an
//! upstream failure escape as an error.

mod axe;
mod enncy;
mod everyapi;
mod icodef;
mod lemon;
mod like;
mod local;
mod siliconflow;
pub mod text;
mod tikuhai;
mod wanneng;
mod zxseek;

pub use axe::Axe;
pub use enncy::Enncy;
pub use everyapi::EveryApi;
pub use icodef::Icodef;
pub use lemon::Lemon;
pub use like::Like;
pub use local::LocalCache;
pub use siliconflow::SiliconFlow;
pub use tikuhai::Tikuhai;
pub use wanneng::Wanneng;
pub use zxseek::Zxseek;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::adapter::AdapterDescriptor;
use crate::types::{AnswerOutcome, ErrorKind, ProviderChoice, Query};

/// Deadline for question-bank HTTP calls.
pub(crate) const BANK_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for LLM-backed upstreams, which answer much slower.
pub(crate) const LLM_TIMEOUT: Duration = Duration::from_secs(30);

/// Validate a provider's config against the adapter schema and extract the
/// adapter's typed view of it. Any problem becomes a ready-made
/// `config_error` outcome for the adapter to return as-is.
pub(crate) fn parse_config<T: DeserializeOwned>(
    descriptor: &AdapterDescriptor,
    query: &Query,
    provider: &ProviderChoice,
) -> Result<T, Box<AnswerOutcome>> {
    let config_map = provider.config_map();
    if let Err(message) = descriptor.config_schema.validate(&config_map) {
        return Err(Box::new(AnswerOutcome::failure(
            &descriptor.name,
            query.qtype,
            ErrorKind::ConfigError,
            message,
        )));
    }
    serde_json::from_value(Value::Object(config_map)).map_err(|error| {
        Box::new(AnswerOutcome::failure(
            &descriptor.name,
            query.qtype,
            ErrorKind::ConfigError,
            format!("配置参数错误: {error}"),
        ))
    })
}
