//! Response Envelope
//!
//! Every engine call returns `{status, message, data, errors?}`.
//! `data.type` is one of `single`, `multiple`, `paginated`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::QueryError;

/// Field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Uniform success/failure envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: bool,
    pub message: String,
    pub data: Option<ResponseData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl Response {
    pub fn success(message: impl Into<String>, data: ResponseData) -> Self {
        Self {
            status: true,
            message: message.into(),
            data: Some(data),
            errors: None,
        }
    }

    /// Success without a body (e.g. delete)
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            status: true,
            message: message.into(),
            data: None,
            errors: None,
        }
    }

    pub fn single(message: impl Into<String>, item: Value) -> Self {
        Self::success(message, ResponseData::Single { item })
    }

    pub fn multiple(message: impl Into<String>, items: Vec<Value>) -> Self {
        Self::success(message, ResponseData::Multiple { items })
    }

    pub fn paginated(message: impl Into<String>, page: Page) -> Self {
        Self::success(message, ResponseData::Paginated(page))
    }

    /// Failed call; `data` is always null
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: false,
            message: message.into(),
            data: None,
            errors: None,
        }
    }

    /// Payload validation rejected the request
    pub fn validation_failed(errors: Vec<FieldError>) -> Self {
        Self {
            status: false,
            message: "Validation failed".to_string(),
            data: None,
            errors: Some(errors),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status
    }

    /// The single item, if this is a `single` response
    pub fn item(&self) -> Option<&Value> {
        match &self.data {
            Some(ResponseData::Single { item }) => Some(item),
            _ => None,
        }
    }

    /// Items of a `multiple` or `paginated` response
    pub fn items(&self) -> Option<&[Value]> {
        match &self.data {
            Some(ResponseData::Multiple { items }) => Some(items),
            Some(ResponseData::Paginated(page)) => Some(&page.items),
            _ => None,
        }
    }

    pub fn page(&self) -> Option<&Page> {
        match &self.data {
            Some(ResponseData::Paginated(page)) => Some(page),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<&QueryError> for Response {
    fn from(err: &QueryError) -> Self {
        Response::failure(err.to_string())
    }
}

/// The three result shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseData {
    Single { item: Value },
    Multiple { items: Vec<Value> },
    Paginated(Page),
}

impl ResponseData {
    pub fn type_name(&self) -> &'static str {
        match self {
            ResponseData::Single { .. } => "single",
            ResponseData::Multiple { .. } => "multiple",
            ResponseData::Paginated(_) => "paginated",
        }
    }
}

/// A page of a list result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<Value>,
    pub total_items: u64,
    pub current_page: u64,
    pub next_page: Option<u64>,
    pub prev_page: Option<u64>,
    pub total_pages: u64,
}

impl Page {
    /// Build page metadata from the window (`skip`, `limit`) and the
    /// independently counted total. `limit` of zero is treated as one.
    pub fn new(items: Vec<Value>, total_items: u64, skip: u64, limit: u64) -> Self {
        let limit = limit.max(1);
        let index = skip / limit;

        Self {
            items,
            total_items,
            current_page: index.saturating_add(1),
            next_page: (skip.saturating_add(limit) < total_items).then_some(index.saturating_add(2)),
            prev_page: (skip >= limit).then_some(index),
            total_pages: total_items.div_ceil(limit),
        }
    }
}
