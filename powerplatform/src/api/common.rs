//! Common types and utilities for the Power Platform APIs

use reqwest::header::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize};

use super::error::ApiError;

/// Raw response returned by `Client::execute`
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }

    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ApiError> {
        serde_json::from_str::<T>(&self.body).map_err(|e| {
            tracing::error!("Failed to deserialize response: {}, body: {}", e, self.body);
            ApiError::ParseError(format!("Failed to parse response: {}", e))
        })
    }
}

/// `{ "value": [...] }` envelope used by most list endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArrayResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

impl<T> Default for ArrayResponse<T> {
    fn default() -> Self {
        Self { value: Vec::new() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiQueryParams {
    params: Vec<(String, String)>,
}

impl ApiQueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_version(version: &str) -> Self {
        Self::new().add(crate::config::API_VERSION_PARAM, version)
    }

    pub fn add<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn add_optional<K: Into<String>, V: ToString>(mut self, key: K, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.params.push((key.into(), v.to_string()));
        }
        self
    }

    pub fn to_query_string(&self) -> String {
        if self.params.is_empty() {
            String::new()
        } else {
            format!(
                "?{}",
                self.params
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                    .collect::<Vec<_>>()
                    .join("&")
            )
        }
    }
}

/// Build `{base}{path}{query}`
pub fn build_url(base: &str, path: &str, params: &ApiQueryParams) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}{}", base, path, params.to_query_string())
}

/// Last segment of a `/`-separated path
pub fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// Governance settings travel as `"true"`/`"false"` strings
pub mod string_bool {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrBool {
            String(String),
            Bool(bool),
        }

        match Option::<StringOrBool>::deserialize(deserializer)? {
            Some(StringOrBool::String(s)) => Ok(s.eq_ignore_ascii_case("true")),
            Some(StringOrBool::Bool(b)) => Ok(b),
            None => Ok(false),
        }
    }
}

/// Integers that some endpoints send as strings
pub mod string_or_i64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrI64 {
            String(String),
            I64(i64),
        }

        match Option::<StringOrI64>::deserialize(deserializer)? {
            Some(StringOrI64::String(s)) if s.trim().is_empty() => Ok(0),
            Some(StringOrI64::String(s)) => s.trim().parse::<i64>().map_err(serde::de::Error::custom),
            Some(StringOrI64::I64(i)) => Ok(i),
            None => Ok(0),
        }
    }
}

/// Treat `null` the same as a missing field
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Copy of `actual` holding only the fields that are set in `configured`
///
/// Settings endpoints always answer with every setting. Nested objects are
/// filtered field by field.
pub fn configured_fields<T>(configured: &T, actual: &T) -> Result<T, ApiError>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    let to_json = |value: &T| {
        serde_json::to_value(value).map_err(|e| ApiError::ParseError(e.to_string()))
    };
    let filtered = filter_fields(&to_json(configured)?, &to_json(actual)?);
    serde_json::from_value(filtered).map_err(|e| ApiError::ParseError(e.to_string()))
}

fn filter_fields(configured: &serde_json::Value, actual: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match (configured, actual) {
        (Value::Object(configured), Value::Object(actual)) => Value::Object(
            configured
                .iter()
                .filter(|(_, value)| !value.is_null())
                .filter_map(|(key, value)| {
                    let actual = actual.get(key).filter(|v| !v.is_null())?;
                    Some((key.clone(), filter_fields(value, actual)))
                })
                .collect(),
        ),
        (_, actual) => actual.clone(),
    }
}
