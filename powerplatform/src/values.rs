//! Conversions between Terraform values and plain Rust values

use tf_provider::value::Value;

pub type StringList = Value<Vec<Value<String>>>;

pub fn string(value: impl Into<String>) -> Value<String> {
    Value::Value(value.into())
}

/// Empty strings become null
pub fn string_or_null(value: impl Into<String>) -> Value<String> {
    let value = value.into();
    if value.is_empty() {
        Value::Null
    } else {
        Value::Value(value)
    }
}

pub fn known<T>(value: &Value<T>) -> Option<&T> {
    match value {
        Value::Value(v) => Some(v),
        _ => None,
    }
}

pub fn is_known<T>(value: &Value<T>) -> bool {
    matches!(value, Value::Value(_))
}

pub fn is_unknown<T>(value: &Value<T>) -> bool {
    matches!(value, Value::Unknown)
}

/// Known, non-empty string
pub fn known_str(value: &Value<String>) -> Option<&str> {
    known(value).map(String::as_str).filter(|s| !s.is_empty())
}

pub fn str_or_empty(value: &Value<String>) -> &str {
    known(value).map(String::as_str).unwrap_or_default()
}

pub fn bool_or(value: &Value<bool>, default: bool) -> bool {
    known(value).copied().unwrap_or(default)
}

pub fn list<T>(items: impl IntoIterator<Item = T>) -> Value<Vec<Value<T>>> {
    Value::Value(items.into_iter().map(Value::Value).collect())
}

pub fn string_list<S: Into<String>>(items: impl IntoIterator<Item = S>) -> StringList {
    list(items.into_iter().map(Into::into))
}

/// Known elements of a string list
pub fn strings(value: &StringList) -> Vec<String> {
    known(value)
        .map(|items| items.iter().filter_map(|v| known(v).cloned()).collect())
        .unwrap_or_default()
}

/// Known elements of an object list
pub fn items<T>(value: &Value<Vec<Value<T>>>) -> Vec<&T> {
    known(value)
        .map(|items| items.iter().filter_map(known).collect())
        .unwrap_or_default()
}

/// Known value as an `Option`, null and unknown both become `None`
pub fn to_option<T: Clone>(value: &Value<T>) -> Option<T> {
    known(value).cloned()
}

pub fn from_option<T>(value: Option<T>) -> Value<T> {
    value.map(Value::Value).unwrap_or(Value::Null)
}

/// Keep `current` unless it is unknown, in which case use `fallback`
pub fn or_prior<T: Clone>(current: &Value<T>, fallback: &Value<T>) -> Value<T> {
    match current {
        Value::Unknown => fallback.clone(),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_strings_become_null() {
        assert_eq!(string_or_null(""), Value::Null);
        assert_eq!(string_or_null("x"), Value::Value("x".to_string()));
    }

    #[test]
    fn strings_skip_unknown_elements() {
        let value: StringList = Value::Value(vec![
            Value::Value("a".to_string()),
            Value::Unknown,
            Value::Value("b".to_string()),
        ]);
        assert_eq!(strings(&value), vec!["a", "b"]);
        assert!(strings(&Value::Null).is_empty());
    }

    #[test]
    fn known_str_ignores_empty_and_unknown() {
        assert_eq!(known_str(&string("id")), Some("id"));
        assert_eq!(known_str(&string("")), None);
        assert_eq!(known_str(&Value::Unknown), None);
        assert_eq!(str_or_empty(&Value::Null), "");
    }

    #[test]
    fn options_map_to_null() {
        assert_eq!(to_option(&Value::<bool>::Unknown), None);
        assert_eq!(to_option(&Value::Value(3)), Some(3));
        assert_eq!(from_option::<bool>(None), Value::Null);
    }

    #[test]
    fn or_prior_replaces_unknown_only() {
        let prior = string("prior");
        assert_eq!(or_prior(&Value::Unknown, &prior), prior);
        assert_eq!(or_prior(&Value::Null, &prior), Value::Null);
    }
}
