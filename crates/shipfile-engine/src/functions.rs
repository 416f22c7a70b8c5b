//! Template functions (global functions available in templates)

use minijinja::{Error, ErrorKind, Value};
use shipfile_core::{FileSystem, LookupError, lookup_path, normalize_keys};
use std::path::PathBuf;
use std::sync::Arc;

fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

fn lookup_error(err: LookupError) -> Error {
    let kind = if err.is_no_such_key() {
        ErrorKind::UndefinedError
    } else {
        ErrorKind::InvalidOperation
    };
    Error::new(kind, err.to_string())
}

/// Fail with a custom error message
///
/// Usage: {{ fail("Something went wrong") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, message))
}

/// Create a dict from key-value pairs
///
/// Usage: {{ dict("key1", value1, "key2", value2) }}
pub fn dict(args: Vec<Value>) -> Result<Value, Error> {
    if !args.len().is_multiple_of(2) {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "dict requires an even number of arguments (key-value pairs)",
        ));
    }

    let mut map = serde_json::Map::new();

    for chunk in args.chunks(2) {
        let key = chunk[0]
            .as_str()
            .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "dict keys must be strings"))?;
        map.insert(key.to_string(), to_json(&chunk[1])?);
    }

    Ok(Value::from_serialize(serde_json::Value::Object(map)))
}

/// Create a list from values
///
/// Usage: {{ list("a", "b", "c") }}
pub fn list(args: Vec<Value>) -> Value {
    Value::from(args)
}

/// Look up a dotted path, failing on any missing segment
///
/// With a third argument, a missing key yields that default instead.
///
/// Usage: {{ get("Foo.Bar", values) }}
pub fn get(path: String, obj: Value, default: Option<Value>) -> Result<Value, Error> {
    let tree = to_json(&obj)?;
    match lookup_path(&tree, &path) {
        Ok(found) => Ok(Value::from_serialize(found)),
        Err(err) => match default {
            Some(default) if err.is_no_such_key() => Ok(default),
            _ => Err(lookup_error(err)),
        },
    }
}

/// Look up a dotted path, yielding `none` when a key is missing
///
/// Only a missing key is recovered from; walking into a non-mapping is
/// still an error.
///
/// Usage: {{ getOrNil("Foo.Bar", values) }}
pub fn get_or_nil(path: String, obj: Value) -> Result<Value, Error> {
    let tree = to_json(&obj)?;
    match lookup_path(&tree, &path) {
        Ok(found) => Ok(Value::from_serialize(found)),
        Err(err) if err.is_no_such_key() => Ok(Value::from(())),
        Err(err) => Err(lookup_error(err)),
    }
}

/// Return first non-empty value
///
/// Usage: {{ coalesce(a, b, c) }}
pub fn coalesce(args: Vec<Value>) -> Value {
    for arg in args {
        if arg.is_undefined() || arg.is_none() {
            continue;
        }
        match arg.as_str() {
            Some(s) if s.is_empty() => continue,
            _ => return arg,
        }
    }
    Value::UNDEFINED
}

/// Ternary operator
///
/// Usage: {{ ternary(true_value, false_value, condition) }}
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() {
        true_val
    } else {
        false_val
    }
}

/// Read an environment variable, empty when unset
///
/// Usage: {{ env("HOME") }}
pub fn env(name: String) -> String {
    std::env::var(&name).unwrap_or_default()
}

/// Read an environment variable that must be set and non-empty
///
/// Usage: {{ requiredEnv("KUBE_CONTEXT") }}
pub fn required_env(name: String) -> Result<String, Error> {
    match std::env::var(&name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("required env var `{}` is not set", name),
        )),
    }
}

/// Serialize a value as YAML
///
/// Usage: {{ toYaml(values.config) }}
pub fn to_yaml(value: Value) -> Result<String, Error> {
    crate::filters::toyaml(value)
}

/// Parse a YAML string; mapping keys are normalized to strings
///
/// Usage: {% set cfg = fromYaml(readFile("config.yaml")) %}
pub fn from_yaml(text: String) -> Result<Value, Error> {
    let raw: serde_yaml::Value = serde_yaml::from_str(&text)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("invalid YAML: {}", e)))?;
    Ok(Value::from_serialize(normalize_keys(raw)))
}

/// Serialize a value as JSON
///
/// Usage: {{ toJson(values.config) }}
pub fn to_json_fn(value: Value) -> Result<String, Error> {
    crate::filters::tojson(value)
}

/// Parse a JSON string
///
/// Usage: {% set cfg = fromJson(text) %}
pub fn from_json(text: String) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("invalid JSON: {}", e)))?;
    Ok(Value::from_serialize(parsed))
}

/// Build `readFile` bound to one manifest's base directory
///
/// Usage: {{ readFile("files/config.ini") }}
pub fn read_file(
    fs: Arc<dyn FileSystem>,
    base_dir: PathBuf,
) -> impl Fn(String) -> Result<String, Error> + Send + Sync + 'static {
    move |path: String| {
        let abs = fs.abs_path(std::path::Path::new(&path), &base_dir);
        fs.read_to_string(&abs)
            .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
    }
}
