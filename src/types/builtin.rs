//! Built-in types registered into every new registry.

use super::descriptor::{TypeDescriptor, Validator};
use super::value::Value;
use super::{TypeFactory, TypeRegistry};
use base64::Engine;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Registers the built-in types and type factories.
pub fn register_builtins(registry: &TypeRegistry) {
    for descriptor in [
        bool_type(),
        integer_type(),
        float_type(),
        string_type(),
        path_type(),
        bytes_type(),
        map_type(),
        fixed_int_type("uint8", 1, 0, u8::MAX as i64),
        fixed_int_type("uint16", 2, 0, u16::MAX as i64),
        fixed_int_type("uint32", 4, 0, u32::MAX as i64),
        fixed_int_type("int32", 4, i32::MIN as i64, i32::MAX as i64),
    ] {
        registry.install(descriptor);
    }

    registry.install_factory(TypeFactory::new("list", 1, build_list));
    registry.install_factory(TypeFactory::new("map", 1, build_map));
}

fn display(value: &Value) -> String {
    value.to_display_string()
}

fn bool_type() -> TypeDescriptor {
    TypeDescriptor::new(
        "bool",
        |text| match text.trim().to_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err("unknown boolean value (should be true or false)".to_string()),
        },
        display,
    )
    .with_description("true or false")
}

/// Parses a signed integer, honoring `0x`, `0o` and `0b` prefixes.
pub fn parse_integer(text: &str) -> Result<i64, String> {
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let lowered = unsigned.to_ascii_lowercase();
    let (radix, digits) = if let Some(rest) = lowered.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = lowered.strip_prefix("0o") {
        (8, rest)
    } else if let Some(rest) = lowered.strip_prefix("0b") {
        (2, rest)
    } else {
        (10, lowered.as_str())
    };

    if digits.starts_with(['+', '-']) {
        return Err("invalid digit found in string".to_string());
    }

    let magnitude = i128::from_str_radix(digits, radix).map_err(|e| e.to_string())?;
    let signed = if negative { -magnitude } else { magnitude };
    i64::try_from(signed).map_err(|_| "number too large to fit in target type".to_string())
}

fn integer_bounds(args: &[Value]) -> Result<(i64, i64), String> {
    match args {
        [lower, upper] => match (lower.as_integer(), upper.as_integer()) {
            (Some(lower), Some(upper)) => Ok((lower, upper)),
            _ => Err("range bounds must be integers".to_string()),
        },
        _ => Err("range takes exactly two arguments".to_string()),
    }
}

fn float_bounds(args: &[Value]) -> Result<(f64, f64), String> {
    match args {
        [lower, upper] => match (lower.as_float(), upper.as_float()) {
            (Some(lower), Some(upper)) => Ok((lower, upper)),
            _ => Err("range bounds must be numbers".to_string()),
        },
        _ => Err("range takes exactly two arguments".to_string()),
    }
}

fn integer_type() -> TypeDescriptor {
    TypeDescriptor::new("integer", |text| parse_integer(text).map(Value::Integer), display)
        .with_alias("int")
        .with_description("signed 64-bit integer (decimal, 0x, 0o or 0b)")
        .with_formatter("hex", |value| match value {
            Value::Integer(i) => format!("0x{i:X}"),
            other => other.to_display_string(),
        })
        .with_formatter("unsigned", |value| match value {
            Value::Integer(i) => (*i as u64).to_string(),
            other => other.to_display_string(),
        })
        .with_validator_factory("positive", |_| {
            Ok(Validator::check("positive", |value| match value.as_integer() {
                Some(i) if i <= 0 => Err("value is not positive".to_string()),
                _ => Ok(()),
            }))
        })
        .with_validator_factory("nonnegative", |_| {
            Ok(Validator::check("nonnegative", |value| match value.as_integer() {
                Some(i) if i < 0 => Err("value is negative".to_string()),
                _ => Ok(()),
            }))
        })
        .with_validator_factory("range", |args| {
            let (lower, upper) = integer_bounds(args)?;
            Ok(Validator::check("range", move |value| match value.as_integer() {
                Some(i) if i < lower || i > upper => {
                    Err(format!("not in required range [{lower}, {upper}]"))
                }
                _ => Ok(()),
            }))
        })
}

fn float_type() -> TypeDescriptor {
    TypeDescriptor::new(
        "float",
        |text| {
            text.trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| e.to_string())
        },
        display,
    )
    .with_description("64-bit floating point number")
    .with_validator_factory("positive", |_| {
        Ok(Validator::check("positive", |value| match value.as_float() {
            Some(f) if f <= 0.0 => Err("value is not positive".to_string()),
            _ => Ok(()),
        }))
    })
    .with_validator_factory("nonnegative", |_| {
        Ok(Validator::check("nonnegative", |value| match value.as_float() {
            Some(f) if f < 0.0 => Err("value is negative".to_string()),
            _ => Ok(()),
        }))
    })
    .with_validator_factory("range", |args| {
        let (lower, upper) = float_bounds(args)?;
        Ok(Validator::check("range", move |value| match value.as_float() {
            Some(f) if f < lower || f > upper => {
                Err(format!("not in required range [{lower}, {upper}]"))
            }
            _ => Ok(()),
        }))
    })
}

fn string_type() -> TypeDescriptor {
    TypeDescriptor::new("string", |text| Ok(Value::String(text.to_string())), display)
        .with_alias("str")
        .with_description("arbitrary text")
        .with_formatter("repr", |value| match value {
            Value::String(s) => format!("{s:?}"),
            other => other.to_display_string(),
        })
        .with_validator_factory("not_empty", |_| {
            Ok(Validator::check("not_empty", |value| match value.as_str() {
                Some("") => Err("string cannot be empty".to_string()),
                _ => Ok(()),
            }))
        })
        .with_validator_factory("list", |args| {
            let choices: Vec<String> = args.iter().map(Value::to_display_string).collect();
            Ok(Validator::check("list", move |value| match value.as_str() {
                Some(s) if !choices.iter().any(|c| c == s) => {
                    Err(format!("value not in list: {}", choices.join(", ")))
                }
                _ => Ok(()),
            }))
        })
        .with_validator_factory("matches", |args| {
            let [pattern] = args else {
                return Err("matches takes exactly one argument".to_string());
            };
            let pattern = pattern.to_display_string();
            let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| e.to_string())?;
            Ok(Validator::check("matches", move |value| match value.as_str() {
                Some(s) if !regex.is_match(s) => Err(format!("does not match '{pattern}'")),
                _ => Ok(()),
            }))
        })
}

fn as_path(value: &Value) -> Option<&Path> {
    match value {
        Value::Path(p) => Some(p),
        _ => None,
    }
}

fn path_type() -> TypeDescriptor {
    TypeDescriptor::new("path", |text| Ok(Value::Path(PathBuf::from(text))), display)
        .with_description("filesystem path")
        .with_validator_factory("exists", |_| {
            Ok(Validator::check("exists", |value| match as_path(value) {
                Some(p) if !p.exists() => Err("path must exist".to_string()),
                _ => Ok(()),
            }))
        })
        .with_validator_factory("readable", |_| {
            Ok(Validator::check("readable", |value| {
                let Some(path) = as_path(value) else {
                    return Ok(());
                };
                if !path.is_file() {
                    return Err("path is not a file".to_string());
                }
                File::open(path)
                    .map(|_| ())
                    .map_err(|_| "path could not be opened for reading".to_string())
            }))
        })
        .with_validator_factory("writeable", |_| {
            Ok(Validator::check("writeable", |value| {
                let Some(path) = as_path(value) else {
                    return Ok(());
                };
                let parent = match path.parent() {
                    Some(p) if !p.as_os_str().is_empty() => p,
                    _ => Path::new("."),
                };
                if parent.is_dir() {
                    Ok(())
                } else {
                    Err("parent directory does not exist".to_string())
                }
            }))
        })
}

fn bytes_type() -> TypeDescriptor {
    TypeDescriptor::new(
        "bytes",
        |text| match text.strip_prefix("0x") {
            Some(encoded) => hex::decode(encoded).map(Value::Bytes).map_err(|e| e.to_string()),
            None => Ok(Value::Bytes(text.as_bytes().to_vec())),
        },
        display,
    )
    .with_description("binary data (0x-prefixed hex or raw text)")
    .with_binary(None, |data| Ok(Value::Bytes(data.to_vec())))
    .with_formatter("base64", |value| match value {
        Value::Bytes(b) => base64::engine::general_purpose::STANDARD.encode(b),
        other => other.to_display_string(),
    })
    .with_formatter("repr", |value| match value {
        Value::Bytes(b) => format!("{:?}", String::from_utf8_lossy(b)),
        other => other.to_display_string(),
    })
}

fn fixed_int_type(name: &'static str, size: usize, min: i64, max: i64) -> TypeDescriptor {
    TypeDescriptor::new(
        name,
        move |text| {
            let value = parse_integer(text)?;
            if value < min || value > max {
                return Err(format!("out of range for {name} [{min}, {max}]"));
            }
            Ok(Value::Integer(value))
        },
        display,
    )
    .with_description(format!("{}-byte little-endian integer", size))
    .with_binary(Some(size), move |data| {
        let value = match (name, data) {
            ("uint8", [b]) => i64::from(*b),
            ("uint16", [a, b]) => i64::from(u16::from_le_bytes([*a, *b])),
            ("uint32", [a, b, c, d]) => i64::from(u32::from_le_bytes([*a, *b, *c, *d])),
            ("int32", [a, b, c, d]) => i64::from(i32::from_le_bytes([*a, *b, *c, *d])),
            _ => return Err(format!("unsupported layout for {name}")),
        };
        Ok(Value::Integer(value))
    })
    .with_formatter("hex", move |value| match value {
        Value::Integer(i) => format!("0x{:0width$X}", i, width = size * 2),
        other => other.to_display_string(),
    })
}

fn parse_json_object(text: &str) -> Result<serde_json::Map<String, serde_json::Value>, String> {
    match serde_json::from_str::<serde_json::Value>(text).map_err(|e| e.to_string())? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err("expected a JSON object".to_string()),
    }
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_display_string())
}

fn map_type() -> TypeDescriptor {
    TypeDescriptor::new(
        "map",
        |text| parse_json_object(text).map(|map| Value::from(serde_json::Value::Object(map))),
        to_pretty_json,
    )
    .with_description("JSON object")
    .with_formatter("one_line", |value| match value {
        Value::Map(_) => serde_json::to_string(value).unwrap_or_else(|_| value.to_display_string()),
        other => other.to_display_string(),
    })
}

/// Text handed to an element converter: JSON strings unquoted, anything
/// else in its JSON spelling.
fn element_text(element: &serde_json::Value) -> String {
    match element {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn build_list(name: &str, args: &[Arc<TypeDescriptor>]) -> Result<TypeDescriptor, String> {
    let [inner] = args else {
        return Err("list must be created with 1 argument, a value type".to_string());
    };
    let convert_inner = inner.clone();
    let format_inner = inner.clone();
    let compact_inner = inner.clone();

    Ok(TypeDescriptor::new(
        name,
        move |text| {
            let trimmed = text.trim();
            let elements: Vec<String> = if trimmed.starts_with('[') {
                match serde_json::from_str::<serde_json::Value>(trimmed) {
                    Ok(serde_json::Value::Array(items)) => items.iter().map(element_text).collect(),
                    Ok(_) => return Err("expected a JSON array".to_string()),
                    Err(e) => return Err(e.to_string()),
                }
            } else if trimmed.is_empty() {
                Vec::new()
            } else {
                trimmed.split(',').map(|s| s.trim().to_string()).collect()
            };

            elements
                .iter()
                .map(|element| convert_inner.convert(element).map_err(|e| e.to_string()))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List)
        },
        move |value| match value {
            Value::List(items) => items
                .iter()
                .map(|item| format_inner.format_default(item))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_display_string(),
        },
    )
    .lossy()
    .with_description(format!("list of {}", inner.name()))
    .with_formatter("compact", move |value| match value {
        Value::List(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| compact_inner.format_default(item))
                .collect();
            format!("[{}]", parts.join(", "))
        }
        other => other.to_display_string(),
    }))
}

fn build_map(name: &str, args: &[Arc<TypeDescriptor>]) -> Result<TypeDescriptor, String> {
    let [inner] = args else {
        return Err("map must be created with 1 argument, a value type".to_string());
    };
    let convert_inner = inner.clone();
    let format_inner = inner.clone();

    let descriptor = TypeDescriptor::new(
        name,
        move |text| {
            let object = parse_json_object(text)?;
            object
                .iter()
                .map(|(key, element)| {
                    convert_inner
                        .convert(&element_text(element))
                        .map(|value| (key.clone(), value))
                        .map_err(|e| e.to_string())
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Value::Map)
        },
        move |value| match value {
            Value::Map(map) => {
                let rendered: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(format_inner.format_default(v))))
                    .collect();
                serde_json::to_string_pretty(&rendered).unwrap_or_else(|_| value.to_display_string())
            }
            other => other.to_display_string(),
        },
    )
    .with_description(format!("JSON object of {}", inner.name()));

    // Values are written with the element type's default formatter.
    Ok(if inner.is_lossy() {
        descriptor.lossy()
    } else {
        descriptor
    })
}
