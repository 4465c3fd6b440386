//! General script functions of the memory backend. Each mirrors the Lua
//! function the emitter produces for the same call, including its edge
//! behavior.

use redsym_core::{RedisError, Value};

pub(crate) fn general_call(name: &str, args: &[Value]) -> Result<Value, RedisError> {
    match name {
        "string.find" => string_find(args),
        "cjson.decode" => match &args[0] {
            Value::Str(text) => Value::from_json(text)
                .map_err(|err| RedisError::script(err.to_string())),
            other => Err(RedisError::script(format!(
                "cannot decode a {} value",
                other.type_name()
            ))),
        },
        "cjson.encode" => Ok(Value::Str(args[0].to_json())),
        "type" => Ok(Value::from(lua_type_name(&args[0]))),
        "tostring" => Ok(Value::Str(args[0].to_display_string())),
        "tonumber" => Ok(args[0].as_number().unwrap_or(Value::Null)),
        "asintstr" => as_int(&args[0]),
        "redis.log" => {
            let level = args[0].to_display_string();
            let message = args[1].to_display_string();
            match level.as_str() {
                "DEBUG" => tracing::debug!(target: "redsym_script", "{message}"),
                "WARNING" => tracing::warn!(target: "redsym_script", "{message}"),
                _ => tracing::info!(target: "redsym_script", "{message}"),
            }
            Ok(Value::Null)
        }
        _ => Err(RedisError::NotImplemented(name.to_string())),
    }
}

fn lua_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "boolean",
        Value::Int(_) | Value::Float(_) => "number",
        Value::Str(_) => "string",
        Value::List(_) | Value::Map(_) => "table",
    }
}

/// Plain-text substring search over bytes; 0-based result or `Null`.
fn string_find(args: &[Value]) -> Result<Value, RedisError> {
    let haystack = args[0].to_display_string();
    let needle = args[1].to_display_string();
    let start = match args.get(2) {
        Some(value) => usize::try_from(value.coerce_int()?).unwrap_or(0),
        None => 0,
    };
    if start > haystack.len() {
        return Ok(Value::Null);
    }
    Ok(haystack[start..]
        .find(&needle)
        .map_or(Value::Null, |ix| Value::from((start + ix) as i64)))
}

/// Floor of a numeric value, like `math.floor`. Numeric strings coerce.
fn as_int(value: &Value) -> Result<Value, RedisError> {
    match value.as_number() {
        Some(Value::Int(n)) => Ok(Value::Int(n)),
        Some(Value::Float(f)) => Ok(Value::Int(f.floor() as i64)),
        _ => Err(RedisError::script(format!(
            "cannot convert a {} value to an integer",
            value.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::general_call;
    use redsym_core::Value;

    #[test]
    fn find_returns_zero_based_or_null() {
        let hit = general_call(
            "string.find",
            &[Value::from("hello"), Value::from("ll")],
        )
        .unwrap();
        assert_eq!(hit, Value::Int(2));
        let miss = general_call(
            "string.find",
            &[Value::from("hello"), Value::from("xyz")],
        )
        .unwrap();
        assert_eq!(miss, Value::Null);
        let offset = general_call(
            "string.find",
            &[Value::from("abcabc"), Value::from("a"), Value::Int(1)],
        )
        .unwrap();
        assert_eq!(offset, Value::Int(3));
    }

    #[test]
    fn asintstr_floors_like_lua() {
        assert_eq!(
            general_call("asintstr", &[Value::Float(3.7)]).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            general_call("asintstr", &[Value::Float(-3.7)]).unwrap(),
            Value::Int(-4)
        );
        assert_eq!(
            general_call("asintstr", &[Value::from("5")]).unwrap(),
            Value::Int(5)
        );
    }

    #[test]
    fn tonumber_yields_null_on_garbage() {
        assert_eq!(
            general_call("tonumber", &[Value::from("2.5")]).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            general_call("tonumber", &[Value::from("abc")]).unwrap(),
            Value::Null
        );
        assert_eq!(
            general_call("tonumber", &[Value::Null]).unwrap(),
            Value::Null
        );
    }
}
