//! Native providers for `🗒`/JSON (§4.K), bridging `serde_json::Value`
//! against the runtime's own dynamic representation: `Integer`/`Double`/
//! `Boolean`/`String`/`List`/`Dictionary`/nothingness-for-null.
use serde_json::Value;

use crate::packages::NativeMethod;
use crate::prelude;
use crate::vm::{InterpreterError, ObjectKind, Something, Vm};

fn value_from_json(vm: &mut Vm, value: Value) -> Result<Something, InterpreterError> {
    match value {
        Value::Null => Ok(Something::NOTHINGNESS),
        Value::Bool(b) => Ok(Something::Boolean(b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Something::Integer(i))
            } else {
                Ok(Something::Double(n.as_f64().unwrap_or(0.0)))
            }
        }
        Value::String(s) => vm.new_string(&s),
        Value::Array(items) => {
            let mut elements = Vec::with_capacity(items.len());
            for item in items {
                elements.push(value_from_json(vm, item)?);
            }
            vm.new_list(elements)
        }
        Value::Object(map) => {
            let mut pairs = Vec::with_capacity(map.len() * 2);
            for (key, value) in map {
                pairs.push(vm.new_string(&key)?);
                pairs.push(value_from_json(vm, value)?);
            }
            crate::builtins::dictionary::new_dictionary(vm, &pairs)
        }
    }
}

fn json_from_value(vm: &mut Vm, value: Something) -> Value {
    match value {
        Something::Integer(i) => Value::from(i),
        Something::Double(d) => serde_json::Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null),
        Something::Boolean(b) => Value::Bool(b),
        Something::Symbol(c) => Value::String(c.to_string()),
        Something::Class(idx) => Value::String(vm.runtime.program.classes[idx].name.to_string()),
        Something::Object(_) if value.is_nothingness() => Value::Null,
        Something::Object(r) => {
            let kind_tag = vm.with_object(r, |o| match &o.kind {
                ObjectKind::StringChars(_) => 0u8,
                ObjectKind::RawArray(_) => 1,
                ObjectKind::DictionaryBuckets(_) => 2,
                _ => 3,
            });
            match kind_tag {
                0 => Value::String(vm.with_object(r, |o| match &o.kind {
                    ObjectKind::StringChars(chars) => chars.iter().collect(),
                    _ => unreachable!(),
                })),
                1 => {
                    let items = vm.with_object(r, |o| match &o.kind {
                        ObjectKind::RawArray(items) => items.clone(),
                        _ => unreachable!(),
                    });
                    Value::Array(items.into_iter().map(|item| json_from_value(vm, item)).collect())
                }
                2 => {
                    let buckets = vm.with_object(r, |o| match &o.kind {
                        ObjectKind::DictionaryBuckets(buckets) => buckets.clone(),
                        _ => unreachable!(),
                    });
                    let mut map = serde_json::Map::new();
                    for bucket in buckets {
                        if let crate::builtins::dictionary::Bucket::Occupied { key, value } = bucket {
                            let key_string = vm.with_object(key.as_object().expect("Dictionary key must be a String"), |o| {
                                match &o.kind {
                                    ObjectKind::StringChars(chars) => chars.iter().collect::<String>(),
                                    _ => unreachable!(),
                                }
                            });
                            map.insert(key_string, json_from_value(vm, value));
                        }
                    }
                    Value::Object(map)
                }
                _ => Value::Null,
            }
        }
    }
}

fn parse(vm: &mut Vm, _receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let r = args[0].as_object().expect("JSON parse argument must be a String");
    let text: String = vm.with_object(r, |o| match &o.kind {
        ObjectKind::StringChars(chars) => chars.iter().collect(),
        _ => panic!("expected a String object"),
    });
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => value_from_json(vm, value),
        Err(_) => Ok(Something::NOTHINGNESS),
    }
}

fn stringify(vm: &mut Vm, _receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let value = json_from_value(vm, args[0]);
    let text = serde_json::to_string(&value).unwrap_or_default();
    vm.new_string(&text)
}

pub fn resolve_type_method(member: char) -> Option<NativeMethod> {
    match member {
        prelude::JSON_PARSE => Some(parse),
        prelude::JSON_STRINGIFY => Some(stringify),
        _ => None,
    }
}
