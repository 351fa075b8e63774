//! Query interpreter.
//!
//! Every expression maps one input value to a stream of outputs (`.[]`
//! yields many, `select` may yield none). Evaluation is total over the
//! closed AST: it either produces values or a [`QueryError::Eval`], and
//! never touches anything but its input.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};

use super::QueryError;
use super::ast::{CmpOp, Expr, Func, StrPart};

/// Bindings visible to a query.
#[derive(Debug, Clone, Default)]
pub struct Env<'a> {
  pub version: Option<&'a str>,
}

type Outputs = Result<Vec<Value>, QueryError>;

pub fn eval(expr: &Expr, input: &Value, env: &Env<'_>) -> Outputs {
  match expr {
    Expr::Identity => Ok(vec![input.clone()]),
    Expr::Literal(value) => Ok(vec![value.clone()]),
    Expr::Version => env
      .version
      .map(|v| vec![Value::String(v.to_string())])
      .ok_or_else(|| QueryError::eval("$version is not bound in this query")),
    Expr::Field(target, name) => each(target, input, env, |value| match value {
      Value::Object(map) => Ok(vec![map.get(name).cloned().unwrap_or(Value::Null)]),
      Value::Null => Ok(vec![Value::Null]),
      other => Err(QueryError::eval(format!(
        "cannot index {} with \"{}\"",
        type_name(&other),
        name
      ))),
    }),
    Expr::Index(target, index) => each(target, input, env, |value| match value {
      Value::Array(items) => {
        let len = items.len() as i64;
        let i = if *index < 0 { len + index } else { *index };
        Ok(vec![
          usize::try_from(i).ok().and_then(|i| items.get(i).cloned()).unwrap_or(Value::Null),
        ])
      }
      Value::Null => Ok(vec![Value::Null]),
      other => Err(QueryError::eval(format!("cannot index {} with a number", type_name(&other)))),
    }),
    Expr::Iterate(target) => each(target, input, env, |value| match value {
      Value::Array(items) => Ok(items),
      Value::Object(map) => Ok(map.into_iter().map(|(_, v)| v).collect()),
      other => Err(QueryError::eval(format!("cannot iterate over {}", type_name(&other)))),
    }),
    Expr::Pipe(left, right) => {
      let mut out = Vec::new();
      for value in eval(left, input, env)? {
        out.extend(eval(right, &value, env)?);
      }
      Ok(out)
    }
    Expr::Str(parts) => {
      let mut strings = vec![String::new()];
      for part in parts {
        match part {
          StrPart::Lit(text) => strings.iter_mut().for_each(|s| s.push_str(text)),
          StrPart::Interp(inner) => {
            let pieces: Vec<String> = eval(inner, input, env)?.iter().map(to_text).collect();
            strings = strings
              .iter()
              .flat_map(|s| pieces.iter().map(move |p| format!("{}{}", s, p)))
              .collect();
          }
        }
      }
      Ok(strings.into_iter().map(Value::String).collect())
    }
    Expr::Add(left, right) => binary(left, right, input, env, add),
    Expr::Compare(left, op, right) => binary(left, right, input, env, |a, b| {
      let equal = values_equal(&a, &b);
      Ok(Value::Bool(if *op == CmpOp::Eq { equal } else { !equal }))
    }),
    Expr::And(left, right) => binary(left, right, input, env, |a, b| Ok(Value::Bool(truthy(&a) && truthy(&b)))),
    Expr::Or(left, right) => binary(left, right, input, env, |a, b| Ok(Value::Bool(truthy(&a) || truthy(&b)))),
    Expr::Array(None) => Ok(vec![Value::Array(Vec::new())]),
    Expr::Array(Some(inner)) => Ok(vec![Value::Array(eval(inner, input, env)?)]),
    Expr::Call(func, args) => call(*func, args, input, env),
  }
}

/// Evaluate `target`, then map each of its outputs through `f`.
fn each<F>(target: &Expr, input: &Value, env: &Env<'_>, mut f: F) -> Outputs
where
  F: FnMut(Value) -> Outputs,
{
  let mut out = Vec::new();
  for value in eval(target, input, env)? {
    out.extend(f(value)?);
  }
  Ok(out)
}

/// Cartesian combination of two operand streams.
fn binary<F>(left: &Expr, right: &Expr, input: &Value, env: &Env<'_>, f: F) -> Outputs
where
  F: Fn(Value, Value) -> Result<Value, QueryError>,
{
  let lefts = eval(left, input, env)?;
  let rights = eval(right, input, env)?;
  let mut out = Vec::with_capacity(lefts.len() * rights.len());
  for r in &rights {
    for l in &lefts {
      out.push(f(l.clone(), r.clone())?);
    }
  }
  Ok(out)
}

fn call(func: Func, args: &[Expr], input: &Value, env: &Env<'_>) -> Outputs {
  match func {
    Func::Select => {
      let mut out = Vec::new();
      for cond in eval(&args[0], input, env)? {
        if truthy(&cond) {
          out.push(input.clone());
        }
      }
      Ok(out)
    }
    Func::Map => {
      let items = as_array(input, "map")?;
      let mut mapped = Vec::new();
      for item in items {
        mapped.extend(eval(&args[0], item, env)?);
      }
      Ok(vec![Value::Array(mapped)])
    }
    Func::SortBy => {
      let items = as_array(input, "sort_by")?;
      let mut keyed = Vec::with_capacity(items.len());
      for item in items {
        keyed.push((Value::Array(eval(&args[0], item, env)?), item.clone()));
      }
      keyed.sort_by(|(a, _), (b, _)| compare_values(a, b));
      Ok(vec![Value::Array(keyed.into_iter().map(|(_, v)| v).collect())])
    }
    Func::First | Func::Last => {
      let last = func == Func::Last;
      match args.first() {
        Some(generator) => {
          let outputs = eval(generator, input, env)?;
          let picked = if last { outputs.last() } else { outputs.first() };
          Ok(picked.cloned().into_iter().collect())
        }
        None => {
          let items = as_array(input, if last { "last" } else { "first" })?;
          let picked = if last { items.last() } else { items.first() };
          Ok(vec![picked.cloned().unwrap_or(Value::Null)])
        }
      }
    }
    Func::Reverse => match input {
      Value::Array(items) => Ok(vec![Value::Array(items.iter().rev().cloned().collect())]),
      Value::String(s) => Ok(vec![Value::String(s.chars().rev().collect())]),
      Value::Null => Ok(vec![Value::Array(Vec::new())]),
      other => Err(QueryError::eval(format!("cannot reverse {}", type_name(other)))),
    },
    Func::Length => {
      let len = match input {
        Value::String(s) => Value::from(s.chars().count()),
        Value::Array(items) => Value::from(items.len()),
        Value::Object(map) => Value::from(map.len()),
        Value::Null => Value::from(0),
        Value::Number(n) => Value::from(n.as_f64().map(f64::abs).unwrap_or(0.0)),
        Value::Bool(_) => return Err(QueryError::eval("boolean has no length")),
      };
      Ok(vec![len])
    }
    Func::ToString => Ok(vec![Value::String(to_text(input))]),
    Func::Not => Ok(vec![Value::Bool(!truthy(input))]),
    Func::LtrimStr | Func::RtrimStr => {
      let mut out = Vec::new();
      for affix in eval(&args[0], input, env)? {
        let trimmed = match (input, &affix) {
          (Value::String(s), Value::String(a)) => {
            let stripped = if func == Func::LtrimStr {
              s.strip_prefix(a.as_str())
            } else {
              s.strip_suffix(a.as_str())
            };
            Value::String(stripped.unwrap_or(s).to_string())
          }
          _ => input.clone(),
        };
        out.push(trimmed);
      }
      Ok(out)
    }
    Func::Test => {
      let text = as_str(input, "test")?;
      let mut out = Vec::new();
      for pattern in eval(&args[0], input, env)? {
        out.push(Value::Bool(regex(&pattern)?.is_match(text)));
      }
      Ok(out)
    }
    Func::Sub | Func::Gsub => {
      let text = as_str(input, if func == Func::Gsub { "gsub" } else { "sub" })?;
      let mut out = Vec::new();
      for pattern in eval(&args[0], input, env)? {
        let re = regex(&pattern)?;
        for replacement in eval(&args[1], input, env)? {
          let replacement = to_text(&replacement);
          let replaced = if func == Func::Gsub {
            re.replace_all(text, replacement.as_str())
          } else {
            re.replace(text, replacement.as_str())
          };
          out.push(Value::String(replaced.into_owned()));
        }
      }
      Ok(out)
    }
    Func::Split => {
      let text = as_str(input, "split")?;
      let mut out = Vec::new();
      for sep in eval(&args[0], input, env)? {
        let sep = as_str(&sep, "split")?;
        let parts: Vec<Value> = if sep.is_empty() {
          text.chars().map(|c| Value::String(c.to_string())).collect()
        } else {
          text.split(sep).map(|p| Value::String(p.to_string())).collect()
        };
        out.push(Value::Array(parts));
      }
      Ok(out)
    }
    Func::Join => {
      let items = as_array(input, "join")?;
      let mut out = Vec::new();
      for sep in eval(&args[0], input, env)? {
        let sep = as_str(&sep, "join")?;
        let mut pieces = Vec::with_capacity(items.len());
        for item in items {
          pieces.push(match item {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Number(_) | Value::Bool(_) => item.to_string(),
            other => return Err(QueryError::eval(format!("cannot join {}", type_name(other)))),
          });
        }
        out.push(Value::String(pieces.join(sep)));
      }
      Ok(out)
    }
  }
}

fn add(a: Value, b: Value) -> Result<Value, QueryError> {
  match (a, b) {
    (Value::Null, other) | (other, Value::Null) => Ok(other),
    (Value::Number(x), Value::Number(y)) => {
      let sum = x.as_f64().unwrap_or(0.0) + y.as_f64().unwrap_or(0.0);
      Ok(
        serde_json::Number::from_f64(sum)
          .map(|n| match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::from(f as i64),
            _ => Value::Number(n),
          })
          .unwrap_or(Value::Null),
      )
    }
    (Value::String(x), Value::String(y)) => Ok(Value::String(x + &y)),
    (Value::Array(mut x), Value::Array(y)) => {
      x.extend(y);
      Ok(Value::Array(x))
    }
    (Value::Object(mut x), Value::Object(y)) => {
      x.extend(y);
      Ok(Value::Object(x))
    }
    (x, y) => Err(QueryError::eval(format!(
      "cannot add {} and {}",
      type_name(&x),
      type_name(&y)
    ))),
  }
}

fn truthy(value: &Value) -> bool {
  !matches!(value, Value::Null | Value::Bool(false))
}

fn values_equal(a: &Value, b: &Value) -> bool {
  compare_values(a, b) == Ordering::Equal
}

/// Total order: null < false < true < numbers < strings < arrays < objects.
fn compare_values(a: &Value, b: &Value) -> Ordering {
  fn rank(v: &Value) -> u8 {
    match v {
      Value::Null => 0,
      Value::Bool(false) => 1,
      Value::Bool(true) => 2,
      Value::Number(_) => 3,
      Value::String(_) => 4,
      Value::Array(_) => 5,
      Value::Object(_) => 6,
    }
  }

  match (a, b) {
    (Value::Number(x), Value::Number(y)) => {
      let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
      x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    }
    (Value::String(x), Value::String(y)) => x.cmp(y),
    (Value::Array(x), Value::Array(y)) => {
      for (l, r) in x.iter().zip(y) {
        let ordering = compare_values(l, r);
        if ordering != Ordering::Equal {
          return ordering;
        }
      }
      x.len().cmp(&y.len())
    }
    (Value::Object(x), Value::Object(y)) => {
      sorted_keys(x).cmp(&sorted_keys(y)).then_with(|| {
        for key in sorted_keys(x) {
          let ordering = compare_values(&x[key], &y[key]);
          if ordering != Ordering::Equal {
            return ordering;
          }
        }
        Ordering::Equal
      })
    }
    _ => rank(a).cmp(&rank(b)),
  }
}

fn sorted_keys(map: &Map<String, Value>) -> Vec<&String> {
  let mut keys: Vec<&String> = map.keys().collect();
  keys.sort();
  keys
}

fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

/// String form used by `tostring`, interpolation and replacements.
pub(crate) fn to_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn as_array<'v>(value: &'v Value, func: &str) -> Result<&'v Vec<Value>, QueryError> {
  match value {
    Value::Array(items) => Ok(items),
    other => Err(QueryError::eval(format!("{} expects an array, got {}", func, type_name(other)))),
  }
}

fn as_str<'v>(value: &'v Value, func: &str) -> Result<&'v str, QueryError> {
  match value {
    Value::String(s) => Ok(s),
    other => Err(QueryError::eval(format!("{} expects a string, got {}", func, type_name(other)))),
  }
}

fn regex(pattern: &Value) -> Result<Regex, QueryError> {
  let pattern = as_str(pattern, "regex")?;
  Regex::new(pattern).map_err(|e| QueryError::eval(format!("invalid regex '{}': {}", pattern, e)))
}
