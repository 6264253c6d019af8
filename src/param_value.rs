use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A closed union of every value shape a processing parameter can take.
///
/// Parsing from text never fails: input that matches no richer shape falls
/// back to `String`, and a cast into a declared type that cannot be performed
/// resolves to `Uninitialized` at the call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Uninitialized,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    String(String),
    BoolList(Vec<bool>),
    IntList(Vec<i32>),
    FloatList(Vec<f32>),
    StringList(Vec<String>),
}

impl Default for ParamValue {
    fn default() -> Self {
        ParamValue::Uninitialized
    }
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Uninitialized => "uninitialized",
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Long(_) => "long",
            ParamValue::Float(_) => "float",
            ParamValue::String(_) => "string",
            ParamValue::BoolList(_) => "bool_list",
            ParamValue::IntList(_) => "int_list",
            ParamValue::FloatList(_) => "float_list",
            ParamValue::StringList(_) => "string_list",
        }
    }

    pub fn same_tag(&self, other: &ParamValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(self, ParamValue::Uninitialized)
    }

    /// Best-effort parse of free text, richest shape first.
    pub fn parse(input: &str) -> ParamValue {
        let s = input.trim();
        if s.is_empty() {
            return ParamValue::String(String::new());
        }
        if s.eq_ignore_ascii_case("true") {
            return ParamValue::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return ParamValue::Bool(false);
        }
        if let Ok(i) = s.parse::<i32>() {
            return ParamValue::Int(i);
        }
        if let Ok(l) = s.parse::<i64>() {
            return ParamValue::Long(l);
        }
        if let Ok(f) = s.parse::<f32>() {
            return ParamValue::Float(f);
        }
        if s.starts_with('[') && s.ends_with(']') {
            return Self::parse_list(&s[1..s.len() - 1]);
        }
        ParamValue::String(strip_quotes(s).to_string())
    }

    fn parse_list(body: &str) -> ParamValue {
        let members: Vec<&str> = if body.trim().is_empty() {
            Vec::new()
        } else {
            body.split(',').map(str::trim).collect()
        };
        if members.is_empty() {
            return ParamValue::StringList(Vec::new());
        }
        let parsed: Vec<ParamValue> = members.iter().map(|m| ParamValue::parse(m)).collect();
        if parsed.iter().all(|v| matches!(v, ParamValue::Bool(_))) {
            return ParamValue::BoolList(
                parsed
                    .iter()
                    .map(|v| match v {
                        ParamValue::Bool(b) => *b,
                        _ => unreachable!(),
                    })
                    .collect(),
            );
        }
        if parsed.iter().all(|v| matches!(v, ParamValue::Int(_))) {
            return ParamValue::IntList(
                parsed
                    .iter()
                    .map(|v| match v {
                        ParamValue::Int(i) => *i,
                        _ => unreachable!(),
                    })
                    .collect(),
            );
        }
        if parsed
            .iter()
            .all(|v| matches!(v, ParamValue::Int(_) | ParamValue::Long(_) | ParamValue::Float(_)))
        {
            return ParamValue::FloatList(
                parsed.iter().filter_map(|v| v.as_float_lossy()).collect(),
            );
        }
        ParamValue::StringList(members.iter().map(|m| strip_quotes(m).to_string()).collect())
    }

    /// Cast text into an explicitly named type. Unlike `parse`, a shape
    /// mismatch is an error the caller must handle.
    pub fn cast(input: &str, type_name: &str) -> Result<ParamValue, CoreError> {
        let s = input.trim();
        let fail = || {
            CoreError::invalid_input(format!(
                "cannot cast value '{s}' into type '{type_name}'"
            ))
        };
        match type_name {
            "bool" => {
                if s.eq_ignore_ascii_case("true") {
                    Ok(ParamValue::Bool(true))
                } else if s.eq_ignore_ascii_case("false") {
                    Ok(ParamValue::Bool(false))
                } else {
                    Err(fail())
                }
            }
            "int" => s.parse::<i32>().map(ParamValue::Int).map_err(|_| fail()),
            "long" => s.parse::<i64>().map(ParamValue::Long).map_err(|_| fail()),
            "float" => s.parse::<f32>().map(ParamValue::Float).map_err(|_| fail()),
            "string" => Ok(ParamValue::String(strip_quotes(s).to_string())),
            "bool_list" | "int_list" | "float_list" | "string_list" => {
                let parsed = ParamValue::parse(s);
                let matches_decl = parsed.type_name() == type_name
                    || (type_name == "float_list"
                        && matches!(parsed, ParamValue::IntList(_)))
                    || (type_name == "string_list"
                        && matches!(
                            parsed,
                            ParamValue::BoolList(_)
                                | ParamValue::IntList(_)
                                | ParamValue::FloatList(_)
                        ));
                if !matches_decl {
                    return Err(fail());
                }
                Ok(coerce_list(parsed, type_name))
            }
            _ => Err(CoreError::unsupported(format!(
                "unknown parameter type '{type_name}'"
            ))),
        }
    }

    /// Lossless-enough widening used when comparing mixed numeric tags.
    pub fn as_float_lossy(&self) -> Option<f32> {
        match self {
            ParamValue::Int(i) => Some(*i as f32),
            ParamValue::Long(l) => Some(*l as f32),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Ordering between two values of the same tag; numeric tags compare
    /// numerically, strings lexically. Mixed or unordered tags yield `None`.
    pub fn cmp_same_tag(&self, other: &ParamValue) -> Option<Ordering> {
        match (self, other) {
            (ParamValue::Int(a), ParamValue::Int(b)) => Some(a.cmp(b)),
            (ParamValue::Long(a), ParamValue::Long(b)) => Some(a.cmp(b)),
            (ParamValue::Float(a), ParamValue::Float(b)) => a.partial_cmp(b),
            (ParamValue::String(a), ParamValue::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn coerce_list(parsed: ParamValue, type_name: &str) -> ParamValue {
    match (parsed, type_name) {
        (ParamValue::IntList(l), "float_list") => {
            ParamValue::FloatList(l.into_iter().map(|i| i as f32).collect())
        }
        (ParamValue::BoolList(l), "string_list") => {
            ParamValue::StringList(l.into_iter().map(|b| b.to_string()).collect())
        }
        (ParamValue::IntList(l), "string_list") => {
            ParamValue::StringList(l.into_iter().map(|i| i.to_string()).collect())
        }
        (ParamValue::FloatList(l), "string_list") => {
            ParamValue::StringList(l.into_iter().map(|f| f.to_string()).collect())
        }
        (v, _) => v,
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"'))
            || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            write!(f, "[")?;
            let mut sep = "";
            for item in items {
                write!(f, "{sep}{item}")?;
                sep = ",";
            }
            write!(f, "]")
        }
        match self {
            ParamValue::Uninitialized => Ok(()),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Long(l) => write!(f, "{l}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::String(s) => write!(f, "{s}"),
            ParamValue::BoolList(l) => join(f, l),
            ParamValue::IntList(l) => join(f, l),
            ParamValue::FloatList(l) => join(f, l),
            ParamValue::StringList(l) => join(f, l),
        }
    }
}
