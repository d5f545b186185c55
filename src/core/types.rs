//! Parameter value types and the registry that resolves type expressions
//!
//! A type expression is a base name with an optional bracketed argument list,
//! e.g. `int`, `list[string]` or `table[text,id]`. Generic base names are
//! backed by a factory; every distinct argument list is instantiated once so
//! that repeated expressions resolve to the same `Arc<ParamType>`.

use crate::core::params::Parameter;
use crate::core::table::Table;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use thiserror::Error;
use tracing::debug;

/// Name of the reserved nested-group type
pub const COMPLEX: &str = "complex";

/// Base name of the generic tabular type
pub const TABLE: &str = "table";

/// Base name of the generic list type
pub const LIST: &str = "list";

/// Errors raised while resolving types or parsing values through them
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("Expected {expected}, got {found}")]
    Mismatch { expected: String, found: String },

    #[error("Missing required column(s): {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("Invalid table data: {0}")]
    InvalidTable(String),

    #[error("Missing value for '{0}'")]
    MissingField(String),

    #[error("Type {0} is not registered. Disable strict mode to create new custom type.")]
    Unknown(String),

    #[error("Malformed type expression: {0}")]
    Malformed(String),

    #[error("{path}: {source}")]
    At {
        path: String,
        #[source]
        source: Box<TypeError>,
    },
}

impl TypeError {
    fn mismatch(expected: &str, found: &Value) -> Self {
        TypeError::Mismatch {
            expected: expected.to_string(),
            found: describe(found),
        }
    }

    fn at(self, path: impl Into<String>) -> Self {
        TypeError::At {
            path: path.into(),
            source: Box::new(self),
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("bool {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string {:?}", s),
        Value::Array(a) => format!("list of {} element(s)", a.len()),
        Value::Object(_) => "object".to_string(),
    }
}

/// Parse function attached to a type
pub type ParseFn = Arc<dyn Fn(&Value) -> Result<Value, TypeError> + Send + Sync>;

/// Factory that instantiates a generic type for a concrete argument list
pub type GenericFactory =
    Arc<dyn Fn(&TypeRegistry, &[String]) -> Result<ParamType, TypeError> + Send + Sync>;

/// How a consumer type decides whether it accepts a producer type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Types must have the same name
    Exact,
    /// Same base name; the consumer's arguments must be a subset of the producer's
    ArgumentSubset,
}

/// A named value type with its parse function
#[derive(Clone)]
pub struct ParamType {
    name: String,
    base: String,
    args: Vec<String>,
    parser: ParseFn,
    default_value: Option<Value>,
    compatibility: Compatibility,
    children: Vec<Parameter>,
}

impl ParamType {
    /// Create a plain type from a parse function
    pub fn new<F>(name: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, TypeError> + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            base: name.clone(),
            name,
            args: Vec::new(),
            parser: Arc::new(parse),
            default_value: None,
            compatibility: Compatibility::Exact,
            children: Vec::new(),
        }
    }

    /// Create a type that leaves values untouched
    pub fn identity(name: impl Into<String>) -> Self {
        Self::new(name, |value| Ok(value.clone()))
    }

    /// Create a concrete instance of a generic type
    pub fn generic<F>(base: impl Into<String>, args: Vec<String>, parse: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, TypeError> + Send + Sync + 'static,
    {
        let base = base.into();
        let mut ty = Self::new(format_expression(&base, &args), parse);
        ty.base = base;
        ty.args = args;
        ty
    }

    /// Tabular type requiring the given columns
    pub fn table(columns: Vec<String>) -> Self {
        let required = columns.clone();
        Self::generic(TABLE, columns, move |value| {
            let table = Table::from_value(value)?;
            let missing = table.missing_columns(&required);
            if !missing.is_empty() {
                return Err(TypeError::MissingColumns { missing });
            }
            Ok(table.into_value())
        })
        .with_compatibility(Compatibility::ArgumentSubset)
    }

    /// List type whose elements are parsed through `inner`
    pub fn list(inner: Arc<ParamType>) -> Self {
        let args = vec![inner.name().to_string()];
        Self::generic(LIST, args, move |value| match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| inner.parse(item).map_err(|e| e.at(format!("[{}]", i))))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(TypeError::mismatch("list", other)),
        })
    }

    /// Nested parameter group
    pub fn complex(children: Vec<Parameter>) -> Self {
        let inner = children.clone();
        let mut ty = Self::new(COMPLEX, move |value| {
            let obj = match value {
                Value::Object(obj) => obj,
                other => return Err(TypeError::mismatch("object", other)),
            };
            let mut parsed = Map::new();
            for param in &inner {
                let raw = match obj.get(&param.name) {
                    Some(v) => v.clone(),
                    None => match param.effective_default() {
                        Some(d) => d,
                        None => return Err(TypeError::MissingField(param.name.clone())),
                    },
                };
                let value = param.ty.parse(&raw).map_err(|e| e.at(param.name.clone()))?;
                parsed.insert(param.name.clone(), value);
            }
            Ok(Value::Object(parsed))
        });
        ty.children = children;
        ty
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_compatibility(mut self, compatibility: Compatibility) -> Self {
        self.compatibility = compatibility;
        self
    }

    /// Full type expression, e.g. `table[text]`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    pub fn is_complex(&self) -> bool {
        self.base == COMPLEX
    }

    /// Child parameters of a complex type (empty otherwise)
    pub fn children(&self) -> &[Parameter] {
        &self.children
    }

    /// Parse a raw value into this type's canonical representation
    pub fn parse(&self, value: &Value) -> Result<Value, TypeError> {
        (self.parser)(value)
    }

    /// Whether a value produced as `producer` can be consumed as `self`
    pub fn accepts(&self, producer: &ParamType) -> bool {
        match self.compatibility {
            Compatibility::Exact => self.name == producer.name,
            Compatibility::ArgumentSubset => {
                self.base == producer.base
                    && self.args.iter().all(|arg| producer.args.contains(arg))
            }
        }
    }

    /// Default value tree of a complex type; leaves without defaults are omitted
    pub fn default_tree(&self) -> Value {
        let mut defaults = Map::new();
        for child in &self.children {
            if child.ty.is_complex() {
                defaults.insert(child.name.clone(), child.ty.default_tree());
            } else if let Some(default) = child.effective_default() {
                defaults.insert(child.name.clone(), default);
            }
        }
        Value::Object(defaults)
    }
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamType")
            .field("name", &self.name)
            .field("compatibility", &self.compatibility)
            .field("children", &self.children.len())
            .finish()
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn format_expression(base: &str, args: &[String]) -> String {
    if args.is_empty() {
        base.to_string()
    } else {
        format!("{}[{}]", base, args.join(","))
    }
}

fn expression_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([^\[\]\s]+)\s*(?:\[(.*)\])?\s*$").expect("type expression regex is valid")
    })
}

/// Split a type expression into its base name and optional argument list
///
/// Arguments are separated by commas at bracket depth zero, so nested
/// generics like `list[table[a,b]]` keep their inner expression intact.
pub fn split_expression(expression: &str) -> Result<(String, Option<Vec<String>>), TypeError> {
    let captures = expression_regex()
        .captures(expression)
        .ok_or_else(|| TypeError::Malformed(expression.to_string()))?;
    let base = captures[1].to_string();
    let Some(inner) = captures.get(2) else {
        return Ok((base, None));
    };

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in inner.as_str().chars() {
        match ch {
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| TypeError::Malformed(expression.to_string()))?;
                current.push(ch);
            }
            ',' if depth == 0 => args.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if depth != 0 {
        return Err(TypeError::Malformed(expression.to_string()));
    }
    args.push(current);

    let args = args
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    Ok((base, Some(args)))
}

/// Registry of named and generic types
///
/// Built once at start-up and shared by reference with the schema loader.
/// Lookups may still insert: generic instances are memoized and lenient
/// lookups cache synthesized identity types.
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<ParamType>>>,
    generics: RwLock<HashMap<String, GenericFactory>>,
    instances: RwLock<HashMap<(String, Vec<String>), Arc<ParamType>>>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in types
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_type(ParamType::new("int", parse_int));
        registry.register_type(ParamType::new("float", parse_float));
        registry.register_type(ParamType::new("string", parse_string));
        registry.register_type(ParamType::new("bool", parse_bool));
        registry.register_type(ParamType::identity("any"));
        registry.register_generic_type(LIST, |registry, args| {
            let inner = match args {
                [] => registry.parse("any", true)?,
                [inner] => registry.parse(inner, true)?,
                _ => {
                    return Err(TypeError::Malformed(format!(
                        "list takes one type argument, got {}",
                        args.len()
                    )))
                }
            };
            Ok(ParamType::list(inner))
        });
        registry.register_generic_type(TABLE, |_, args| Ok(ParamType::table(args.to_vec())));
        registry
    }

    /// Register a plain type under its name; re-registering replaces it
    pub fn register_type(&self, ty: ParamType) -> Arc<ParamType> {
        let ty = Arc::new(ty);
        write(&self.types).insert(ty.name().to_string(), ty.clone());
        ty
    }

    /// Register a factory for a generic base name
    pub fn register_generic_type<F>(&self, base: impl Into<String>, factory: F)
    where
        F: Fn(&TypeRegistry, &[String]) -> Result<ParamType, TypeError> + Send + Sync + 'static,
    {
        write(&self.generics).insert(base.into(), Arc::new(factory));
    }

    /// Resolve a type expression
    ///
    /// With `strict` unset an unknown name yields a permissive identity type
    /// that is cached under the expression.
    pub fn parse(&self, expression: &str, strict: bool) -> Result<Arc<ParamType>, TypeError> {
        let (base, args) = split_expression(expression)?;
        let factory = read(&self.generics).get(&base).cloned();

        if let Some(factory) = factory {
            return self.instantiate(&base, args.unwrap_or_default(), factory);
        }

        let key = match &args {
            Some(args) => format_expression(&base, args),
            None => base,
        };
        if let Some(ty) = read(&self.types).get(&key) {
            return Ok(ty.clone());
        }

        if strict {
            return Err(TypeError::Unknown(key));
        }

        debug!("Created custom type: {}", key);
        let mut types = write(&self.types);
        let ty = types
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ParamType::identity(key)))
            .clone();
        Ok(ty)
    }

    /// Whether a plain type or generic base with this name exists
    pub fn contains(&self, name: &str) -> bool {
        read(&self.types).contains_key(name) || read(&self.generics).contains_key(name)
    }

    fn instantiate(
        &self,
        base: &str,
        args: Vec<String>,
        factory: GenericFactory,
    ) -> Result<Arc<ParamType>, TypeError> {
        let key = (base.to_string(), args);
        if let Some(ty) = read(&self.instances).get(&key) {
            return Ok(ty.clone());
        }

        // Factories may resolve inner types, so no lock is held here.
        let ty = Arc::new(factory(self, &key.1)?);
        let mut instances = write(&self.instances);
        Ok(instances.entry(key).or_insert(ty).clone())
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<String> = read(&self.types).keys().cloned().collect();
        types.sort();
        let mut generics: Vec<String> = read(&self.generics).keys().cloned().collect();
        generics.sort();
        f.debug_struct("TypeRegistry")
            .field("types", &types)
            .field("generics", &generics)
            .finish()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn parse_int(value: &Value) -> Result<Value, TypeError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else {
                // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                        Ok(Value::from(f as i64))
                    }
                    _ => Err(TypeError::mismatch("int", value)),
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| TypeError::mismatch("int", value)),
        other => Err(TypeError::mismatch("int", other)),
    }
}

fn parse_float(value: &Value) -> Result<Value, TypeError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(Value::from)
            .ok_or_else(|| TypeError::mismatch("float", value)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| TypeError::mismatch("float", value)),
        other => Err(TypeError::mismatch("float", other)),
    }
}

fn parse_string(value: &Value) -> Result<Value, TypeError> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(TypeError::mismatch("string", other)),
    }
}

fn parse_bool(value: &Value) -> Result<Value, TypeError> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(TypeError::mismatch("bool", value)),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(TypeError::mismatch("bool", value)),
        },
        other => Err(TypeError::mismatch("bool", other)),
    }
}
