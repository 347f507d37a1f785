//! A composable algebra for building filter conditions.
//!
//! Conditions are built with the factory functions in this module ([`and`],
//! [`equal`], [`gt`], [`contains`], ...) and attached to a query with
//! [`Query::filter_condition`](crate::Query::filter_condition). Every factory
//! validates its arguments up front, so an invalid condition fails at the call
//! site rather than when the query is rendered. Rendering a condition is pure:
//! [`Condition::render`] returns the same wire dictionary every time it is
//! called and never mutates the condition.
//!
//! ```
//! use zteradb::query::filter;
//! use zteradb::operands;
//!
//! # fn main() -> zteradb::Result<()> {
//! let condition = filter::and(vec![
//!     filter::equal("price", 100)?,
//!     filter::gt(operands!["quantity", 200])?,
//! ]);
//! # Ok(())
//! # }
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{Error, Result};

/// A scalar value admitted in query fields, filters, and conditions.
///
/// Collections and other structured data are deliberately unrepresentable
/// here; nesting is expressed through [`Condition`] instead.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A signed integer.
    Int(i64),
    /// A double-precision floating point number.
    Double(f64),
    /// A boolean.
    Boolean(bool),
    /// A UTF-8 string.
    String(String),
    /// A byte sequence; rendered as base64 text on the wire.
    Bytes(Vec<u8>),
    /// An explicit null.
    Null,
}

impl Value {
    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(i) => (*i).into(),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(b) => (*b).into(),
            Value::String(s) => s.clone().into(),
            Value::Bytes(b) => BASE64.encode(b).into(),
            Value::Null => serde_json::Value::Null,
        }
    }

    /// Truthiness as the server defines it for operand checks: zero, empty,
    /// false, and null are all falsy.
    fn is_truthy(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::Boolean(b) => *b,
            Value::String(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Null => false,
        }
    }

    fn is_positive_number(&self) -> Option<bool> {
        match self {
            Value::Int(i) => Some(*i > 0),
            Value::Double(d) => Some(*d > 0.0),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Double(value.into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

/// An operand of a [`Condition`]: a scalar [`Value`], a reference to a schema
/// field, or a nested condition.
///
/// Bare strings convert to [`Operand::Field`], since a string in operand
/// position names a schema field; use [`Value::String`] explicitly for a
/// string literal operand.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// A literal scalar.
    Value(Value),
    /// A reference to a schema field, passed through uninterpreted.
    Field(String),
    /// A nested condition, inlined into the parent's rendered dictionary.
    Condition(Condition),
}

impl Operand {
    fn render(&self) -> serde_json::Value {
        match self {
            Operand::Value(value) => value.to_json(),
            Operand::Field(field) => field.clone().into(),
            Operand::Condition(condition) => condition.render(),
        }
    }
}

impl From<&str> for Operand {
    fn from(field: &str) -> Self {
        Operand::Field(field.to_string())
    }
}

impl From<String> for Operand {
    fn from(field: String) -> Self {
        Operand::Field(field)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

impl From<Condition> for Operand {
    fn from(condition: Condition) -> Self {
        Operand::Condition(condition)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Value(value.into())
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Value(value.into())
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Value(value.into())
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Operand::Value(value.into())
    }
}

/// Builds a `Vec<`[`Operand`]`>` from mixed field names, literals, and nested
/// conditions.
///
/// ```
/// use zteradb::{operands, query::filter};
///
/// # fn main() -> zteradb::Result<()> {
/// let condition = filter::mul(operands!["price", "quantity"])?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! operands {
    ($($operand:expr),* $(,)?) => {
        vec![$($crate::query::filter::Operand::from($operand)),*]
    };
}

/// Builds a `Vec<`[`Value`]`>` from literals, for use with [`is_in`].
#[macro_export]
macro_rules! values {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::query::filter::Value::from($value)),*]
    };
}

/// The operator codes understood by the server. The codes are literal tokens
/// preserved bit-exactly on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operator {
    Or,
    And,
    Equal,
    NotEqual,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    In,
}

impl Operator {
    fn code(&self) -> &'static str {
        match self {
            Operator::Or => "||",
            Operator::And => "&&",
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Contains => "%%",
            Operator::IContains => "i%%",
            Operator::StartsWith => "^%%",
            Operator::IStartsWith => "^i%%",
            Operator::EndsWith => "%%$",
            Operator::IEndsWith => "i%%$",
            Operator::In => "IN",
        }
    }

    /// The operator's name as used in validation messages.
    fn name(&self) -> &'static str {
        match self {
            Operator::Or => "or",
            Operator::And => "and",
            Operator::Equal => "equal",
            Operator::NotEqual => "not equal",
            Operator::Add => "add",
            Operator::Sub => "sub",
            Operator::Mul => "mul",
            Operator::Div => "div",
            Operator::Mod => "mod",
            Operator::Gt => "greater than",
            Operator::Gte => "greater than or equal",
            Operator::Lt => "less than",
            Operator::Lte => "less than or equal",
            Operator::Contains => "contains",
            Operator::IContains => "icontains",
            Operator::StartsWith => "starts with",
            Operator::IStartsWith => "istarts with",
            Operator::EndsWith => "ends with",
            Operator::IEndsWith => "iends with",
            Operator::In => "IN",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum OperandShape {
    One(Box<Operand>),
    Many(Vec<Operand>),
}

#[derive(Clone, Debug, PartialEq)]
enum ResultShape {
    Value(Value),
    Values(Vec<Value>),
}

/// A node of the filter AST, validated on construction and rendered to the
/// wire dictionary shape `{operator, operand, result?}`.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    operator: Operator,
    operand: OperandShape,
    result: Option<ResultShape>,
}

impl Condition {
    fn new(operator: Operator, operand: OperandShape, result: Option<ResultShape>) -> Self {
        Self {
            operator,
            operand,
            result,
        }
    }

    /// Renders the condition to its wire dictionary.
    ///
    /// Rendering is purely functional: the same condition always renders to
    /// the same value, and nested conditions are inlined rather than wrapped.
    pub fn render(&self) -> serde_json::Value {
        let operand = match &self.operand {
            OperandShape::One(operand) => operand.render(),
            OperandShape::Many(operands) => {
                serde_json::Value::Array(operands.iter().map(Operand::render).collect())
            }
        };

        let mut rendered = serde_json::Map::new();
        rendered.insert("operator".to_string(), self.operator.code().into());
        rendered.insert("operand".to_string(), operand);
        if let Some(result) = &self.result {
            let result = match result {
                ResultShape::Value(value) => value.to_json(),
                ResultShape::Values(values) => {
                    serde_json::Value::Array(values.iter().map(Value::to_json).collect())
                }
            };
            rendered.insert("result".to_string(), result);
        }

        serde_json::Value::Object(rendered)
    }
}

/// Combines conditions with the logical `&&` operator.
///
/// The user-supplied tree shape is preserved: `and([and([a, b]), c])` renders
/// as a nested dictionary, not a flattened three-way conjunction.
pub fn and(conditions: Vec<Condition>) -> Condition {
    logical(Operator::And, conditions)
}

/// Combines conditions with the logical `||` operator.
pub fn or(conditions: Vec<Condition>) -> Condition {
    logical(Operator::Or, conditions)
}

fn logical(operator: Operator, conditions: Vec<Condition>) -> Condition {
    let operands = conditions.into_iter().map(Operand::Condition).collect();
    Condition::new(operator, OperandShape::Many(operands), None)
}

/// Creates an equality condition comparing `param` (a schema field or a
/// nested condition) against a scalar `result`.
pub fn equal(param: impl Into<Operand>, result: impl Into<Value>) -> Result<Condition> {
    comparison_with_result(Operator::Equal, param.into(), result.into())
}

/// Creates an inequality condition; the counterpart of [`equal`].
pub fn not_equal(param: impl Into<Operand>, result: impl Into<Value>) -> Result<Condition> {
    comparison_with_result(Operator::NotEqual, param.into(), result.into())
}

fn comparison_with_result(operator: Operator, param: Operand, result: Value) -> Result<Condition> {
    if matches!(param, Operand::Value(_)) {
        return Err(Error::invalid_condition("Invalid 'param' argument"));
    }

    Ok(Condition::new(
        operator,
        OperandShape::One(Box::new(param)),
        Some(ResultShape::Value(result)),
    ))
}

/// Creates an addition condition over the given operands.
pub fn add(operands: Vec<Operand>) -> Result<Condition> {
    arithmetic(Operator::Add, operands)
}

/// Creates a subtraction condition over the given operands.
pub fn sub(operands: Vec<Operand>) -> Result<Condition> {
    arithmetic(Operator::Sub, operands)
}

/// Creates a multiplication condition over the given operands.
pub fn mul(operands: Vec<Operand>) -> Result<Condition> {
    arithmetic(Operator::Mul, operands)
}

fn arithmetic(operator: Operator, operands: Vec<Operand>) -> Result<Condition> {
    if operands.is_empty() {
        return Err(Error::invalid_condition(format!(
            "operands must be a non-empty list for {} operation",
            operator.name()
        )));
    }

    Ok(Condition::new(operator, OperandShape::Many(operands), None))
}

/// Creates a division condition. A literal divisor must be non-zero.
pub fn div(dividend: impl Into<Operand>, divisor: impl Into<Operand>) -> Result<Condition> {
    let divisor = divisor.into();
    if matches!(&divisor, Operand::Value(value) if !value.is_truthy()) {
        return Err(Error::invalid_condition(
            "'divisor' must be numeric or schema field and it should be greater than 0.",
        ));
    }

    Ok(Condition::new(
        Operator::Div,
        OperandShape::Many(vec![dividend.into(), divisor]),
        None,
    ))
}

/// Creates a modulo condition. A literal denominator must be greater than
/// zero.
pub fn modulo(numerator: impl Into<Operand>, denominator: impl Into<Operand>) -> Result<Condition> {
    let denominator = denominator.into();
    let invalid = match &denominator {
        Operand::Value(value) => !value.is_positive_number().unwrap_or_else(|| value.is_truthy()),
        _ => false,
    };
    if invalid {
        return Err(Error::invalid_condition(
            "'denominator' must be numeric or schema field and must be greater than 0",
        ));
    }

    Ok(Condition::new(
        Operator::Mod,
        OperandShape::Many(vec![numerator.into(), denominator]),
        None,
    ))
}

/// Creates a `>` comparison over the given operands.
pub fn gt(operands: Vec<Operand>) -> Result<Condition> {
    ordering(Operator::Gt, operands)
}

/// Creates a `>=` comparison over the given operands.
pub fn gte(operands: Vec<Operand>) -> Result<Condition> {
    ordering(Operator::Gte, operands)
}

/// Creates a `<` comparison over the given operands.
pub fn lt(operands: Vec<Operand>) -> Result<Condition> {
    ordering(Operator::Lt, operands)
}

/// Creates a `<=` comparison over the given operands.
pub fn lte(operands: Vec<Operand>) -> Result<Condition> {
    ordering(Operator::Lte, operands)
}

fn ordering(operator: Operator, operands: Vec<Operand>) -> Result<Condition> {
    if operands.len() < 2 {
        return Err(Error::invalid_condition(format!(
            "the '{}' filter requires at least two operands",
            operator.name()
        )));
    }

    Ok(Condition::new(operator, OperandShape::Many(operands), None))
}

/// Creates a case-sensitive substring match on a schema field.
pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Result<Condition> {
    string_match(Operator::Contains, field.into(), value.into())
}

/// Creates a case-insensitive substring match on a schema field.
pub fn icontains(field: impl Into<String>, value: impl Into<String>) -> Result<Condition> {
    string_match(Operator::IContains, field.into(), value.into())
}

/// Creates a case-sensitive prefix match on a schema field.
pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Result<Condition> {
    string_match(Operator::StartsWith, field.into(), value.into())
}

/// Creates a case-insensitive prefix match on a schema field.
pub fn istarts_with(field: impl Into<String>, value: impl Into<String>) -> Result<Condition> {
    string_match(Operator::IStartsWith, field.into(), value.into())
}

/// Creates a case-sensitive suffix match on a schema field.
pub fn ends_with(field: impl Into<String>, value: impl Into<String>) -> Result<Condition> {
    string_match(Operator::EndsWith, field.into(), value.into())
}

/// Creates a case-insensitive suffix match on a schema field.
pub fn iends_with(field: impl Into<String>, value: impl Into<String>) -> Result<Condition> {
    string_match(Operator::IEndsWith, field.into(), value.into())
}

fn string_match(operator: Operator, field: String, value: String) -> Result<Condition> {
    if field.trim().is_empty() {
        return Err(Error::invalid_condition(format!(
            "the field must be a non-empty schema field name in the {} filter",
            operator.name()
        )));
    }

    if value.trim().is_empty() {
        return Err(Error::invalid_condition(format!(
            "the value must be a non-empty string in the {} filter",
            operator.name()
        )));
    }

    Ok(Condition::new(
        operator,
        OperandShape::One(Box::new(Operand::Field(field))),
        Some(ResultShape::Value(Value::String(value))),
    ))
}

/// Creates a set-membership condition testing a schema field against a list
/// of scalar values.
pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Result<Condition> {
    let field = field.into();
    if field.trim().is_empty() {
        return Err(Error::invalid_condition(
            "the 'IN' filter field must be a schema field name",
        ));
    }

    Ok(Condition::new(
        Operator::In,
        OperandShape::One(Box::new(Operand::Field(field))),
        Some(ResultShape::Values(values)),
    ))
}
