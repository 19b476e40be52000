//! Sampler Compiler - raw parameter values to re-invocable samplers
//!
//! A raw value is either a literal (returned unchanged on every call) or a
//! directive string starting with [`SENTINEL`]:
//!
//! ```text
//! !uni(a,b)      float drawn uniformly from [a, b)
//! !rint(a,b)     integer drawn uniformly from [a, b)
//! !eval(expr)    restricted expression, evaluated on every call
//! ```
//!
//! Arguments of `uni`/`rint` are split on the first comma; nested
//! parentheses or commas inside an argument are not supported.

use rand::Rng;
use serde_json::Value;

use super::expr::Expression;
use crate::{Error, Result};

/// Prefix marking a directive string.
pub const SENTINEL: char = '!';

/// Options controlling what the compiler accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Allow `!eval(...)` directives. Off by default.
    pub allow_eval: bool,
}

impl CompileOptions {
    /// Options with `!eval` enabled.
    #[must_use]
    pub const fn with_eval() -> Self {
        Self { allow_eval: true }
    }
}

/// A parsed sampling directive.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// `!uni(low,high)`
    Uniform {
        /// Inclusive lower bound
        low: f64,
        /// Exclusive upper bound
        high: f64,
    },
    /// `!rint(low,high)`
    RandInt {
        /// Inclusive lower bound
        low: i64,
        /// Exclusive upper bound
        high: i64,
    },
    /// `!eval(expr)`, kept apart from the numeric draws since it needs an opt-in
    Expression(Expression),
}

impl Directive {
    /// Parse a directive string (including the leading sentinel).
    ///
    /// # Errors
    ///
    /// - `UnsupportedDirective` if the verb is not `uni`, `rint` or `eval`
    /// - `MalformedDirective` if the arguments do not parse
    /// - `EvalDisabled` for `!eval` without [`CompileOptions::allow_eval`]
    pub fn parse(raw: &str, options: CompileOptions) -> Result<Self> {
        let body = raw
            .strip_prefix(SENTINEL)
            .ok_or_else(|| Error::UnsupportedDirective(raw.to_string()))?;
        let (verb, rest) = match body.find('(') {
            Some(open) => (body[..open].trim_end(), Some(&body[open + 1..])),
            None => (body.trim_end(), None),
        };

        if !matches!(verb, "uni" | "rint" | "eval") {
            return Err(Error::UnsupportedDirective(raw.to_string()));
        }

        let args = rest
            .ok_or_else(|| Error::malformed(raw, "expected '(' after the directive name"))?
            .trim_end()
            .strip_suffix(')')
            .ok_or_else(|| Error::malformed(raw, "missing closing ')'"))?;

        match verb {
            "uni" => {
                let (low, high) = split_pair(raw, args)?;
                let low: f64 = parse_arg(raw, low)?;
                let high: f64 = parse_arg(raw, high)?;
                if !low.is_finite() || !high.is_finite() || low >= high {
                    return Err(Error::malformed(raw, "bounds must be finite with low < high"));
                }
                if !(high - low).is_finite() {
                    return Err(Error::malformed(raw, "range width overflows f64"));
                }
                Ok(Self::Uniform { low, high })
            }
            "rint" => {
                let (low, high) = split_pair(raw, args)?;
                let low: i64 = parse_arg(raw, low)?;
                let high: i64 = parse_arg(raw, high)?;
                if low >= high {
                    return Err(Error::malformed(raw, "range is empty, need low < high"));
                }
                Ok(Self::RandInt { low, high })
            }
            _ => {
                if !options.allow_eval {
                    return Err(Error::EvalDisabled(raw.to_string()));
                }
                Expression::parse(args)
                    .map(Self::Expression)
                    .map_err(|reason| Error::malformed(raw, reason))
            }
        }
    }

    /// Draw one value.
    ///
    /// # Errors
    ///
    /// Returns `Evaluation` if an expression fails at runtime.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Value> {
        match self {
            Self::Uniform { low, high } => Ok(number(rng.gen_range(*low..*high))),
            Self::RandInt { low, high } => Ok(Value::from(rng.gen_range(*low..*high))),
            Self::Expression(expr) => expr.evaluate(rng).map(number).map_err(Error::Evaluation),
        }
    }
}

fn split_pair<'a>(raw: &str, args: &'a str) -> Result<(&'a str, &'a str)> {
    args.split_once(',')
        .ok_or_else(|| Error::malformed(raw, "expected two comma-separated arguments"))
}

fn parse_arg<T: std::str::FromStr>(raw: &str, arg: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let arg = arg.trim();
    arg.parse()
        .map_err(|e| Error::malformed(raw, format!("cannot parse argument '{arg}': {e}")))
}

// Callers only pass finite values.
fn number(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

#[derive(Debug, Clone, PartialEq)]
enum Rule {
    Constant,
    Directive(Directive),
}

/// Compiled, re-invocable producer for one parameter.
///
/// Immutable once built; the raw value it was compiled from is kept so the
/// spec can always be exported without the compiled form.
#[derive(Debug, Clone, PartialEq)]
pub struct Sampler {
    raw: Value,
    rule: Rule,
}

impl Sampler {
    /// Raw value this sampler was compiled from.
    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.raw
    }

    /// Parsed directive, or `None` for a constant.
    #[must_use]
    pub const fn directive(&self) -> Option<&Directive> {
        match &self.rule {
            Rule::Constant => None,
            Rule::Directive(d) => Some(d),
        }
    }

    /// Whether every call returns the same value.
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        matches!(self.rule, Rule::Constant)
    }

    /// Produce a value using the thread-local RNG.
    ///
    /// # Errors
    ///
    /// Returns `Evaluation` if an expression fails at runtime.
    pub fn sample(&self) -> Result<Value> {
        self.sample_with(&mut rand::thread_rng())
    }

    /// Produce a value drawing randomness from `rng`.
    ///
    /// # Errors
    ///
    /// Returns `Evaluation` if an expression fails at runtime.
    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Value> {
        match &self.rule {
            Rule::Constant => Ok(self.raw.clone()),
            Rule::Directive(directive) => directive.sample(rng),
        }
    }
}

/// Compile a raw value with default options (`!eval` disabled).
///
/// # Errors
///
/// See [`compile_with`].
pub fn compile(raw: &Value) -> Result<Sampler> {
    compile_with(raw, CompileOptions::default())
}

/// Compile a raw value into a [`Sampler`] without executing it.
///
/// Non-strings and strings without the leading sentinel compile to constants.
///
/// # Errors
///
/// Propagates the directive errors of [`Directive::parse`].
pub fn compile_with(raw: &Value, options: CompileOptions) -> Result<Sampler> {
    let rule = match raw {
        Value::String(s) if s.starts_with(SENTINEL) => Rule::Directive(Directive::parse(s, options)?),
        _ => Rule::Constant,
    };
    Ok(Sampler {
        raw: raw.clone(),
        rule,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literals_compile_to_constants() {
        for raw in [json!(42), json!("adam"), json!([1, 2]), json!({"k": 1}), json!(null)] {
            let sampler = compile(&raw).unwrap();
            assert!(sampler.is_constant());
            assert_eq!(sampler.sample().unwrap(), raw);
        }
    }

    #[test]
    fn test_parse_uniform_with_spaces() {
        let d = Directive::parse("!uni(0.0001, 0.1)", CompileOptions::default()).unwrap();
        assert_eq!(d, Directive::Uniform { low: 0.0001, high: 0.1 });
    }

    #[test]
    fn test_parse_rint() {
        let d = Directive::parse("!rint(-3,5)", CompileOptions::default()).unwrap();
        assert_eq!(d, Directive::RandInt { low: -3, high: 5 });
    }

    #[test]
    fn test_unknown_verbs_are_unsupported() {
        for raw in ["!foo(1,2)", "!", "!uniform(0,1)", "!UNI(0,1)"] {
            let err = Directive::parse(raw, CompileOptions::default()).unwrap_err();
            assert!(matches!(err, Error::UnsupportedDirective(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn test_bad_arguments_are_malformed() {
        for raw in [
            "!uni(1)",
            "!uni",
            "!uni(0,1",
            "!uni(a,b)",
            "!uni(1,2,3)",
            "!uni(2,1)",
            "!rint(1.5,3)",
            "!rint(3,3)",
            "!uni(-1e308, 1e308)",
        ] {
            let err = Directive::parse(raw, CompileOptions::default()).unwrap_err();
            assert!(matches!(err, Error::MalformedDirective { .. }), "{raw}: {err}");
        }
    }

    #[test]
    fn test_uniform_accepts_wide_finite_range() {
        let sampler = compile(&json!("!uni(-1e300, 1e300)")).unwrap();
        for _ in 0..100 {
            let x = sampler.sample().unwrap().as_f64().unwrap();
            assert!((-1e300..1e300).contains(&x));
        }
    }

    #[test]
    fn test_eval_requires_opt_in() {
        let raw = json!("!eval(1 + 1)");
        assert!(matches!(compile(&raw), Err(Error::EvalDisabled(_))));

        let sampler = compile_with(&raw, CompileOptions::with_eval()).unwrap();
        assert_eq!(sampler.sample().unwrap(), json!(2.0));
    }

    #[test]
    fn test_eval_keeps_nested_parentheses() {
        let raw = json!("!eval(max(1, (2 + 3)))");
        let sampler = compile_with(&raw, CompileOptions::with_eval()).unwrap();
        assert_eq!(sampler.sample().unwrap(), json!(5.0));
    }

    #[test]
    fn test_eval_syntax_error_is_malformed() {
        let raw = json!("!eval(import os)");
        let err = compile_with(&raw, CompileOptions::with_eval()).unwrap_err();
        assert!(matches!(err, Error::MalformedDirective { .. }));
    }
}
