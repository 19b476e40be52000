//! Restricted expression evaluator behind the `!eval` directive.
//!
//! Expressions are parsed once at compile time with `nom` and evaluated on
//! every resolution. The language has no variables and no access to the
//! host: only numeric literals, arithmetic, a fixed function table and a
//! handful of random draws.
//!
//! ```text
//! expr   := term (("+" | "-") term)*
//! term   := unary (("*" | "/" | "%") unary)*
//! unary  := "-" unary | power
//! power  := atom ("^" unary)?
//! atom   := number | name | name "(" [expr ("," expr)*] ")" | "(" expr ")"
//! ```

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit0, digit1, multispace0, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize},
    error::{Error, ErrorKind},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::str::FromStr;

type Res<'a, T> = IResult<&'a str, T, Error<&'a str>>;

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `^` (right-associative)
    Pow,
}

impl BinOp {
    const fn from_char(c: char) -> Self {
        match c {
            '+' => Self::Add,
            '-' => Self::Sub,
            '*' => Self::Mul,
            '/' => Self::Div,
            '%' => Self::Rem,
            _ => Self::Pow,
        }
    }

    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
            Self::Rem => lhs % rhs,
            Self::Pow => lhs.powf(rhs),
        }
    }
}

/// Function callable from an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    /// `sqrt(x)`
    Sqrt,
    /// `exp(x)`
    Exp,
    /// `ln(x)`
    Ln,
    /// `log10(x)`
    Log10,
    /// `abs(x)`
    Abs,
    /// `floor(x)`
    Floor,
    /// `ceil(x)`
    Ceil,
    /// `round(x)`
    Round,
    /// `min(x1, ..., xn)`
    Min,
    /// `max(x1, ..., xn)`
    Max,
    /// `pow(x, y)`
    Pow,
    /// `random()` draws from `[0, 1)`
    Random,
    /// `uniform(a, b)` draws from `[a, b)`
    Uniform,
    /// `randint(a, b)` draws an integer from `[a, b)`
    RandInt,
    /// `normal(mean, std)`
    Normal,
    /// `choice(x1, ..., xn)` picks one argument
    Choice,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sqrt" => Self::Sqrt,
            "exp" => Self::Exp,
            "ln" => Self::Ln,
            "log10" => Self::Log10,
            "abs" => Self::Abs,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "min" => Self::Min,
            "max" => Self::Max,
            "pow" => Self::Pow,
            "random" => Self::Random,
            "uniform" => Self::Uniform,
            "randint" => Self::RandInt,
            "normal" => Self::Normal,
            "choice" => Self::Choice,
            _ => return None,
        })
    }

    const fn accepts(self, argc: usize) -> bool {
        match self {
            Self::Random => argc == 0,
            Self::Sqrt
            | Self::Exp
            | Self::Ln
            | Self::Log10
            | Self::Abs
            | Self::Floor
            | Self::Ceil
            | Self::Round => argc == 1,
            Self::Pow | Self::Uniform | Self::RandInt | Self::Normal => argc == 2,
            Self::Min | Self::Max | Self::Choice => argc >= 1,
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal or named constant
    Number(f64),
    /// Unary minus
    Neg(Box<Expr>),
    /// Binary operation
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Function call
    Call(Func, Vec<Expr>),
}

impl Expr {
    fn eval<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, String> {
        match self {
            Self::Number(v) => Ok(*v),
            Self::Neg(inner) => Ok(-inner.eval(rng)?),
            Self::Binary(op, lhs, rhs) => Ok(op.apply(lhs.eval(rng)?, rhs.eval(rng)?)),
            Self::Call(func, args) => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(rng))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*func, &args, rng)
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn call<R: Rng + ?Sized>(func: Func, args: &[f64], rng: &mut R) -> Result<f64, String> {
    let value = match func {
        Func::Sqrt => args[0].sqrt(),
        Func::Exp => args[0].exp(),
        Func::Ln => args[0].ln(),
        Func::Log10 => args[0].log10(),
        Func::Abs => args[0].abs(),
        Func::Floor => args[0].floor(),
        Func::Ceil => args[0].ceil(),
        Func::Round => args[0].round(),
        Func::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
        Func::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Func::Pow => args[0].powf(args[1]),
        Func::Random => rng.gen::<f64>(),
        Func::Uniform => {
            let (low, high) = (args[0], args[1]);
            if !(low < high) || !(high - low).is_finite() {
                return Err(format!(
                    "uniform({low}, {high}) needs low < high with a finite range width"
                ));
            }
            rng.gen_range(low..high)
        }
        Func::RandInt => {
            let (low, high) = (args[0].ceil() as i64, args[1].ceil() as i64);
            if low >= high {
                return Err(format!("randint({}, {}) is an empty range", args[0], args[1]));
            }
            rng.gen_range(low..high) as f64
        }
        Func::Normal => Normal::new(args[0], args[1])
            .map_err(|e| format!("normal({}, {}): {e}", args[0], args[1]))?
            .sample(rng),
        Func::Choice => args[rng.gen_range(0..args.len())],
    };
    Ok(value)
}

/// A compiled `!eval` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    /// Parse an expression.
    ///
    /// # Errors
    ///
    /// Returns a description of the first position that could not be parsed,
    /// including unknown names and wrong argument counts.
    pub fn parse(source: &str) -> Result<Self, String> {
        match all_consuming(ws(expr)).parse(source) {
            Ok((_, root)) => Ok(Self {
                source: source.to_string(),
                root,
            }),
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) if e.input.is_empty() => {
                Err("unexpected end of expression".to_string())
            }
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
                Err(format!("cannot parse expression near '{}'", e.input))
            }
            Err(nom::Err::Incomplete(_)) => Err("incomplete expression".to_string()),
        }
    }

    /// Original expression text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed tree.
    #[must_use]
    pub const fn root(&self) -> &Expr {
        &self.root
    }

    /// Evaluate once, drawing any random calls from `rng`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid random-draw arguments or a non-finite result.
    pub fn evaluate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, String> {
        let value = self.root.eval(rng)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("'{}' evaluated to {value}", self.source))
        }
    }
}

fn ws<'a, O, P>(inner: P) -> impl Parser<&'a str, Output = O, Error = Error<&'a str>>
where
    P: Parser<&'a str, Output = O, Error = Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn failure(input: &str) -> nom::Err<Error<&str>> {
    nom::Err::Failure(Error::new(input, ErrorKind::Verify))
}

fn number(input: &str) -> Res<'_, f64> {
    map_res(
        recognize((
            digit1,
            opt(pair(char('.'), digit0)),
            opt((one_of("eE"), opt(one_of("+-")), digit1)),
        )),
        f64::from_str,
    )
    .parse(input)
}

fn identifier(input: &str) -> Res<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

fn call_or_constant(input: &str) -> Res<'_, Expr> {
    let (rest, name) = identifier(input)?;
    let (rest, args) = opt(preceded(
        multispace0,
        delimited(
            char('('),
            separated_list0(char(','), ws(expr)),
            preceded(multispace0, char(')')),
        ),
    ))
    .parse(rest)?;

    match args {
        None => constant(name)
            .map(|v| (rest, Expr::Number(v)))
            .ok_or_else(|| failure(input)),
        Some(args) => {
            let func = Func::from_name(name)
                .filter(|f| f.accepts(args.len()))
                .ok_or_else(|| failure(input))?;
            Ok((rest, Expr::Call(func, args)))
        }
    }
}

fn atom(input: &str) -> Res<'_, Expr> {
    alt((
        map(number, Expr::Number),
        call_or_constant,
        delimited(char('('), ws(expr), char(')')),
    ))
    .parse(input)
}

fn power(input: &str) -> Res<'_, Expr> {
    let (rest, base) = atom(input)?;
    let (rest, exponent) = opt(preceded(ws(char('^')), unary)).parse(rest)?;
    let expr = match exponent {
        Some(exponent) => Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)),
        None => base,
    };
    Ok((rest, expr))
}

fn unary(input: &str) -> Res<'_, Expr> {
    alt((
        map(preceded(pair(char('-'), multispace0), unary), |e| {
            Expr::Neg(Box::new(e))
        }),
        power,
    ))
    .parse(input)
}

fn fold(first: Expr, tail: Vec<(char, Expr)>) -> Expr {
    tail.into_iter().fold(first, |lhs, (op, rhs)| {
        Expr::Binary(BinOp::from_char(op), Box::new(lhs), Box::new(rhs))
    })
}

fn term(input: &str) -> Res<'_, Expr> {
    let (rest, first) = unary(input)?;
    let (rest, tail) = many0(pair(ws(one_of("*/%")), unary)).parse(rest)?;
    Ok((rest, fold(first, tail)))
}

fn expr(input: &str) -> Res<'_, Expr> {
    let (rest, first) = term(input)?;
    let (rest, tail) = many0(pair(ws(one_of("+-")), term)).parse(rest)?;
    Ok((rest, fold(first, tail)))
}
