use crate::error::{LocusError, Result};
use crate::param_space::ParameterSpace;
use num_complex::Complex64;
use num_traits::Zero;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// OpCodes for the stack-based virtual machine.
///
/// The VM operates on a stack of `Complex64` values. Real expressions are
/// evaluated in the complex plane with zero imaginary part; whether a
/// compiled function can produce genuinely complex output is tracked
/// separately (see [`CompiledFunction::is_complex_valued`]).
#[derive(Debug, Clone, Copy)]
pub enum OpCode {
    /// Pushes a constant onto the stack.
    LoadConst(Complex64),
    /// Pushes the value of an axis variable (by index) onto the stack.
    /// Indices follow the axis order declared by the `ParameterSpace`.
    LoadAxis(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    Neg,
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
    Sinh,
    Cosh,
    Tanh,
}

/// A compiled sequence of operations.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based virtual machine for evaluating compiled expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: instructions to run.
/// - `axes`: current axis values (read-only).
/// - `stack`: a caller-owned buffer for intermediate computations, reused
///   across calls to avoid per-point allocation.
pub struct VM;

impl VM {
    pub fn execute(bytecode: &Bytecode, axes: &[Complex64], stack: &mut Vec<Complex64>) -> Complex64 {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(*val),
                OpCode::LoadAxis(idx) => stack.push(axes[*idx]),
                OpCode::Add => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a * b);
                }
                OpCode::Div => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a / b);
                }
                OpCode::Pow => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a.powc(b));
                }
                OpCode::Neg => {
                    let a = stack.pop().unwrap();
                    stack.push(-a);
                }
                OpCode::Sin => {
                    let a = stack.pop().unwrap();
                    stack.push(a.sin());
                }
                OpCode::Cos => {
                    let a = stack.pop().unwrap();
                    stack.push(a.cos());
                }
                OpCode::Tan => {
                    let a = stack.pop().unwrap();
                    stack.push(a.tan());
                }
                OpCode::Exp => {
                    let a = stack.pop().unwrap();
                    stack.push(a.exp());
                }
                OpCode::Ln => {
                    let a = stack.pop().unwrap();
                    stack.push(a.ln());
                }
                OpCode::Sqrt => {
                    let a = stack.pop().unwrap();
                    stack.push(a.sqrt());
                }
                OpCode::Sinh => {
                    let a = stack.pop().unwrap();
                    stack.push(a.sinh());
                }
                OpCode::Cosh => {
                    let a = stack.pop().unwrap();
                    stack.push(a.cosh());
                }
                OpCode::Tanh => {
                    let a = stack.pop().unwrap();
                    stack.push(a.tanh());
                }
            }
        }

        stack.pop().unwrap_or_else(Complex64::zero)
    }
}

// --- AST ---

/// Abstract syntax tree for expressions.
///
/// The engine treats this as an opaque symbolic value: downstream stages only
/// ever ask for substitution and lowering (the [`SymbolicExpression`]
/// capabilities), never inspect the tree shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(Complex64),
    Symbol(String),
    /// char is operator +, -, *, /, ^
    Binary(Box<Expr>, char, Box<Expr>),
    Unary(char, Box<Expr>),
    /// functions like sin(x)
    Call(String, Box<Expr>),
}

const KNOWN_FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "exp", "ln", "log", "sqrt", "sinh", "cosh", "tanh",
];

impl Expr {
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Symbol(name) => {
                out.insert(name.clone());
            }
            Expr::Binary(left, _, right) => {
                left.collect_symbols(out);
                right.collect_symbols(out);
            }
            Expr::Unary(_, operand) => operand.collect_symbols(out),
            Expr::Call(_, arg) => arg.collect_symbols(out),
        }
    }

    /// Whether evaluation can produce a genuinely complex result, i.e. a
    /// complex constant (the imaginary unit or a complex substitution)
    /// survives in the tree. Mirrors the dtype promotion rule of array
    /// backends: real inputs through real-coefficient operations stay real.
    pub fn is_complex_valued(&self) -> bool {
        match self {
            Expr::Number(value) => value.im != 0.0,
            Expr::Symbol(_) => false,
            Expr::Binary(left, _, right) => left.is_complex_valued() || right.is_complex_valued(),
            Expr::Unary(_, operand) => operand.is_complex_valued(),
            Expr::Call(_, arg) => arg.is_complex_valued(),
        }
    }
}

/// The two capabilities the extraction engine needs from a symbolic value:
/// substitute fixed parameters, and lower to a vectorized numeric function
/// with axis symbols bound to argument positions.
pub trait SymbolicExpression: Sized {
    fn substitute(&self, fixed: &BTreeMap<String, f64>) -> Self;
    fn compile_numeric(&self, space: &ParameterSpace) -> Result<CompiledFunction>;
}

impl SymbolicExpression for Expr {
    /// Replaces every symbol present in `fixed` with its scalar value.
    fn substitute(&self, fixed: &BTreeMap<String, f64>) -> Expr {
        match self {
            Expr::Number(value) => Expr::Number(*value),
            Expr::Symbol(name) => match fixed.get(name) {
                Some(value) => Expr::Number(Complex64::new(*value, 0.0)),
                None => Expr::Symbol(name.clone()),
            },
            Expr::Binary(left, op, right) => Expr::Binary(
                Box::new(left.substitute(fixed)),
                *op,
                Box::new(right.substitute(fixed)),
            ),
            Expr::Unary(op, operand) => Expr::Unary(*op, Box::new(operand.substitute(fixed))),
            Expr::Call(func, arg) => Expr::Call(func.clone(), Box::new(arg.substitute(fixed))),
        }
    }

    fn compile_numeric(&self, space: &ParameterSpace) -> Result<CompiledFunction> {
        compile(self, space)
    }
}

/// A pure numeric function derived from (expression, parameter space).
///
/// Holds no interior mutability and no reference to the source expression;
/// safe to call repeatedly and from multiple threads. Compilation happens
/// once per distinct (expression, fixed-parameter-set) pair and the result
/// is reused across all sampling passes.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    bytecode: Bytecode,
    arity: usize,
    complex_valued: bool,
}

impl CompiledFunction {
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// True when the reduced expression carries a complex constant, so
    /// evaluation can yield nonzero imaginary parts.
    pub fn is_complex_valued(&self) -> bool {
        self.complex_valued
    }

    /// Evaluates at a single point. `stack` is a scratch buffer the caller
    /// keeps alive across a sampling loop.
    pub fn eval(&self, axes: &[Complex64], stack: &mut Vec<Complex64>) -> Complex64 {
        assert_eq!(
            axes.len(),
            self.arity,
            "compiled function expects {} axis values",
            self.arity
        );
        VM::execute(&self.bytecode, axes, stack)
    }

    /// Evaluates at a single real-coordinate point.
    pub fn eval_at(&self, coords: &[f64], stack: &mut Vec<Complex64>) -> Complex64 {
        assert_eq!(
            coords.len(),
            self.arity,
            "compiled function expects {} coordinates",
            self.arity
        );
        let mut args = [Complex64::zero(); 3];
        for (slot, value) in args.iter_mut().zip(coords.iter()) {
            *slot = Complex64::new(*value, 0.0);
        }
        self.eval(&args[..coords.len()], stack)
    }

    /// Elementwise evaluation over one array per axis. Arrays must share a
    /// common length, with length-1 arrays broadcast against the rest.
    pub fn eval_many(&self, inputs: &[&[f64]]) -> Vec<Complex64> {
        assert_eq!(
            inputs.len(),
            self.arity,
            "compiled function expects {} input arrays",
            self.arity
        );
        let len = inputs.iter().map(|a| a.len()).max().unwrap_or(0);
        for input in inputs {
            assert!(
                input.len() == len || input.len() == 1,
                "input arrays must have broadcast-compatible lengths"
            );
        }

        let mut stack = Vec::with_capacity(64);
        let mut args = [Complex64::zero(); 3];
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            for (slot, input) in args.iter_mut().zip(inputs.iter()) {
                let j = if input.len() == 1 { 0 } else { i };
                *slot = Complex64::new(input[j], 0.0);
            }
            out.push(self.eval(&args[..self.arity], &mut stack));
        }
        out
    }
}

/// Substitutes the space's fixed parameters into `expr` and lowers the
/// reduced expression to bytecode with axis symbols bound to argument
/// indices in the space's declared order.
///
/// Fails with `UnresolvedSymbol` if a free symbol of the reduced expression
/// is not an axis; this happens before any sampling work.
pub fn compile(expr: &Expr, space: &ParameterSpace) -> Result<CompiledFunction> {
    let reduced = expr.substitute(space.fixed());

    let mut axis_map = HashMap::new();
    for (index, symbol) in space.axis_symbols().into_iter().enumerate() {
        axis_map.insert(symbol, index);
    }
    for symbol in reduced.free_symbols() {
        if !axis_map.contains_key(&symbol) {
            return Err(LocusError::UnresolvedSymbol { symbol });
        }
    }

    let mut ops = Vec::new();
    lower(&reduced, &axis_map, &mut ops)?;
    Ok(CompiledFunction {
        bytecode: Bytecode { ops },
        arity: space.dim(),
        complex_valued: reduced.is_complex_valued(),
    })
}

fn lower(expr: &Expr, axis_map: &HashMap<String, usize>, ops: &mut Vec<OpCode>) -> Result<()> {
    match expr {
        Expr::Number(value) => ops.push(OpCode::LoadConst(*value)),
        Expr::Symbol(name) => match axis_map.get(name) {
            Some(&idx) => ops.push(OpCode::LoadAxis(idx)),
            None => {
                return Err(LocusError::UnresolvedSymbol {
                    symbol: name.clone(),
                })
            }
        },
        Expr::Binary(left, op, right) => {
            lower(left, axis_map, ops)?;
            lower(right, axis_map, ops)?;
            match op {
                '+' => ops.push(OpCode::Add),
                '-' => ops.push(OpCode::Sub),
                '*' => ops.push(OpCode::Mul),
                '/' => ops.push(OpCode::Div),
                '^' => ops.push(OpCode::Pow),
                other => return Err(LocusError::Parse(format!("unknown binary operator: {other}"))),
            }
        }
        Expr::Unary(op, operand) => {
            lower(operand, axis_map, ops)?;
            match op {
                '-' => ops.push(OpCode::Neg),
                other => return Err(LocusError::Parse(format!("unknown unary operator: {other}"))),
            }
        }
        Expr::Call(func, arg) => {
            lower(arg, axis_map, ops)?;
            match func.as_str() {
                "sin" => ops.push(OpCode::Sin),
                "cos" => ops.push(OpCode::Cos),
                "tan" => ops.push(OpCode::Tan),
                "exp" => ops.push(OpCode::Exp),
                "ln" | "log" => ops.push(OpCode::Ln),
                "sqrt" => ops.push(OpCode::Sqrt),
                "sinh" => ops.push(OpCode::Sinh),
                "cosh" => ops.push(OpCode::Cosh),
                "tanh" => ops.push(OpCode::Tanh),
                other => return Err(LocusError::Parse(format!("unknown function: {other}"))),
            }
        }
    }
    Ok(())
}

// --- Parser ---

/// Parses a string expression into an AST. The identifier `i` is reserved
/// for the imaginary unit.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(LocusError::Parse(format!(
            "unexpected trailing input at token {}",
            parser.pos
        )));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| LocusError::Parse(format!("invalid number literal: {num_str}")))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            match c {
                '+' => tokens.push(Token::Plus),
                '-' => tokens.push(Token::Minus),
                '*' => tokens.push(Token::Star),
                '/' => tokens.push(Token::Slash),
                '^' => tokens.push(Token::Caret),
                '(' => tokens.push(Token::LParen),
                ')' => tokens.push(Token::RParen),
                other => return Err(LocusError::Parse(format!("unexpected character: {other}"))),
            }
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_factor()?;

        while let Some(token) = self.peek() {
            match token {
                Token::Plus => {
                    self.consume();
                    let right = self.parse_factor()?;
                    left = Expr::Binary(Box::new(left), '+', Box::new(right));
                }
                Token::Minus => {
                    self.consume();
                    let right = self.parse_factor()?;
                    left = Expr::Binary(Box::new(left), '-', Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        let mut left = self.parse_power()?;

        while let Some(token) = self.peek() {
            match token {
                Token::Star => {
                    self.consume();
                    let right = self.parse_power()?;
                    left = Expr::Binary(Box::new(left), '*', Box::new(right));
                }
                Token::Slash => {
                    self.consume();
                    let right = self.parse_power()?;
                    left = Expr::Binary(Box::new(left), '/', Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;

        while let Some(Token::Caret) = self.peek() {
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), '^', Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary('-', Box::new(expr)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(Complex64::new(n, 0.0))),
            Some(Token::Identifier(name)) => {
                if name == "i" {
                    return Ok(Expr::Number(Complex64::i()));
                }
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    let arg = self.parse_expression()?;
                    match self.consume() {
                        Some(Token::RParen) => {
                            if !KNOWN_FUNCTIONS.contains(&name.as_str()) {
                                return Err(LocusError::Parse(format!("unknown function: {name}")));
                            }
                            Ok(Expr::Call(name, Box::new(arg)))
                        }
                        _ => Err(LocusError::Parse("expected ')'".to_string())),
                    }
                } else {
                    Ok(Expr::Symbol(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(LocusError::Parse("expected ')'".to_string())),
                }
            }
            _ => Err(LocusError::Parse("unexpected end of expression".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{compile, parse, SymbolicExpression};
    use crate::error::LocusError;
    use crate::param_space::{Axis, ParameterSpace};
    use num_complex::Complex64;
    use std::collections::BTreeMap;

    fn space_xy() -> ParameterSpace {
        ParameterSpace::new(
            vec![Axis::new("x", -2.0, 2.0, 10), Axis::new("y", -2.0, 2.0, 10)],
            BTreeMap::new(),
        )
        .expect("space should validate")
    }

    #[test]
    fn evaluates_real_polynomial() {
        let expr = parse("x^2 + y^2 - 1").expect("should parse");
        let func = compile(&expr, &space_xy()).expect("should compile");
        let mut stack = Vec::new();
        let value = func.eval_at(&[1.0, 1.0], &mut stack);
        assert!((value.re - 1.0).abs() < 1e-12, "got {value}");
        assert!(value.im.abs() < 1e-12);
        assert!(!func.is_complex_valued());
    }

    #[test]
    fn imaginary_unit_promotes_to_complex() {
        let expr = parse("(x + i*y) - (1 + i)").expect("should parse");
        let func = compile(&expr, &space_xy()).expect("should compile");
        assert!(func.is_complex_valued());
        let mut stack = Vec::new();
        let value = func.eval_at(&[1.0, 1.0], &mut stack);
        assert!(value.norm() < 1e-12, "expected root at (1,1), got {value}");
    }

    #[test]
    fn substitution_replaces_fixed_parameters() {
        let expr = parse("a*x + y").expect("should parse");
        let mut fixed = BTreeMap::new();
        fixed.insert("a".to_string(), 3.0);
        let reduced = expr.substitute(&fixed);
        assert_eq!(reduced.free_symbols().len(), 2);
        assert!(!reduced.free_symbols().contains("a"));
    }

    #[test]
    fn unresolved_symbol_fails_before_sampling() {
        let expr = parse("x + missing").expect("should parse");
        let err = compile(&expr, &space_xy()).expect_err("unknown symbol should fail");
        assert!(
            matches!(err, LocusError::UnresolvedSymbol { ref symbol } if symbol == "missing"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn fixed_parameter_resolves_through_space() {
        let expr = parse("a*x + y").expect("should parse");
        let mut fixed = BTreeMap::new();
        fixed.insert("a".to_string(), 2.0);
        let space = ParameterSpace::new(
            vec![Axis::new("x", 0.0, 1.0, 5), Axis::new("y", 0.0, 1.0, 5)],
            fixed,
        )
        .expect("space should validate");
        let func = compile(&expr, &space).expect("should compile");
        let mut stack = Vec::new();
        let value = func.eval_at(&[1.0, 0.5], &mut stack);
        assert!((value.re - 2.5).abs() < 1e-12, "got {value}");
    }

    #[test]
    fn complex_functions_evaluate_in_complex_plane() {
        let expr = parse("exp(i*x) - cos(x) - i*sin(x)").expect("should parse");
        let func = compile(&expr, &space_xy()).expect("should compile");
        let mut stack = Vec::new();
        for &x in &[0.0, 0.7, -1.3] {
            let value = func.eval(
                &[Complex64::new(x, 0.0), Complex64::new(0.0, 0.0)],
                &mut stack,
            );
            assert!(value.norm() < 1e-12, "Euler identity should hold, got {value}");
        }
    }

    #[test]
    fn eval_many_broadcasts_scalar_inputs() {
        let expr = parse("x + y").expect("should parse");
        let func = compile(&expr, &space_xy()).expect("should compile");
        let xs = [0.0, 1.0, 2.0];
        let ys = [10.0];
        let out = func.eval_many(&[&xs, &ys]);
        assert_eq!(out.len(), 3);
        assert!((out[2].re - 12.0).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "broadcast-compatible")]
    fn eval_many_rejects_mismatched_lengths() {
        let expr = parse("x + y").expect("should parse");
        let func = compile(&expr, &space_xy()).expect("should compile");
        let xs = [0.0, 1.0, 2.0];
        let ys = [1.0, 2.0];
        let _ = func.eval_many(&[&xs, &ys]);
    }

    #[test]
    fn unknown_function_is_a_parse_error() {
        let err = parse("frobnicate(x)").expect_err("unknown function should fail");
        assert!(matches!(err, LocusError::Parse(_)), "unexpected error: {err}");
    }
}
