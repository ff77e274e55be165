//! Reader for the textual tree IR.
//!
//! Grammar, one s-expression per construct:
//!
//! ```text
//! method := (method NAME (params TYPE*) (returns TYPE) [(monitors N)] block+)
//! block  := (block N phi* stmt* term)
//! phi    := (phi %N TYPE (PRED expr)*)
//! stmt   := (let %N expr) | (eval expr)
//!         | (store-field TYPE expr OFFSET expr FLAG*)
//!         | (store-array TYPE expr expr expr)
//! term   := (goto N) | (if COND expr expr N N) | (return [expr])
//! expr   := %N | null | (param N) | (const TYPE LITERAL)
//!         | (BINOP TYPE expr expr) | (neg TYPE expr) | (convert KIND expr)
//!         | (load-field TYPE expr OFFSET FLAG*) | (load-array TYPE expr expr)
//!         | (unsafe-load TYPE expr expr [volatile])
//!         | (cas TYPE expr expr expr expr) | (xchg TYPE expr expr expr)
//!         | (xadd TYPE expr expr expr)
//!         | (call static|virtual|native|runtime TARGET TYPE (TYPE expr)*)
//! OFFSET := integer | ?          ; ? marks an unresolved field
//! FLAG   := volatile | weak
//! ```

use super::{AtomicOp, BinaryOp, Block, Call, CallKind, Expr, Field, Method, Phi, RefStrength, Stmt, Terminator, ValueId};
use crate::core::error::{CompileError, CompileResult};
use crate::lir::{BasicType, BlockId, CallTarget, Condition, Constant, ConvertKind};

/// Runtime entry points a `(call runtime ...)` may name.
pub const RUNTIME_ENTRIES: &[&str] = &[
    "new_instance",
    "new_array",
    "monitorenter",
    "monitorexit",
    "throw_exception",
    "arraycopy",
    "resolve_field",
];

/// Parse a single method.
pub fn parse_method(text: &str) -> CompileResult<Method> {
    let forms = read_forms(text)?;
    match forms.as_slice() {
        [form] => method(form),
        [] => Err(CompileError::Parse { line: 1, message: "empty input".to_string() }),
        [_, second, ..] => Err(second.error("expected a single method")),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SExpr<'a> {
    Atom { text: &'a str, line: usize },
    List { items: Vec<SExpr<'a>>, line: usize },
}

impl<'a> SExpr<'a> {
    fn line(&self) -> usize {
        match self {
            SExpr::Atom { line, .. } | SExpr::List { line, .. } => *line,
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Parse { line: self.line(), message: message.into() }
    }

    fn atom(&self) -> CompileResult<&'a str> {
        match self {
            SExpr::Atom { text, .. } => Ok(*text),
            SExpr::List { .. } => Err(self.error("expected an atom, found a list")),
        }
    }

    fn list(&self) -> CompileResult<&[SExpr<'a>]> {
        match self {
            SExpr::List { items, .. } => Ok(items),
            SExpr::Atom { text, .. } => Err(self.error(format!("expected a list, found '{}'", text))),
        }
    }

    /// Items of a list whose head is `keyword`.
    fn form(&self, keyword: &str) -> CompileResult<&[SExpr<'a>]> {
        let items = self.list()?;
        match items.first() {
            Some(head) if head.atom().ok() == Some(keyword) => Ok(&items[1..]),
            _ => Err(self.error(format!("expected ({} ...)", keyword))),
        }
    }

    fn head(&self) -> Option<&'a str> {
        match self {
            SExpr::List { items, .. } => items.first().and_then(|h| h.atom().ok()),
            SExpr::Atom { .. } => None,
        }
    }
}

struct Reader<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Reader<'a> {
    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                b';' => {
                    while let Some(ch) = self.peek() {
                        if ch == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                c if c.is_ascii_whitespace() => self.pos += 1,
                _ => break,
            }
        }
    }

    fn read(&mut self) -> CompileResult<Option<SExpr<'a>>> {
        self.skip_whitespace();
        let line = self.line;
        match self.peek() {
            None => Ok(None),
            Some(b'(') => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    self.skip_whitespace();
                    match self.peek() {
                        Some(b')') => {
                            self.pos += 1;
                            return Ok(Some(SExpr::List { items, line }));
                        }
                        None => {
                            return Err(CompileError::Parse { line, message: "unclosed '('".to_string() })
                        }
                        Some(_) => {
                            if let Some(item) = self.read()? {
                                items.push(item);
                            }
                        }
                    }
                }
            }
            Some(b')') => Err(CompileError::Parse { line, message: "unexpected ')'".to_string() }),
            Some(_) => {
                let start = self.pos;
                while let Some(ch) = self.peek() {
                    if ch.is_ascii_whitespace() || ch == b'(' || ch == b')' || ch == b';' {
                        break;
                    }
                    self.pos += 1;
                }
                Ok(Some(SExpr::Atom { text: &self.text[start..self.pos], line }))
            }
        }
    }
}

fn read_forms(text: &str) -> CompileResult<Vec<SExpr<'_>>> {
    let mut reader = Reader { text, pos: 0, line: 1 };
    let mut forms = Vec::new();
    while let Some(form) = reader.read()? {
        forms.push(form);
    }
    Ok(forms)
}

fn integer(s: &SExpr<'_>) -> CompileResult<i64> {
    let text = s.atom()?;
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| s.error(format!("expected an integer, found '{}'", text)))
}

fn number<T: TryFrom<i64>>(s: &SExpr<'_>) -> CompileResult<T> {
    let value = integer(s)?;
    T::try_from(value).map_err(|_| s.error(format!("{} is out of range", value)))
}

fn basic_type(s: &SExpr<'_>) -> CompileResult<BasicType> {
    let text = s.atom()?;
    BasicType::from_name(text).ok_or_else(|| s.error(format!("unknown type '{}'", text)))
}

fn value_id(s: &SExpr<'_>) -> CompileResult<ValueId> {
    let text = s.atom()?;
    text.strip_prefix('%')
        .and_then(|n| n.parse().ok())
        .map(ValueId)
        .ok_or_else(|| s.error(format!("expected a value name, found '{}'", text)))
}

fn block_id(s: &SExpr<'_>) -> CompileResult<BlockId> {
    Ok(BlockId(number(s)?))
}

fn arity<'s, 'a>(form: &'s SExpr<'a>, items: &'s [SExpr<'a>], n: usize) -> CompileResult<&'s [SExpr<'a>]> {
    if items.len() != n {
        return Err(form.error(format!(
            "({} ...) takes {} operands, found {}",
            form.head().unwrap_or("?"),
            n,
            items.len()
        )));
    }
    Ok(items)
}

fn method(form: &SExpr<'_>) -> CompileResult<Method> {
    let items = form.form("method")?;
    if items.len() < 4 {
        return Err(form.error("method needs a name, params, returns and at least one block"));
    }
    let name = items[0].atom()?.to_string();
    let params = items[1].form("params")?.iter().map(basic_type).collect::<CompileResult<Vec<_>>>()?;
    let returns = arity(&items[2], items[2].form("returns")?, 1)?;
    let return_type = basic_type(&returns[0])?;

    let mut rest = &items[3..];
    let mut monitor_count = 0;
    if let Some(first) = rest.first() {
        if first.head() == Some("monitors") {
            monitor_count = number(&arity(first, first.form("monitors")?, 1)?[0])?;
            rest = &rest[1..];
        }
    }

    let blocks = rest.iter().map(block).collect::<CompileResult<Vec<_>>>()?;
    if blocks.is_empty() {
        return Err(form.error("method has no blocks"));
    }
    for (i, b) in blocks.iter().enumerate() {
        if blocks[..i].iter().any(|other| other.id == b.id) {
            return Err(form.error(format!("block {} defined twice", b.id.0)));
        }
    }
    if blocks[0].id != BlockId(0) {
        return Err(form.error("the first block must be block 0"));
    }

    Ok(Method { name, params, return_type, monitor_count, blocks })
}

fn block(form: &SExpr<'_>) -> CompileResult<Block> {
    let items = form.form("block")?;
    let (id, body) = match items.split_first() {
        Some((id, body)) => (block_id(id)?, body),
        None => return Err(form.error("block needs a number")),
    };
    let (end, body) = match body.split_last() {
        Some((end, body)) => (terminator(end)?, body),
        None => return Err(form.error(format!("block {} has no terminator", id.0))),
    };

    let mut phis = Vec::new();
    let mut stmts = Vec::new();
    for item in body {
        if item.head() == Some("phi") {
            if !stmts.is_empty() {
                return Err(item.error("phis must precede statements"));
            }
            phis.push(phi(item)?);
        } else {
            stmts.push(stmt(item)?);
        }
    }
    Ok(Block { id, phis, stmts, end })
}

fn phi(form: &SExpr<'_>) -> CompileResult<Phi> {
    let items = form.form("phi")?;
    if items.len() < 2 {
        return Err(form.error("phi needs a value and a type"));
    }
    let value = value_id(&items[0])?;
    let ty = basic_type(&items[1])?;
    let incoming = items[2..]
        .iter()
        .map(|edge| {
            let pair = edge.list()?;
            match pair {
                [pred, value] => Ok((block_id(pred)?, expr(value)?)),
                _ => Err(edge.error("phi input must be (PRED expr)")),
            }
        })
        .collect::<CompileResult<Vec<_>>>()?;
    Ok(Phi { value, ty, incoming })
}

fn field(ty: &SExpr<'_>, offset: &SExpr<'_>, flags: &[SExpr<'_>]) -> CompileResult<Field> {
    let offset = match offset.atom()? {
        "?" => None,
        _ => Some(number(offset)?),
    };
    let mut field = Field { ty: basic_type(ty)?, offset, volatile: false, strength: RefStrength::Strong };
    for flag in flags {
        match flag.atom()? {
            "volatile" => field.volatile = true,
            "weak" => field.strength = RefStrength::Weak,
            other => return Err(flag.error(format!("unknown field flag '{}'", other))),
        }
    }
    Ok(field)
}

fn stmt(form: &SExpr<'_>) -> CompileResult<Stmt> {
    let items = form.list()?;
    let args = items.get(1..).unwrap_or(&[]);
    match form.head() {
        Some("let") => {
            let args = arity(form, args, 2)?;
            Ok(Stmt::Let(value_id(&args[0])?, expr(&args[1])?))
        }
        Some("eval") => Ok(Stmt::Eval(expr(&arity(form, args, 1)?[0])?)),
        Some("store-field") => {
            if args.len() < 4 {
                return Err(form.error("store-field needs a type, object, offset and value"));
            }
            Ok(Stmt::StoreField {
                object: expr(&args[1])?,
                field: field(&args[0], &args[2], &args[4..])?,
                value: expr(&args[3])?,
            })
        }
        Some("store-array") => {
            let args = arity(form, args, 4)?;
            Ok(Stmt::StoreArray {
                elem: basic_type(&args[0])?,
                array: expr(&args[1])?,
                index: expr(&args[2])?,
                value: expr(&args[3])?,
            })
        }
        _ => Err(form.error("expected a statement")),
    }
}

fn terminator(form: &SExpr<'_>) -> CompileResult<Terminator> {
    let items = form.list()?;
    let args = items.get(1..).unwrap_or(&[]);
    match form.head() {
        Some("goto") => Ok(Terminator::Goto(block_id(&arity(form, args, 1)?[0])?)),
        Some("if") => {
            let args = arity(form, args, 5)?;
            let name = args[0].atom()?;
            let cond = Condition::from_name(name).ok_or_else(|| args[0].error(format!("unknown condition '{}'", name)))?;
            Ok(Terminator::If {
                cond,
                left: expr(&args[1])?,
                right: expr(&args[2])?,
                then_block: block_id(&args[3])?,
                else_block: block_id(&args[4])?,
            })
        }
        Some("return") => match args {
            [] => Ok(Terminator::Return(None)),
            [value] => Ok(Terminator::Return(Some(expr(value)?))),
            _ => Err(form.error("return takes at most one value")),
        },
        _ => Err(form.error("expected a terminator (goto, if, return)")),
    }
}

fn constant(ty: &SExpr<'_>, literal: &SExpr<'_>) -> CompileResult<Constant> {
    let text = literal.atom()?;
    let bad = || literal.error(format!("bad {} literal '{}'", ty.atom().unwrap_or("?"), text));
    Ok(match basic_type(ty)? {
        BasicType::Boolean | BasicType::Byte | BasicType::Char | BasicType::Short | BasicType::Int => {
            Constant::Int(number(literal)?)
        }
        BasicType::Long => Constant::Long(integer(literal)?),
        BasicType::Float => Constant::float(text.parse().map_err(|_| bad())?),
        BasicType::Double => Constant::double(text.parse().map_err(|_| bad())?),
        BasicType::Object | BasicType::Array => match text {
            "null" => Constant::Object(None),
            _ => Constant::Object(Some(number(literal)?)),
        },
        BasicType::Metadata => Constant::Metadata(number(literal)?),
        BasicType::Address => Constant::Address(number(literal)?),
        BasicType::Void => return Err(ty.error("void constant")),
    })
}

fn boxed(s: &SExpr<'_>) -> CompileResult<Box<Expr>> {
    expr(s).map(Box::new)
}

fn call(form: &SExpr<'_>, args: &[SExpr<'_>]) -> CompileResult<Expr> {
    if args.len() < 3 {
        return Err(form.error("call needs a kind, target and return type"));
    }
    let kind = match args[0].atom()? {
        "static" => CallKind::Static,
        "virtual" => CallKind::Virtual,
        "native" => CallKind::Native,
        "runtime" => CallKind::Runtime,
        other => return Err(args[0].error(format!("unknown call kind '{}'", other))),
    };
    let target = match kind {
        CallKind::Static | CallKind::Virtual => CallTarget::Method(number(&args[1])?),
        CallKind::Native => CallTarget::Native(number(&args[1])?),
        CallKind::Runtime => {
            let name = args[1].atom()?;
            let entry = RUNTIME_ENTRIES
                .iter()
                .copied()
                .find(|e| *e == name)
                .ok_or_else(|| args[1].error(format!("unknown runtime entry '{}'", name)))?;
            CallTarget::Runtime(entry)
        }
    };
    let return_type = basic_type(&args[2])?;
    let args = args[3..]
        .iter()
        .map(|arg| match arg.list()? {
            [ty, value] => Ok((basic_type(ty)?, expr(value)?)),
            _ => Err(arg.error("call argument must be (TYPE expr)")),
        })
        .collect::<CompileResult<Vec<_>>>()?;
    Ok(Expr::Call(Box::new(Call { kind, target, return_type, args })))
}

fn expr(form: &SExpr<'_>) -> CompileResult<Expr> {
    if let SExpr::Atom { text, .. } = form {
        return match *text {
            "null" => Ok(Expr::Const(Constant::Object(None))),
            _ => value_id(form).map(Expr::Local),
        };
    }

    let items = form.list()?;
    let head = form.head().ok_or_else(|| form.error("expected an operator"))?;
    let args = items.get(1..).unwrap_or(&[]);

    if let Some(op) = BinaryOp::from_name(head) {
        let args = arity(form, args, 3)?;
        return Ok(Expr::Binary { op, ty: basic_type(&args[0])?, left: boxed(&args[1])?, right: boxed(&args[2])? });
    }

    match head {
        "param" => Ok(Expr::Param(number(&arity(form, args, 1)?[0])?)),
        "const" => {
            let args = arity(form, args, 2)?;
            Ok(Expr::Const(constant(&args[0], &args[1])?))
        }
        "neg" => {
            let args = arity(form, args, 2)?;
            Ok(Expr::Negate { ty: basic_type(&args[0])?, value: boxed(&args[1])? })
        }
        "convert" => {
            let args = arity(form, args, 2)?;
            let name = args[0].atom()?;
            let kind = ConvertKind::from_name(name).ok_or_else(|| args[0].error(format!("unknown conversion '{}'", name)))?;
            Ok(Expr::Convert { kind, value: boxed(&args[1])? })
        }
        "load-field" => {
            if args.len() < 3 {
                return Err(form.error("load-field needs a type, object and offset"));
            }
            Ok(Expr::LoadField { object: boxed(&args[1])?, field: field(&args[0], &args[2], &args[3..])? })
        }
        "load-array" => {
            let args = arity(form, args, 3)?;
            Ok(Expr::LoadArray { elem: basic_type(&args[0])?, array: boxed(&args[1])?, index: boxed(&args[2])? })
        }
        "unsafe-load" => {
            let volatile = match args.get(3) {
                None => false,
                Some(flag) if flag.atom()? == "volatile" => true,
                Some(flag) => return Err(flag.error("expected 'volatile'")),
            };
            if args.len() < 3 || args.len() > 4 {
                return Err(form.error("unsafe-load needs a type, object and offset"));
            }
            Ok(Expr::UnsafeLoad { ty: basic_type(&args[0])?, object: boxed(&args[1])?, offset: boxed(&args[2])?, volatile })
        }
        "cas" | "xchg" | "xadd" => {
            let (op, n) = match head {
                "cas" => (AtomicOp::CompareAndSwap, 5),
                "xchg" => (AtomicOp::Exchange, 4),
                _ => (AtomicOp::Add, 4),
            };
            let args = arity(form, args, n)?;
            Ok(Expr::Atomic {
                op,
                ty: basic_type(&args[0])?,
                object: boxed(&args[1])?,
                offset: boxed(&args[2])?,
                operands: args[3..].iter().map(expr).collect::<CompileResult<Vec<_>>>()?,
            })
        }
        "call" => call(form, args),
        other => Err(form.error(format!("unknown expression '{}'", other))),
    }
}
