//! Expression evaluator (component C6): operator-precedence evaluation of a
//! tokenized line's expression tokens against the variable table.
//!
//! Grounded on `processor::CPU::effective_address`: the teacher resolves an
//! `EAMode` by walking register/displacement variants through one `match`
//! and returning an `OpResult`; the same shape here is a `Cursor` walking a
//! token slice through one `match` per precedence level and returning a
//! [`Value`]. Binary operators fold through [`Value`]'s arithmetic methods
//! (`fields::OpResult` does the analogous fold for `ADD`/`SUB`/`AND`/...).

use crate::error::{BasicError, ErrorKind, Result};
use crate::keywords::Keyword;
use crate::token::{Operator, Token};
use crate::value::{CompareOp, Value};
use crate::variables::VariableTable;

/// Everything the evaluator needs from the surrounding interpreter: the
/// variable table, plus every side-effecting or stateful function it cannot
/// resolve on its own (`FN` calls, graphics read-back, collaborators). The
/// executor (C7) implements this directly on the interpreter, so a single
/// `&mut dyn ExprHost` borrow reaches both without the evaluator needing a
/// second, simultaneous borrow of the variable table.
pub trait ExprHost {
    fn vars(&mut self) -> &mut VariableTable;
    fn call_fn(&mut self, name: &str, args: Vec<Value>) -> Result<Value>;
    fn point(&mut self, x: i32, y: i32) -> Result<Value>;
    fn inkey(&mut self, arg: i32) -> Result<Value>;
    fn get_char(&mut self) -> Result<Value>;
    fn eof(&mut self, channel: i32) -> Result<Value>;
    fn time(&mut self) -> Result<Value>;
    fn pos(&mut self) -> Result<Value>;
    fn vpos(&mut self) -> Result<Value>;
    fn usr(&mut self, address: i64) -> Result<Value>;
    fn adval(&mut self, channel: i32) -> Result<Value>;
    fn err(&mut self) -> Result<Value>;
    fn erl(&mut self) -> Result<Value>;
    fn report(&mut self) -> Result<Value>;
    fn open_in(&mut self, path: &[u8]) -> Result<Value>;
    fn open_out(&mut self, path: &[u8]) -> Result<Value>;
    fn open_up(&mut self, path: &[u8]) -> Result<Value>;
    fn bget(&mut self, channel: i32) -> Result<Value>;
    fn ptr(&mut self, channel: i32) -> Result<Value>;
    fn ext(&mut self, channel: i32) -> Result<Value>;
}

pub struct Evaluator<'a> {
    host: &'a mut dyn ExprHost,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(host: &'a mut dyn ExprHost, tokens: &'a [Token]) -> Self {
        Evaluator { host, tokens, pos: 0 }
    }

    pub fn eval(&mut self) -> Result<Value> {
        self.eval_or()
    }

    /// Number of tokens consumed so far, for callers (the executor) that
    /// keep walking the same token slice after one expression.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_op(&mut self, op: Operator) -> bool {
        if matches!(self.peek(), Some(Token::Operator(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if matches!(self.peek(), Some(Token::Keyword(k)) if *k == kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eval_or(&mut self) -> Result<Value> {
        let mut lhs = self.eval_and()?;
        loop {
            if self.eat_kw(Keyword::Or) {
                let rhs = self.eval_and()?;
                lhs = lhs.or(&rhs)?;
            } else if self.eat_kw(Keyword::Eor) {
                let rhs = self.eval_and()?;
                lhs = lhs.eor(&rhs)?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn eval_and(&mut self) -> Result<Value> {
        let mut lhs = self.eval_not()?;
        while self.eat_kw(Keyword::And) {
            let rhs = self.eval_not()?;
            lhs = lhs.and(&rhs)?;
        }
        Ok(lhs)
    }

    fn eval_not(&mut self) -> Result<Value> {
        if self.eat_kw(Keyword::Not) {
            let v = self.eval_not()?;
            return v.not();
        }
        self.eval_compare()
    }

    fn eval_compare(&mut self) -> Result<Value> {
        let lhs = self.eval_shift()?;
        let op = match self.peek() {
            Some(Token::Operator(Operator::Eq)) => Some(CompareOp::Eq),
            Some(Token::Operator(Operator::Ne)) => Some(CompareOp::Ne),
            Some(Token::Operator(Operator::Lt)) => Some(CompareOp::Lt),
            Some(Token::Operator(Operator::Gt)) => Some(CompareOp::Gt),
            Some(Token::Operator(Operator::Le)) => Some(CompareOp::Le),
            Some(Token::Operator(Operator::Ge)) => Some(CompareOp::Ge),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let rhs = self.eval_shift()?;
                lhs.compare(&rhs, op)
            }
            None => Ok(lhs),
        }
    }

    fn eval_shift(&mut self) -> Result<Value> {
        let mut lhs = self.eval_additive()?;
        loop {
            if self.eat_op(Operator::Shl) {
                lhs = lhs.shl(&self.eval_additive()?)?;
            } else if self.eat_op(Operator::AShr) {
                lhs = lhs.ashr(&self.eval_additive()?)?;
            } else if self.eat_op(Operator::Shr) {
                lhs = lhs.shr(&self.eval_additive()?)?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn eval_additive(&mut self) -> Result<Value> {
        let mut lhs = self.eval_term()?;
        loop {
            if self.eat_op(Operator::Add) {
                lhs = lhs.add(&self.eval_term()?)?;
            } else if self.eat_op(Operator::Sub) {
                lhs = lhs.sub(&self.eval_term()?)?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn eval_term(&mut self) -> Result<Value> {
        let mut lhs = self.eval_unary()?;
        loop {
            if self.eat_op(Operator::Mul) {
                lhs = lhs.mul(&self.eval_unary()?)?;
            } else if self.eat_op(Operator::Div) {
                lhs = lhs.div(&self.eval_unary()?)?;
            } else if self.eat_kw(Keyword::Div) {
                lhs = lhs.int_div(&self.eval_unary()?)?;
            } else if self.eat_kw(Keyword::Mod) {
                lhs = lhs.int_mod(&self.eval_unary()?)?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn eval_unary(&mut self) -> Result<Value> {
        if self.eat_op(Operator::Sub) {
            return self.eval_unary()?.neg();
        }
        if self.eat_op(Operator::Add) {
            return self.eval_unary();
        }
        self.eval_power()
    }

    /// `^` is right-associative and binds tighter than unary minus, matching
    /// `-2^2 == -4`.
    fn eval_power(&mut self) -> Result<Value> {
        let lhs = self.eval_primary()?;
        if self.eat_op(Operator::Pow) {
            let rhs = self.eval_unary()?;
            return lhs.pow(&rhs);
        }
        Ok(lhs)
    }

    fn eval_primary(&mut self) -> Result<Value> {
        match self.bump().cloned() {
            Some(Token::IntLiteral(v, _)) => {
                if let Ok(i) = i32::try_from(v) {
                    Ok(Value::Int32(i))
                } else {
                    Ok(Value::Int64(v))
                }
            }
            Some(Token::FloatLiteral(v)) => Ok(Value::Float64(v)),
            Some(Token::StringLiteral(bytes)) => Ok(Value::Str(bytes)),
            Some(Token::StaticVar(idx)) => Ok(Value::Int32(self.host.vars().get_static(idx))),
            Some(Token::XVar(name)) | Some(Token::Ident(name)) => self.eval_var_or_array(&name),
            Some(Token::XFnProcCall(name)) => self.eval_fn_call(&name),
            Some(Token::Operator(Operator::LParen)) => {
                let v = self.eval_or()?;
                if !self.eat_op(Operator::RParen) {
                    return Err(BasicError::new(ErrorKind::MissingRightParen, None));
                }
                Ok(v)
            }
            Some(Token::Keyword(kw)) => self.eval_keyword(kw),
            _ => Err(BasicError::new(ErrorKind::Syntax, None)),
        }
    }

    fn eval_var_or_array(&mut self, name: &str) -> Result<Value> {
        if self.eat_op(Operator::LParen) {
            let indices = self.eval_index_list()?;
            return self.host.vars().array_get(name, &indices);
        }
        self.host.vars().get(name)
    }

    fn eval_index_list(&mut self) -> Result<Vec<u32>> {
        let mut indices = Vec::new();
        loop {
            let v = self.eval_or()?;
            indices.push(v.as_i64()?.max(0) as u32);
            if self.eat_op(Operator::Comma) {
                continue;
            }
            break;
        }
        if !self.eat_op(Operator::RParen) {
            return Err(BasicError::new(ErrorKind::MissingRightParen, None));
        }
        Ok(indices)
    }

    fn eval_fn_call(&mut self, name: &str) -> Result<Value> {
        let args = if self.eat_op(Operator::LParen) {
            let args = if matches!(self.peek(), Some(Token::Operator(Operator::RParen))) {
                Vec::new()
            } else {
                let mut args = Vec::new();
                loop {
                    args.push(self.eval_or()?);
                    if self.eat_op(Operator::Comma) {
                        continue;
                    }
                    break;
                }
                args
            };
            if !self.eat_op(Operator::RParen) {
                return Err(BasicError::new(ErrorKind::MissingRightParen, None));
            }
            args
        } else {
            Vec::new()
        };
        self.host.call_fn(name, args)
    }

    fn args_in_parens(&mut self) -> Result<Vec<Value>> {
        if !self.eat_op(Operator::LParen) {
            return Err(BasicError::new(ErrorKind::Syntax, None));
        }
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::Operator(Operator::RParen))) {
            loop {
                args.push(self.eval_or()?);
                if self.eat_op(Operator::Comma) {
                    continue;
                }
                break;
            }
        }
        if !self.eat_op(Operator::RParen) {
            return Err(BasicError::new(ErrorKind::MissingRightParen, None));
        }
        Ok(args)
    }

    fn eval_keyword(&mut self, kw: Keyword) -> Result<Value> {
        match kw {
            Keyword::True => Ok(Value::Int32(-1)),
            Keyword::False => Ok(Value::Int32(0)),
            Keyword::Pi => Ok(Value::Float64(std::f64::consts::PI)),
            Keyword::Abs => Ok(Value::Float64(self.args_in_parens()?[0].as_f64()?.abs())),
            Keyword::Sgn => {
                let v = self.args_in_parens()?[0].as_f64()?;
                Ok(Value::Int32(if v > 0.0 { 1 } else if v < 0.0 { -1 } else { 0 }))
            }
            Keyword::Sqr => {
                let v = self.args_in_parens()?[0].as_f64()?;
                if v < 0.0 {
                    return Err(BasicError::new(ErrorKind::NegRoot, None));
                }
                Ok(Value::Float64(v.sqrt()))
            }
            Keyword::Sin => Ok(Value::Float64(self.args_in_parens()?[0].as_f64()?.sin())),
            Keyword::Cos => Ok(Value::Float64(self.args_in_parens()?[0].as_f64()?.cos())),
            Keyword::Tan => Ok(Value::Float64(self.args_in_parens()?[0].as_f64()?.tan())),
            Keyword::Asn => {
                let v = self.args_in_parens()?[0].as_f64()?;
                if !(-1.0..=1.0).contains(&v) {
                    return Err(BasicError::new(ErrorKind::NegRoot, None));
                }
                Ok(Value::Float64(v.asin()))
            }
            Keyword::Acs => {
                let v = self.args_in_parens()?[0].as_f64()?;
                if !(-1.0..=1.0).contains(&v) {
                    return Err(BasicError::new(ErrorKind::NegRoot, None));
                }
                Ok(Value::Float64(v.acos()))
            }
            Keyword::Atn => Ok(Value::Float64(self.args_in_parens()?[0].as_f64()?.atan())),
            Keyword::Exp => {
                let v = self.args_in_parens()?[0].as_f64()?;
                if v > 88.0 {
                    return Err(BasicError::new(ErrorKind::ExpRange, None));
                }
                Ok(Value::Float64(v.exp()))
            }
            Keyword::Ln => {
                let v = self.args_in_parens()?[0].as_f64()?;
                if v <= 0.0 {
                    return Err(BasicError::new(ErrorKind::LogRange, None));
                }
                Ok(Value::Float64(v.ln()))
            }
            Keyword::Log => {
                let v = self.args_in_parens()?[0].as_f64()?;
                if v <= 0.0 {
                    return Err(BasicError::new(ErrorKind::LogRange, None));
                }
                Ok(Value::Float64(v.log10()))
            }
            Keyword::Rad => Ok(Value::Float64(self.args_in_parens()?[0].as_f64()?.to_radians())),
            Keyword::Deg => Ok(Value::Float64(self.args_in_parens()?[0].as_f64()?.to_degrees())),
            Keyword::Int => Ok(Value::Int64(crate::conversions::trunc_to_i64(self.args_in_parens()?[0].as_f64()?.floor()))),
            Keyword::Rnd => self.eval_rnd(),
            Keyword::Chr => {
                let code = self.args_in_parens()?[0].as_i64()?;
                Ok(Value::Str(vec![code as u8]))
            }
            Keyword::Asc => {
                let args = self.args_in_parens()?;
                let bytes = args[0].as_bytes()?;
                Ok(Value::Int32(bytes.first().map(|&b| b as i32).unwrap_or(-1)))
            }
            Keyword::Len => {
                let args = self.args_in_parens()?;
                Ok(Value::Int32(args[0].as_bytes()?.len() as i32))
            }
            Keyword::Val => {
                let args = self.args_in_parens()?;
                let text = String::from_utf8_lossy(args[0].as_bytes()?).trim().to_string();
                let numeric: String = text
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+' || *c == 'e' || *c == 'E')
                    .collect();
                Ok(Value::Float64(numeric.parse().unwrap_or(0.0)))
            }
            Keyword::Str => {
                let args = self.args_in_parens()?;
                Ok(Value::Str(args[0].to_string().into_bytes()))
            }
            Keyword::Mid => self.eval_mid(),
            Keyword::Left => self.eval_left(),
            Keyword::Right => self.eval_right(),
            Keyword::String => self.eval_string_repeat(),
            Keyword::Instr => self.eval_instr(),
            Keyword::Get => self.host.get_char(),
            Keyword::Inkey => {
                let arg = self.args_in_parens()?[0].as_i64()? as i32;
                self.host.inkey(arg)
            }
            Keyword::Eof => {
                let arg = self.args_in_parens()?[0].as_i64()? as i32;
                self.host.eof(arg)
            }
            Keyword::Time => self.host.time(),
            Keyword::Pos => self.host.pos(),
            Keyword::Vpos => self.host.vpos(),
            Keyword::Usr => {
                let addr = self.args_in_parens()?[0].as_i64()?;
                self.host.usr(addr)
            }
            Keyword::Adval => {
                let arg = self.args_in_parens()?[0].as_i64()? as i32;
                self.host.adval(arg)
            }
            Keyword::Err => self.host.err(),
            Keyword::Erl => self.host.erl(),
            Keyword::Report => self.host.report(),
            Keyword::Point => {
                let args = self.args_in_parens()?;
                self.host.point(args[0].as_i64()? as i32, args[1].as_i64()? as i32)
            }
            Keyword::Openin => {
                let args = self.args_in_parens()?;
                self.host.open_in(args[0].as_bytes()?)
            }
            Keyword::Openout => {
                let args = self.args_in_parens()?;
                self.host.open_out(args[0].as_bytes()?)
            }
            Keyword::Openup => {
                let args = self.args_in_parens()?;
                self.host.open_up(args[0].as_bytes()?)
            }
            Keyword::Bget => {
                let args = self.args_in_parens()?;
                self.host.bget(args[0].as_i64()? as i32)
            }
            Keyword::Ptr => {
                let args = self.args_in_parens()?;
                self.host.ptr(args[0].as_i64()? as i32)
            }
            Keyword::Ext => {
                let args = self.args_in_parens()?;
                self.host.ext(args[0].as_i64()? as i32)
            }
            Keyword::Himem => Ok(Value::Int64(self.host.vars().himem() as i64)),
            Keyword::Lomem | Keyword::Page | Keyword::Top => Ok(Value::Int32(0)),
            Keyword::If => self.eval_if_expr(),
            _ => Err(BasicError::new(ErrorKind::Syntax, None)),
        }
    }

    /// `IF cond THEN a ELSE b` used as an expression — the only form a
    /// single-line `DEF FN...=` body can take when it branches. Only the
    /// taken side is evaluated; the other is skipped unread so a recursive
    /// call guarded by the condition (`FNf(N)=IF N<2 THEN 1 ELSE N*FNf(N-1)`)
    /// never runs down the branch that wouldn't have been taken.
    fn eval_if_expr(&mut self) -> Result<Value> {
        let cond = self.eval_or()?;
        if !self.eat_kw(Keyword::Then) {
            return Err(BasicError::new(ErrorKind::Syntax, None));
        }
        if cond.truthy()? {
            let v = self.eval_or()?;
            if self.eat_kw(Keyword::Else) {
                self.skip_expr();
            }
            Ok(v)
        } else {
            self.skip_expr();
            if !self.eat_kw(Keyword::Else) {
                return Err(BasicError::new(ErrorKind::Syntax, None));
            }
            self.eval_or()
        }
    }

    /// Advances past one expression without evaluating it, tracking paren
    /// nesting so an unevaluated `ELSE`/`:` inside a call's argument list
    /// doesn't end the skip early.
    fn skip_expr(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.peek() {
                Some(Token::Operator(Operator::LParen)) => depth += 1,
                Some(Token::Operator(Operator::RParen)) => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                Some(Token::Keyword(Keyword::Else)) | Some(Token::Operator(Operator::Colon)) if depth == 0 => break,
                None => break,
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn eval_rnd(&mut self) -> Result<Value> {
        let arg = if self.eat_op(Operator::LParen) {
            let v = self.eval_or()?;
            if !self.eat_op(Operator::RParen) {
                return Err(BasicError::new(ErrorKind::MissingRightParen, None));
            }
            Some(v.as_i64()?)
        } else {
            None
        };
        let raw = crate::rng::next_f64();
        match arg {
            None | Some(1) => Ok(Value::Float64(raw)),
            Some(0) => Ok(Value::Float64(crate::rng::last_f64())),
            Some(n) if n > 1 => Ok(Value::Int32(1 + (raw * n as f64) as i32)),
            Some(n) => {
                crate::rng::reseed(n as u64);
                Ok(Value::Int32(0))
            }
        }
    }

    fn eval_mid(&mut self) -> Result<Value> {
        let args = self.args_in_parens()?;
        let bytes = args[0].as_bytes()?;
        let start = (args[1].as_i64()?.max(1) - 1) as usize;
        let len = args.get(2).map(|v| v.as_i64()).transpose()?.map(|n| n.max(0) as usize);
        if start >= bytes.len() {
            return Ok(Value::Str(Vec::new()));
        }
        let end = match len {
            Some(l) => (start + l).min(bytes.len()),
            None => bytes.len(),
        };
        Ok(Value::Str(bytes[start..end].to_vec()))
    }

    fn eval_left(&mut self) -> Result<Value> {
        let args = self.args_in_parens()?;
        let bytes = args[0].as_bytes()?;
        let n = match args.get(1) {
            Some(v) => v.as_i64()?.max(0) as usize,
            None => bytes.len().saturating_sub(1),
        };
        Ok(Value::Str(bytes[..n.min(bytes.len())].to_vec()))
    }

    fn eval_right(&mut self) -> Result<Value> {
        let args = self.args_in_parens()?;
        let bytes = args[0].as_bytes()?;
        let n = match args.get(1) {
            Some(v) => v.as_i64()?.max(0) as usize,
            None => 1,
        };
        let n = n.min(bytes.len());
        Ok(Value::Str(bytes[bytes.len() - n..].to_vec()))
    }

    fn eval_string_repeat(&mut self) -> Result<Value> {
        let args = self.args_in_parens()?;
        let n = args[0].as_i64()?;
        if n < 0 {
            return Err(crate::error::BasicError::new(crate::error::ErrorKind::BadCall, None));
        }
        let bytes = args[1].as_bytes()?;
        let total = bytes.len() as u64 * n as u64;
        if total > crate::strings::MAX_STRING as u64 {
            return Err(crate::error::BasicError::new(crate::error::ErrorKind::StringLen, None));
        }
        Ok(Value::Str(bytes.repeat(n as usize)))
    }

    fn eval_instr(&mut self) -> Result<Value> {
        let args = self.args_in_parens()?;
        let haystack = args[0].as_bytes()?;
        let needle = args[1].as_bytes()?;
        let start = args.get(2).map(|v| v.as_i64()).transpose()?.map(|n| (n.max(1) - 1) as usize).unwrap_or(0);
        if start > haystack.len() || needle.is_empty() {
            return Ok(Value::Int32(0));
        }
        let found = haystack[start..].windows(needle.len().max(1)).position(|w| w == needle);
        Ok(Value::Int32(found.map(|p| (p + start + 1) as i32).unwrap_or(0)))
    }
}

/// Evaluates one expression starting at `tokens[0]`, returning the value and
/// how many tokens it consumed, so a statement executor can keep parsing
/// the remainder of the line (e.g. a trailing `,` in `PRINT A, B`).
pub fn eval_expr(host: &mut dyn ExprHost, tokens: &[Token]) -> Result<(Value, usize)> {
    let mut ev = Evaluator::new(host, tokens);
    let v = ev.eval()?;
    let n = ev.consumed();
    Ok((v, n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    struct NullHost {
        vars: VariableTable,
    }
    impl ExprHost for NullHost {
        fn vars(&mut self) -> &mut VariableTable {
            &mut self.vars
        }
        fn call_fn(&mut self, _name: &str, _args: Vec<Value>) -> Result<Value> {
            Err(BasicError::new(ErrorKind::NotFn, None))
        }
        fn point(&mut self, _x: i32, _y: i32) -> Result<Value> {
            Ok(Value::Int32(0))
        }
        fn inkey(&mut self, _arg: i32) -> Result<Value> {
            Ok(Value::Int32(-1))
        }
        fn get_char(&mut self) -> Result<Value> {
            Ok(Value::Int32(-1))
        }
        fn eof(&mut self, _channel: i32) -> Result<Value> {
            Ok(Value::Int32(-1))
        }
        fn time(&mut self) -> Result<Value> {
            Ok(Value::Int32(0))
        }
        fn pos(&mut self) -> Result<Value> {
            Ok(Value::Int32(0))
        }
        fn vpos(&mut self) -> Result<Value> {
            Ok(Value::Int32(0))
        }
        fn usr(&mut self, _address: i64) -> Result<Value> {
            Ok(Value::Int32(0))
        }
        fn adval(&mut self, _channel: i32) -> Result<Value> {
            Ok(Value::Int32(0))
        }
        fn err(&mut self) -> Result<Value> {
            Ok(Value::Int32(0))
        }
        fn erl(&mut self) -> Result<Value> {
            Ok(Value::Int32(0))
        }
        fn report(&mut self) -> Result<Value> {
            Ok(Value::Str(Vec::new()))
        }
        fn open_in(&mut self, _path: &[u8]) -> Result<Value> {
            Ok(Value::Int32(0))
        }
        fn open_out(&mut self, _path: &[u8]) -> Result<Value> {
            Ok(Value::Int32(0))
        }
        fn open_up(&mut self, _path: &[u8]) -> Result<Value> {
            Ok(Value::Int32(0))
        }
        fn bget(&mut self, _channel: i32) -> Result<Value> {
            Ok(Value::Int32(-1))
        }
        fn ptr(&mut self, _channel: i32) -> Result<Value> {
            Ok(Value::Int32(0))
        }
        fn ext(&mut self, _channel: i32) -> Result<Value> {
            Ok(Value::Int32(0))
        }
    }

    fn eval_str(src: &str) -> Value {
        let line = tokenize(&format!("X={}", src)).unwrap();
        let mut host = NullHost { vars: VariableTable::new() };
        let (v, _) = eval_expr(&mut host, &line.tokens[2..]).unwrap();
        v
    }

    #[test]
    fn precedence_multiplies_before_adding() {
        match eval_str("2+3*4") {
            Value::Int32(v) => assert_eq!(v, 14),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn power_is_right_associative() {
        match eval_str("2^3^2") {
            Value::Int64(v) => assert_eq!(v, 512),
            Value::Float64(v) => assert_eq!(v, 512.0),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn parentheses_override_precedence() {
        match eval_str("(2+3)*4") {
            Value::Int32(v) => assert_eq!(v, 20),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn mid_dollar_extracts_substring() {
        match eval_str("MID$(\"hello world\",7,5)") {
            Value::Str(s) => assert_eq!(s, b"world"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn string_comparison_is_lexicographic() {
        match eval_str("\"abc\"<\"abd\"") {
            Value::Int32(v) => assert_eq!(v, -1),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn instr_finds_substring_position() {
        match eval_str("INSTR(\"hello world\",\"world\")") {
            Value::Int32(v) => assert_eq!(v, 7),
            other => panic!("{other:?}"),
        }
    }
}
