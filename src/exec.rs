//! Statement executor (component C7): walks the program store one
//! statement at a time, dispatching on the leading keyword/token of each
//! and driving every other component (variables, evaluator, VDU, file I/O).
//!
//! Grounded on `processor::CPU`'s fetch/decode/execute loop: the teacher
//! fetches one instruction, advances its program counter, and dispatches to
//! a per-opcode handler; `Interpreter::drive` does the same over tokenized
//! lines instead of 68000 words, with `Flow` standing in for the teacher's
//! post-execute PC update (fall through, branch, or halt).

use crate::arena::Arena;
use crate::collaborators::Collaborators;
use crate::config::Configuration;
use crate::error::{BasicError, ErrorFrame, ErrorKind, Result};
use crate::eval::{self, ExprHost};
use crate::framebuffer::Framebuffer;
use crate::keywords::Keyword;
use crate::mode7::Mode7Screen;
use crate::palette::{PlotAction, Rgb};
use crate::program::{DataCursor, Program};
use crate::token::{Operator, Token};
use crate::value::Value;
use crate::variables::VariableTable;
use crate::vdu::VduState;

/// One `FOR`/`NEXT` activation: the control variable's name, its limit and
/// step, and the loop-body entry point to jump back to (spec.md §4.4).
#[derive(Clone)]
struct ForFrame {
    var: String,
    limit: Value,
    step: Value,
    line: u16,
    pos: usize,
}

/// One `PROC`/`FN` activation: where to resume the caller and whether the
/// callee must end in an `=expr` return (`FN`) or a bare `ENDPROC` (`PROC`).
struct CallFrame {
    is_fn: bool,
    return_line: u16,
    return_pos: usize,
    saved_tokens: Vec<Token>,
}

/// A scanned `DEF PROC`/`DEF FN` header: its parameter names and the token
/// position its body starts at (spec.md §4.6).
#[derive(Clone)]
struct ProcDef {
    is_fn: bool,
    params: Vec<String>,
    line_no: u16,
    pos: usize,
}

/// What a single statement's execution did to the program counter.
enum Flow {
    /// Fall through to the next statement (same line, or the next line if
    /// none remain).
    Next,
    /// Jump directly to `(line, token index)`.
    Jump(u16, usize),
    EndProgram,
    /// `ENDPROC`/a bare `=expr` FN return: pops `Interpreter::call_stack`
    /// and carries the value an `FN` call produced (`Int32(0)` for `PROC`).
    Returned(Value),
}

enum DriveResult {
    Returned(Value),
    EndProgram,
}

/// Top-level orchestrator (spec.md §§3-7): owns every component and ties
/// them together through one statement-execution loop. Generic over the
/// collaborator backend so the same executor drives both a real terminal
/// and the in-memory test harness.
pub struct Interpreter<C: Collaborators> {
    pub program: Program,
    pub vars: VariableTable,
    pub vdu: VduState,
    pub fb: Framebuffer,
    pub mode7: Mode7Screen,
    pub mode7_active: bool,
    pub collab: C,
    data_cursor: DataCursor,
    for_stack: Vec<ForFrame>,
    repeat_stack: Vec<(u16, usize)>,
    while_stack: Vec<(u16, usize)>,
    gosub_stack: Vec<(u16, usize)>,
    call_stack: Vec<CallFrame>,
    error_stack: Vec<ErrorFrame>,
    procs: std::collections::HashMap<String, ProcDef>,
    defs_scanned: bool,
    current_line: u16,
    current_tokens: Vec<Token>,
    pos: usize,
    last_err: Option<BasicError>,
    last_erl: u16,
    trace: crate::trace::TraceOverlay,
    started_at: std::time::Instant,
}

impl<C: Collaborators> Interpreter<C> {
    pub fn new(collab: C) -> Self {
        Interpreter {
            program: Program::new(),
            vars: VariableTable::new(),
            vdu: VduState::new(80, 32),
            fb: Framebuffer::new(0),
            mode7: Mode7Screen::new(),
            mode7_active: false,
            collab,
            data_cursor: DataCursor::at_start(&Program::new()),
            for_stack: Vec::new(),
            repeat_stack: Vec::new(),
            while_stack: Vec::new(),
            gosub_stack: Vec::new(),
            call_stack: Vec::new(),
            error_stack: Vec::new(),
            procs: std::collections::HashMap::new(),
            defs_scanned: false,
            current_line: 0,
            current_tokens: Vec::new(),
            pos: 0,
            last_err: None,
            last_erl: 0,
            trace: crate::trace::TraceOverlay::new(),
            started_at: std::time::Instant::now(),
        }
    }

    /// Builds an interpreter whose variable-table workspace budget and
    /// initial screen mode come from `config` rather than the built-in
    /// defaults `new` uses.
    pub fn with_config(collab: C, config: &Configuration) -> Self {
        let mut interp = Self::new(collab);
        interp.vars = VariableTable::with_arena(Arena::new(config.arena_bytes));
        interp.fb = Framebuffer::new(config.initial_mode);
        interp.mode7_active = interp.fb.mode.teletext;
        interp.vdu.text = crate::vdu::TextPlane::new(interp.fb.mode.text_cols, interp.fb.mode.text_rows);
        interp.trace.set_enabled(config.trace);
        interp
    }

    /// Runs the whole program from its first line (spec.md §4.4's `RUN`).
    pub fn run(&mut self) -> Result<()> {
        if self.program.is_empty() {
            return Ok(());
        }
        if !self.defs_scanned {
            self.scan_defs();
            self.defs_scanned = true;
        }
        self.data_cursor = DataCursor::at_start(&self.program);
        self.current_line = self.program.first_line_no().unwrap();
        self.load_line(self.current_line);
        match self.drive() {
            Ok(DriveResult::EndProgram) => Ok(()),
            Ok(DriveResult::Returned(_)) => Err(BasicError::new(ErrorKind::NotProc, Some(self.current_line))),
            Err(e) => Err(e),
        }
    }

    /// Executes one line of immediate-mode input (no line number) without
    /// storing it in the program. A bare `GOTO`/`GOSUB`/`RUN` transfers into
    /// the stored program and runs it to completion via [`Self::drive`],
    /// mirroring how a real REPL prompt hands off to the stored listing.
    pub fn exec_direct(&mut self, source: &str) -> Result<()> {
        let tokenized = crate::token::tokenize(source)?;
        if !self.defs_scanned {
            self.scan_defs();
            self.defs_scanned = true;
        }
        self.current_line = 0;
        self.current_tokens = tokenized.tokens;
        self.pos = 0;
        loop {
            if self.pos >= self.current_tokens.len() {
                return Ok(());
            }
            match self.exec_statement() {
                Ok(Flow::Next) => {
                    if self.eat_op(Operator::Colon) {
                        continue;
                    }
                    if self.pos >= self.current_tokens.len() {
                        return Ok(());
                    }
                }
                Ok(Flow::Jump(line, pos)) => {
                    self.goto(line, pos)?;
                    match self.drive()? {
                        DriveResult::EndProgram => return Ok(()),
                        DriveResult::Returned(_) => return Err(BasicError::new(ErrorKind::NotProc, None)),
                    }
                }
                Ok(Flow::EndProgram) => return Ok(()),
                Ok(Flow::Returned(_)) => return Err(BasicError::new(ErrorKind::NotProc, None)),
                Err(e) => return Err(e),
            }
        }
    }

    // ---- program-counter plumbing ----------------------------------

    fn load_line(&mut self, line_no: u16) {
        self.current_tokens = self.program.get(line_no).map(|l| l.tokens.clone()).unwrap_or_default();
        self.pos = 0;
        self.trace.line(line_no);
    }

    fn advance_line(&mut self) -> Result<Option<u16>> {
        match self.program.next_line_no(self.current_line) {
            Some(next) => {
                self.current_line = next;
                self.load_line(next);
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    fn goto(&mut self, line: u16, pos: usize) -> Result<()> {
        if line != self.current_line || self.current_tokens.is_empty() {
            self.current_line = line;
            self.load_line(line);
        }
        self.pos = pos;
        Ok(())
    }

    fn peek_tok(&self) -> Option<Token> {
        self.current_tokens.get(self.pos).cloned()
    }

    fn bump_tok(&mut self) -> Option<Token> {
        let t = self.peek_tok();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_op(&mut self, op: Operator) -> bool {
        if matches!(self.peek_tok(), Some(Token::Operator(o)) if o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if matches!(self.peek_tok(), Some(Token::Keyword(k)) if k == kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: Operator) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(BasicError::new(ErrorKind::Syntax, Some(self.current_line)))
        }
    }

    fn expect_kw(&mut self, kw: Keyword) -> Result<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(BasicError::new(ErrorKind::Syntax, Some(self.current_line)))
        }
    }

    fn expect_assign_op(&mut self) -> Result<Operator> {
        match self.peek_tok() {
            Some(Token::Operator(op @ (Operator::Eq | Operator::AddAssign | Operator::SubAssign | Operator::MulAssign | Operator::DivAssign))) => {
                self.pos += 1;
                Ok(op)
            }
            _ => Err(BasicError::new(ErrorKind::Syntax, Some(self.current_line))),
        }
    }

    fn var_name_token(&mut self) -> Result<String> {
        match self.bump_tok() {
            Some(Token::XVar(n)) | Some(Token::Ident(n)) => Ok(n),
            _ => Err(BasicError::new(ErrorKind::Syntax, Some(self.current_line))),
        }
    }

    /// Evaluates one expression starting at the current position, advancing
    /// past it. Clones the remaining line so `Evaluator` never borrows
    /// `self` for its token slice while also borrowing it as the
    /// `ExprHost` (the two borrows would otherwise conflict).
    fn eval_expr_at(&mut self) -> Result<Value> {
        let tail: Vec<Token> = self.current_tokens[self.pos..].to_vec();
        let (value, consumed) = eval::eval_expr(self, &tail)?;
        self.pos += consumed;
        Ok(value)
    }

    fn eval_paren_args(&mut self) -> Result<Vec<Value>> {
        self.expect_op(Operator::LParen)?;
        let args = self.eval_comma_list_until_rparen()?;
        Ok(args)
    }

    fn eval_comma_list_until_rparen(&mut self) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        if !matches!(self.peek_tok(), Some(Token::Operator(Operator::RParen))) {
            loop {
                out.push(self.eval_expr_at()?);
                if self.eat_op(Operator::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect_op(Operator::RParen)?;
        Ok(out)
    }

    // ---- output ------------------------------------------------------

    /// Routes raw character output through the `VDU` state machine (so the
    /// text cursor and Mode 7 screen stay in sync with `PRINT`), forwarding
    /// the bytes it decides are printable to the collaborator's text sink.
    fn write_out(&mut self, bytes: &[u8]) -> Result<()> {
        let mut printable = Vec::new();
        for &b in bytes {
            self.vdu.feed(b, &mut self.fb, &mut self.mode7, self.mode7_active, |pb| printable.push(pb))?;
        }
        if !printable.is_empty() {
            self.collab.write_bytes(&printable)?;
        }
        Ok(())
    }

    pub(crate) fn feed_vdu(&mut self, byte: u8) -> Result<()> {
        self.write_out(&[byte])
    }

    /// `MOVE`/`DRAW`/`PLOT`/`LINE`/`RECTANGLE`/`CIRCLE`/`ELLIPSE`/`FILL` all
    /// reduce to a `VDU 25,k,x;y;` plot (spec.md §4.9), exactly as on real
    /// hardware, so every one of those statements is sugar built on top of
    /// this single helper.
    pub(crate) fn plot_raw(&mut self, k: u8, x: i32, y: i32) -> Result<()> {
        self.feed_vdu(25)?;
        self.feed_vdu(k)?;
        let xb = (x as i16).to_le_bytes();
        let yb = (y as i16).to_le_bytes();
        self.feed_vdu(xb[0])?;
        self.feed_vdu(xb[1])?;
        self.feed_vdu(yb[0])?;
        self.feed_vdu(yb[1])
    }

    fn read_line_from_keyboard(&mut self) -> Result<String> {
        let mut out = Vec::new();
        loop {
            let b = self.collab.get_char()?;
            if b == b'\r' || b == b'\n' {
                self.write_out(b"\r\n")?;
                break;
            }
            out.push(b);
            self.write_out(&[b])?;
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    // ---- DEF PROC/FN scanning ------------------------------------------

    /// Pre-scans the whole program for `DEF PROC`/`DEF FN` headers so
    /// `PROC`/`FN` calls resolve in O(1) instead of searching on every call
    /// (spec.md §4.6). Run once, lazily, before the first `run()`.
    fn scan_defs(&mut self) {
        let lines: Vec<(u16, Vec<Token>)> = self.program.iter().map(|(n, l)| (*n, l.tokens.clone())).collect();
        for (line_no, tokens) in &lines {
            let mut i = 0usize;
            while i < tokens.len() {
                if matches!(tokens[i], Token::Keyword(Keyword::Def)) {
                    if let Some(Token::XFnProcCall(name)) = tokens.get(i + 1).cloned() {
                        let is_fn = name.to_ascii_uppercase().starts_with("FN");
                        let mut j = i + 2;
                        let mut params = Vec::new();
                        if matches!(tokens.get(j), Some(Token::Operator(Operator::LParen))) {
                            j += 1;
                            loop {
                                match tokens.get(j) {
                                    Some(Token::XVar(n)) | Some(Token::Ident(n)) => {
                                        params.push(n.clone());
                                        j += 1;
                                        if matches!(tokens.get(j), Some(Token::Operator(Operator::Comma))) {
                                            j += 1;
                                            continue;
                                        }
                                        break;
                                    }
                                    _ => break,
                                }
                            }
                            if matches!(tokens.get(j), Some(Token::Operator(Operator::RParen))) {
                                j += 1;
                            }
                        }
                        self.procs.insert(name, ProcDef { is_fn, params, line_no: *line_no, pos: j });
                    }
                }
                i += 1;
            }
        }
    }

    // ---- statement dispatch -------------------------------------------

    fn drive(&mut self) -> Result<DriveResult> {
        loop {
            if self.pos >= self.current_tokens.len() || matches!(self.current_tokens.first(), Some(Token::Keyword(Keyword::Data))) {
                match self.advance_line()? {
                    Some(_) => continue,
                    None => return Ok(DriveResult::EndProgram),
                }
            }
            let outcome = self.exec_statement();
            match outcome {
                Ok(Flow::Next) => {
                    if self.eat_op(Operator::Colon) {
                        continue;
                    }
                    if self.pos >= self.current_tokens.len() {
                        match self.advance_line()? {
                            Some(_) => continue,
                            None => return Ok(DriveResult::EndProgram),
                        }
                    }
                }
                Ok(Flow::Jump(line, pos)) => self.goto(line, pos)?,
                Ok(Flow::EndProgram) => return Ok(DriveResult::EndProgram),
                Ok(Flow::Returned(v)) => return Ok(DriveResult::Returned(v)),
                Err(e) => {
                    let (line, pos) = self.handle_error(e)?;
                    self.goto(line, pos)?;
                }
            }
        }
    }

    fn handle_error(&mut self, err: BasicError) -> Result<(u16, usize)> {
        let Some(frame) = self.error_stack.last().cloned() else {
            return Err(err);
        };
        self.for_stack.truncate(frame.for_depth);
        self.repeat_stack.truncate(frame.repeat_depth);
        self.while_stack.truncate(frame.while_depth);
        self.gosub_stack.truncate(frame.gosub_depth);
        self.vars.unwind_to(frame.local_frame_depth);
        self.call_stack.truncate(frame.local_frame_depth);
        self.last_err = Some(err);
        self.last_erl = self.current_line;
        let target = self.program.resolve_target(frame.handler_line)?;
        let pos = self.program.get(target).map(|l| l.exec_offset).unwrap_or(0);
        Ok((target, pos))
    }

    fn exec_statement(&mut self) -> Result<Flow> {
        match self.peek_tok() {
            None => Ok(Flow::Next),
            Some(Token::Operator(Operator::Colon)) => Ok(Flow::Next),
            Some(Token::XVar(name)) => {
                self.pos += 1;
                self.exec_assignment(name)
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                self.exec_assignment(name)
            }
            Some(Token::StaticVar(idx)) => {
                self.pos += 1;
                self.exec_static_assignment(idx)
            }
            Some(Token::XFnProcCall(name)) => {
                self.pos += 1;
                self.exec_proc_statement(name)
            }
            Some(Token::Operator(Operator::Eq)) => self.exec_fn_return(),
            Some(Token::Keyword(kw)) => {
                self.pos += 1;
                self.exec_keyword(kw)
            }
            Some(_) => Err(BasicError::new(ErrorKind::Syntax, Some(self.current_line))),
        }
    }

    fn exec_fn_return(&mut self) -> Result<Flow> {
        self.pos += 1;
        let tail: Vec<Token> = self.current_tokens[self.pos..].to_vec();
        let (val, consumed) = eval::eval_expr(self, &tail)?;
        self.pos += consumed;
        let frame = self.call_stack.pop().ok_or(BasicError::new(ErrorKind::NotFn, Some(self.current_line)))?;
        self.vars.pop_frame()?;
        self.restore_call_frame(frame);
        Ok(Flow::Returned(val))
    }

    fn restore_call_frame(&mut self, frame: CallFrame) {
        self.current_line = frame.return_line;
        self.current_tokens = frame.saved_tokens;
        self.pos = frame.return_pos;
    }

    fn enter_proc(&mut self, name: &str, args: Vec<Value>) -> Result<()> {
        let def = self.procs.get(name).cloned().ok_or(BasicError::new(ErrorKind::NotProc, Some(self.current_line)))?;
        if args.len() != def.params.len() {
            return Err(BasicError::new(ErrorKind::BadCall, Some(self.current_line)));
        }
        self.vars.push_frame();
        for (pname, val) in def.params.iter().zip(args) {
            self.vars.declare_local(pname)?;
            self.vars.set(pname, val)?;
        }
        let saved = CallFrame { is_fn: def.is_fn, return_line: self.current_line, return_pos: self.pos, saved_tokens: self.current_tokens.clone() };
        self.call_stack.push(saved);
        self.current_line = def.line_no;
        self.load_line(def.line_no);
        self.pos = def.pos;
        Ok(())
    }

    fn exec_proc_statement(&mut self, name: String) -> Result<Flow> {
        let args = if matches!(self.peek_tok(), Some(Token::Operator(Operator::LParen))) {
            self.pos += 1;
            self.eval_comma_list_until_rparen()?
        } else {
            Vec::new()
        };
        self.enter_proc(&name, args)?;
        match self.drive()? {
            DriveResult::Returned(_) => Ok(Flow::Next),
            DriveResult::EndProgram => Ok(Flow::EndProgram),
        }
    }

    /// Called back from [`ExprHost::call_fn`]: runs an `FN`'s body
    /// synchronously to completion and returns its `=expr` result.
    fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        let is_fn = self.procs.get(name).map(|d| d.is_fn).unwrap_or(false);
        if !is_fn {
            return Err(BasicError::new(ErrorKind::NotFn, Some(self.current_line)));
        }
        self.enter_proc(name, args)?;
        match self.drive()? {
            DriveResult::Returned(v) => Ok(v),
            DriveResult::EndProgram => Err(BasicError::new(ErrorKind::NotFn, Some(self.current_line))),
        }
    }

    // ---- assignment -----------------------------------------------------

    fn exec_assignment(&mut self, name: String) -> Result<Flow> {
        if self.eat_op(Operator::LParen) {
            let indices = self.eval_index_list_for_assign()?;
            let op = self.expect_assign_op()?;
            let rhs = self.eval_expr_at()?;
            let value = match op {
                Operator::Eq => rhs,
                _ => {
                    let current = self.vars.array_get(&name, &indices)?;
                    Self::apply_compound(op, &current, &rhs)?
                }
            };
            self.vars.array_set(&name, &indices, value)?;
        } else {
            let op = self.expect_assign_op()?;
            let rhs = self.eval_expr_at()?;
            let value = match op {
                Operator::Eq => rhs,
                _ => {
                    let current = self.vars.get(&name)?;
                    Self::apply_compound(op, &current, &rhs)?
                }
            };
            self.vars.set(&name, value)?;
        }
        Ok(Flow::Next)
    }

    fn apply_compound(op: Operator, current: &Value, rhs: &Value) -> Result<Value> {
        match op {
            Operator::AddAssign => current.add(rhs),
            Operator::SubAssign => current.sub(rhs),
            Operator::MulAssign => current.mul(rhs),
            Operator::DivAssign => current.div(rhs),
            _ => Err(BasicError::new(ErrorKind::Syntax, None)),
        }
    }

    fn exec_static_assignment(&mut self, idx: u8) -> Result<Flow> {
        let op = self.expect_assign_op()?;
        let rhs = self.eval_expr_at()?.as_i64()? as i32;
        let value = match op {
            Operator::Eq => rhs,
            Operator::AddAssign => self.vars.get_static(idx) + rhs,
            Operator::SubAssign => self.vars.get_static(idx) - rhs,
            Operator::MulAssign => self.vars.get_static(idx) * rhs,
            Operator::DivAssign => self.vars.get_static(idx) / rhs.max(1),
            _ => unreachable!(),
        };
        self.vars.set_static(idx, value);
        Ok(Flow::Next)
    }

    fn eval_index_list_for_assign(&mut self) -> Result<Vec<u32>> {
        let mut out = Vec::new();
        loop {
            let v = self.eval_expr_at()?;
            out.push(v.as_i64()?.max(0) as u32);
            if self.eat_op(Operator::Comma) {
                continue;
            }
            break;
        }
        self.expect_op(Operator::RParen)?;
        Ok(out)
    }

    // ---- line-boundary scanning for WHILE/CASE/DEF skip-ahead ----------

    /// Every statement-start position from `(line, pos)` onward to the end
    /// of the program, paired with its first token. Used to find matching
    /// `ENDWHILE`/`ENDCASE`/`ENDPROC`/FN-return boundaries without a
    /// separate parse pass over the whole program up front.
    fn statement_starts_from(&self, line_no: u16, pos: usize) -> Vec<(u16, usize, Token)> {
        let mut out = Vec::new();
        let mut cur_line = Some(line_no);
        let mut cur_pos = pos;
        while let Some(ln) = cur_line {
            if let Some(line) = self.program.get(ln) {
                let toks = &line.tokens;
                let mut p = cur_pos;
                while p < toks.len() {
                    out.push((ln, p, toks[p].clone()));
                    while p < toks.len() && !matches!(toks[p], Token::Operator(Operator::Colon)) {
                        p += 1;
                    }
                    if p < toks.len() {
                        p += 1;
                    }
                }
            }
            cur_line = self.program.next_line_no(ln);
            cur_pos = 0;
        }
        out
    }

    fn find_matching(&self, open: Keyword, close: Keyword, line: u16, pos: usize) -> Result<(u16, usize)> {
        let entries = self.statement_starts_from(line, pos);
        let mut depth = 0i32;
        for idx in 0..entries.len() {
            let (ln, p, ref tok) = entries[idx];
            if matches!(tok, Token::Keyword(k) if *k == open) {
                depth += 1;
            } else if matches!(tok, Token::Keyword(k) if *k == close) {
                if depth == 0 {
                    return Ok((ln, p + 1));
                }
                depth -= 1;
            }
        }
        Err(BasicError::new(ErrorKind::Syntax, Some(self.current_line)))
    }

    fn find_keyword_forward(&self, target: Keyword, line: u16, pos: usize) -> Option<(u16, usize)> {
        for (ln, p, tok) in self.statement_starts_from(line, pos) {
            if matches!(tok, Token::Keyword(k) if k == target) {
                let next_pos = p + 1;
                if next_pos < self.program.get(ln).map(|l| l.tokens.len()).unwrap_or(0) {
                    return Some((ln, next_pos));
                }
                return self.program.next_line_no(ln).map(|n| (n, 0));
            }
        }
        None
    }

    fn find_fn_end(&self, line: u16, pos: usize) -> Option<(u16, usize)> {
        for (ln, p, tok) in self.statement_starts_from(line, pos) {
            if matches!(tok, Token::Operator(Operator::Eq)) {
                let _ = p;
                return self.program.next_line_no(ln).map(|n| (n, 0));
            }
        }
        None
    }

    fn find_else_same_line(&self) -> Option<usize> {
        let mut p = self.pos;
        while p < self.current_tokens.len() {
            if matches!(self.current_tokens[p], Token::Keyword(Keyword::Else)) {
                return Some(p + 1);
            }
            p += 1;
        }
        None
    }

    // ---- keyword statement dispatch -------------------------------------

    fn exec_keyword(&mut self, kw: Keyword) -> Result<Flow> {
        match kw {
            Keyword::Let => {
                match self.bump_tok() {
                    Some(Token::XVar(n)) | Some(Token::Ident(n)) => self.exec_assignment(n),
                    Some(Token::StaticVar(idx)) => self.exec_static_assignment(idx),
                    _ => Err(BasicError::new(ErrorKind::Syntax, Some(self.current_line))),
                }
            }
            Keyword::Print => self.exec_print(),
            Keyword::Input => self.exec_input(),
            Keyword::If => self.exec_if(),
            Keyword::Else => Ok(Flow::Jump(self.current_line, self.current_tokens.len())),
            Keyword::For => self.exec_for(),
            Keyword::Next => self.exec_next(),
            Keyword::Repeat => {
                self.repeat_stack.push((self.current_line, self.pos));
                Ok(Flow::Next)
            }
            Keyword::Until => self.exec_until(),
            Keyword::While => self.exec_while(),
            Keyword::Endwhile => {
                let (line, pos) = self.while_stack.pop().ok_or(BasicError::new(ErrorKind::NotWhile, Some(self.current_line)))?;
                Ok(Flow::Jump(line, pos))
            }
            Keyword::Goto => {
                let n = self.eval_expr_at()?.as_i64()? as u16;
                let target = self.program.resolve_target(n)?;
                let pos = self.program.get(target).map(|l| l.exec_offset).unwrap_or(0);
                Ok(Flow::Jump(target, pos))
            }
            Keyword::Gosub => {
                let n = self.eval_expr_at()?.as_i64()? as u16;
                let target = self.program.resolve_target(n)?;
                self.gosub_stack.push((self.current_line, self.pos));
                let pos = self.program.get(target).map(|l| l.exec_offset).unwrap_or(0);
                Ok(Flow::Jump(target, pos))
            }
            Keyword::Return => {
                let (line, pos) = self.gosub_stack.pop().ok_or(BasicError::new(ErrorKind::NotGosub, Some(self.current_line)))?;
                Ok(Flow::Jump(line, pos))
            }
            Keyword::On => self.exec_on(),
            Keyword::Resume => self.exec_resume(),
            Keyword::Case => self.exec_case(),
            Keyword::Endcase => Ok(Flow::Next),
            Keyword::Def => self.exec_def_fallthrough(),
            Keyword::Local => self.exec_local(),
            Keyword::Dim => self.exec_dim(),
            Keyword::Data => Ok(Flow::Jump(self.current_line, self.current_tokens.len())),
            Keyword::Read => self.exec_read(),
            Keyword::Restore => self.exec_restore(),
            Keyword::Endproc => {
                let frame = self.call_stack.pop().ok_or(BasicError::new(ErrorKind::NotProc, Some(self.current_line)))?;
                self.vars.pop_frame()?;
                self.restore_call_frame(frame);
                Ok(Flow::Returned(Value::Int32(0)))
            }
            Keyword::End | Keyword::Stop | Keyword::Quit => Ok(Flow::EndProgram),
            Keyword::New => {
                self.program.clear();
                self.vars.clear();
                self.procs.clear();
                self.defs_scanned = false;
                Ok(Flow::EndProgram)
            }
            Keyword::Run => {
                self.vars.clear();
                let first = self.program.first_line_no().ok_or(BasicError::new(ErrorKind::BadLineNum, Some(self.current_line)))?;
                let pos = self.program.get(first).map(|l| l.exec_offset).unwrap_or(0);
                Ok(Flow::Jump(first, pos))
            }
            Keyword::Clear => {
                self.vars.clear();
                Ok(Flow::Next)
            }
            Keyword::List => {
                let text = self.program.list();
                self.write_out(text.as_bytes())?;
                Ok(Flow::Next)
            }
            Keyword::Trace => {
                if self.eat_kw(Keyword::Off) {
                    self.trace.set_enabled(false);
                } else {
                    self.eat_kw(Keyword::On);
                    self.trace.set_enabled(true);
                }
                Ok(Flow::Next)
            }
            Keyword::Vdu => self.exec_vdu(),
            Keyword::Mode => {
                let n = self.eval_expr_at()?.as_i64()? as u8;
                tracing::debug!(mode = n, "MODE switch");
                self.fb.switch_mode(n);
                self.mode7_active = self.fb.mode.teletext;
                if self.mode7_active {
                    self.mode7.cls();
                }
                self.vdu.text = crate::vdu::TextPlane::new(self.fb.mode.text_cols, self.fb.mode.text_rows);
                Ok(Flow::Next)
            }
            Keyword::Cls => {
                if self.mode7_active {
                    self.mode7.cls();
                } else {
                    let bg = self.fb.palette.resolve(self.vdu.bg_logical);
                    self.fb.clear(bg);
                }
                self.vdu.text.col = 0;
                self.vdu.text.row = 0;
                Ok(Flow::Next)
            }
            Keyword::Clg => {
                let bg = self.fb.palette.resolve(self.vdu.bg_logical);
                self.fb.clear(bg);
                Ok(Flow::Next)
            }
            Keyword::Colour => self.exec_colour(),
            Keyword::Gcol => self.exec_gcol(),
            Keyword::Move => {
                let x = self.eval_expr_at()?.as_i64()? as i32;
                self.expect_op(Operator::Comma)?;
                let y = self.eval_expr_at()?.as_i64()? as i32;
                self.plot_raw(4, x, y)?;
                Ok(Flow::Next)
            }
            Keyword::Draw => {
                let x = self.eval_expr_at()?.as_i64()? as i32;
                self.expect_op(Operator::Comma)?;
                let y = self.eval_expr_at()?.as_i64()? as i32;
                self.plot_raw(8, x, y)?;
                Ok(Flow::Next)
            }
            Keyword::Plot => {
                let k = self.eval_expr_at()?.as_i64()? as u8;
                self.expect_op(Operator::Comma)?;
                let x = self.eval_expr_at()?.as_i64()? as i32;
                self.expect_op(Operator::Comma)?;
                let y = self.eval_expr_at()?.as_i64()? as i32;
                self.plot_raw(k, x, y)?;
                Ok(Flow::Next)
            }
            Keyword::Origin => {
                let x = self.eval_expr_at()?.as_i64()? as i32;
                self.expect_op(Operator::Comma)?;
                let y = self.eval_expr_at()?.as_i64()? as i32;
                self.vdu.origin = (x, y);
                Ok(Flow::Next)
            }
            Keyword::Tint => {
                let t = self.eval_expr_at()?.as_i64()? as u8;
                let logical = self.vdu.fg_logical;
                self.fb.palette.set_tint(logical as u32, t);
                Ok(Flow::Next)
            }
            Keyword::Palette => self.exec_palette(),
            Keyword::Rectangle => self.exec_rectangle(),
            Keyword::Circle => self.exec_circle(),
            Keyword::Ellipse => self.exec_ellipse(),
            Keyword::Fill => {
                let x = self.eval_expr_at()?.as_i64()? as i32;
                self.expect_op(Operator::Comma)?;
                let y = self.eval_expr_at()?.as_i64()? as i32;
                self.plot_raw(128, x, y)?;
                Ok(Flow::Next)
            }
            Keyword::Line => self.exec_line(),
            Keyword::Width => {
                let _ = self.eval_expr_at()?;
                Ok(Flow::Next)
            }
            Keyword::Sound | Keyword::Envelope => {
                self.skip_comma_expr_list()?;
                Ok(Flow::Next)
            }
            Keyword::Oscli => self.exec_oscli(),
            Keyword::Call => {
                let _ = self.eval_expr_at()?;
                Err(BasicError::new(ErrorKind::Unsupported, Some(self.current_line)))
            }
            Keyword::Bput => self.exec_bput(),
            Keyword::Close => {
                let ch = self.eval_expr_at()?.as_i64()? as i32;
                self.collab.close(ch)?;
                Ok(Flow::Next)
            }
            Keyword::Ptr => self.exec_ptr(),
            Keyword::Private | Keyword::Library | Keyword::Install => Ok(Flow::Next),
            _ => Err(BasicError::new(ErrorKind::Syntax, Some(self.current_line))),
        }
    }

    fn skip_comma_expr_list(&mut self) -> Result<()> {
        loop {
            self.eval_expr_at()?;
            if self.eat_op(Operator::Comma) {
                continue;
            }
            break;
        }
        Ok(())
    }

    // ---- PRINT/INPUT ------------------------------------------------

    fn exec_print(&mut self) -> Result<Flow> {
        let mut suppress_newline = false;
        loop {
            match self.peek_tok() {
                None | Some(Token::Operator(Operator::Colon)) | Some(Token::Keyword(Keyword::Else)) => {
                    break;
                }
                Some(Token::Operator(Operator::Semicolon)) => {
                    self.pos += 1;
                    suppress_newline = true;
                }
                Some(Token::Operator(Operator::Comma)) => {
                    self.pos += 1;
                    self.write_out(b"\t")?;
                    suppress_newline = true;
                }
                Some(Token::Keyword(Keyword::Tab)) => {
                    self.pos += 1;
                    let args = self.eval_paren_args()?;
                    let col = args.first().map(|v| v.as_i64()).transpose()?.unwrap_or(0).max(0) as u32;
                    if self.vdu.text.col < col {
                        let pad = col - self.vdu.text.col;
                        self.write_out(&vec![b' '; pad as usize])?;
                    }
                    suppress_newline = true;
                }
                Some(Token::Keyword(Keyword::Spc)) => {
                    self.pos += 1;
                    let args = self.eval_paren_args()?;
                    let n = args.first().map(|v| v.as_i64()).transpose()?.unwrap_or(0).max(0) as usize;
                    self.write_out(&vec![b' '; n])?;
                    suppress_newline = true;
                }
                _ => {
                    let v = self.eval_expr_at()?;
                    self.write_out(v.to_string().as_bytes())?;
                    suppress_newline = false;
                }
            }
        }
        if !suppress_newline {
            self.write_out(b"\r\n")?;
        }
        Ok(Flow::Next)
    }

    fn exec_input(&mut self) -> Result<Flow> {
        loop {
            match self.peek_tok() {
                Some(Token::StringLiteral(bytes)) => {
                    self.pos += 1;
                    self.write_out(&bytes)?;
                    self.eat_op(Operator::Semicolon);
                    self.eat_op(Operator::Comma);
                }
                Some(Token::XVar(name)) | Some(Token::Ident(name)) => {
                    self.pos += 1;
                    let line = self.read_line_from_keyboard()?;
                    let value = if name.ends_with('$') {
                        Value::Str(line.into_bytes())
                    } else {
                        Value::Float64(line.trim().parse().unwrap_or(0.0))
                    };
                    self.vars.set(&name, value)?;
                    if !self.eat_op(Operator::Comma) {
                        break;
                    }
                }
                _ => break,
            }
        }
        Ok(Flow::Next)
    }

    // ---- control flow -------------------------------------------------

    fn exec_if(&mut self) -> Result<Flow> {
        let cond = self.eval_expr_at()?;
        self.eat_kw(Keyword::Then);
        if cond.truthy()? {
            if let Some(Token::IntLiteral(n, _)) = self.peek_tok() {
                let is_last_on_line = matches!(self.current_tokens.get(self.pos + 1), None | Some(Token::Operator(Operator::Colon)));
                if is_last_on_line {
                    self.pos += 1;
                    let target = self.program.resolve_target(n as u16)?;
                    let pos = self.program.get(target).map(|l| l.exec_offset).unwrap_or(0);
                    return Ok(Flow::Jump(target, pos));
                }
            }
            Ok(Flow::Next)
        } else {
            match self.find_else_same_line() {
                Some(pos) => Ok(Flow::Jump(self.current_line, pos)),
                None => Ok(Flow::Jump(self.current_line, self.current_tokens.len())),
            }
        }
    }

    fn exec_for(&mut self) -> Result<Flow> {
        let name = self.var_name_token()?;
        self.expect_op(Operator::Eq)?;
        let start = self.eval_expr_at()?;
        self.vars.set(&name, start)?;
        self.expect_kw(Keyword::To)?;
        let limit = self.eval_expr_at()?;
        let step = if self.eat_kw(Keyword::Step) { self.eval_expr_at()? } else { Value::Int32(1) };
        self.for_stack.push(ForFrame { var: name, limit, step, line: self.current_line, pos: self.pos });
        Ok(Flow::Next)
    }

    fn exec_next(&mut self) -> Result<Flow> {
        let mut names = Vec::new();
        loop {
            match self.peek_tok() {
                Some(Token::XVar(n)) | Some(Token::Ident(n)) => {
                    self.pos += 1;
                    names.push(n);
                    if self.eat_op(Operator::Comma) {
                        continue;
                    }
                }
                _ => {}
            }
            break;
        }
        if names.is_empty() {
            self.exec_next_one()
        } else {
            let mut last = Flow::Next;
            for _ in names {
                last = self.exec_next_one()?;
                if matches!(last, Flow::Jump(..)) {
                    break;
                }
            }
            Ok(last)
        }
    }

    fn exec_next_one(&mut self) -> Result<Flow> {
        let frame = self.for_stack.last().cloned().ok_or(BasicError::new(ErrorKind::NotFor, Some(self.current_line)))?;
        let current = self.vars.get(&frame.var)?;
        let stepped = current.add(&frame.step)?;
        self.vars.set(&frame.var, stepped.clone())?;
        let step_positive = frame.step.as_f64()? >= 0.0;
        let keep_going =
            if step_positive { stepped.as_f64()? <= frame.limit.as_f64()? } else { stepped.as_f64()? >= frame.limit.as_f64()? };
        if keep_going {
            Ok(Flow::Jump(frame.line, frame.pos))
        } else {
            self.for_stack.pop();
            Ok(Flow::Next)
        }
    }

    fn exec_until(&mut self) -> Result<Flow> {
        let cond = self.eval_expr_at()?;
        let (line, pos) = self.repeat_stack.last().copied().ok_or(BasicError::new(ErrorKind::NotRepeat, Some(self.current_line)))?;
        if cond.truthy()? {
            self.repeat_stack.pop();
            Ok(Flow::Next)
        } else {
            Ok(Flow::Jump(line, pos))
        }
    }

    fn exec_while(&mut self) -> Result<Flow> {
        let cond_start = (self.current_line, self.pos);
        let cond = self.eval_expr_at()?;
        if cond.truthy()? {
            self.while_stack.push(cond_start);
            Ok(Flow::Next)
        } else {
            let (line, pos) = self.find_matching(Keyword::While, Keyword::Endwhile, self.current_line, self.pos)?;
            Ok(Flow::Jump(line, pos))
        }
    }

    fn exec_on(&mut self) -> Result<Flow> {
        if self.eat_kw(Keyword::Error) {
            self.exec_on_error()
        } else {
            self.exec_on_goto_gosub()
        }
    }

    fn exec_on_error(&mut self) -> Result<Flow> {
        if self.eat_kw(Keyword::Off) {
            self.error_stack.pop();
            return Ok(Flow::Next);
        }
        let local = self.eat_kw(Keyword::Local);
        self.eat_kw(Keyword::Goto);
        let target = self.eval_expr_at()?.as_i64()? as u16;
        let handler_line = self.program.resolve_target(target)?;
        self.error_stack.push(ErrorFrame {
            handler_line,
            local,
            for_depth: self.for_stack.len(),
            repeat_depth: self.repeat_stack.len(),
            while_depth: self.while_stack.len(),
            gosub_depth: self.gosub_stack.len(),
            local_frame_depth: self.vars.frame_depth(),
        });
        Ok(Flow::Next)
    }

    fn exec_on_goto_gosub(&mut self) -> Result<Flow> {
        let selector = self.eval_expr_at()?.as_i64()?;
        let is_gosub = if self.eat_kw(Keyword::Gosub) {
            true
        } else {
            self.eat_kw(Keyword::Goto);
            false
        };
        let mut targets = Vec::new();
        loop {
            let n = self.eval_expr_at()?.as_i64()? as u16;
            targets.push(n);
            if self.eat_op(Operator::Comma) {
                continue;
            }
            break;
        }
        if selector >= 1 && (selector as usize) <= targets.len() {
            let target = self.program.resolve_target(targets[(selector - 1) as usize])?;
            if is_gosub {
                self.gosub_stack.push((self.current_line, self.pos));
            }
            let pos = self.program.get(target).map(|l| l.exec_offset).unwrap_or(0);
            Ok(Flow::Jump(target, pos))
        } else {
            Ok(Flow::Next)
        }
    }

    fn exec_resume(&mut self) -> Result<Flow> {
        if self.error_stack.is_empty() && self.last_err.is_none() {
            return Err(BasicError::new(ErrorKind::BadCall, Some(self.current_line)));
        }
        if self.eat_kw(Keyword::Next) {
            let next = self.program.next_line_no(self.last_erl).ok_or(BasicError::new(ErrorKind::BadLineNum, Some(self.current_line)))?;
            let pos = self.program.get(next).map(|l| l.exec_offset).unwrap_or(0);
            Ok(Flow::Jump(next, pos))
        } else if let Some(Token::IntLiteral(n, _)) = self.peek_tok() {
            self.pos += 1;
            let target = self.program.resolve_target(n as u16)?;
            let pos = self.program.get(target).map(|l| l.exec_offset).unwrap_or(0);
            Ok(Flow::Jump(target, pos))
        } else {
            let target = self.last_erl;
            let pos = self.program.get(target).map(|l| l.exec_offset).unwrap_or(0);
            Ok(Flow::Jump(target, pos))
        }
    }

    // ---- CASE ... OF WHEN ... OTHERWISE ... ENDCASE --------------------

    fn exec_case(&mut self) -> Result<Flow> {
        let selector = self.eval_expr_at()?;
        self.expect_kw(Keyword::Of)?;
        let entries = self.statement_starts_from(self.current_line, self.pos);
        let mut depth = 0i32;
        let mut idx = 0usize;
        while idx < entries.len() {
            let (ln, p, ref tok) = entries[idx];
            match tok {
                Token::Keyword(Keyword::Case) => depth += 1,
                Token::Keyword(Keyword::Endcase) if depth == 0 => {
                    let next_pos = p + 1;
                    if next_pos < self.program.get(ln).map(|l| l.tokens.len()).unwrap_or(0) {
                        return Ok(Flow::Jump(ln, next_pos));
                    }
                    return match self.program.next_line_no(ln) {
                        Some(n) => Ok(Flow::Jump(n, 0)),
                        None => Ok(Flow::EndProgram),
                    };
                }
                Token::Keyword(Keyword::Endcase) => depth -= 1,
                Token::Keyword(Keyword::When) if depth == 0 => {
                    let values_end = if idx + 1 < entries.len() { Some(entries[idx + 1].0) } else { None };
                    let values = self.collect_tokens_between(ln, p + 1, idx, &entries);
                    let _ = values_end;
                    let matched = self.when_values_match(&values, &selector)?;
                    if matched {
                        let (body_line, body_pos) = if idx + 1 < entries.len() {
                            (entries[idx + 1].0, entries[idx + 1].1)
                        } else {
                            return Ok(Flow::EndProgram);
                        };
                        return Ok(Flow::Jump(body_line, body_pos));
                    }
                }
                Token::Keyword(Keyword::Otherwise) if depth == 0 => {
                    let (body_line, body_pos) = if idx + 1 < entries.len() {
                        (entries[idx + 1].0, entries[idx + 1].1)
                    } else {
                        return Ok(Flow::EndProgram);
                    };
                    return Ok(Flow::Jump(body_line, body_pos));
                }
                _ => {}
            }
            idx += 1;
        }
        Err(BasicError::new(ErrorKind::Syntax, Some(self.current_line)))
    }

    /// The raw tokens of a `WHEN`/`OTHERWISE` clause's value list: from just
    /// after its keyword up to (but not including) the next statement
    /// boundary `statement_starts_from` already found.
    fn collect_tokens_between(&self, start_line: u16, start_pos: usize, entry_idx: usize, entries: &[(u16, usize, Token)]) -> Vec<Token> {
        let Some(&(end_line, end_pos, _)) = entries.get(entry_idx + 1) else {
            return self.program.get(start_line).map(|l| l.tokens[start_pos..].to_vec()).unwrap_or_default();
        };
        if end_line == start_line {
            let toks = self.program.get(start_line).map(|l| l.tokens.clone()).unwrap_or_default();
            let stop = end_pos.saturating_sub(1).max(start_pos);
            toks.get(start_pos..stop).map(|s| s.to_vec()).unwrap_or_default()
        } else {
            self.program.get(start_line).map(|l| l.tokens[start_pos..].to_vec()).unwrap_or_default()
        }
    }

    fn when_values_match(&mut self, tokens: &[Token], selector: &Value) -> Result<bool> {
        if tokens.is_empty() {
            return Ok(false);
        }
        let mut rest = tokens;
        loop {
            let comma_at = rest.iter().position(|t| matches!(t, Token::Operator(Operator::Comma)));
            let (chunk, remainder) = match comma_at {
                Some(i) => (&rest[..i], &rest[i + 1..]),
                None => (rest, &[][..]),
            };
            if !chunk.is_empty() {
                let (value, _) = eval::eval_expr(self, chunk)?;
                if value.compare(selector, crate::value::CompareOp::Eq)?.truthy()? {
                    return Ok(true);
                }
            }
            if remainder.is_empty() {
                break;
            }
            rest = remainder;
        }
        Ok(false)
    }

    // ---- DEF/LOCAL/DIM/DATA -------------------------------------------

    fn exec_def_fallthrough(&mut self) -> Result<Flow> {
        let name = match self.peek_tok() {
            Some(Token::XFnProcCall(n)) => n,
            _ => return Err(BasicError::new(ErrorKind::Syntax, Some(self.current_line))),
        };
        let is_fn = name.to_ascii_uppercase().starts_with("FN");
        let target = if is_fn {
            self.find_fn_end(self.current_line, self.pos)
        } else {
            self.find_keyword_forward(Keyword::Endproc, self.current_line, self.pos)
        };
        match target {
            Some((line, pos)) => Ok(Flow::Jump(line, pos)),
            None => Ok(Flow::EndProgram),
        }
    }

    fn exec_local(&mut self) -> Result<Flow> {
        loop {
            match self.peek_tok() {
                Some(Token::XVar(name)) | Some(Token::Ident(name)) => {
                    self.pos += 1;
                    self.vars.declare_local(&name)?;
                    if self.eat_op(Operator::Comma) {
                        continue;
                    }
                }
                _ => {}
            }
            break;
        }
        Ok(Flow::Next)
    }

    fn exec_dim(&mut self) -> Result<Flow> {
        loop {
            let name = self.var_name_token()?;
            self.expect_op(Operator::LParen)?;
            let mut dims = Vec::new();
            loop {
                let v = self.eval_expr_at()?;
                dims.push(v.as_i64()?.max(0) as u32);
                if self.eat_op(Operator::Comma) {
                    continue;
                }
                break;
            }
            self.expect_op(Operator::RParen)?;
            let fill = Value::default_for_suffix(&name);
            self.vars.dim(&name, dims, fill)?;
            if !self.eat_op(Operator::Comma) {
                break;
            }
        }
        Ok(Flow::Next)
    }

    fn exec_read(&mut self) -> Result<Flow> {
        loop {
            match self.peek_tok() {
                Some(Token::XVar(name)) | Some(Token::Ident(name)) => {
                    self.pos += 1;
                    let item = self.data_cursor.next_item(&self.program).ok_or(BasicError::new(ErrorKind::Unsupported, Some(self.current_line)))?;
                    let value = if name.ends_with('$') {
                        Value::Str(item.into_bytes())
                    } else {
                        Value::Float64(item.trim().parse().unwrap_or(0.0))
                    };
                    self.vars.set(&name, value)?;
                    if self.eat_op(Operator::Comma) {
                        continue;
                    }
                }
                _ => {}
            }
            break;
        }
        Ok(Flow::Next)
    }

    fn exec_restore(&mut self) -> Result<Flow> {
        if let Some(Token::IntLiteral(n, _)) = self.peek_tok() {
            self.pos += 1;
            self.data_cursor.restore(n as u16);
        } else {
            self.data_cursor = DataCursor::at_start(&self.program);
        }
        Ok(Flow::Next)
    }

    // ---- graphics/VDU statements ----------------------------------------

    fn exec_vdu(&mut self) -> Result<Flow> {
        loop {
            let v = self.eval_expr_at()?;
            if self.eat_op(Operator::Semicolon) {
                let n = v.as_i64()? as u16;
                let bytes = n.to_le_bytes();
                self.feed_vdu(bytes[0])?;
                self.feed_vdu(bytes[1])?;
            } else {
                self.feed_vdu(v.as_i64()? as u8)?;
            }
            if self.eat_op(Operator::Comma) {
                continue;
            }
            break;
        }
        Ok(Flow::Next)
    }

    fn exec_colour(&mut self) -> Result<Flow> {
        let n = self.eval_expr_at()?.as_i64()? as i32;
        if self.eat_op(Operator::Comma) {
            let r = self.eval_expr_at()?.as_i64()? as u8;
            self.expect_op(Operator::Comma)?;
            let g = self.eval_expr_at()?.as_i64()? as u8;
            self.expect_op(Operator::Comma)?;
            let b = self.eval_expr_at()?.as_i64()? as u8;
            self.fb.palette.set_entry(n as u32, Rgb(r, g, b));
        } else if n < 0 {
            self.vdu.text_bg = (-n - 1) % self.fb.palette.depth().logical_colours() as i32;
        } else {
            self.vdu.text_fg = n % self.fb.palette.depth().logical_colours() as i32;
        }
        Ok(Flow::Next)
    }

    fn exec_gcol(&mut self) -> Result<Flow> {
        let first = self.eval_expr_at()?.as_i64()?;
        if self.eat_op(Operator::Comma) {
            self.vdu.gcol_action = PlotAction::from_code(first as u8);
            let colour = self.eval_expr_at()?.as_i64()? as i32;
            self.vdu.fg_logical = colour;
        } else {
            self.vdu.fg_logical = first as i32;
        }
        Ok(Flow::Next)
    }

    fn exec_palette(&mut self) -> Result<Flow> {
        let l = self.eval_expr_at()?.as_i64()? as u32;
        self.expect_op(Operator::Comma)?;
        let p = self.eval_expr_at()?.as_i64()?;
        let rgb = if self.eat_op(Operator::Comma) {
            let g = self.eval_expr_at()?.as_i64()? as u8;
            self.expect_op(Operator::Comma)?;
            let b = self.eval_expr_at()?.as_i64()? as u8;
            Rgb(p as u8, g, b)
        } else {
            Rgb((p & 0xFF) as u8, ((p >> 8) & 0xFF) as u8, ((p >> 16) & 0xFF) as u8)
        };
        self.fb.palette.set_entry(l, rgb);
        Ok(Flow::Next)
    }

    fn exec_rectangle(&mut self) -> Result<Flow> {
        let x1 = self.eval_expr_at()?.as_i64()? as i32;
        self.expect_op(Operator::Comma)?;
        let y1 = self.eval_expr_at()?.as_i64()? as i32;
        self.expect_op(Operator::Comma)?;
        let x2 = self.eval_expr_at()?.as_i64()? as i32;
        self.expect_op(Operator::Comma)?;
        let y2 = self.eval_expr_at()?.as_i64()? as i32;
        let fill = self.eat_kw(Keyword::Fill);
        self.plot_raw(4, x1, y1)?;
        if fill {
            self.plot_raw(88, x2, y2)?;
        } else {
            self.plot_raw(8, x2, y1)?;
            self.plot_raw(8, x2, y2)?;
            self.plot_raw(8, x1, y2)?;
            self.plot_raw(8, x1, y1)?;
        }
        Ok(Flow::Next)
    }

    fn exec_circle(&mut self) -> Result<Flow> {
        let x = self.eval_expr_at()?.as_i64()? as i32;
        self.expect_op(Operator::Comma)?;
        let y = self.eval_expr_at()?.as_i64()? as i32;
        self.expect_op(Operator::Comma)?;
        let r = self.eval_expr_at()?.as_i64()? as i32;
        let fill = self.eat_kw(Keyword::Fill);
        self.plot_raw(4, x, y)?;
        self.plot_raw(if fill { 200 } else { 192 }, x + r, y)?;
        Ok(Flow::Next)
    }

    fn exec_ellipse(&mut self) -> Result<Flow> {
        let x = self.eval_expr_at()?.as_i64()? as i32;
        self.expect_op(Operator::Comma)?;
        let y = self.eval_expr_at()?.as_i64()? as i32;
        self.expect_op(Operator::Comma)?;
        let major = self.eval_expr_at()?.as_i64()? as i32;
        self.expect_op(Operator::Comma)?;
        let minor = self.eval_expr_at()?.as_i64()? as i32;
        let fill = self.eat_kw(Keyword::Fill);
        self.plot_raw(4, x, y)?;
        self.plot_raw(if fill { 232 } else { 224 }, x + major, y + minor)?;
        Ok(Flow::Next)
    }

    fn exec_line(&mut self) -> Result<Flow> {
        let x1 = self.eval_expr_at()?.as_i64()? as i32;
        self.expect_op(Operator::Comma)?;
        let y1 = self.eval_expr_at()?.as_i64()? as i32;
        self.expect_op(Operator::Comma)?;
        let x2 = self.eval_expr_at()?.as_i64()? as i32;
        self.expect_op(Operator::Comma)?;
        let y2 = self.eval_expr_at()?.as_i64()? as i32;
        self.plot_raw(4, x1, y1)?;
        self.plot_raw(8, x2, y2)?;
        Ok(Flow::Next)
    }

    // ---- OSCLI/file I/O --------------------------------------------------

    fn exec_oscli(&mut self) -> Result<Flow> {
        let v = self.eval_expr_at()?;
        let text = String::from_utf8_lossy(v.as_bytes()?).into_owned();
        let (cmd, rest) = text.trim().split_once(' ').unwrap_or((text.trim(), ""));
        tracing::trace!(cmd, rest, "star-command dispatch");
        if cmd.eq_ignore_ascii_case("SWI") {
            crate::swi::dispatch(rest, self)?;
        } else {
            self.collab.dispatch(cmd, rest)?;
        }
        Ok(Flow::Next)
    }

    fn exec_bput(&mut self) -> Result<Flow> {
        let ch = self.eval_expr_at()?.as_i64()? as i32;
        self.expect_op(Operator::Comma)?;
        let v = self.eval_expr_at()?;
        match v {
            Value::Str(bytes) => {
                for b in bytes {
                    self.collab.bput(ch, b)?;
                }
            }
            other => self.collab.bput(ch, other.as_i64()? as u8)?,
        }
        Ok(Flow::Next)
    }

    fn exec_ptr(&mut self) -> Result<Flow> {
        let ch = self.eval_expr_at()?.as_i64()? as i32;
        if self.eat_op(Operator::Eq) || self.eat_op(Operator::Comma) {
            let pos = self.eval_expr_at()?.as_i64()? as u32;
            self.collab.set_ptr(ch, pos)?;
        }
        Ok(Flow::Next)
    }
}

impl<C: Collaborators> ExprHost for Interpreter<C> {
    fn vars(&mut self) -> &mut VariableTable {
        &mut self.vars
    }

    fn call_fn(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.call_function(name, args)
    }

    fn point(&mut self, x: i32, y: i32) -> Result<Value> {
        Ok(Value::Int32(self.vdu.point_read(&self.fb, x, y)))
    }

    fn inkey(&mut self, arg: i32) -> Result<Value> {
        match self.collab.inkey(arg)? {
            Some(b) => Ok(Value::Int32(b as i32)),
            None => Ok(Value::Int32(-1)),
        }
    }

    fn get_char(&mut self) -> Result<Value> {
        Ok(Value::Int32(self.collab.get_char()? as i32))
    }

    fn eof(&mut self, channel: i32) -> Result<Value> {
        Ok(Value::Int32(if self.collab.eof(channel)? { -1 } else { 0 }))
    }

    fn time(&mut self) -> Result<Value> {
        Ok(Value::Int32((self.started_at.elapsed().as_millis() / 10) as i32))
    }

    fn pos(&mut self) -> Result<Value> {
        Ok(Value::Int32(self.vdu.text.col as i32))
    }

    fn vpos(&mut self) -> Result<Value> {
        Ok(Value::Int32(self.vdu.text.row as i32))
    }

    fn usr(&mut self, _address: i64) -> Result<Value> {
        Err(BasicError::new(ErrorKind::Unsupported, Some(self.current_line)))
    }

    fn adval(&mut self, _channel: i32) -> Result<Value> {
        Ok(Value::Int32(0))
    }

    fn err(&mut self) -> Result<Value> {
        Ok(Value::Int32(self.last_err.as_ref().map(|e| e.code()).unwrap_or(0)))
    }

    fn erl(&mut self) -> Result<Value> {
        Ok(Value::Int32(self.last_erl as i32))
    }

    fn report(&mut self) -> Result<Value> {
        Ok(Value::Str(self.last_err.as_ref().map(|e| e.kind.to_string()).unwrap_or_default().into_bytes()))
    }

    fn open_in(&mut self, path: &[u8]) -> Result<Value> {
        let path = String::from_utf8_lossy(path).into_owned();
        Ok(Value::Int32(self.collab.open_in(&path)?))
    }

    fn open_out(&mut self, path: &[u8]) -> Result<Value> {
        let path = String::from_utf8_lossy(path).into_owned();
        Ok(Value::Int32(self.collab.open_out(&path)?))
    }

    fn open_up(&mut self, path: &[u8]) -> Result<Value> {
        let path = String::from_utf8_lossy(path).into_owned();
        Ok(Value::Int32(self.collab.open_up(&path)?))
    }

    fn bget(&mut self, channel: i32) -> Result<Value> {
        Ok(Value::Int32(self.collab.bget(channel)? as i32))
    }

    fn ptr(&mut self, channel: i32) -> Result<Value> {
        Ok(Value::Int32(self.collab.ptr(channel)? as i32))
    }

    fn ext(&mut self, channel: i32) -> Result<Value> {
        Ok(Value::Int32(self.collab.ext(channel)? as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::TestCollaborators;

    fn run_source(src: &[&str]) -> Interpreter<TestCollaborators> {
        let mut interp = Interpreter::new(TestCollaborators::new());
        for line in src {
            interp.program.enter(line).unwrap();
        }
        interp.run().unwrap();
        interp
    }

    #[test]
    fn print_writes_a_trailing_newline() {
        let interp = run_source(&["10 PRINT \"HI\""]);
        assert_eq!(interp.collab.output, b"HI\r\n");
    }

    #[test]
    fn for_next_loop_accumulates() {
        let interp = run_source(&["10 S=0", "20 FOR I=1 TO 5", "30 S=S+I", "40 NEXT", "50 PRINT S"]);
        assert_eq!(interp.collab.output, b"15\r\n");
    }

    #[test]
    fn if_else_single_line_takes_the_right_branch() {
        let interp = run_source(&["10 X=2", "20 IF X=1 THEN PRINT \"ONE\" ELSE PRINT \"OTHER\""]);
        assert_eq!(interp.collab.output, b"OTHER\r\n");
    }

    #[test]
    fn repeat_until_loop_runs_at_least_once() {
        let interp = run_source(&["10 N=0", "20 REPEAT", "30 N=N+1", "40 UNTIL N>=3", "50 PRINT N"]);
        assert_eq!(interp.collab.output, b"3\r\n");
    }

    #[test]
    fn proc_call_with_locals_round_trips_a_value() {
        let interp = run_source(&["10 PROCdouble(21)", "20 END", "30 DEF PROCdouble(N)", "40 PRINT N*2", "50 ENDPROC"]);
        assert_eq!(interp.collab.output, b"42\r\n");
    }

    #[test]
    fn fn_call_returns_a_value_used_in_an_expression() {
        let interp = run_source(&["10 PRINT FNsquare(6)", "20 END", "30 DEF FNsquare(N)", "40 =N*N"]);
        assert_eq!(interp.collab.output, b"36\r\n");
    }

    #[test]
    fn goto_jumps_past_intervening_lines() {
        let interp = run_source(&["10 GOTO 30", "20 PRINT \"SKIPPED\"", "30 PRINT \"HERE\""]);
        assert_eq!(interp.collab.output, b"HERE\r\n");
    }

    #[test]
    fn divide_by_zero_is_trapped_by_on_error() {
        let interp = run_source(&["10 ON ERROR GOTO 100", "20 X=1/0", "30 END", "100 PRINT ERR"]);
        assert_eq!(interp.collab.output, b"18\r\n");
    }

    #[test]
    fn case_of_when_dispatches_the_matching_clause() {
        let interp = run_source(&["10 X=2", "20 CASE X OF", "30 WHEN 1: PRINT \"ONE\"", "40 WHEN 2: PRINT \"TWO\"", "50 ENDCASE"]);
        assert_eq!(interp.collab.output, b"TWO\r\n");
    }

    #[test]
    fn data_read_restore_cycle() {
        let interp = run_source(&[
            "10 DATA 10,20",
            "20 READ A,B",
            "30 PRINT A+B",
            "40 RESTORE",
            "50 READ C",
            "60 PRINT C",
        ]);
        assert_eq!(interp.collab.output, b"30\r\n10\r\n");
    }
}
