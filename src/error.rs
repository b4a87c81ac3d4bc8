//! Error taxonomy and trap-stack bookkeeping (component C13).
//!
//! Grounded on `eelf::reader::ParseError`: a flat `thiserror::Error` enum
//! carrying just enough structure to format the BBC BASIC error banner
//! (`"<message> at line <n>"`), plus the `ON ERROR` handler stack that
//! `spec.md` §4.13 describes.

use thiserror::Error;

/// The error taxonomy from `spec.md` §7. Each variant's `Display` is the
/// message text a `REPORT`/uncaught error prints (sans "at line N", which
/// [`BasicError`] adds separately).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("Syntax error")]
    Syntax,
    #[error("Missing quote")]
    MissingEndQuote,
    #[error("Line too long")]
    LineTooLong,
    #[error("Bad number")]
    BadNumber,
    #[error("Type mismatch")]
    TypeMismatch,
    #[error("Type mismatch: numeric needed")]
    TypeNum,
    #[error("Type mismatch: string needed")]
    TypeString,
    #[error("Subscript out of range")]
    ArrayIndex,
    #[error("Division by zero")]
    DivZero,
    #[error("Negative root")]
    NegRoot,
    #[error("Log range")]
    LogRange,
    #[error("Exp range")]
    ExpRange,
    #[error("String too long")]
    StringLen,
    #[error("Bad string comparison")]
    StringCmp,
    #[error("No room")]
    NoRoom,
    #[error("No room for stack")]
    StackOverflow,
    #[error("Missing )")]
    MissingRightParen,
    #[error("Bad line number")]
    BadLineNum,
    #[error("Not a FOR variable")]
    NotFor,
    #[error("Not in a REPEAT")]
    NotRepeat,
    #[error("Not in a WHILE")]
    NotWhile,
    #[error("No GOSUB")]
    NotGosub,
    #[error("Not in a PROC")]
    NotProc,
    #[error("Not in a FN")]
    NotFn,
    #[error("Bad call")]
    BadCall,
    #[error("Bad mode")]
    BadMode,
    #[error("Bad command")]
    BadCommand,
    #[error("Bad DIM")]
    BadDim,
    /// User-raised via `ERROR n, "msg"` with `n < 17`; suppresses the
    /// "at line N" decoration (spec.md §7).
    #[error("{0}")]
    SilentError(String),
    #[error("Escape")]
    Escape,
    #[error("File not found")]
    FileNotFound,
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Unsupported")]
    Unsupported,
    /// `ERROR n, "msg"` with `n >= 17`: carries the user-chosen code and text.
    #[error("{1}")]
    User(i32, String),
}

impl ErrorKind {
    /// The numeric code exposed to BASIC as `ERR`. Mirrors the fixed
    /// assignments MatrixBrandy-derived dialects use; `spec.md` only
    /// requires that DivZero map to 18 (§8 scenario 6).
    pub fn code(&self) -> i32 {
        match self {
            Self::Syntax => 0,
            Self::MissingEndQuote => 9,
            Self::LineTooLong => 204,
            Self::BadNumber => 7,
            Self::TypeMismatch | Self::TypeNum | Self::TypeString => 6,
            Self::ArrayIndex => 15,
            Self::DivZero => 18,
            Self::NegRoot => 21,
            Self::LogRange => 22,
            Self::ExpRange => 23,
            Self::StringLen => 19,
            Self::StringCmp => 20,
            Self::NoRoom => 0,
            Self::StackOverflow => 24,
            Self::MissingRightParen => 26,
            Self::BadLineNum => 11,
            Self::NotFor => 32,
            Self::NotRepeat => 34,
            Self::NotWhile => 35,
            Self::NotGosub => 38,
            Self::NotProc => 39,
            Self::NotFn => 40,
            Self::BadCall => 8,
            Self::BadMode => 163,
            Self::BadCommand => 254,
            Self::BadDim => 10,
            Self::SilentError(_) => 1,
            Self::Escape => 17,
            Self::FileNotFound => 214,
            Self::IoError(_) => 255,
            Self::Unsupported => 255,
            Self::User(code, _) => *code,
        }
    }

    /// Silent variants (user codes below 17, by convention borrowed from the
    /// dialect) suppress the "at line N" decoration (spec.md §7).
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::SilentError(_)) || matches!(self, Self::User(code, _) if *code < 17)
    }
}

/// A raised error together with the line it occurred on, matching the
/// `ERR`/`ERL`/`REPORT$` triad of spec.md §4.13.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct BasicError {
    pub kind: ErrorKind,
    pub line: Option<u16>,
}

impl BasicError {
    pub fn new(kind: ErrorKind, line: Option<u16>) -> Self {
        Self { kind, line }
    }

    /// The banner text a terminal `REPORT` prints: `"<message> at line <n>"`
    /// unless the error is silent (spec.md §7).
    pub fn banner(&self) -> String {
        if self.kind.is_silent() {
            self.kind.to_string()
        } else {
            match self.line {
                Some(n) => format!("{} at line {}", self.kind, n),
                None => self.kind.to_string(),
            }
        }
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }
}

pub type Result<T> = std::result::Result<T, BasicError>;

/// One entry on the `ON ERROR` handler stack (spec.md §4.13/§4.7).
///
/// `capture` is the depth of the FOR/REPEAT/WHILE/GOSUB/local-frame stacks at
/// the moment the handler was installed; raising an error unwinds those
/// stacks back down to it before jumping to `handler_line`.
#[derive(Debug, Clone)]
pub struct ErrorFrame {
    pub handler_line: u16,
    pub local: bool,
    pub for_depth: usize,
    pub repeat_depth: usize,
    pub while_depth: usize,
    pub gosub_depth: usize,
    pub local_frame_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divzero_is_code_18() {
        assert_eq!(ErrorKind::DivZero.code(), 18);
    }

    #[test]
    fn banner_decorates_with_line() {
        let err = BasicError::new(ErrorKind::DivZero, Some(20));
        assert_eq!(err.banner(), "Division by zero at line 20");
    }

    #[test]
    fn silent_error_has_no_banner_suffix() {
        let err = BasicError::new(ErrorKind::SilentError("custom".into()), Some(20));
        assert_eq!(err.banner(), "custom");
    }
}
