//! Keyword table for the tokenizer (component C3).
//!
//! Grounded on `eelf`'s `consts.rs`: a `phf::phf_map!` from spelling to a
//! `#[derive(FromPrimitive)]`-style enum, used there for ELF section-type
//! names and reused here for BASIC reserved words. `phf` gives O(1),
//! allocation-free lookup with no build-time codegen, which matters because
//! `tokenize()` runs this lookup for every identifier-shaped word in a line.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use phf::phf_map;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Keyword {
    // Statement-introducing keywords.
    Print, Let, Input, If, Then, Else, For, To, Step, Next,
    Goto, Gosub, Return, Repeat, Until, While, Endwhile,
    Def, Proc, Endproc, Fn, Local, Dim, Redim,
    Data, Read, Restore, On, Error, Off, Resume,
    Case, Of, When, Otherwise, Endcase,
    End, Stop, Quit, New, Run, List, Clear, Trace,
    Vdu, Plot, Mode, Colour, Gcol, Move, Draw, Point,
    Cls, Clg, Origin, Tint, Palette, Rectangle, Circle, Ellipse, Fill,
    Line, Sound, Envelope, Oscli, Call, Width,
    Bput, Bget, Openin, Openout, Openup, Close, Ptr, Ext,
    Private, Library, Install,

    // Operators spelled as words.
    And, Or, Eor, Not, Div, Mod,

    // Functions.
    Abs, Acs, Asn, Atn, Cos, Sin, Tan, Exp, Ln, Log, Sqr, Sgn, Int, Pi, Rad, Deg,
    Rnd, True, False,
    Chr, Asc, Len, Val, Str, Mid, Left, Right, String, Instr, Spc, Tab, Get,
    Inkey, Eof, Erl, Err, Report, Time, Pos, Vpos, Usr, Adval, Himem, Lomem, Page, Top,
    Openfile,
}

impl Keyword {
    pub fn spelling(&self) -> &'static str {
        SPELLINGS[usize::from(u16::from(*self))]
    }
}

/// Index-matched with the `Keyword` enum's discriminants so
/// [`Keyword::spelling`] is a plain array index, not a reverse phf lookup.
static SPELLINGS: &[&str] = &[
    "PRINT", "LET", "INPUT", "IF", "THEN", "ELSE", "FOR", "TO", "STEP", "NEXT",
    "GOTO", "GOSUB", "RETURN", "REPEAT", "UNTIL", "WHILE", "ENDWHILE",
    "DEF", "PROC", "ENDPROC", "FN", "LOCAL", "DIM", "REDIM",
    "DATA", "READ", "RESTORE", "ON", "ERROR", "OFF", "RESUME",
    "CASE", "OF", "WHEN", "OTHERWISE", "ENDCASE",
    "END", "STOP", "QUIT", "NEW", "RUN", "LIST", "CLEAR", "TRACE",
    "VDU", "PLOT", "MODE", "COLOUR", "GCOL", "MOVE", "DRAW", "POINT",
    "CLS", "CLG", "ORIGIN", "TINT", "PALETTE", "RECTANGLE", "CIRCLE", "ELLIPSE", "FILL",
    "LINE", "SOUND", "ENVELOPE", "OSCLI", "CALL", "WIDTH",
    "BPUT", "BGET", "OPENIN", "OPENOUT", "OPENUP", "CLOSE", "PTR", "EXT",
    "PRIVATE", "LIBRARY", "INSTALL",
    "AND", "OR", "EOR", "NOT", "DIV", "MOD",
    "ABS", "ACS", "ASN", "ATN", "COS", "SIN", "TAN", "EXP", "LN", "LOG", "SQR", "SGN", "INT", "PI", "RAD", "DEG",
    "RND", "TRUE", "FALSE",
    "CHR$", "ASC", "LEN", "VAL", "STR$", "MID$", "LEFT$", "RIGHT$", "STRING$", "INSTR", "SPC", "TAB", "GET",
    "INKEY", "EOF", "ERL", "ERR", "REPORT$", "TIME", "POS", "VPOS", "USR", "ADVAL", "HIMEM", "LOMEM", "PAGE", "TOP",
    "OPENFILE",
];

/// Built once, keyed by spelling, from the same list that backs
/// [`Keyword::spelling`] so the two can never drift apart.
static KEYWORD_MAP: phf::Map<&'static str, Keyword> = phf_map! {
    "PRINT" => Keyword::Print, "LET" => Keyword::Let, "INPUT" => Keyword::Input,
    "IF" => Keyword::If, "THEN" => Keyword::Then, "ELSE" => Keyword::Else,
    "FOR" => Keyword::For, "TO" => Keyword::To, "STEP" => Keyword::Step, "NEXT" => Keyword::Next,
    "GOTO" => Keyword::Goto, "GOSUB" => Keyword::Gosub, "RETURN" => Keyword::Return,
    "REPEAT" => Keyword::Repeat, "UNTIL" => Keyword::Until, "WHILE" => Keyword::While, "ENDWHILE" => Keyword::Endwhile,
    "DEF" => Keyword::Def, "PROC" => Keyword::Proc, "ENDPROC" => Keyword::Endproc, "FN" => Keyword::Fn,
    "LOCAL" => Keyword::Local, "DIM" => Keyword::Dim, "REDIM" => Keyword::Redim,
    "DATA" => Keyword::Data, "READ" => Keyword::Read, "RESTORE" => Keyword::Restore,
    "ON" => Keyword::On, "ERROR" => Keyword::Error, "OFF" => Keyword::Off, "RESUME" => Keyword::Resume,
    "CASE" => Keyword::Case, "OF" => Keyword::Of, "WHEN" => Keyword::When,
    "OTHERWISE" => Keyword::Otherwise, "ENDCASE" => Keyword::Endcase,
    "END" => Keyword::End, "STOP" => Keyword::Stop, "QUIT" => Keyword::Quit, "NEW" => Keyword::New,
    "RUN" => Keyword::Run, "LIST" => Keyword::List, "CLEAR" => Keyword::Clear, "TRACE" => Keyword::Trace,
    "VDU" => Keyword::Vdu, "PLOT" => Keyword::Plot, "MODE" => Keyword::Mode, "COLOUR" => Keyword::Colour,
    "COLOR" => Keyword::Colour, "GCOL" => Keyword::Gcol, "MOVE" => Keyword::Move, "DRAW" => Keyword::Draw,
    "POINT" => Keyword::Point, "CLS" => Keyword::Cls, "CLG" => Keyword::Clg, "ORIGIN" => Keyword::Origin,
    "TINT" => Keyword::Tint, "PALETTE" => Keyword::Palette, "RECTANGLE" => Keyword::Rectangle,
    "CIRCLE" => Keyword::Circle, "ELLIPSE" => Keyword::Ellipse, "FILL" => Keyword::Fill,
    "LINE" => Keyword::Line, "SOUND" => Keyword::Sound, "ENVELOPE" => Keyword::Envelope,
    "OSCLI" => Keyword::Oscli, "CALL" => Keyword::Call, "WIDTH" => Keyword::Width,
    "BPUT" => Keyword::Bput, "BGET" => Keyword::Bget, "OPENIN" => Keyword::Openin,
    "OPENOUT" => Keyword::Openout, "OPENUP" => Keyword::Openup, "CLOSE" => Keyword::Close,
    "PTR" => Keyword::Ptr, "EXT" => Keyword::Ext,
    "PRIVATE" => Keyword::Private, "LIBRARY" => Keyword::Library, "INSTALL" => Keyword::Install,
    "AND" => Keyword::And, "OR" => Keyword::Or, "EOR" => Keyword::Eor, "NOT" => Keyword::Not,
    "DIV" => Keyword::Div, "MOD" => Keyword::Mod,
    "ABS" => Keyword::Abs, "ACS" => Keyword::Acs, "ASN" => Keyword::Asn, "ATN" => Keyword::Atn,
    "COS" => Keyword::Cos, "SIN" => Keyword::Sin, "TAN" => Keyword::Tan, "EXP" => Keyword::Exp,
    "LN" => Keyword::Ln, "LOG" => Keyword::Log, "SQR" => Keyword::Sqr, "SGN" => Keyword::Sgn,
    "INT" => Keyword::Int, "PI" => Keyword::Pi, "RAD" => Keyword::Rad, "DEG" => Keyword::Deg,
    "RND" => Keyword::Rnd, "TRUE" => Keyword::True, "FALSE" => Keyword::False,
    "CHR$" => Keyword::Chr, "ASC" => Keyword::Asc, "LEN" => Keyword::Len, "VAL" => Keyword::Val,
    "STR$" => Keyword::Str, "MID$" => Keyword::Mid, "LEFT$" => Keyword::Left, "RIGHT$" => Keyword::Right,
    "STRING$" => Keyword::String, "INSTR" => Keyword::Instr, "SPC" => Keyword::Spc, "TAB" => Keyword::Tab,
    "GET" => Keyword::Get, "INKEY" => Keyword::Inkey, "EOF" => Keyword::Eof, "ERL" => Keyword::Erl,
    "ERR" => Keyword::Err, "REPORT$" => Keyword::Report, "TIME" => Keyword::Time, "POS" => Keyword::Pos,
    "VPOS" => Keyword::Vpos, "USR" => Keyword::Usr, "ADVAL" => Keyword::Adval,
    "HIMEM" => Keyword::Himem, "LOMEM" => Keyword::Lomem, "PAGE" => Keyword::Page, "TOP" => Keyword::Top,
    "OPENFILE" => Keyword::Openfile,
};

/// Longest-prefix-wins would be needed for abbreviation dots (`P.` for
/// `PRINT`); this crate does not support abbreviated keywords, matching the
/// explicit Non-goal in spec.md §1.
pub fn lookup_keyword(word: &str) -> Option<Keyword> {
    KEYWORD_MAP.get(word.to_ascii_uppercase().as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup_keyword("print"), Some(Keyword::Print));
        assert_eq!(lookup_keyword("PRINT"), Some(Keyword::Print));
    }

    #[test]
    fn unknown_word_is_not_a_keyword() {
        assert_eq!(lookup_keyword("FROBNICATE"), None);
    }

    #[test]
    fn spelling_round_trips_through_the_array_index() {
        for (spelling, kw) in [("FOR", Keyword::For), ("ENDPROC", Keyword::Endproc), ("MID$", Keyword::Mid)] {
            assert_eq!(kw.spelling(), spelling);
        }
    }

    #[test]
    fn color_is_an_alias_for_colour() {
        assert_eq!(lookup_keyword("COLOR"), Some(Keyword::Colour));
    }
}
