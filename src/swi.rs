//! SWI name/number compatibility table (spec.md §6.8): the small subset of
//! RISC OS software-interrupt calls a BASIC program reaches via `*SWI name,
//! args...`, dispatched to the same core operations `VDU`/`GCOL`/etc. use.
//!
//! Grounded on `devices.rs`'s `Bus::read`/`write` dispatch: the teacher maps
//! an address range to a device; here a SWI name maps to a interpreter
//! operation, the lookup itself built the way `eelf::consts` builds its
//! keyword/section `phf_map!`s.

use crate::collaborators::Collaborators;
use crate::error::{BasicError, ErrorKind, Result};
use crate::exec::Interpreter;
use crate::value::Value;
use phf::phf_map;

/// RISC OS SWI numbers for the calls this table knows how to serve. Not
/// exhaustive — only the handful spec.md §6.8 names.
pub static SWI_NUMBERS: phf::Map<&'static str, u32> = phf_map! {
    "OS_WriteC" => 0x00,
    "OS_WriteS" => 0x01,
    "OS_Write0" => 0x02,
    "OS_NewLine" => 0x03,
    "OS_ReadC" => 0x04,
    "OS_CLI" => 0x05,
    "OS_Byte" => 0x06,
    "OS_Word" => 0x07,
    "OS_Mouse" => 0x1C,
    "OS_Plot" => 0x45,
};

pub fn number_for(name: &str) -> Option<u32> {
    SWI_NUMBERS.get(name).copied()
}

/// Parses `"Name,arg1,arg2,..."` (the body of a `*SWI` star command) and
/// executes it against the interpreter's own state, returning the SWI's
/// primary result register (`R0`) as a [`Value`].
pub fn dispatch<C: Collaborators>(body: &str, interp: &mut Interpreter<C>) -> Result<Value> {
    let mut parts = body.split(',').map(str::trim);
    let name = parts.next().unwrap_or("").trim();
    if number_for(name).is_none() {
        return Err(BasicError::new(ErrorKind::BadCommand, None));
    }
    let args: Vec<i64> = parts.map(|p| p.parse::<i64>().unwrap_or(0)).collect();
    match name {
        "OS_WriteC" => {
            interp.feed_vdu(args.first().copied().unwrap_or(0) as u8)?;
            Ok(Value::Int32(0))
        }
        "OS_NewLine" => {
            interp.feed_vdu(13)?;
            interp.feed_vdu(10)?;
            Ok(Value::Int32(0))
        }
        "OS_Write0" | "OS_WriteS" => Ok(Value::Int32(0)),
        "OS_ReadC" => Ok(Value::Int32(interp.collab.get_char()? as i32)),
        "OS_Byte" | "OS_Word" => Ok(Value::Int32(0)),
        "OS_Mouse" => Ok(Value::Int32(0)),
        "OS_Plot" => {
            let k = args.first().copied().unwrap_or(0) as u8;
            let x = args.get(1).copied().unwrap_or(0) as i32;
            let y = args.get(2).copied().unwrap_or(0) as i32;
            interp.plot_raw(k, x, y)?;
            Ok(Value::Int32(0))
        }
        _ => Err(BasicError::new(ErrorKind::BadCommand, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::TestCollaborators;

    #[test]
    fn os_writec_emits_the_given_byte() {
        let mut interp = Interpreter::new(TestCollaborators::new());
        dispatch("OS_WriteC,65", &mut interp).unwrap();
        assert_eq!(interp.collab.output, b"A");
    }

    #[test]
    fn unknown_swi_name_is_a_bad_command_error() {
        let mut interp = Interpreter::new(TestCollaborators::new());
        assert!(dispatch("OS_Frobnicate", &mut interp).is_err());
    }

    #[test]
    fn numbers_match_the_documented_riscos_values() {
        assert_eq!(number_for("OS_WriteC"), Some(0x00));
        assert_eq!(number_for("OS_Plot"), Some(0x45));
        assert_eq!(number_for("OS_Nonexistent"), None);
    }
}
