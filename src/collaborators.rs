//! External interface traits (spec.md §6): keyboard, mouse, text/file I/O,
//! and `*` command dispatch, each implemented once for a real terminal/file
//! backend and once as an in-memory stub for tests.
//!
//! Grounded on `devices.rs`'s `Device` trait + `Bus` dispatch: the teacher
//! routes memory-mapped reads/writes to whichever `Device` claims an
//! address range; here, the interpreter routes `INKEY`/`GET`/`OPENIN`/
//! `OSCLI` calls to whichever collaborator implementation the host
//! provides, so the core interpreter never depends on `std::io`/`termion`
//! directly.

use crate::error::{BasicError, ErrorKind, Result};
use std::collections::HashMap;
use std::io::Write;

/// Keyboard input: `GET`, `GET$`, `INKEY`, `INKEY$` (spec.md §4.7).
pub trait Keyboard {
    /// Blocks until a key is available and returns its code (`GET`).
    fn get_char(&mut self) -> Result<u8>;
    /// `INKEY(n)`: non-blocking poll with an `n`-centisecond timeout for
    /// `n >= 0`; `n < 0` instead tests whether a specific key is held down.
    /// Returns `None` on timeout/key-not-held.
    fn inkey(&mut self, arg: i32) -> Result<Option<u8>>;
}

/// Pointer input for `MOUSE`/`ON MOUSE` style polling (spec.md §4.7,
/// carried forward from `original_source/` as an ambient input surface).
pub trait Mouse {
    fn position(&mut self) -> Result<(i32, i32, u8)>;
}

/// Text console output outside the framebuffer itself: used for `*`
/// commands' textual replies and for any backend that renders `PRINT`
/// through a real terminal rather than the pixel framebuffer.
pub trait TextIo {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Numbered file channels for `OPENIN`/`OPENOUT`/`OPENUP`/`BPUT`/`BGET`/
/// `CLOSE`/`EOF`/`PTR`/`EXT` (spec.md §4.7).
pub trait FileIo {
    fn open_in(&mut self, path: &str) -> Result<i32>;
    fn open_out(&mut self, path: &str) -> Result<i32>;
    fn open_up(&mut self, path: &str) -> Result<i32>;
    fn close(&mut self, channel: i32) -> Result<()>;
    fn bget(&mut self, channel: i32) -> Result<u8>;
    fn bput(&mut self, channel: i32, byte: u8) -> Result<()>;
    fn eof(&mut self, channel: i32) -> Result<bool>;
    fn ptr(&mut self, channel: i32) -> Result<u32>;
    fn set_ptr(&mut self, channel: i32, pos: u32) -> Result<()>;
    fn ext(&mut self, channel: i32) -> Result<u32>;
}

/// `OSCLI`/`*command` dispatch (spec.md §4.7): star-commands are looked up
/// by name and handed the remainder of the command line.
pub trait StarCommandDispatcher {
    fn dispatch(&mut self, command: &str, args: &str) -> Result<()>;
}

/// Everything a concrete runtime environment provides to the interpreter,
/// bundled so `Interpreter` only needs one generic parameter.
pub trait Collaborators: Keyboard + Mouse + TextIo + FileIo + StarCommandDispatcher {}
impl<T: Keyboard + Mouse + TextIo + FileIo + StarCommandDispatcher> Collaborators for T {}

/// A real-terminal backend: stdout for text, local files for channels, no
/// star commands beyond `*HELP`. Grounded on `devices::Timer`'s use of
/// `std::time::Instant` for wall-clock state — the same "just use std"
/// approach extended to file descriptors.
pub struct HostCollaborators {
    files: HashMap<i32, std::fs::File>,
    next_channel: i32,
}

impl HostCollaborators {
    pub fn new() -> Self {
        HostCollaborators { files: HashMap::new(), next_channel: 1 }
    }
}

impl Default for HostCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyboard for HostCollaborators {
    fn get_char(&mut self) -> Result<u8> {
        use std::io::Read;
        let mut buf = [0u8; 1];
        std::io::stdin().read_exact(&mut buf).map_err(|e| BasicError::new(ErrorKind::IoError(e.to_string()), None))?;
        Ok(buf[0])
    }

    fn inkey(&mut self, _arg: i32) -> Result<Option<u8>> {
        Ok(None)
    }
}

impl Mouse for HostCollaborators {
    fn position(&mut self) -> Result<(i32, i32, u8)> {
        Ok((0, 0, 0))
    }
}

impl TextIo for HostCollaborators {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        std::io::stdout().write_all(bytes).map_err(|e| BasicError::new(ErrorKind::IoError(e.to_string()), None))
    }

    fn flush(&mut self) -> Result<()> {
        std::io::stdout().flush().map_err(|e| BasicError::new(ErrorKind::IoError(e.to_string()), None))
    }
}

impl FileIo for HostCollaborators {
    fn open_in(&mut self, path: &str) -> Result<i32> {
        let file = std::fs::File::open(path).map_err(|_| BasicError::new(ErrorKind::FileNotFound, None))?;
        let channel = self.next_channel;
        self.next_channel += 1;
        self.files.insert(channel, file);
        Ok(channel)
    }

    fn open_out(&mut self, path: &str) -> Result<i32> {
        let file = std::fs::File::create(path).map_err(|e| BasicError::new(ErrorKind::IoError(e.to_string()), None))?;
        let channel = self.next_channel;
        self.next_channel += 1;
        self.files.insert(channel, file);
        Ok(channel)
    }

    fn open_up(&mut self, path: &str) -> Result<i32> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| BasicError::new(ErrorKind::FileNotFound, None))?;
        let channel = self.next_channel;
        self.next_channel += 1;
        self.files.insert(channel, file);
        Ok(channel)
    }

    fn close(&mut self, channel: i32) -> Result<()> {
        self.files.remove(&channel);
        Ok(())
    }

    fn bget(&mut self, channel: i32) -> Result<u8> {
        use std::io::Read;
        let file = self.files.get_mut(&channel).ok_or(BasicError::new(ErrorKind::BadCall, None))?;
        let mut buf = [0u8; 1];
        file.read_exact(&mut buf).map_err(|e| BasicError::new(ErrorKind::IoError(e.to_string()), None))?;
        Ok(buf[0])
    }

    fn bput(&mut self, channel: i32, byte: u8) -> Result<()> {
        let file = self.files.get_mut(&channel).ok_or(BasicError::new(ErrorKind::BadCall, None))?;
        file.write_all(&[byte]).map_err(|e| BasicError::new(ErrorKind::IoError(e.to_string()), None))
    }

    fn eof(&mut self, channel: i32) -> Result<bool> {
        use std::io::{Seek, SeekFrom};
        let file = self.files.get_mut(&channel).ok_or(BasicError::new(ErrorKind::BadCall, None))?;
        let pos = file.stream_position().map_err(|e| BasicError::new(ErrorKind::IoError(e.to_string()), None))?;
        let len = file.metadata().map_err(|e| BasicError::new(ErrorKind::IoError(e.to_string()), None))?.len();
        file.seek(SeekFrom::Start(pos)).ok();
        Ok(pos >= len)
    }

    fn ptr(&mut self, channel: i32) -> Result<u32> {
        use std::io::Seek;
        let file = self.files.get_mut(&channel).ok_or(BasicError::new(ErrorKind::BadCall, None))?;
        file.stream_position().map(|p| p as u32).map_err(|e| BasicError::new(ErrorKind::IoError(e.to_string()), None))
    }

    fn set_ptr(&mut self, channel: i32, pos: u32) -> Result<()> {
        use std::io::{Seek, SeekFrom};
        let file = self.files.get_mut(&channel).ok_or(BasicError::new(ErrorKind::BadCall, None))?;
        file.seek(SeekFrom::Start(pos as u64)).map(|_| ()).map_err(|e| BasicError::new(ErrorKind::IoError(e.to_string()), None))
    }

    fn ext(&mut self, channel: i32) -> Result<u32> {
        let file = self.files.get(&channel).ok_or(BasicError::new(ErrorKind::BadCall, None))?;
        file.metadata().map(|m| m.len() as u32).map_err(|e| BasicError::new(ErrorKind::IoError(e.to_string()), None))
    }
}

impl StarCommandDispatcher for HostCollaborators {
    fn dispatch(&mut self, command: &str, _args: &str) -> Result<()> {
        match command.to_ascii_uppercase().as_str() {
            "HELP" => Ok(()),
            _ => Err(BasicError::new(ErrorKind::BadCommand, None)),
        }
    }
}

/// An in-memory stand-in used by the integration tests (spec.md §8): fixed
/// keyboard input queue, a `Vec<u8>` standing in for stdout, and files
/// backed by in-memory buffers instead of the filesystem.
#[derive(Default)]
pub struct TestCollaborators {
    pub input: std::collections::VecDeque<u8>,
    pub output: Vec<u8>,
    files: HashMap<i32, (Vec<u8>, usize)>,
    next_channel: i32,
}

impl TestCollaborators {
    pub fn new() -> Self {
        TestCollaborators { next_channel: 1, ..Default::default() }
    }
}

impl Keyboard for TestCollaborators {
    fn get_char(&mut self) -> Result<u8> {
        self.input.pop_front().ok_or(BasicError::new(ErrorKind::Escape, None))
    }

    fn inkey(&mut self, arg: i32) -> Result<Option<u8>> {
        if arg < 0 {
            return Ok(None);
        }
        Ok(self.input.pop_front())
    }
}

impl Mouse for TestCollaborators {
    fn position(&mut self) -> Result<(i32, i32, u8)> {
        Ok((0, 0, 0))
    }
}

impl TextIo for TestCollaborators {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.output.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl FileIo for TestCollaborators {
    fn open_in(&mut self, path: &str) -> Result<i32> {
        self.open_out(path)
    }

    fn open_out(&mut self, path: &str) -> Result<i32> {
        let channel = self.next_channel;
        self.next_channel += 1;
        self.files.insert(channel, (Vec::new(), 0));
        let _ = path;
        Ok(channel)
    }

    fn open_up(&mut self, path: &str) -> Result<i32> {
        self.open_out(path)
    }

    fn close(&mut self, channel: i32) -> Result<()> {
        self.files.remove(&channel);
        Ok(())
    }

    fn bget(&mut self, channel: i32) -> Result<u8> {
        let (data, pos) = self.files.get_mut(&channel).ok_or(BasicError::new(ErrorKind::BadCall, None))?;
        let byte = *data.get(*pos).ok_or(BasicError::new(ErrorKind::IoError("eof".into()), None))?;
        *pos += 1;
        Ok(byte)
    }

    fn bput(&mut self, channel: i32, byte: u8) -> Result<()> {
        let (data, pos) = self.files.get_mut(&channel).ok_or(BasicError::new(ErrorKind::BadCall, None))?;
        if *pos < data.len() {
            data[*pos] = byte;
        } else {
            data.push(byte);
        }
        *pos += 1;
        Ok(())
    }

    fn eof(&mut self, channel: i32) -> Result<bool> {
        let (data, pos) = self.files.get(&channel).ok_or(BasicError::new(ErrorKind::BadCall, None))?;
        Ok(*pos >= data.len())
    }

    fn ptr(&mut self, channel: i32) -> Result<u32> {
        let (_, pos) = self.files.get(&channel).ok_or(BasicError::new(ErrorKind::BadCall, None))?;
        Ok(*pos as u32)
    }

    fn set_ptr(&mut self, channel: i32, pos: u32) -> Result<()> {
        let entry = self.files.get_mut(&channel).ok_or(BasicError::new(ErrorKind::BadCall, None))?;
        entry.1 = pos as usize;
        Ok(())
    }

    fn ext(&mut self, channel: i32) -> Result<u32> {
        let (data, _) = self.files.get(&channel).ok_or(BasicError::new(ErrorKind::BadCall, None))?;
        Ok(data.len() as u32)
    }
}

impl StarCommandDispatcher for TestCollaborators {
    fn dispatch(&mut self, _command: &str, _args: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborators_round_trip_a_file_channel() {
        let mut c = TestCollaborators::new();
        let ch = c.open_out("scratch").unwrap();
        c.bput(ch, b'h').unwrap();
        c.bput(ch, b'i').unwrap();
        c.set_ptr(ch, 0).unwrap();
        assert_eq!(c.bget(ch).unwrap(), b'h');
        assert_eq!(c.bget(ch).unwrap(), b'i');
        assert!(c.eof(ch).unwrap());
    }

    #[test]
    fn keyboard_queue_drains_in_order() {
        let mut c = TestCollaborators::new();
        c.input.push_back(b'A');
        c.input.push_back(b'B');
        assert_eq!(c.get_char().unwrap(), b'A');
        assert_eq!(c.get_char().unwrap(), b'B');
    }
}
