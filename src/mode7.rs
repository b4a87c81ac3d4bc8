//! Mode 7 Teletext renderer (component C11): the 40×25 text-only mode whose
//! control codes are interpreted from the character stream itself rather
//! than from `VDU` command bytes.
//!
//! Grounded on `devices::ControlMode`'s bitfield-driven redraw: a small set
//! of per-cell attribute bits recomputed from a control byte, generalized
//! from one hardware register to one teletext control code per cell.

pub const MODE7_COLS: usize = 40;
pub const MODE7_ROWS: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeletextColour {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl TeletextColour {
    fn from_code(code: u8) -> Self {
        match code & 0x07 {
            0 => TeletextColour::Black,
            1 => TeletextColour::Red,
            2 => TeletextColour::Green,
            3 => TeletextColour::Yellow,
            4 => TeletextColour::Blue,
            5 => TeletextColour::Magenta,
            6 => TeletextColour::Cyan,
            _ => TeletextColour::White,
        }
    }

    pub fn rgb(self) -> crate::palette::Rgb {
        use crate::palette::Rgb;
        match self {
            TeletextColour::Black => Rgb(0, 0, 0),
            TeletextColour::Red => Rgb(255, 0, 0),
            TeletextColour::Green => Rgb(0, 255, 0),
            TeletextColour::Yellow => Rgb(255, 255, 0),
            TeletextColour::Blue => Rgb(0, 0, 255),
            TeletextColour::Magenta => Rgb(255, 0, 255),
            TeletextColour::Cyan => Rgb(0, 255, 255),
            TeletextColour::White => Rgb(255, 255, 255),
        }
    }
}

/// One screen cell's rendered attributes, the product of "set-at" (applies
/// to this cell onward immediately) and "set-after" (applies from the next
/// cell) control codes within the current row (spec.md §4.11).
#[derive(Debug, Clone, Copy)]
pub struct Mode7Cell {
    pub ch: u8,
    pub fg: TeletextColour,
    pub bg: TeletextColour,
    pub flash: bool,
    pub double_height: bool,
    pub graphics: bool,
    pub separated: bool,
    pub held: bool,
    pub concealed: bool,
}

impl Default for Mode7Cell {
    fn default() -> Self {
        Mode7Cell {
            ch: b' ',
            fg: TeletextColour::White,
            bg: TeletextColour::Black,
            flash: false,
            double_height: false,
            graphics: false,
            separated: false,
            held: false,
            concealed: false,
        }
    }
}

/// Per-row "set-after" state that carries forward as characters are
/// written; reset to defaults at the start of every row (spec.md §4.11).
#[derive(Clone, Copy)]
struct RowState {
    fg: TeletextColour,
    bg: TeletextColour,
    flash: bool,
    double_height: bool,
    graphics: bool,
    separated: bool,
    conceal: bool,
    hold_graphics: bool,
    last_graphics_char: u8,
}

impl Default for RowState {
    fn default() -> Self {
        RowState {
            fg: TeletextColour::White,
            bg: TeletextColour::Black,
            flash: false,
            double_height: false,
            graphics: false,
            separated: false,
            conceal: false,
            hold_graphics: false,
            last_graphics_char: b' ',
        }
    }
}

pub struct Mode7Screen {
    cells: Vec<Mode7Cell>,
    cursor_col: usize,
    cursor_row: usize,
    row_state: [RowState; MODE7_ROWS],
}

impl Mode7Screen {
    pub fn new() -> Self {
        Mode7Screen {
            cells: vec![Mode7Cell::default(); MODE7_COLS * MODE7_ROWS],
            cursor_col: 0,
            cursor_row: 0,
            row_state: [RowState::default(); MODE7_ROWS],
        }
    }

    pub fn cell(&self, col: usize, row: usize) -> Mode7Cell {
        self.cells[row * MODE7_COLS + col]
    }

    pub fn cls(&mut self) {
        self.cells = vec![Mode7Cell::default(); MODE7_COLS * MODE7_ROWS];
        self.row_state = [RowState::default(); MODE7_ROWS];
        self.cursor_col = 0;
        self.cursor_row = 0;
    }

    pub fn move_to(&mut self, col: usize, row: usize) {
        self.cursor_col = col.min(MODE7_COLS - 1);
        self.cursor_row = row.min(MODE7_ROWS - 1);
    }

    /// Feeds one byte through the teletext control-code/printable-character
    /// state machine (spec.md §4.11). Control codes 0-31 are "set-after"
    /// (take effect starting at the *next* character written on this row)
    /// except cursor-movement and a handful of immediate codes, which are
    /// applied here as "set-at".
    pub fn put_char(&mut self, byte: u8) {
        let row = self.cursor_row;
        match byte {
            0x0D => {
                self.cursor_col = 0;
            }
            0x0A => self.advance_row(),
            0x07 => {} // BEL: no visual effect, handled by a collaborator elsewhere.
            0..=31 => self.apply_control_code(row, byte),
            _ => {
                self.write_printable(byte);
            }
        }
    }

    fn apply_control_code(&mut self, row: usize, code: u8) {
        let st = &mut self.row_state[row];
        match code {
            0..=7 => {
                st.graphics = false;
                st.fg = TeletextColour::from_code(code);
                st.conceal = false;
            }
            0x10..=0x17 => {
                st.graphics = true;
                st.fg = TeletextColour::from_code(code);
                st.conceal = false;
            }
            8 => st.flash = true,
            9 => st.flash = false,
            0x0C => st.double_height = false,
            0x18 => st.conceal = true,
            0x19 => st.separated = false,
            0x1A => st.separated = true,
            0x1C => st.bg = TeletextColour::Black,
            0x1D => st.bg = st.fg,
            0x1E => st.hold_graphics = true,
            0x1F => st.hold_graphics = false,
            0x0B => st.double_height = true,
            _ => {}
        }
        // The control code itself occupies a (blank, attributed) cell.
        self.write_cell(b' ', row);
        self.cursor_col = (self.cursor_col + 1).min(MODE7_COLS);
        if self.cursor_col >= MODE7_COLS {
            self.advance_row();
        }
    }

    fn write_printable(&mut self, byte: u8) {
        let row = self.cursor_row;
        if self.row_state[row].graphics && ((0x20..=0x3F).contains(&byte) || (0x60..=0x7F).contains(&byte)) {
            self.row_state[row].last_graphics_char = byte;
        }
        self.write_cell(byte, row);
        self.cursor_col += 1;
        if self.cursor_col >= MODE7_COLS {
            self.advance_row();
        }
    }

    fn write_cell(&mut self, ch: u8, row: usize) {
        let st = self.row_state[row];
        let cell = Mode7Cell {
            ch,
            fg: st.fg,
            bg: st.bg,
            flash: st.flash,
            double_height: st.double_height,
            graphics: st.graphics,
            separated: st.separated,
            held: st.hold_graphics,
            concealed: st.conceal,
        };
        if self.cursor_col < MODE7_COLS {
            self.cells[row * MODE7_COLS + self.cursor_col] = cell;
        }
    }

    fn advance_row(&mut self) {
        self.cursor_col = 0;
        if self.cursor_row + 1 < MODE7_ROWS {
            self.cursor_row += 1;
            self.row_state[self.cursor_row] = RowState::default();
        } else {
            self.scroll();
        }
    }

    fn scroll(&mut self) {
        self.cells.drain(0..MODE7_COLS);
        self.cells.resize(MODE7_COLS * MODE7_ROWS, Mode7Cell::default());
        self.row_state.rotate_left(1);
        self.row_state[MODE7_ROWS - 1] = RowState::default();
    }
}

impl Default for Mode7Screen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_code_sets_foreground_from_next_cell() {
        let mut screen = Mode7Screen::new();
        screen.put_char(1); // red
        screen.put_char(b'A');
        assert_eq!(screen.cell(1, 0).fg, TeletextColour::Red);
        assert_eq!(screen.cell(1, 0).ch, b'A');
    }

    #[test]
    fn control_code_cell_itself_is_blank() {
        let mut screen = Mode7Screen::new();
        screen.put_char(2);
        assert_eq!(screen.cell(0, 0).ch, b' ');
    }

    #[test]
    fn newline_advances_row_and_resets_column() {
        let mut screen = Mode7Screen::new();
        screen.put_char(b'A');
        screen.put_char(0x0A);
        assert_eq!(screen.cursor_row, 1);
        assert_eq!(screen.cursor_col, 0);
    }

    #[test]
    fn double_height_flag_is_set_after() {
        let mut screen = Mode7Screen::new();
        screen.put_char(0x0B);
        screen.put_char(b'X');
        assert!(screen.cell(1, 0).double_height);
    }

    #[test]
    fn cls_resets_all_cells_and_cursor() {
        let mut screen = Mode7Screen::new();
        screen.put_char(b'A');
        screen.cls();
        assert_eq!(screen.cell(0, 0).ch, b' ');
        assert_eq!(screen.cursor_col, 0);
    }
}
