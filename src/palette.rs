//! Colour model (component C10): logical-to-physical colour mapping, `TINT`
//! blending, and the eight `GCOL`/`PLOT` pixel-combine actions.
//!
//! Grounded on `devices::ControlMode`: a small enum of hardware modes with a
//! `from_bits`-style constructor and an explicit default table, the same
//! shape `ColourDepth::default_palette` and `PlotAction::from_code` use here.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    /// Blends towards white by `tint` (spec.md §4.10: a 2-bit `TINT` value
    /// 0/64/128/192 scaled as a fraction of full brightness), used only in
    /// 256-colour mode where each logical colour carries its own tint bits.
    pub fn apply_tint(self, tint: u8) -> Rgb {
        let t = tint as u32;
        let blend = |c: u8| -> u8 { (((c as u32) * (255 - t) + 255 * t) / 255) as u8 };
        Rgb(blend(self.0), blend(self.1), blend(self.2))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourDepth {
    Two,
    Four,
    Eight,
    Sixteen,
    TwoFiftySix,
    TrueColour,
}

impl ColourDepth {
    pub fn logical_colours(self) -> u32 {
        match self {
            ColourDepth::Two => 2,
            ColourDepth::Four => 4,
            ColourDepth::Eight => 8,
            ColourDepth::Sixteen => 16,
            ColourDepth::TwoFiftySix => 256,
            ColourDepth::TrueColour => 1 << 24,
        }
    }

    /// Mask applied to a requested logical colour number before indexing the
    /// palette (spec.md §4.10: colours wrap modulo the mode's depth).
    pub fn mask(self) -> u32 {
        match self {
            ColourDepth::TrueColour => u32::MAX,
            other => other.logical_colours() - 1,
        }
    }
}

/// The eight basic RISC OS colours, in VDU 19 logical-colour order; every
/// depth's default palette is built by replicating and interpolating this
/// set (spec.md §4.10).
const BASIC_EIGHT: [Rgb; 8] =
    [Rgb::BLACK, Rgb(255, 0, 0), Rgb(0, 255, 0), Rgb(255, 255, 0), Rgb(0, 0, 255), Rgb(255, 0, 255), Rgb(0, 255, 255), Rgb::WHITE];

/// Logical-colour → physical-RGB table for one screen mode, with an
/// optional per-entry `TINT` (only meaningful in 256-colour mode).
#[derive(Clone)]
pub struct Palette {
    depth: ColourDepth,
    entries: Vec<Rgb>,
    tints: Vec<u8>,
}

impl Palette {
    pub fn new(depth: ColourDepth) -> Self {
        let n = depth.logical_colours().min(256) as usize;
        let entries = default_entries(depth, n);
        Palette { depth, entries, tints: vec![0; n] }
    }

    pub fn depth(&self) -> ColourDepth {
        self.depth
    }

    pub fn resolve(&self, logical: i32) -> Rgb {
        if self.depth == ColourDepth::TrueColour {
            let v = logical as u32;
            return Rgb((v >> 16) as u8, (v >> 8) as u8, v as u8);
        }
        let idx = (logical as u32 & self.depth.mask()) as usize % self.entries.len().max(1);
        self.entries[idx].apply_tint(self.tints[idx])
    }

    /// `VDU 19,l,p,0,0,0` / `COLOUR l,r,g,b`: reassigns a logical colour's
    /// physical RGB (spec.md §4.10).
    pub fn set_entry(&mut self, logical: u32, rgb: Rgb) {
        let len = self.entries.len().max(1);
        if let Some(slot) = self.entries.get_mut(logical as usize % len) {
            *slot = rgb;
        }
    }

    /// `TINT`: sets the 2-bit tint value (expressed here as the full 0-255
    /// blend amount spec.md uses for `apply_tint`) for one logical colour,
    /// valid only in 256-colour mode.
    pub fn set_tint(&mut self, logical: u32, tint: u8) {
        if self.depth != ColourDepth::TwoFiftySix {
            return;
        }
        let len = self.tints.len().max(1);
        if let Some(slot) = self.tints.get_mut(logical as usize % len) {
            *slot = tint;
        }
    }

    pub fn reset(&mut self) {
        let n = self.entries.len();
        self.entries = default_entries(self.depth, n);
        self.tints = vec![0; n];
    }
}

fn default_entries(depth: ColourDepth, n: usize) -> Vec<Rgb> {
    match depth {
        ColourDepth::Two => vec![Rgb::BLACK, Rgb::WHITE],
        ColourDepth::TrueColour => Vec::new(),
        _ => (0..n).map(|i| BASIC_EIGHT[i % 8]).collect(),
    }
}

/// `GCOL`'s plot-action codes 0-7 (spec.md §4.9): how a freshly computed
/// source pixel combines with the pixel already on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotAction {
    Overwrite,
    Or,
    And,
    Eor,
    Invert,
    Unchanged,
    AndNot,
    OrNot,
}

impl PlotAction {
    pub fn from_code(code: u8) -> Self {
        match code & 0x07 {
            0 => PlotAction::Overwrite,
            1 => PlotAction::Or,
            2 => PlotAction::And,
            3 => PlotAction::Eor,
            4 => PlotAction::Invert,
            5 => PlotAction::Unchanged,
            6 => PlotAction::AndNot,
            _ => PlotAction::OrNot,
        }
    }

    /// Combines `src` (the colour being plotted) with `dst` (the pixel
    /// already present), channel-wise as RISC OS graphics hardware does.
    pub fn combine(self, src: Rgb, dst: Rgb) -> Rgb {
        let f = |a: u8, b: u8| -> u8 {
            match self {
                PlotAction::Overwrite => a,
                PlotAction::Or => a | b,
                PlotAction::And => a & b,
                PlotAction::Eor => a ^ b,
                PlotAction::Invert => !b,
                PlotAction::Unchanged => b,
                PlotAction::AndNot => a & !b,
                PlotAction::OrNot => a | !b,
            }
        };
        Rgb(f(src.0, dst.0), f(src.1, dst.1), f(src.2, dst.2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_colour_default_is_black_and_white() {
        let palette = Palette::new(ColourDepth::Two);
        assert_eq!(palette.resolve(0), Rgb::BLACK);
        assert_eq!(palette.resolve(1), Rgb::WHITE);
    }

    #[test]
    fn logical_colour_wraps_modulo_depth() {
        let palette = Palette::new(ColourDepth::Four);
        assert_eq!(palette.resolve(0), palette.resolve(4));
    }

    #[test]
    fn tint_blends_toward_white() {
        let mut palette = Palette::new(ColourDepth::TwoFiftySix);
        palette.set_entry(1, Rgb(0, 0, 0));
        palette.set_tint(1, 255);
        assert_eq!(palette.resolve(1), Rgb::WHITE);
    }

    #[test]
    fn eor_plot_action_is_self_inverse() {
        let src = Rgb(200, 10, 5);
        let dst = Rgb(1, 2, 3);
        let once = PlotAction::Eor.combine(src, dst);
        let twice = PlotAction::Eor.combine(src, once);
        assert_eq!(twice, dst);
    }

    #[test]
    fn true_colour_decodes_rgb_from_the_logical_value() {
        let palette = Palette::new(ColourDepth::TrueColour);
        assert_eq!(palette.resolve(0x00FF8040), Rgb(0xFF, 0x80, 0x40));
    }
}
