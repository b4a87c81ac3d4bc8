//! Graphics primitives (component C9): line drawing, polygon fill, ellipses,
//! flood fill, and rectangular block copy over a [`Framebuffer`].
//!
//! Grounded on `instructions.rs`'s addressing-mode helpers: small, pure
//! functions each handling exactly one geometric case, called from the
//! `PLOT` dispatcher (`exec.rs`) the way the teacher's decoder calls one
//! addressing helper per `EAMode` variant.

use crate::framebuffer::Framebuffer;
use crate::palette::{PlotAction, Rgb};

#[derive(Debug, Clone, Copy)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// `PLOT` line styles implied by `spec.md` §4.9's plot-code low bits: solid,
/// or omitting the final point (used when a path continues into the next
/// `PLOT`).
pub fn line(fb: &mut Framebuffer, from: Point, to: Point, colour: Rgb, action: PlotAction, omit_last: bool) {
    let (mut x0, mut y0) = (from.x, from.y);
    let (x1, y1) = (to.x, to.y);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        if !(omit_last && x0 == x1 && y0 == y1) {
            fb.set_pixel(x0, y0, colour, action);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Fills a triangle (the dialect's `PLOT 85`/"fill triangle" family reduces
/// to this), scanline-rasterized so interior fill never retraces the
/// outline edges twice (spec.md §4.9).
pub fn fill_triangle(fb: &mut Framebuffer, a: Point, b: Point, c: Point, colour: Rgb, action: PlotAction) {
    let mut pts = [a, b, c];
    pts.sort_by_key(|p| p.y);
    let [p0, p1, p2] = pts;

    let edge_x = |y: i32, from: Point, to: Point| -> Option<f64> {
        if from.y == to.y {
            return None;
        }
        let t = (y - from.y) as f64 / (to.y - from.y) as f64;
        Some(from.x as f64 + t * (to.x - from.x) as f64)
    };

    for y in p0.y..=p2.y {
        let mut xs = Vec::new();
        if let Some(x) = edge_x(y, p0, p2) {
            xs.push(x);
        }
        if y <= p1.y {
            if let Some(x) = edge_x(y, p0, p1) {
                xs.push(x);
            }
        } else if let Some(x) = edge_x(y, p1, p2) {
            xs.push(x);
        }
        if xs.len() < 2 {
            continue;
        }
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let (x0, x1) = (xs[0].round() as i32, xs[xs.len() - 1].round() as i32);
        for x in x0..=x1 {
            fb.set_pixel(x, y, colour, action);
        }
    }
}

/// Fills an axis-aligned rectangle (`PLOT`'s "rectangle fill" variants and
/// the `RECTANGLE FILL` statement both reduce to this).
pub fn fill_rectangle(fb: &mut Framebuffer, a: Point, b: Point, colour: Rgb, action: PlotAction) {
    let (x0, x1) = (a.x.min(b.x), a.x.max(b.x));
    let (y0, y1) = (a.y.min(b.y), a.y.max(b.y));
    for y in y0..=y1 {
        for x in x0..=x1 {
            fb.set_pixel(x, y, colour, action);
        }
    }
}

/// Midpoint ellipse, either outlined or filled, covering both `PLOT`
/// circle variants (a circle is an ellipse with equal radii) and the
/// `CIRCLE`/`ELLIPSE` statements (spec.md §4.9).
pub fn ellipse(fb: &mut Framebuffer, centre: Point, rx: i32, ry: i32, colour: Rgb, action: PlotAction, filled: bool) {
    if rx <= 0 || ry <= 0 {
        fb.set_pixel(centre.x, centre.y, colour, action);
        return;
    }
    let plot4 = |fb: &mut Framebuffer, x: i32, y: i32| {
        if filled {
            for sx in (centre.x - x)..=(centre.x + x) {
                fb.set_pixel(sx, centre.y + y, colour, action);
                fb.set_pixel(sx, centre.y - y, colour, action);
            }
        } else {
            fb.set_pixel(centre.x + x, centre.y + y, colour, action);
            fb.set_pixel(centre.x - x, centre.y + y, colour, action);
            fb.set_pixel(centre.x + x, centre.y - y, colour, action);
            fb.set_pixel(centre.x - x, centre.y - y, colour, action);
        }
    };

    let (rx2, ry2) = (rx as i64 * rx as i64, ry as i64 * ry as i64);
    let mut x = 0i32;
    let mut y = ry;
    let mut px = 0i64;
    let mut py = 2 * rx2 as i64 * y as i64;
    plot4(fb, x, y);

    let mut p = ry2 as i64 - rx2 as i64 * ry as i64 + rx2 as i64 / 4;
    while px < py {
        x += 1;
        px += 2 * ry2 as i64;
        if p < 0 {
            p += ry2 as i64 + px;
        } else {
            y -= 1;
            py -= 2 * rx2 as i64;
            p += ry2 as i64 + px - py;
        }
        plot4(fb, x, y);
    }

    let mut p = ry2 as i64 * (x as i64 + 1) * (x as i64 + 1)
        / 4
        + rx2 as i64 * (y as i64 - 1) * (y as i64 - 1)
        - rx2 as i64 * ry2 as i64;
    while y > 0 {
        y -= 1;
        py -= 2 * rx2 as i64;
        if p > 0 {
            p += rx2 as i64 - py;
        } else {
            x += 1;
            px += 2 * ry2 as i64;
            p += rx2 as i64 - py + px;
        }
        plot4(fb, x, y);
    }
}

/// Flood fill, four-connected, stopping at the boundary colour (`PLOT`'s
/// flood-fill variants and the `FILL` statement, spec.md §4.9). Bounded to
/// the framebuffer's own dimensions, so a fill on an already-filled region
/// (boundary colour == fill colour) terminates immediately rather than
/// looping.
pub fn flood_fill(fb: &mut Framebuffer, start: Point, boundary: Rgb, fill_colour: Rgb, action: PlotAction) {
    if fb.get_pixel(start.x, start.y) == Some(boundary) || fb.get_pixel(start.x, start.y) == Some(fill_colour) {
        return;
    }
    let mut stack = vec![start];
    let width = fb.width() as i32;
    let height = fb.height() as i32;
    while let Some(p) = stack.pop() {
        if p.x < 0 || p.y < 0 || p.x >= width || p.y >= height {
            continue;
        }
        match fb.get_pixel(p.x, p.y) {
            Some(c) if c == boundary || c == fill_colour => continue,
            None => continue,
            _ => {}
        }
        fb.set_pixel(p.x, p.y, fill_colour, action);
        stack.push(Point { x: p.x + 1, y: p.y });
        stack.push(Point { x: p.x - 1, y: p.y });
        stack.push(Point { x: p.x, y: p.y + 1 });
        stack.push(Point { x: p.x, y: p.y - 1 });
    }
}

/// Block copy/move a rectangular region (`PLOT`'s "copy rectangle" family,
/// spec.md §4.9). Reads the whole source region before writing so an
/// overlapping move never reads back its own already-written pixels.
pub fn copy_rectangle(fb: &mut Framebuffer, src_origin: Point, dst_origin: Point, width: i32, height: i32, action: PlotAction) {
    let mut buffer = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            buffer.push(fb.get_pixel(src_origin.x + x, src_origin.y + y).unwrap_or(Rgb::BLACK));
        }
    }
    for y in 0..height {
        for x in 0..width {
            let colour = buffer[(y * width + x) as usize];
            fb.set_pixel(dst_origin.x + x, dst_origin.y + y, colour, action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizontal_line_fills_every_x() {
        let mut fb = Framebuffer::new(0);
        line(&mut fb, Point { x: 0, y: 0 }, Point { x: 10, y: 0 }, Rgb::WHITE, PlotAction::Overwrite, false);
        for x in 0..=10 {
            assert_eq!(fb.get_pixel(x, 0), Some(Rgb::WHITE));
        }
    }

    #[test]
    fn fill_rectangle_covers_interior() {
        let mut fb = Framebuffer::new(0);
        fill_rectangle(&mut fb, Point { x: 2, y: 2 }, Point { x: 5, y: 5 }, Rgb::WHITE, PlotAction::Overwrite);
        assert_eq!(fb.get_pixel(3, 3), Some(Rgb::WHITE));
    }

    #[test]
    fn xor_self_inverse_restores_original() {
        let mut fb = Framebuffer::new(0);
        fb.set_pixel(4, 4, Rgb::WHITE, PlotAction::Overwrite);
        let before = fb.get_pixel(4, 4);
        fill_rectangle(&mut fb, Point { x: 0, y: 0 }, Point { x: 10, y: 10 }, Rgb::WHITE, PlotAction::Eor);
        fill_rectangle(&mut fb, Point { x: 0, y: 0 }, Point { x: 10, y: 10 }, Rgb::WHITE, PlotAction::Eor);
        assert_eq!(fb.get_pixel(4, 4), before);
    }

    #[test]
    fn flood_fill_stops_at_boundary() {
        let mut fb = Framebuffer::new(0);
        fb.clear(Rgb::BLACK);
        fill_rectangle(&mut fb, Point { x: 10, y: 10 }, Point { x: 20, y: 20 }, Rgb::WHITE, PlotAction::Overwrite);
        flood_fill(&mut fb, Point { x: 15, y: 15 }, Rgb::WHITE, Rgb(1, 2, 3), PlotAction::Overwrite);
        assert_eq!(fb.get_pixel(15, 15), Some(Rgb(1, 2, 3)));
        assert_eq!(fb.get_pixel(0, 0), Some(Rgb::BLACK));
    }

    #[test]
    fn copy_rectangle_duplicates_region() {
        let mut fb = Framebuffer::new(0);
        fb.set_pixel(1, 1, Rgb(9, 9, 9), PlotAction::Overwrite);
        copy_rectangle(&mut fb, Point { x: 0, y: 0 }, Point { x: 50, y: 50 }, 3, 3, PlotAction::Overwrite);
        assert_eq!(fb.get_pixel(51, 51), Some(Rgb(9, 9, 9)));
    }
}
