use tiny_skia::{Pixmap, PremultipliedColorU8};

use crate::config::Colors;
use crate::geometry::{Dimensions, Orientation};

/// Draws the bar for `value` out of `max`. Every pixel of the
/// `width × height` area is written, so repeated calls give identical output.
pub fn draw(pixmap: &mut Pixmap, dims: &Dimensions, colors: &Colors, value: u64, max: u64) {
    let bg = colors.background.premultiply().to_pixel();
    let border = colors.border.premultiply().to_pixel();
    let bar = colors.bar.premultiply().to_pixel();

    let (w, h) = (dims.width, dims.height);
    fill_rect(pixmap, 0, 0, w, h, bg);

    let mut offset = dims.border_offset;
    fill_inset(pixmap, w, h, offset, border);
    offset = offset.saturating_add(dims.border_size);
    fill_inset(pixmap, w, h, offset, bg);

    offset = offset.saturating_add(dims.bar_padding);
    let bar_w = w.saturating_sub(offset.saturating_mul(2));
    let bar_h = h.saturating_sub(offset.saturating_mul(2));
    match dims.orientation {
        Orientation::Horizontal => {
            let filled = filled_length(bar_w, value, max);
            fill_rect(pixmap, offset, offset, filled, bar_h, bar);
            fill_rect(pixmap, offset + filled, offset, bar_w - filled, bar_h, bg);
        }
        Orientation::Vertical => {
            let filled = filled_length(bar_h, value, max);
            let empty = bar_h - filled;
            fill_rect(pixmap, offset, offset, bar_w, empty, bg);
            fill_rect(pixmap, offset, offset + empty, bar_w, filled, bar);
        }
    }
}

/// `floor(length × value / max)`, never longer than `length`.
pub fn filled_length(length: u32, value: u64, max: u64) -> u32 {
    if max == 0 {
        return 0;
    }
    let filled = length as u128 * value.min(max) as u128 / max as u128;
    filled as u32
}

fn fill_inset(pixmap: &mut Pixmap, w: u32, h: u32, inset: u32, c: PremultipliedColorU8) {
    let twice = inset.saturating_mul(2);
    fill_rect(pixmap, inset, inset, w.saturating_sub(twice), h.saturating_sub(twice), c);
}

fn fill_rect(pixmap: &mut Pixmap, x: u32, y: u32, w: u32, h: u32, c: PremultipliedColorU8) {
    let (pw, ph) = (pixmap.width(), pixmap.height());
    let x_end = x.saturating_add(w).min(pw);
    let y_end = y.saturating_add(h).min(ph);
    if x >= x_end || y >= y_end {
        return;
    }
    let pixels = pixmap.pixels_mut();
    for py in y..y_end {
        let row = py as usize * pw as usize;
        pixels[row + x as usize..row + x_end as usize].fill(c);
    }
}

/// Copies premultiplied RGBA into an ARGB8888 (little endian BGRA) canvas.
pub fn blit_argb8888(pixmap: &Pixmap, canvas: &mut [u8]) {
    for (dst, src) in canvas.chunks_exact_mut(4).zip(pixmap.data().chunks_exact(4)) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
        dst[3] = src[3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::config::Config;
    use crate::style::resolve;

    const BLACK: (u8, u8, u8, u8) = (0, 0, 0, 255);
    const WHITE: (u8, u8, u8, u8) = (255, 255, 255, 255);

    fn at(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let p = pixmap.pixel(x, y).unwrap();
        (p.red(), p.green(), p.blue(), p.alpha())
    }

    fn render(dims: &Dimensions, colors: &Colors, value: u64, max: u64) -> Pixmap {
        let mut pixmap = Pixmap::new(dims.width, dims.height).unwrap();
        draw(&mut pixmap, dims, colors, value, max);
        pixmap
    }

    fn count_row(pixmap: &Pixmap, y: u32, color: (u8, u8, u8, u8)) -> u32 {
        (0..pixmap.width()).filter(|&x| at(pixmap, x, y) == color).count() as u32
    }

    fn red_green_blue() -> Colors {
        Colors { background: Color::new(1.0, 0.0, 0.0, 1.0), border: Color::new(0.0, 1.0, 0.0, 1.0), bar: Color::new(0.0, 0.0, 1.0, 1.0) }
    }

    #[test]
    fn quarter_bar_over_black_with_white_ring() {
        let config = Config::default();
        let r = resolve(&config, 25, None);
        assert_eq!(r.value, 25);
        let dims = config.dimensions;
        let pixmap = render(&dims, &r.colors, r.value, config.max);

        // 400x50, offset 4, border 4, padding 4: bar area 376x26 at (12, 12)
        assert_eq!(at(&pixmap, 0, 0), BLACK);
        assert_eq!(at(&pixmap, 3, 25), BLACK);
        assert_eq!(at(&pixmap, 4, 4), WHITE);
        assert_eq!(at(&pixmap, 7, 25), WHITE);
        assert_eq!(at(&pixmap, 395, 45), WHITE);
        assert_eq!(at(&pixmap, 8, 8), BLACK);
        assert_eq!(at(&pixmap, 11, 25), BLACK);
        assert_eq!(at(&pixmap, 12, 12), WHITE);
        assert_eq!(at(&pixmap, 12 + 93, 37), WHITE);
        assert_eq!(at(&pixmap, 12 + 94, 25), BLACK);
        assert_eq!(at(&pixmap, 12, 38), BLACK);

        // Row through the bar: ring on both sides plus 94 bar pixels
        assert_eq!(count_row(&pixmap, 25, WHITE), 4 + 4 + 94);
        // Row through the ring's top edge
        assert_eq!(count_row(&pixmap, 5, WHITE), 392);
    }

    #[test]
    fn draw_is_idempotent() {
        let dims = Dimensions { width: 64, height: 20, border_offset: 1, border_size: 2, bar_padding: 3, orientation: Orientation::Horizontal };
        let colors = Colors { background: "#10203040".parse().unwrap(), border: "#ffffff80".parse().unwrap(), bar: "#00ff00ff".parse().unwrap() };
        let mut pixmap = render(&dims, &colors, 37, 100);
        let first = pixmap.data().to_vec();
        draw(&mut pixmap, &dims, &colors, 37, 100);
        assert_eq!(pixmap.data(), &first[..]);
        // Stale content from a different frame is fully overwritten too
        draw(&mut pixmap, &dims, &red_green_blue(), 90, 100);
        draw(&mut pixmap, &dims, &colors, 37, 100);
        assert_eq!(pixmap.data(), &first[..]);
    }

    #[test]
    fn colors_are_premultiplied() {
        let dims = Dimensions { width: 30, height: 30, border_offset: 2, border_size: 2, bar_padding: 2, orientation: Orientation::Horizontal };
        let colors = Colors { background: "#ff000080".parse().unwrap(), border: Color::WHITE, bar: Color::WHITE };
        let pixmap = render(&dims, &colors, 0, 100);
        assert_eq!(at(&pixmap, 0, 0), (128, 0, 0, 128));
    }

    #[test]
    fn bar_length_boundaries() {
        let rgb = red_green_blue();
        let blue = (0, 0, 255, 255);
        let dims = Dimensions { width: 110, height: 20, border_offset: 1, border_size: 1, bar_padding: 3, orientation: Orientation::Horizontal };
        // inner bar is 100 pixels wide
        assert_eq!(count_row(&render(&dims, &rgb, 0, 100), 10, blue), 0);
        assert_eq!(count_row(&render(&dims, &rgb, 100, 100), 10, blue), 100);
        let half = count_row(&render(&dims, &rgb, 50, 100), 10, blue);
        assert!(half.abs_diff(50) <= 1);
        let odd = Dimensions { width: 111, ..dims };
        let half = count_row(&render(&odd, &rgb, 50, 100), 10, blue);
        assert!(half.abs_diff(101 / 2) <= 1);
    }

    #[test]
    fn vertical_fills_from_the_bottom() {
        let rgb = red_green_blue();
        let blue = (0, 0, 255, 255);
        let red = (255, 0, 0, 255);
        let dims = Dimensions { width: 20, height: 110, border_offset: 1, border_size: 1, bar_padding: 3, orientation: Orientation::Vertical };
        let pixmap = render(&dims, &rgb, 30, 100);
        // bar spans y in 5..105, 30 filled pixels at the bottom
        assert_eq!(at(&pixmap, 10, 104), blue);
        assert_eq!(at(&pixmap, 10, 75), blue);
        assert_eq!(at(&pixmap, 10, 74), red);
        assert_eq!(at(&pixmap, 10, 5), red);
        assert_eq!(at(&pixmap, 5, 104), blue);
        assert_eq!(at(&pixmap, 14, 104), blue);
        assert_eq!(at(&pixmap, 15, 104), red);
    }

    #[test]
    fn degenerate_geometry_does_not_panic() {
        let rgb = red_green_blue();
        let dims = Dimensions { width: 6, height: 6, border_offset: 2, border_size: 2, bar_padding: 2, orientation: Orientation::Horizontal };
        let pixmap = render(&dims, &rgb, 100, 100);
        assert!(pixmap.pixels().iter().all(|p| p.blue() == 0));
        let dims = Dimensions { orientation: Orientation::Vertical, border_offset: 50, ..dims };
        render(&dims, &rgb, 5, 10);
        // pixmap smaller than the geometry
        let mut small = Pixmap::new(3, 3).unwrap();
        draw(&mut small, &Dimensions::default(), &rgb, 50, 100);
        draw(&mut small, &Dimensions::default(), &rgb, 50, 0);
    }

    #[test]
    fn filled_length_rounds_down() {
        assert_eq!(filled_length(376, 25, 100), 94);
        assert_eq!(filled_length(10, 1, 3), 3);
        assert_eq!(filled_length(10, 7, 5), 10);
        assert_eq!(filled_length(10, 7, 0), 0);
    }

    #[test]
    fn blit_swaps_to_bgra() {
        let mut pixmap = Pixmap::new(1, 1).unwrap();
        pixmap.pixels_mut()[0] = Color::new(1.0, 0.5, 0.0, 1.0).premultiply().to_pixel();
        let mut canvas = [0u8; 4];
        blit_argb8888(&pixmap, &mut canvas);
        assert_eq!(canvas, [0, 128, 255, 255]);
    }
}
