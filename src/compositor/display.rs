use crate::foundation::core::{Point, Rect};
use crate::foundation::math::Frac;

/// Where the game screen and overlay land in the window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplayAreas {
    pub game: Rect,
    pub overlay: Rect,
}

/// Aspect ratio the game screen is shown at. Aspect correction stretches the classic
/// 320x200 and 640x400 modes to 4:3.
pub fn desired_aspect(game_w: u32, game_h: u32, correction: bool) -> Frac {
    if correction && matches!((game_w, game_h), (320, 200) | (640, 400)) {
        Frac::ratio(4, 3)
    } else {
        Frac::ratio(game_w as i64, game_h.max(1) as i64)
    }
}

/// Largest rect with `aspect` that fits the window, centred.
pub fn fit_rect(aspect: Frac, window_w: u32, window_h: u32) -> Rect {
    if window_w == 0 || window_h == 0 || aspect.0 <= 0 {
        return Rect::default();
    }
    let mut width = window_w as i64;
    let mut height = Frac::from_int(width).0 / aspect.0;
    if height > window_h as i64 {
        height = window_h as i64;
        width = aspect.mul_int(height).to_int();
    }
    let x = (window_w as i64 - width) / 2;
    let y = (window_h as i64 - height) / 2;
    Rect::from_xywh(x as i32, y as i32, width as i32, height as i32)
}

/// `size` centred in the window; may start at negative coordinates when it is larger.
pub fn centered(width: u32, height: u32, window_w: u32, window_h: u32) -> Rect {
    let x = (window_w as i32 - width as i32) / 2;
    let y = (window_h as i32 - height as i32) / 2;
    Rect::from_xywh(x, y, width as i32, height as i32)
}

pub fn compute_areas(
    game: Option<(u32, u32)>,
    overlay: Option<(u32, u32)>,
    window: (u32, u32),
    aspect_correction: bool,
) -> DisplayAreas {
    let game = game
        .filter(|(w, h)| *w > 0 && *h > 0)
        .map(|(w, h)| fit_rect(desired_aspect(w, h, aspect_correction), window.0, window.1))
        .unwrap_or_default();
    let overlay = overlay
        .map(|(w, h)| centered(w, h, window.0, window.1))
        .unwrap_or_default();
    DisplayAreas { game, overlay }
}

/// Shake offsets in game pixels, scaled to window pixels.
pub fn scale_shake(shake: Point, game_rect: Rect, game_w: u32, game_h: u32) -> Point {
    if game_w == 0 || game_h == 0 {
        return Point::default();
    }
    Point::new(
        (shake.x as i64 * game_rect.width() as i64 / game_w as i64) as i32,
        (shake.y as i64 * game_rect.height() as i64 / game_h as i64) as i32,
    )
}

/// Maps a game-screen coordinate to the window.
pub fn game_to_window(p: Point, game_rect: Rect, game_w: u32, game_h: u32) -> Point {
    if game_w == 0 || game_h == 0 {
        return p;
    }
    Point::new(
        game_rect.left + (p.x as i64 * game_rect.width() as i64 / game_w as i64) as i32,
        game_rect.top + (p.y as i64 * game_rect.height() as i64 / game_h as i64) as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_scale_fills_window() {
        let r = fit_rect(desired_aspect(320, 200, false), 640, 400);
        assert_eq!(r, Rect::from_xywh(0, 0, 640, 400));
    }

    #[test]
    fn pillarbox_when_window_is_wider() {
        let r = fit_rect(desired_aspect(320, 200, false), 800, 400);
        assert_eq!(r, Rect::from_xywh(80, 0, 640, 400));
    }

    #[test]
    fn aspect_correction_targets_four_by_three() {
        let r = fit_rect(desired_aspect(320, 200, true), 640, 480);
        assert_eq!(r.height(), 480);
        assert!((r.width() - 640).abs() <= 1);
        let plain = desired_aspect(256, 240, true);
        assert_eq!(plain, Frac::ratio(256, 240));
    }

    #[test]
    fn overlay_is_centred() {
        let areas = compute_areas(Some((320, 200)), Some((256, 200)), (200, 100), false);
        assert_eq!(areas.overlay, Rect::from_xywh(-28, -50, 256, 200));
    }

    #[test]
    fn shake_and_warp_scale_with_draw_rect() {
        let rect = Rect::from_xywh(80, 0, 640, 400);
        assert_eq!(scale_shake(Point::new(3, -2), rect, 320, 200), Point::new(6, -4));
        assert_eq!(
            game_to_window(Point::new(10, 10), rect, 320, 200),
            Point::new(100, 20)
        );
    }
}
