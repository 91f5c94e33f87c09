use std::rc::Rc;

use retrocomp::{
    CURSOR_MASK_INVERT, CURSOR_MASK_OPAQUE, CURSOR_MASK_TRANSPARENT, Compositor,
    CompositorSettings, CursorImage, FrameOutcome, OffscreenSurface, PixelFormat, Rect,
    SoftwareDevice,
};

fn live(width: u32, height: u32) -> (Compositor, OffscreenSurface) {
    let surface = OffscreenSurface::new(Rc::new(SoftwareDevice::new()), width, height).unwrap();
    let mut c = Compositor::new(CompositorSettings::default());
    c.on_create(Box::new(surface.clone())).unwrap();
    (c, surface)
}

/// Packs one straight-alpha colour in the overlay's format.
fn overlay_pixels(c: &Compositor, rgba: [u8; 4], count: usize) -> Vec<u8> {
    let format = c.overlay_format();
    let color = format.argb_to_color(rgba[3], rgba[0], rgba[1], rgba[2]);
    let mut out = vec![0u8; count * format.bpp()];
    for px in out.chunks_mut(format.bpp()) {
        format.write_pixel(px, color);
    }
    out
}

#[test]
fn indexed_paint_reaches_the_backbuffer() {
    let (mut c, surface) = live(320, 200);
    c.set_game_size(320, 200, Some(PixelFormat::CLUT8)).unwrap();
    c.set_palette(0, 2, &[0, 0, 0, 255, 0, 0]).unwrap();
    c.fill_screen(1).unwrap();

    assert_eq!(c.update_screen(), FrameOutcome::Presented);
    let frame = surface.readback().unwrap();
    assert_eq!(frame.pixel(160, 100), [255, 0, 0, 255]);
    assert_eq!(frame.pixel(0, 0), [255, 0, 0, 255]);
    assert_eq!(frame.pixel(319, 199), [255, 0, 0, 255]);
}

#[test]
fn key_colour_cursor_leaves_keyed_pixels_untouched() {
    let (mut c, surface) = live(320, 200);
    c.set_game_size(320, 200, None).unwrap();
    c.set_palette(0, 3, &[0, 0, 0, 255, 255, 255, 0, 0, 255])
        .unwrap();
    c.fill_screen(2).unwrap();

    c.set_cursor(&CursorImage {
        pixels: &[1, 0, 0, 1],
        width: 2,
        height: 2,
        hotspot_x: 0,
        hotspot_y: 0,
        key_color: 0,
        dont_scale: true,
        format: PixelFormat::CLUT8,
        mask: None,
    })
    .unwrap();
    c.set_cursor_visible(true);
    c.set_cursor_pos(10, 10);

    assert_eq!(c.update_screen(), FrameOutcome::Presented);
    let frame = surface.readback().unwrap();
    let white = [255, 255, 255, 255];
    let blue = [0, 0, 255, 255];
    assert_eq!(frame.pixel(10, 10), white);
    assert_eq!(frame.pixel(11, 11), white);
    assert_eq!(frame.pixel(11, 10), blue);
    assert_eq!(frame.pixel(10, 11), blue);
    assert_eq!(frame.pixel(12, 12), blue);
}

#[test]
fn row_major_cursor_pattern() {
    let (mut c, surface) = live(320, 200);
    c.set_game_size(320, 200, None).unwrap();
    c.set_palette(0, 3, &[0, 0, 0, 255, 255, 255, 0, 0, 255])
        .unwrap();
    c.fill_screen(2).unwrap();
    c.set_cursor(&CursorImage {
        pixels: &[1, 0, 1, 0],
        width: 2,
        height: 2,
        hotspot_x: 0,
        hotspot_y: 0,
        key_color: 0,
        dont_scale: true,
        format: PixelFormat::CLUT8,
        mask: None,
    })
    .unwrap();
    c.set_cursor_visible(true);
    c.set_cursor_pos(10, 10);

    assert_eq!(c.update_screen(), FrameOutcome::Presented);
    let frame = surface.readback().unwrap();
    assert_eq!(frame.pixel(10, 10), [255, 255, 255, 255]);
    assert_eq!(frame.pixel(10, 11), [255, 255, 255, 255]);
    assert_eq!(frame.pixel(11, 10), [0, 0, 255, 255]);
    assert_eq!(frame.pixel(11, 11), [0, 0, 255, 255]);
}

#[test]
fn invert_mask_inverts_the_overlay_underneath() {
    let (mut c, surface) = live(320, 200);
    let (ow, oh) = (c.overlay_width(), c.overlay_height());
    let green = overlay_pixels(&c, [0, 255, 0, 255], (ow * oh) as usize);
    let pitch = ow as usize * c.overlay_format().bpp();
    c.copy_rect_to_overlay(&green, pitch, 0, 0, ow, oh).unwrap();
    c.show_overlay(false);

    let format = PixelFormat::RGBA8888;
    let mut pixel = [0u8; 4];
    format.write_pixel(&mut pixel, format.argb_to_color(255, 10, 20, 30));
    c.set_cursor(&CursorImage {
        pixels: &pixel,
        width: 1,
        height: 1,
        hotspot_x: 0,
        hotspot_y: 0,
        key_color: 0,
        dont_scale: true,
        format,
        mask: Some(&[CURSOR_MASK_INVERT]),
    })
    .unwrap();
    assert!(c.has_cursor_mask());
    c.set_cursor_visible(true);
    c.set_cursor_pos(50, 50);

    assert_eq!(c.update_screen(), FrameOutcome::Presented);
    let frame = surface.readback().unwrap();
    assert_eq!(frame.pixel(50, 50), [255, 0, 255, 255]);
    assert_eq!(frame.pixel(51, 50), [0, 255, 0, 255]);
    assert_eq!(frame.pixel(49, 49), [0, 255, 0, 255]);
}

/// Game screen of blue (index 2) over a palette of black, white, blue.
fn blue_game(c: &mut Compositor, width: u32, height: u32) {
    c.set_game_size(width, height, None).unwrap();
    c.set_palette(0, 3, &[0, 0, 0, 255, 255, 255, 0, 0, 255])
        .unwrap();
    c.fill_screen(2).unwrap();
}

fn rgba8888(pixels: &[[u8; 4]]) -> Vec<u8> {
    let format = PixelFormat::RGBA8888;
    let mut out = vec![0u8; pixels.len() * 4];
    for (px, [r, g, b, a]) in out.chunks_mut(4).zip(pixels) {
        format.write_pixel(px, format.argb_to_color(*a, *r, *g, *b));
    }
    out
}

#[test]
fn opaque_mask_keeps_cursor_and_transparent_mask_keeps_screen() {
    let (mut c, surface) = live(320, 200);
    blue_game(&mut c, 320, 200);
    let pixels = rgba8888(&[[255, 255, 255, 255], [255, 255, 255, 255]]);
    c.set_cursor(&CursorImage {
        pixels: &pixels,
        width: 2,
        height: 1,
        hotspot_x: 0,
        hotspot_y: 0,
        key_color: 0,
        dont_scale: true,
        format: PixelFormat::RGBA8888,
        mask: Some(&[CURSOR_MASK_OPAQUE, CURSOR_MASK_TRANSPARENT]),
    })
    .unwrap();
    c.set_cursor_visible(true);
    c.set_cursor_pos(10, 10);

    assert_eq!(c.update_screen(), FrameOutcome::Presented);
    let frame = surface.readback().unwrap();
    assert_eq!(frame.pixel(10, 10), [255, 255, 255, 255]);
    assert_eq!(frame.pixel(11, 10), [0, 0, 255, 255]);
    assert_eq!(frame.pixel(12, 10), [0, 0, 255, 255]);
}

#[test]
fn zero_sized_cursor_removes_cursor_and_mask() {
    let (mut c, surface) = live(320, 200);
    blue_game(&mut c, 320, 200);
    let pixels = rgba8888(&[[255, 0, 0, 255]]);
    c.set_cursor(&CursorImage {
        pixels: &pixels,
        width: 1,
        height: 1,
        hotspot_x: 0,
        hotspot_y: 0,
        key_color: 0,
        dont_scale: true,
        format: PixelFormat::RGBA8888,
        mask: Some(&[CURSOR_MASK_OPAQUE]),
    })
    .unwrap();
    c.set_cursor_visible(true);
    c.set_cursor_pos(10, 10);
    assert_eq!(c.update_screen(), FrameOutcome::Presented);
    assert_eq!(surface.readback().unwrap().pixel(10, 10), [255, 0, 0, 255]);

    c.set_cursor(&CursorImage {
        pixels: &[],
        width: 0,
        height: 0,
        hotspot_x: 0,
        hotspot_y: 0,
        key_color: 0,
        dont_scale: true,
        format: PixelFormat::RGBA8888,
        mask: None,
    })
    .unwrap();
    assert!(!c.has_cursor());
    assert!(!c.has_cursor_mask());
    assert!(c.is_cursor_visible());
    assert_eq!(c.update_screen(), FrameOutcome::Presented);
    assert_eq!(surface.readback().unwrap().pixel(10, 10), [0, 0, 255, 255]);
}

#[test]
fn scalable_cursor_follows_game_scale_with_a_transparent_border() {
    let (mut c, surface) = live(320, 200);
    blue_game(&mut c, 160, 100);
    assert_eq!(c.game_draw_rect(), Rect::from_xywh(0, 0, 320, 200));
    c.set_cursor(&CursorImage {
        pixels: &[1, 1],
        width: 2,
        height: 1,
        hotspot_x: 1,
        hotspot_y: 0,
        key_color: 0,
        dont_scale: false,
        format: PixelFormat::CLUT8,
        mask: None,
    })
    .unwrap();
    // 4x3 with the border, hotspot (2, 1), both doubled.
    let metrics = c.cursor_metrics();
    assert_eq!((metrics.hotspot.x, metrics.hotspot.y), (4, 2));
    assert_eq!((metrics.width, metrics.height), (8.0, 6.0));

    c.set_cursor_visible(true);
    c.set_cursor_pos(100, 50);
    assert_eq!(c.update_screen(), FrameOutcome::Presented);
    let frame = surface.readback().unwrap();
    let white = [255, 255, 255, 255];
    let blue = [0, 0, 255, 255];
    // The hotspot texel covers (100..102, 50..52); the first texel sits left of it.
    assert_eq!(frame.pixel(98, 50), white);
    assert_eq!(frame.pixel(101, 51), white);
    assert_eq!(frame.pixel(97, 50), blue);
    assert_eq!(frame.pixel(102, 50), blue);
    assert_eq!(frame.pixel(100, 49), blue);
    assert_eq!(frame.pixel(100, 52), blue);
}

#[test]
fn half_transparent_overlay_blends_over_the_game() {
    let (mut c, surface) = live(320, 200);
    c.set_game_size(320, 200, None).unwrap();
    c.set_palette(0, 2, &[0, 0, 0, 255, 255, 255]).unwrap();
    c.fill_screen(1).unwrap();

    c.clear_overlay().unwrap();
    let red = overlay_pixels(&c, [255, 0, 0, 128], 16 * 16);
    let pitch = 16 * c.overlay_format().bpp();
    c.copy_rect_to_overlay(&red, pitch, 8, 8, 16, 16).unwrap();
    c.show_overlay(false);

    assert_eq!(c.update_screen(), FrameOutcome::Presented);
    let frame = surface.readback().unwrap();
    let a = 128.0 / 255.0;
    let expected_gb = (255.0 * (1.0 - a)) as i32;
    let [r, g, b, alpha] = frame.pixel(12, 12);
    assert_eq!(r, 255);
    assert!((g as i32 - expected_gb).abs() <= 1, "g = {g}");
    assert!((b as i32 - expected_gb).abs() <= 1, "b = {b}");
    assert_eq!(alpha, 255);
    // Cleared overlay pixels are fully transparent.
    assert_eq!(frame.pixel(100, 100), [255, 255, 255, 255]);
}

#[test]
fn resize_bumps_screen_change_id_and_clamps_overlay() {
    let (mut c, surface) = live(320, 200);
    let before = c.screen_change_id();
    surface.resize(640, 400).unwrap();
    c.resize(640, 400).unwrap();
    assert!(c.screen_change_id() > before);
    assert!(c.overlay_width() >= 256 && c.overlay_height() >= 200);

    let before = c.screen_change_id();
    surface.resize(100, 80).unwrap();
    c.resize(100, 80).unwrap();
    assert!(c.screen_change_id() > before);
    assert_eq!((c.overlay_width(), c.overlay_height()), (256, 200));
    assert_eq!(c.window_size(), (100, 80));

    assert_eq!(c.update_screen(), FrameOutcome::Presented);
    let frame = surface.readback().unwrap();
    assert_eq!((frame.width, frame.height), (100, 80));
}

#[test]
fn context_loss_reuploads_every_edit() {
    let (mut c, _first) = live(32, 32);
    c.set_game_size(32, 32, None).unwrap();
    c.set_palette(0, 3, &[0, 0, 0, 255, 0, 0, 0, 255, 0]).unwrap();
    c.fill_screen(1).unwrap();
    assert_eq!(c.update_screen(), FrameOutcome::Presented);

    c.on_destroy();
    c.fill_screen_rect(Rect::from_xywh(0, 0, 16, 32), 2).unwrap();
    assert_eq!(c.update_screen(), FrameOutcome::NoContext);

    let second = OffscreenSurface::new(Rc::new(SoftwareDevice::new()), 32, 32).unwrap();
    c.on_create(Box::new(second.clone())).unwrap();
    assert_eq!(c.update_screen(), FrameOutcome::Presented);
    let frame = second.readback().unwrap();
    assert_eq!(frame.pixel(4, 4), [0, 255, 0, 255]);
    assert_eq!(frame.pixel(15, 31), [0, 255, 0, 255]);
    assert_eq!(frame.pixel(16, 0), [255, 0, 0, 255]);
    assert_eq!(frame.pixel(31, 31), [255, 0, 0, 255]);
}
