#[cfg(feature = "gpu")]
mod gpu_smoke {
    use std::rc::Rc;

    use retrocomp::gpu::WgpuDevice;
    use retrocomp::{
        Compositor, CompositorSettings, FrameOutcome, OffscreenSurface, PixelFormat,
    };

    fn device() -> Option<Rc<WgpuDevice>> {
        match WgpuDevice::new_headless() {
            Ok(d) => Some(Rc::new(d)),
            Err(e) if e.to_string().contains("no gpu adapter available") => None,
            Err(e) => panic!("unexpected gpu device error: {e}"),
        }
    }

    #[test]
    fn indexed_frame_matches_palette() {
        let Some(device) = device() else {
            return;
        };
        let surface = OffscreenSurface::new(device, 64, 40).unwrap();
        let mut c = Compositor::new(CompositorSettings::default());
        c.on_create(Box::new(surface.clone())).unwrap();
        c.set_game_size(64, 40, Some(PixelFormat::CLUT8)).unwrap();
        c.set_palette(0, 2, &[0, 0, 0, 255, 0, 0]).unwrap();
        c.fill_screen(1).unwrap();

        assert_eq!(c.update_screen(), FrameOutcome::Presented);
        let frame = surface.readback().unwrap();
        assert_eq!((frame.width, frame.height), (64, 40));
        let [r, g, b, a] = frame.pixel(32, 20);
        assert!(r >= 254 && g <= 1 && b <= 1 && a >= 254, "got {r},{g},{b},{a}");
    }

    #[test]
    fn traditional_blend_over_direct_screen() {
        let Some(device) = device() else {
            return;
        };
        let surface = OffscreenSurface::new(device, 256, 200).unwrap();
        let mut c = Compositor::new(CompositorSettings::default());
        c.on_create(Box::new(surface.clone())).unwrap();
        let format = PixelFormat::RGB565;
        c.set_game_size(256, 200, Some(format)).unwrap();
        c.fill_screen(format.rgb_to_color(255, 255, 255)).unwrap();

        let overlay = c.overlay_format();
        let mut px = vec![0u8; overlay.bpp()];
        overlay.write_pixel(&mut px, overlay.argb_to_color(128, 255, 0, 0));
        c.copy_rect_to_overlay(&px, overlay.bpp(), 0, 0, 1, 1)
            .unwrap();
        c.show_overlay(false);

        assert_eq!(c.update_screen(), FrameOutcome::Presented);
        let [r, g, _, a] = surface.readback().unwrap().pixel(0, 0);
        assert!(r >= 254 && a >= 254);
        assert!((120..=135).contains(&g), "g = {g}");
    }
}
