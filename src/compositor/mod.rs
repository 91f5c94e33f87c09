//! The VM-facing compositor: game screen, overlay and cursor, drawn into the host's
//! presentation surface once per `update_screen`.

pub mod cursor;
pub mod display;
mod frame;
pub mod state;

pub use cursor::{
    CURSOR_MASK_INVERT, CURSOR_MASK_OPAQUE, CURSOR_MASK_TRANSPARENT, CursorImage, CursorMetrics,
};
pub use display::DisplayAreas;
pub use state::VideoState;

use crate::foundation::core::{Point, Rect};
use crate::foundation::error::{RetrocompError, RetrocompResult, TransactionFailures};
use crate::foundation::format::PixelFormat;
use crate::gpu::context::{GpuContext, SharedContext};
use crate::gpu::device::DeviceCaps;
use crate::gpu::framebuffer::Framebuffer;
use crate::gpu::pipeline::Pipeline;
use crate::gpu::shader::ShaderId;
use crate::gpu::soft::DEFAULT_MAX_TEXTURE_DIMENSION;
use crate::present::SurfaceProvider;
use crate::settings::{CompositorSettings, Feature};
use crate::surface::paletted::PALETTE_ENTRIES;
use crate::surface::{PixelBuffer, Surface};
use state::Transaction;

/// Lifecycle of the GPU side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextPhase {
    Uninitialised,
    Live,
    Lost,
}

/// What happened to one `update_screen` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Rendering failed; the next frame redraws everything.
    Dropped,
    /// No live context to draw with.
    NoContext,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub dropped: u64,
}

struct LiveContext {
    // Dropped before the provider so GPU objects go before the device's owner.
    pipeline: Pipeline,
    ctx: SharedContext,
    provider: Box<dyn SurfaceProvider>,
}

#[derive(Debug)]
struct CursorSurfaces {
    surface: Surface,
    mask: Option<Surface>,
    hotspot: Point,
    dont_scale: bool,
    key_color: u32,
    use_key: bool,
}

pub struct Compositor {
    settings: CompositorSettings,
    live: Option<LiveContext>,
    phase: ContextPhase,
    caps: Option<DeviceCaps>,

    current: VideoState,
    old: VideoState,
    transaction: Option<Transaction>,

    game_screen: Option<Surface>,
    game_palette: [u8; PALETTE_ENTRIES * 3],

    overlay: Option<Surface>,
    overlay_visible: bool,
    overlay_in_gui: bool,

    cursor: Option<CursorSurfaces>,
    cursor_palette: [u8; PALETTE_ENTRIES * 3],
    cursor_palette_enabled: bool,
    cursor_visible: bool,
    cursor_pos: Point,
    cursor_metrics: CursorMetrics,

    window: (u32, u32),
    areas: DisplayAreas,
    shake: Point,
    shake_scaled: Point,

    force_redraw: bool,
    cursor_needs_redraw: bool,
    screen_change_id: u64,
    stats: FrameStats,
    last_frame_error: Option<RetrocompError>,
}

/// Format used for the overlay, cursor masks, and cursors that need alpha.
fn alpha_format() -> PixelFormat {
    PixelFormat::native_rgba8()
}

fn check_palette_range(start: usize, count: usize, len: usize) -> RetrocompResult<()> {
    if start + count > PALETTE_ENTRIES {
        return Err(RetrocompError::usage(format!(
            "palette range {start}+{count} exceeds {PALETTE_ENTRIES} entries"
        )));
    }
    if len < count * 3 {
        return Err(RetrocompError::usage(format!(
            "palette data has {len} bytes, need {}",
            count * 3
        )));
    }
    Ok(())
}

impl Compositor {
    pub fn new(settings: CompositorSettings) -> Self {
        let current = VideoState {
            aspect_ratio_correction: settings.aspect_ratio_correction,
            filtering: settings.filtering,
            ..VideoState::default()
        };
        Self {
            settings,
            live: None,
            phase: ContextPhase::Uninitialised,
            caps: None,
            current,
            old: current,
            transaction: None,
            game_screen: None,
            game_palette: [0; PALETTE_ENTRIES * 3],
            overlay: None,
            overlay_visible: false,
            overlay_in_gui: false,
            cursor: None,
            cursor_palette: [0; PALETTE_ENTRIES * 3],
            cursor_palette_enabled: false,
            cursor_visible: false,
            cursor_pos: Point::default(),
            cursor_metrics: CursorMetrics::default(),
            window: (0, 0),
            areas: DisplayAreas::default(),
            shake: Point::default(),
            shake_scaled: Point::default(),
            force_redraw: true,
            cursor_needs_redraw: false,
            screen_change_id: 0,
            stats: FrameStats::default(),
            last_frame_error: None,
        }
    }

    pub fn settings(&self) -> &CompositorSettings {
        &self.settings
    }

    // ---- context lifecycle -------------------------------------------------------------

    /// Attaches a presentation surface and builds GPU state on its device. Every surface is
    /// re-uploaded in full on the next frame.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn on_create(&mut self, provider: Box<dyn SurfaceProvider>) -> RetrocompResult<()> {
        if self.phase == ContextPhase::Live {
            return Err(RetrocompError::usage("context is already live"));
        }
        let ctx = GpuContext::create(provider.device())?;
        let (w, h) = provider.window_size();
        let mut backbuffer = Framebuffer::backbuffer(&ctx, w.max(1), h.max(1));
        let [r, g, b, a] = self.settings.clear_color();
        backbuffer.set_clear_color(r, g, b, a);
        let mut pipeline = Pipeline::new(&ctx, "compositor", ShaderId::FragmentSample)?;
        pipeline.set_framebuffer(Some(backbuffer));

        self.caps = Some(ctx.caps());
        self.live = Some(LiveContext {
            pipeline,
            ctx,
            provider,
        });
        self.phase = ContextPhase::Live;
        self.for_each_surface(Surface::recreate);
        self.force_redraw = true;
        tracing::debug!(width = w, height = h, "context live");
        if w > 0 && h > 0 && ((w, h) != self.window || self.overlay.is_none()) {
            self.resize(w, h)?;
        }
        Ok(())
    }

    /// Releases every GPU object. Client-side pixels, palettes and state are kept.
    pub fn on_destroy(&mut self) {
        if self.phase != ContextPhase::Live {
            return;
        }
        self.for_each_surface(Surface::destroy);
        self.live = None;
        self.phase = ContextPhase::Lost;
        tracing::debug!("context lost");
    }

    pub fn context_phase(&self) -> ContextPhase {
        self.phase
    }

    pub fn device_caps(&self) -> Option<DeviceCaps> {
        self.caps
    }

    /// Texture limit of the last live device, or the software default before any.
    fn max_texture_dimension(&self) -> u32 {
        self.caps
            .map_or(DEFAULT_MAX_TEXTURE_DIMENSION, |c| c.max_texture_dimension)
    }

    pub fn hidpi_factor(&self) -> f32 {
        self.live
            .as_ref()
            .map(|l| l.provider.hidpi_factor())
            .unwrap_or(1.0)
    }

    fn for_each_surface(&mut self, mut f: impl FnMut(&mut Surface)) {
        if let Some(s) = self.game_screen.as_mut() {
            f(s);
        }
        if let Some(s) = self.overlay.as_mut() {
            f(s);
        }
        if let Some(c) = self.cursor.as_mut() {
            f(&mut c.surface);
            if let Some(m) = c.mask.as_mut() {
                f(m);
            }
        }
    }

    // ---- features ----------------------------------------------------------------------

    pub fn has_feature(&self, feature: Feature) -> bool {
        Feature::ALL.contains(&feature)
    }

    pub fn get_feature_state(&self, feature: Feature) -> bool {
        match feature {
            Feature::CursorPalette => self.cursor_palette_enabled,
            Feature::AspectRatioCorrection => self.current.aspect_ratio_correction,
            Feature::FilteringMode => self.current.filtering,
        }
    }

    /// Toggles a feature. Video features are staged when a transaction is open and applied
    /// through a transaction of their own otherwise.
    pub fn set_feature_state(&mut self, feature: Feature, enabled: bool) -> RetrocompResult<()> {
        match feature {
            Feature::CursorPalette => {
                self.cursor_palette_enabled = enabled;
                self.update_cursor_palette()?;
                self.cursor_needs_redraw = true;
                Ok(())
            }
            Feature::AspectRatioCorrection | Feature::FilteringMode => {
                let implicit = self.transaction.is_none();
                if implicit {
                    self.begin_gfx_transaction()?;
                }
                if feature == Feature::AspectRatioCorrection {
                    self.current.aspect_ratio_correction = enabled;
                } else {
                    self.current.filtering = enabled;
                }
                if implicit {
                    self.end_gfx_transaction()?;
                }
                Ok(())
            }
        }
    }

    // ---- transactions ------------------------------------------------------------------

    pub fn begin_gfx_transaction(&mut self) -> RetrocompResult<()> {
        if self.transaction.is_some() {
            return Err(RetrocompError::usage("graphics transaction already open"));
        }
        self.old = self.current;
        self.transaction = Some(Transaction::default());
        Ok(())
    }

    /// Stages a game screen size and format. `None` means CLUT8.
    pub fn init_size(
        &mut self,
        width: u32,
        height: u32,
        format: Option<PixelFormat>,
    ) -> RetrocompResult<()> {
        let Some(tx) = self.transaction.as_mut() else {
            return Err(RetrocompError::usage("init_size outside a graphics transaction"));
        };
        tx.size_requested = true;
        self.current.game_width = width;
        self.current.game_height = height;
        self.current.game_format = format.unwrap_or(PixelFormat::CLUT8);
        Ok(())
    }

    /// Validates and commits the staged state. Failed parts roll back to the previous committed
    /// state when there is one; the failures are reported either way.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn end_gfx_transaction(&mut self) -> RetrocompResult<()> {
        let Some(tx) = self.transaction.take() else {
            return Err(RetrocompError::usage("no graphics transaction open"));
        };
        let configures_game = tx.size_requested || self.old.valid;
        let failures = if configures_game {
            self.current
                .validate_game_mode(self.max_texture_dimension())
        } else {
            TransactionFailures::empty()
        };

        if !failures.is_empty() {
            let message = format!(
                "cannot set {}x{} {}",
                self.current.game_width, self.current.game_height, self.current.game_format
            );
            if !self.old.valid {
                self.current = VideoState {
                    aspect_ratio_correction: self.current.aspect_ratio_correction,
                    filtering: self.current.filtering,
                    ..self.old
                };
                self.apply_video_state(false, false)?;
                return Err(RetrocompError::configuration(failures, message));
            }
            tracing::warn!(?failures, "{message}; rolling back");
            self.current.roll_back(&self.old, failures);
        }

        // A partly rolled back request still bumps when what survived changed the screen.
        let mode_changed = self.current.game_size() != self.old.game_size()
            || self.current.game_format != self.old.game_format;
        let bump = tx.size_requested && (failures.is_empty() || mode_changed);
        self.apply_video_state(configures_game, bump)?;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RetrocompError::configuration(
                failures,
                "transaction partially rolled back",
            ))
        }
    }

    fn apply_video_state(&mut self, configures_game: bool, bump: bool) -> RetrocompResult<()> {
        let mut rebuilt = false;
        if configures_game {
            let (w, h) = self.current.game_size();
            let format = self.current.game_format;
            let stale = self
                .game_screen
                .as_ref()
                .is_none_or(|s| s.width() != w || s.height() != h || s.format() != format);
            if stale {
                let mut screen = Surface::new("game", format);
                screen.allocate(w, h)?;
                if let Some(p) = screen.as_paletted_mut() {
                    p.set_palette(0, PALETTE_ENTRIES, &self.game_palette)?;
                    screen.fill(0);
                } else {
                    screen.fill(format.rgb_to_color(0, 0, 0));
                }
                self.game_screen = Some(screen);
                rebuilt = true;
                tracing::debug!(width = w, height = h, %format, "game screen configured");
            }
            self.current.valid = true;
        }
        if rebuilt || self.current.filtering != self.old.filtering {
            let linear = self.current.filtering;
            let mut result = Ok(());
            self.for_each_surface(|s| {
                if let Err(err) = s.set_filtering(linear)
                    && result.is_ok()
                {
                    result = Err(err);
                }
            });
            result?;
        }
        self.recalculate_display_areas();
        self.force_redraw = true;
        if bump {
            self.bump_screen_change();
        }
        Ok(())
    }

    /// `begin_gfx_transaction` + `init_size` + `end_gfx_transaction`.
    pub fn set_game_size(
        &mut self,
        width: u32,
        height: u32,
        format: Option<PixelFormat>,
    ) -> RetrocompResult<()> {
        self.begin_gfx_transaction()?;
        if let Err(err) = self.init_size(width, height, format) {
            self.transaction = None;
            return Err(err);
        }
        self.end_gfx_transaction()
    }

    pub fn video_state(&self) -> VideoState {
        self.current
    }

    fn bump_screen_change(&mut self) {
        self.screen_change_id += 1;
    }

    pub fn screen_change_id(&self) -> u64 {
        self.screen_change_id
    }

    pub fn supported_formats(&self) -> Vec<PixelFormat> {
        PixelFormat::supported()
    }

    // ---- game screen -------------------------------------------------------------------

    fn game_screen_mut(&mut self) -> RetrocompResult<&mut Surface> {
        self.game_screen
            .as_mut()
            .ok_or_else(|| RetrocompError::usage("no game screen; call set_game_size first"))
    }

    pub fn width(&self) -> u32 {
        self.game_screen.as_ref().map_or(0, Surface::width)
    }

    pub fn height(&self) -> u32 {
        self.game_screen.as_ref().map_or(0, Surface::height)
    }

    pub fn screen_format(&self) -> PixelFormat {
        self.game_screen
            .as_ref()
            .map_or(self.current.game_format, Surface::format)
    }

    pub fn copy_rect_to_screen(
        &mut self,
        buf: &[u8],
        pitch: usize,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> RetrocompResult<()> {
        self.game_screen_mut()?.copy_rect(x, y, w, h, buf, pitch)
    }

    pub fn fill_screen(&mut self, color: u32) -> RetrocompResult<()> {
        self.game_screen_mut()?.fill(color);
        Ok(())
    }

    pub fn fill_screen_rect(&mut self, rect: Rect, color: u32) -> RetrocompResult<()> {
        self.game_screen_mut()?.fill_rect(rect, color)
    }

    /// Direct access to the game screen pixels until the guard is dropped.
    pub fn lock_screen(&mut self) -> RetrocompResult<ScreenLock<'_>> {
        Ok(ScreenLock {
            surface: self.game_screen_mut()?,
        })
    }

    pub fn set_shake_pos(&mut self, x: i32, y: i32) {
        self.shake = Point::new(x, y);
        self.recalculate_shake();
        self.force_redraw = true;
    }

    // ---- palettes ----------------------------------------------------------------------

    /// Updates `count` game palette entries from packed RGB triples.
    pub fn set_palette(&mut self, start: usize, count: usize, colors: &[u8]) -> RetrocompResult<()> {
        check_palette_range(start, count, colors.len())?;
        if let Some(screen) = self.game_screen.as_mut() {
            let Some(p) = screen.as_paletted_mut() else {
                return Err(RetrocompError::usage("set_palette on a direct-colour game screen"));
            };
            p.set_palette(start, count, colors)?;
        }
        self.game_palette[start * 3..(start + count) * 3].copy_from_slice(&colors[..count * 3]);
        if !self.cursor_palette_enabled {
            self.update_cursor_palette()?;
        }
        Ok(())
    }

    pub fn grab_palette(&self, start: usize, count: usize) -> RetrocompResult<Vec<u8>> {
        if start + count > PALETTE_ENTRIES {
            return Err(RetrocompError::usage(format!(
                "palette range {start}+{count} exceeds {PALETTE_ENTRIES} entries"
            )));
        }
        Ok(self.game_palette[start * 3..(start + count) * 3].to_vec())
    }

    /// Sets cursor palette entries and switches the cursor to its own palette.
    pub fn set_cursor_palette(
        &mut self,
        start: usize,
        count: usize,
        colors: &[u8],
    ) -> RetrocompResult<()> {
        check_palette_range(start, count, colors.len())?;
        self.cursor_palette[start * 3..(start + count) * 3].copy_from_slice(&colors[..count * 3]);
        self.cursor_palette_enabled = true;
        self.cursor_needs_redraw = true;
        self.update_cursor_palette()
    }

    fn update_cursor_palette(&mut self) -> RetrocompResult<()> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(());
        };
        let Some(p) = cursor.surface.as_paletted_mut() else {
            return Ok(());
        };
        let palette = if self.cursor_palette_enabled {
            &self.cursor_palette
        } else {
            &self.game_palette
        };
        p.set_palette(0, PALETTE_ENTRIES, palette)?;
        if cursor.use_key {
            p.set_color_key(cursor.key_color as u8);
        }
        Ok(())
    }

    // ---- cursor ------------------------------------------------------------------------

    /// Replaces the cursor image. A zero-sized image removes the cursor.
    pub fn set_cursor(&mut self, image: &CursorImage<'_>) -> RetrocompResult<()> {
        image.validate()?;
        if image.width == 0 || image.height == 0 {
            self.cursor = None;
            self.cursor_needs_redraw = true;
            return Ok(());
        }
        let mut built = cursor::build_cursor(image, alpha_format())?;
        built.surface.set_filtering(self.current.filtering)?;
        if let Some(m) = built.mask.as_mut() {
            m.set_filtering(self.current.filtering)?;
        }
        self.cursor = Some(CursorSurfaces {
            surface: built.surface,
            mask: built.mask,
            hotspot: built.hotspot,
            dont_scale: image.dont_scale,
            key_color: image.key_color,
            use_key: image.mask.is_none(),
        });
        self.update_cursor_palette()?;
        self.recalculate_cursor_scaling();
        self.cursor_needs_redraw = true;
        Ok(())
    }

    /// Shows or hides the cursor and returns the previous visibility.
    pub fn set_cursor_visible(&mut self, visible: bool) -> bool {
        let previous = self.cursor_visible;
        if previous != visible {
            self.cursor_visible = visible;
            self.cursor_needs_redraw = true;
        }
        previous
    }

    pub fn is_cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    /// Moves the cursor hotspot to window coordinates.
    pub fn set_cursor_pos(&mut self, x: i32, y: i32) {
        let pos = Point::new(x, y);
        if pos != self.cursor_pos {
            self.cursor_pos = pos;
            self.cursor_needs_redraw = true;
        }
    }

    pub fn cursor_pos(&self) -> Point {
        self.cursor_pos
    }

    /// Moves the cursor to game coordinates, or overlay coordinates while the overlay shows.
    pub fn warp_mouse(&mut self, x: i32, y: i32) {
        let p = if self.overlay_visible {
            Point::new(self.areas.overlay.left + x, self.areas.overlay.top + y)
        } else {
            let (gw, gh) = self.current.game_size();
            display::game_to_window(Point::new(x, y), self.areas.game, gw, gh)
        };
        self.set_cursor_pos(p.x, p.y);
    }

    pub fn has_cursor(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn has_cursor_mask(&self) -> bool {
        self.cursor.as_ref().is_some_and(|c| c.mask.is_some())
    }

    /// Cursor hotspot and size on the backbuffer.
    pub fn cursor_metrics(&self) -> CursorMetrics {
        self.cursor_metrics
    }

    fn recalculate_cursor_scaling(&mut self) {
        let Some(cursor) = self.cursor.as_ref() else {
            return;
        };
        self.cursor_metrics = cursor::scale_cursor(
            (cursor.surface.width(), cursor.surface.height()),
            cursor.hotspot,
            cursor.dont_scale,
            (self.areas.game.width(), self.areas.game.height()),
            (self.width(), self.height()),
        );
    }

    // ---- overlay -----------------------------------------------------------------------

    fn overlay_mut(&mut self) -> RetrocompResult<&mut Surface> {
        self.overlay
            .as_mut()
            .ok_or_else(|| RetrocompError::usage("no overlay; the window has no size yet"))
    }

    /// Shows the overlay. `in_gui` marks it as the VM's own GUI rather than an in-game layer.
    pub fn show_overlay(&mut self, in_gui: bool) {
        self.overlay_visible = true;
        self.overlay_in_gui = in_gui;
        self.force_redraw = true;
    }

    pub fn hide_overlay(&mut self) {
        self.overlay_visible = false;
        self.overlay_in_gui = false;
        self.force_redraw = true;
    }

    pub fn is_overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn is_overlay_in_gui(&self) -> bool {
        self.overlay_visible && self.overlay_in_gui
    }

    /// Fills the overlay with transparent black.
    pub fn clear_overlay(&mut self) -> RetrocompResult<()> {
        self.overlay_mut()?.fill(0);
        Ok(())
    }

    pub fn copy_rect_to_overlay(
        &mut self,
        buf: &[u8],
        pitch: usize,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> RetrocompResult<()> {
        self.overlay_mut()?.copy_rect(x, y, w, h, buf, pitch)
    }

    /// Copies the whole overlay into `dst`, rows `pitch` bytes apart.
    pub fn grab_overlay(&self, dst: &mut [u8], pitch: usize) -> RetrocompResult<()> {
        let overlay = self
            .overlay
            .as_ref()
            .ok_or_else(|| RetrocompError::usage("no overlay; the window has no size yet"))?;
        overlay.buffer().copy_rect_to(
            Rect::with_size(overlay.width(), overlay.height()),
            dst,
            pitch,
        )
    }

    pub fn overlay_width(&self) -> u32 {
        self.overlay.as_ref().map_or(0, Surface::width)
    }

    pub fn overlay_height(&self) -> u32 {
        self.overlay.as_ref().map_or(0, Surface::height)
    }

    pub fn overlay_format(&self) -> PixelFormat {
        alpha_format()
    }

    // ---- window ------------------------------------------------------------------------

    /// New window size in physical pixels. The overlay follows it, but never below the
    /// configured minimum.
    pub fn resize(&mut self, width: u32, height: u32) -> RetrocompResult<()> {
        if width == 0 || height == 0 {
            return Err(RetrocompError::usage(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        if let Some(live) = self.live.as_mut()
            && let Some(fb) = live.pipeline.framebuffer_mut()
        {
            fb.set_size(width, height)?;
        }
        self.window = (width, height);

        let (min_w, min_h) = self.settings.overlay_min;
        let (ow, oh) = (width.max(min_w), height.max(min_h));
        let overlay = self
            .overlay
            .get_or_insert_with(|| Surface::new("overlay", alpha_format()));
        overlay.allocate(ow, oh)?;
        overlay.set_filtering(self.current.filtering)?;
        overlay.fill(0);

        self.recalculate_display_areas();
        self.force_redraw = true;
        self.bump_screen_change();
        tracing::debug!(width, height, overlay_w = ow, overlay_h = oh, "resized");
        Ok(())
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window
    }

    pub fn display_areas(&self) -> DisplayAreas {
        self.areas
    }

    pub fn game_draw_rect(&self) -> Rect {
        self.areas.game
    }

    fn recalculate_display_areas(&mut self) {
        let game = self.game_screen.as_ref().map(|s| (s.width(), s.height()));
        let overlay = self.overlay.as_ref().map(|s| (s.width(), s.height()));
        self.areas = display::compute_areas(
            game,
            overlay,
            self.window,
            self.current.aspect_ratio_correction,
        );
        self.recalculate_shake();
        self.recalculate_cursor_scaling();
    }

    fn recalculate_shake(&mut self) {
        let (gw, gh) = (self.width(), self.height());
        self.shake_scaled = display::scale_shake(self.shake, self.areas.game, gw, gh);
    }

    // ---- frames ------------------------------------------------------------------------

    /// Renders and presents one frame. Errors never escape: a missing drawable drops the frame,
    /// a resource failure loses the context.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn update_screen(&mut self) -> FrameOutcome {
        if self.live.is_none() {
            return FrameOutcome::NoContext;
        }
        match self.render_frame() {
            Ok(()) => {
                self.force_redraw = false;
                self.cursor_needs_redraw = false;
                self.stats.presented += 1;
                self.last_frame_error = None;
                FrameOutcome::Presented
            }
            Err(err) => {
                if err.is_resource() {
                    tracing::warn!(error = %err, "frame failed; dropping gpu context");
                    self.on_destroy();
                } else {
                    tracing::warn!(error = %err, "frame dropped");
                }
                self.force_redraw = true;
                self.stats.dropped += 1;
                self.last_frame_error = Some(err);
                FrameOutcome::Dropped
            }
        }
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.stats
    }

    pub fn last_frame_error(&self) -> Option<&RetrocompError> {
        self.last_frame_error.as_ref()
    }

    /// The next frame must redraw everything.
    pub fn needs_full_redraw(&self) -> bool {
        self.force_redraw
    }

    pub fn cursor_needs_redraw(&self) -> bool {
        self.cursor_needs_redraw
    }
}

/// Game screen pixels borrowed by the VM. The whole screen is re-uploaded once released.
pub struct ScreenLock<'a> {
    surface: &'a mut Surface,
}

impl ScreenLock<'_> {
    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    pub fn pitch(&self) -> usize {
        self.surface.buffer().pitch()
    }

    pub fn format(&self) -> PixelFormat {
        self.surface.format()
    }

    /// Rows `pitch` bytes apart; the last column and row are edge padding.
    pub fn pixels(&self) -> &[u8] {
        self.surface.buffer().data()
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        self.surface.buffer_mut().data_mut()
    }

    pub fn buffer(&self) -> &PixelBuffer {
        self.surface.buffer()
    }

    pub fn unlock(self) {}
}

impl Drop for ScreenLock<'_> {
    fn drop(&mut self) {
        self.surface.flag_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transactions_outside_context_stage_client_state() {
        let mut c = Compositor::new(CompositorSettings::default());
        c.set_game_size(320, 200, None).unwrap();
        assert_eq!((c.width(), c.height()), (320, 200));
        assert_eq!(c.screen_change_id(), 1);
        assert_eq!(c.context_phase(), ContextPhase::Uninitialised);
        assert_eq!(c.update_screen(), FrameOutcome::NoContext);
    }

    #[test]
    fn failed_first_transaction_reports_and_leaves_no_screen() {
        let mut c = Compositor::new(CompositorSettings::default());
        let err = c.set_game_size(0, 200, None).unwrap_err();
        assert!(err.failures().contains(TransactionFailures::SIZE_CHANGE));
        assert_eq!(c.width(), 0);
        assert_eq!(c.screen_change_id(), 0);
    }

    #[test]
    fn nested_transactions_are_rejected() {
        let mut c = Compositor::new(CompositorSettings::default());
        c.begin_gfx_transaction().unwrap();
        assert!(c.begin_gfx_transaction().is_err());
        c.end_gfx_transaction().unwrap();
        assert!(c.end_gfx_transaction().is_err());
    }

    #[test]
    fn palette_reaches_new_screen_after_format_change() {
        let mut c = Compositor::new(CompositorSettings::default());
        c.set_palette(0, 1, &[9, 8, 7]).unwrap();
        c.set_game_size(64, 64, Some(PixelFormat::RGB565)).unwrap();
        assert!(c.set_palette(0, 1, &[1, 2, 3]).is_err());
        c.set_game_size(64, 64, None).unwrap();
        let p = c.game_screen.as_ref().and_then(Surface::as_paletted).unwrap();
        assert_eq!(p.palette_entry(0), [9, 8, 7, 0xFF]);
    }

    #[test]
    fn cursor_visibility_returns_previous() {
        let mut c = Compositor::new(CompositorSettings::default());
        assert!(!c.set_cursor_visible(true));
        assert!(c.set_cursor_visible(false));
    }

    #[test]
    fn screen_lock_flags_everything_dirty() {
        let mut c = Compositor::new(CompositorSettings::default());
        c.set_game_size(8, 4, None).unwrap();
        if let Some(s) = c.game_screen.as_mut()
            && let Surface::Paletted(p) = s
        {
            p.core.dirty.clear();
        }
        {
            let mut lock = c.lock_screen().unwrap();
            let pitch = lock.pitch();
            lock.pixels_mut()[pitch + 2] = 5;
        }
        let s = c.game_screen.as_ref().unwrap();
        assert_eq!(s.dirty_area(), Rect::with_size(8, 4));
        assert_eq!(s.buffer().pixel(2, 1), 5);
    }
}
