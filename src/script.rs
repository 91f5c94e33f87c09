//! JSON scripts that drive a [`Compositor`] through the VM-facing API, for the CLI and tests.

use serde::{Deserialize, Serialize};

use crate::compositor::{Compositor, CursorImage, FrameOutcome};
use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::foundation::format::FormatName;
use crate::gpu::device::SharedDevice;
use crate::present::{FrameRGBA, OffscreenSurface};
use crate::settings::{CompositorSettings, Feature};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Initial window size in physical pixels.
    pub window: [u32; 2],
    #[serde(default)]
    pub settings: Option<CompositorSettings>,
    pub steps: Vec<Step>,
}

/// One VM call. Pixel payloads are tightly packed rows in the target surface's format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    SetGameSize {
        width: u32,
        height: u32,
        #[serde(default)]
        format: FormatName,
    },
    SetPalette {
        #[serde(default)]
        start: usize,
        colors: Vec<u8>,
    },
    FillScreen {
        color: u32,
    },
    CopyRectToScreen {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    SetCursor {
        width: u32,
        height: u32,
        #[serde(default)]
        hotspot_x: i32,
        #[serde(default)]
        hotspot_y: i32,
        #[serde(default)]
        key_color: u32,
        #[serde(default)]
        dont_scale: bool,
        #[serde(default)]
        format: FormatName,
        pixels: Vec<u8>,
        #[serde(default)]
        mask: Option<Vec<u8>>,
    },
    SetCursorPalette {
        #[serde(default)]
        start: usize,
        colors: Vec<u8>,
    },
    SetCursorVisible {
        visible: bool,
    },
    SetCursorPos {
        x: i32,
        y: i32,
    },
    WarpMouse {
        x: i32,
        y: i32,
    },
    ShowOverlay {
        #[serde(default)]
        in_gui: bool,
    },
    HideOverlay,
    ClearOverlay,
    CopyRectToOverlay {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    SetShakePos {
        x: i32,
        y: i32,
    },
    SetFeature {
        feature: Feature,
        enabled: bool,
    },
    Resize {
        width: u32,
        height: u32,
    },
    UpdateScreen,
}

/// Frame counts from one script run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScriptReport {
    pub presented: u64,
    pub dropped: u64,
}

fn palette_count(colors: &[u8]) -> RetrocompResult<usize> {
    if colors.len() % 3 != 0 {
        return Err(RetrocompError::validation(format!(
            "palette has {} bytes, not a multiple of 3",
            colors.len()
        )));
    }
    Ok(colors.len() / 3)
}

impl Script {
    pub fn from_json(text: &str) -> RetrocompResult<Self> {
        let script: Script =
            serde_json::from_str(text).map_err(|e| RetrocompError::serde(e.to_string()))?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> RetrocompResult<()> {
        let [w, h] = self.window;
        if w == 0 || h == 0 {
            return Err(RetrocompError::validation(format!(
                "window must be non-empty, got {w}x{h}"
            )));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if let Step::SetPalette { colors, .. } | Step::SetCursorPalette { colors, .. } = step {
                palette_count(colors)
                    .map_err(|e| RetrocompError::validation(format!("step {i}: {e}")))?;
            }
        }
        Ok(())
    }

    /// Runs every step in order. `surface`, when given, is the compositor's provider and is
    /// resized along with `resize` steps.
    pub fn run(
        &self,
        compositor: &mut Compositor,
        surface: Option<&OffscreenSurface>,
    ) -> RetrocompResult<ScriptReport> {
        let mut report = ScriptReport::default();
        for (i, step) in self.steps.iter().enumerate() {
            tracing::trace!(step = i, ?step, "script step");
            match self.apply(compositor, surface, step)? {
                Some(FrameOutcome::Presented) => report.presented += 1,
                Some(FrameOutcome::Dropped | FrameOutcome::NoContext) => report.dropped += 1,
                None => {}
            }
        }
        Ok(report)
    }

    fn apply(
        &self,
        c: &mut Compositor,
        surface: Option<&OffscreenSurface>,
        step: &Step,
    ) -> RetrocompResult<Option<FrameOutcome>> {
        match step {
            Step::SetGameSize {
                width,
                height,
                format,
            } => c.set_game_size(*width, *height, Some(format.format()))?,
            Step::SetPalette { start, colors } => {
                c.set_palette(*start, palette_count(colors)?, colors)?
            }
            Step::FillScreen { color } => c.fill_screen(*color)?,
            Step::CopyRectToScreen {
                x,
                y,
                width,
                height,
                pixels,
            } => {
                let pitch = *width as usize * c.screen_format().bpp();
                c.copy_rect_to_screen(pixels, pitch, *x, *y, *width, *height)?
            }
            Step::SetCursor {
                width,
                height,
                hotspot_x,
                hotspot_y,
                key_color,
                dont_scale,
                format,
                pixels,
                mask,
            } => c.set_cursor(&CursorImage {
                pixels,
                width: *width,
                height: *height,
                hotspot_x: *hotspot_x,
                hotspot_y: *hotspot_y,
                key_color: *key_color,
                dont_scale: *dont_scale,
                format: format.format(),
                mask: mask.as_deref(),
            })?,
            Step::SetCursorPalette { start, colors } => {
                c.set_cursor_palette(*start, palette_count(colors)?, colors)?
            }
            Step::SetCursorVisible { visible } => {
                c.set_cursor_visible(*visible);
            }
            Step::SetCursorPos { x, y } => c.set_cursor_pos(*x, *y),
            Step::WarpMouse { x, y } => c.warp_mouse(*x, *y),
            Step::ShowOverlay { in_gui } => c.show_overlay(*in_gui),
            Step::HideOverlay => c.hide_overlay(),
            Step::ClearOverlay => c.clear_overlay()?,
            Step::CopyRectToOverlay {
                x,
                y,
                width,
                height,
                pixels,
            } => {
                let pitch = *width as usize * c.overlay_format().bpp();
                c.copy_rect_to_overlay(pixels, pitch, *x, *y, *width, *height)?
            }
            Step::SetShakePos { x, y } => c.set_shake_pos(*x, *y),
            Step::SetFeature { feature, enabled } => c.set_feature_state(*feature, *enabled)?,
            Step::Resize { width, height } => {
                if let Some(s) = surface {
                    s.resize(*width, *height)?;
                }
                c.resize(*width, *height)?
            }
            Step::UpdateScreen => return Ok(Some(c.update_screen())),
        }
        Ok(None)
    }

    /// Runs the script on an offscreen surface of `device` and returns the last backbuffer.
    /// A frame is rendered at the end unless the script already finishes with one.
    pub fn render(&self, device: SharedDevice) -> RetrocompResult<(FrameRGBA, ScriptReport)> {
        self.validate()?;
        let [w, h] = self.window;
        let surface = OffscreenSurface::new(device, w, h)?;
        let settings = self
            .settings
            .clone()
            .unwrap_or_else(CompositorSettings::from_env);
        let mut compositor = Compositor::new(settings);
        compositor.on_create(Box::new(surface.clone()))?;

        let mut report = self.run(&mut compositor, Some(&surface))?;
        if !matches!(self.steps.last(), Some(Step::UpdateScreen)) {
            match compositor.update_screen() {
                FrameOutcome::Presented => report.presented += 1,
                _ => report.dropped += 1,
            }
        }
        if let Some(err) = compositor.last_frame_error() {
            return Err(RetrocompError::present(format!("last frame was dropped: {err}")));
        }
        Ok((surface.readback()?, report))
    }
}
