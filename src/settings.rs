use serde::{Deserialize, Serialize};

/// Optional behaviours the VM can query and toggle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// The cursor uses its own palette instead of the game's.
    CursorPalette,
    /// 320x200 and 640x400 games are stretched to 4:3.
    AspectRatioCorrection,
    /// Linear instead of nearest texture filtering.
    FilteringMode,
}

impl Feature {
    pub const ALL: [Feature; 3] = [
        Feature::CursorPalette,
        Feature::AspectRatioCorrection,
        Feature::FilteringMode,
    ];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorSettings {
    /// Backbuffer clear colour, straight RGBA.
    pub clear_rgba: [u8; 4],
    pub filtering: bool,
    pub aspect_ratio_correction: bool,
    /// Smallest overlay the VM's GUI is laid out for.
    pub overlay_min: (u32, u32),
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            clear_rgba: [0, 0, 0, 255],
            filtering: false,
            aspect_ratio_correction: false,
            overlay_min: (256, 200),
        }
    }
}

impl CompositorSettings {
    /// Defaults, with `RETROCOMP_FILTERING` and `RETROCOMP_ASPECT_CORRECTION` overriding the
    /// matching flags when set to `1`/`true` or `0`/`false`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(v) = env_flag("RETROCOMP_FILTERING") {
            settings.filtering = v;
        }
        if let Some(v) = env_flag("RETROCOMP_ASPECT_CORRECTION") {
            settings.aspect_ratio_correction = v;
        }
        settings
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_rgba.map(|c| c as f32 / 255.0)
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| parse_flag(&v))
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
