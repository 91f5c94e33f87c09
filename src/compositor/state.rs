use crate::foundation::error::TransactionFailures;
use crate::foundation::format::PixelFormat;
use crate::surface::SURFACE_PADDING;

/// Video mode the VM asked for. Staged inside a transaction, committed at its end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoState {
    /// A game screen has been configured successfully at least once.
    pub valid: bool,
    pub game_width: u32,
    pub game_height: u32,
    pub game_format: PixelFormat,
    pub aspect_ratio_correction: bool,
    pub filtering: bool,
}

impl Default for VideoState {
    fn default() -> Self {
        Self {
            valid: false,
            game_width: 0,
            game_height: 0,
            game_format: PixelFormat::CLUT8,
            aspect_ratio_correction: false,
            filtering: false,
        }
    }
}

impl VideoState {
    pub fn game_size(&self) -> (u32, u32) {
        (self.game_width, self.game_height)
    }

    /// Checks the game mode against the largest texture the device can hold, padding included.
    pub fn validate_game_mode(&self, max_texture: u32) -> TransactionFailures {
        let mut failures = TransactionFailures::empty();
        if !self.game_format.is_supported() {
            failures |= TransactionFailures::FORMAT_NOT_SUPPORTED;
        }
        let fits = |d: u32| {
            d > 0
                && d
                    .checked_add(SURFACE_PADDING)
                    .is_some_and(|padded| padded <= max_texture)
        };
        if !fits(self.game_width) || !fits(self.game_height) {
            failures |= TransactionFailures::SIZE_CHANGE;
        }
        failures
    }

    /// Restores the fields named by `failures` from `old`.
    pub fn roll_back(&mut self, old: &VideoState, failures: TransactionFailures) {
        if failures.contains(TransactionFailures::SIZE_CHANGE) {
            self.game_width = old.game_width;
            self.game_height = old.game_height;
        }
        if failures.contains(TransactionFailures::FORMAT_NOT_SUPPORTED) {
            self.game_format = old.game_format;
        }
        if failures.contains(TransactionFailures::ASPECT_RATIO) {
            self.aspect_ratio_correction = old.aspect_ratio_correction;
        }
        if failures.contains(TransactionFailures::FILTERING) {
            self.filtering = old.filtering;
        }
    }
}

/// An open graphics transaction.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Transaction {
    /// `init_size` was called, so the game screen is being (re)configured.
    pub size_requested: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(w: u32, h: u32, format: PixelFormat) -> VideoState {
        VideoState {
            valid: true,
            game_width: w,
            game_height: h,
            game_format: format,
            ..VideoState::default()
        }
    }

    #[test]
    fn validation_flags_size_and_format() {
        assert!(mode(320, 200, PixelFormat::CLUT8).validate_game_mode(8192).is_empty());
        let unsupported = PixelFormat::new(3, 8, 8, 8, 0, 16, 8, 0, 0);
        assert_eq!(
            mode(320, 200, unsupported).validate_game_mode(8192),
            TransactionFailures::FORMAT_NOT_SUPPORTED
        );
        assert_eq!(
            mode(8192, 200, PixelFormat::CLUT8).validate_game_mode(8192),
            TransactionFailures::SIZE_CHANGE
        );
        assert_eq!(
            mode(0, 200, PixelFormat::CLUT8).validate_game_mode(8192),
            TransactionFailures::SIZE_CHANGE
        );
        assert_eq!(
            mode(u32::MAX, 200, PixelFormat::CLUT8).validate_game_mode(u32::MAX),
            TransactionFailures::SIZE_CHANGE
        );
        assert!(mode(8191, 1, PixelFormat::CLUT8).validate_game_mode(8192).is_empty());
    }

    #[test]
    fn roll_back_restores_only_failed_fields() {
        let old = mode(320, 200, PixelFormat::CLUT8);
        let mut cur = mode(9999, 9999, PixelFormat::RGB565);
        cur.aspect_ratio_correction = true;
        cur.roll_back(&old, TransactionFailures::SIZE_CHANGE);
        assert_eq!(cur.game_size(), (320, 200));
        assert_eq!(cur.game_format, PixelFormat::RGB565);
        assert!(cur.aspect_ratio_correction);
    }
}
