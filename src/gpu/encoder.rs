use std::collections::HashSet;

use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::gpu::context::SharedContext;
use crate::gpu::device::{Command, DrawCall, TextureId};

/// Records one frame's worth of GPU commands.
///
/// Scoped: dropping the encoder without [`FrameEncoder::commit`] discards the commands, and
/// either way the active pipeline is cleared when encoding ends.
pub struct FrameEncoder {
    ctx: SharedContext,
    label: &'static str,
    commands: Vec<Command>,
    open: Option<TextureId>,
    cleared: HashSet<TextureId>,
    finished: bool,
}

impl FrameEncoder {
    pub fn begin(ctx: &SharedContext, label: &'static str) -> Self {
        Self {
            ctx: ctx.clone(),
            label,
            commands: Vec::new(),
            open: None,
            cleared: HashSet::new(),
            finished: false,
        }
    }

    /// Opens a pass on `target`, closing any open one. A target is cleared only the first
    /// time it is opened in this encoder; later passes load its contents.
    pub fn begin_pass(&mut self, target: TextureId, clear_color: [f32; 4]) {
        self.end_pass();
        let clear = self.cleared.insert(target).then_some(clear_color);
        self.commands.push(Command::BeginPass { target, clear });
        self.open = Some(target);
    }

    pub fn end_pass(&mut self) {
        if self.open.take().is_some() {
            self.commands.push(Command::EndPass);
        }
    }

    pub fn draw(&mut self, call: DrawCall) -> RetrocompResult<()> {
        if self.open.is_none() {
            return Err(RetrocompError::usage(format!(
                "{}: draw with no open render pass",
                self.label
            )));
        }
        self.commands.push(Command::Draw(call));
        Ok(())
    }

    pub fn open_target(&self) -> Option<TextureId> {
        self.open
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw(_)))
            .count()
    }

    fn end_encoding(&mut self) {
        self.end_pass();
        self.ctx.active_slot().set(None);
        self.finished = true;
    }

    /// Ends encoding and hands the commands to the device.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn commit(mut self) -> RetrocompResult<()> {
        self.end_encoding();
        let commands = std::mem::take(&mut self.commands);
        tracing::trace!(label = self.label, commands = commands.len(), "submitting");
        self.ctx.device().submit(commands)
    }
}

impl Drop for FrameEncoder {
    fn drop(&mut self) {
        if !self.finished {
            self.end_encoding();
            if !self.commands.is_empty() {
                tracing::debug!(
                    label = self.label,
                    commands = self.commands.len(),
                    "discarding uncommitted commands"
                );
            }
        }
    }
}
