use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::gpu::device::{ShaderFunction, ShaderModuleId, ShaderStage, SharedDevice};

/// WGSL source shared by every device.
///
/// Bindings (group 0): source texture, palette texture, mask texture, source sampler,
/// palette sampler, uniforms.
pub const SHADER_SOURCE: &str = r#"
struct Uniforms {
    projection: mat4x4<f32>,
    color: vec4<f32>,
};

@group(0) @binding(0) var t_source: texture_2d<f32>;
@group(0) @binding(1) var t_palette: texture_2d<f32>;
@group(0) @binding(2) var t_mask: texture_2d<f32>;
@group(0) @binding(3) var s_source: sampler;
@group(0) @binding(4) var s_palette: sampler;
@group(0) @binding(5) var<uniform> u: Uniforms;

struct VertexIn {
    @location(0) position: vec2<f32>,
    @location(1) tex_coord: vec2<f32>,
};

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
};

@vertex
fn vertex_main(in: VertexIn) -> VertexOut {
    var out: VertexOut;
    out.position = u.projection * vec4<f32>(in.position, 0.0, 1.0);
    out.tex_coord = in.tex_coord;
    return out;
}

@fragment
fn fragment_sample(in: VertexOut) -> @location(0) vec4<f32> {
    return textureSample(t_source, s_source, in.tex_coord) * u.color;
}

// Maps a normalised index i/255 onto the centre of palette texel i.
const PALETTE_ADJUST: f32 = 255.0 / 256.0 + 1.0 / (2.0 * 256.0);

@fragment
fn fragment_palette_lookup(in: VertexOut) -> @location(0) vec4<f32> {
    let index = textureSample(t_source, s_palette, in.tex_coord).r;
    let color = textureSample(t_palette, s_palette, vec2<f32>(index * PALETTE_ADJUST, 0.0));
    let coverage = textureSample(t_mask, s_palette, in.tex_coord).r;
    return color * coverage * u.color;
}
"#;

/// Multiplier applied to a normalised palette index before the palette is sampled.
pub const PALETTE_ADJUST: f32 = 255.0 / 256.0 + 1.0 / (2.0 * 256.0);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderId {
    Vertex,
    FragmentSample,
    FragmentPaletteLookup,
}

impl ShaderId {
    pub const ALL: [ShaderId; 3] = [
        ShaderId::Vertex,
        ShaderId::FragmentSample,
        ShaderId::FragmentPaletteLookup,
    ];

    pub fn entry_point(self) -> &'static str {
        match self {
            ShaderId::Vertex => "vertex_main",
            ShaderId::FragmentSample => "fragment_sample",
            ShaderId::FragmentPaletteLookup => "fragment_palette_lookup",
        }
    }

    pub fn stage(self) -> ShaderStage {
        match self {
            ShaderId::Vertex => ShaderStage::Vertex,
            _ => ShaderStage::Fragment,
        }
    }
}

/// Loaded shader entry points, valid for the lifetime of one device.
pub struct ShaderLibrary {
    device: SharedDevice,
    module: Option<ShaderModuleId>,
}

impl ShaderLibrary {
    pub fn create(device: &SharedDevice) -> RetrocompResult<Self> {
        let mut lib = Self {
            device: device.clone(),
            module: None,
        };
        lib.load()?;
        Ok(lib)
    }

    fn load(&mut self) -> RetrocompResult<()> {
        let entry_points: Vec<(&'static str, ShaderStage)> = ShaderId::ALL
            .iter()
            .map(|id| (id.entry_point(), id.stage()))
            .collect();
        let module = self
            .device
            .load_shader_module("retrocomp_shaders", SHADER_SOURCE, &entry_points)?;
        tracing::debug!(?module, "shader library loaded");
        self.module = Some(module);
        Ok(())
    }

    /// Handle for `id`. Fails once the library has been destroyed.
    pub fn query(&self, id: ShaderId) -> RetrocompResult<ShaderFunction> {
        let module = self
            .module
            .ok_or_else(|| RetrocompError::usage("shader library is not loaded"))?;
        Ok(ShaderFunction { module, id })
    }

    /// Releases and reloads every entry point.
    pub fn reset(&mut self) -> RetrocompResult<()> {
        self.destroy();
        self.load()
    }

    pub fn destroy(&mut self) {
        if let Some(module) = self.module.take() {
            self.device.destroy_shader_module(module);
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.module.is_some()
    }
}

impl Drop for ShaderLibrary {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::soft::SoftwareDevice;
    use std::rc::Rc;

    #[test]
    fn source_declares_every_entry_point() {
        for id in ShaderId::ALL {
            assert!(SHADER_SOURCE.contains(&format!("fn {}(", id.entry_point())));
        }
    }

    #[test]
    fn palette_adjust_hits_texel_centres() {
        for i in 0..=255u32 {
            let u = (i as f32 / 255.0) * PALETTE_ADJUST;
            assert_eq!(((u * 256.0).floor() as u32).min(255), i);
        }
    }

    #[test]
    fn query_reset_destroy() {
        let device: SharedDevice = Rc::new(SoftwareDevice::new());
        let mut lib = ShaderLibrary::create(&device).unwrap();
        let before = lib.query(ShaderId::FragmentPaletteLookup).unwrap();
        assert_eq!(before.entry_point(), "fragment_palette_lookup");
        lib.reset().unwrap();
        let after = lib.query(ShaderId::FragmentPaletteLookup).unwrap();
        assert_ne!(before.module, after.module);
        lib.destroy();
        assert!(lib.query(ShaderId::Vertex).is_err());
    }
}
