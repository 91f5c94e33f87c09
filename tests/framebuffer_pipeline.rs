use std::rc::Rc;

use retrocomp::gpu::{
    BlendMode, CopyMask, FrameEncoder, Framebuffer, GpuContext, GpuDevice, GpuTexture, Pipeline,
    ShaderId, SharedContext, TextureFormat, TextureUsage,
};
use retrocomp::{Rect, SoftwareDevice};

fn setup() -> (Rc<SoftwareDevice>, SharedContext) {
    let soft = Rc::new(SoftwareDevice::new());
    let ctx = GpuContext::create(soft.clone()).unwrap();
    (soft, ctx)
}

fn solid(ctx: &SharedContext, rgba: [u8; 4]) -> GpuTexture {
    let t = GpuTexture::create(
        ctx.device(),
        "solid",
        1,
        1,
        TextureFormat::Rgba8,
        TextureUsage::SAMPLED,
    )
    .unwrap();
    t.replace_region(Rect::with_size(1, 1), &rgba, 4).unwrap();
    t
}

fn target(ctx: &SharedContext, label: &'static str) -> Framebuffer {
    let mut fb = Framebuffer::texture_target(ctx, label, 4, 4).unwrap();
    fb.set_clear_color(0.0, 0.0, 0.0, 1.0);
    fb.set_blend(BlendMode::Opaque);
    fb
}

fn px(soft: &SoftwareDevice, fb: &Framebuffer, x: u32, y: u32) -> [u8; 4] {
    let rb = soft.read_texture(fb.target().unwrap()).unwrap();
    let i = ((y * rb.width + x) * 4) as usize;
    [rb.data[i], rb.data[i + 1], rb.data[i + 2], rb.data[i + 3]]
}

#[test]
fn copy_mask_bits_skip_reserved_bit_three() {
    assert_eq!(CopyMask::all().bits(), 0b1_0111);
    assert_eq!(CopyMask::SCISSOR_BOX.bits(), 1 << 4);
}

#[test]
fn full_state_copy_onto_itself_changes_nothing() {
    let (_soft, ctx) = setup();
    let mut fb = target(&ctx, "fb");
    fb.set_scissor_enable(true);
    fb.set_scissor_box(1, 1, 2, 2);
    let before = fb.state().clone();
    let snapshot = fb.state().clone();
    fb.copy_state_from(&snapshot, CopyMask::all());
    assert_eq!(fb.state(), &before);
}

#[test]
fn second_activation_takes_over_and_first_target_keeps_its_pixels() {
    let (soft, ctx) = setup();
    let green = solid(&ctx, [0, 255, 0, 255]);
    let blue = solid(&ctx, [0, 0, 255, 255]);
    let mut a = Pipeline::new(&ctx, "a", ShaderId::FragmentSample).unwrap();
    let mut b = Pipeline::new(&ctx, "b", ShaderId::FragmentSample).unwrap();
    a.set_framebuffer(Some(target(&ctx, "a")));
    b.set_framebuffer(Some(target(&ctx, "b")));

    let mut enc = FrameEncoder::begin(&ctx, "frame");
    a.activate(&mut enc).unwrap();
    a.draw_textured_rect(&mut enc, green.id().unwrap(), 0.0, 0.0, 2.0, 4.0)
        .unwrap();

    b.activate(&mut enc).unwrap();
    assert!(b.is_active());
    assert!(!a.is_active());
    assert!(!a.framebuffer().unwrap().is_active());
    assert_eq!(ctx.active_pipeline(), Some(b.id()));
    b.draw_textured_rect(&mut enc, blue.id().unwrap(), 0.0, 0.0, 4.0, 4.0)
        .unwrap();

    // Re-opening a's target loads instead of clearing it again.
    a.activate(&mut enc).unwrap();
    a.draw_textured_rect(&mut enc, blue.id().unwrap(), 2.0, 0.0, 2.0, 4.0)
        .unwrap();
    a.deactivate(&mut enc);
    enc.commit().unwrap();
    assert_eq!(ctx.active_pipeline(), None);

    let fa = a.framebuffer().unwrap();
    assert_eq!(px(&soft, fa, 0, 0), [0, 255, 0, 255]);
    assert_eq!(px(&soft, fa, 3, 3), [0, 0, 255, 255]);
    assert_eq!(px(&soft, b.framebuffer().unwrap(), 1, 1), [0, 0, 255, 255]);
}

#[test]
fn scissor_box_limits_the_draw() {
    let (soft, ctx) = setup();
    let red = solid(&ctx, [255, 0, 0, 255]);
    let mut p = Pipeline::new(&ctx, "p", ShaderId::FragmentSample).unwrap();
    let mut fb = target(&ctx, "scissored");
    fb.set_scissor_box(1, 1, 2, 2);
    fb.set_scissor_enable(true);
    p.set_framebuffer(Some(fb));

    let mut enc = FrameEncoder::begin(&ctx, "frame");
    p.activate(&mut enc).unwrap();
    p.draw_textured_rect(&mut enc, red.id().unwrap(), 0.0, 0.0, 4.0, 4.0)
        .unwrap();
    p.deactivate(&mut enc);
    enc.commit().unwrap();

    let fb = p.framebuffer().unwrap();
    assert_eq!(px(&soft, fb, 1, 1), [255, 0, 0, 255]);
    assert_eq!(px(&soft, fb, 2, 2), [255, 0, 0, 255]);
    assert_eq!(px(&soft, fb, 0, 0), [0, 0, 0, 255]);
    assert_eq!(px(&soft, fb, 3, 1), [0, 0, 0, 255]);
}

#[test]
fn uncommitted_encoder_submits_nothing() {
    let (soft, ctx) = setup();
    let red = solid(&ctx, [255, 0, 0, 255]);
    let mut p = Pipeline::new(&ctx, "p", ShaderId::FragmentSample).unwrap();
    p.set_framebuffer(Some(target(&ctx, "t")));
    {
        let mut enc = FrameEncoder::begin(&ctx, "abandoned");
        p.activate(&mut enc).unwrap();
        p.draw_textured_rect(&mut enc, red.id().unwrap(), 0.0, 0.0, 4.0, 4.0)
            .unwrap();
    }
    assert!(!p.is_active());
    assert_eq!(px(&soft, p.framebuffer().unwrap(), 0, 0), [0, 0, 0, 0]);
}
