//! Round-trips against a live Vulkan device
//!
//! Ignored by default. Run with `cargo test -- --ignored` on a machine
//! with a Vulkan driver and a display.

use present_engine::ash::vk;
use present_engine::{
    DeviceContext, Renderer, RendererConfig, StagingBuffer, TransferEngine, Window,
};

fn bring_up() -> (Window, DeviceContext) {
    let config = RendererConfig::new("present_engine tests")
        .with_window("present_engine tests", 320, 240)
        .with_validation(false);
    let mut window = Window::new(
        &config.window_title,
        config.window_width,
        config.window_height,
    )
    .expect("window creation");
    let context = DeviceContext::new(&mut window, &config).expect("device bring-up");
    (window, context)
}

#[test]
#[ignore = "requires a Vulkan device and a display"]
fn buffer_round_trip_preserves_bytes() {
    let (_window, context) = bring_up();
    let transfer = TransferEngine::new(&context).expect("transfer engine");

    for size in [1usize, 4096, 1 << 20] {
        let payload: Vec<u8> = (0..size).map(|i| (i * 31 % 251) as u8).collect();
        let buffer = transfer
            .upload_buffer(
                &payload,
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
            )
            .expect("upload");
        let echoed = transfer.download_buffer(&buffer).expect("download");
        assert_eq!(echoed, payload, "{size} byte payload");
    }

    assert!(transfer
        .upload_buffer(&[], vk::BufferUsageFlags::VERTEX_BUFFER)
        .is_err());
}

#[test]
#[ignore = "requires a Vulkan device and a display"]
fn image_upload_completes_and_releases_staging() {
    let (_window, context) = bring_up();
    let transfer = TransferEngine::new(&context).expect("transfer engine");

    let before = StagingBuffer::live_count();
    let pixels = vec![128u8; 16 * 16 * 4];
    let image = transfer
        .upload_image(&pixels, 16, 16, vk::Format::R8G8B8A8_UNORM)
        .expect("image upload");

    assert_eq!(image.extent().width, 16);
    assert_eq!(image.extent().height, 16);
    assert_eq!(StagingBuffer::live_count(), before);
}

#[test]
#[ignore = "requires a Vulkan device and a display"]
fn renderer_presents_a_few_frames() {
    let config = RendererConfig::new("present_engine tests")
        .with_window("present_engine tests", 320, 240)
        .with_validation(false)
        .with_max_frames_in_flight(2);
    let mut window = Window::new(
        &config.window_title,
        config.window_width,
        config.window_height,
    )
    .expect("window creation");
    let mut renderer = Renderer::new(&mut window, &config, 16).expect("renderer bring-up");

    let uniforms = [7u8; 16];
    for _ in 0..3 {
        window.poll_events();
        renderer.draw_frame(&mut window, &uniforms).expect("frame");
    }
    renderer.wait_idle().expect("device idle");
}
