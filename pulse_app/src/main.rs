//! Pulse demo application
//!
//! Clears the window to a fixed color while streaming pulsing uniform
//! data each frame, exercising the engine's bring-up, upload, readback,
//! and resize paths.

use glfw::{Action, Key, WindowEvent};
use present_engine::ash::vk;
use present_engine::{Buffer, Renderer, RendererConfig, TextureImage, Window};
use std::time::Instant;

/// Per-frame data handed to the renderer as raw bytes
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct PulseUniforms {
    elapsed: f32,
    pulse: f32,
    _pad: [f32; 2],
    tint: [f32; 4],
}

unsafe impl bytemuck::Zeroable for PulseUniforms {}
unsafe impl bytemuck::Pod for PulseUniforms {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

unsafe impl bytemuck::Zeroable for Vertex {}
unsafe impl bytemuck::Pod for Vertex {}

const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        position: [-0.5, -0.5],
        color: [1.0, 0.2, 0.2],
    },
    Vertex {
        position: [0.5, -0.5],
        color: [0.2, 1.0, 0.2],
    },
    Vertex {
        position: [0.5, 0.5],
        color: [0.2, 0.2, 1.0],
    },
    Vertex {
        position: [-0.5, 0.5],
        color: [1.0, 1.0, 0.2],
    },
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

const TEXTURE_SIZE: u32 = 64;

/// Procedural RGBA checkerboard in two shades of blue
fn checkerboard_pixels() -> Vec<u8> {
    let mut pixels = Vec::with_capacity((TEXTURE_SIZE * TEXTURE_SIZE * 4) as usize);
    for y in 0..TEXTURE_SIZE {
        for x in 0..TEXTURE_SIZE {
            let cell = ((x / 8) + (y / 8)) % 2;
            let (r, g, b) = if cell == 0 { (40, 90, 200) } else { (15, 30, 80) };
            pixels.extend_from_slice(&[r, g, b, 255]);
        }
    }
    pixels
}

struct PulseApp {
    // GPU resources are declared before the renderer so they are released
    // while the device still exists.
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    texture: TextureImage,
    renderer: Renderer,
    window: Window,
    start_time: Instant,
}

impl PulseApp {
    fn new(config: RendererConfig) -> Result<Self, Box<dyn std::error::Error>> {
        log::info!(
            "Creating window {}x{}",
            config.window_width,
            config.window_height
        );
        let mut window = Window::new(
            &config.window_title,
            config.window_width,
            config.window_height,
        )?;

        log::info!("Bringing up renderer...");
        let renderer = Renderer::new(
            &mut window,
            &config,
            std::mem::size_of::<PulseUniforms>() as vk::DeviceSize,
        )?;

        log::info!("Uploading demo geometry...");
        let vertex_buffer = renderer.upload_slice(
            &QUAD_VERTICES,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        let index_buffer =
            renderer.upload_slice(&QUAD_INDICES, vk::BufferUsageFlags::INDEX_BUFFER)?;

        let pixels = checkerboard_pixels();
        let texture = renderer.upload_texture(
            &pixels,
            TEXTURE_SIZE,
            TEXTURE_SIZE,
            vk::Format::R8G8B8A8_SRGB,
        )?;

        // Round-trip the vertex data to confirm the transfer path end to end.
        let echoed = renderer.download_buffer(&vertex_buffer)?;
        if echoed == bytemuck::cast_slice::<Vertex, u8>(&QUAD_VERTICES) {
            log::info!("Upload round-trip verified ({} bytes)", echoed.len());
        } else {
            log::warn!("Upload round-trip mismatch");
        }

        Ok(Self {
            vertex_buffer,
            index_buffer,
            texture,
            renderer,
            window,
            start_time: Instant::now(),
        })
    }

    fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        log::info!(
            "Entering frame loop; resident: vertex {} B, index {} B, texture {}x{}",
            self.vertex_buffer.size(),
            self.index_buffer.size(),
            self.texture.extent().width,
            self.texture.extent().height
        );

        while !self.window.should_close() {
            self.window.poll_events();

            // Collect events so handling them can borrow the window again.
            let events: Vec<_> = self.window.flush_events().collect();
            for (_, event) in events {
                match event {
                    WindowEvent::Key(Key::Escape, _, Action::Press, _) => {
                        self.window.set_should_close(true);
                    }
                    WindowEvent::FramebufferSize(_, _) => {
                        self.renderer.notify_resize();
                    }
                    _ => {}
                }
            }

            let uniforms = self.frame_uniforms();
            self.renderer
                .draw_frame(&mut self.window, bytemuck::bytes_of(&uniforms))?;
        }

        self.renderer.wait_idle()?;
        log::info!("Pulse demo finished");
        Ok(())
    }

    fn frame_uniforms(&self) -> PulseUniforms {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        // One pulse every two seconds.
        let pulse = (elapsed * std::f32::consts::PI).sin() * 0.5 + 0.5;
        PulseUniforms {
            elapsed,
            pulse,
            _pad: [0.0; 2],
            tint: [0.1 + 0.9 * pulse, 0.2, 1.0 - 0.9 * pulse, 1.0],
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting pulse demo");

    let config = match RendererConfig::load_from_file("pulse_app.toml") {
        Ok(config) => {
            log::info!("Loaded configuration from pulse_app.toml");
            config
        }
        Err(e) => {
            log::debug!("No usable pulse_app.toml ({e}); using built-in defaults");
            RendererConfig::new("pulse")
                .with_version(0, 1, 0)
                .with_window("Pulse", 800, 600)
                .with_clear_color([0.02, 0.02, 0.08, 1.0])
        }
    };

    let mut app = PulseApp::new(config)?;
    app.run()
}
