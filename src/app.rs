//! Host shell: a winit window and surface hosting the engine.
//!
//! The shell only translates window events into typed engine requests
//! (cursor drag, keyboard force, visibility) and drives one frame per
//! redraw. When the window is occluded the loop idles on a coarse timer
//! instead of the redraw callback.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec2;
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::engine::channel::{self, EngineRequest, EngineResponse};
use crate::engine::config::{EngineOptions, PhysicsConstants, WORLD_SIZE};
use crate::engine::error::EngineError;
use crate::engine::scene::{Beam, Particle, SceneStore};
use crate::engine::{request_device, SoftbodyEngine};

/// A hanging cloth lattice for the demo binary.
fn demo_scene() -> SceneStore {
    let mut scene = SceneStore::new();
    let cols = 16u16;
    let rows = 10u16;
    let spacing = 24.0;
    let origin = Vec2::new(
        (WORLD_SIZE - (cols - 1) as f32 * spacing) / 2.0,
        WORLD_SIZE * 0.65,
    );

    let id = |x: u16, y: u16| y * cols + x;
    for y in 0..rows {
        for x in 0..cols {
            let position = origin + Vec2::new(x as f32 * spacing, -(y as f32) * spacing);
            scene
                .add_particle(id(x, y), Particle::at(position))
                .expect("demo scene fits capacity");
        }
    }

    let mut link = |a: u16, b: u16, rest: f32| {
        let beam_id = scene.first_empty_beam_id().expect("demo scene fits capacity");
        scene
            .add_beam(beam_id, Beam::relaxed(a, b, rest, 40.0, 3.0, 0.08, 0.6))
            .expect("demo scene endpoints exist");
    };
    let diagonal = spacing * std::f32::consts::SQRT_2;
    for y in 0..rows {
        for x in 0..cols {
            if x + 1 < cols {
                link(id(x, y), id(x + 1, y), spacing);
            }
            if y + 1 < rows {
                link(id(x, y), id(x, y + 1), spacing);
            }
            if x + 1 < cols && y + 1 < rows {
                link(id(x, y), id(x + 1, y + 1), diagonal);
                link(id(x + 1, y), id(x, y + 1), diagonal);
            }
        }
    }
    scene
}

fn key_force(pressed: &HashSet<KeyCode>) -> Vec2 {
    let mut force = Vec2::ZERO;
    for key in pressed {
        force += match key {
            KeyCode::ArrowLeft | KeyCode::KeyA => Vec2::new(-1.0, 0.0),
            KeyCode::ArrowRight | KeyCode::KeyD => Vec2::new(1.0, 0.0),
            KeyCode::ArrowUp | KeyCode::KeyW => Vec2::new(0.0, 1.0),
            KeyCode::ArrowDown | KeyCode::KeyS => Vec2::new(0.0, -1.0),
            _ => Vec2::ZERO,
        };
    }
    force
}

pub fn run() -> Result<(), EngineError> {
    let event_loop = EventLoop::new()
        .map_err(|e| EngineError::UnsupportedDevice(format!("no event loop: {e}")))?;

    let window_attributes = winit::window::Window::default_attributes()
        .with_title("beambox")
        .with_inner_size(winit::dpi::PhysicalSize::new(900, 900));

    #[allow(deprecated)]
    let window = Arc::new(
        event_loop
            .create_window(window_attributes)
            .map_err(|e| EngineError::UnsupportedDevice(format!("no window: {e}")))?,
    );

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });
    let surface = instance
        .create_surface(window.clone())
        .map_err(|e| EngineError::UnsupportedDevice(e.to_string()))?;
    let (adapter, device, queue) = request_device(&instance, &surface)?;

    let size = window.inner_size();
    let surface_caps = surface.get_capabilities(&adapter);
    let surface_format = surface_caps
        .formats
        .iter()
        .find(|f| f.is_srgb())
        .copied()
        .unwrap_or(surface_caps.formats[0]);

    let mut config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode: surface_caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);

    let (host, endpoint) = channel::channel();
    let mut engine = SoftbodyEngine::new(
        device,
        queue,
        surface_format,
        EngineOptions::default(),
        PhysicsConstants::default(),
        endpoint,
    )?;
    engine.write_scene(&demo_scene());

    let mut pressed: HashSet<KeyCode> = HashSet::new();
    let mut cursor_pos = Vec2::ZERO;
    let mut cursor_active = false;
    let mut hidden = false;
    let mut saved_snapshot: Option<Vec<u8>> = None;
    let mut last_frame = Instant::now();

    let send_input = |host: &channel::HostChannel,
                      pressed: &HashSet<KeyCode>,
                      cursor_pos: Vec2,
                      cursor_active: bool| {
        let _ = host.requests.send(EngineRequest::Input {
            force: key_force(pressed),
            cursor_pos,
            cursor_active,
        });
    };

    #[allow(deprecated)]
    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, window_id } if window_id == window.id() => {
                    match event {
                        WindowEvent::CloseRequested => {
                            engine.destroy();
                            elwt.exit();
                        }
                        WindowEvent::Resized(physical_size) => {
                            if physical_size.width > 0 && physical_size.height > 0 {
                                config.width = physical_size.width;
                                config.height = physical_size.height;
                                surface.configure(engine.device(), &config);
                            }
                        }
                        WindowEvent::Occluded(occluded) => {
                            hidden = occluded;
                            let _ = host
                                .requests
                                .send(EngineRequest::VisibilityChange { hidden });
                        }
                        WindowEvent::CursorMoved { position, .. } => {
                            cursor_pos = Vec2::new(
                                position.x as f32 / config.width as f32 * WORLD_SIZE,
                                (1.0 - position.y as f32 / config.height as f32) * WORLD_SIZE,
                            );
                            send_input(&host, &pressed, cursor_pos, cursor_active);
                        }
                        WindowEvent::MouseInput { button, state, .. } => {
                            if button == MouseButton::Left {
                                cursor_active = state == ElementState::Pressed;
                                send_input(&host, &pressed, cursor_pos, cursor_active);
                            }
                        }
                        WindowEvent::KeyboardInput { event, .. } => {
                            if let PhysicalKey::Code(code) = event.physical_key {
                                match event.state {
                                    ElementState::Pressed => {
                                        pressed.insert(code);
                                        match code {
                                            KeyCode::F5 => {
                                                let _ = host
                                                    .requests
                                                    .send(EngineRequest::SnapshotSave);
                                            }
                                            KeyCode::F9 => {
                                                if let Some(bytes) = saved_snapshot.clone() {
                                                    let _ = host.requests.send(
                                                        EngineRequest::SnapshotLoad(bytes),
                                                    );
                                                }
                                            }
                                            KeyCode::F12 => {
                                                let _ = host
                                                    .requests
                                                    .send(EngineRequest::CorruptBuffers);
                                            }
                                            _ => {}
                                        }
                                    }
                                    ElementState::Released => {
                                        pressed.remove(&code);
                                    }
                                }
                                send_input(&host, &pressed, cursor_pos, cursor_active);
                            }
                        }
                        WindowEvent::RedrawRequested => {
                            if engine.is_shutdown() {
                                elwt.exit();
                                return;
                            }
                            if hidden {
                                return;
                            }

                            let now = Instant::now();
                            let dt_wall = now.duration_since(last_frame).as_secs_f32();
                            last_frame = now;

                            let output = match surface.get_current_texture() {
                                Ok(output) => output,
                                Err(error) => {
                                    log::warn!("surface lost a frame: {error}");
                                    surface.configure(engine.device(), &config);
                                    return;
                                }
                            };
                            let view = output
                                .texture
                                .create_view(&wgpu::TextureViewDescriptor::default());

                            match engine.frame(&view, dt_wall) {
                                Ok(()) => {}
                                Err(EngineError::Transient(message)) => {
                                    log::warn!("frame dropped: {message}");
                                }
                                Err(error) => {
                                    log::error!("engine stopped: {error}");
                                    elwt.exit();
                                }
                            }
                            output.present();
                        }
                        _ => {}
                    }
                }
                Event::AboutToWait => {
                    for response in host.responses.try_iter() {
                        match response {
                            EngineResponse::Framerate(fps) => {
                                window.set_title(&format!("beambox - {fps:.0} fps"));
                            }
                            EngineResponse::Snapshot(bytes) => {
                                log::info!("snapshot saved ({} bytes)", bytes.len());
                                saved_snapshot = Some(bytes);
                            }
                            EngineResponse::SnapshotLoaded(ok) => {
                                log::info!("snapshot load: {}", if ok { "ok" } else { "failed" });
                            }
                            _ => {}
                        }
                    }

                    if hidden {
                        elwt.set_control_flow(ControlFlow::WaitUntil(
                            Instant::now() + Duration::from_millis(250),
                        ));
                    } else {
                        window.request_redraw();
                    }
                }
                _ => {}
            }
        })
        .map_err(|e| EngineError::UnsupportedDevice(format!("event loop failed: {e}")))?;

    Ok(())
}
