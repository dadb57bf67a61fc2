//! Capture capability abstraction for browser-driven screenshot capture.
//!
//! The engine never drives a browser itself; it consumes a
//! [`CaptureCapability`] that performs login-form interaction, navigation,
//! page-readiness waits and pixel capture. [`MockBrowser`] is the
//! programmable in-crate realization used for testing.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{ImageBuffer, RgbImage};

use crate::baseline::Viewport;
use crate::classifier::{LoginFlowDescriptor, WaitStrategy};
use crate::error::{VisionError, VisionResult};

/// Opaque handle to an authenticated browser session.
///
/// Established once per run and shared read-only by every route that
/// requires authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Capability-defined session identifier
    pub id: String,
}

/// One screenshot capture request
#[derive(Debug, Clone)]
pub struct CaptureRequest<'a> {
    /// Route under test
    pub route: &'a str,

    /// Fully resolved URL to navigate to
    pub url: String,

    /// Viewport to size the browser window to
    pub viewport: Viewport,

    /// Page-readiness condition to satisfy before capturing
    pub wait: &'a WaitStrategy,

    /// Shared authenticated session, when the route requires one
    pub session: Option<&'a SessionHandle>,
}

/// Trait for capture capabilities
///
/// Implementations must be callable concurrently from multiple route
/// workers.
pub trait CaptureCapability: Send + Sync {
    /// Establish an authenticated session by driving the login flow
    fn login(&self, flow: &LoginFlowDescriptor) -> VisionResult<SessionHandle>;

    /// Navigate, satisfy the wait strategy, and capture PNG image bytes
    fn capture(&self, request: &CaptureRequest<'_>) -> VisionResult<Vec<u8>>;
}

/// An RGB pixel canvas for building screenshot fixtures
///
/// Provides a small drawing API for tests and the mock capture capability:
/// - `fill()` - Fill the canvas with a color
/// - `draw_rect()` - Draw a filled rectangle
/// - `get_pixel()` / `set_pixel()` - Direct pixel access
#[derive(Debug, Clone)]
pub struct PixelCanvas {
    width: u32,
    height: u32,
    /// RGB buffer, row-major, 3 bytes per pixel
    buffer: Vec<u8>,
}

impl PixelCanvas {
    /// Create a canvas with the given dimensions, initialized to black
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            buffer: vec![0u8; (width * height * 3) as usize],
        }
    }

    /// Create a canvas initialized to a specific color
    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut canvas = Self::new(width, height);
        canvas.fill(color);
        canvas
    }

    /// Load a canvas from PNG image bytes
    pub fn from_png_bytes(data: &[u8]) -> VisionResult<Self> {
        let img = image::load_from_memory(data)
            .map_err(|e| VisionError::Capture {
                route: String::new(),
                message: format!("failed to load PNG: {}", e),
            })?
            .to_rgb8();
        Ok(Self {
            width: img.width(),
            height: img.height(),
            buffer: img.into_raw(),
        })
    }

    /// Fill the canvas with a color
    pub fn fill(&mut self, color: [u8; 3]) {
        for chunk in self.buffer.chunks_exact_mut(3) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Draw a filled rectangle, clipped to the canvas
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..(y + h).min(self.height) {
            for px in x..(x + w).min(self.width) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Get the color of a pixel (out of bounds reads as black)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let idx = ((y * self.width + x) * 3) as usize;
        [self.buffer[idx], self.buffer[idx + 1], self.buffer[idx + 2]]
    }

    /// Set the color of a pixel (out of bounds writes are ignored)
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.buffer[idx..idx + 3].copy_from_slice(&color);
    }

    /// Canvas width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Canvas height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Encode the canvas as PNG bytes
    pub fn to_png(&self) -> VisionResult<Vec<u8>> {
        let img: RgbImage = ImageBuffer::from_raw(self.width, self.height, self.buffer.clone())
            .ok_or_else(|| VisionError::Capture {
                route: String::new(),
                message: "buffer size does not match dimensions".to_string(),
            })?;
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| VisionError::Capture {
                route: String::new(),
                message: format!("failed to encode PNG: {}", e),
            })?;
        Ok(bytes)
    }
}

/// Programmable capture capability for tests
///
/// Returns a solid-color page for every route unless a per-route image is
/// configured. Failures and latency can be injected per route or for the
/// login flow, and call counts are observable.
pub struct MockBrowser {
    default_color: [u8; 3],
    route_images: HashMap<String, Vec<u8>>,
    failing_routes: HashSet<String>,
    fail_login: bool,
    capture_delay: Option<Duration>,
    captures: AtomicUsize,
    logins: AtomicUsize,
}

impl MockBrowser {
    /// Create a mock browser rendering a light-gray page everywhere
    pub fn new() -> Self {
        Self {
            default_color: [240, 240, 240],
            route_images: HashMap::new(),
            failing_routes: HashSet::new(),
            fail_login: false,
            capture_delay: None,
            captures: AtomicUsize::new(0),
            logins: AtomicUsize::new(0),
        }
    }

    /// Set the color rendered for routes without a configured image
    pub fn default_color(mut self, color: [u8; 3]) -> Self {
        self.default_color = color;
        self
    }

    /// Configure the exact image returned for a route
    pub fn route_image(mut self, route: impl Into<String>, canvas: &PixelCanvas) -> Self {
        let png = canvas.to_png().unwrap_or_default();
        self.route_images.insert(route.into(), png);
        self
    }

    /// Make captures of a route fail
    pub fn failing_route(mut self, route: impl Into<String>) -> Self {
        self.failing_routes.insert(route.into());
        self
    }

    /// Make the login flow fail
    pub fn fail_login(mut self) -> Self {
        self.fail_login = true;
        self
    }

    /// Inject latency into every capture
    pub fn capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = Some(delay);
        self
    }

    /// Number of captures performed so far
    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    /// Number of login attempts performed so far
    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureCapability for MockBrowser {
    fn login(&self, flow: &LoginFlowDescriptor) -> VisionResult<SessionHandle> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.fail_login {
            return Err(VisionError::Login(format!(
                "mock login rejected at {}",
                flow.login_url
            )));
        }
        Ok(SessionHandle {
            id: "mock-session".to_string(),
        })
    }

    fn capture(&self, request: &CaptureRequest<'_>) -> VisionResult<Vec<u8>> {
        if let Some(delay) = self.capture_delay {
            std::thread::sleep(delay);
        }
        self.captures.fetch_add(1, Ordering::SeqCst);

        if self.failing_routes.contains(request.route) {
            return Err(VisionError::Capture {
                route: request.route.to_string(),
                message: "mock capture failure".to_string(),
            });
        }

        if let Some(png) = self.route_images.get(request.route) {
            return Ok(png.clone());
        }

        PixelCanvas::with_color(
            request.viewport.width,
            request.viewport.height,
            self.default_color,
        )
        .to_png()
    }
}
