pub mod capture;
pub mod engine;

pub use capture::{CaptureCapability, CaptureRequest, MockBrowser, PixelCanvas, SessionHandle};
pub use engine::{CancelToken, Coordinator, RouteState, RunConfig};
