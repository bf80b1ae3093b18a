//! Template rendering and request materialization

pub mod renderer;
pub mod request;

pub use renderer::{RenderError, TemplateRenderer, RENDER_ERROR_MARKER};
pub use request::{materialize, RenderedRequest, RENDER_ERROR_HEADER};
