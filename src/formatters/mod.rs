//! Formatter backends

mod html;

pub use html::{HtmlFormatter, render as render_html};
