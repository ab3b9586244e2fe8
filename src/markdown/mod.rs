mod render;

pub use render::MarkdownRender;
