use pulldown_cmark::{html, Options, Parser};

/// Turns preprocessed document bytes into HTML bytes.
pub trait Renderer: Send + Sync {
    fn render(&self, source: &[u8]) -> Vec<u8>;
}

/// CommonMark renderer with tables, strikethrough and footnotes enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, source: &[u8]) -> Vec<u8> {
        // Invalid UTF-8 is replaced rather than rejected
        let text = String::from_utf8_lossy(source);

        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_FOOTNOTES);

        let parser = Parser::new_ext(&text, options);
        let mut out = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out.into_bytes()
    }
}
