//! Slide renderer: slide Markdown → paginated HTML plus stylesheet.
//!
//! The reshaper emits Marp-flavoured Markdown: optional YAML front matter,
//! then slides separated by lines that are exactly `---`. The basic renderer
//! honours that structure and nothing more: each slide becomes one
//! `<section class="slide">` sized to a 16:9 page. Marp directives in HTML
//! comments pass through as inert comments.

use pulldown_cmark::{html, Options, Parser};

/// Renderer output: an HTML fragment and the CSS it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSlides {
    pub html: String,
    pub css: String,
    /// Number of `<section>`s in `html`.
    pub slide_count: usize,
}

/// Turns slide Markdown into HTML and CSS.
pub trait SlideRenderer: Send + Sync {
    fn render(&self, markdown: &str) -> RenderedSlides;
}

const SLIDE_CSS: &str = r#"@page { size: 1280px 720px; margin: 0; }
.slide {
  box-sizing: border-box;
  width: 1280px;
  height: 720px;
  padding: 56px 80px;
  overflow: hidden;
  break-after: page;
  page-break-after: always;
  font-family: -apple-system, "Segoe UI", "Noto Sans", "Noto Sans CJK KR", Helvetica, Arial, sans-serif;
  font-size: 28px;
  line-height: 1.45;
  color: #1f2328;
}
.slide:last-child { break-after: auto; page-break-after: auto; }
.slide h1 { font-size: 56px; margin: 0 0 24px; }
.slide h2 { font-size: 44px; margin: 0 0 20px; }
.slide h3 { font-size: 34px; margin: 0 0 16px; }
.slide ul, .slide ol { padding-left: 1.2em; }
.slide img { display: block; max-width: 100%; max-height: 560px; margin: 0 auto; object-fit: contain; }
.slide pre { background: #f6f8fa; padding: 16px; border-radius: 6px; font-size: 20px; overflow: hidden; }
.slide code { font-family: ui-monospace, "SFMono-Regular", Menlo, Consolas, monospace; }
.slide blockquote { margin: 0; padding-left: 20px; border-left: 6px solid #d0d7de; color: #59636e; }
.slide table { border-collapse: collapse; font-size: 22px; }
.slide th, .slide td { border: 1px solid #d0d7de; padding: 6px 12px; }
"#;

/// pulldown-cmark renderer with a fixed 1280×720 theme.
#[derive(Debug, Clone)]
pub struct BasicSlideRenderer {
    css: String,
}

impl Default for BasicSlideRenderer {
    fn default() -> Self {
        Self {
            css: SLIDE_CSS.to_string(),
        }
    }
}

impl BasicSlideRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append extra CSS after the built-in theme.
    pub fn with_extra_css(mut self, css: &str) -> Self {
        self.css.push_str(css);
        self
    }

    fn parser_options() -> Options {
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
    }
}

impl SlideRenderer for BasicSlideRenderer {
    fn render(&self, markdown: &str) -> RenderedSlides {
        let slides = split_slides(strip_front_matter(markdown));
        let mut out = String::with_capacity(markdown.len() * 2);

        for slide in &slides {
            out.push_str("<section class=\"slide\">\n");
            html::push_html(&mut out, Parser::new_ext(slide, Self::parser_options()));
            out.push_str("</section>\n");
        }

        RenderedSlides {
            html: out,
            css: self.css.clone(),
            slide_count: slides.len(),
        }
    }
}

/// Build the standalone document handed to the capture stage.
pub fn wrap_document(html: &str, css: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\">\
         <style>{css}</style>\
         <style>html,body{{margin:0;padding:0;background:#fff;}}</style>\
         </head><body>{html}</body></html>"
    )
}

/// Drop a leading YAML front-matter block (`---` … `---`).
///
/// The block is only recognised when every non-blank line inside looks like
/// YAML (`key: value`, a list item, or an indented continuation); otherwise a
/// leading `---` is an ordinary slide break.
pub fn strip_front_matter(markdown: &str) -> &str {
    let body = markdown.trim_start_matches(['\n', '\r']);
    let Some(rest) = body.strip_prefix("---") else {
        return markdown;
    };
    let Some(rest) = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
    else {
        return markdown;
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if content.trim_end() == "---" {
            return &rest[offset + line.len()..];
        }
        if !content.trim().is_empty() && !is_yaml_line(content) {
            return markdown;
        }
        offset += line.len();
    }
    markdown
}

fn is_yaml_line(line: &str) -> bool {
    if line.starts_with([' ', '\t', '-']) {
        return true;
    }
    match line.split_once(':') {
        Some((key, _)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        }
        None => false,
    }
}

/// Split slide Markdown on `---` lines outside fenced code. Blank slides are
/// dropped.
pub fn split_slides(markdown: &str) -> Vec<String> {
    let mut slides = Vec::new();
    let mut current = String::new();
    let mut fence = FenceTracker::default();

    for line in markdown.lines() {
        if !fence.update(line) && !fence.in_fence() && line.trim_end() == "---" {
            push_slide(&mut slides, &mut current);
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    push_slide(&mut slides, &mut current);
    slides
}

fn push_slide(slides: &mut Vec<String>, current: &mut String) {
    let slide = std::mem::take(current);
    if !slide.trim().is_empty() {
        slides.push(slide);
    }
}

/// Backtick/tilde fence state for line-by-line scanning.
#[derive(Debug, Default)]
struct FenceTracker {
    fence_char: Option<char>,
    fence_len: usize,
}

impl FenceTracker {
    fn in_fence(&self) -> bool {
        self.fence_char.is_some()
    }

    /// Returns `true` if `line` opened or closed a fence.
    fn update(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match self.fence_char {
            Some(ch) => {
                let count = trimmed.chars().take_while(|&c| c == ch).count();
                let closes = count >= self.fence_len
                    && trimmed[count * ch.len_utf8()..].chars().all(char::is_whitespace);
                if closes {
                    self.fence_char = None;
                    self.fence_len = 0;
                }
                closes
            }
            None => {
                let Some(first) = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')
                else {
                    return false;
                };
                let count = trimmed.chars().take_while(|&c| c == first).count();
                if count >= 3 {
                    self.fence_char = Some(first);
                    self.fence_len = count;
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_on_rule_lines() {
        let slides = split_slides("# One\n\n---\n\n# Two\n---\n# Three\n");
        assert_eq!(slides.len(), 3);
        assert!(slides[0].contains("# One"));
        assert!(slides[2].contains("# Three"));
    }

    #[test]
    fn rule_inside_code_fence_is_not_a_break() {
        let md = "# Code\n\n```yaml\n---\nkey: v\n```\n\n---\n\n# Next";
        let slides = split_slides(md);
        assert_eq!(slides.len(), 2);
        assert!(slides[0].contains("---\nkey: v"));
    }

    #[test]
    fn tilde_fence_needs_matching_close() {
        let md = "~~~~\n```\n---\n~~~\n---\n~~~~\n---\nafter";
        let slides = split_slides(md);
        assert_eq!(slides.len(), 2, "{slides:?}");
        assert_eq!(slides[1], "after\n");
    }

    #[test]
    fn empty_slides_are_dropped() {
        assert_eq!(split_slides("---\n\n---\n# Only\n---\n  \n"), vec!["# Only\n"]);
        assert!(split_slides("").is_empty());
    }

    #[test]
    fn front_matter_is_removed() {
        let md = "---\nmarp: true\ntheme: default\npaginate: true\n---\n\n# Title\n";
        assert_eq!(strip_front_matter(md), "\n# Title\n");
    }

    #[test]
    fn leading_break_is_not_front_matter() {
        let md = "---\n# Heading\n\nSome prose here.\n---\n# Two";
        assert_eq!(strip_front_matter(md), md);
    }

    #[test]
    fn render_emits_one_section_per_slide() {
        let md = "---\nmarp: true\n---\n\n# A\n\n- x\n- y\n\n---\n\n## B\n\n| h |\n|---|\n| c |\n";
        let out = BasicSlideRenderer::new().render(md);

        assert_eq!(out.slide_count, 2);
        assert_eq!(out.html.matches("<section class=\"slide\">").count(), 2);
        assert!(out.html.contains("<h1>A</h1>"));
        assert!(out.html.contains("<li>x</li>"));
        assert!(out.html.contains("<table>"));
        assert!(!out.html.contains("marp: true"));
        assert!(out.css.contains("@page { size: 1280px 720px"));
    }

    #[test]
    fn image_renders_as_img() {
        let out = BasicSlideRenderer::new().render("![cap](https://x.test/a.png)");
        assert!(out.html.contains(r#"<img src="https://x.test/a.png" alt="cap""#));
    }

    #[test]
    fn extra_css_is_appended() {
        let out = BasicSlideRenderer::new()
            .with_extra_css(".slide{color:red}")
            .render("# x");
        assert!(out.css.ends_with(".slide{color:red}"));
    }

    #[test]
    fn wrapped_document_is_standalone() {
        let doc = wrap_document("<section>hi</section>", "p{}");
        assert!(doc.starts_with("<!doctype html>"));
        assert!(doc.contains("<meta charset=\"utf-8\">"));
        assert!(doc.contains("<style>p{}</style>"));
        assert!(doc.contains("html,body{margin:0;padding:0;background:#fff;}"));
        assert!(doc.ends_with("<body><section>hi</section></body></html>"));
    }
}
