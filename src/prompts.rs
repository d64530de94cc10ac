//! Instruction prompt for the content reshaper.
//!
//! Callers can override it via [`crate::config::ExportConfig::system_prompt`];
//! this constant is used only when no override is provided.

/// Default instruction sent ahead of the document Markdown.
///
/// Asks for Marp slide Markdown: `---` slide breaks, Marp front matter,
/// long content split across slides, no invented or dropped content, and
/// images on slides of their own.
pub const DEFAULT_RESHAPE_PROMPT: &str = r#"Here is a general markdown document.

Please convert this file to markdown for Marp slides.

Conversion conditions:
- Separate each main section or header (#, ##, etc.) into a new slide, and insert slide dividers (---) appropriately.
- Automatically split the content into multiple slides if it is long so that too much content is not crammed into one slide.
- Separate the title (#) and the body (text, list, table, etc.) of each slide.
- To apply Marp slide styles, add `---\nmarp: true\n---` to the beginning of the document.
- If the table, code block, or quote is too long, automatically split the slide to make it visually better.
- If the list items are too long or too deeply nested, split it into multiple slides as needed. When splitting deeply nested lists, repeat the parent list items at the top of each new slide for context.
- For nested lists, indent using **2 spaces per level** (for example: `- item\n  - subitem`) to prevent them from being recognized as code blocks.
- Do not create new content arbitrarily.
- Do not summarize or delete the original content.
- Do not attach any additional explanations, guidance, or commentary other than the input, and only output the converted Marp Markdown results.
- Images should appear independently on a single page.

Please convert the markdown below."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_asks_for_marp_with_slide_breaks() {
        assert!(DEFAULT_RESHAPE_PROMPT.contains("Marp slides"));
        assert!(DEFAULT_RESHAPE_PROMPT.contains("slide dividers (---)"));
        assert!(DEFAULT_RESHAPE_PROMPT.contains("marp: true"));
    }

    #[test]
    fn prompt_forbids_invented_or_dropped_content() {
        assert!(DEFAULT_RESHAPE_PROMPT.contains("Do not create new content"));
        assert!(DEFAULT_RESHAPE_PROMPT.contains("Do not summarize or delete"));
    }

    #[test]
    fn prompt_ends_with_handoff_line() {
        assert!(DEFAULT_RESHAPE_PROMPT.ends_with("Please convert the markdown below."));
    }
}
