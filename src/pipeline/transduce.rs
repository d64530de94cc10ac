//! Markdown transducer: ordered block tree → one Markdown fragment.
//!
//! ## Why group list runs?
//!
//! The document API hands back list items as independent sibling blocks.
//! Emitted one by one with paragraph spacing they would become a string of
//! one-item lists, and the downstream slide splitter would happily cut
//! between them. Collecting each maximal run of same-kind items first and
//! writing it as a single tight list keeps the list a unit.
//!
//! ## Indentation
//!
//! Only list items open a new nesting level: a run member's children are
//! transduced at `depth + 1`, two spaces per level. Children of any other
//! container are spliced at the container's own depth.
//!
//! The transducer is a pure function with no shared state, so it is safe to
//! run concurrently on independent inputs. Output order is a deterministic
//! function of input order; nothing is reordered.

use crate::block::{Block, BlockKind, ListKind};

/// Indentation unit per nesting level.
const INDENT: &str = "  ";

/// Code language tag the document API uses for "no language".
const PLAIN_TEXT_LANGUAGE: &str = "plain text";

/// Transduce a root block sequence into Markdown.
pub fn blocks_to_markdown(blocks: &[Block]) -> String {
    let mut out = String::new();
    transduce(blocks, 0, &mut out);
    out
}

fn transduce(blocks: &[Block], depth: usize, out: &mut String) {
    let indent = INDENT.repeat(depth);
    let mut cursor = 0;

    while cursor < blocks.len() {
        let block = &blocks[cursor];

        if let Some(list) = block.kind.list_kind() {
            let run_len = blocks[cursor..]
                .iter()
                .take_while(|b| b.kind.list_kind() == Some(list))
                .count();
            cursor += run_len;
            let followed = cursor < blocks.len();
            emit_list_run(&blocks[cursor - run_len..cursor], list, depth, &indent, followed, out);
            continue;
        }

        emit_block(block, &indent, out);
        if !block.children.is_empty() {
            transduce(&block.children, depth, out);
        }
        cursor += 1;
    }
}

fn emit_list_run(
    run: &[Block],
    list: ListKind,
    depth: usize,
    indent: &str,
    followed: bool,
    out: &mut String,
) {
    let marker = list.marker();
    let continuation = format!("{indent}{}", " ".repeat(marker.len()));

    for item in run {
        let text = item.plain_text();
        let mut lines = text.trim().lines();
        out.push_str(indent);
        out.push_str(marker);
        out.push_str(lines.next().unwrap_or(""));
        out.push('\n');
        for line in lines {
            out.push_str(&continuation);
            out.push_str(line);
            out.push('\n');
        }
        transduce(&item.children, depth + 1, out);
    }

    // The next sibling must not become a lazy continuation of the last item.
    // A nested run at the end of its parent stays tight.
    if depth == 0 || followed {
        ensure_blank_line(out);
    }
}

fn emit_block(block: &Block, indent: &str, out: &mut String) {
    let text = block.plain_text();

    match &block.kind {
        BlockKind::Paragraph => {
            let text = text.trim();
            if text.is_empty() {
                return;
            }
            push_indented(out, indent, text);
            out.push('\n');
        }
        BlockKind::Heading1 => push_heading(out, indent, "#", &text),
        BlockKind::Heading2 => push_heading(out, indent, "##", &text),
        BlockKind::Heading3 => push_heading(out, indent, "###", &text),
        BlockKind::Code { language } => {
            let tag = language
                .as_deref()
                .filter(|l| !l.eq_ignore_ascii_case(PLAIN_TEXT_LANGUAGE))
                .unwrap_or("");
            out.push_str(&format!("{indent}```{tag}\n"));
            push_indented(out, indent, &text);
            out.push_str(&format!("{indent}```\n\n"));
        }
        BlockKind::Quote => {
            let text = text.trim();
            if text.is_empty() {
                out.push_str(&format!("{indent}>\n"));
            }
            for line in text.lines() {
                out.push_str(&format!("{indent}> {line}\n"));
            }
            out.push('\n');
        }
        BlockKind::Image { source, caption } => {
            // Always its own block: the slide splitter treats it as a unit.
            ensure_blank_line(out);
            out.push_str(&format!("{indent}![{}]({})\n\n", caption.trim(), source.url()));
        }
        BlockKind::BulletedListItem | BlockKind::NumberedListItem => {
            unreachable!("list items are emitted as runs")
        }
        BlockKind::Other { .. } => {
            let text = text.trim();
            if !text.is_empty() {
                push_indented(out, indent, text);
                out.push('\n');
            }
        }
    }
}

fn push_heading(out: &mut String, indent: &str, hashes: &str, text: &str) {
    out.push_str(&format!("{indent}{hashes} {}\n\n", text.trim()));
}

/// Push `text` line by line, each prefixed with `indent`.
fn push_indented(out: &mut String, indent: &str, text: &str) {
    for line in text.lines() {
        out.push_str(indent);
        out.push_str(line);
        out.push('\n');
    }
}

fn ensure_blank_line(out: &mut String) {
    if out.is_empty() || out.ends_with("\n\n") {
        return;
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::ImageSource;
    use pretty_assertions::assert_eq;

    #[test]
    fn heading_then_list_with_nested_paragraph() {
        let blocks = vec![
            Block::heading(1, "Intro"),
            Block::bulleted("a"),
            Block::bulleted("b").with_children(vec![Block::paragraph("nested")]),
        ];
        let md = blocks_to_markdown(&blocks);
        assert!(
            md.starts_with("# Intro\n\n- a\n- b\n  nested\n"),
            "got: {md:?}"
        );
        assert_eq!(md, "# Intro\n\n- a\n- b\n  nested\n\n");
    }

    #[test]
    fn empty_input_yields_empty_fragment() {
        assert_eq!(blocks_to_markdown(&[]), "");
    }

    #[test]
    fn whitespace_only_paragraph_is_suppressed() {
        let blocks = vec![
            Block::paragraph("   "),
            Block::paragraph(" \n\t "),
            Block::paragraph(""),
        ];
        assert_eq!(blocks_to_markdown(&blocks), "");
    }

    #[test]
    fn paragraph_is_trimmed_and_spaced() {
        let md = blocks_to_markdown(&[Block::paragraph("  hello  "), Block::paragraph("next")]);
        assert_eq!(md, "hello\n\nnext\n\n");
    }

    #[test]
    fn bulleted_and_numbered_runs_do_not_merge() {
        let blocks = vec![
            Block::bulleted("a"),
            Block::bulleted("b"),
            Block::numbered("c"),
            Block::numbered("d"),
        ];
        assert_eq!(blocks_to_markdown(&blocks), "- a\n- b\n\n1. c\n1. d\n\n");
    }

    #[test]
    fn single_list_item_forms_a_run() {
        assert_eq!(blocks_to_markdown(&[Block::numbered("only")]), "1. only\n\n");
    }

    #[test]
    fn intervening_block_splits_runs() {
        let blocks = vec![
            Block::bulleted("a"),
            Block::paragraph("x"),
            Block::bulleted("b"),
        ];
        assert_eq!(blocks_to_markdown(&blocks), "- a\n\nx\n\n- b\n\n");
    }

    #[test]
    fn list_indentation_is_two_spaces_per_depth() {
        let blocks = vec![Block::bulleted("L0").with_children(vec![Block::bulleted("L1")
            .with_children(vec![Block::bulleted("L2")
                .with_children(vec![Block::numbered("L3")])])])];
        let md = blocks_to_markdown(&blocks);
        assert_eq!(md, "- L0\n  - L1\n    - L2\n      1. L3\n\n");

        for (depth, line) in md.lines().filter(|l| !l.is_empty()).enumerate() {
            let leading = line.len() - line.trim_start().len();
            assert_eq!(leading, 2 * depth, "line {line:?}");
        }
    }

    #[test]
    fn run_members_keep_children_directly_beneath() {
        let blocks = vec![
            Block::bulleted("a").with_children(vec![Block::bulleted("a1"), Block::bulleted("a2")]),
            Block::bulleted("b").with_children(vec![Block::numbered("b1")]),
        ];
        assert_eq!(
            blocks_to_markdown(&blocks),
            "- a\n  - a1\n  - a2\n- b\n  1. b1\n\n"
        );
    }

    #[test]
    fn non_list_container_does_not_indent_children() {
        let blocks = vec![
            Block::paragraph("parent").with_children(vec![Block::paragraph("child")]),
            Block::quote("q").with_children(vec![Block::bulleted("item")]),
        ];
        assert_eq!(
            blocks_to_markdown(&blocks),
            "parent\n\nchild\n\n> q\n\n- item\n\n"
        );
    }

    #[test]
    fn headings_use_hash_levels() {
        let blocks = vec![
            Block::heading(1, "One"),
            Block::heading(2, "Two"),
            Block::heading(3, "Three"),
        ];
        assert_eq!(blocks_to_markdown(&blocks), "# One\n\n## Two\n\n### Three\n\n");
    }

    #[test]
    fn code_block_is_fenced_verbatim() {
        let blocks = vec![Block::code(Some("rust"), "fn main() {\n    println!(\"hi\");\n}")];
        assert_eq!(
            blocks_to_markdown(&blocks),
            "```rust\nfn main() {\n    println!(\"hi\");\n}\n```\n\n"
        );
    }

    #[test]
    fn plain_text_code_language_is_untagged() {
        let md = blocks_to_markdown(&[Block::code(Some("plain text"), "x = 1")]);
        assert_eq!(md, "```\nx = 1\n```\n\n");
        let md = blocks_to_markdown(&[Block::code(None, "y")]);
        assert_eq!(md, "```\ny\n```\n\n");
    }

    #[test]
    fn quote_prefixes_every_line() {
        assert_eq!(
            blocks_to_markdown(&[Block::quote("l1\nl2")]),
            "> l1\n> l2\n\n"
        );
    }

    #[test]
    fn image_occupies_its_own_block() {
        let blocks = vec![
            Block::paragraph("before"),
            Block::image(ImageSource::External("https://x.test/y.png".into())),
            Block::image(ImageSource::File("https://files.test/z.png?sig=1".into())),
            Block::paragraph("after"),
        ];
        assert_eq!(
            blocks_to_markdown(&blocks),
            "before\n\n![](https://x.test/y.png)\n\n![](https://files.test/z.png?sig=1)\n\nafter\n\n"
        );
    }

    #[test]
    fn image_after_nested_list_still_separated() {
        let blocks = vec![
            Block::bulleted("a").with_children(vec![
                Block::bulleted("a1"),
                Block::image(ImageSource::External("https://x.test/i.png".into())),
            ]),
        ];
        assert_eq!(
            blocks_to_markdown(&blocks),
            "- a\n  - a1\n\n  ![](https://x.test/i.png)\n\n"
        );
    }

    #[test]
    fn unknown_kind_falls_back_to_text_or_nothing() {
        let with_text = Block::new(
            BlockKind::Other {
                name: "toggle".into(),
            },
            "Toggle text",
        );
        let without = Block::new(
            BlockKind::Other {
                name: "divider".into(),
            },
            "",
        );
        assert_eq!(blocks_to_markdown(&[with_text, without]), "Toggle text\n\n");
    }

    #[test]
    fn unknown_kind_text_is_its_own_paragraph() {
        let toggle = Block::new(
            BlockKind::Other {
                name: "toggle".into(),
            },
            "Toggle",
        )
        .with_children(vec![Block::paragraph("hidden body")]);
        assert_eq!(blocks_to_markdown(&[toggle]), "Toggle\n\nhidden body\n\n");
    }

    #[test]
    fn sibling_after_nested_run_stays_with_parent_item() {
        let blocks = vec![Block::bulleted("a")
            .with_children(vec![Block::bulleted("a1"), Block::paragraph("p")])];
        assert_eq!(blocks_to_markdown(&blocks), "- a\n  - a1\n\n  p\n\n");
    }

    #[test]
    fn nested_runs_of_different_kinds_are_separated() {
        let blocks = vec![Block::bulleted("a")
            .with_children(vec![Block::bulleted("a1"), Block::numbered("n1")])];
        assert_eq!(blocks_to_markdown(&blocks), "- a\n  - a1\n\n  1. n1\n\n");
    }

    #[test]
    fn first_emitted_element_matches_first_block() {
        let cases: Vec<(Vec<Block>, &str)> = vec![
            (vec![Block::paragraph("p"), Block::heading(1, "h")], "p"),
            (vec![Block::heading(2, "h"), Block::paragraph("p")], "## h"),
            (vec![Block::numbered("n"), Block::bulleted("b")], "1. n"),
            (vec![Block::quote("q"), Block::numbered("n")], "> q"),
        ];
        for (blocks, first) in cases {
            let md = blocks_to_markdown(&blocks);
            assert_eq!(md.lines().next(), Some(first), "for {blocks:?}");
        }
    }

    #[test]
    fn multi_line_list_item_continues_under_marker() {
        let md = blocks_to_markdown(&[Block::numbered("first\nsecond")]);
        assert_eq!(md, "1. first\n   second\n\n");
    }
}
