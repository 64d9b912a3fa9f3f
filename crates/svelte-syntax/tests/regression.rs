//! Parses every fixture component and checks the invariants that hold for
//! any input, plus the scenarios pinned as regressions.

use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use svelte_syntax::ast::{ElseBranch, TemplateNode};
use svelte_syntax::{
    parse, parse_with, tokenize, ParseConfig, ParseErrorKind, SwcScriptParser, SyntaxKind,
    MAX_NESTING_DEPTH,
};

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn collect_svelte_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "svelte") {
                files.push(path);
            } else if path.is_dir() {
                files.extend(collect_svelte_files(&path));
            }
        }
    }
    files.sort();
    files
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("failed to read fixture")
}

fn fixture(relative: &str) -> String {
    read(&fixtures_dir().join(relative))
}

#[test]
fn test_every_fixture_round_trips() {
    let files = collect_svelte_files(&fixtures_dir());
    assert!(files.len() >= 5, "fixtures missing: {files:?}");

    for path in &files {
        let source = read(path);
        let result = parse(&source);
        assert_eq!(
            result.syntax().text().to_string(),
            source,
            "{} does not round-trip",
            path.display()
        );

        let tokens = tokenize(&source);
        let mut offset = 0;
        for token in &tokens {
            assert_eq!(token.span.start_usize(), offset, "gap in {}", path.display());
            offset = token.span.end_usize();
        }
        assert_eq!(offset, source.len());

        for error in result.errors() {
            let node = result.error_node(error);
            assert!(node.text_range().contains_range(error.span.to_range()));
            assert!(error.is_recoverable());
        }
    }
}

#[test]
fn test_valid_fixtures_have_no_errors() {
    let files = collect_svelte_files(&fixtures_dir().join("valid"));
    assert!(!files.is_empty(), "no valid fixtures found");

    for path in &files {
        let result = parse(&read(path));
        assert!(
            result.errors().is_empty(),
            "{} should have no errors, but got: {:#?}",
            path.display(),
            result.errors()
        );
        assert!(
            !result
                .syntax()
                .descendants()
                .any(|node| node.kind() == SyntaxKind::ERROR),
            "{} has error nodes",
            path.display()
        );
    }
}

#[test]
fn test_reparse_is_idempotent() {
    for path in collect_svelte_files(&fixtures_dir().join("valid")) {
        let first = parse(&read(&path));
        let second = parse(&first.syntax().text().to_string());
        assert_eq!(first.debug_tree(), second.debug_tree());
        assert_eq!(first.document(), second.document());
    }
}

#[test]
fn test_special_tags_fixture() {
    let result = parse(&fixture("valid/SpecialTags.svelte"));
    assert!(result.errors().is_empty(), "{:#?}", result.errors());

    let keywords: Vec<String> = result
        .syntax()
        .descendants()
        .filter(|node| node.kind() == SyntaxKind::SPECIAL_TAG)
        .filter_map(|node| {
            node.children_with_tokens()
                .filter_map(|element| element.into_token())
                .find(|token| token.kind() == SyntaxKind::KEYWORD)
                .map(|token| token.text().to_string())
        })
        .collect();
    assert_eq!(keywords, vec!["html", "const", "debug", "debug", "render"]);

    let document = result.document();
    assert!(document
        .fragment
        .nodes
        .iter()
        .any(|node| matches!(node, TemplateNode::DebugTag(tag) if tag.identifiers.is_empty())));
}

#[test]
fn test_script_within_script_fixture() {
    let source = fixture("recovery/ScriptWithinScript.svelte");
    let result = parse(&source);
    assert_eq!(result.syntax().text().to_string(), source);

    let kinds: Vec<_> = result.errors().iter().map(|e| &e.kind).collect();
    assert!(kinds.contains(&&ParseErrorKind::NestedScriptTag), "{kinds:?}");
    assert!(
        kinds.contains(&&ParseErrorKind::UnmatchedClosingTag {
            name: "script".into()
        }),
        "{kinds:?}"
    );

    // The first closing tag ends the script; the markup after it is intact.
    let document = result.document();
    let script = document.instance_script.expect("script block");
    assert!(script.content.ends_with("<script>let b = 2;"));
    assert!(document
        .fragment
        .nodes
        .iter()
        .any(|node| matches!(node, TemplateNode::Element(e) if e.name == "p")));
}

#[test]
fn test_unclosed_fixture_recovers() {
    let source = fixture("recovery/Unclosed.svelte");
    let result = parse(&source);
    assert!(!result.errors().is_empty());
    assert_eq!(result.syntax().text().to_string(), source);
    let last = tokenize(&source).pop().expect("tokens");
    assert_eq!(last.kind, SyntaxKind::UNTERMINATED);
}

#[test]
fn test_item_list_document() {
    let document = parse(&fixture("valid/ItemList.svelte")).document();
    let script = document.instance_script.expect("instance script");
    assert_eq!(script.lang, svelte_syntax::ScriptLang::TypeScript);
    assert!(document.style.is_some());

    let significant: Vec<_> = document
        .fragment
        .nodes
        .iter()
        .filter(|node| !matches!(node, TemplateNode::Text(text) if text.is_whitespace))
        .collect();
    assert!(matches!(significant[0], TemplateNode::SvelteElement(_)));
    assert!(matches!(
        significant[1],
        TemplateNode::Element(e) if e.name == "input" && e.self_closing
    ));
    assert!(matches!(significant[2], TemplateNode::IfBlock(_)));
    assert!(matches!(significant[3], TemplateNode::SnippetBlock(s) if s.name == "badge"));
    assert!(matches!(significant[4], TemplateNode::RenderTag(_)));
}

#[test]
fn test_deep_nesting_builds_a_document() {
    let source = format!("{}{}", "<div>{#if a}".repeat(50_000), "{/if}</div>".repeat(50_000));
    let config = ParseConfig {
        delegate: false,
        ..ParseConfig::default()
    };
    let result = parse_with(&source, &config, &SwcScriptParser);
    assert_eq!(result.syntax().text().to_string(), source);
    assert!(result
        .errors()
        .iter()
        .any(|e| e.kind == ParseErrorKind::NestingTooDeep { limit: MAX_NESTING_DEPTH }));

    let document = result.document();
    assert!(matches!(&document.fragment.nodes[0], TemplateNode::Element(e) if e.name == "div"));
}

#[test]
fn test_long_else_if_chain_builds_a_document() {
    let source = format!("{{#if a}}{}{{/if}}", "{:else if a}x".repeat(100_000));
    let config = ParseConfig {
        delegate: false,
        ..ParseConfig::default()
    };
    let document = parse_with(&source, &config, &SwcScriptParser).document();
    let TemplateNode::IfBlock(block) = &document.fragment.nodes[0] else {
        panic!("expected if block");
    };

    let mut levels = 1;
    let mut next = &block.alternate;
    while let Some(ElseBranch::ElseIf(nested)) = next {
        levels += 1;
        next = &nested.alternate;
    }
    assert_eq!(levels, MAX_NESTING_DEPTH);
}
