//! AST types for Svelte 5.
//!
//! The AST is a typed view of the concrete syntax tree. It keeps only the
//! semantically meaningful constructs: branch, wrapper and whitespace-only
//! housekeeping nodes are folded away and `ERROR` nodes are dropped. Every
//! node keeps the span of the text it came from.

use smol_str::SmolStr;
use source_map::Span;

use crate::script::ScriptLang;
use crate::{SyntaxKind, SyntaxNode, SyntaxToken};

/// A complete Svelte document.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SvelteDocument {
    /// The module-level script (`<script module>` or `<script context="module">`).
    pub module_script: Option<Script>,
    /// The instance script (`<script>`).
    pub instance_script: Option<Script>,
    /// The style block (`<style>`).
    pub style: Option<Style>,
    /// The template fragment.
    pub fragment: Fragment,
    /// The span of the entire document.
    pub span: Span,
}

/// A script block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Script {
    /// The span of the entire script block including tags.
    pub span: Span,
    /// The span of just the script content.
    pub content_span: Span,
    /// The raw content of the script.
    pub content: String,
    /// The script language.
    pub lang: ScriptLang,
    /// The script context (module or default).
    pub context: ScriptContext,
    /// Attributes on the script tag.
    pub attributes: Vec<Attribute>,
}

/// The context of a script block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(rename_all = "lowercase"))]
pub enum ScriptContext {
    /// Default instance context.
    #[default]
    Default,
    /// Module context.
    Module,
}

/// A style block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Style {
    /// The span of the entire style block including tags.
    pub span: Span,
    /// The span of just the style content.
    pub content_span: Span,
    /// The raw content of the style.
    pub content: String,
    /// Whether this is a global style.
    pub global: bool,
    /// Attributes on the style tag.
    pub attributes: Vec<Attribute>,
}

/// A template fragment containing child nodes.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Fragment {
    /// The child nodes.
    pub nodes: Vec<TemplateNode>,
    /// The span of the fragment.
    pub span: Span,
}

/// A node in the template.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(tag = "type"))]
pub enum TemplateNode {
    /// A regular HTML element.
    Element(Element),
    /// A component (capitalized or dotted name).
    Component(Component),
    /// A `svelte:*` element.
    SvelteElement(SvelteElement),
    /// Text content.
    Text(Text),
    /// An HTML comment.
    Comment(Comment),
    /// `{expression}`
    Expression(ExpressionTag),
    /// `{@html ...}`
    HtmlTag(HtmlTag),
    /// `{@const ...}`
    ConstTag(ConstTag),
    /// `{@debug ...}`
    DebugTag(DebugTag),
    /// `{@render ...}`
    RenderTag(RenderTag),
    /// `{#if}`
    IfBlock(IfBlock),
    /// `{#each}`
    EachBlock(EachBlock),
    /// `{#await}`
    AwaitBlock(AwaitBlock),
    /// `{#key}`
    KeyBlock(KeyBlock),
    /// `{#snippet}`
    SnippetBlock(SnippetBlock),
}

impl TemplateNode {
    /// Returns the span of this node.
    pub fn span(&self) -> Span {
        match self {
            TemplateNode::Element(n) => n.span,
            TemplateNode::Component(n) => n.span,
            TemplateNode::SvelteElement(n) => n.span,
            TemplateNode::Text(n) => n.span,
            TemplateNode::Comment(n) => n.span,
            TemplateNode::Expression(n) => n.span,
            TemplateNode::HtmlTag(n) => n.span,
            TemplateNode::ConstTag(n) => n.span,
            TemplateNode::DebugTag(n) => n.span,
            TemplateNode::RenderTag(n) => n.span,
            TemplateNode::IfBlock(n) => n.span,
            TemplateNode::EachBlock(n) => n.span,
            TemplateNode::AwaitBlock(n) => n.span,
            TemplateNode::KeyBlock(n) => n.span,
            TemplateNode::SnippetBlock(n) => n.span,
        }
    }
}

/// A regular HTML element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Element {
    /// The span of the entire element.
    pub span: Span,
    /// The tag name.
    pub name: SmolStr,
    /// Attributes in source order.
    pub attributes: Vec<Attribute>,
    /// Child nodes.
    pub children: Vec<TemplateNode>,
    /// Whether the tag was written as self-closing (`<x />`).
    pub self_closing: bool,
}

/// A component instance.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Component {
    /// The span of the entire component.
    pub span: Span,
    /// The component name, including any dotted path.
    pub name: SmolStr,
    /// Attributes in source order.
    pub attributes: Vec<Attribute>,
    /// Child nodes.
    pub children: Vec<TemplateNode>,
    /// Whether the tag was written as self-closing (`<x />`).
    pub self_closing: bool,
}

/// A special Svelte element (`svelte:*`).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SvelteElement {
    /// The span of the entire element.
    pub span: Span,
    /// Which `svelte:*` element this is.
    pub kind: SvelteElementKind,
    /// Attributes in source order.
    pub attributes: Vec<Attribute>,
    /// Child nodes.
    pub children: Vec<TemplateNode>,
}

/// Kinds of special Svelte elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(rename_all = "lowercase"))]
pub enum SvelteElementKind {
    /// `<svelte:self>`
    #[cfg_attr(feature = "serde", serde(rename = "self"))]
    Self_,
    /// `<svelte:component>`
    Component,
    /// `<svelte:element>`
    Element,
    /// `<svelte:window>`
    Window,
    /// `<svelte:document>`
    Document,
    /// `<svelte:body>`
    Body,
    /// `<svelte:head>`
    Head,
    /// `<svelte:options>`
    Options,
    /// `<svelte:fragment>`
    Fragment,
    /// `<svelte:boundary>`
    Boundary,
}

impl SvelteElementKind {
    /// Maps the part of the tag name after `svelte:`.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "self" => Self::Self_,
            "component" => Self::Component,
            "element" => Self::Element,
            "window" => Self::Window,
            "document" => Self::Document,
            "body" => Self::Body,
            "head" => Self::Head,
            "options" => Self::Options,
            "fragment" => Self::Fragment,
            "boundary" => Self::Boundary,
            _ => return None,
        })
    }
}

/// Text content.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Text {
    /// The span of the entire text node.
    pub span: Span,
    /// The raw text.
    pub data: String,
    /// Whether the text is only whitespace.
    pub is_whitespace: bool,
}

/// An HTML comment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Comment {
    /// The span of the entire comment, delimiters included.
    pub span: Span,
    /// The text between `<!--` and `-->`.
    pub data: String,
}

/// An expression tag `{expression}`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExpressionTag {
    /// The span of the entire tag, braces included.
    pub span: Span,
    /// The span of the expression text.
    pub expression_span: Span,
    /// The expression source text.
    pub expression: String,
}

/// `{@html expression}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HtmlTag {
    /// The span of the entire tag, braces included.
    pub span: Span,
    /// The span of the expression text.
    pub expression_span: Span,
    /// The expression source text.
    pub expression: String,
}

/// `{@const declaration}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConstTag {
    /// The span of the entire tag, braces included.
    pub span: Span,
    /// The span of the declaration text.
    pub declaration_span: Span,
    /// The declaration without the `const` keyword.
    pub declaration: String,
}

/// `{@debug a, b}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DebugTag {
    /// The span of the entire tag, braces included.
    pub span: Span,
    /// The listed identifiers, empty for a bare `{@debug}`.
    pub identifiers: Vec<SmolStr>,
}

/// `{@render snippet(args)}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RenderTag {
    /// The span of the entire tag, braces included.
    pub span: Span,
    /// The span of the expression text.
    pub expression_span: Span,
    /// The snippet call expression.
    pub expression: String,
}

/// A destructuring pattern or identifier bound by a block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Binding {
    /// The span of the pattern text.
    pub span: Span,
    /// The pattern source text.
    pub pattern: String,
}

/// `{#if}...{:else if}...{:else}...{/if}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IfBlock {
    /// The span of the entire block, `{/if}` included.
    pub span: Span,
    /// The span of the condition text.
    pub condition_span: Span,
    /// The condition source text.
    pub condition: String,
    /// The content rendered when the condition holds.
    pub consequent: Fragment,
    /// The `{:else}` or `{:else if}` branch.
    pub alternate: Option<ElseBranch>,
}

impl Drop for IfBlock {
    fn drop(&mut self) {
        // Unlink `{:else if}` chains one level at a time.
        let mut next = self.alternate.take();
        while let Some(ElseBranch::ElseIf(mut block)) = next {
            next = block.alternate.take();
        }
    }
}

/// The else branch of an if block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(tag = "type", content = "value"))]
pub enum ElseBranch {
    /// `{:else}`
    Else(Fragment),
    /// `{:else if}`
    ElseIf(Box<IfBlock>),
}

/// `{#each items as item, i (key)}...{:else}...{/each}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EachBlock {
    /// The span of the entire block, `{/each}` included.
    pub span: Span,
    /// The span of the expression text.
    pub expression_span: Span,
    /// The iterated expression.
    pub expression: String,
    /// The item pattern, absent for `{#each items}`.
    pub context: Option<Binding>,
    /// The index identifier.
    pub index: Option<SmolStr>,
    /// The keyed `(expression)`.
    pub key: Option<EachKey>,
    /// The content rendered per item.
    pub body: Fragment,
    /// The `{:else}` content for an empty list.
    pub fallback: Option<Fragment>,
}

/// The `(key)` of an each block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EachKey {
    /// The span of the key expression text.
    pub span: Span,
    /// The key expression source text.
    pub expression: String,
}

/// `{#await promise}...{:then value}...{:catch error}...{/await}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AwaitBlock {
    /// The span of the entire block, `{/await}` included.
    pub span: Span,
    /// The span of the expression text.
    pub expression_span: Span,
    /// The awaited expression.
    pub expression: String,
    /// The content shown while pending.
    pub pending: Option<Fragment>,
    /// The `{:then}` branch or inline `then`.
    pub then: Option<AwaitThen>,
    /// The `{:catch}` branch or inline `catch`.
    pub catch: Option<AwaitCatch>,
}

/// The resolved branch of an await block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AwaitThen {
    /// The span of the entire branch.
    pub span: Span,
    /// The resolved value pattern.
    pub value: Option<Binding>,
    /// The content shown on resolution.
    pub body: Fragment,
}

/// The rejected branch of an await block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AwaitCatch {
    /// The span of the entire branch.
    pub span: Span,
    /// The error pattern.
    pub error: Option<Binding>,
    /// The content shown on rejection.
    pub body: Fragment,
}

/// `{#key expression}...{/key}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct KeyBlock {
    /// The span of the entire block, `{/key}` included.
    pub span: Span,
    /// The span of the expression text.
    pub expression_span: Span,
    /// The key expression.
    pub expression: String,
    /// The block body.
    pub body: Fragment,
}

/// `{#snippet name(params)}...{/snippet}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SnippetBlock {
    /// The span of the entire block, `{/snippet}` included.
    pub span: Span,
    /// The snippet name.
    pub name: SmolStr,
    /// The parameter list without its parentheses.
    pub parameters: Option<Binding>,
    /// The block body.
    pub body: Fragment,
}

/// An attribute on an element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(tag = "type"))]
pub enum Attribute {
    /// `name`, `name="value"` or `name={expression}`
    Normal(NormalAttribute),
    /// `{...expression}`
    Spread(SpreadAttribute),
    /// `on:click`, `bind:value`, ...
    Directive(Directive),
    /// `{name}`
    Shorthand(ShorthandAttribute),
    /// `{@attach expression}`
    Attach(AttachAttribute),
}

impl Attribute {
    /// Returns the span of this attribute.
    pub fn span(&self) -> Span {
        match self {
            Attribute::Normal(a) => a.span,
            Attribute::Spread(a) => a.span,
            Attribute::Directive(a) => a.span,
            Attribute::Shorthand(a) => a.span,
            Attribute::Attach(a) => a.span,
        }
    }

    /// Returns the name of a normal attribute.
    pub fn name(&self) -> Option<&str> {
        match self {
            Attribute::Normal(a) => Some(&a.name),
            Attribute::Shorthand(a) => Some(&a.name),
            _ => None,
        }
    }
}

/// A `name`, `name="value"` or `name={expression}` attribute.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NormalAttribute {
    /// The span of the entire attribute.
    pub span: Span,
    /// The attribute name.
    pub name: SmolStr,
    /// The attribute value.
    pub value: AttributeValue,
}

/// The value of an attribute.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(tag = "type", content = "value"))]
pub enum AttributeValue {
    /// Boolean attribute without a value.
    True,
    /// A quoted or unquoted literal.
    Text(TextValue),
    /// A single mustache.
    Expression(ExpressionValue),
    /// Text and expressions mixed in one quoted value.
    Concat(Vec<AttributeValuePart>),
}

/// A piece of a quoted value mixing text and expressions.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(tag = "type", content = "value"))]
pub enum AttributeValuePart {
    /// Literal text.
    Text(TextValue),
    /// A mustache.
    Expression(ExpressionValue),
}

/// Literal text in an attribute value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TextValue {
    /// The span of the entire value text, quotes excluded.
    pub span: Span,
    /// The value text.
    pub value: String,
}

/// A mustache in an attribute value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExpressionValue {
    /// The span of the mustache, braces included.
    pub span: Span,
    /// The span of the expression text.
    pub expression_span: Span,
    /// The expression source text.
    pub expression: String,
    /// Whether the mustache sits inside quotes.
    pub is_quoted: bool,
}

/// `{...expression}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SpreadAttribute {
    /// The span of the entire attribute, braces included.
    pub span: Span,
    /// The span of the expression text.
    pub expression_span: Span,
    /// The spread expression, without the dots.
    pub expression: String,
}

/// `{@attach expression}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AttachAttribute {
    /// The span of the entire attribute, braces included.
    pub span: Span,
    /// The span of the expression text.
    pub expression_span: Span,
    /// The expression source text.
    pub expression: String,
}

/// `{name}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ShorthandAttribute {
    /// The span of the entire attribute, braces included.
    pub span: Span,
    /// The attribute name, also the expression.
    pub name: SmolStr,
}

/// A directive such as `on:click|preventDefault={handler}`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Directive {
    /// The span of the entire directive.
    pub span: Span,
    /// The directive prefix.
    pub kind: DirectiveKind,
    /// The part after the colon, without modifiers.
    pub name: SmolStr,
    /// The `|modifier` list in order.
    pub modifiers: Vec<SmolStr>,
    /// The directive value.
    pub value: AttributeValue,
}

/// The prefix of a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(rename_all = "lowercase"))]
pub enum DirectiveKind {
    /// `on:`
    On,
    /// `bind:`
    Bind,
    /// `class:`
    Class,
    /// `style:`
    #[cfg_attr(feature = "serde", serde(rename = "style"))]
    StyleDirective,
    /// `use:`
    Use,
    /// `transition:`
    Transition,
    /// `in:`
    In,
    /// `out:`
    Out,
    /// `animate:`
    Animate,
    /// `let:`
    Let,
}

impl DirectiveKind {
    /// Maps a directive prefix such as `on` or `bind`.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Some(match prefix {
            "on" => Self::On,
            "bind" => Self::Bind,
            "class" => Self::Class,
            "style" => Self::StyleDirective,
            "use" => Self::Use,
            "transition" => Self::Transition,
            "in" => Self::In,
            "out" => Self::Out,
            "animate" => Self::Animate,
            "let" => Self::Let,
            _ => return None,
        })
    }
}

// === Building from the syntax tree ===

fn span_of(node: &SyntaxNode) -> Span {
    Span::from(node.text_range())
}

fn child(node: &SyntaxNode, kind: SyntaxKind) -> Option<SyntaxNode> {
    node.children().find(|n| n.kind() == kind)
}

fn token(node: &SyntaxNode, kind: SyntaxKind) -> Option<SyntaxToken> {
    node.children_with_tokens()
        .filter_map(|element| element.into_token())
        .find(|t| t.kind() == kind)
}

fn keywords(node: &SyntaxNode) -> String {
    node.children_with_tokens()
        .filter_map(|element| element.into_token())
        .filter(|t| t.kind() == SyntaxKind::KEYWORD)
        .map(|t| t.text().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Span and text of the `EXPRESSION` child of `node`, or an empty
/// expression at the end of `node`.
fn expression(node: &SyntaxNode) -> (Span, String) {
    match child(node, SyntaxKind::EXPRESSION) {
        Some(expr) => (span_of(&expr), expr.text().to_string()),
        None => (Span::empty(node.text_range().end()), String::new()),
    }
}

fn binding(node: &SyntaxNode) -> Option<Binding> {
    child(node, SyntaxKind::BINDING).map(|b| Binding {
        span: span_of(&b),
        pattern: b.text().to_string(),
    })
}

/// Builds the AST of a parsed document.
pub(crate) fn build(root: &SyntaxNode) -> SvelteDocument {
    let mut document = SvelteDocument {
        span: span_of(root),
        ..SvelteDocument::default()
    };
    let mut nodes = Vec::new();

    for node in root.children() {
        if node.kind() == SyntaxKind::ELEMENT {
            let tag = child(&node, SyntaxKind::START_TAG);
            let name = tag
                .as_ref()
                .and_then(|tag| token(tag, SyntaxKind::NAME))
                .map(|t| t.text().to_ascii_lowercase());
            match name.as_deref() {
                Some("script") => {
                    let script = script(&node);
                    let slot = match script.context {
                        ScriptContext::Module => &mut document.module_script,
                        ScriptContext::Default => &mut document.instance_script,
                    };
                    if slot.is_none() {
                        *slot = Some(script);
                        continue;
                    }
                }
                Some("style") if document.style.is_none() => {
                    document.style = Some(style(&node));
                    continue;
                }
                _ => {}
            }
        }
        nodes.extend(template_node(&node));
    }

    document.fragment = Fragment {
        span: document.span,
        nodes,
    };
    document
}

/// Raw body of a script or style element.
fn raw_content(node: &SyntaxNode, kind: SyntaxKind) -> (Span, String) {
    match child(node, kind) {
        Some(content) => (span_of(&content), content.text().to_string()),
        None => {
            let end = child(node, SyntaxKind::START_TAG)
                .map_or(node.text_range().end(), |tag| tag.text_range().end());
            (Span::empty(end), String::new())
        }
    }
}

fn static_value(attributes: &[Attribute], name: &str) -> Option<String> {
    attributes.iter().find_map(|attribute| match attribute {
        Attribute::Normal(a) if a.name == name => match &a.value {
            AttributeValue::Text(text) => Some(text.value.clone()),
            AttributeValue::True => Some(String::new()),
            _ => None,
        },
        _ => None,
    })
}

fn script(node: &SyntaxNode) -> Script {
    let attributes = start_tag_attributes(node);
    let (content_span, content) = raw_content(node, SyntaxKind::SCRIPT_CONTENT);
    let lang = ["lang", "type"]
        .iter()
        .find_map(|name| {
            static_value(&attributes, name)
                .and_then(|value| ScriptLang::from_attribute(name, &value))
        })
        .unwrap_or_default();
    let module = static_value(&attributes, "module").is_some()
        || static_value(&attributes, "context").as_deref() == Some("module");
    Script {
        span: span_of(node),
        content_span,
        content,
        lang,
        context: if module {
            ScriptContext::Module
        } else {
            ScriptContext::Default
        },
        attributes,
    }
}

fn style(node: &SyntaxNode) -> Style {
    let attributes = start_tag_attributes(node);
    let (content_span, content) = raw_content(node, SyntaxKind::STYLE_CONTENT);
    Style {
        span: span_of(node),
        content_span,
        content,
        global: static_value(&attributes, "global").is_some(),
        attributes,
    }
}

fn template_nodes(nodes: impl Iterator<Item = SyntaxNode>) -> Vec<TemplateNode> {
    nodes.filter_map(|node| template_node(&node)).collect()
}

/// Fragment built from the content of a block branch.
fn branch_fragment(branch: &SyntaxNode) -> Fragment {
    let content: Vec<_> = branch
        .children()
        .filter(|n| !matches!(n.kind(), SyntaxKind::BLOCK_OPEN | SyntaxKind::BLOCK_CLAUSE))
        .collect();
    let header_end = branch
        .first_child()
        .map_or(branch.text_range().start(), |header| header.text_range().end());
    let span = match (content.first(), content.last()) {
        (Some(first), Some(last)) => Span::new(first.text_range().start(), last.text_range().end()),
        _ => Span::empty(header_end),
    };
    Fragment {
        nodes: template_nodes(content.into_iter()),
        span,
    }
}

fn template_node(node: &SyntaxNode) -> Option<TemplateNode> {
    let span = span_of(node);
    Some(match node.kind() {
        SyntaxKind::TEXT_NODE => {
            let data = node.text().to_string();
            TemplateNode::Text(Text {
                span,
                is_whitespace: data.trim().is_empty(),
                data,
            })
        }
        SyntaxKind::COMMENT_NODE => {
            let text = node.text().to_string();
            let data = text
                .strip_prefix("<!--")
                .map(|rest| rest.strip_suffix("-->").unwrap_or(rest))
                .unwrap_or(&text)
                .to_string();
            TemplateNode::Comment(Comment { span, data })
        }
        SyntaxKind::ELEMENT => element(node),
        SyntaxKind::MUSTACHE => {
            let (expression_span, expression) = expression(node);
            TemplateNode::Expression(ExpressionTag {
                span,
                expression_span,
                expression,
            })
        }
        SyntaxKind::SPECIAL_TAG => return special_tag(node),
        SyntaxKind::IF_BLOCK => {
            let branches: Vec<_> = node
                .children()
                .filter(|n| n.kind() == SyntaxKind::BLOCK_BRANCH)
                .collect();
            TemplateNode::IfBlock(if_chain(&branches, span))
        }
        SyntaxKind::EACH_BLOCK => TemplateNode::EachBlock(each_block(node)),
        SyntaxKind::AWAIT_BLOCK => TemplateNode::AwaitBlock(await_block(node)),
        SyntaxKind::KEY_BLOCK => {
            let branch = child(node, SyntaxKind::BLOCK_BRANCH)?;
            let open = child(&branch, SyntaxKind::BLOCK_OPEN)?;
            let (expression_span, expression) = expression(&open);
            TemplateNode::KeyBlock(KeyBlock {
                span,
                expression_span,
                expression,
                body: branch_fragment(&branch),
            })
        }
        SyntaxKind::SNIPPET_BLOCK => {
            let branch = child(node, SyntaxKind::BLOCK_BRANCH)?;
            let open = child(&branch, SyntaxKind::BLOCK_OPEN)?;
            TemplateNode::SnippetBlock(SnippetBlock {
                span,
                name: token(&open, SyntaxKind::NAME)
                    .map(|t| SmolStr::new(t.text()))
                    .unwrap_or_default(),
                parameters: child(&open, SyntaxKind::SNIPPET_PARAMS).and_then(|p| binding(&p)),
                body: branch_fragment(&branch),
            })
        }
        _ => return None,
    })
}

fn element(node: &SyntaxNode) -> TemplateNode {
    let span = span_of(node);
    let tag = child(node, SyntaxKind::START_TAG);
    let name = tag
        .as_ref()
        .and_then(|tag| token(tag, SyntaxKind::NAME))
        .map(|t| SmolStr::new(t.text()))
        .unwrap_or_default();
    let self_closing = tag
        .as_ref()
        .is_some_and(|tag| token(tag, SyntaxKind::SLASH_R_ANGLE).is_some());
    let attributes = start_tag_attributes(node);
    let children = template_nodes(
        node.children()
            .filter(|n| !matches!(n.kind(), SyntaxKind::START_TAG | SyntaxKind::END_TAG)),
    );

    if let Some(kind) = name
        .strip_prefix("svelte:")
        .and_then(SvelteElementKind::from_name)
    {
        return TemplateNode::SvelteElement(SvelteElement {
            span,
            kind,
            attributes,
            children,
        });
    }

    if name.starts_with(|c: char| c.is_ascii_uppercase()) || name.contains('.') {
        TemplateNode::Component(Component {
            span,
            name,
            attributes,
            children,
            self_closing,
        })
    } else {
        TemplateNode::Element(Element {
            span,
            name,
            attributes,
            children,
            self_closing,
        })
    }
}

fn special_tag(node: &SyntaxNode) -> Option<TemplateNode> {
    let span = span_of(node);
    let (expression_span, expression) = expression(node);
    Some(match token(node, SyntaxKind::KEYWORD)?.text() {
        "html" => TemplateNode::HtmlTag(HtmlTag {
            span,
            expression_span,
            expression,
        }),
        "const" => TemplateNode::ConstTag(ConstTag {
            span,
            declaration_span: expression_span,
            declaration: expression,
        }),
        "debug" => TemplateNode::DebugTag(DebugTag {
            span,
            identifiers: expression
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(SmolStr::new)
                .collect(),
        }),
        "render" => TemplateNode::RenderTag(RenderTag {
            span,
            expression_span,
            expression,
        }),
        _ => return None,
    })
}

/// Builds an if block from its branches; `{:else if}` branches nest.
fn if_chain(branches: &[SyntaxNode], span: Span) -> IfBlock {
    let mut levels = Vec::new();
    let mut fallback = None;
    for (i, branch) in branches.iter().enumerate() {
        let mut start = span.start;
        if i > 0 {
            let Some(clause) = child(branch, SyntaxKind::BLOCK_CLAUSE) else {
                break;
            };
            if keywords(&clause) != "else if" {
                fallback = Some(branch_fragment(branch));
                break;
            }
            start = branch.text_range().start();
        }
        let header = branch
            .first_child()
            .filter(|n| matches!(n.kind(), SyntaxKind::BLOCK_OPEN | SyntaxKind::BLOCK_CLAUSE));
        let (condition_span, condition) = header
            .as_ref()
            .map_or((Span::empty(start), String::new()), expression);
        levels.push(IfBlock {
            span: Span::new(start, span.end),
            condition_span,
            condition,
            consequent: branch_fragment(branch),
            alternate: None,
        });
    }

    // Linked innermost first so long chains never recurse.
    let mut chain: Option<IfBlock> = None;
    while let Some(mut block) = levels.pop() {
        block.alternate = match chain.take() {
            Some(inner) => Some(ElseBranch::ElseIf(Box::new(inner))),
            None => fallback.take().map(ElseBranch::Else),
        };
        chain = Some(block);
    }
    chain.unwrap_or_else(|| IfBlock {
        span,
        condition_span: Span::empty(span.start),
        condition: String::new(),
        consequent: Fragment::default(),
        alternate: None,
    })
}

fn each_block(node: &SyntaxNode) -> EachBlock {
    let span = span_of(node);
    let mut branches = node.children().filter(|n| n.kind() == SyntaxKind::BLOCK_BRANCH);
    let first = branches.next();
    let open = first.as_ref().and_then(|b| child(b, SyntaxKind::BLOCK_OPEN));

    let (expression_span, expression) = open
        .as_ref()
        .map_or((Span::empty(span.start), String::new()), expression);
    let key = open
        .as_ref()
        .and_then(|open| child(open, SyntaxKind::EACH_KEY))
        .map(|key| {
            let (span, expression) = self::expression(&key);
            EachKey { span, expression }
        });

    EachBlock {
        span,
        expression_span,
        expression,
        context: open.as_ref().and_then(binding),
        index: open
            .as_ref()
            .and_then(|open| child(open, SyntaxKind::EACH_INDEX))
            .map(|index| SmolStr::new(index.text().to_string())),
        key,
        body: first.as_ref().map(branch_fragment).unwrap_or_default(),
        fallback: branches.next().map(|branch| branch_fragment(&branch)),
    }
}

fn await_block(node: &SyntaxNode) -> AwaitBlock {
    let mut block = AwaitBlock {
        span: span_of(node),
        expression_span: Span::empty(node.text_range().start()),
        expression: String::new(),
        pending: None,
        then: None,
        catch: None,
    };

    for branch in node.children().filter(|n| n.kind() == SyntaxKind::BLOCK_BRANCH) {
        let Some(header) = branch.first_child() else {
            continue;
        };
        let keyword = if header.kind() == SyntaxKind::BLOCK_OPEN {
            (block.expression_span, block.expression) = expression(&header);
            // `{#await promise then value}` skips the pending branch
            keywords(&header)
                .split(' ')
                .find(|k| matches!(*k, "then" | "catch"))
                .map(str::to_string)
        } else {
            Some(keywords(&header))
        };

        let span = span_of(&branch);
        let body = branch_fragment(&branch);
        match keyword.as_deref() {
            None => block.pending = Some(body),
            Some("then") => {
                block.then = Some(AwaitThen {
                    span,
                    value: binding(&header),
                    body,
                })
            }
            Some("catch") => {
                block.catch = Some(AwaitCatch {
                    span,
                    error: binding(&header),
                    body,
                })
            }
            Some(_) => {}
        }
    }
    block
}

// === Attributes ===

fn start_tag_attributes(element: &SyntaxNode) -> Vec<Attribute> {
    child(element, SyntaxKind::START_TAG)
        .map(|tag| {
            tag.children()
                .filter(|n| n.kind() == SyntaxKind::ATTRIBUTE)
                .filter_map(|n| attribute(&n))
                .collect()
        })
        .unwrap_or_default()
}

fn attribute(node: &SyntaxNode) -> Option<Attribute> {
    let span = span_of(node);

    if let Some(mustache) = child(node, SyntaxKind::MUSTACHE) {
        let (expression_span, expression) = expression(&mustache);
        if token(&mustache, SyntaxKind::DOTS).is_some() {
            return Some(Attribute::Spread(SpreadAttribute {
                span,
                expression_span,
                expression,
            }));
        }
        if token(&mustache, SyntaxKind::AT).is_some() {
            return Some(Attribute::Attach(AttachAttribute {
                span,
                expression_span,
                expression,
            }));
        }
        return Some(Attribute::Shorthand(ShorthandAttribute {
            span,
            name: SmolStr::new(expression.trim()),
        }));
    }

    let name = token(node, SyntaxKind::NAME)?;
    let name = name.text();
    let value = child(node, SyntaxKind::ATTRIBUTE_VALUE)
        .map_or(AttributeValue::True, |value| attribute_value(&value));

    if let Some((prefix, rest)) = name.split_once(':') {
        if let Some(kind) = DirectiveKind::from_prefix(prefix) {
            let mut parts = rest.split('|');
            let name = SmolStr::new(parts.next().unwrap_or_default());
            return Some(Attribute::Directive(Directive {
                span,
                kind,
                name,
                modifiers: parts.map(SmolStr::new).collect(),
                value,
            }));
        }
    }

    Some(Attribute::Normal(NormalAttribute {
        span,
        name: SmolStr::new(name),
        value,
    }))
}

fn attribute_value(node: &SyntaxNode) -> AttributeValue {
    let quoted = token(node, SyntaxKind::QUOTE).is_some();
    let mut parts: Vec<AttributeValuePart> = node
        .children_with_tokens()
        .filter_map(|element| match element {
            rowan::NodeOrToken::Token(t) if t.kind() == SyntaxKind::ATTR_TEXT => {
                Some(AttributeValuePart::Text(TextValue {
                    span: Span::from(t.text_range()),
                    value: t.text().to_string(),
                }))
            }
            rowan::NodeOrToken::Node(n) if n.kind() == SyntaxKind::MUSTACHE => {
                let (expression_span, expression) = expression(&n);
                Some(AttributeValuePart::Expression(ExpressionValue {
                    span: span_of(&n),
                    expression_span,
                    expression,
                    is_quoted: quoted,
                }))
            }
            _ => None,
        })
        .collect();

    match parts.len() {
        0 => {
            // `""`
            let inner = node
                .first_token()
                .map_or(node.text_range().start(), |quote| quote.text_range().end());
            AttributeValue::Text(TextValue {
                span: Span::empty(inner),
                value: String::new(),
            })
        }
        1 => match parts.remove(0) {
            AttributeValuePart::Text(text) => AttributeValue::Text(text),
            AttributeValuePart::Expression(expr) => AttributeValue::Expression(expr),
        },
        _ => AttributeValue::Concat(parts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use pretty_assertions::assert_eq;

    fn fragment(source: &str) -> Vec<TemplateNode> {
        parse(source).document().fragment.nodes
    }

    fn only(source: &str) -> TemplateNode {
        let mut nodes = fragment(source);
        assert_eq!(nodes.len(), 1, "{nodes:#?}");
        nodes.remove(0)
    }

    #[test]
    fn test_document_slots() {
        let source = concat!(
            "<script module>export const a = 1;</script>\n",
            "<script lang=\"ts\">let b: number = 2;</script>\n",
            "<p>x</p>\n",
            "<style>p { color: red; }</style>",
        );
        let document = parse(source).document();

        let module = document.module_script.unwrap();
        assert_eq!(module.context, ScriptContext::Module);
        assert_eq!(module.content, "export const a = 1;");

        let instance = document.instance_script.unwrap();
        assert_eq!(instance.lang, ScriptLang::TypeScript);
        assert_eq!(instance.content_span, Span::from_usize(62, 80));

        let style = document.style.unwrap();
        assert_eq!(style.content, "p { color: red; }");
        assert!(!style.global);

        let elements: Vec<_> = document
            .fragment
            .nodes
            .iter()
            .filter(|n| !matches!(n, TemplateNode::Text(t) if t.is_whitespace))
            .collect();
        assert_eq!(elements.len(), 1);
    }

    #[test]
    fn test_element_kinds() {
        let nodes = fragment("<div></div><Button /><ui.Card></ui.Card><svelte:window />");
        assert!(matches!(&nodes[0], TemplateNode::Element(e) if e.name == "div"));
        assert!(matches!(
            &nodes[1],
            TemplateNode::Component(c) if c.name == "Button" && c.self_closing
        ));
        assert!(matches!(&nodes[2], TemplateNode::Component(c) if c.name == "ui.Card"));
        assert!(matches!(
            &nodes[3],
            TemplateNode::SvelteElement(s) if s.kind == SvelteElementKind::Window
        ));
    }

    #[test]
    fn test_attributes() {
        let source = concat!(
            r#"<input disabled type="text" value={v} class="a {b}" "#,
            "{...rest} {id} {@attach tip}>",
        );
        let TemplateNode::Element(input) = only(source) else {
            panic!("expected element");
        };
        let attributes = &input.attributes;
        assert_eq!(attributes.len(), 7);
        assert!(matches!(&attributes[0], Attribute::Normal(a) if a.value == AttributeValue::True));
        assert!(matches!(
            &attributes[1],
            Attribute::Normal(NormalAttribute { value: AttributeValue::Text(t), .. })
                if t.value == "text"
        ));
        assert!(matches!(
            &attributes[2],
            Attribute::Normal(NormalAttribute { value: AttributeValue::Expression(e), .. })
                if e.expression == "v" && !e.is_quoted
        ));
        assert!(matches!(
            &attributes[3],
            Attribute::Normal(NormalAttribute { value: AttributeValue::Concat(parts), .. })
                if parts.len() == 2
        ));
        assert!(matches!(&attributes[4], Attribute::Spread(s) if s.expression == "rest"));
        assert!(matches!(&attributes[5], Attribute::Shorthand(s) if s.name == "id"));
        assert!(matches!(&attributes[6], Attribute::Attach(a) if a.expression == "tip"));
    }

    #[test]
    fn test_directive_with_modifiers() {
        let TemplateNode::Element(button) =
            only("<button on:click|once|preventDefault={go}></button>")
        else {
            panic!("expected element");
        };
        let Attribute::Directive(directive) = &button.attributes[0] else {
            panic!("expected directive");
        };
        assert_eq!(directive.kind, DirectiveKind::On);
        assert_eq!(directive.name, "click");
        assert_eq!(directive.modifiers, vec!["once", "preventDefault"]);
        assert!(matches!(&directive.value, AttributeValue::Expression(e) if e.expression == "go"));
    }

    #[test]
    fn test_if_chain_nests() {
        let TemplateNode::IfBlock(block) = only("{#if a}A{:else if b}B{:else}C{/if}") else {
            panic!("expected if block");
        };
        assert_eq!(block.condition, "a");
        let Some(ElseBranch::ElseIf(nested)) = &block.alternate else {
            panic!("expected else if");
        };
        assert_eq!(nested.condition, "b");
        let Some(ElseBranch::Else(fallback)) = &nested.alternate else {
            panic!("expected else");
        };
        assert!(matches!(&fallback.nodes[0], TemplateNode::Text(t) if t.data == "C"));
    }

    #[test]
    fn test_each_block() {
        let source = "{#each items as { id, name }, i (id)}{name}{:else}none{/each}";
        let TemplateNode::EachBlock(block) = only(source) else {
            panic!("expected each block");
        };
        assert_eq!(block.expression, "items");
        assert_eq!(block.context.unwrap().pattern, "{ id, name }");
        assert_eq!(block.index.as_deref(), Some("i"));
        assert_eq!(block.key.unwrap().expression, "id");
        assert_eq!(block.body.nodes.len(), 1);
        assert!(block.fallback.is_some());
    }

    #[test]
    fn test_await_block() {
        let source = "{#await load()}...{:then data}{data}{:catch err}{err}{/await}";
        let TemplateNode::AwaitBlock(block) = only(source) else {
            panic!("expected await block");
        };
        assert_eq!(block.expression, "load()");
        assert!(block.pending.is_some());
        assert_eq!(block.then.unwrap().value.unwrap().pattern, "data");
        assert_eq!(block.catch.unwrap().error.unwrap().pattern, "err");

        let TemplateNode::AwaitBlock(short) = only("{#await p then v}{v}{/await}") else {
            panic!("expected await block");
        };
        assert!(short.pending.is_none());
        assert_eq!(short.then.unwrap().value.unwrap().pattern, "v");
    }

    #[test]
    fn test_snippet_and_special_tags() {
        let nodes = fragment(concat!(
            "{#snippet row(item)}{item}{/snippet}",
            "{@render row(1)}{@html raw}{@const x = 1}{@debug a, b}",
        ));
        let TemplateNode::SnippetBlock(snippet) = &nodes[0] else {
            panic!("expected snippet");
        };
        assert_eq!(snippet.name, "row");
        assert_eq!(snippet.parameters.as_ref().unwrap().pattern, "item");
        assert!(matches!(&nodes[1], TemplateNode::RenderTag(r) if r.expression == "row(1)"));
        assert!(matches!(&nodes[2], TemplateNode::HtmlTag(h) if h.expression == "raw"));
        assert!(matches!(&nodes[3], TemplateNode::ConstTag(c) if c.declaration == "x = 1"));
        assert!(matches!(&nodes[4], TemplateNode::DebugTag(d) if d.identifiers == vec!["a", "b"]));
    }

    #[test]
    fn test_error_nodes_are_dropped() {
        let nodes = fragment("<p>a</span></p>{/if}");
        assert_eq!(nodes.len(), 1);
        let TemplateNode::Element(p) = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(p.children.len(), 1);
    }

    #[test]
    fn test_comment_data() {
        assert!(matches!(only("<!-- hi -->"), TemplateNode::Comment(c) if c.data == " hi "));
    }

    #[test]
    fn test_template_node_span() {
        let node = only("<em>x</em>");
        assert_eq!(node.span(), Span::from_usize(0, 10));
    }
}
