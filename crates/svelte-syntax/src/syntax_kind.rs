//! Token and node kinds of the concrete syntax tree, and the `rowan` glue.

macro_rules! syntax_kinds {
    ($($(#[$meta:meta])* $name:ident,)*) => {
        /// Every token and node kind that can appear in a Svelte syntax tree.
        ///
        /// Tokens come first, nodes after [`SyntaxKind::DOCUMENT`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[allow(non_camel_case_types)]
        #[repr(u16)]
        pub enum SyntaxKind {
            $($(#[$meta])* $name,)*
        }

        impl SyntaxKind {
            /// All kinds in discriminant order.
            pub const ALL: &'static [SyntaxKind] = &[$(SyntaxKind::$name,)*];
        }
    };
}

syntax_kinds! {
    // === Markup tokens ===
    /// Spaces, tabs and line breaks.
    WHITESPACE,
    /// Character data between tags.
    TEXT,
    /// `<!-- ... -->`, delimiters included.
    COMMENT,
    /// `<` opening a start tag.
    L_ANGLE,
    /// `</` opening an end tag.
    L_ANGLE_SLASH,
    /// `>`
    R_ANGLE,
    /// `/>`
    SLASH_R_ANGLE,
    /// A tag or attribute name.
    NAME,
    /// `=`
    EQ,
    /// `"` or `'` around an attribute value.
    QUOTE,
    /// Literal text of an attribute value.
    ATTR_TEXT,
    /// Body of a `<script>` or `<style>` element.
    RAW_TEXT,

    // === Mustache tokens ===
    /// `{`
    L_CURLY,
    /// `}`
    R_CURLY,
    /// `#` opening a block.
    HASH,
    /// `:` opening a block continuation.
    COLON,
    /// `/` opening a block close.
    SLASH,
    /// `@` opening a special tag.
    AT,
    /// `if`, `each`, `html`, `as`, ...
    KEYWORD,
    /// Raw expression text inside a mustache, before delegation.
    EXPR_TEXT,
    /// `,` inside an each header.
    COMMA,
    /// `(` around an each key.
    L_PAREN,
    /// `)` around an each key.
    R_PAREN,
    /// `...` of a spread attribute.
    DOTS,
    /// Text owned by an embedded script region.
    JS_TEXT,

    // === Synthetic tokens ===
    /// Something the lexer could not classify.
    ERROR_TOKEN,
    /// Zero-length marker emitted at end of input when a construct is still open.
    UNTERMINATED,

    // === Nodes ===
    /// Root of every tree.
    DOCUMENT,
    /// An element from its start tag to its end tag.
    ELEMENT,
    /// `<name attrs...>` or `<name attrs.../>`
    START_TAG,
    /// `</name>`
    END_TAG,
    /// A single attribute, spread, shorthand or attachment.
    ATTRIBUTE,
    /// The value of an attribute after `=`.
    ATTRIBUTE_VALUE,
    /// A run of text and whitespace.
    TEXT_NODE,
    /// A comment.
    COMMENT_NODE,
    /// `{expression}` in content or attribute position.
    MUSTACHE,
    /// Wrapper around one delegated expression region.
    EXPRESSION,
    /// Wrapper around one delegated destructuring pattern.
    BINDING,
    /// `{@html ...}`, `{@const ...}`, `{@debug ...}`, `{@render ...}`.
    SPECIAL_TAG,
    /// `{#if}...{/if}`
    IF_BLOCK,
    /// `{#each}...{/each}`
    EACH_BLOCK,
    /// `{#await}...{/await}`
    AWAIT_BLOCK,
    /// `{#key}...{/key}`
    KEY_BLOCK,
    /// `{#snippet}...{/snippet}`
    SNIPPET_BLOCK,
    /// An opening or continuation tag followed by its content.
    BLOCK_BRANCH,
    /// `{#kind ...}`
    BLOCK_OPEN,
    /// `{:kind ...}`
    BLOCK_CLAUSE,
    /// `{/kind}`
    BLOCK_CLOSE,
    /// The index name of an each block.
    EACH_INDEX,
    /// `(key)` of an each block.
    EACH_KEY,
    /// `(params)` of a snippet block.
    SNIPPET_PARAMS,
    /// Body of a `<script>` element.
    SCRIPT_CONTENT,
    /// Body of a `<style>` element.
    STYLE_CONTENT,

    // === Delegated script nodes ===
    /// A whole script body.
    JS_PROGRAM,
    /// An `import` declaration.
    JS_IMPORT,
    /// Any other module declaration (`export ...`).
    JS_EXPORT,
    /// A declaration statement.
    JS_DECLARATION,
    /// Any other statement.
    JS_STATEMENT,
    /// A single expression.
    JS_EXPRESSION,
    /// A destructuring pattern.
    JS_PATTERN,

    /// Skipped or unparseable input.
    ERROR,
}

impl SyntaxKind {
    /// Returns true for token kinds.
    pub fn is_token(self) -> bool {
        self < SyntaxKind::DOCUMENT
    }

    /// Returns true for whitespace.
    pub fn is_trivia(self) -> bool {
        self == SyntaxKind::WHITESPACE
    }

    /// Returns true for the nodes produced by script delegation.
    pub fn is_script(self) -> bool {
        (SyntaxKind::JS_PROGRAM..=SyntaxKind::JS_PATTERN).contains(&self)
    }

    /// Returns true for the five block kinds.
    pub fn is_block(self) -> bool {
        matches!(
            self,
            SyntaxKind::IF_BLOCK
                | SyntaxKind::EACH_BLOCK
                | SyntaxKind::AWAIT_BLOCK
                | SyntaxKind::KEY_BLOCK
                | SyntaxKind::SNIPPET_BLOCK
        )
    }
}

impl From<SyntaxKind> for rowan::SyntaxKind {
    fn from(kind: SyntaxKind) -> Self {
        Self(kind as u16)
    }
}

/// The `rowan` language tag for Svelte trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SvelteLanguage {}

impl rowan::Language for SvelteLanguage {
    type Kind = SyntaxKind;

    fn kind_from_raw(raw: rowan::SyntaxKind) -> Self::Kind {
        SyntaxKind::ALL
            .get(raw.0 as usize)
            .copied()
            .unwrap_or(SyntaxKind::ERROR)
    }

    fn kind_to_raw(kind: Self::Kind) -> rowan::SyntaxKind {
        kind.into()
    }
}

/// A node of a Svelte syntax tree.
pub type SyntaxNode = rowan::SyntaxNode<SvelteLanguage>;
/// A token of a Svelte syntax tree.
pub type SyntaxToken = rowan::SyntaxToken<SvelteLanguage>;
/// Either a node or a token.
pub type SyntaxElement = rowan::NodeOrToken<SyntaxNode, SyntaxToken>;

#[cfg(test)]
mod tests {
    use super::*;
    use rowan::Language;

    #[test]
    fn test_raw_roundtrip() {
        for &kind in SyntaxKind::ALL {
            let raw = SvelteLanguage::kind_to_raw(kind);
            assert_eq!(SvelteLanguage::kind_from_raw(raw), kind);
        }
    }

    #[test]
    fn test_classification() {
        assert!(SyntaxKind::UNTERMINATED.is_token());
        assert!(!SyntaxKind::DOCUMENT.is_token());
        assert!(SyntaxKind::JS_STATEMENT.is_script());
        assert!(!SyntaxKind::ERROR.is_script());
        assert!(SyntaxKind::AWAIT_BLOCK.is_block());
        assert!(!SyntaxKind::BLOCK_BRANCH.is_block());
    }
}
