//! Supported languages and their tree-sitter grammars.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tree_sitter::Node;

/// Languages the structural segmenter can parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    Tsx,
    JavaScript,
    Rust,
    Python,
    Go,
}

impl Language {
    /// Name stored in chunk metadata.
    pub fn name(&self) -> &'static str {
        match self {
            // TSX shares the TypeScript name; only the grammar differs.
            Language::TypeScript | Language::Tsx => "typescript",
            Language::JavaScript => "javascript",
            Language::Rust => "rust",
            Language::Python => "python",
            Language::Go => "go",
        }
    }

    /// Detect the language of a file from its extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();

        match ext.as_str() {
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "rs" => Some(Language::Rust),
            "py" | "pyi" => Some(Language::Python),
            "go" => Some(Language::Go),
            _ => None,
        }
    }

    /// Grammar definition for this language.
    pub fn grammar(&self) -> Grammar {
        match self {
            Language::TypeScript => Grammar {
                language: *self,
                ts_language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                wanted: TYPESCRIPT_WANTED,
            },
            Language::Tsx => Grammar {
                language: *self,
                ts_language: tree_sitter_typescript::LANGUAGE_TSX.into(),
                wanted: TYPESCRIPT_WANTED,
            },
            // The TSX grammar parses plain JS and JSX.
            Language::JavaScript => Grammar {
                language: *self,
                ts_language: tree_sitter_typescript::LANGUAGE_TSX.into(),
                wanted: JAVASCRIPT_WANTED,
            },
            Language::Rust => Grammar {
                language: *self,
                ts_language: tree_sitter_rust::LANGUAGE.into(),
                wanted: RUST_WANTED,
            },
            Language::Python => Grammar {
                language: *self,
                ts_language: tree_sitter_python::LANGUAGE.into(),
                wanted: PYTHON_WANTED,
            },
            Language::Go => Grammar {
                language: *self,
                ts_language: tree_sitter_go::LANGUAGE.into(),
                wanted: GO_WANTED,
            },
        }
    }
}

/// Top-level declarations treated as chunk and symbol boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Function,
    Method,
    Class,
    Interface,
    Enum,
    Struct,
    Trait,
    /// Rust `impl` block, named after the implemented type
    Impl,
    Module,
    /// Go `type` declaration, named after its first spec
    TypeDecl,
}

impl DeclarationKind {
    /// The declared name, or `None` when the grammar exposes none.
    pub fn name<'s>(&self, node: Node<'_>, source: &'s str) -> Option<&'s str> {
        let name_node = match self {
            DeclarationKind::Impl => node.child_by_field_name("type"),
            DeclarationKind::TypeDecl => (0..node.named_child_count())
                .filter_map(|i| node.named_child(i))
                .find(|child| child.kind() == "type_spec")
                .and_then(|spec| spec.child_by_field_name("name")),
            _ => node.child_by_field_name("name"),
        }?;
        name_node.utf8_text(source.as_bytes()).ok()
    }
}

const TYPESCRIPT_WANTED: &[(&str, DeclarationKind)] = &[
    ("function_declaration", DeclarationKind::Function),
    ("generator_function_declaration", DeclarationKind::Function),
    ("class_declaration", DeclarationKind::Class),
    ("abstract_class_declaration", DeclarationKind::Class),
    ("interface_declaration", DeclarationKind::Interface),
    ("enum_declaration", DeclarationKind::Enum),
];

const JAVASCRIPT_WANTED: &[(&str, DeclarationKind)] = &[
    ("function_declaration", DeclarationKind::Function),
    ("generator_function_declaration", DeclarationKind::Function),
    ("class_declaration", DeclarationKind::Class),
];

const RUST_WANTED: &[(&str, DeclarationKind)] = &[
    ("function_item", DeclarationKind::Function),
    ("struct_item", DeclarationKind::Struct),
    ("enum_item", DeclarationKind::Enum),
    ("trait_item", DeclarationKind::Trait),
    ("impl_item", DeclarationKind::Impl),
    ("mod_item", DeclarationKind::Module),
];

const PYTHON_WANTED: &[(&str, DeclarationKind)] = &[
    ("function_definition", DeclarationKind::Function),
    ("class_definition", DeclarationKind::Class),
];

const GO_WANTED: &[(&str, DeclarationKind)] = &[
    ("function_declaration", DeclarationKind::Function),
    ("method_declaration", DeclarationKind::Method),
    ("type_declaration", DeclarationKind::TypeDecl),
];

/// A language grammar plus the node kinds it segments on.
#[derive(Clone)]
pub struct Grammar {
    language: Language,
    ts_language: tree_sitter::Language,
    wanted: &'static [(&'static str, DeclarationKind)],
}

impl Grammar {
    pub fn language(&self) -> Language {
        self.language
    }

    /// Display name stored in chunk metadata.
    pub fn name(&self) -> &'static str {
        self.language.name()
    }

    /// The declaration kind for a wanted node kind, `None` otherwise.
    pub fn declaration(&self, node_kind: &str) -> Option<DeclarationKind> {
        self.wanted
            .iter()
            .find(|(kind, _)| *kind == node_kind)
            .map(|(_, decl)| *decl)
    }

    /// Wanted node kinds, in declaration order.
    pub fn wanted_kinds(&self) -> impl Iterator<Item = &'static str> {
        self.wanted.iter().map(|(kind, _)| *kind)
    }

    /// A fresh parser configured for this grammar.
    pub fn parser(&self) -> Result<tree_sitter::Parser, String> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.ts_language)
            .map_err(|e| format!("Failed to set language: {}", e))?;
        Ok(parser)
    }
}

impl std::fmt::Debug for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("language", &self.language)
            .field("wanted", &self.wanted)
            .finish()
    }
}
