//! Line-oriented code builder.
//!
//! The generators assemble their output through this small abstraction
//! rather than ad-hoc string pushes: indented blocks keep nesting
//! consistent and the import collection emits a sorted header, which is
//! what keeps generated files diff-friendly and build hashes stable.

use std::collections::{BTreeMap, BTreeSet};

/// Accumulates source lines with indentation tracking.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    lines: Vec<String>,
    indent: usize,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line at the current indent.
    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if text.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{}", "  ".repeat(self.indent), text));
        }
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    /// Open a block: emit `header`, then indent until [`CodeBuilder::close`].
    pub fn open(&mut self, header: impl AsRef<str>) -> &mut Self {
        self.line(header);
        self.indent += 1;
        self
    }

    /// Close a block with `footer` (e.g. `}` or `});`).
    pub fn close(&mut self, footer: impl AsRef<str>) -> &mut Self {
        self.indent = self.indent.saturating_sub(1);
        self.line(footer);
        self
    }

    /// Emit an indented block via a closure.
    pub fn block(
        &mut self,
        header: impl AsRef<str>,
        footer: impl AsRef<str>,
        body: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.open(header);
        body(self);
        self.close(footer);
        self
    }

    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// Deduplicated import bookkeeping with sorted output.
#[derive(Debug, Default)]
pub struct ImportCollection {
    default_imports: BTreeMap<String, String>,
    namespace_imports: BTreeMap<String, String>,
    named_imports: BTreeMap<String, BTreeSet<String>>,
    side_effects: BTreeSet<String>,
}

impl ImportCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// `import <ident> from "<module>"`.
    pub fn default_import(&mut self, module: &str, ident: &str) -> &mut Self {
        self.default_imports.insert(module.to_string(), ident.to_string());
        self
    }

    /// `import * as <ident> from "<module>"`.
    pub fn namespace_import(&mut self, module: &str, ident: &str) -> &mut Self {
        self.namespace_imports.insert(module.to_string(), ident.to_string());
        self
    }

    /// `import { <name> } from "<module>"`.
    pub fn named_import(&mut self, module: &str, name: &str) -> &mut Self {
        self.named_imports.entry(module.to_string()).or_default().insert(name.to_string());
        self
    }

    /// `import "<module>"`.
    pub fn side_effect_import(&mut self, module: &str) -> &mut Self {
        self.side_effects.insert(module.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.default_imports.is_empty()
            && self.namespace_imports.is_empty()
            && self.named_imports.is_empty()
            && self.side_effects.is_empty()
    }

    /// Emit the import header, sorted by module path within each form.
    pub fn emit(&self, out: &mut CodeBuilder) {
        for module in &self.side_effects {
            out.line(format!("import \"{module}\";"));
        }
        for (module, ident) in &self.default_imports {
            match self.named_imports.get(module) {
                Some(names) if !names.is_empty() => {
                    let list = names.iter().cloned().collect::<Vec<_>>().join(", ");
                    out.line(format!("import {ident}, {{ {list} }} from \"{module}\";"));
                }
                _ => {
                    out.line(format!("import {ident} from \"{module}\";"));
                }
            }
        }
        for (module, ident) in &self.namespace_imports {
            out.line(format!("import * as {ident} from \"{module}\";"));
        }
        for (module, names) in &self.named_imports {
            if self.default_imports.contains_key(module) {
                continue; // merged above
            }
            let list = names.iter().cloned().collect::<Vec<_>>().join(", ");
            out.line(format!("import {{ {list} }} from \"{module}\";"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_and_blocks_indent() {
        let mut b = CodeBuilder::new();
        b.line("function main() {");
        b.block("if (ok) {", "}", |b| {
            b.line("run();");
        });
        b.line("}");
        assert_eq!(b.finish(), "function main() {\nif (ok) {\n  run();\n}\n}\n");
    }

    #[test]
    fn nested_blocks_accumulate_indent() {
        let mut b = CodeBuilder::new();
        b.block("a {", "}", |b| {
            b.block("b {", "}", |b| {
                b.line("deep;");
            });
        });
        assert_eq!(b.finish(), "a {\n  b {\n    deep;\n  }\n}\n");
    }

    #[test]
    fn imports_emit_sorted_and_deduplicated() {
        let mut imports = ImportCollection::new();
        imports.named_import("peaque/runtime", "route");
        imports.named_import("peaque/runtime", "render");
        imports.named_import("peaque/runtime", "route");
        imports.default_import("./pages/ZetaPage", "ZetaPage");
        imports.default_import("./pages/AlphaPage", "AlphaPage");
        imports.namespace_import("node:path", "path");
        imports.side_effect_import("./styles.css");

        let mut out = CodeBuilder::new();
        imports.emit(&mut out);
        assert_eq!(
            out.finish(),
            "import \"./styles.css\";\n\
             import AlphaPage from \"./pages/AlphaPage\";\n\
             import ZetaPage from \"./pages/ZetaPage\";\n\
             import * as path from \"node:path\";\n\
             import { render, route } from \"peaque/runtime\";\n"
        );
    }

    #[test]
    fn default_and_named_from_same_module_merge() {
        let mut imports = ImportCollection::new();
        imports.default_import("react", "React");
        imports.named_import("react", "useState");

        let mut out = CodeBuilder::new();
        imports.emit(&mut out);
        assert_eq!(out.finish(), "import React, { useState } from \"react\";\n");
    }

    #[test]
    fn same_input_same_output() {
        let build = || {
            let mut imports = ImportCollection::new();
            imports.default_import("b", "B");
            imports.default_import("a", "A");
            let mut out = CodeBuilder::new();
            imports.emit(&mut out);
            out.line("main();");
            out.finish()
        };
        assert_eq!(build(), build());
    }
}
