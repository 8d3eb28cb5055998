//! Export scanner for JS/TS modules.
//!
//! A lightweight, comment- and string-aware scan that enumerates a
//! module's export surface: enough for the server-shim generator to know
//! every exported name and whether it is declared asynchronous. Full
//! parsing stays the bundler collaborator's job.

use std::sync::OnceLock;

use regex::Regex;
use rustc_hash::FxHashMap;

/// How a name is exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// `export function f` / `export const f = () => {}`.
    Function,
    /// `export const x = <non-function>`.
    Value,
    /// `export { f } from './other'`.
    ReExport,
    /// `export default ...` (name is `default`).
    Default,
    /// `export * from './other'`.
    Star,
}

/// One exported binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleExport {
    pub name: String,
    pub is_async: bool,
    pub kind: ExportKind,
}

fn re(pattern: &str, slot: &'static OnceLock<Regex>) -> &'static Regex {
    slot.get_or_init(|| Regex::new(pattern).expect("scanner pattern is valid"))
}

macro_rules! scanner_re {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            re($pattern, &RE)
        }
    };
}

scanner_re!(fn_decl_re, r"export\s+(async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)");
// The annotation group admits `=>` so function-type annotations do not
// cut the match short before the initializer.
scanner_re!(var_decl_re, r"export\s+(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::(?:[^=\n]|=>)+)?=\s*(async\b)?\s*(function\b|\(|[A-Za-z_$][\w$]*\s*=>)?");
scanner_re!(default_re, r"export\s+default\s+(async\b)?");
scanner_re!(named_block_re, r"export\s*\{([^}]*)\}\s*(from\s*['\x22][^'\x22]+['\x22])?");
scanner_re!(star_re, r"export\s*\*");
scanner_re!(local_async_fn_re, r"(?:^|[^\w$])async\s+function\s*\*?\s*([A-Za-z_$][\w$]*)");
scanner_re!(local_async_var_re, r"(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::(?:[^=\n]|=>)+)?=\s*async\b");

/// Enumerate the exports of `source`.
pub fn scan_exports(source: &str) -> Vec<ModuleExport> {
    let stripped = strip_comments_and_strings(source);
    let mut exports = Vec::new();
    let mut seen = FxHashMap::default();

    let mut push = |export: ModuleExport| {
        if let Some(&index) = seen.get(&export.name) {
            let slot: &mut ModuleExport = &mut exports[index];
            *slot = export;
        } else {
            seen.insert(export.name.clone(), exports.len());
            exports.push(export);
        }
    };

    // Local declarations referenced by bare `export { name }` blocks.
    let mut local_async: FxHashMap<String, bool> = FxHashMap::default();
    for caps in local_async_fn_re().captures_iter(&stripped) {
        local_async.insert(caps[1].to_string(), true);
    }
    for caps in local_async_var_re().captures_iter(&stripped) {
        local_async.insert(caps[1].to_string(), true);
    }

    for caps in fn_decl_re().captures_iter(&stripped) {
        push(ModuleExport {
            name: caps[2].to_string(),
            is_async: caps.get(1).is_some(),
            kind: ExportKind::Function,
        });
    }

    for caps in var_decl_re().captures_iter(&stripped) {
        let is_async = caps.get(2).is_some();
        let kind = if caps.get(3).is_some() || is_async {
            ExportKind::Function
        } else {
            ExportKind::Value
        };
        push(ModuleExport { name: caps[1].to_string(), is_async, kind });
    }

    for caps in named_block_re().captures_iter(&stripped) {
        let is_re_export = caps.get(2).is_some();
        for binding in caps[1].split(',') {
            let binding = binding.trim();
            if binding.is_empty() {
                continue;
            }
            // `local as exported` exports the right-hand name.
            let (local, exported) = match binding.split_once(" as ") {
                Some((l, e)) => (l.trim(), e.trim()),
                None => (binding, binding),
            };
            if is_re_export {
                push(ModuleExport {
                    name: exported.to_string(),
                    is_async: false,
                    kind: ExportKind::ReExport,
                });
            } else {
                push(ModuleExport {
                    name: exported.to_string(),
                    is_async: local_async.get(local).copied().unwrap_or(false),
                    kind: ExportKind::Function,
                });
            }
        }
    }

    if let Some(caps) = default_re().captures(&stripped) {
        push(ModuleExport {
            name: "default".to_string(),
            is_async: caps.get(1).is_some(),
            kind: ExportKind::Default,
        });
    }

    if star_re().is_match(&stripped) {
        push(ModuleExport { name: "*".to_string(), is_async: false, kind: ExportKind::Star });
    }

    exports
}

/// Blank out comments, string literals and template literals, preserving
/// length and line structure so capture offsets stay meaningful.
pub fn strip_comments_and_strings(source: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Single,
        Double,
        Template,
    }

    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    state = State::LineComment;
                    chars.next();
                    out.push_str("  ");
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = State::BlockComment;
                    chars.next();
                    out.push_str("  ");
                }
                '\'' => {
                    state = State::Single;
                    out.push(c);
                }
                '"' => {
                    state = State::Double;
                    out.push(c);
                }
                '`' => {
                    state = State::Template;
                    out.push(c);
                }
                _ => out.push(c),
            },
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else {
                    out.push(if c == '\n' { '\n' } else { ' ' });
                }
            }
            State::Single | State::Double | State::Template => {
                let close = match state {
                    State::Single => '\'',
                    State::Double => '"',
                    _ => '`',
                };
                if c == '\\' {
                    out.push(' ');
                    if chars.next().is_some() {
                        out.push(' ');
                    }
                } else if c == close {
                    out.push(c);
                    state = State::Code;
                } else {
                    out.push(if c == '\n' { '\n' } else { ' ' });
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(exports: &'a [ModuleExport], name: &str) -> &'a ModuleExport {
        exports
            .iter()
            .find(|e| e.name == name)
            .unwrap_or_else(|| panic!("missing export {name}"))
    }

    #[test]
    fn async_function_declaration() {
        let exports = scan_exports("export async function updateUser(data) {}\n");
        let e = find(&exports, "updateUser");
        assert!(e.is_async);
        assert_eq!(e.kind, ExportKind::Function);
    }

    #[test]
    fn sync_function_declaration() {
        let exports = scan_exports("export function listUsers() {}\n");
        assert!(!find(&exports, "listUsers").is_async);
    }

    #[test]
    fn arrow_variable_exports() {
        let source = "export const createUser = async (input) => { return input; };\n\
                      export const formatName = (u) => u.name;\n";
        let exports = scan_exports(source);
        assert!(find(&exports, "createUser").is_async);
        let format_name = find(&exports, "formatName");
        assert!(!format_name.is_async);
        assert_eq!(format_name.kind, ExportKind::Function);
    }

    #[test]
    fn function_expression_variable() {
        let exports = scan_exports("export const remove = async function (id) {};\n");
        assert!(find(&exports, "remove").is_async);
    }

    #[test]
    fn value_export_is_not_a_function() {
        let exports = scan_exports("export const VERSION = 3;\n");
        assert_eq!(find(&exports, "VERSION").kind, ExportKind::Value);
    }

    #[test]
    fn default_async_function() {
        let exports = scan_exports("export default async function main() {}\n");
        let e = find(&exports, "default");
        assert!(e.is_async);
        assert_eq!(e.kind, ExportKind::Default);
    }

    #[test]
    fn default_sync_arrow() {
        let exports = scan_exports("export default () => 1;\n");
        assert!(!find(&exports, "default").is_async);
    }

    #[test]
    fn named_re_export() {
        let exports = scan_exports("export { audit, track as trace } from './telemetry';\n");
        assert_eq!(find(&exports, "audit").kind, ExportKind::ReExport);
        assert_eq!(find(&exports, "trace").kind, ExportKind::ReExport);
        assert!(!exports.iter().any(|e| e.name == "track"));
    }

    #[test]
    fn local_export_block_resolves_asyncness() {
        let source = "async function save(x) { return x; }\n\
                      function load(x) { return x; }\n\
                      export { save, load };\n";
        let exports = scan_exports(source);
        assert!(find(&exports, "save").is_async);
        assert!(!find(&exports, "load").is_async);
    }

    #[test]
    fn star_export_is_flagged() {
        let exports = scan_exports("export * from './everything';\n");
        assert_eq!(find(&exports, "*").kind, ExportKind::Star);
    }

    #[test]
    fn exports_inside_comments_and_strings_are_ignored() {
        let source = "// export function ghost() {}\n\
                      /* export async function phantom() {} */\n\
                      const msg = \"export function fake() {}\";\n\
                      export async function real() {}\n";
        let exports = scan_exports(source);
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].name, "real");
    }

    #[test]
    fn typescript_annotations_are_tolerated() {
        let exports =
            scan_exports("export const fetchUser: (id: string) => Promise<User> = async (id) => get(id);\n");
        assert!(find(&exports, "fetchUser").is_async);
    }

    #[test]
    fn strip_preserves_line_structure() {
        let source = "a // comment\nb '\ns' c\n";
        let stripped = strip_comments_and_strings(source);
        assert_eq!(stripped.lines().count(), source.lines().count());
    }
}
