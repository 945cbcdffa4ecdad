//! Source preparation shared by the local and remote runtimes
//!
//! Class-based toolchains need the file named after the public type, and
//! archive toolchains switch to script mode when there is no entry point.
//! Both runtimes use the same file name and content for a request.

use crate::registry::{LanguageSpec, Toolchain};
use regex::Regex;
use std::sync::OnceLock;

/// Stem used for sources that are not named after a type
pub const DEFAULT_STEM: &str = "main";

/// Source ready to be written or uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSource {
    /// File name including extension
    pub file_name: String,

    /// Text to write; differs from the request when a wrapper was synthesized
    pub content: String,

    /// Type handed to a class loader
    pub class_name: Option<String>,

    /// Archive toolchain runs the source as a script
    pub script: bool,
}

impl PreparedSource {
    /// File name without the extension
    pub fn stem(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(self.file_name.as_str())
    }
}

fn public_type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*public\s+(?:(?:final|abstract|strictfp|sealed)\s+)*(?:class|interface|enum|record)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
        )
        .expect("public type pattern is valid")
    })
}

fn kotlin_main_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bfun\s+main\s*\(").expect("main pattern is valid"))
}

/// Name of the first public type declared in `code`
pub fn detect_public_type(code: &str) -> Option<String> {
    public_type_regex()
        .captures(code)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whether `code` declares a top-level `fun main(`
pub fn has_entry_point(code: &str) -> bool {
    kotlin_main_regex().is_match(code)
}

/// Wrap bare statements in a class with an entry method. Leading `import`
/// lines stay at file level.
pub fn wrap_in_class(code: &str, class_name: &str) -> String {
    let mut imports = Vec::new();
    let mut body = Vec::new();
    for line in code.lines() {
        let trimmed = line.trim_start();
        if body.is_empty() && (trimmed.starts_with("import ") || trimmed.is_empty()) {
            if !trimmed.is_empty() {
                imports.push(trimmed);
            }
        } else {
            body.push(line);
        }
    }

    let mut out = String::new();
    for import in &imports {
        out.push_str(import);
        out.push('\n');
    }
    if !imports.is_empty() {
        out.push('\n');
    }
    out.push_str(&format!("public class {} {{\n", class_name));
    out.push_str("    public static void main(String[] args) throws Exception {\n");
    for line in body {
        out.push_str("        ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("    }\n}\n");
    out
}

/// Decide file name and content for `code` under `spec`
pub fn prepare(spec: &LanguageSpec, code: &str) -> PreparedSource {
    match &spec.toolchain {
        Toolchain::Interpreted { .. } | Toolchain::Compiled { .. } => PreparedSource {
            file_name: format!("{}.{}", DEFAULT_STEM, spec.extension),
            content: code.to_string(),
            class_name: None,
            script: false,
        },
        Toolchain::ClassBased { default_class, .. } => match detect_public_type(code) {
            Some(class_name) => PreparedSource {
                file_name: format!("{}.{}", class_name, spec.extension),
                content: code.to_string(),
                class_name: Some(class_name),
                script: false,
            },
            None => PreparedSource {
                file_name: format!("{}.{}", default_class, spec.extension),
                content: wrap_in_class(code, default_class),
                class_name: Some(default_class.clone()),
                script: false,
            },
        },
        Toolchain::ArchiveBased { script, .. } => match script {
            Some(script) if !has_entry_point(code) => PreparedSource {
                file_name: format!("{}.{}", DEFAULT_STEM, script.extension),
                content: code.to_string(),
                class_name: None,
                script: true,
            },
            _ => PreparedSource {
                file_name: format!("{}.{}", DEFAULT_STEM, spec.extension),
                content: code.to_string(),
                class_name: None,
                script: false,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LanguageRegistry;

    #[test]
    fn test_detect_public_type() {
        let code = "import java.util.*;\n\npublic final class Solver {\n}\n";
        assert_eq!(detect_public_type(code).as_deref(), Some("Solver"));
        assert_eq!(detect_public_type("class Hidden {}"), None);
        assert_eq!(
            detect_public_type("  public record Point(int x, int y) {}").as_deref(),
            Some("Point")
        );
    }

    #[test]
    fn test_java_named_after_public_class() {
        let registry = LanguageRegistry::builtin();
        let java = registry.lookup("java").unwrap();
        let prepared = prepare(
            java,
            "public class Hello { public static void main(String[] a) { System.out.println(1); } }",
        );
        assert_eq!(prepared.file_name, "Hello.java");
        assert_eq!(prepared.class_name.as_deref(), Some("Hello"));
        assert_eq!(prepared.stem(), "Hello");
    }

    #[test]
    fn test_java_wrapper_synthesized() {
        let registry = LanguageRegistry::builtin();
        let java = registry.lookup("java").unwrap();
        let prepared = prepare(java, "import java.util.List;\nSystem.out.println(List.of(1));");
        assert_eq!(prepared.file_name, "Main.java");
        assert_eq!(prepared.class_name.as_deref(), Some("Main"));
        assert!(prepared.content.starts_with("import java.util.List;\n"));
        assert!(prepared.content.contains("public class Main {"));
        assert!(prepared
            .content
            .contains("        System.out.println(List.of(1));"));
        assert_eq!(detect_public_type(&prepared.content).as_deref(), Some("Main"));
    }

    #[test]
    fn test_kotlin_script_mode() {
        let registry = LanguageRegistry::builtin();
        let kotlin = registry.lookup("kotlin").unwrap();

        let program = prepare(kotlin, "fun main() {\n    println(\"hi\")\n}");
        assert!(!program.script);
        assert_eq!(program.file_name, "main.kt");

        let script = prepare(kotlin, "println(\"hi\")");
        assert!(script.script);
        assert_eq!(script.file_name, "main.kts");
    }

    #[test]
    fn test_interpreted_keeps_source() {
        let registry = LanguageRegistry::builtin();
        let python = registry.lookup("python").unwrap();
        let prepared = prepare(python, "print('hi')");
        assert_eq!(prepared.file_name, "main.py");
        assert_eq!(prepared.content, "print('hi')");
        assert!(prepared.class_name.is_none());
    }
}
