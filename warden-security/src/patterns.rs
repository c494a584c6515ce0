//! Pattern tables for the source scan.

use regex_lite::Regex;
use std::sync::LazyLock;

pub(crate) struct Pattern {
    pub regex: Regex,
    pub message: &'static str,
}

fn compile(table: &[(&str, &'static str)]) -> Vec<Pattern> {
    table
        .iter()
        .map(|(pattern, message)| Pattern {
            regex: Regex::new(pattern).expect("invalid built-in security pattern"),
            message,
        })
        .collect()
}

/// Any match makes the source unsafe.
pub(crate) static DANGEROUS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    compile(&[
        // Filesystem
        (
            r#"require\s*\(\s*['"](node:)?fs(/promises)?['"]\s*\)"#,
            "File system access detected (require('fs'))",
        ),
        (
            r#"from\s+['"](node:)?fs(/promises)?['"]"#,
            "File system access detected (fs import)",
        ),
        (
            r"\b(readFileSync|writeFileSync|appendFileSync|unlinkSync|rmSync|mkdirSync)\s*\(",
            "File system access detected (synchronous fs call)",
        ),
        // Processes
        (
            r#"require\s*\(\s*['"](node:)?child_process['"]\s*\)"#,
            "Process execution detected (require('child_process'))",
        ),
        (
            r#"from\s+['"](node:)?child_process['"]"#,
            "Process execution detected (child_process import)",
        ),
        (
            r"\b(execSync|spawnSync|execFileSync|execFile)\s*\(",
            "Process execution detected (spawn/exec call)",
        ),
        // Raw sockets
        (
            r#"require\s*\(\s*['"](node:)?(net|dgram|tls)['"]\s*\)"#,
            "Raw network socket access detected",
        ),
        (
            r#"from\s+['"](node:)?(net|dgram|tls)['"]"#,
            "Raw network socket access detected",
        ),
        // Code evaluation
        (r"eval\s*\(", "Code evaluation detected (eval)"),
        (
            r"new\s+Function\s*\(",
            "Code evaluation detected (dynamic Function construction)",
        ),
        // Host globals
        (
            r"\bprocess\s*(\.\s*(env|exit|binding|kill|mainModule)\b|\[)",
            "Process/environment object access detected",
        ),
        (
            r"\bglobalThis\b|\bglobal\s*(\.|\[)",
            "Global object access detected",
        ),
        // Non-literal module loading
        (
            r#"\brequire\s*\(\s*[^'"`\s)]"#,
            "Dynamic require with non-literal argument",
        ),
        (
            r#"\bimport\s*\(\s*[^'"\s)]"#,
            "Dynamic import with non-literal argument",
        ),
        // DOM
        (
            r"document\s*\.\s*(write|writeln)\s*\(",
            "Direct DOM manipulation detected (document.write)",
        ),
        (
            r"\.\s*(innerHTML|outerHTML)\s*=[^=]",
            "Direct DOM manipulation detected (innerHTML assignment)",
        ),
        (
            r"document\s*\.\s*(body|head|documentElement)\s*\.\s*(appendChild|removeChild|insertBefore|replaceChild)\s*\(",
            "Direct DOM manipulation detected (document tree mutation)",
        ),
        (
            r"dangerouslySetInnerHTML",
            "Unsafe HTML rendering detected (dangerouslySetInnerHTML)",
        ),
        // Prototype pollution
        (
            r#"__proto__\s*(\]\s*)?=[^=]|\[\s*['"]__proto__['"]\s*\]"#,
            "Prototype pollution attempt detected (__proto__)",
        ),
        (
            r"Object\s*\.\s*setPrototypeOf\s*\(|constructor\s*\.\s*prototype\s*(\.\s*\w+\s*)?=[^=]",
            "Prototype pollution attempt detected (prototype mutation)",
        ),
    ])
});

/// Matches are reported as warnings and never affect `safe`.
pub(crate) static SUSPICIOUS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    compile(&[
        (
            r"console\s*\.\s*(log|debug|info|warn|error|trace)\s*\(",
            "Console logging detected",
        ),
        (
            r"\b(alert|confirm|prompt)\s*\(",
            "Browser dialog usage detected",
        ),
        (
            r"\b(setTimeout|setInterval)\s*\(",
            "Timer usage detected",
        ),
        (r"JSON\s*\.\s*parse\s*\(", "JSON parsing detected"),
        (
            r#"\b(atob|btoa)\s*\(|['"]base64['"]"#,
            "Base64 encoding/decoding detected",
        ),
        (
            r"\bcrypto\s*\.|Math\s*\.\s*random\s*\(",
            "Crypto/random usage detected",
        ),
    ])
});

/// Source references the host UI framework.
pub(crate) static UI_FRAMEWORK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bReact\b|from\s+['"]react['"]|require\s*\(\s*['"]react['"]\s*\)"#)
        .expect("invalid built-in security pattern")
});

/// Source exposes something through a module export.
pub(crate) static EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bexport\s+(default|const|let|var|function|async|class|\{)|\bmodule\s*\.\s*exports\b|\bexports\s*\.\s*\w+\s*=",
    )
    .expect("invalid built-in security pattern")
});
