use crate::obfuscation;
use crate::patterns::{DANGEROUS, EXPORT, SUSPICIOUS, UI_FRAMEWORK};
use crate::report::SecurityReport;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default source size ceiling (500 KiB, rounded).
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 512_000;

/// Default obfuscation signal count above which code is rejected.
pub const DEFAULT_OBFUSCATION_THRESHOLD: usize = 10;

const ALLOWED_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs"];
const EXECUTABLE_EXTENSIONS: &[&str] = &["sh", "bat", "cmd", "exe", "ps1", "vbs", "com", "scr"];
const FORBIDDEN_URL_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:", "file:", "ftp:"];

/// Deployment environment; production only trusts HTTPS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

/// Tunables for [`SecurityValidator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub max_source_bytes: usize,
    pub obfuscation_threshold: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            obfuscation_threshold: DEFAULT_OBFUSCATION_THRESHOLD,
        }
    }
}

/// Static vetting of plugin source. Stateless apart from its configuration.
#[derive(Debug, Clone, Default)]
pub struct SecurityValidator {
    config: ValidatorConfig,
    environment: Environment,
}

impl SecurityValidator {
    pub fn new(config: ValidatorConfig, environment: Environment) -> Self {
        Self {
            config,
            environment,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Scans `source` (named `filename`) and reports every finding.
    pub fn validate_code(&self, source: &str, filename: &str) -> SecurityReport {
        let mut report = SecurityReport::new();

        for pattern in DANGEROUS.iter() {
            if pattern.regex.is_match(source) {
                report.risk(pattern.message);
            }
        }

        for pattern in SUSPICIOUS.iter() {
            if pattern.regex.is_match(source) {
                report.warn(pattern.message);
            }
        }

        self.check_structure(source, &mut report);
        Self::check_filename(filename, &mut report);

        let score = obfuscation::score(source);
        if score.total() > self.config.obfuscation_threshold {
            report.risk("Obfuscated code detected");
        }

        debug!(
            filename,
            safe = report.safe,
            risks = report.risks.len(),
            warnings = report.warnings.len(),
            obfuscation_score = score.total(),
            "plugin source validated"
        );
        report
    }

    fn check_structure(&self, source: &str, report: &mut SecurityReport) {
        if source.len() > self.config.max_source_bytes {
            report.risk(format!(
                "Source exceeds maximum size of {} bytes",
                self.config.max_source_bytes
            ));
        }
        if !EXPORT.is_match(source) {
            report.risk("No module export found");
        }
        if !UI_FRAMEWORK.is_match(source) {
            report.warn("Source does not reference React");
        }
    }

    fn check_filename(filename: &str, report: &mut SecurityReport) {
        if filename.is_empty() {
            report.risk("Filename is empty");
            return;
        }
        if filename.contains("..") {
            report.risk("Filename contains path traversal sequence");
        }
        if filename.contains('/') || filename.contains('\\') {
            report.risk("Filename contains path separator");
        }
        if !filename
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            report.risk("Filename contains forbidden characters");
        }

        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if EXECUTABLE_EXTENSIONS.contains(&extension.as_str()) {
            report.risk(format!("Executable file extension .{extension} is not allowed"));
        } else if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            report.risk("File extension must be one of .js, .jsx, .ts, .tsx, .mjs");
        }
    }

    /// Whether an outbound URL may be used by plugin code.
    ///
    /// Only `http`/`https` are accepted, `http` only outside production, and
    /// a forbidden scheme appearing anywhere in the string rejects it.
    pub fn is_url_trusted(&self, url: &str) -> bool {
        let lower = url.trim().to_ascii_lowercase();

        if FORBIDDEN_URL_SCHEMES.iter().any(|s| lower.contains(s)) {
            return false;
        }

        let rest = if let Some(rest) = lower.strip_prefix("https://") {
            rest
        } else if let Some(rest) = lower.strip_prefix("http://") {
            if self.environment == Environment::Production {
                return false;
            }
            rest
        } else {
            return false;
        };

        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        !host.is_empty() && !host.contains(char::is_whitespace)
    }
}
