// SPDX-License-Identifier: MIT OR Apache-2.0
//! Language detection by file extension (shebang fallback for
//! extensionless scripts).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use walkdir::WalkDir;

/// Extension → language label.
const EXTENSION_MAP: &[(&str, &str)] = &[
    ("py", "Python"),
    ("pyw", "Python"),
    ("js", "JavaScript"),
    ("mjs", "JavaScript"),
    ("cjs", "JavaScript"),
    ("jsx", "JavaScript"),
    ("ts", "TypeScript"),
    ("tsx", "TypeScript"),
    ("go", "Go"),
    ("java", "Java"),
    ("kt", "Kotlin"),
    ("scala", "Scala"),
    ("rb", "Ruby"),
    ("rs", "Rust"),
    ("c", "C"),
    ("h", "C"),
    ("cpp", "C++"),
    ("cc", "C++"),
    ("hpp", "C++"),
    ("cs", "C#"),
    ("php", "PHP"),
    ("swift", "Swift"),
    ("pl", "Perl"),
    ("sh", "Shell"),
    ("bash", "Shell"),
    ("ps1", "PowerShell"),
    ("lua", "Lua"),
    ("ex", "Elixir"),
    ("exs", "Elixir"),
    ("erl", "Erlang"),
    ("clj", "Clojure"),
    ("dart", "Dart"),
    ("groovy", "Groovy"),
    ("hs", "Haskell"),
    ("html", "HTML"),
    ("htm", "HTML"),
    ("css", "CSS"),
    ("scss", "SCSS"),
    ("xml", "XML"),
    ("json", "JSON"),
    ("yaml", "YAML"),
    ("yml", "YAML"),
    ("toml", "TOML"),
    ("md", "Markdown"),
    ("vue", "Vue"),
    ("svelte", "Svelte"),
    ("sql", "SQL"),
    ("proto", "Protocol Buffers"),
    ("graphql", "GraphQL"),
];

/// Shebang interpreter → language label.
const SHEBANG_MAP: &[(&str, &str)] = &[
    ("python", "Python"),
    ("node", "JavaScript"),
    ("ruby", "Ruby"),
    ("perl", "Perl"),
    ("php", "PHP"),
    ("bash", "Shell"),
    ("sh", "Shell"),
];

/// Per-language statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageStats {
    /// Files attributed to the language.
    pub files: u64,
    /// Lines across those files.
    pub lines: u64,
    /// Bytes across those files.
    pub bytes: u64,
    /// Share of all attributed lines, rounded to 2 decimals.
    pub percentage: f64,
}

/// Repository language report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageReport {
    /// Per-language statistics, keyed by label.
    pub languages: BTreeMap<String, LanguageStats>,
    /// Files attributed to any language.
    pub total_files: u64,
    /// Lines across attributed files.
    pub total_lines: u64,
    /// Bytes across attributed files.
    pub total_bytes: u64,
}

/// Detects languages under a repository root.
pub struct LanguageDetector {
    excluded_dirs: Vec<String>,
}

impl LanguageDetector {
    /// Detector skipping the given directory names at any depth.
    pub fn new(excluded_dirs: Vec<String>) -> Self {
        Self { excluded_dirs }
    }

    /// Walk the repository and build the report.
    pub fn detect(&self, repo_path: &Path) -> LanguageReport {
        let mut stats: BTreeMap<String, LanguageStats> = BTreeMap::new();

        let walker = WalkDir::new(repo_path).into_iter().filter_entry(|entry| {
            entry.depth() == 0
                || entry
                    .file_name()
                    .to_str()
                    .map(|name| !self.excluded_dirs.iter().any(|d| d == name))
                    .unwrap_or(true)
        });
        for entry in walker.filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(language) = detect_file_language(entry.path()) else {
                continue;
            };
            let (lines, bytes) = file_stats(entry.path());
            let entry_stats = stats.entry(language.to_string()).or_default();
            entry_stats.files += 1;
            entry_stats.lines += lines;
            entry_stats.bytes += bytes;
        }

        let total_files = stats.values().map(|s| s.files).sum();
        let total_lines: u64 = stats.values().map(|s| s.lines).sum();
        let total_bytes = stats.values().map(|s| s.bytes).sum();
        for lang_stats in stats.values_mut() {
            lang_stats.percentage = if total_lines > 0 {
                (lang_stats.lines as f64 / total_lines as f64 * 10_000.0).round() / 100.0
            } else {
                0.0
            };
        }

        LanguageReport {
            languages: stats,
            total_files,
            total_lines,
            total_bytes,
        }
    }
}

fn detect_file_language(path: &Path) -> Option<&'static str> {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let ext = ext.to_lowercase();
        return EXTENSION_MAP
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, lang)| *lang);
    }
    // Shebang fallback for extensionless scripts.
    let file = std::fs::File::open(path).ok()?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line).ok()?;
    if !first_line.starts_with("#!") {
        return None;
    }
    let shebang = first_line.to_lowercase();
    SHEBANG_MAP
        .iter()
        .find(|(interp, _)| shebang.contains(interp))
        .map(|(_, lang)| *lang)
}

fn file_stats(path: &Path) -> (u64, u64) {
    let bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let lines = std::fs::read(path)
        .map(|content| content.iter().filter(|&&b| b == b'\n').count() as u64)
        .unwrap_or(0);
    (lines, bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "import os\nprint('x')\n").unwrap();
        std::fs::write(dir.path().join("util.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("index.js"), "console.log(1);\n").unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/dep.js"), "ignored\n").unwrap();
        dir
    }

    #[test]
    fn detects_languages_with_percentages() {
        let dir = repo();
        let report =
            LanguageDetector::new(vec!["node_modules".to_string()]).detect(dir.path());

        assert_eq!(report.languages["Python"].files, 2);
        assert_eq!(report.languages["Python"].lines, 3);
        assert_eq!(report.languages["JavaScript"].files, 1);
        assert_eq!(report.total_files, 3);
        assert!((report.languages["Python"].percentage - 75.0).abs() < 0.01);
    }

    #[test]
    fn excluded_dirs_are_skipped() {
        let dir = repo();
        let with_exclusion =
            LanguageDetector::new(vec!["node_modules".to_string()]).detect(dir.path());
        let without = LanguageDetector::new(vec![]).detect(dir.path());
        assert!(without.languages["JavaScript"].files > with_exclusion.languages["JavaScript"].files);
    }

    #[test]
    fn shebang_detection_for_extensionless_files() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("deploy");
        std::fs::write(&script, "#!/usr/bin/env python3\nprint('hi')\n").unwrap();
        let report = LanguageDetector::new(vec![]).detect(dir.path());
        assert_eq!(report.languages["Python"].files, 1);
    }

    #[test]
    fn empty_repo_yields_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = LanguageDetector::new(vec![]).detect(dir.path());
        assert!(report.languages.is_empty());
        assert_eq!(report.total_lines, 0);
    }
}
