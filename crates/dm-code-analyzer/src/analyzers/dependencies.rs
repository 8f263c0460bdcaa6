// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dependency extraction from package-manager manifests.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

static REQUIREMENT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9_.-]+)\s*([<>=!~]+.*)?$").unwrap());

static GO_REQUIRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:require\s+)?(\S+)\s+v?(\S+)").unwrap());

static POM_DEPENDENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<dependency>.*?<groupId>([^<]+)</groupId>.*?<artifactId>([^<]+)</artifactId>(?:.*?<version>([^<]+)</version>)?.*?</dependency>",
    )
    .unwrap()
});

/// One extracted dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Package name.
    pub name: String,
    /// Declared version or range (`*` when unpinned).
    pub version: String,
    /// Package manager that declared it.
    pub package_manager: String,
    /// Host language.
    pub language: String,
    /// Whether it is a development-only dependency.
    pub dev_dependency: bool,
    /// Manifest file it came from.
    pub source_file: String,
}

/// Extracts dependencies from every recognised manifest in a repository
/// root. Parse failures are logged and skipped.
pub fn extract(repo_path: &Path) -> Vec<Dependency> {
    let mut deps = Vec::new();

    let package_json = repo_path.join("package.json");
    if package_json.exists() {
        deps.extend(parse_package_json(&package_json));
    }
    if let Ok(entries) = std::fs::read_dir(repo_path) {
        let mut requirement_files: Vec<_> = entries
            .filter_map(Result::ok)
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(|n| n.starts_with("requirements") && n.ends_with(".txt"))
                    .unwrap_or(false)
            })
            .map(|e| e.path())
            .collect();
        requirement_files.sort();
        for file in requirement_files {
            deps.extend(parse_requirements_txt(&file));
        }
    }
    let go_mod = repo_path.join("go.mod");
    if go_mod.exists() {
        deps.extend(parse_go_mod(&go_mod));
    }
    let pom = repo_path.join("pom.xml");
    if pom.exists() {
        deps.extend(parse_pom_xml(&pom));
    }
    let cargo = repo_path.join("Cargo.toml");
    if cargo.exists() {
        deps.extend(parse_cargo_toml(&cargo));
    }

    deps
}

fn read(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read manifest");
            None
        }
    }
}

fn parse_package_json(path: &Path) -> Vec<Dependency> {
    let Some(raw) = read(path) else {
        return Vec::new();
    };
    let Ok(doc) = serde_json::from_str::<Value>(&raw) else {
        warn!(path = %path.display(), "invalid package.json");
        return Vec::new();
    };

    let mut deps = Vec::new();
    for (section, dev) in [
        ("dependencies", false),
        ("devDependencies", true),
        ("peerDependencies", false),
    ] {
        if let Some(map) = doc.get(section).and_then(Value::as_object) {
            for (name, version) in map {
                deps.push(Dependency {
                    name: name.clone(),
                    version: version.as_str().unwrap_or("*").to_string(),
                    package_manager: "npm".to_string(),
                    language: "JavaScript".to_string(),
                    dev_dependency: dev,
                    source_file: "package.json".to_string(),
                });
            }
        }
    }
    deps
}

fn parse_requirements_txt(path: &Path) -> Vec<Dependency> {
    let Some(raw) = read(path) else {
        return Vec::new();
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("requirements.txt")
        .to_string();
    let dev = file_name.to_lowercase().contains("dev");

    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('-'))
        .filter_map(|line| {
            // Strip extras before matching.
            let base = line.split('[').next().unwrap_or(line);
            let caps = REQUIREMENT_LINE.captures(base.trim())?;
            Some(Dependency {
                name: caps.get(1)?.as_str().to_string(),
                version: caps
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_else(|| "*".to_string()),
                package_manager: "pip".to_string(),
                language: "Python".to_string(),
                dev_dependency: dev,
                source_file: file_name.clone(),
            })
        })
        .collect()
}

fn parse_go_mod(path: &Path) -> Vec<Dependency> {
    let Some(raw) = read(path) else {
        return Vec::new();
    };
    let mut deps = Vec::new();
    let mut in_require = false;
    for line in raw.lines().map(str::trim) {
        if line == "require (" {
            in_require = true;
            continue;
        }
        if line == ")" {
            in_require = false;
            continue;
        }
        if in_require || line.starts_with("require ") {
            if let Some(caps) = GO_REQUIRE.captures(line) {
                let name = caps[1].to_string();
                if name == "module" || name == "go" {
                    continue;
                }
                deps.push(Dependency {
                    name,
                    version: caps[2].to_string(),
                    package_manager: "go".to_string(),
                    language: "Go".to_string(),
                    dev_dependency: false,
                    source_file: "go.mod".to_string(),
                });
            }
        }
    }
    deps
}

fn parse_pom_xml(path: &Path) -> Vec<Dependency> {
    let Some(raw) = read(path) else {
        return Vec::new();
    };
    POM_DEPENDENCY
        .captures_iter(&raw)
        .map(|caps| Dependency {
            name: format!("{}:{}", &caps[1], &caps[2]),
            version: caps
                .get(3)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "*".to_string()),
            package_manager: "maven".to_string(),
            language: "Java".to_string(),
            dev_dependency: false,
            source_file: "pom.xml".to_string(),
        })
        .collect()
}

fn parse_cargo_toml(path: &Path) -> Vec<Dependency> {
    let Some(raw) = read(path) else {
        return Vec::new();
    };
    let mut deps = Vec::new();
    let mut section = String::new();
    for line in raw.lines().map(str::trim) {
        if line.starts_with('[') && line.ends_with(']') {
            section = line.trim_matches(['[', ']']).to_string();
            continue;
        }
        let dev = match section.as_str() {
            "dependencies" => false,
            "dev-dependencies" => true,
            _ => continue,
        };
        let Some((name, spec)) = line.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || name.starts_with('#') {
            continue;
        }
        let spec = spec.trim();
        let version = if spec.starts_with('"') {
            spec.trim_matches('"').to_string()
        } else if let Some(idx) = spec.find("version") {
            spec[idx..]
                .split('"')
                .nth(1)
                .unwrap_or("*")
                .to_string()
        } else {
            "*".to_string()
        };
        deps.push(Dependency {
            name: name.to_string(),
            version,
            package_manager: "cargo".to_string(),
            language: "Rust".to_string(),
            dev_dependency: dev,
            source_file: "Cargo.toml".to_string(),
        });
    }
    deps
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
