// SPDX-License-Identifier: MIT OR Apache-2.0
//! Framework detection from dependencies and marker files.

use crate::analyzers::dependencies::Dependency;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One detected framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Framework {
    /// Framework display name.
    pub name: String,
    /// Host language.
    pub language: String,
    /// Detection confidence: 0.9 from a dependency, 0.6 from a marker
    /// file alone.
    pub confidence: f64,
    /// What triggered the detection.
    pub evidence: String,
}

/// Dependency-name indicators: `(needle, framework, language)`.
const DEPENDENCY_INDICATORS: &[(&str, &str, &str)] = &[
    ("django", "Django", "Python"),
    ("flask", "Flask", "Python"),
    ("fastapi", "FastAPI", "Python"),
    ("celery", "Celery", "Python"),
    ("express", "Express.js", "JavaScript"),
    ("next", "Next.js", "JavaScript"),
    ("react", "React", "JavaScript"),
    ("vue", "Vue.js", "JavaScript"),
    ("@angular/core", "Angular", "TypeScript"),
    ("spring-boot", "Spring Boot", "Java"),
    ("spring-", "Spring Framework", "Java"),
    ("quarkus", "Quarkus", "Java"),
    ("rails", "Ruby on Rails", "Ruby"),
    ("laravel", "Laravel", "PHP"),
    ("gin-gonic", "Gin", "Go"),
    ("actix-web", "Actix Web", "Rust"),
    ("axum", "Axum", "Rust"),
];

/// Marker files that imply a framework without a manifest entry.
const FILE_INDICATORS: &[(&str, &str, &str)] = &[
    ("manage.py", "Django", "Python"),
    ("next.config.js", "Next.js", "JavaScript"),
    ("angular.json", "Angular", "TypeScript"),
    ("nuxt.config.js", "Nuxt", "JavaScript"),
    ("config/routes.rb", "Ruby on Rails", "Ruby"),
    ("artisan", "Laravel", "PHP"),
];

/// Detect frameworks from the extracted dependencies plus marker files.
pub fn detect(repo_path: &Path, dependencies: &[Dependency]) -> Vec<Framework> {
    let mut detected: Vec<Framework> = Vec::new();

    for dep in dependencies {
        let dep_name = dep.name.to_lowercase();
        for (needle, framework, language) in DEPENDENCY_INDICATORS {
            if dep_name.contains(needle) && !detected.iter().any(|f| f.name == *framework) {
                detected.push(Framework {
                    name: framework.to_string(),
                    language: language.to_string(),
                    confidence: 0.9,
                    evidence: format!("dependency {}", dep.name),
                });
            }
        }
    }

    for (marker, framework, language) in FILE_INDICATORS {
        if repo_path.join(marker).exists() && !detected.iter().any(|f| f.name == *framework) {
            detected.push(Framework {
                name: framework.to_string(),
                language: language.to_string(),
                confidence: 0.6,
                evidence: format!("marker file {marker}"),
            });
        }
    }

    detected
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
