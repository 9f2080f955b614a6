use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

use crate::PathCategory;

const TEST_SEGMENTS: &[&str] = &["test", "tests", "testing"];
const TEST_NAME_SUFFIXES: &[&str] = &[
    "_test.go",
    "test.java",
    "_test.py",
    "_spec.rb",
    ".test.ts",
    ".test.js",
    ".spec.ts",
    ".spec.js",
];

const CI_SEGMENTS: &[&str] = &["ci", "pipeline", "workflows"];
const CI_PREFIXES: &[&str] = &[".github/", ".gitlab/", ".circleci/", ".buildkite/"];
const CI_FILE_NAMES: &[&str] = &[
    ".gitlab-ci.yml",
    ".travis.yml",
    "jenkinsfile",
    "azure-pipelines.yml",
];

const INFRA_PREFIXES: &[&str] = &["docker/", "k8s/", "kubernetes/", "helm/", "charts/"];
const INFRA_FILE_NAMES: &[&str] = &["dockerfile", "containerfile"];

const BUILD_FILE_NAMES: &[&str] = &[
    "makefile",
    "gnumakefile",
    "pom.xml",
    "build.gradle",
    "settings.gradle",
    "build.gradle.kts",
    "settings.gradle.kts",
    "cmakelists.txt",
    "build",
    "build.bazel",
    "workspace",
    "workspace.bazel",
];

const IMPL_EXTENSIONS: &[&str] = &[
    ".go", ".java", ".py", ".js", ".ts", ".tsx", ".jsx", ".kt", ".rb", ".rs", ".php", ".cs", ".c",
    ".cc", ".cpp", ".h", ".hpp", ".swift", ".scala", ".dart",
];
const CONFIG_EXTENSIONS: &[&str] = &[
    ".yml",
    ".yaml",
    ".json",
    ".toml",
    ".ini",
    ".cfg",
    ".env",
    ".conf",
    ".properties",
];
const INFRA_EXTENSIONS: &[&str] = &[".tf", ".tfvars", ".hcl"];
const BUILD_EXTENSIONS: &[&str] = &[".gradle", ".xml", ".bzl", ".cmake", ".mk"];
const SHELL_EXTENSIONS: &[&str] = &[".sh", ".bash", ".zsh"];

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("invalid skip pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Syntactic interface-file check: does `path` end with `suffix`, ignoring
/// ASCII case.
pub fn is_interface_path(path: &str, suffix: &str) -> bool {
    let path = path.as_bytes();
    let suffix = suffix.as_bytes();
    path.len() >= suffix.len() && path[path.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// Exclusion rules for generated, vendored, documentation, and lock content.
/// All matching happens on the lowercased path.
#[derive(Debug, Clone)]
pub struct SkipRules {
    prefixes: Vec<String>,
    suffixes: Vec<String>,
    patterns: GlobSet,
}

impl SkipRules {
    pub fn new<P, S, G>(prefixes: P, suffixes: S, patterns: G) -> Result<Self, ClassifyError>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
        G: IntoIterator,
        G::Item: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim().to_ascii_lowercase();
            if pattern.is_empty() {
                continue;
            }
            let glob = Glob::new(&pattern).map_err(|source| ClassifyError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let patterns = builder.build().map_err(|source| ClassifyError::Pattern {
            pattern: "<set>".to_owned(),
            source,
        })?;

        Ok(Self {
            prefixes: lowered(prefixes),
            suffixes: lowered(suffixes),
            patterns,
        })
    }

    /// Rules that exclude nothing.
    pub fn none() -> Self {
        Self {
            prefixes: Vec::new(),
            suffixes: Vec::new(),
            patterns: GlobSet::empty(),
        }
    }

    pub fn should_skip(&self, path: &str) -> bool {
        let lower = path.to_ascii_lowercase();
        if self
            .prefixes
            .iter()
            .any(|prefix| lower.starts_with(prefix.as_str()))
        {
            return true;
        }
        if self
            .suffixes
            .iter()
            .any(|suffix| lower.ends_with(suffix.as_str()))
        {
            return true;
        }
        !self.patterns.is_empty() && self.patterns.is_match(file_name(&lower))
    }
}

fn lowered<I>(values: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    values
        .into_iter()
        .map(|value| value.as_ref().trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}

struct PathFacts<'a> {
    lower: &'a str,
    name: &'a str,
    extension: Option<&'a str>,
    interface_suffix: &'a str,
}

impl PathFacts<'_> {
    fn has_segment(&self, candidates: &[&str]) -> bool {
        self.lower
            .split('/')
            .any(|segment| candidates.contains(&segment))
    }

    fn has_extension(&self, candidates: &[&str]) -> bool {
        self.extension
            .is_some_and(|extension| candidates.contains(&extension))
    }
}

type Rule = (PathCategory, fn(&PathFacts<'_>) -> bool);

/// Evaluated top to bottom; the first matching rule decides the category.
const RULES: [Rule; 9] = [
    (PathCategory::Test, is_test_path),
    (PathCategory::Ci, is_ci_path),
    (PathCategory::Infra, is_infra_path),
    (PathCategory::Build, is_build_manifest),
    (PathCategory::Impl, has_impl_extension),
    (PathCategory::Config, has_config_extension),
    (PathCategory::Infra, has_infra_extension),
    (PathCategory::Build, has_build_extension),
    (PathCategory::Interface, has_interface_suffix),
];

fn is_test_path(facts: &PathFacts<'_>) -> bool {
    facts.has_segment(TEST_SEGMENTS)
        || TEST_NAME_SUFFIXES
            .iter()
            .any(|suffix| facts.name.ends_with(suffix))
        || (facts.name.starts_with("test_") && facts.name.ends_with(".py"))
}

fn is_ci_path(facts: &PathFacts<'_>) -> bool {
    facts.has_segment(CI_SEGMENTS)
        || CI_PREFIXES
            .iter()
            .any(|prefix| facts.lower.starts_with(prefix))
        || CI_FILE_NAMES.contains(&facts.name)
}

fn is_infra_path(facts: &PathFacts<'_>) -> bool {
    INFRA_PREFIXES
        .iter()
        .any(|prefix| facts.lower.starts_with(prefix))
        || facts.lower.contains("docker-compose")
        || INFRA_FILE_NAMES.contains(&facts.name)
        || facts.name.starts_with("dockerfile.")
}

fn is_build_manifest(facts: &PathFacts<'_>) -> bool {
    BUILD_FILE_NAMES.contains(&facts.name)
}

fn has_impl_extension(facts: &PathFacts<'_>) -> bool {
    facts.has_extension(IMPL_EXTENSIONS)
}

fn has_config_extension(facts: &PathFacts<'_>) -> bool {
    facts.has_extension(CONFIG_EXTENSIONS)
}

fn has_infra_extension(facts: &PathFacts<'_>) -> bool {
    facts.has_extension(INFRA_EXTENSIONS)
}

fn has_build_extension(facts: &PathFacts<'_>) -> bool {
    facts.has_extension(BUILD_EXTENSIONS) || facts.has_extension(SHELL_EXTENSIONS)
}

fn has_interface_suffix(facts: &PathFacts<'_>) -> bool {
    is_interface_path(facts.lower, facts.interface_suffix)
}

/// Maps a path to its [`PathCategory`] with the ordered rule table above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathClassifier {
    interface_suffix: String,
}

impl PathClassifier {
    pub fn new(interface_suffix: impl Into<String>) -> Self {
        Self {
            interface_suffix: interface_suffix.into().to_ascii_lowercase(),
        }
    }

    pub fn interface_suffix(&self) -> &str {
        &self.interface_suffix
    }

    pub fn classify(&self, path: &str) -> PathCategory {
        let lower = path.to_ascii_lowercase();
        let name = file_name(&lower);
        let facts = PathFacts {
            lower: &lower,
            name,
            extension: extension(name),
            interface_suffix: &self.interface_suffix,
        };

        RULES
            .iter()
            .find(|(_, matches)| matches(&facts))
            .map(|(category, _)| *category)
            .unwrap_or(PathCategory::Other)
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Last `.ext` of a file name; dotfiles such as `.env` have none.
fn extension(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(index) if index > 0 && index + 1 < name.len() => Some(&name[index..]),
        _ => None,
    }
}
