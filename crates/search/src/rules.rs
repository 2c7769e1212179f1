//! Corpus-specific relevance priors.
//!
//! Every multiplier the scorer applies beyond the field-overlap signal lives in
//! one of the tables below. A chain is a list of [`Branch`]es evaluated in
//! order; the first branch with a matching [`Target`] contributes its factor and
//! the rest of the chain is skipped. Independent chains multiply.

use crate::intent::{Intent, IntentSet};
use kb_corpus::SourceType;
use std::collections::HashSet;

/// What a branch tests on the record. Paths are compared lower-cased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    PathEquals(&'static str),
    PathPrefix(&'static str),
    Source(SourceType),
}

impl Target {
    #[must_use]
    pub fn matches(&self, path: &str, source_type: SourceType) -> bool {
        match *self {
            Self::PathEquals(needle) => path == needle,
            Self::PathPrefix(needle) => path.starts_with(needle),
            Self::Source(ty) => source_type == ty,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Branch {
    /// Any of these targets selects the branch
    pub when: &'static [Target],
    pub factor: f32,
}

/// Query-side condition that activates a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Intent(Intent),
    MissingIntent(Intent),
    AnyToken(&'static [&'static str]),
}

impl Trigger {
    #[must_use]
    pub fn fires(&self, intents: &IntentSet, tokens: &HashSet<String>) -> bool {
        match *self {
            Self::Intent(intent) => intents.contains(&intent),
            Self::MissingIntent(intent) => !intents.contains(&intent),
            Self::AnyToken(words) => words.iter().any(|w| tokens.contains(*w)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoostRule {
    pub trigger: Trigger,
    pub chain: &'static [Branch],
}

const AGENTS_DOC: &str = "agents.md";
const SKILL_TREE: &str = "skills/unitree-g1-expert";
const VERIFICATION_TREE: &str = "docs/verification";
const SCRIPTS_TREE: &str = "scripts/";
const BENCHMARKS_TREE: &str = "benchmarks/";
const SITE_TREE: &str = "site/";
const SOURCES_TREE: &str = "sources/";
const PIPELINE_DOCS: &str = "docs/pipelines";
const MIRRORED_REPOS: &str = "data/repos/";

/// Per-source multipliers. Types not listed (`unknown`) get 1.0.
pub const SOURCE_PRIORS: &[(SourceType, f32)] = &[
    (SourceType::SupportDoc, 1.40),
    (SourceType::CuratedDoc, 1.30),
    (SourceType::SkillDoc, 1.45),
    (SourceType::SourceManifest, 1.10),
    (SourceType::RepoFile, 0.95),
    (SourceType::ProjectDoc, 1.55),
    (SourceType::ProjectScript, 1.35),
    (SourceType::BenchmarkSpec, 1.30),
    (SourceType::SiteDoc, 1.20),
    (SourceType::SiteData, 1.20),
];

/// Path priors applied regardless of the query
pub const PATH_PRIORS: &[Branch] = &[
    Branch { when: &[Target::PathEquals(AGENTS_DOC)], factor: 2.0 },
    Branch { when: &[Target::PathPrefix(SKILL_TREE)], factor: 1.7 },
    Branch { when: &[Target::PathPrefix(VERIFICATION_TREE)], factor: 1.35 },
    Branch { when: &[Target::PathPrefix(SCRIPTS_TREE)], factor: 1.30 },
    Branch { when: &[Target::PathPrefix(BENCHMARKS_TREE)], factor: 1.25 },
    Branch { when: &[Target::PathPrefix(SITE_TREE)], factor: 1.20 },
    Branch { when: &[Target::PathPrefix(SOURCES_TREE)], factor: 1.25 },
];

/// Query-conditioned boosts, applied in table order
pub const INTENT_RULES: &[BoostRule] = &[
    BoostRule {
        trigger: Trigger::Intent(Intent::Codex),
        chain: &[
            Branch {
                when: &[Target::PathEquals(AGENTS_DOC), Target::PathPrefix(SKILL_TREE)],
                factor: 1.6,
            },
            Branch {
                when: &[Target::PathPrefix(SCRIPTS_TREE), Target::PathPrefix(VERIFICATION_TREE)],
                factor: 1.25,
            },
            Branch { when: &[Target::Source(SourceType::RepoFile)], factor: 0.78 },
        ],
    },
    BoostRule {
        trigger: Trigger::Intent(Intent::Pipeline),
        chain: &[
            Branch { when: &[Target::PathPrefix(SCRIPTS_TREE)], factor: 1.5 },
            Branch { when: &[Target::PathPrefix(PIPELINE_DOCS)], factor: 1.3 },
        ],
    },
    BoostRule {
        trigger: Trigger::Intent(Intent::Benchmark),
        chain: &[
            Branch { when: &[Target::PathPrefix(BENCHMARKS_TREE)], factor: 1.5 },
            Branch { when: &[Target::PathPrefix(VERIFICATION_TREE)], factor: 1.3 },
        ],
    },
    BoostRule {
        trigger: Trigger::Intent(Intent::Benchmark),
        chain: &[Branch {
            when: &[Target::PathEquals(AGENTS_DOC), Target::PathPrefix(SKILL_TREE)],
            factor: 0.70,
        }],
    },
    BoostRule {
        trigger: Trigger::Intent(Intent::Site),
        chain: &[
            Branch { when: &[Target::PathPrefix(SITE_TREE)], factor: 1.8 },
            Branch { when: &[Target::Source(SourceType::RepoFile)], factor: 0.75 },
        ],
    },
    BoostRule {
        trigger: Trigger::Intent(Intent::Verification),
        chain: &[Branch { when: &[Target::PathPrefix(VERIFICATION_TREE)], factor: 1.4 }],
    },
    BoostRule {
        trigger: Trigger::Intent(Intent::CodeExample),
        chain: &[
            Branch { when: &[Target::PathPrefix(MIRRORED_REPOS)], factor: 1.7 },
            Branch { when: &[Target::PathPrefix("skills/")], factor: 0.80 },
        ],
    },
    BoostRule {
        trigger: Trigger::Intent(Intent::Manifest),
        chain: &[
            Branch {
                when: &[
                    Target::PathPrefix(SOURCES_TREE),
                    Target::Source(SourceType::SourceManifest),
                ],
                factor: 1.9,
            },
            Branch { when: &[Target::PathPrefix(SCRIPTS_TREE)], factor: 0.90 },
        ],
    },
    BoostRule {
        trigger: Trigger::Intent(Intent::SimToReal),
        chain: &[Branch { when: &[Target::PathPrefix("docs/pipelines/")], factor: 1.6 }],
    },
    BoostRule {
        trigger: Trigger::MissingIntent(Intent::Benchmark),
        chain: &[Branch { when: &[Target::Source(SourceType::BenchmarkSpec)], factor: 0.40 }],
    },
    BoostRule {
        trigger: Trigger::Intent(Intent::Site),
        chain: &[Branch { when: &[Target::Source(SourceType::SiteData)], factor: 1.5 }],
    },
    BoostRule {
        trigger: Trigger::AnyToken(&["ros2", "low", "level"]),
        chain: &[Branch { when: &[Target::PathPrefix("data/repos/unitree_ros2/")], factor: 1.9 }],
    },
    BoostRule {
        trigger: Trigger::AnyToken(&["payload", "website", "site"]),
        chain: &[
            Branch {
                when: &[Target::PathEquals("site/data/benchmark_examples.json")],
                factor: 2.4,
            },
            Branch { when: &[Target::PathEquals("scripts/build_site.py")], factor: 1.9 },
        ],
    },
    BoostRule {
        trigger: Trigger::AnyToken(&["catalog", "manifest"]),
        chain: &[Branch { when: &[Target::PathPrefix(SOURCES_TREE)], factor: 2.0 }],
    },
];

/// Titles that mark license boilerplate
pub const NOISE_TITLES: &[&str] = &["license", "license.txt", "copying"];

/// Path segments of vendored or third-party trees
pub const NOISE_PATH_SEGMENTS: &[&str] = &[
    "/thirdparty/",
    "/third-party/",
    "/extern/",
    "/external/",
    "/vendor/",
    "/deps/",
    "/.github/",
    "/wayland/",
    "/glfw/",
];

pub const NOISE_PATH_SUFFIXES: &[&str] = &["/license", "/license.txt"];

#[must_use]
pub fn source_prior(source_type: SourceType) -> f32 {
    SOURCE_PRIORS
        .iter()
        .find(|(ty, _)| *ty == source_type)
        .map_or(1.0, |(_, factor)| *factor)
}

/// Factor of the first matching branch, or 1.0
#[must_use]
pub fn chain_factor(chain: &[Branch], path: &str, source_type: SourceType) -> f32 {
    chain
        .iter()
        .find(|branch| branch.when.iter().any(|t| t.matches(path, source_type)))
        .map_or(1.0, |branch| branch.factor)
}

#[must_use]
pub fn path_prior(path: &str, source_type: SourceType) -> f32 {
    chain_factor(PATH_PRIORS, path, source_type)
}

#[must_use]
pub fn intent_boost(
    intents: &IntentSet,
    tokens: &HashSet<String>,
    path: &str,
    source_type: SourceType,
) -> f32 {
    INTENT_RULES
        .iter()
        .filter(|rule| rule.trigger.fires(intents, tokens))
        .map(|rule| chain_factor(rule.chain, path, source_type))
        .product()
}

/// License files and vendored trees. Expects lower-cased inputs.
#[must_use]
pub fn is_noise(path: &str, title: &str) -> bool {
    if NOISE_TITLES.contains(&title) {
        return true;
    }
    let wrapped = format!("/{}/", path.trim_matches('/'));
    if NOISE_PATH_SEGMENTS.iter().any(|seg| wrapped.contains(seg)) {
        return true;
    }
    NOISE_PATH_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}
