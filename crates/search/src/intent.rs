use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Coarse query category inferred from vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Agent workflow, skills, answer contracts
    Codex,
    /// Operational scripts and refresh commands
    Pipeline,
    /// Benchmarks and evaluation design
    Benchmark,
    /// Static site pages and payloads
    Site,
    /// Verification outputs and coverage
    Verification,
    /// Source files and code examples in mirrored repos
    CodeExample,
    /// Source manifests and catalogs
    Manifest,
    /// Simulation to hardware stages
    #[serde(rename = "sim2real")]
    SimToReal,
}

pub type IntentSet = BTreeSet<Intent>;

impl Intent {
    pub const ALL: [Self; 8] = [
        Self::Codex,
        Self::Pipeline,
        Self::Benchmark,
        Self::Site,
        Self::Verification,
        Self::CodeExample,
        Self::Manifest,
        Self::SimToReal,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Pipeline => "pipeline",
            Self::Benchmark => "benchmark",
            Self::Site => "site",
            Self::Verification => "verification",
            Self::CodeExample => "code_example",
            Self::Manifest => "manifest",
            Self::SimToReal => "sim2real",
        }
    }

    /// Query tokens that signal this intent
    #[must_use]
    pub const fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Codex => &[
                "codex", "agent", "agents", "verified", "inference", "skill", "skills", "answer",
                "answers", "contract", "priority",
            ],
            Self::Pipeline => &[
                "command", "commands", "script", "scripts", "refresh", "sync", "index", "pipeline",
                "query",
            ],
            Self::Benchmark => &[
                "benchmark",
                "benchmarks",
                "eval",
                "evaluation",
                "experiment",
                "experiments",
                "stretch",
                "design",
                "documented",
                "question",
                "questions",
                "threshold",
                "thresholds",
            ],
            Self::Site => &[
                "site",
                "website",
                "page",
                "pages",
                "html",
                "examples",
                "example",
                "methodology",
                "payload",
            ],
            Self::Verification => &[
                "verify",
                "verification",
                "coverage",
                "blocked",
                "lock",
                "status",
            ],
            Self::CodeExample => &[
                "source", "file", "files", "example", "examples", "ros2", "cpp", "python", "low",
                "level",
            ],
            Self::Manifest => &["manifest", "catalog", "snapshot", "scope"],
            Self::SimToReal => &[
                "sim2sim",
                "sim2real",
                "simulation",
                "real",
                "stages",
                "stage",
            ],
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every intent whose keyword set intersects the query tokens.
///
/// Checks are independent, so one query can carry several intents.
#[must_use]
pub fn classify_intent<S: AsRef<str>>(tokens: &[S]) -> IntentSet {
    let token_set: HashSet<&str> = tokens.iter().map(AsRef::as_ref).collect();
    Intent::ALL
        .into_iter()
        .filter(|intent| intent.keywords().iter().any(|kw| token_set.contains(kw)))
        .collect()
}
