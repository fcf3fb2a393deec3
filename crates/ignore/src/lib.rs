//! Ignore-rule engine for snapshot uploads.
//!
//! Parses a gitignore-like rule file into an ordered set of ignore and
//! whitelist glob patterns and decides, per root-relative path, whether a
//! file or directory is excluded from the snapshot.

use std::io::Read;
use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// File name of the per-directory rule file.
pub const RULE_FILE_NAME: &str = ".datalift-ignore";

/// Default rule file written by `datalift init`.
///
/// Directories only, no trailing slashes.
pub const DEFAULT_RULE_FILE: &str = "\
# Directories to skip when uploading data.
# Do not add a trailing slash for directories.

.git
.eggs
eggs
lib
lib64
parts
sdist
var
";

/// Errors from rule-file parsing.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid pattern `{pattern}` on line {line}: {source}")]
    Pattern {
        pattern: String,
        line: usize,
        source: globset::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A compiled, immutable set of ignore and whitelist patterns.
///
/// A path is excluded iff it matches some ignore pattern and no whitelist
/// pattern. Subtree pruning (an excluded directory hides everything beneath
/// it, whitelisted or not) is the walker's job; the rule set itself is pure.
#[derive(Debug)]
pub struct RuleSet {
    ignore: GlobSet,
    whitelist: GlobSet,
    ignore_patterns: Vec<String>,
    whitelist_patterns: Vec<String>,
}

impl RuleSet {
    /// A rule set with no patterns: nothing is excluded.
    pub fn empty() -> Self {
        Self {
            ignore: GlobSet::empty(),
            whitelist: GlobSet::empty(),
            ignore_patterns: Vec::new(),
            whitelist_patterns: Vec::new(),
        }
    }

    /// Parses rule-file contents.
    ///
    /// Blank lines and `#` comments are skipped. A leading `!` marks a
    /// whitelist entry. A leading `\` de-escapes the next character so that
    /// names beginning with `#` or `!` can be matched. Leading `/` is
    /// stripped; all patterns are root-relative. `*` matches within one path
    /// segment, `**` crosses segments.
    pub fn parse(contents: &str) -> Result<Self, RuleError> {
        let mut ignore_patterns = Vec::new();
        let mut whitelist_patterns = Vec::new();
        let mut ignore_builder = GlobSetBuilder::new();
        let mut whitelist_builder = GlobSetBuilder::new();

        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (whitelisted, rest) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let rest = rest.strip_prefix('\\').unwrap_or(rest);
            let pattern = rest.trim_start_matches('/');
            if pattern.is_empty() {
                continue;
            }

            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| RuleError::Pattern {
                    pattern: pattern.to_string(),
                    line: idx + 1,
                    source,
                })?;

            if whitelisted {
                whitelist_builder.add(glob);
                whitelist_patterns.push(pattern.to_string());
            } else {
                ignore_builder.add(glob);
                ignore_patterns.push(pattern.to_string());
            }
        }

        Ok(Self {
            ignore: build_set(ignore_builder)?,
            whitelist: build_set(whitelist_builder)?,
            ignore_patterns,
            whitelist_patterns,
        })
    }

    /// Reads and parses the rule file in `dir`.
    ///
    /// An absent rule file is legal and yields an empty rule set.
    pub fn load(dir: &Path) -> Result<Self, RuleError> {
        let path = dir.join(RULE_FILE_NAME);
        let mut contents = String::new();
        match std::fs::File::open(&path) {
            Ok(mut file) => {
                file.read_to_string(&mut contents)?;
                Self::parse(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns `true` if `rel_path` (root-relative, `/`-separated) is
    /// excluded: it matches an ignore pattern and no whitelist pattern.
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        self.ignore.is_match(rel_path) && !self.whitelist.is_match(rel_path)
    }

    /// Returns `true` if no patterns were parsed.
    pub fn is_empty(&self) -> bool {
        self.ignore_patterns.is_empty() && self.whitelist_patterns.is_empty()
    }

    /// The parsed ignore patterns, in file order.
    pub fn ignore_patterns(&self) -> &[String] {
        &self.ignore_patterns
    }

    /// The parsed whitelist patterns, in file order.
    pub fn whitelist_patterns(&self) -> &[String] {
        &self.whitelist_patterns
    }
}

fn build_set(builder: GlobSetBuilder) -> Result<GlobSet, RuleError> {
    builder.build().map_err(|source| RuleError::Pattern {
        pattern: String::new(),
        line: 0,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_and_commented_lines() {
        let rules = RuleSet::parse("\n# comment\n\n*.py\n").unwrap();
        assert_eq!(rules.ignore_patterns(), ["*.py"]);
        assert!(rules.whitelist_patterns().is_empty());
    }

    #[test]
    fn parses_whitelist_entries() {
        let rules = RuleSet::parse("# comment\n*.py\n!hello.py\n").unwrap();
        assert_eq!(rules.ignore_patterns(), ["*.py"]);
        assert_eq!(rules.whitelist_patterns(), ["hello.py"]);
    }

    #[test]
    fn escapes_reserved_leading_characters() {
        let rules = RuleSet::parse("\\#file_name\n\\!file_name\n").unwrap();
        assert_eq!(rules.ignore_patterns(), ["#file_name", "!file_name"]);
        assert!(rules.whitelist_patterns().is_empty());
        assert!(rules.is_excluded("#file_name"));
        assert!(rules.is_excluded("!file_name"));
    }

    #[test]
    fn strips_leading_separators() {
        let rules = RuleSet::parse("/data\n").unwrap();
        assert_eq!(rules.ignore_patterns(), ["data"]);
        assert!(rules.is_excluded("data"));
    }

    #[test]
    fn empty_rule_set_excludes_nothing() {
        let rules = RuleSet::empty();
        assert!(rules.is_empty());
        assert!(!rules.is_excluded("anything"));
        assert!(!rules.is_excluded("a/b/c.bin"));
    }

    #[test]
    fn whitelist_overrides_ignore() {
        let rules = RuleSet::parse("*.py\n!keep.py\n").unwrap();
        assert!(rules.is_excluded("a.py"));
        assert!(!rules.is_excluded("keep.py"));
        assert!(!rules.is_excluded("notes.txt"));
    }

    #[test]
    fn star_does_not_cross_path_segments() {
        let rules = RuleSet::parse("*.py\n").unwrap();
        assert!(rules.is_excluded("a.py"));
        assert!(!rules.is_excluded("lib/b.py"));
    }

    #[test]
    fn double_star_crosses_path_segments() {
        let rules = RuleSet::parse("**/*.log\n").unwrap();
        assert!(rules.is_excluded("run/1/out.log"));
        assert!(rules.is_excluded("out.log"));
    }

    #[test]
    fn directory_name_matches_only_at_root() {
        let rules = RuleSet::parse("lib\n").unwrap();
        assert!(rules.is_excluded("lib"));
        assert!(!rules.is_excluded("src/lib"));
    }

    #[test]
    fn default_rule_file_parses() {
        let rules = RuleSet::parse(DEFAULT_RULE_FILE).unwrap();
        assert!(rules.is_excluded(".git"));
        assert!(rules.is_excluded("lib"));
        assert!(!rules.is_excluded("train.csv"));
    }

    #[test]
    fn load_missing_file_yields_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let rules = RuleSet::load(dir.path()).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn load_reads_rule_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RULE_FILE_NAME), "*.tmp\n").unwrap();
        let rules = RuleSet::load(dir.path()).unwrap();
        assert!(rules.is_excluded("scratch.tmp"));
    }

    #[test]
    fn invalid_pattern_reports_line() {
        let err = RuleSet::parse("ok\na{b\n").unwrap_err();
        match err {
            RuleError::Pattern { pattern, .. } => assert_eq!(pattern, "a{b"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
