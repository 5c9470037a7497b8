//! Exclusion rules and the persisted ignore file
//!
//! Patterns are matched against root-relative paths written with a leading
//! `/`, which is the same anchoring rsync applies to `--exclude-from` files.
//! A pattern matches when
//! - it starts with `/` and equals the whole path, or
//! - it has no leading `/` and equals any single path component.
//!
//! Patterns containing `*`, `?` or `[` are compiled as single-level globs:
//! unanchored ones are tried against each component, anchored ones against
//! the whole path with `/` matched literally. `**` has no recursive meaning.

use glob::{MatchOptions, Pattern};
use podsync_core::error::{Error, Result, ResultExt};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, trace, warn};

/// Catch-all dotfile rule written only when the ignore file is first created
pub const DOTFILE_PATTERN: &str = ".*";

/// Built-in rules that are always in effect and appended to the ignore file
pub const DEFAULT_PATTERNS: &[&str] = &[
    // Version control
    ".git",
    ".hg",
    ".svn",
    // OS and editor leftovers
    ".DS_Store",
    "*.swp",
    "*.swo",
    "*~",
    ".#*",
    "4913",
    // Dependencies and logs
    "node_modules",
    "log",
    "logs",
    // podsync's own settings
    ".podsync.toml",
    ".podsyncignore",
];

const GLOB_META: &[char] = &['*', '?', '['];

const SINGLE_LEVEL: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
enum Rule {
    Component(String),
    ComponentGlob(Pattern),
    Anchored(String),
    AnchoredGlob(Pattern),
}

impl Rule {
    fn parse(raw: &str) -> Option<Self> {
        let pattern = raw.trim();
        if pattern.is_empty() || pattern.starts_with('#') || pattern.starts_with(';') {
            return None;
        }
        // A trailing slash only marks directories; components carry no type here.
        let pattern = if pattern.len() > 1 {
            pattern.trim_end_matches('/')
        } else {
            pattern
        };

        let anchored = pattern.starts_with('/');
        if pattern.contains(GLOB_META) {
            match Pattern::new(pattern) {
                Ok(glob) if anchored => return Some(Self::AnchoredGlob(glob)),
                Ok(glob) => return Some(Self::ComponentGlob(glob)),
                Err(e) => warn!("Treating '{pattern}' literally: {e}"),
            }
        }

        if anchored {
            Some(Self::Anchored(pattern.to_string()))
        } else {
            Some(Self::Component(pattern.to_string()))
        }
    }

    fn source(&self) -> &str {
        match self {
            Self::Component(s) | Self::Anchored(s) => s,
            Self::ComponentGlob(p) | Self::AnchoredGlob(p) => p.as_str(),
        }
    }
}

/// Evaluates whether a path is excluded from synchronization
#[derive(Debug, Clone, Default)]
pub struct ExclusionMatcher {
    rules: Vec<Rule>,
}

impl ExclusionMatcher {
    /// Create a matcher with no rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a matcher from patterns
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self::new();
        matcher.set_patterns(patterns);
        matcher
    }

    /// Create a matcher holding only the built-in defaults
    pub fn with_defaults() -> Self {
        Self::from_patterns(DEFAULT_PATTERNS)
    }

    /// Replace the rule list. Blank lines and `#` comments are skipped,
    /// duplicates are dropped.
    pub fn set_patterns<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rules.clear();
        for raw in patterns {
            if let Some(rule) = Rule::parse(raw.as_ref()) {
                if !self.rules.iter().any(|r| r.source() == rule.source()) {
                    self.rules.push(rule);
                }
            }
        }
    }

    /// Number of active rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the matcher has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check a path against the rules
    pub fn is_match(&self, path: &Path) -> bool {
        let components: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let full = format!("/{}", components.join("/"));

        self.rules.iter().any(|rule| match rule {
            Rule::Anchored(pattern) => *pattern == full,
            Rule::AnchoredGlob(glob) => glob.matches_with(&full, SINGLE_LEVEL),
            Rule::Component(pattern) => components.iter().any(|c| c == pattern),
            Rule::ComponentGlob(glob) => components
                .iter()
                .any(|c| glob.matches_with(c, SINGLE_LEVEL)),
        })
    }

    /// Check a root-relative path and each of its ancestors.
    ///
    /// Anything inside an excluded directory is excluded too.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        relative
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .any(|p| self.is_match(p))
    }
}

/// Path of `path` relative to `root`, or `None` when it lies outside the root
pub fn relative_path(root: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(Path::to_path_buf)
}

#[derive(Debug)]
struct CachedRules {
    stamp: Option<(SystemTime, u64)>,
    matcher: Arc<ExclusionMatcher>,
}

/// The persisted ignore file: one pattern per line, only ever appended to
#[derive(Debug, Clone)]
pub struct IgnoreFile {
    path: PathBuf,
    cache: Arc<Mutex<Option<CachedRules>>>,
}

impl IgnoreFile {
    /// Ignore file at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Ignore file at `relative` inside the sync root
    pub fn in_root(root: &Path, relative: impl AsRef<Path>) -> Self {
        Self::new(root.join(relative))
    }

    /// Location of the ignore file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file exists on disk
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Patterns currently in the file; a missing file has none
    pub fn patterns(&self) -> Result<Vec<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::with_context(
                    format!("Failed to read ignore file {}", self.path.display()),
                    e,
                ))
            }
        };

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Build a matcher from the file contents plus the built-in defaults
    pub fn matcher(&self) -> Result<ExclusionMatcher> {
        let mut patterns = self.patterns()?;
        patterns.extend(DEFAULT_PATTERNS.iter().map(|p| p.to_string()));
        Ok(ExclusionMatcher::from_patterns(patterns))
    }

    /// Matcher for the current file contents, re-read only when the file's
    /// modification time or length changed since the last call
    pub fn current_matcher(&self) -> Result<Arc<ExclusionMatcher>> {
        let stamp = fs::metadata(&self.path)
            .ok()
            .and_then(|m| m.modified().ok().map(|t| (t, m.len())));

        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(cached) = cache.as_ref() {
            if cached.stamp == stamp {
                return Ok(Arc::clone(&cached.matcher));
            }
        }

        trace!("Reloading exclusion rules from {}", self.path.display());
        let matcher = Arc::new(self.matcher()?);
        *cache = Some(CachedRules {
            stamp,
            matcher: Arc::clone(&matcher),
        });
        Ok(matcher)
    }

    /// Seed or top up the file with the built-in defaults.
    ///
    /// On first creation the file also gets the catch-all dotfile rule.
    /// Later calls only append defaults that are missing. Returns the
    /// patterns that were written.
    pub fn ensure_defaults(&self) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        if !self.exists() {
            debug!("Creating ignore file {}", self.path.display());
            missing.push(DOTFILE_PATTERN.to_string());
            missing.extend(DEFAULT_PATTERNS.iter().map(|p| p.to_string()));
        } else {
            let existing = self.patterns()?;
            missing.extend(
                DEFAULT_PATTERNS
                    .iter()
                    .filter(|p| !existing.iter().any(|e| e == *p))
                    .map(|p| p.to_string()),
            );
        }

        if !missing.is_empty() {
            self.append(&missing)?;
        }
        Ok(missing)
    }

    /// Append a pattern unless it is already present. Returns whether the
    /// file changed.
    pub fn add(&self, pattern: &str) -> Result<bool> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(Error::validation("ignore pattern must not be empty"));
        }
        if self.patterns()?.iter().any(|p| p == pattern) {
            return Ok(false);
        }
        self.append(&[pattern.to_string()])?;
        Ok(true)
    }

    fn append(&self, patterns: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create {}", parent.display()))?;
            }
        }

        let needs_newline = fs::read(&self.path)
            .map(|bytes| !bytes.is_empty() && !bytes.ends_with(b"\n"))
            .unwrap_or(false);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(format!("Failed to open ignore file {}", self.path.display()))?;

        let mut buffer = String::new();
        if needs_newline {
            buffer.push('\n');
        }
        for pattern in patterns {
            buffer.push_str(pattern);
            buffer.push('\n');
        }
        file.write_all(buffer.as_bytes())
            .context(format!("Failed to write ignore file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_component_pattern_matches_any_depth() {
        let matcher = ExclusionMatcher::from_patterns(["node_modules"]);
        assert!(matcher.is_match(Path::new("/a/b/node_modules/c/d.txt")));
        assert!(matcher.is_match(Path::new("node_modules")));
    }

    #[test]
    fn test_anchored_pattern_requires_exact_path() {
        let matcher = ExclusionMatcher::from_patterns(["/exact/path"]);
        assert!(matcher.is_match(Path::new("/exact/path")));
        assert!(!matcher.is_match(Path::new("/exact/path/child")));
        assert!(!matcher.is_match(Path::new("/other/exact/path")));
    }

    #[test]
    fn test_no_component_match() {
        let matcher = ExclusionMatcher::from_patterns(["foo"]);
        assert!(!matcher.is_match(Path::new("/a/bar/baz")));
        assert!(!matcher.is_match(Path::new("/a/foobar/baz")));
    }

    #[test]
    fn test_component_glob_is_single_level() {
        let matcher = ExclusionMatcher::from_patterns(["*.swp", ".*"]);
        assert!(matcher.is_match(Path::new("/src/.main.rs.swp")));
        assert!(matcher.is_match(Path::new("/.env")));
        assert!(matcher.is_match(Path::new("/src/.cache/x")));
        assert!(!matcher.is_match(Path::new("/src/main.rs")));
    }

    #[test]
    fn test_anchored_glob_does_not_cross_separators() {
        let matcher = ExclusionMatcher::from_patterns(["/build/*.o"]);
        assert!(matcher.is_match(Path::new("/build/main.o")));
        assert!(!matcher.is_match(Path::new("/build/sub/main.o")));
    }

    #[test]
    fn test_comments_blank_lines_and_duplicates_are_skipped() {
        let matcher =
            ExclusionMatcher::from_patterns(["# comment", "", "  ", "target", "target", "dist/"]);
        assert_eq!(matcher.len(), 2);
        assert!(matcher.is_match(Path::new("/dist/bundle.js")));
    }

    #[test]
    fn test_is_excluded_checks_ancestors() {
        let matcher = ExclusionMatcher::from_patterns(["/build"]);
        assert!(matcher.is_excluded(Path::new("build/out/app.o")));
        assert!(!matcher.is_excluded(Path::new("src/build.rs")));
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/work/project");
        assert_eq!(
            relative_path(root, Path::new("/work/project/src/app.js")),
            Some(PathBuf::from("src/app.js"))
        );
        assert_eq!(relative_path(root, Path::new("/elsewhere/app.js")), None);
    }

    #[test]
    fn test_ensure_defaults_seeds_new_file() {
        let dir = TempDir::new().expect("test setup failed");
        let ignore = IgnoreFile::in_root(dir.path(), ".podsyncignore");

        let written = ignore.ensure_defaults().expect("seeding failed");
        assert_eq!(written[0], DOTFILE_PATTERN);
        assert_eq!(written.len(), DEFAULT_PATTERNS.len() + 1);

        let patterns = ignore.patterns().expect("read failed");
        assert_eq!(patterns, written);
    }

    #[test]
    fn test_ensure_defaults_is_idempotent_and_append_only() {
        let dir = TempDir::new().expect("test setup failed");
        let path = dir.path().join(".podsyncignore");
        fs::write(&path, "custom\n.git").expect("test setup failed");
        let ignore = IgnoreFile::new(&path);

        let written = ignore.ensure_defaults().expect("top-up failed");
        assert!(!written.contains(&".git".to_string()));
        assert!(!written.contains(&DOTFILE_PATTERN.to_string()));
        assert!(written.contains(&"node_modules".to_string()));

        let patterns = ignore.patterns().expect("read failed");
        assert_eq!(&patterns[..2], &["custom".to_string(), ".git".to_string()]);

        let second = ignore.ensure_defaults().expect("second top-up failed");
        assert!(second.is_empty());
    }

    #[test]
    fn test_add_deduplicates() {
        let dir = TempDir::new().expect("test setup failed");
        let ignore = IgnoreFile::in_root(dir.path(), "nested/.podsyncignore");

        assert!(ignore.add("coverage").expect("add failed"));
        assert!(!ignore.add("coverage").expect("add failed"));
        assert!(ignore.add("").is_err());
        assert_eq!(ignore.patterns().expect("read failed"), vec!["coverage"]);
    }

    #[test]
    fn test_current_matcher_picks_up_external_edits() {
        let dir = TempDir::new().expect("test setup failed");
        let ignore = IgnoreFile::in_root(dir.path(), ".podsyncignore");

        let before = ignore.current_matcher().expect("load failed");
        assert!(!before.is_match(Path::new("/fixtures/data.json")));

        fs::write(ignore.path(), "fixtures\n").expect("test setup failed");
        let after = ignore.current_matcher().expect("reload failed");
        assert!(after.is_match(Path::new("/fixtures/data.json")));
        assert!(after.is_match(Path::new("/.git/HEAD")));
    }
}
