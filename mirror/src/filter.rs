//! Include/ignore filtering over relative tree keys.

use std::collections::HashSet;
use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::SyncSettings;
use crate::error::{Result, SyncError};

/// Decides which keys take part in a sync, plus which directory names are
/// pruned from traversal.
///
/// Glob semantics are shell-style with `*` allowed to span separators, so the
/// default include list `["*"]` matches every key and a pattern without a
/// wildcard (`".mirror-state.json"`) matches only that exact key at the tree
/// root.
#[derive(Debug, Clone)]
pub struct PathFilter {
    includes: Option<GlobSet>,
    excludes: Option<GlobSet>,
    ignored_dirs: HashSet<String>,
}

impl PathFilter {
    /// Create a filter from explicit pattern lists.
    pub fn new(
        include_patterns: &[String],
        exclude_patterns: &[String],
        ignored_dirs: &[String],
    ) -> Result<Self> {
        let includes = if include_patterns.is_empty() {
            None
        } else {
            Some(Self::compile_set(include_patterns)?)
        };

        let excludes = if exclude_patterns.is_empty() {
            None
        } else {
            Some(Self::compile_set(exclude_patterns)?)
        };

        Ok(Self {
            includes,
            excludes,
            ignored_dirs: ignored_dirs.iter().cloned().collect(),
        })
    }

    /// Create the filter a settings value calls for, with the engine's own
    /// file names appended to the denylist.
    pub fn from_settings(settings: &SyncSettings) -> Result<Self> {
        Self::new(
            &settings.files_to_include,
            &settings.effective_file_ignores(),
            &settings.dirs_to_ignore,
        )
    }

    /// Check whether a relative key passes the include/exclude rules.
    /// A key is kept iff it matches at least one include pattern (an empty
    /// include list keeps everything) and no exclude pattern.
    pub fn matches(&self, key: &str) -> bool {
        let path = Path::new(key);

        if let Some(includes) = &self.includes {
            if !includes.is_match(path) {
                return false;
            }
        }

        if let Some(excludes) = &self.excludes {
            if excludes.is_match(path) {
                return false;
            }
        }

        true
    }

    /// Check whether a directory name is pruned before descent.
    pub fn skip_dir(&self, name: &str) -> bool {
        self.ignored_dirs.contains(name)
    }

    /// Compile a pattern list into one matcher.
    fn compile_set(patterns: &[String]) -> Result<GlobSet> {
        let mut set = GlobSetBuilder::new();

        for pattern in patterns {
            let mut glob = GlobBuilder::new(pattern);

            // Case folding follows the host filesystem's convention
            if cfg!(windows) {
                glob.case_insensitive(true);
            }

            let compiled = glob
                .build()
                .map_err(|e| SyncError::FilterPattern(format!("Bad glob '{}': {}", pattern, e)))?;
            set.add(compiled);
        }

        set.build()
            .map_err(|e| SyncError::FilterPattern(e.to_string()))
    }
}
