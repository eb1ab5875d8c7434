// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Source allow-list built from bucket and key globs.
//!
//! Every bucket glob is paired with every key glob and the pair `bucket/key` is
//! compiled into an anchored regular expression. `*` matches any run of characters,
//! `/` included, and `?` matches exactly one character. Everything else is literal.

use regex::Regex;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("failed to compile pattern {pattern:?}: {source}")]
    Compile {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ObjectFilter {
    patterns: Vec<Regex>,
}

impl ObjectFilter {
    pub fn new<B, K>(bucket_globs: &[B], key_globs: &[K]) -> Result<Self, FilterError>
    where
        B: AsRef<str>,
        K: AsRef<str>,
    {
        let mut patterns = Vec::with_capacity(bucket_globs.len() * key_globs.len());
        for bucket in bucket_globs {
            for key in key_globs {
                let glob = format!("{}/{}", bucket.as_ref(), key.as_ref());
                let expr = glob_to_regex(&glob);
                let compiled = Regex::new(&expr).map_err(|source| FilterError::Compile {
                    pattern: glob.clone(),
                    source,
                })?;
                debug!("object filter: {glob} compiled to {expr}");
                patterns.push(compiled);
            }
        }
        Ok(ObjectFilter { patterns })
    }

    /// Returns true if any pattern matches `source` (`bucket/key`).
    /// A filter without patterns matches nothing.
    pub fn allow(&self, source: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(source))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut expr = String::with_capacity(glob.len() + 8);
    expr.push('^');
    let mut literal = String::new();
    for ch in glob.chars() {
        match ch {
            '*' | '?' => {
                expr.push_str(&regex::escape(&literal));
                literal.clear();
                expr.push_str(if ch == '*' { ".*" } else { "." });
            }
            _ => literal.push(ch),
        }
    }
    expr.push_str(&regex::escape(&literal));
    expr.push('$');
    // `.` must cross newlines too, keys are arbitrary bytes
    format!("(?s){expr}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Straightforward shell-style matcher used as the reference.
    fn glob_match(pattern: &[char], input: &[char]) -> bool {
        match (pattern.first(), input.first()) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some('*'), _) => {
                glob_match(&pattern[1..], input)
                    || (!input.is_empty() && glob_match(pattern, &input[1..]))
            }
            (Some('?'), Some(_)) => glob_match(&pattern[1..], &input[1..]),
            (Some(p), Some(c)) if p == c => glob_match(&pattern[1..], &input[1..]),
            _ => false,
        }
    }

    #[test]
    fn test_allow_all() {
        let filter = ObjectFilter::new(&["*"], &["*"]).unwrap();
        assert!(filter.allow("my-bucket/test.json"));
        assert!(filter.allow("my-bucket/a/deeply/nested/key"));
    }

    #[test]
    fn test_empty_filter_matches_nothing() {
        let filter = ObjectFilter::new::<&str, &str>(&[], &["*"]).unwrap();
        assert!(filter.is_empty());
        assert!(!filter.allow("my-bucket/test.json"));
    }

    #[test]
    fn test_bucket_prefix() {
        let filter = ObjectFilter::new(&["observeinc*"], &["*"]).unwrap();
        assert!(filter.allow("observeinc-logs/test.json"));
        assert!(!filter.allow("my-bucket/test.json"));
    }

    #[test]
    fn test_cross_product() {
        let filter = ObjectFilter::new(&["a", "b"], &["*.json", "logs/*"]).unwrap();
        assert!(filter.allow("a/x.json"));
        assert!(filter.allow("b/logs/x.csv"));
        assert!(!filter.allow("c/x.json"));
        assert!(!filter.allow("a/x.csv"));
    }

    #[test]
    fn test_question_mark_and_literals() {
        let filter = ObjectFilter::new(&["bucket.v?"], &["file+(1).json"]).unwrap();
        assert!(filter.allow("bucket.v1/file+(1).json"));
        assert!(!filter.allow("bucketXv1/file+(1).json"));
        assert!(!filter.allow("bucket.v12/file+(1).json"));
    }

    #[test]
    fn test_case_sensitive() {
        let filter = ObjectFilter::new(&["Bucket"], &["*"]).unwrap();
        assert!(!filter.allow("bucket/key"));
    }

    proptest! {
        #[test]
        fn prop_matches_shell_glob(
            bucket in "[ab*?]{0,4}",
            key in "[ab/*?]{0,5}",
            source in "[ab/]{0,10}",
        ) {
            let filter = ObjectFilter::new(&[bucket.as_str()], &[key.as_str()]).unwrap();
            let glob: Vec<char> = format!("{bucket}/{key}").chars().collect();
            let input: Vec<char> = source.chars().collect();
            prop_assert_eq!(filter.allow(&source), glob_match(&glob, &input));
        }
    }
}
