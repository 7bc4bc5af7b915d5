//! Result column names have to become valid, mutually unique host
//! identifiers before projection can use them as field names.

use crate::core::config::{DuplicatePolicy, MarshalConfig};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNames {
    pub names: Vec<String>,
    /// Collision groups whose `_1`..`_99` suffix search came up empty.
    /// Non-zero only under `DuplicatePolicy::Warn`.
    pub unresolved: usize,
}

/// Sanitize raw column names and resolve duplicates.
///
/// Every byte that is not ASCII alphanumeric becomes `_`. When unique
/// fieldname checking is enabled, the later column of a duplicate pair
/// gets the first `_N` suffix (N = 1..99) unique among all current
/// names; if no suffix fits, the duplicate stays and a warning is
/// logged (or the query aborts, per policy).
pub fn build_field_names(raw: &[String], cfg: &MarshalConfig) -> AppResult<FieldNames> {
    let mut names: Vec<String> = raw.iter().map(|n| sanitize(n)).collect();
    let mut unresolved = 0;

    if cfg.unique_fieldnames && names.len() > 1 {
        for i in 0..names.len() - 1 {
            for j in i + 1..names.len() {
                if names[i] != names[j] {
                    continue;
                }
                match unique_suffix(&names, j) {
                    Some(resolved) => names[j] = resolved,
                    None => {
                        if cfg.duplicate_policy == DuplicatePolicy::Error {
                            return Err(AppError::InvalidArgument(format!(
                                "could not build unique fieldname for {}",
                                names[j]
                            )));
                        }
                        tracing::warn!(name = %names[j], "could not build unique fieldname");
                        unresolved += 1;
                    }
                }
            }
        }
    }

    Ok(FieldNames { names, unresolved })
}

fn sanitize(name: &str) -> String {
    let bytes: Vec<u8> = name
        .bytes()
        .map(|b| if b.is_ascii_alphanumeric() { b } else { b'_' })
        .collect();
    // All bytes are ASCII after replacement.
    String::from_utf8(bytes).unwrap_or_default()
}

fn unique_suffix(names: &[String], j: usize) -> Option<String> {
    for k in 1..100 {
        let candidate = format!("{}_{}", names[j], k);
        if !names.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MarshalConfig {
        MarshalConfig::default()
    }

    fn names(raw: &[&str], cfg: &MarshalConfig) -> FieldNames {
        let raw: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
        build_field_names(&raw, cfg).unwrap()
    }

    #[test]
    fn invalid_characters_become_underscores() {
        let out = names(&["Total Count", "a*b?c", "päck"], &cfg());
        assert_eq!(out.names, ["Total_Count", "a_b_c", "p__ck"]);
        assert_eq!(out.unresolved, 0);
    }

    #[test]
    fn already_valid_unique_names_pass_unchanged() {
        let input = ["alpha", "beta", "gamma_2"];
        let out = names(&input, &cfg());
        assert_eq!(out.names, input);
    }

    #[test]
    fn duplicate_pair_gets_a_numeric_suffix() {
        let out = names(&["Total Count", "Total Count"], &cfg());
        assert_eq!(out.names, ["Total_Count", "Total_Count_1"]);
    }

    #[test]
    fn suffix_skips_names_already_taken() {
        let out = names(&["x", "x_1", "x"], &cfg());
        assert_eq!(out.names, ["x", "x_1", "x_2"]);
    }

    #[test]
    fn disabled_checking_keeps_duplicates() {
        let mut c = cfg();
        c.unique_fieldnames = false;
        let out = names(&["Total Count", "Total Count"], &c);
        assert_eq!(out.names, ["Total_Count", "Total_Count"]);
    }

    #[test]
    fn hundred_way_collision_resolves_within_the_suffix_range() {
        let raw = vec!["n".to_string(); 100];
        let out = build_field_names(&raw, &cfg()).unwrap();
        let mut sorted = out.names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 100);
        assert_eq!(out.unresolved, 0);
    }

    #[test]
    fn exhausted_suffix_range_warns_and_keeps_the_duplicate() {
        let raw = vec!["n".to_string(); 101];
        let out = build_field_names(&raw, &cfg()).unwrap();
        assert_eq!(out.unresolved, 1);
        let mut sorted = out.names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 100);
    }

    #[test]
    fn exhausted_suffix_range_can_be_a_hard_error() {
        let mut c = cfg();
        c.duplicate_policy = DuplicatePolicy::Error;
        let raw = vec!["n".to_string(); 101];
        assert!(matches!(
            build_field_names(&raw, &c),
            Err(AppError::InvalidArgument(_))
        ));
    }
}
