//! Dependency manifest parser.
//!
//! `dependencies.txt` has drifted through four variants over the years:
//! 3-field vs 4-field records, with and without the URL-namespace exclusion,
//! with and without legacy name validation. One parser handles all of them by
//! classifying every line into an explicit [`LineShape`] first, then applying
//! the policy for that shape. Parsing never fails; malformed lines are counted
//! and reported after the full pass.

use std::collections::BTreeMap;

use crate::config::ModulePolicy;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::model::DependencyRecord;

/// Arity-based format detection for one manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineShape<'a> {
    /// `commit branch path url` — current format.
    FourField {
        commit: &'a str,
        branch: &'a str,
        path: &'a str,
        url: &'a str,
    },
    /// `commit branch path` — legacy format without a URL column.
    ThreeField {
        commit: &'a str,
        branch: &'a str,
        path: &'a str,
    },
    /// Any other field count.
    Invalid,
}

pub fn classify_line(line: &str) -> LineShape<'_> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        [commit, branch, path, url] => LineShape::FourField {
            commit,
            branch,
            path,
            url,
        },
        [commit, branch, path] => LineShape::ThreeField {
            commit,
            branch,
            path,
        },
        _ => LineShape::Invalid,
    }
}

/// Result of parsing one application's manifest.
#[derive(Debug, Default)]
pub struct ManifestOutcome {
    /// Accepted first-party dependencies, keyed (and deduplicated) by name.
    pub records: BTreeMap<String, DependencyRecord>,
    pub legacy_lines: usize,
    pub invalid_lines: usize,
    /// Record lines seen, header excluded.
    pub total_lines: usize,
}

impl ManifestOutcome {
    /// A manifest that could not be fetched reads as zero dependencies.
    pub fn empty() -> Self {
        Self::default()
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn name_from_url(url: &str) -> &str {
    let segment = last_segment(url);
    segment.strip_suffix(".git").unwrap_or(segment)
}

/// Parse the full manifest text of `app`. Header line is ignored.
pub fn parse_manifest(
    app: &str,
    text: &str,
    policy: &ModulePolicy,
    diagnostics: &mut Diagnostics,
) -> ManifestOutcome {
    let mut outcome = ManifestOutcome::default();

    let mut lines = text.lines();
    let _header = lines.next();

    for line in lines {
        outcome.total_lines += 1;
        match classify_line(line) {
            LineShape::FourField {
                commit,
                branch,
                path,
                url,
            } => {
                let dep_name = name_from_url(url);
                // Only first-party dependencies are tracked; foreign URLs are
                // excluded without a diagnostic.
                if !policy.is_first_party_url(url) || policy.is_suppressed(dep_name) {
                    continue;
                }
                outcome.records.insert(
                    dep_name.to_string(),
                    DependencyRecord {
                        commit: commit.to_string(),
                        branch: branch.to_string(),
                        path: path.to_string(),
                        url: url.to_string(),
                        dep_name: dep_name.to_string(),
                    },
                );
            }
            LineShape::ThreeField {
                commit,
                branch,
                path,
            } => {
                outcome.legacy_lines += 1;
                let dep_name = last_segment(path);
                if policy.is_suppressed(dep_name) {
                    continue;
                }
                if policy.matches_naming_convention(dep_name) {
                    diagnostics.push(Diagnostic::LegacyModuleByPath {
                        app: app.to_string(),
                        module: dep_name.to_string(),
                    });
                    outcome.records.insert(
                        dep_name.to_string(),
                        DependencyRecord {
                            commit: commit.to_string(),
                            branch: branch.to_string(),
                            path: path.to_string(),
                            url: policy.synthetic_url(dep_name),
                            dep_name: dep_name.to_string(),
                        },
                    );
                } else {
                    diagnostics.push(Diagnostic::UnexpectedLegacyModule {
                        app: app.to_string(),
                        name: dep_name.to_string(),
                    });
                }
            }
            LineShape::Invalid => outcome.invalid_lines += 1,
        }
    }

    if outcome.legacy_lines > 0 {
        diagnostics.push(Diagnostic::LegacyManifestLines {
            app: app.to_string(),
            count: outcome.legacy_lines,
            total: outcome.total_lines,
        });
    }
    if outcome.invalid_lines > 0 {
        diagnostics.push(Diagnostic::InvalidManifestLines {
            app: app.to_string(),
            count: outcome.invalid_lines,
            total: outcome.total_lines,
        });
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModulePolicy;

    const HEADER: &str = "commit branch path url";

    fn parse(text: &str) -> (ManifestOutcome, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let outcome = parse_manifest(
            "OAM-Test",
            text,
            &ModulePolicy::default(),
            &mut diagnostics,
        );
        (outcome, diagnostics)
    }

    #[test]
    fn four_field_inside_namespace_is_accepted_with_derived_name() {
        let text = format!(
            "{HEADER}\nabc123 main lib/OFM-Common https://github.com/OpenKNX/OFM-Common.git\n"
        );
        let (outcome, diagnostics) = parse(&text);
        let record = outcome.records.get("OFM-Common").expect("record present");
        assert_eq!(record.dep_name, "OFM-Common");
        assert_eq!(record.commit, "abc123");
        assert_eq!(record.url, "https://github.com/OpenKNX/OFM-Common.git");
        assert!(diagnostics.is_empty(), "clean manifest raises nothing");
    }

    #[test]
    fn four_field_outside_namespace_is_silently_excluded() {
        let text = format!(
            "{HEADER}\nabc123 main lib/fastcrc https://github.com/FrankBoesing/FastCRC.git\n"
        );
        let (outcome, diagnostics) = parse(&text);
        assert!(outcome.records.is_empty());
        assert!(diagnostics.is_empty(), "foreign URLs are excluded quietly");
    }

    #[test]
    fn smartmf_is_suppressed_in_both_shapes() {
        let text = format!(
            "{HEADER}\n\
             abc main lib/OFM-SmartMF https://github.com/OpenKNX/OFM-SmartMF.git\n\
             def main lib/OFM-SmartMF\n"
        );
        let (outcome, _) = parse(&text);
        assert!(!outcome.records.contains_key("OFM-SmartMF"));
    }

    #[test]
    fn three_field_with_known_prefix_gets_synthetic_url_and_workaround_diag() {
        let text = format!("{HEADER}\nabc123 main lib/OFM-LogicModule\n");
        let (outcome, diagnostics) = parse(&text);
        let record = outcome
            .records
            .get("OFM-LogicModule")
            .expect("legacy record present");
        assert_eq!(record.url, "https://github.com/OpenKNX/OFM-LogicModule.git");
        assert_eq!(outcome.legacy_lines, 1);
        assert_eq!(
            diagnostics.count_where(|d| matches!(d, Diagnostic::LegacyModuleByPath { .. })),
            1
        );
    }

    #[test]
    fn three_field_with_unknown_name_is_rejected_and_reported() {
        let text = format!("{HEADER}\nabc123 main lib/some-random-lib\n");
        let (outcome, diagnostics) = parse(&text);
        assert!(outcome.records.is_empty());
        assert_eq!(
            diagnostics.count_where(
                |d| matches!(d, Diagnostic::UnexpectedLegacyModule { name, .. } if name == "some-random-lib")
            ),
            1
        );
    }

    #[test]
    fn knx_literal_exception_is_accepted_from_legacy_lines() {
        let text = format!("{HEADER}\nabc123 main lib/knx\n");
        let (outcome, _) = parse(&text);
        assert!(outcome.records.contains_key("knx"));
    }

    #[test]
    fn counters_and_aggregate_diagnostics_for_mixed_manifest() {
        // 10 record lines: 5 valid 4-field, 3 legacy, 2 invalid.
        let text = format!(
            "{HEADER}\n\
             a1 main lib/OFM-A https://github.com/OpenKNX/OFM-A.git\n\
             a2 main lib/OFM-B https://github.com/OpenKNX/OFM-B.git\n\
             a3 main lib/OFM-C https://github.com/OpenKNX/OFM-C.git\n\
             a4 main lib/OFM-D https://github.com/OpenKNX/OFM-D.git\n\
             a5 main lib/knx https://github.com/OpenKNX/knx.git\n\
             b1 main lib/OFM-E\n\
             b2 main lib/OFM-F\n\
             b3 main lib/OGM-G\n\
             broken\n\
             c1 main lib/OFM-H https://github.com/OpenKNX/OFM-H.git trailing\n"
        );
        let (outcome, diagnostics) = parse(&text);
        assert_eq!(outcome.total_lines, 10);
        assert_eq!(outcome.legacy_lines, 3);
        assert_eq!(outcome.invalid_lines, 2);
        assert_eq!(outcome.records.len(), 8, "valid and legacy records kept");
        assert_eq!(
            diagnostics.count_where(|d| matches!(
                d,
                Diagnostic::LegacyManifestLines {
                    count: 3,
                    total: 10,
                    ..
                }
            )),
            1
        );
        assert_eq!(
            diagnostics.count_where(|d| matches!(
                d,
                Diagnostic::InvalidManifestLines {
                    count: 2,
                    total: 10,
                    ..
                }
            )),
            1
        );
    }

    #[test]
    fn header_only_manifest_yields_empty_outcome() {
        let (outcome, diagnostics) = parse(HEADER);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.total_lines, 0);
        assert!(diagnostics.is_empty());
    }
}
