//! The generation pipeline.
//!
//! Strictly linear: load, validate, allocate, distribute resources,
//! resolve, render, report. Any stage failure aborts before the next stage
//! runs; rendering is the only stage with filesystem side effects and it is
//! deferred until every earlier stage has succeeded for the whole document.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::allocate::allocate;
use crate::document::loader::load_document;
use crate::errors::GenerateError;
use crate::orphan;
use crate::render::plan::{apply_writes, plan_writes, PlannedWrite, WriteAction};
use crate::render::{render, RenderInput};
use crate::resolve::resolve;
use crate::resources::distribute;
use crate::validate::validate;

#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    /// Compute and report the full plan without touching the filesystem.
    pub dry_run: bool,
    /// Delete orphaned files instead of only listing them.
    pub clean_orphans: bool,
}

/// What a run did (or, under dry-run, would have done).
#[derive(Debug, Clone, Default)]
pub struct GenerateReport {
    pub created: Vec<PathBuf>,
    pub merged: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub orphans: Vec<PathBuf>,
    pub removed_orphans: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub dry_run: bool,
}

/// Runs the whole pipeline for the document at `source`, writing the
/// output tree under `out_dir`.
pub fn generate(
    source: &Path,
    out_dir: &Path,
    options: GenerateOptions,
) -> Result<GenerateReport, GenerateError> {
    let doc = load_document(source)?;

    let violations = validate(&doc);
    if !violations.is_empty() {
        return Err(GenerateError::Validation(violations));
    }

    let allocation = allocate(&doc).map_err(GenerateError::Allocation)?;
    let budgets = distribute(&doc)?;
    let resolution = resolve(&doc).map_err(GenerateError::Resolution)?;

    let rendered = render(&RenderInput {
        doc: &doc,
        allocation: &allocation,
        budgets: &budgets,
        resolution: &resolution,
    })?;
    let plan = plan_writes(out_dir, &rendered)?;

    let desired: BTreeSet<PathBuf> = rendered.iter().map(|f| f.rel_path.clone()).collect();
    let orphans = orphan::detect(out_dir, &desired)?;

    let mut report = report_from_plan(&plan, options.dry_run);
    report.orphans = orphans.clone();
    report.warnings = resolution.warnings.clone();

    if !options.dry_run {
        apply_writes(out_dir, &plan)?;
        if options.clean_orphans {
            orphan::remove(out_dir, &orphans)?;
            report.removed_orphans = orphans;
        }
    }

    Ok(report)
}

fn report_from_plan(plan: &[PlannedWrite], dry_run: bool) -> GenerateReport {
    let mut report = GenerateReport {
        dry_run,
        ..GenerateReport::default()
    };
    for write in plan {
        let bucket = match write.action {
            WriteAction::Create => &mut report.created,
            WriteAction::Merge => &mut report.merged,
            WriteAction::Unchanged => &mut report.unchanged,
        };
        bucket.push(write.rel_path.clone());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SITE: &str = r#"
global:
  resources:
    cpu_capacity: 8
    memory_mb_capacity: 8192
domains:
  work:
    trust_level: trusted
    subnet_id: 1
    machines:
      dev:
        weight: 3
      scratch:
        weight: 1
  web:
    trust_level: untrusted
    subnet_id: 1
    machines:
      browser: {}
network_policies:
  - from: work
    to: web
    ports: [443]
    description: browsing
shared_volumes:
  media:
    source: /srv/media
    consumers:
      - domain: work
        mount: /mnt/media
        readonly: true
"#;

    fn site_file(temp: &TempDir, yaml: &str) -> PathBuf {
        let path = temp.path().join("site.yml");
        fs::write(&path, yaml).unwrap();
        path
    }

    fn tree_snapshot(dir: &Path) -> Vec<(PathBuf, String)> {
        let mut files: Vec<(PathBuf, String)> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                (
                    e.path().to_path_buf(),
                    fs::read_to_string(e.path()).unwrap(),
                )
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn generate_twice_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let source = site_file(&temp, SITE);
        let out = temp.path().join("out");

        generate(&source, &out, GenerateOptions::default()).unwrap();
        let first = tree_snapshot(&out);

        let report = generate(&source, &out, GenerateOptions::default()).unwrap();
        let second = tree_snapshot(&out);

        assert_eq!(first, second);
        assert!(report.created.is_empty());
        assert!(report.merged.is_empty());
        assert_eq!(report.unchanged.len(), 8);
    }

    #[test]
    fn dry_run_reports_the_plan_but_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let source = site_file(&temp, SITE);
        let out = temp.path().join("out");

        let report = generate(
            &source,
            &out,
            GenerateOptions {
                dry_run: true,
                clean_orphans: false,
            },
        )
        .unwrap();

        assert_eq!(report.created.len(), 8);
        assert!(!out.exists());
    }

    #[test]
    fn validation_failure_writes_no_files() {
        let temp = TempDir::new().unwrap();
        let bad = SITE.replace("trust_level: trusted", "trust_level: top-secret");
        let source = site_file(&temp, &bad);
        let out = temp.path().join("out");

        let err = generate(&source, &out, GenerateOptions::default()).unwrap_err();
        let GenerateError::Validation(errors) = err else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.field.contains("trust_level")));
        assert!(!out.exists());
    }

    #[test]
    fn duplicate_explicit_ips_abort_before_any_write() {
        let temp = TempDir::new().unwrap();
        let dup = r#"
domains:
  ctl:
    trust_level: admin
    subnet_id: 200
    machines:
      one:
        ip: 10.100.200.10
  lab:
    trust_level: trusted
    subnet_id: 5
    machines:
      two:
        ip: 10.100.200.10
"#;
        let source = site_file(&temp, dup);
        let out = temp.path().join("out");

        let err = generate(&source, &out, GenerateOptions::default()).unwrap_err();
        assert!(err
            .details()
            .iter()
            .any(|detail| detail.contains("duplicate")));
        assert!(!out.exists());
    }

    #[test]
    fn unknown_volume_consumer_mentions_the_name() {
        let temp = TempDir::new().unwrap();
        let bad = SITE.replace("- domain: work\n        mount: /mnt/media", "- domain: phantom\n        mount: /mnt/media");
        let source = site_file(&temp, &bad);
        let out = temp.path().join("out");

        let err = generate(&source, &out, GenerateOptions::default()).unwrap_err();
        assert!(err.details().iter().any(|detail| detail.contains("phantom")));
    }

    #[test]
    fn removed_machine_becomes_an_orphan_and_cleanup_deletes_only_it() {
        let temp = TempDir::new().unwrap();
        let source = site_file(&temp, SITE);
        let out = temp.path().join("out");
        generate(&source, &out, GenerateOptions::default()).unwrap();
        assert!(out.join("host_vars/scratch.yml").exists());

        let without_scratch = SITE.replace("      scratch:\n        weight: 1\n", "");
        fs::write(&source, &without_scratch).unwrap();

        let report = generate(&source, &out, GenerateOptions::default()).unwrap();
        assert_eq!(report.orphans, vec![PathBuf::from("host_vars/scratch.yml")]);
        assert!(out.join("host_vars/scratch.yml").exists(), "listing must not delete");

        let report = generate(
            &source,
            &out,
            GenerateOptions {
                dry_run: false,
                clean_orphans: true,
            },
        )
        .unwrap();
        assert_eq!(report.removed_orphans, vec![PathBuf::from("host_vars/scratch.yml")]);
        assert!(!out.join("host_vars/scratch.yml").exists());
        assert!(out.join("host_vars/dev.yml").exists());
    }

    #[test]
    fn free_region_edits_survive_unrelated_document_changes() {
        let temp = TempDir::new().unwrap();
        let source = site_file(&temp, SITE);
        let out = temp.path().join("out");
        generate(&source, &out, GenerateOptions::default()).unwrap();

        let host_vars = out.join("host_vars/browser.yml");
        let mut content = fs::read_to_string(&host_vars).unwrap();
        content.push_str("# pinned by hand\ncustom_flag: true\n");
        fs::write(&host_vars, &content).unwrap();

        // Unrelated change: bump a weight in the other domain.
        let changed = SITE.replace("weight: 3", "weight: 5");
        fs::write(&source, &changed).unwrap();
        generate(&source, &out, GenerateOptions::default()).unwrap();

        let after = fs::read_to_string(&host_vars).unwrap();
        assert!(after.ends_with("# pinned by hand\ncustom_flag: true\n"));
    }

    #[test]
    fn warnings_are_surfaced_in_the_report() {
        let temp = TempDir::new().unwrap();
        let yaml = SITE.replace(
            "    description: browsing\n",
            "    description: browsing\n  - from: dev\n    to: web\n    ports: [443]\n    description: narrow\n",
        );
        let source = site_file(&temp, &yaml);
        let out = temp.path().join("out");

        let report = generate(&source, &out, GenerateOptions::default()).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("narrow"));
    }

    #[test]
    fn fragment_directory_and_single_file_produce_the_same_tree() {
        let temp = TempDir::new().unwrap();
        let single = site_file(&temp, SITE);
        let out_single = temp.path().join("out-single");
        generate(&single, &out_single, GenerateOptions::default()).unwrap();

        let frag_dir = temp.path().join("fragments");
        fs::create_dir_all(frag_dir.join("domains")).unwrap();
        fs::write(
            frag_dir.join("base.yml"),
            "global:\n  resources:\n    cpu_capacity: 8\n    memory_mb_capacity: 8192\nshared_volumes:\n  media:\n    source: /srv/media\n    consumers:\n      - domain: work\n        mount: /mnt/media\n        readonly: true\n",
        )
        .unwrap();
        fs::write(
            frag_dir.join("domains/10-work.yml"),
            "domains:\n  work:\n    trust_level: trusted\n    subnet_id: 1\n    machines:\n      dev:\n        weight: 3\n      scratch:\n        weight: 1\n",
        )
        .unwrap();
        fs::write(
            frag_dir.join("domains/20-web.yml"),
            "domains:\n  web:\n    trust_level: untrusted\n    subnet_id: 1\n    machines:\n      browser: {}\n",
        )
        .unwrap();
        fs::write(
            frag_dir.join("policies.yml"),
            "network_policies:\n  - from: work\n    to: web\n    ports: [443]\n    description: browsing\n",
        )
        .unwrap();

        let out_frag = temp.path().join("out-frag");
        generate(&frag_dir, &out_frag, GenerateOptions::default()).unwrap();

        let single_tree: Vec<(PathBuf, String)> = tree_snapshot(&out_single)
            .into_iter()
            .map(|(p, c)| (p.strip_prefix(&out_single).unwrap().to_path_buf(), c))
            .collect();
        let frag_tree: Vec<(PathBuf, String)> = tree_snapshot(&out_frag)
            .into_iter()
            .map(|(p, c)| (p.strip_prefix(&out_frag).unwrap().to_path_buf(), c))
            .collect();
        assert_eq!(single_tree, frag_tree);
    }
}
