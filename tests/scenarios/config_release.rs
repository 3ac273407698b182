//! Test: config releases generate every artifact and stay idempotent

use crate::helpers::*;
use chrono::NaiveDate;
use std::sync::{Arc, Mutex};
use toolchain_release::core::config::{ConfigGroup, ConfigGroupSpec};
use toolchain_release::execution::extract::CONFIG_FILES;
use toolchain_release::execution::ReleaseManifest;
use toolchain_release::{ConfigRelease, ReleaseEvent};

const BAZEL_VERSION: &str = "0.15.0";

fn release_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 7, 4).unwrap()
}

fn builtin_groups(repo: &TestRepo, bazel_version: &str) -> Vec<ConfigGroup> {
    let groups = ConfigGroup::from_specs(&ConfigGroupSpec::builtin(), repo.root(), bazel_version).unwrap();
    for group in &groups {
        repo.add_autoconfig_outputs(group);
    }
    groups
}

async fn release(repo: &TestRepo, runner: &MockRunner, groups: &[ConfigGroup], bazel_version: &str) -> anyhow::Result<()> {
    ConfigRelease::new(runner, &repo.context, bazel_version)
        .with_date(release_date())
        .run(groups)
        .await
}

/// A full release writes configs, metadata, toolchain definitions and bazelrc files
#[tokio::test]
async fn test_release_writes_all_artifacts() {
    let repo = TestRepo::new();
    let runner = MockRunner::new();
    let groups = builtin_groups(&repo, BAZEL_VERSION);

    release(&repo, &runner, &groups, BAZEL_VERSION).await.unwrap();

    // One autoconfig build per config, run from the repository root
    let builds: Vec<String> = runner
        .command_lines()
        .into_iter()
        .filter(|l| l.starts_with("bazel build"))
        .collect();
    assert_eq!(
        builds,
        vec![
            "bazel build //configs/debian8_clang:default-debian8-clang-0.3.0-bazel_0.15.0-autoconfig",
            "bazel build //configs/debian8_clang:msan-debian8-clang-0.3.0-bazel_0.15.0-autoconfig",
            "bazel build //configs/ubuntu16_04_clang:default-ubuntu16_04-clang-1.0-bazel_0.15.0-autoconfig",
            "bazel build //configs/ubuntu16_04_clang:msan-ubuntu16_04-clang-1.0-bazel_0.15.0-autoconfig",
        ]
    );
    assert!(runner
        .invocations()
        .iter()
        .all(|i| i.workdir.as_deref() == Some(repo.root())));

    // Autoconfig targets rendered from the per-type templates
    let targets = repo.read("configs/ubuntu16_04_clang/BUILD");
    assert!(targets.contains("# Created on 2018.7.4"));
    assert!(targets.contains("name = \"msan-ubuntu16_04-clang-1.0-bazel_0.15.0-autoconfig\""));
    assert!(targets.contains(&format!("base = \"gcr.io/cloud-marketplace/google/clang-ubuntu@{}\"", UBUNTU_SHA)));
    assert!(targets.contains(&format!("clang_revision = \"{}\"", CLANG_REVISION)));

    // Extracted configs are flattened into the config directory
    let default_dir = "configs/debian8_clang/0.3.0/bazel_0.15.0/default";
    for name in CONFIG_FILES {
        assert!(repo.path(default_dir).join(name).is_file(), "{} missing", name);
    }
    assert!(!repo.path(default_dir).join("WORKSPACE").exists());
    assert_eq!(
        repo.read(&format!("{}/METADATA", default_dir)),
        format!("gcr.io/cloud-marketplace/google/clang-debian8@{}\n", DEBIAN8_SHA)
    );

    // cpp toolchain definitions carry the merged constraints
    let cpp = repo.read("configs/debian8_clang/0.3.0/bazel_0.15.0/cpp/BUILD");
    assert!(cpp.starts_with("# Copyright 2018 The Bazel Authors.\n\nlicenses([\"notice\"])  # Apache 2.0\n"));
    assert!(cpp.contains("name = \"cc-toolchain-clang-x86_64-default\""));
    assert!(cpp.contains("\"//constraints:jessie\",\n\"//constraints/sanitizers:support_msan\","));

    let toolchain_bazelrc = repo.read("configs/ubuntu16_04_clang/1.0/toolchain.bazelrc");
    assert!(toolchain_bazelrc.contains("--extra_execution_platforms=//configs/ubuntu16_04_clang/1.0:rbe_ubuntu1604"));

    let aliases = repo.read("configs/ubuntu16_04_clang/latest/BUILD");
    assert!(aliases.contains("for config_type in [\"default\", \"msan\"]]"));
    assert!(aliases.contains("\"//constraints:xenial\","));
    assert!(!aliases.contains("support_msan"));

    assert!(repo.read("bazelrc/bazel-0.15.0.bazelrc").contains("# Sample bazelrc for Bazel 0.15.0"));
    assert!(!repo.context.tmp_dir().exists());
}

/// Running the same release twice changes nothing
#[tokio::test]
async fn test_release_is_idempotent() {
    let repo = TestRepo::new();
    let runner = MockRunner::new();
    let groups = builtin_groups(&repo, BAZEL_VERSION);

    release(&repo, &runner, &groups, BAZEL_VERSION).await.unwrap();
    let metadata = repo.read("configs/ubuntu16_04_clang/1.0/bazel_0.15.0/msan/METADATA");
    let targets = repo.read("configs/ubuntu16_04_clang/BUILD");

    release(&repo, &runner, &groups, BAZEL_VERSION).await.unwrap();
    assert_eq!(repo.read("configs/ubuntu16_04_clang/1.0/bazel_0.15.0/msan/METADATA"), metadata);
    assert_eq!(repo.read("configs/ubuntu16_04_clang/BUILD"), targets);
    assert_eq!(
        targets.matches("default-ubuntu16_04-clang-1.0-bazel_0.15.0-autoconfig").count(),
        1
    );
}

/// latest.bazelrc follows the most recent release
#[cfg(unix)]
#[tokio::test]
async fn test_latest_bazelrc_points_at_newest_release() {
    let repo = TestRepo::new();
    let runner = MockRunner::new();

    let old = builtin_groups(&repo, "0.14.1");
    release(&repo, &runner, &old, "0.14.1").await.unwrap();
    let new = builtin_groups(&repo, BAZEL_VERSION);
    release(&repo, &runner, &new, BAZEL_VERSION).await.unwrap();

    let link = repo.context.latest_bazelrc_link();
    assert_eq!(
        std::fs::read_link(&link).unwrap(),
        std::path::PathBuf::from("bazel-0.15.0.bazelrc")
    );
    assert!(repo.path("bazelrc/bazel-0.14.1.bazelrc").is_file());
    assert!(repo.read("bazelrc/latest.bazelrc").contains("Bazel 0.15.0"));
}

/// A tarball without every config file fails the release and leaves no scratch directory
#[tokio::test]
async fn test_incomplete_outputs_fail() {
    let repo = TestRepo::new();
    let runner = MockRunner::new();
    let groups = builtin_groups(&repo, BAZEL_VERSION);

    let group = &groups[0];
    let target = group.autoconfig_target(&group.configs[1]);
    let tarball = toolchain_release::execution::extract::outputs_tarball(repo.root(), &group.package, &target);
    write_tarball(&tarball, &["./local_config_cc/BUILD".to_string()], &target);

    let err = release(&repo, &runner, &groups, BAZEL_VERSION).await.unwrap_err();
    assert!(format!("{:#}", err).contains("cc_toolchain_config.bzl"));
    assert!(!repo.context.tmp_dir().exists());
    // Nothing after the failing config ran
    assert!(!repo.path("bazelrc/bazel-0.15.0.bazelrc").exists());
}

/// A failing autoconfig build is reported with the config it belongs to
#[tokio::test]
async fn test_failed_autoconfig_build() {
    let repo = TestRepo::new();
    let runner = MockRunner::new().fail_on("bazel build //configs/ubuntu16_04_clang:msan");
    let groups = builtin_groups(&repo, BAZEL_VERSION);

    let err = release(&repo, &runner, &groups, BAZEL_VERSION).await.unwrap_err();
    assert!(format!("{:#}", err).contains("msan configs for configs/ubuntu16_04_clang"));
    assert!(!repo.context.tmp_dir().exists());
}

/// Without a digest for the group's container nothing is generated
#[tokio::test]
async fn test_missing_digest_fails() {
    let repo = TestRepo::new();
    repo.write(
        "rules/toolchain_containers.bzl",
        &format!("def toolchain_container_sha256s():\n    return {{\"debian8_clang\": \"{}\"}}\n", DEBIAN8_SHA),
    );
    let runner = MockRunner::new();
    let groups = builtin_groups(&repo, BAZEL_VERSION);

    let err = release(&repo, &runner, &groups[1..], BAZEL_VERSION).await.unwrap_err();
    assert!(format!("{:#}", err).contains("ubuntu16_04_clang"));
    assert!(runner.invocations().is_empty());
}

/// Generated BUILD and .bzl files go through buildifier when one is configured
#[tokio::test]
async fn test_buildifier_formats_generated_files() {
    let repo = TestRepo::new();
    let runner = MockRunner::new();
    let groups = builtin_groups(&repo, BAZEL_VERSION);

    ConfigRelease::new(&runner, &repo.context, BAZEL_VERSION)
        .with_date(release_date())
        .with_buildifier(Some("/usr/bin/buildifier".into()))
        .run(&groups[..1])
        .await
        .unwrap();

    let formatted: Vec<String> = runner
        .invocations()
        .iter()
        .filter(|i| i.program == "/usr/bin/buildifier")
        .map(|i| {
            assert_eq!(i.args[0], "--lint=fix");
            i.args[1].clone()
        })
        .collect();

    // Three files per config, then the cpp definitions and the latest aliases
    assert_eq!(formatted.len(), 3 * 2 + 2);
    assert!(formatted.iter().any(|p| p.ends_with("default/cc_toolchain_config.bzl")));
    assert!(formatted.iter().any(|p| p.ends_with("msan/dummy_toolchain.bzl")));
    assert!(formatted.iter().any(|p| p.ends_with("cpp/BUILD")));
    assert!(formatted.iter().any(|p| p.ends_with("latest/BUILD")));
    assert!(!formatted.iter().any(|p| p.ends_with("cc_wrapper.sh")));
}

/// Progress events arrive in workflow order
#[tokio::test]
async fn test_release_events() {
    let repo = TestRepo::new();
    let runner = MockRunner::new();
    let groups = builtin_groups(&repo, BAZEL_VERSION);

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = events.clone();
    let mut release = ConfigRelease::new(&runner, &repo.context, BAZEL_VERSION).with_date(release_date());
    release.add_event_handler(move |event| recorded.lock().unwrap().push(event.clone()));
    release.run(&groups[..1]).await.unwrap();

    let events = events.lock().unwrap();
    assert_eq!(
        events.first(),
        Some(&ReleaseEvent::ReleaseStarted {
            bazel_version: BAZEL_VERSION.to_string(),
            configs: 2,
        })
    );
    let extracted = events
        .iter()
        .filter(|e| matches!(e, ReleaseEvent::ConfigsExtracted { .. }))
        .count();
    assert_eq!(extracted, 2);
    let created = events
        .iter()
        .filter(|e| matches!(e, ReleaseEvent::TargetCreated { .. }))
        .count();
    assert_eq!(created, 2);
    assert!(matches!(events.last(), Some(ReleaseEvent::ReleaseCompleted { .. })));
}

/// The manifest lists every generated config with the digest it was built from
#[tokio::test]
async fn test_release_writes_manifest() {
    let repo = TestRepo::new();
    let runner = MockRunner::new();
    let groups = builtin_groups(&repo, BAZEL_VERSION);
    let manifest_path = repo.path("out/manifest.json");

    ConfigRelease::new(&runner, &repo.context, BAZEL_VERSION)
        .with_date(release_date())
        .with_manifest(Some(manifest_path.clone()))
        .run(&groups)
        .await
        .unwrap();

    let manifest = ReleaseManifest::from_file(&manifest_path).unwrap();
    assert_eq!(manifest.bazel_version, BAZEL_VERSION);
    assert_eq!(manifest.date, "2018.7.4");
    assert_eq!(manifest.configs.len(), 4);

    let msan = manifest
        .configs
        .iter()
        .find(|c| c.package == "configs/ubuntu16_04_clang" && c.config_type == "msan")
        .unwrap();
    assert_eq!(msan.version, "1.0");
    assert_eq!(msan.digest, UBUNTU_SHA);
    assert_eq!(msan.image, "gcr.io/cloud-marketplace/google/clang-ubuntu");
    assert_eq!(
        msan.config_dir,
        std::path::PathBuf::from("configs/ubuntu16_04_clang/1.0/bazel_0.15.0/msan")
    );
    assert_eq!(msan.autoconfig_target, "msan-ubuntu16_04-clang-1.0-bazel_0.15.0-autoconfig");

    let debian: Vec<_> = manifest
        .configs
        .iter()
        .filter(|c| c.package == "configs/debian8_clang")
        .map(|c| c.digest.as_str())
        .collect();
    assert_eq!(debian, vec![DEBIAN8_SHA, DEBIAN8_SHA]);
}

/// No manifest is written unless one is requested
#[tokio::test]
async fn test_manifest_is_optional() {
    let repo = TestRepo::new();
    let runner = MockRunner::new();
    let groups = builtin_groups(&repo, BAZEL_VERSION);

    release(&repo, &runner, &groups, BAZEL_VERSION).await.unwrap();
    assert!(!repo.path("out").exists());
}
