use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

mod common;

use common::{annotation_yaml, write_file};

fn urlset() -> Command {
    let mut cmd = Command::cargo_bin("urlset").unwrap();
    cmd.env_remove("URLSET_CACHE_FILE")
        .env_remove("URLSET_URL_TEMPLATE")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn runs() {
    urlset().assert().success();
}

#[test]
fn outputs_tool_name() {
    urlset()
        .arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("urlset "));
}

#[test]
fn resolve_serves_existing_cache_without_network() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let cache = temp.path().join("suffixes.cache");
    fs::write(&cache, "145,0000601,EGD3NF\n").expect("write cache");

    urlset()
        .args(["resolve", "--imagesets", "145", "146", "--cache-file"])
        .arg(&cache)
        .assert()
        .success()
        .stdout(predicate::str::contains("served from cache"));
}

#[test]
fn resolve_with_required_missing_cache_fails() {
    let temp = tempfile::tempdir().expect("create temp dir");

    urlset()
        .args(["resolve", "--require-cache", "--cache-file"])
        .arg(temp.path().join("absent.cache"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("suffix cache file"));
}

#[test]
fn cache_file_can_come_from_the_environment() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let cache = temp.path().join("env.cache");
    fs::write(&cache, "145,0000601,EGD3NF\n").expect("write cache");

    urlset()
        .env("URLSET_CACHE_FILE", &cache)
        .args(["resolve", "--imagesets", "145", "--output", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"source\": \"disk\""));
}

#[test]
fn build_writes_dataset_from_cached_suffixes() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let cache = temp.path().join("suffixes.cache");
    fs::write(&cache, "145,0000601,EGD3NF\n145,0000602,q8Zt1a\n").expect("write cache");
    write_file(
        &temp.path().join("annotations/match__blue_145__a.yaml"),
        &annotation_yaml(&[
            ("0000601", 1920, 1080, &["10, 100, 200, 300, 400, 0"]),
            ("0000602", 1920, 1080, &["1, 0, 0, 192, 108, 0"]),
        ]),
    );
    let out = temp.path().join("dataset");

    urlset()
        .args(["build", "--imagesets", "145", "--seed", "7", "--class-map", "1:1,3:1,10:0"])
        .arg("--annotations-dir")
        .arg(temp.path().join("annotations"))
        .arg("--output-dir")
        .arg(&out)
        .arg("--cache-file")
        .arg(&cache)
        .assert()
        .success()
        .stdout(predicate::str::contains("train: 1 image(s)"));

    let manifest = fs::read_to_string(out.join("dataset.yaml")).expect("manifest");
    assert!(manifest.contains("train: train.txt"));
    assert!(manifest.contains("nc: 2"));
    let urls = fs::read_to_string(out.join("train.txt")).expect("train list")
        + &fs::read_to_string(out.join("val.txt")).expect("val list");
    assert!(urls.contains("https://prism-static.aruw.org/images/1_145/image-0000601_EGD3NF.jpg"));
}

#[test]
fn build_rejects_out_of_range_split_ratio() {
    let temp = tempfile::tempdir().expect("create temp dir");

    urlset()
        .args(["build", "--split-ratio", "1.5", "--annotations-dir"])
        .arg(temp.path())
        .arg("--output-dir")
        .arg(temp.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("split ratio"));
}

#[test]
fn sync_labels_from_url_list() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let labels = temp.path().join("labels");
    write_file(&labels.join("image-0000601.txt"), "0 0.5 0.5 0.1 0.1");
    write_file(&labels.join("image-0000700.txt"), "0 0.5 0.5 0.1 0.1");
    let list = temp.path().join("train.txt");
    write_file(
        &list,
        "https://prism-static.aruw.org/images/1_145/image-0000601_EGD3NF.jpg\n",
    );

    urlset()
        .args(["sync-labels", "--label-dir"])
        .arg(&labels)
        .arg("--url-file")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("Renamed 1 label file(s); 1 without a suffix"));

    assert!(labels.join("image-0000601_EGD3NF.txt").exists());
}

#[test]
fn sync_labels_requires_a_suffix_source() {
    let temp = tempfile::tempdir().expect("create temp dir");

    urlset()
        .args(["sync-labels", "--label-dir"])
        .arg(temp.path())
        .assert()
        .failure();
}

#[test]
fn rewrite_urls_in_place_from_cache() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let cache = temp.path().join("suffixes.cache");
    fs::write(&cache, "145,0000601,EGD3NF\n").expect("write cache");
    let list = temp.path().join("val.txt");
    write_file(
        &list,
        "https://prism-static.aruw.org/images/1_145/image-0000601.jpg\n",
    );

    urlset()
        .args(["rewrite-urls", "--url-file"])
        .arg(&list)
        .arg("--cache-file")
        .arg(&cache)
        .assert()
        .success()
        .stdout(predicate::str::contains("Rewrote 1 URL(s)"));

    assert_eq!(
        fs::read_to_string(&list).expect("read list"),
        "https://prism-static.aruw.org/images/1_145/image-0000601_EGD3NF.jpg\n"
    );
}

#[test]
fn fetch_skips_present_images() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let dest = temp.path().join("images");
    write_file(&dest.join("image-0000601_EGD3NF.jpg"), "cached");
    let list = temp.path().join("train.txt");
    write_file(
        &list,
        "https://prism-static.aruw.org/images/1_145/image-0000601_EGD3NF.jpg\n\n",
    );

    urlset()
        .args(["fetch", "--concurrency", "2", "--url-file"])
        .arg(&list)
        .arg("--dest-dir")
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 skipped"));
}

#[test]
fn fetch_rejects_zero_concurrency() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let list = temp.path().join("train.txt");
    write_file(&list, "");

    urlset()
        .args(["fetch", "--concurrency", "0", "--url-file"])
        .arg(&list)
        .arg("--dest-dir")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn localize_builds_image_layout() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let url_dataset = temp.path().join("url");
    write_file(&url_dataset.join("labels/train/image-1_A.txt"), "0 0.5 0.5 0.1 0.1");
    write_file(
        &url_dataset.join("dataset.yaml"),
        "path: /elsewhere\ntrain: train.txt\nval: val.txt\ntest: ''\nnc: 2\nnames:\n  0: red\n  1: blue\n",
    );
    let local = temp.path().join("local");

    urlset()
        .args(["localize", "--url-dataset"])
        .arg(&url_dataset)
        .arg("--output-dir")
        .arg(&local)
        .assert()
        .success();

    assert!(local.join("labels/train/image-1_A.txt").exists());
    assert!(local.join("images/val").is_dir());
    let manifest = fs::read_to_string(local.join("dataset.yaml")).expect("manifest");
    assert!(manifest.contains("train: images/train"));
    assert!(manifest.contains("1: blue"));
}
