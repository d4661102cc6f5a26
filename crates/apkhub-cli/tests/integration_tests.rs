//! Integration tests for CLI commands
//!
//! Every test runs against its own config file with `file://` buckets, so
//! no network access is needed.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Helper to run apkhub with an isolated config
fn apkhub(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_apkhub"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute apkhub")
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("Output should be valid JSON")
}

const APK_BYTES: &[u8] = b"not really an apk";

fn apk_sha256() -> String {
    hex::encode(Sha256::digest(APK_BYTES))
}

struct Fixture {
    dir: TempDir,
    config: PathBuf,
}

impl Fixture {
    /// Config with cache and downloads inside the tempdir and offline
    /// detection disabled
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config.yaml");
        let yaml = format!(
            "client:\n  cache_dir: {}\n  download_dir: {}\nnetwork:\n  max_retries: 0\n  offline_check_hosts: []\n",
            dir.path().join("cache").display(),
            dir.path().join("downloads").display()
        );
        std::fs::write(&config, yaml).unwrap();
        Self { dir, config }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a bucket directory with one manifest and return its file URL
    fn bucket(&self, name: &str, manifest: serde_json::Value) -> String {
        let root = self.path().join(format!("bucket-{}", name));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("apkhub_manifest.json"),
            serde_json::to_vec_pretty(&manifest).unwrap(),
        )
        .unwrap();
        format!("file://{}", root.display())
    }

    fn run(&self, args: &[&str]) -> std::process::Output {
        apkhub(&self.config, args)
    }

    /// A fixture with a `main` bucket holding com.example.notes with one
    /// downloadable build
    fn with_main_bucket() -> Self {
        let fixture = Self::new();
        let url = fixture.bucket(
            "main",
            serde_json::json!({
                "name": "Main",
                "packages": {
                    "com.example.notes": {
                        "packageId": "com.example.notes",
                        "name": {"en": "Notes"},
                        "description": {"en": "Simple note taking"},
                        "category": "productivity",
                        "versions": {
                            "12": {
                                "version": "1.2.0",
                                "versionCode": 12,
                                "minSdk": 21,
                                "size": APK_BYTES.len(),
                                "sha256": apk_sha256(),
                                "downloadUrl": "apks/notes-12.apk"
                            }
                        },
                        "latest": "12"
                    },
                    "org.example.player": {
                        "name": {"en": "Player"},
                        "category": "media",
                        "versions": {"3": {"version": "0.3", "versionCode": 3, "minSdk": 30}},
                        "latest": "3"
                    }
                }
            }),
        );
        let apks = fixture.path().join("bucket-main").join("apks");
        std::fs::create_dir_all(&apks).unwrap();
        std::fs::write(apks.join("notes-12.apk"), APK_BYTES).unwrap();

        let output = fixture.run(&["bucket", "add", "main", &url]);
        assert!(output.status.success(), "bucket add failed: {:?}", output);
        fixture
    }
}

mod bucket_command {
    use super::*;

    #[test]
    fn test_add_and_list() {
        let fixture = Fixture::with_main_bucket();

        let output = fixture.run(&["bucket", "list", "--json"]);
        assert!(output.status.success());
        let json = stdout_json(&output);
        let buckets = json.as_array().unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0]["bucket"]["name"], "main");
        assert_eq!(buckets[0]["bucket"]["enabled"], true);
        assert_eq!(buckets[0]["cache_fresh"], false);

        // Persisted to the config file
        let config = std::fs::read_to_string(&fixture.config).unwrap();
        assert!(config.contains("main"));
    }

    #[test]
    fn test_add_duplicate_is_config_error() {
        let fixture = Fixture::with_main_bucket();
        let output = fixture.run(&["bucket", "add", "main", "https://example.com"]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_add_invalid_url() {
        let fixture = Fixture::new();
        let output = fixture.run(&["bucket", "add", "main", "ftp://example.com"]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_update_unknown_bucket() {
        let fixture = Fixture::new();
        let output = fixture.run(&["bucket", "update", "nope"]);
        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("nope"));
    }

    #[test]
    fn test_update_disabled_bucket() {
        let fixture = Fixture::with_main_bucket();
        assert!(fixture.run(&["bucket", "disable", "main"]).status.success());

        let output = fixture.run(&["bucket", "update", "main"]);
        assert_eq!(output.status.code(), Some(2));

        assert!(fixture.run(&["bucket", "enable", "main"]).status.success());
        assert!(fixture.run(&["bucket", "update", "main"]).status.success());
    }

    #[test]
    fn test_update_json_report() {
        let fixture = Fixture::with_main_bucket();

        let output = fixture.run(&["update", "--json"]);
        assert!(output.status.success());
        let json = stdout_json(&output);
        assert_eq!(json[0]["bucket"], "main");
        assert_eq!(json[0]["status"], "updated");
        assert_eq!(json[0]["packages"], 2);

        let listed = stdout_json(&fixture.run(&["bucket", "list", "--json"]));
        assert_eq!(listed[0]["cache_fresh"], true);
        assert!(listed[0]["bucket"]["last_updated"].is_string());
    }

    #[test]
    fn test_update_with_no_buckets() {
        let fixture = Fixture::new();
        let output = fixture.run(&["update"]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_remove() {
        let fixture = Fixture::with_main_bucket();
        assert!(fixture.run(&["update"]).status.success());
        assert!(fixture.run(&["bucket", "remove", "main"]).status.success());

        let json = stdout_json(&fixture.run(&["bucket", "list", "--json"]));
        assert!(json.as_array().unwrap().is_empty());

        let stats = stdout_json(&fixture.run(&["cache", "stats", "--json"]));
        assert_eq!(stats["entries"], 0);
    }
}

mod search_command {
    use super::*;

    #[test]
    fn test_search_by_name() {
        let fixture = Fixture::with_main_bucket();
        let output = fixture.run(&["search", "notes", "--json"]);
        assert!(output.status.success());

        let json = stdout_json(&output);
        let hits = json.as_array().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["package_id"], "com.example.notes");
    }

    #[test]
    fn test_search_filters() {
        let fixture = Fixture::with_main_bucket();

        let json = stdout_json(&fixture.run(&["search", "--category", "media", "--json"]));
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["package_id"], "org.example.player");

        // The player needs SDK 30
        let json = stdout_json(&fixture.run(&["search", "--sdk", "24", "--json"]));
        let ids: Vec<_> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h["package_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["com.example.notes"]);
    }

    #[test]
    fn test_search_table_output() {
        let fixture = Fixture::with_main_bucket();
        let output = fixture.run(&["search", "example"]);
        assert!(output.status.success());
        let out = stdout(&output);
        assert!(out.contains("com.example.notes"));
        assert!(out.contains("2 packages found"));
    }

    #[test]
    fn test_offline_search_needs_cache() {
        let fixture = Fixture::with_main_bucket();

        let output = fixture.run(&["search", "notes", "--offline"]);
        assert_eq!(output.status.code(), Some(3));

        assert!(fixture.run(&["update"]).status.success());
        let json = stdout_json(&fixture.run(&["search", "notes", "--offline", "--json"]));
        assert_eq!(json.as_array().unwrap().len(), 1);
    }
}

mod info_command {
    use super::*;

    #[test]
    fn test_info_namespaces_versions() {
        let fixture = Fixture::with_main_bucket();
        let output = fixture.run(&["info", "com.example.notes", "--json"]);
        assert!(output.status.success());

        let json = stdout_json(&output);
        assert_eq!(json["latest"], "main_12");
        assert!(json["versions"]["main_12"].is_object());
        assert!(
            json["versions"]["main_12"]["downloadUrl"]
                .as_str()
                .unwrap()
                .starts_with("file://")
        );
    }

    #[test]
    fn test_info_unknown_package() {
        let fixture = Fixture::with_main_bucket();
        let output = fixture.run(&["info", "com.example.missing"]);
        assert_eq!(output.status.code(), Some(6));
    }
}

mod download_command {
    use super::*;

    #[test]
    fn test_download_verifies_and_reuses() {
        let fixture = Fixture::with_main_bucket();

        let output = fixture.run(&["download", "com.example.notes", "--json"]);
        assert!(output.status.success(), "download failed: {:?}", output);
        let json = stdout_json(&output);
        assert_eq!(json["sha256"], apk_sha256());
        assert_eq!(json["reused"], false);

        let path = fixture
            .path()
            .join("downloads")
            .join("com.example.notes_1.2.0.apk");
        assert_eq!(std::fs::read(&path).unwrap(), APK_BYTES);

        let json = stdout_json(&fixture.run(&["download", "com.example.notes", "--json"]));
        assert_eq!(json["reused"], true);
    }

    #[test]
    fn test_download_by_display_version_to_output() {
        let fixture = Fixture::with_main_bucket();
        let target = fixture.path().join("notes.apk");

        let output = fixture.run(&[
            "download",
            "com.example.notes",
            "1.2.0",
            "-o",
            target.to_str().unwrap(),
        ]);
        assert!(output.status.success());
        assert_eq!(std::fs::read(&target).unwrap(), APK_BYTES);
    }

    #[test]
    fn test_download_checksum_mismatch() {
        let fixture = Fixture::with_main_bucket();
        std::fs::write(
            fixture.path().join("bucket-main").join("apks").join("notes-12.apk"),
            b"tampered artifact",
        )
        .unwrap();

        let output = fixture.run(&["download", "com.example.notes"]);
        assert!(!output.status.success());

        // Nothing partial is left behind
        let downloads = fixture.path().join("downloads");
        let leftovers = std::fs::read_dir(&downloads)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_download_unknown_version() {
        let fixture = Fixture::with_main_bucket();
        let output = fixture.run(&["download", "com.example.notes", "9.9.9"]);
        assert_eq!(output.status.code(), Some(6));
    }
}

mod health_command {
    use super::*;

    #[test]
    fn test_health_reports_failing_bucket() {
        let fixture = Fixture::with_main_bucket();
        let missing = format!("file://{}", fixture.path().join("missing").display());
        assert!(fixture.run(&["bucket", "add", "broken", &missing]).status.success());

        let output = fixture.run(&["health", "--json"]);
        assert!(output.status.success());
        let json = stdout_json(&output);
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["bucket"], "broken");
        assert_eq!(rows[0]["consecutive_fails"], 1);
        assert!(rows[0]["last_error"].is_string());
        assert_eq!(rows[1]["bucket"], "main");
        assert_eq!(rows[1]["status"], "healthy");
    }
}

mod cache_command {
    use super::*;

    #[test]
    fn test_stats_and_clear() {
        let fixture = Fixture::with_main_bucket();
        assert!(fixture.run(&["update"]).status.success());

        let stats = stdout_json(&fixture.run(&["cache", "stats", "--json"]));
        assert_eq!(stats["entries"], 1);
        assert_eq!(stats["expired_count"], 0);

        let cleaned = stdout_json(&fixture.run(&["cache", "clean", "--json"]));
        assert_eq!(cleaned["removed"], 0);

        let cleared = stdout_json(&fixture.run(&["cache", "clear", "--json"]));
        assert_eq!(cleared["removed"], 1);

        let stats = stdout_json(&fixture.run(&["cache", "stats", "--json"]));
        assert_eq!(stats["entries"], 0);
    }
}
