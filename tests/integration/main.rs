//! Integration tests for devloop

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn devloop(dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("devloop");
        cmd.current_dir(dir.path()).env_remove("DEVLOOP_CONFIG");
        cmd
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        devloop(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Java-to-JavaScript"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        devloop(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("devloop"));
    }

    #[test]
    fn config_path_defaults_to_working_directory() {
        let dir = TempDir::new().unwrap();
        devloop(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("devloop.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        devloop(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[project]"))
            .stdout(predicate::str::contains("[watch]"));
    }

    #[test]
    fn config_init_writes_file_once() {
        let dir = TempDir::new().unwrap();
        devloop(&dir).args(["config", "init"]).assert().success();
        assert!(dir.path().join("devloop.toml").is_file());

        devloop(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn explicit_config_flag() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("custom.toml"),
            "[bundle]\nlanguage_out = \"ECMASCRIPT_2017\"\n",
        )
        .unwrap();

        devloop(&dir)
            .args(["--config", "custom.toml", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ECMASCRIPT_2017"));
    }

    #[test]
    fn missing_explicit_config_fails() {
        let dir = TempDir::new().unwrap();
        devloop(&dir)
            .args(["--config", "nope.toml", "build"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Configuration file not found"));
    }

    #[test]
    fn invalid_config_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("devloop.toml"), "[watch]\npoll_interval_ms = \"soon\"\n").unwrap();

        devloop(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn build_without_entry_points_fails() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();

        devloop(&dir)
            .args(["build", "--src", "src"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("project.entry_points"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn build_with_missing_prebuilt_archive_fails() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();

        devloop(&dir)
            .args([
                "build",
                "--src",
                "src",
                "-e",
                "app.App",
                "--js-classpath",
                "jre.js.zip",
                "--out",
                "out",
                "--cache-dir",
                "cache",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("does not exist"));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn build_with_no_sources_fails() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();

        devloop(&dir)
            .args([
                "build", "--src", "src", "-e", "app.App", "--out", "out", "--cache-dir", "cache",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No Java sources found"));
    }

    #[test]
    fn cache_list_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("devloop.toml"), "[project]\ncache_dir = \"cache\"\n").unwrap();

        devloop(&dir)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached artifacts"));
    }

    #[test]
    fn cache_clear_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("devloop.toml"), "[project]\ncache_dir = \"cache\"\n").unwrap();

        devloop(&dir)
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached artifacts to clear"));
    }

    #[test]
    fn test_requires_a_class() {
        let dir = TempDir::new().unwrap();
        devloop(&dir).arg("test").assert().failure();
    }
}
