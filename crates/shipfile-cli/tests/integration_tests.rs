//! Integration tests for CLI commands

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Helper to run shipfile in `dir`
fn shipfile(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_shipfile"))
        .args(args)
        .current_dir(dir)
        .env_remove("SHIPFILE_FILE")
        .env_remove("SHIPFILE_ENVIRONMENT")
        .env_remove("SHIPFILE_NAMESPACE")
        .env_remove("SHIPFILE_HELM_BINARY")
        .env_remove("SHIPFILE_LOG")
        .output()
        .expect("Failed to execute shipfile")
}

/// Diagnostic text with miette's line wrapping undone
fn flat_stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .split_whitespace()
        .filter(|word| !matches!(*word, "│" | "|"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        let path = dir.path().join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    dir
}

const ROOT: &str = r#"
environments:
  default:
    values:
      - region: eu-west-1
  production:
    values:
      - region: us-east-1
        replicas: 3
---
helmfiles:
  - apps/*.yaml
releases:
  - name: ingress
    chart: stable/nginx-ingress
    namespace: edge
    labels:
      tier: edge
"#;

const WEB: &str = r#"
releases:
  - name: web-{{ values.region }}
    chart: charts/web
    labels:
      tier: frontend
"#;

const WORKER: &str = r#"
releases:
  - name: worker
    chart: charts/worker
    version: 1.2.3
    labels:
      tier: backend
"#;

fn sample_project() -> TempDir {
    project(&[
        ("shipfile.yaml", ROOT),
        ("apps/web.yaml", WEB),
        ("apps/worker.yaml", WORKER),
    ])
}

mod list_command {
    use super::*;

    #[test]
    fn test_list_default_manifest() {
        let dir = sample_project();
        let output = shipfile(dir.path(), &["list"]);

        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<&str> = stdout.lines().collect();

        assert!(lines[0].starts_with("NAME"));
        assert!(lines[1].starts_with("web-eu-west-1"));
        assert!(lines[2].starts_with("worker"));
        assert!(lines[3].starts_with("ingress"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_list_json_with_environment() {
        let dir = sample_project();
        let output = shipfile(dir.path(), &["list", "--json", "-e", "production", "-n", "apps"]);

        assert!(output.status.success());
        let rows: serde_json::Value = serde_json::from_slice(&output.stdout).expect("Output should be valid JSON");

        assert_eq!(rows[0]["name"], "web-us-east-1");
        assert_eq!(rows[0]["namespace"], "apps");
        assert_eq!(rows[1]["version"], "1.2.3");
        assert_eq!(rows[2]["namespace"], "edge");
        assert_eq!(rows[2]["labels"], "tier:edge");
    }

    #[test]
    fn test_list_with_selectors() {
        let dir = sample_project();
        let output = shipfile(
            dir.path(),
            &["list", "--json", "-l", "tier=frontend", "-l", "tier=edge,name=ingress"],
        );

        assert!(output.status.success());
        let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let names: Vec<_> = rows
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["web-eu-west-1", "ingress"]);
    }

    #[test]
    fn test_list_explicit_file_from_env() {
        let dir = sample_project();
        let output = Command::new(env!("CARGO_BIN_EXE_shipfile"))
            .args(["list", "--json"])
            .current_dir(dir.path())
            .env("SHIPFILE_FILE", "apps/worker.yaml")
            .output()
            .unwrap();

        assert!(output.status.success());
        let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["name"], "worker");
    }
}

mod build_command {
    use super::*;

    #[test]
    fn test_build_prints_one_document_per_manifest() {
        let dir = sample_project();
        let output = shipfile(dir.path(), &["build", "-e", "production"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert_eq!(stdout.matches("---\n").count(), 3);
        assert!(stdout.contains("environment: production"));
        assert!(stdout.contains("replicas: 3"));
        assert!(stdout.contains("name: web-us-east-1"));
    }
}

mod errors {
    use super::*;

    #[test]
    fn test_malformed_selector_exit_code() {
        let dir = sample_project();
        let output = shipfile(dir.path(), &["list", "-l", "tier"]);

        assert_eq!(output.status.code(), Some(2));
        assert!(flat_stderr(&output).contains("Malformed label: tier. Expected label in form k=v or k!=v"));
    }

    #[test]
    fn test_trailing_comma_selector_names_argument() {
        let dir = sample_project();
        let output = shipfile(dir.path(), &["list", "-l", "tier=edge,"]);

        assert_eq!(output.status.code(), Some(2));
        assert!(flat_stderr(&output).contains("Malformed label: tier=edge,. Expected label"));
    }

    #[test]
    fn test_undefined_environment_exit_code() {
        let dir = sample_project();
        let output = shipfile(dir.path(), &["list", "-e", "staging"]);

        assert_eq!(output.status.code(), Some(4));
        assert!(flat_stderr(&output).contains("environment \"staging\" is not defined"));
    }

    #[test]
    fn test_template_error_exit_code() {
        let dir = project(&[("shipfile.yaml", "releases:\n  - name: '{{ values.missing.key }}'\n")]);
        let output = shipfile(dir.path(), &["list"]);

        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_no_manifest() {
        let dir = TempDir::new().unwrap();
        let output = shipfile(dir.path(), &["list"]);

        assert_eq!(output.status.code(), Some(4));
        assert!(flat_stderr(&output).contains("no shipfile.yaml or shipfile.d/*.yaml found"));
    }

    #[test]
    fn test_import_cycle() {
        let dir = project(&[
            ("a.yaml", "helmfiles:\n  - b.yaml\n"),
            ("b.yaml", "helmfiles:\n  - a.yaml\n"),
        ]);
        let output = shipfile(dir.path(), &["list", "-f", "a.yaml"]);

        assert_eq!(output.status.code(), Some(4));
        assert!(flat_stderr(&output).contains("import cycle detected"));
    }
}

#[cfg(unix)]
mod release_commands {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// A stand-in helm that logs its arguments and fails on demand
    fn fake_helm(dir: &Path) -> String {
        let path = dir.join("fake-helm.sh");
        let log = dir.join("helm.log");
        fs::write(
            &path,
            format!(
                "#!/bin/sh\necho \"$*\" >> '{}'\ncase \"$*\" in *broken*) echo 'chart missing' >&2; exit 1;; esac\necho ok\n",
                log.display()
            ),
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn helm_log(dir: &Path) -> Vec<String> {
        fs::read_to_string(dir.join("helm.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_sync_invokes_helm_per_release() {
        let dir = sample_project();
        let helm = fake_helm(dir.path());

        let output = shipfile(dir.path(), &["sync", "--helm-binary", &helm, "--concurrency", "1"]);

        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
        let log = helm_log(dir.path());
        assert_eq!(log.len(), 3);
        assert!(log[0].starts_with("upgrade --install web-eu-west-1 charts/web"));
        assert!(log[1].starts_with("upgrade --install worker charts/worker"));
        assert!(log[1].contains("--version 1.2.3"));
        assert!(log[2].starts_with("upgrade --install ingress stable/nginx-ingress --namespace edge"));
    }

    #[test]
    fn test_delete_runs_in_reverse() {
        let dir = sample_project();
        let helm = fake_helm(dir.path());

        let output = shipfile(dir.path(), &["delete", "--helm-binary", &helm, "--concurrency", "1"]);

        assert!(output.status.success());
        assert_eq!(
            helm_log(dir.path()),
            vec![
                "uninstall ingress --namespace edge",
                "uninstall worker",
                "uninstall web-eu-west-1"
            ]
        );
    }

    #[test]
    fn test_failed_release_exit_code() {
        let dir = project(&[(
            "shipfile.yaml",
            "releases:\n  - name: broken\n    chart: charts/broken\n  - name: fine\n    chart: charts/fine\n",
        )]);
        let helm = fake_helm(dir.path());

        let output = shipfile(dir.path(), &["sync", "--helm-binary", &helm]);

        assert_eq!(output.status.code(), Some(6));
        assert!(flat_stderr(&output).contains("sync of release \"broken\" failed"));
        assert_eq!(helm_log(dir.path()).len(), 2);
    }
}
