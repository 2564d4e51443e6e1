use std::{
    net::TcpListener,
    path::Path,
    process::{Command, Output},
};

/// Address nothing listens on, so status probes fail fast.
fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}

fn jobmatch(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_jobmatch"))
        .args(args)
        .env("JOBMATCH_DATA_DIR", data_dir)
        .env("JOBMATCH_OLLAMA_URL", closed_url())
        .env("JOBMATCH_LOG", "error")
        .output()
        .unwrap()
}

#[test]
fn status_json_without_index() {
    let tmp = tempfile::tempdir().unwrap();
    let out = jobmatch(tmp.path(), &["status", "--json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let status: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(status["index"]["present"], false);
    assert_eq!(status["ollama_reachable"], false);
    assert_eq!(status["llm_model"], "llama3.1:8b");
}

#[test]
fn match_without_index_names_the_fix() {
    let tmp = tempfile::tempdir().unwrap();
    let resume = tmp.path().join("cv.txt");
    std::fs::write(&resume, "Python developer").unwrap();

    let out = jobmatch(tmp.path(), &["match", resume.to_str().unwrap()]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("jobmatch index"), "stderr: {stderr}");
}

#[test]
fn config_set_then_show() {
    let tmp = tempfile::tempdir().unwrap();

    let set = jobmatch(tmp.path(), &["config", "set", "llm_model", "mistral:7b"]);
    assert!(set.status.success());

    let show = jobmatch(tmp.path(), &["config", "show", "--json"]);
    let settings: serde_json::Value = serde_json::from_slice(&show.stdout).unwrap();
    assert_eq!(settings["llm_model"], "mistral:7b");

    let bad = jobmatch(tmp.path(), &["config", "set", "colour", "blue"]);
    assert!(!bad.status.success());
}
